mod lines_view;
mod painter;
mod snapshot_view;
mod table;

pub(crate) use self::lines_view::LinesView;
pub(crate) use self::painter::Painter;
pub(crate) use self::snapshot_view::{SnapshotView, model_label};
pub(crate) use self::table::Table;
