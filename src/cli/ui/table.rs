use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

/// Rounded terminal table; the first record is the header row.
///
/// Every row has as many cells as there are headers, enforced by `N`.
#[derive(Debug)]
pub(crate) struct Table {
    records: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn grid<const N: usize>(
        headers: [&str; N],
        rows: impl IntoIterator<Item = [String; N]>,
    ) -> Self {
        let header: Vec<String> = headers.iter().map(|header| (*header).to_string()).collect();
        let records = std::iter::once(header)
            .chain(rows.into_iter().map(Vec::from))
            .collect();
        Self { records }
    }

    /// Field/value pairs with muted field names.
    pub(crate) fn key_value<'a>(
        painter: &Painter,
        rows: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Self {
        Self::grid(
            ["field", "value"],
            rows.into_iter()
                .map(|(field, value)| [painter.muted(field), value]),
        )
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        for record in &self.records {
            builder.push_record(record);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn grid_renders_header_above_rows() {
        let table = Table::grid(
            ["line", "voltage"],
            [
                ["1".to_string(), "120.5".to_string()],
                ["2".to_string(), "119.8".to_string()],
            ],
        );
        assert_snapshot!(table.to_string(), @r"
        ╭──────┬─────────╮
        │ line │ voltage │
        ├──────┼─────────┤
        │ 1    │ 120.5   │
        │ 2    │ 119.8   │
        ╰──────┴─────────╯
        ");
    }

    #[test]
    fn key_value_renders_snapshot_fields() {
        let painter = Painter::new(false);
        let table = Table::key_value(
            &painter,
            [("phase", "connected".to_string()), ("updates", "3".to_string())],
        );
        assert_snapshot!(table.to_string(), @r"
        ╭─────────┬───────────╮
        │ field   │ value     │
        ├─────────┼───────────┤
        │ phase   │ connected │
        │ updates │ 3         │
        ╰─────────┴───────────╯
        ");
    }
}
