use std::fmt::{self, Display, Formatter};

use crate::coordinator::Snapshot;
use crate::detect::DeviceModel;
use crate::utils::{format_age, format_rssi};

use super::lines_view::{LinesView, gen2_status_rows};
use super::painter::Painter;
use super::table::Table;

/// Renders one published coordinator snapshot.
pub(crate) struct SnapshotView<'a> {
    snapshot: &'a Snapshot,
    painter: &'a Painter,
}

impl<'a> SnapshotView<'a> {
    pub(crate) fn new(snapshot: &'a Snapshot, painter: &'a Painter) -> Self {
        Self { snapshot, painter }
    }
}

impl Display for SnapshotView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot;
        let painter = self.painter;

        let address = snapshot
            .peripheral()
            .map(|peripheral| peripheral.address())
            .or(Some(snapshot.device().address()).filter(|address| !address.is_empty()))
            .unwrap_or("<discover>");
        let healthy = if snapshot.data_healthy() {
            painter.success("yes")
        } else {
            painter.warning("no")
        };

        let mut rows = vec![
            ("phase", painter.phase(snapshot.phase())),
            ("address", painter.value(address)),
            (
                "rssi",
                format_rssi(snapshot.peripheral().and_then(|peripheral| peripheral.rssi())),
            ),
            ("updates", snapshot.update_count().to_string()),
            ("last_seen", format_age(snapshot.last_seen_age())),
            ("healthy", healthy),
            (
                "reconnect_failures",
                snapshot.reconnect_failures().to_string(),
            ),
        ];
        if let Some(unit) = snapshot.device().display_unit() {
            rows.push(("display_unit", unit.to_string()));
        }
        if let Some(state) = snapshot.state() {
            rows.extend(gen2_status_rows(state.line1(), painter));
        }

        write!(
            f,
            "{} {} {}",
            painter.heading("Power Watchdog"),
            painter.value(snapshot.device().name()),
            painter.muted(format!("({}):", model_label(snapshot.model())))
        )?;
        write!(f, "\n{}", Table::key_value(painter, rows))?;

        match snapshot.state() {
            Some(state) => {
                let mut lines = vec![("L1", state.line1())];
                lines.extend(state.line2().map(|line| ("L2", line)));
                write!(f, "\n{}", LinesView::new(lines, painter))
            }
            None => write!(f, "\n{}", painter.muted("No data received yet.")),
        }
    }
}

/// Describes a model as `gen2 E8, enhanced`.
pub(crate) fn model_label(model: &DeviceModel) -> String {
    let mut label = model.generation().to_string();
    if let Some(code) = model.model_code() {
        label.push(' ');
        label.push_str(code);
    }
    if model.is_enhanced() {
        label.push_str(", enhanced");
    }
    label
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::config::DeviceConfig;
    use crate::detect::ModelDetector;

    #[rstest]
    #[case("PMD30", "gen1")]
    #[case("WD_V6_01", "gen2 V6")]
    #[case("WD_E8_0001", "gen2 E8, enhanced")]
    fn model_label_describes_model(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(expected, model_label(&ModelDetector::detect(name)));
    }

    #[test]
    fn snapshot_without_data_renders_placeholder() {
        let painter = Painter::new(false);
        let device = DeviceConfig::builder().address("AA:BB").name("PMD30").build();
        let snapshot = Snapshot::new(
            device.clone(),
            device.model(),
            Duration::from_secs(300),
        );

        assert_snapshot!(SnapshotView::new(&snapshot, &painter).to_string(), @r"
        Power Watchdog PMD30 (gen1):
        ╭────────────────────┬──────────────╮
        │ field              │ value        │
        ├────────────────────┼──────────────┤
        │ phase              │ disconnected │
        │ address            │ AA:BB        │
        │ rssi               │ -            │
        │ updates            │ 0            │
        │ last_seen          │ never        │
        │ healthy            │ no           │
        │ reconnect_failures │ 0            │
        ╰────────────────────┴──────────────╯
        No data received yet.
        ");
    }

    #[test]
    fn display_unit_is_listed_when_configured() {
        let painter = Painter::new(false);
        let device = DeviceConfig::builder()
            .address("")
            .name("WD_V6_01")
            .display_unit("imperial")
            .build();
        let snapshot = Snapshot::new(
            device.clone(),
            device.model(),
            Duration::from_secs(300),
        );

        let rendered = SnapshotView::new(&snapshot, &painter).to_string();
        assert!(rendered.contains("imperial"));
        assert!(rendered.contains("<discover>"));
    }
}
