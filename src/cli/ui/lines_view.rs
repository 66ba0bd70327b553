use std::fmt::{self, Display, Formatter};

use crate::state::LineData;

use super::painter::Painter;
use super::table::Table;

/// Renders per-line electrical readings as one table row each.
pub(crate) struct LinesView<'a> {
    lines: Vec<(&'static str, &'a LineData)>,
    painter: &'a Painter,
}

impl<'a> LinesView<'a> {
    pub(crate) fn new(lines: Vec<(&'static str, &'a LineData)>, painter: &'a Painter) -> Self {
        Self { lines, painter }
    }
}

impl Display for LinesView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .lines
            .iter()
            .map(|(label, line)| {
                [
                    (*label).to_string(),
                    format!("{:.1} V", line.voltage()),
                    format!("{:.2} A", line.current()),
                    format!("{:.1} W", line.power()),
                    format!("{:.2} kWh", line.energy()),
                    format!("{:.1} Hz", line.frequency()),
                    self.status(line),
                ]
            });

        let table = Table::grid(
            [
                "line",
                "voltage",
                "current",
                "power",
                "energy",
                "frequency",
                "status",
            ],
            rows,
        );
        write!(f, "{table}")
    }
}

impl LinesView<'_> {
    fn status(&self, line: &LineData) -> String {
        if line.error_code() == 0 {
            self.painter.success(line.error_text())
        } else {
            self.painter
                .danger(format!("E{} {}", line.error_code(), line.error_text()))
        }
    }
}

/// Formats the Gen2-only status fields of a line as field/value rows.
pub(crate) fn gen2_status_rows(line: &LineData, painter: &Painter) -> Vec<(&'static str, String)> {
    let on_off = |value: bool| if value { "on" } else { "off" };
    let mut rows = Vec::new();

    if let Some(relay_on) = line.relay_on() {
        let label = on_off(relay_on);
        rows.push((
            "relay",
            if relay_on {
                painter.success(label)
            } else {
                painter.warning(label)
            },
        ));
    }
    if let Some(enabled) = line.neutral_detection_enabled() {
        rows.push(("neutral_detection", painter.value(on_off(enabled))));
    }
    if let Some(level) = line.backlight_level() {
        rows.push(("backlight", painter.value(level.to_string())));
    }
    if let Some(volts) = line.output_voltage() {
        rows.push(("output_voltage", painter.value(format!("{volts:.1} V"))));
    }
    if let Some(boost) = line.boost_active() {
        rows.push(("boost", painter.value(on_off(boost))));
    }
    if let Some(temperature) = line.temperature_f() {
        rows.push(("temperature", painter.value(format!("{temperature:.0} °F"))));
    }

    rows
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::state::{Gen2Status, Measurements};

    fn measurements() -> Measurements {
        Measurements {
            voltage: 120.5,
            current: 12.25,
            power: 1476.1,
            energy: 35.7,
            frequency: 60.0,
        }
    }

    #[test]
    fn single_line_renders_units() {
        let painter = Painter::new(false);
        let line = LineData::gen1(measurements(), 0);
        let view = LinesView::new(vec![("L1", &line)], &painter);

        assert_snapshot!(view.to_string(), @r"
        ╭──────┬─────────┬─────────┬──────────┬───────────┬───────────┬────────╮
        │ line │ voltage │ current │ power    │ energy    │ frequency │ status │
        ├──────┼─────────┼─────────┼──────────┼───────────┼───────────┼────────┤
        │ L1   │ 120.5 V │ 12.25 A │ 1476.1 W │ 35.70 kWh │ 60.0 Hz   │ OK     │
        ╰──────┴─────────┴─────────┴──────────┴───────────┴───────────┴────────╯
        ");
    }

    #[test]
    fn error_codes_include_code_and_text() {
        let painter = Painter::new(false);
        let line = LineData::gen1(measurements(), 8);
        let view = LinesView::new(vec![("L1", &line)], &painter);

        assert!(view.to_string().contains("E8 Lost Ground"));
    }

    #[test]
    fn gen1_lines_have_no_status_rows() {
        let painter = Painter::new(false);
        let line = LineData::gen1(measurements(), 0);

        assert!(gen2_status_rows(&line, &painter).is_empty());
    }

    #[test]
    fn gen2_status_rows_follow_device_flags() {
        let painter = Painter::new(false);
        let line = LineData::gen2(
            measurements(),
            0,
            Gen2Status {
                relay_on: false,
                neutral_detection_enabled: true,
                backlight_level: 3,
            },
            None,
        );

        assert_eq!(
            vec![
                ("relay", "off".to_string()),
                ("neutral_detection", "on".to_string()),
                ("backlight", "3".to_string()),
            ],
            gen2_status_rows(&line, &painter)
        );
    }
}
