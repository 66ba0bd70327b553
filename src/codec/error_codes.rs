use crate::detect::Generation;

const GEN1_ERROR_TEXT: [&str; 10] = [
    "OK",
    "Overvoltage L1",
    "Overvoltage L2",
    "Undervoltage L1",
    "Undervoltage L2",
    "Overcurrent L1",
    "Overcurrent L2",
    "Hot/Neutral Reversed",
    "Lost Ground",
    "No RV Neutral",
];

const GEN2_ERROR_TEXT: [&str; 15] = [
    "OK",
    "Voltage Error L1",
    "Voltage Error L2",
    "Over Current L1",
    "Over Current L2",
    "Neutral Reversed L1",
    "Neutral Reversed L2",
    "Missing Ground",
    "Neutral Missing",
    "Surge Protection Used Up",
    "E10",
    "Frequency Error L1",
    "Frequency Error L2",
    "F3",
    "F4",
];

/// Resolves a device error code to display text.
///
/// Codes outside the generation's table resolve to `Unknown (<code>)`.
///
/// ```
/// use hughes::{Generation, error_text};
///
/// assert_eq!("Lost Ground", error_text(Generation::Gen1, 8));
/// assert_eq!("Missing Ground", error_text(Generation::Gen2, 7));
/// assert_eq!("Unknown (200)", error_text(Generation::Gen2, 200));
/// ```
#[must_use]
pub fn error_text(generation: Generation, code: u8) -> String {
    let table: &[&str] = match generation {
        Generation::Gen1 => &GEN1_ERROR_TEXT,
        Generation::Gen2 => &GEN2_ERROR_TEXT,
    };

    table
        .get(usize::from(code))
        .map_or_else(|| format!("Unknown ({code})"), |text| (*text).to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Generation::Gen1, 0, "OK")]
    #[case(Generation::Gen1, 9, "No RV Neutral")]
    #[case(Generation::Gen1, 10, "Unknown (10)")]
    #[case(Generation::Gen2, 9, "Surge Protection Used Up")]
    #[case(Generation::Gen2, 14, "F4")]
    #[case(Generation::Gen2, 15, "Unknown (15)")]
    #[case(Generation::Gen2, 255, "Unknown (255)")]
    fn error_text_uses_generation_table(
        #[case] generation: Generation,
        #[case] code: u8,
        #[case] expected: &str,
    ) {
        assert_eq!(expected, error_text(generation, code));
    }
}
