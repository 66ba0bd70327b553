use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Advertised-name prefix carried by every Gen2 unit.
pub(crate) const GEN2_NAME_PREFIX: &str = "WD_";
/// Advertised-name prefixes seen on Gen1 units.
pub(crate) const GEN1_NAME_PREFIXES: [&str; 2] = ["PMD", "PWS"];

const GEN2_NAME_SEPARATOR: char = '_';
const ENHANCED_MODEL_CODES: [&str; 4] = ["E8", "V8", "E9", "V9"];

/// Wire-protocol generation spoken by a Power Watchdog unit.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Legacy paired-chunk protocol.
    #[strum(to_string = "gen1")]
    Gen1,
    /// Framed packet protocol with command support.
    #[strum(to_string = "gen2")]
    Gen2,
}

/// Classification of a device derived from its advertised name.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceModel {
    generation: Generation,
    model_code: Option<String>,
    enhanced: bool,
    #[serde(skip)]
    gen1_prefixed: bool,
}

impl DeviceModel {
    /// Returns the detected protocol generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the Gen2 model code (second `_`-separated name field), if any.
    #[must_use]
    pub fn model_code(&self) -> Option<&str> {
        self.model_code.as_deref()
    }

    /// Returns whether the unit exposes output voltage, boost and temperature.
    #[must_use]
    pub fn is_enhanced(&self) -> bool {
        self.enhanced
    }

    /// Returns whether `name` still classifies into this model's generation.
    ///
    /// Absent names are accepted because several adapters drop the local name
    /// once a connection is established. A model detected from a `PMD`/`PWS`
    /// name only accepts names with one of those prefixes; a model detected
    /// from any other Gen1 name accepts any non-Gen2 name.
    pub(crate) fn name_matches(&self, name: Option<&str>) -> bool {
        name.is_none_or(|value| {
            let advertised = ModelDetector::detect(value);
            advertised.generation == self.generation
                && (!self.gen1_prefixed || advertised.gen1_prefixed)
        })
    }
}

/// Classifies advertised names into protocol generations.
pub struct ModelDetector;

impl ModelDetector {
    /// Detects the protocol generation and Gen2 model from an advertised name.
    ///
    /// Unknown names fall back to Gen1.
    ///
    /// ```
    /// use hughes::{Generation, ModelDetector};
    ///
    /// let model = ModelDetector::detect("WD_E8_0123456789");
    /// assert_eq!(Generation::Gen2, model.generation());
    /// assert_eq!(Some("E8"), model.model_code());
    /// assert!(model.is_enhanced());
    ///
    /// let legacy = ModelDetector::detect("PMD30A");
    /// assert_eq!(Generation::Gen1, legacy.generation());
    /// assert!(!legacy.is_enhanced());
    /// ```
    #[must_use]
    pub fn detect(name: &str) -> DeviceModel {
        if !has_prefix_ignore_case(name, GEN2_NAME_PREFIX) {
            return DeviceModel {
                generation: Generation::Gen1,
                model_code: None,
                enhanced: false,
                gen1_prefixed: has_gen1_prefix(name),
            };
        }

        let model_code = name
            .split(GEN2_NAME_SEPARATOR)
            .nth(1)
            .filter(|code| !code.is_empty())
            .map(str::to_string);
        let enhanced = model_code.as_deref().is_some_and(|code| {
            ENHANCED_MODEL_CODES
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(code))
        });

        DeviceModel {
            generation: Generation::Gen2,
            model_code,
            enhanced,
            gen1_prefixed: false,
        }
    }

    /// Returns whether an advertised name looks like any Power Watchdog unit.
    ///
    /// ```
    /// assert!(hughes::ModelDetector::is_watchdog_name("PWS50"));
    /// assert!(hughes::ModelDetector::is_watchdog_name("wd_v9_01"));
    /// assert!(!hughes::ModelDetector::is_watchdog_name("Speaker"));
    /// ```
    #[must_use]
    pub fn is_watchdog_name(name: &str) -> bool {
        has_prefix_ignore_case(name, GEN2_NAME_PREFIX) || has_gen1_prefix(name)
    }
}

fn has_gen1_prefix(name: &str) -> bool {
    GEN1_NAME_PREFIXES
        .iter()
        .any(|prefix| has_prefix_ignore_case(name, prefix))
}

fn has_prefix_ignore_case(name: &str, prefix: &str) -> bool {
    name.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
