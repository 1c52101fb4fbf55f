//! Host macro discovery and grouping.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

const MACRO_KEY_PREFIX: &str = "gcode_macro ";

/// Macros worth calling out in the log when the registry is loaded.
pub const IMPORTANT_MACROS: [&str; 5] = [
    "LOAD_FILAMENT",
    "UNLOAD_FILAMENT",
    "PAUSE",
    "RESUME",
    "CANCEL_PRINT",
];

/// Extracts macro names from a `configfile` object query response.
///
/// Every key of `result.status.configfile.settings` that starts with
/// `gcode_macro ` names a macro; the rest of the key, uppercased, is the
/// macro name.  A response without that structure yields an empty set.
pub fn extract_macro_names(response: &Value) -> BTreeSet<String> {
    response
        .pointer("/result/status/configfile/settings")
        .and_then(Value::as_object)
        .map(|settings| {
            settings
                .keys()
                .filter_map(|key| key.strip_prefix(MACRO_KEY_PREFIX))
                .map(|name| name.trim().to_uppercase())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Display groups for `--list-macros`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MacroCategory {
    Filament,
    PrintControl,
    BedLeveling,
    Probe,
    Maintenance,
    /// Everything not named by another category.
    Custom,
}

impl MacroCategory {
    /// All categories in display order.
    pub const ALL: [MacroCategory; 6] = [
        MacroCategory::Filament,
        MacroCategory::PrintControl,
        MacroCategory::BedLeveling,
        MacroCategory::Probe,
        MacroCategory::Maintenance,
        MacroCategory::Custom,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MacroCategory::Filament => "Filament",
            MacroCategory::PrintControl => "Print Control",
            MacroCategory::BedLeveling => "Bed Leveling",
            MacroCategory::Probe => "Probe/BLTouch",
            MacroCategory::Maintenance => "Maintenance",
            MacroCategory::Custom => "Custom",
        }
    }

    /// Macro names that belong to this category.  Empty for `Custom`.
    pub fn members(self) -> &'static [&'static str] {
        match self {
            MacroCategory::Filament => &["LOAD_FILAMENT", "UNLOAD_FILAMENT", "CHANGE_FILAMENT"],
            MacroCategory::PrintControl => {
                &["PAUSE", "RESUME", "CANCEL_PRINT", "START_PRINT", "END_PRINT"]
            }
            MacroCategory::BedLeveling => &[
                "BED_MESH_CALIBRATE",
                "BED_MESH_LOAD",
                "BED_MESH_SAVE",
                "Z_TILT_ADJUST",
                "SCREWS_TILT_CALCULATE",
            ],
            MacroCategory::Probe => {
                &["PROBE_CALIBRATE", "PROBE_ACCURACY", "BLTOUCH_DEBUG", "BLTOUCH_STORE"]
            }
            MacroCategory::Maintenance => &["CLEAN_NOZZLE", "PURGE_NOZZLE", "HEAT_SOAK", "PARK"],
            MacroCategory::Custom => &[],
        }
    }
}

impl fmt::Display for MacroCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Groups `macros` by category, in display order, sorted within each group.
///
/// Categories with no known macro are omitted.
pub fn categorize_macros(macros: &BTreeSet<String>) -> Vec<(MacroCategory, Vec<String>)> {
    let mut remaining = macros.clone();
    let mut groups = Vec::new();

    for category in MacroCategory::ALL {
        let mut found: Vec<String> = if category == MacroCategory::Custom {
            std::mem::take(&mut remaining).into_iter().collect()
        } else {
            category
                .members()
                .iter()
                .filter_map(|name| remaining.take(*name))
                .collect()
        };
        if !found.is_empty() {
            found.sort();
            groups.push((category, found));
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_macro_names_uppercases_and_filters() {
        // Arrange
        let response = json!({
            "result": {"status": {"configfile": {"settings": {
                "gcode_macro load_filament": {},
                "gcode_macro PAUSE": {},
                "extruder": {},
                "printer": {}
            }}}}
        });

        // Act
        let names = extract_macro_names(&response);

        // Assert
        assert_eq!(names, set(&["LOAD_FILAMENT", "PAUSE"]));
    }

    #[test]
    fn test_extract_from_unexpected_shape_is_empty() {
        assert!(extract_macro_names(&json!({"result": {}})).is_empty());
        assert!(extract_macro_names(&json!({"error": "boom"})).is_empty());
    }

    #[test]
    fn test_categorize_in_display_order_with_custom_last() {
        // Arrange
        let macros = set(&["PARK", "LOAD_FILAMENT", "MY_THING", "PAUSE", "A_CUSTOM", "BLTOUCH_STORE"]);

        // Act
        let groups = categorize_macros(&macros);

        // Assert
        let order: Vec<MacroCategory> = groups.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            order,
            vec![
                MacroCategory::Filament,
                MacroCategory::PrintControl,
                MacroCategory::Probe,
                MacroCategory::Maintenance,
                MacroCategory::Custom,
            ]
        );
        assert_eq!(groups.last().unwrap().1, vec!["A_CUSTOM", "MY_THING"]);
    }

    #[test]
    fn test_categorize_empty_set_yields_no_groups() {
        assert!(categorize_macros(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_labels() {
        assert_eq!(MacroCategory::Probe.to_string(), "Probe/BLTouch");
        assert_eq!(MacroCategory::PrintControl.label(), "Print Control");
    }
}
