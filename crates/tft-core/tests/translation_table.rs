//! Integration tests for command translation through the public API.
//!
//! These tests drive [`translate_with_macros`] the way the bridge's
//! translation engine does: one trimmed command at a time, against a set of
//! host macro names.  They cover every row of the translation table, the
//! macro-aware filament commands, and the boundary between passthrough and
//! "no translation".

use std::collections::BTreeSet;

use tft_core::protocol::command::LocalQuery;
use tft_core::translate_with_macros;
use tft_core::translation::{categorize_macros, extract_macro_names, MacroCategory};

fn no_macros() -> BTreeSet<String> {
    BTreeSet::new()
}

fn translate(cmd: &str) -> Option<String> {
    translate_with_macros(cmd, &no_macros())
}

// ── Table rows ────────────────────────────────────────────────────────────────

#[test]
fn test_every_table_row_translates() {
    let cases = [
        ("M420 S1", "BED_MESH_PROFILE LOAD=default"),
        ("M420 S0", "BED_MESH_CLEAR"),
        ("G29", "BED_MESH_CALIBRATE"),
        ("M421 I10 J5 Z0.1", "BED_MESH_CALIBRATE MESH_MIN=10,5 MESH_MAX=10,5"),
        ("M303 E0 C8 U1", "PID_CALIBRATE HEATER=extruder"),
        ("M303 E-1 C8 U1", "PID_CALIBRATE HEATER=heater_bed"),
        ("M280 P0 S10", "BLTOUCH_DEBUG COMMAND=pin_down"),
        ("M280 P0 S90", "BLTOUCH_DEBUG COMMAND=pin_up"),
        ("M280 P0 S160", "BLTOUCH_DEBUG COMMAND=reset"),
        ("M401", "PROBE_CALIBRATE"),
        ("M48", "PROBE_ACCURACY"),
        ("M500", "SAVE_CONFIG"),
        ("M503", "# Settings saved in printer.cfg"),
        ("M851 Z-0.35", "SET_GCODE_OFFSET Z=-0.35 MOVE=1"),
    ];

    for (input, expected) in cases {
        assert_eq!(translate(input).as_deref(), Some(expected), "input: {input}");
    }
}

#[test]
fn test_first_matching_rule_wins() {
    // "M280 P0 S160" also starts with "M280 P0 S1", which no rule names; the
    // S10 rule must not claim it because "S160" does not start with "S10".
    assert_eq!(translate("M280 P0 S160").as_deref(), Some("BLTOUCH_DEBUG COMMAND=reset"));
    // "M280 P0 S100" does start with "S10" and the earlier rule claims it.
    assert_eq!(translate("M280 P0 S100").as_deref(), Some("BLTOUCH_DEBUG COMMAND=pin_down"));
}

// ── Filament macros ───────────────────────────────────────────────────────────

#[test]
fn test_filament_commands_follow_registry_contents() {
    // Arrange
    let empty = no_macros();
    let loaded: BTreeSet<String> = ["LOAD_FILAMENT".to_string()].into_iter().collect();

    // Act / Assert
    assert_eq!(translate_with_macros("M701", &empty).as_deref(), Some("TFT_LOAD_FILAMENT"));
    assert_eq!(translate_with_macros("M701", &loaded).as_deref(), Some("LOAD_FILAMENT"));
    // UNLOAD_FILAMENT is still missing from `loaded`.
    assert_eq!(translate_with_macros("M702", &loaded).as_deref(), Some("TFT_UNLOAD_FILAMENT"));
}

#[test]
fn test_registry_from_config_response_feeds_translation() {
    // Arrange
    let response = serde_json::json!({
        "result": {"status": {"configfile": {"settings": {
            "gcode_macro unload_filament": {"gcode": "..."},
            "stepper_x": {}
        }}}}
    });

    // Act
    let registry = extract_macro_names(&response);

    // Assert
    assert_eq!(translate_with_macros("M702", &registry).as_deref(), Some("UNLOAD_FILAMENT"));
}

// ── Passthrough and local queries ─────────────────────────────────────────────

#[test]
fn test_native_commands_pass_through() {
    for cmd in ["G0 X1", "G1 Z0.2 F600", "G28", "G90", "G91", "G92 E0", "M104 S210", "M109 S210",
        "M114", "M190 S60", "M220 S120", "M221 S95", "M20", "M24", "M25", "M32 job.gcode"]
    {
        assert_eq!(translate(cmd).as_deref(), Some(cmd), "command: {cmd}");
    }
}

#[test]
fn test_local_queries_are_classified_and_not_translated() {
    for cmd in ["M115", "M105"] {
        assert!(LocalQuery::classify(cmd).is_some());
        assert_eq!(translate(cmd), None);
    }
}

#[test]
fn test_vendor_diagnostics_have_no_translation() {
    for cmd in ["M997", "M118 hello", "T1", "M80", "M150 R255"] {
        assert_eq!(translate(cmd), None, "command: {cmd}");
    }
}

// ── Macro listing ─────────────────────────────────────────────────────────────

#[test]
fn test_categorize_places_unknown_macros_in_custom() {
    let registry: BTreeSet<String> = ["PAUSE", "PRIME_LINE"].iter().map(|s| s.to_string()).collect();

    let groups = categorize_macros(&registry);

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0], (MacroCategory::PrintControl, vec!["PAUSE".to_string()]));
    assert_eq!(groups[1], (MacroCategory::Custom, vec!["PRIME_LINE".to_string()]));
}
