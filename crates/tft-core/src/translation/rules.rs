//! The ordered translation table and the passthrough grammars.
//!
//! Both are compiled once on first use and shared for the life of the
//! process.  Patterns are case-insensitive and anchored at the start of the
//! command only, so trailing parameters the table does not name are ignored
//! (`G29 P1` still matches `G29`).

use std::sync::OnceLock;

use regex::{Captures, Regex, RegexSet};

/// What a matching rule produces.
#[derive(Clone, Copy)]
pub enum RuleAction {
    /// Fixed host command text.
    StaticCommand(&'static str),
    /// Host command built from the pattern's capture groups.
    Transform(fn(&Captures<'_>) -> String),
}

impl std::fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::StaticCommand(text) => f.debug_tuple("StaticCommand").field(text).finish(),
            RuleAction::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// One row of the translation table.
#[derive(Debug)]
pub struct TranslationRule {
    pub pattern: Regex,
    pub action: RuleAction,
}

impl TranslationRule {
    fn new(pattern: &str, action: RuleAction) -> Self {
        Self {
            // Every pattern is a literal in this file; a failure here is a
            // programming error caught by the table tests.
            pattern: Regex::new(&format!("(?i)^{pattern}")).expect("translation pattern must compile"),
            action,
        }
    }

    /// Applies the rule to `command`, returning the host command on a match.
    pub fn apply(&self, command: &str) -> Option<String> {
        let caps = self.pattern.captures(command)?;
        Some(match self.action {
            RuleAction::StaticCommand(text) => text.to_string(),
            RuleAction::Transform(f) => f(&caps),
        })
    }
}

fn mesh_point(caps: &Captures<'_>) -> String {
    let (i, j) = (&caps[1], &caps[2]);
    format!("BED_MESH_CALIBRATE MESH_MIN={i},{j} MESH_MAX={i},{j}")
}

fn z_offset(caps: &Captures<'_>) -> String {
    format!("SET_GCODE_OFFSET Z={} MOVE=1", &caps[1])
}

/// The translation table, in match order.  First match wins.
pub fn translation_rules() -> &'static [TranslationRule] {
    static RULES: OnceLock<Vec<TranslationRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        use RuleAction::{StaticCommand, Transform};
        vec![
            // Bed mesh
            TranslationRule::new(r"M420\s+S1", StaticCommand("BED_MESH_PROFILE LOAD=default")),
            TranslationRule::new(r"M420\s+S0", StaticCommand("BED_MESH_CLEAR")),
            TranslationRule::new(r"G29", StaticCommand("BED_MESH_CALIBRATE")),
            TranslationRule::new(
                r"M421\s+I(\d+)\s+J(\d+)\s+Z([+-]?\d*\.?\d+)",
                Transform(mesh_point),
            ),
            // PID tuning
            TranslationRule::new(r"M303\s+E0\s+C8\s+U1", StaticCommand("PID_CALIBRATE HEATER=extruder")),
            TranslationRule::new(
                r"M303\s+E-1\s+C8\s+U1",
                StaticCommand("PID_CALIBRATE HEATER=heater_bed"),
            ),
            // Probe
            TranslationRule::new(r"M280\s+P0\s+S10", StaticCommand("BLTOUCH_DEBUG COMMAND=pin_down")),
            TranslationRule::new(r"M280\s+P0\s+S90", StaticCommand("BLTOUCH_DEBUG COMMAND=pin_up")),
            TranslationRule::new(r"M280\s+P0\s+S160", StaticCommand("BLTOUCH_DEBUG COMMAND=reset")),
            TranslationRule::new(r"M401", StaticCommand("PROBE_CALIBRATE")),
            TranslationRule::new(r"M48", StaticCommand("PROBE_ACCURACY")),
            // Filament; bare M701/M702 are resolved against the macro registry first
            TranslationRule::new(r"M701", StaticCommand("LOAD_FILAMENT")),
            TranslationRule::new(r"M702", StaticCommand("UNLOAD_FILAMENT")),
            // Settings live in printer.cfg on the host
            TranslationRule::new(r"M500", StaticCommand("SAVE_CONFIG")),
            TranslationRule::new(r"M503", StaticCommand("# Settings saved in printer.cfg")),
            // Z offset
            TranslationRule::new(r"M851\s+Z([+-]?\d*\.?\d+)", Transform(z_offset)),
        ]
    })
}

/// Command families the host understands natively, forwarded unchanged.
pub const PASSTHROUGH_GRAMMARS: [(&str, &str); 10] = [
    ("motion", r"(?i)^G[01]\s+"),
    ("homing", r"(?i)^G28"),
    ("positioning mode", r"(?i)^G9[01]"),
    ("set position", r"(?i)^G92"),
    ("hotend temperature", r"(?i)^M10[4-9]"),
    ("position report", r"(?i)^M11[45]"),
    ("bed temperature", r"(?i)^M1[89]0"),
    ("speed factor", r"(?i)^M220"),
    ("flow factor", r"(?i)^M221"),
    ("print control", r"(?i)^M[23][0-9]"),
];

fn passthrough_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(PASSTHROUGH_GRAMMARS.iter().map(|(_, p)| *p))
            .expect("passthrough patterns must compile")
    })
}

/// Name of the first passthrough grammar `command` belongs to, if any.
pub fn passthrough_grammar(command: &str) -> Option<&'static str> {
    passthrough_set()
        .matches(command)
        .iter()
        .next()
        .map(|idx| PASSTHROUGH_GRAMMARS[idx].0)
}
