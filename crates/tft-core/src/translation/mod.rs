//! Touchscreen command to host command translation.
//!
//! [`translate_with_macros`] is the pure decision function.  It is given the
//! set of macros known to exist on the host; fetching that set is the job of
//! the bridge's translation engine.
//!
//! Resolution order for a trimmed command:
//!
//! ```text
//! 1. bare M701 / M702     → host filament macro, or the TFT_ fallback
//! 2. translation table    → first matching rule (rules.rs)
//! 3. M115 / M105          → None (answered locally upstream)
//! 4. passthrough grammar  → the command, unchanged
//! 5. anything else        → None
//! ```

pub mod macros;
pub mod rules;

use std::collections::BTreeSet;

use tracing::{debug, warn};

pub use macros::{categorize_macros, extract_macro_names, MacroCategory, IMPORTANT_MACROS};
pub use rules::{passthrough_grammar, translation_rules, RuleAction, TranslationRule};

use crate::protocol::command::LocalQuery;

/// Macro-aware commands: (command, host macro, fallback when absent).
const FILAMENT_COMMANDS: [(&str, &str, &str); 2] = [
    ("M701", "LOAD_FILAMENT", "TFT_LOAD_FILAMENT"),
    ("M702", "UNLOAD_FILAMENT", "TFT_UNLOAD_FILAMENT"),
];

/// Translates one touchscreen command into host command text.
///
/// `macros` holds the uppercase macro names the host is known to define.
/// Returns `None` when the command has no host equivalent; the caller still
/// acknowledges it.
///
/// ```rust
/// use std::collections::BTreeSet;
/// use tft_core::translate_with_macros;
///
/// let none = BTreeSet::new();
/// assert_eq!(translate_with_macros("M701", &none).as_deref(), Some("TFT_LOAD_FILAMENT"));
/// assert_eq!(translate_with_macros("G28", &none).as_deref(), Some("G28"));
/// assert_eq!(translate_with_macros("M105", &none), None);
/// ```
pub fn translate_with_macros(command: &str, macros: &BTreeSet<String>) -> Option<String> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }

    for (code, macro_name, fallback) in FILAMENT_COMMANDS {
        if command.eq_ignore_ascii_case(code) {
            if macros.contains(macro_name) {
                debug!("using host macro {} for {}", macro_name, code);
                return Some(macro_name.to_string());
            }
            warn!("no {} macro on host, using {}", macro_name, fallback);
            return Some(fallback.to_string());
        }
    }

    if let Some(translated) = translation_rules().iter().find_map(|rule| rule.apply(command)) {
        return Some(translated);
    }

    if LocalQuery::classify(command).is_some() {
        return None;
    }

    if let Some(grammar) = passthrough_grammar(command) {
        debug!("passing through {} command: {}", grammar, command);
        return Some(command.to_string());
    }

    debug!("no translation for: {}", command);
    None
}
