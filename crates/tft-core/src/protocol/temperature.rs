//! Temperature replies built from a host status document.

use serde_json::Value;

/// Reply sent when no status is available.
pub const TEMPERATURE_FALLBACK: &str = "ok T:0.0 /0.0 B:0.0 /0.0";

/// Formats `ok T:<temp> /<target> B:<temp> /<target>` from a status response.
///
/// Expects the shape returned by the host's object query:
/// `{"result": {"status": {"extruder": {...}, "heater_bed": {...}}}}`.  A
/// heater missing from the status is left out of the reply; a missing reading
/// inside a present heater is reported as `0.0`.  Returns
/// [`TEMPERATURE_FALLBACK`] when neither heater is present.
pub fn format_temperature_report(status: &Value) -> String {
    let Some(objects) = status.pointer("/result/status").and_then(Value::as_object) else {
        return TEMPERATURE_FALLBACK.to_string();
    };

    let mut parts = Vec::with_capacity(2);
    if let Some(ext) = objects.get("extruder") {
        parts.push(format!("T:{:.1} /{:.1}", reading(ext, "temperature"), reading(ext, "target")));
    }
    if let Some(bed) = objects.get("heater_bed") {
        parts.push(format!("B:{:.1} /{:.1}", reading(bed, "temperature"), reading(bed, "target")));
    }

    if parts.is_empty() {
        TEMPERATURE_FALLBACK.to_string()
    } else {
        format!("ok {}", parts.join(" "))
    }
}

fn reading(heater: &Value, key: &str) -> f64 {
    heater.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}
