//! Commands the bridge answers itself, without the host.

/// A query answered locally by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalQuery {
    /// `M115`: firmware identification.
    FirmwareInfo,
    /// `M105`: temperature report.
    TemperatureQuery,
}

impl LocalQuery {
    /// Classifies a trimmed command line.
    ///
    /// Matching is a case-insensitive prefix test, so `m115` and `M105 T0`
    /// are both recognised.
    pub fn classify(command: &str) -> Option<Self> {
        if starts_with_ignore_case(command, "M115") {
            Some(LocalQuery::FirmwareInfo)
        } else if starts_with_ignore_case(command, "M105") {
            Some(LocalQuery::TemperatureQuery)
        } else {
            None
        }
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Identification line sent in reply to `M115`, before the `ok`.
///
/// The touchscreen firmware keys its feature set off `FIRMWARE_NAME`, so the
/// bridge reports itself as Klipper.
pub fn firmware_info_line(bridge_version: &str) -> String {
    format!(
        "FIRMWARE_NAME:Klipper FIRMWARE_VERSION:v0.11.0 PROTOCOL_VERSION:1.0 \
         MACHINE_TYPE:TFT_Bridge BRIDGE_VERSION:{bridge_version}"
    )
}
