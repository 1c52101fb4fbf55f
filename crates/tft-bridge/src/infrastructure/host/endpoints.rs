//! Host control API endpoints, relative to `http://host:port`.

pub const GCODE_SCRIPT: &str = "/printer/gcode/script";
pub const STATUS_QUERY: &str = "/printer/objects/query?extruder&heater_bed&fan&toolhead&print_stats";
pub const PRINTER_INFO: &str = "/printer/info";
pub const CONFIG_QUERY: &str = "/printer/objects/query?configfile";
pub const PRINT_START: &str = "/printer/print/start";
pub const PRINT_PAUSE: &str = "/printer/print/pause";
pub const PRINT_RESUME: &str = "/printer/print/resume";
pub const PRINT_CANCEL: &str = "/printer/print/cancel";
