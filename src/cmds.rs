//! CoLa A command vocabulary used by this driver. Command strings and token
//! layouts follow the SICK telegram listing for the LMS4000.

use crate::protocol::angle_to_hex_fixed;
use crate::types::ScanDataContent;

// Method commands (sMN), replied to with a status flag

/// Logs in as "authorized client", the access level required for `sWN` writes.
/// The trailing field is the fixed password hash for that level.
pub const LMS_CMD_LOGIN: &str = "sMN SetAccessMode 03 F4724744";

/// Returns the sensor to the Run user level, ending the authorized-client
/// session. The sensor only streams scan data under a normal session.
pub const LMS_CMD_RUN: &str = "sMN Run";

/// Resets the encoder tick counter to zero so a sweep starts its Z axis at 0.
pub const LMS_CMD_RESET_ENCODER: &str = "sMN LIDrstencoderinc";

// Read commands (sRN)

/// Requests the sensor's current scan configuration (frequency, sectors,
/// angular resolution, angle window).
pub const LMS_CMD_READ_SCAN_CFG: &str = "sRN LMPscancfg";

/// Polls one scan data telegram.
pub const LMS_CMD_POLL_SCAN: &str = "sRN LMDscandata";

// Write commands (sWN), replied to with an echo of the command name

/// Command name echoed in the `LMDscandatacfg` reply.
pub const LMS_NAME_SCAN_DATA_CFG: &str = "LMDscandatacfg";

/// Command name echoed in the `LMPoutputRange` reply.
pub const LMS_NAME_OUTPUT_RANGE: &str = "LMPoutputRange";

// Reply layout

/// Reply buffer size for every command except the scan poll.
pub const LMS_REPLY_LEN_SHORT: usize = 128;

/// Reply buffer size for the scan poll; a telegram can carry hundreds of samples.
pub const LMS_REPLY_LEN_SCAN: usize = 10240;

/// Token index of the status flag in login/encoder-reset replies ("1" = accepted).
pub const LMS_REPLY_STATUS_TOKEN: usize = 2;

/// Token index of the echoed command name in `sWN` replies.
pub const LMS_REPLY_ECHO_TOKEN: usize = 1;

/// Builds the `LMDscandatacfg` command configuring which channels the scan
/// telegram carries: the distance data channel, a further-data selector
/// (0 = none .. 7 = remission, angle and quality) and encoder channel 1.
pub fn scan_data_cfg_command(content: &ScanDataContent) -> String {
    let distance = if content.distance { "01" } else { "00" };
    let encoder = if content.encoder { "01" } else { "00" };
    format!(
        "sWN {} {} 00 {} 1 0 {} 00 0 0 0 0 +1",
        LMS_NAME_SCAN_DATA_CFG, distance, content.further_data, encoder
    )
}

/// Builds the `LMPoutputRange` command restricting the angle window of the
/// scan data output. This shapes the output only, not the sensor's scan.
pub fn output_range_command(start_angle_deg: i32, stop_angle_deg: i32) -> String {
    format!(
        "sWN {} 1 341 {} {}",
        LMS_NAME_OUTPUT_RANGE,
        angle_to_hex_fixed(start_angle_deg as f64),
        angle_to_hex_fixed(stop_angle_deg as f64)
    )
}
