use std::fmt;
use std::time::Duration;

/// Network address of the sensor. Immutable once a device is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// IP address or host name of the sensor.
    pub ip: String,

    /// TCP port of the CoLa A interface (factory default 2111).
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint from an address and port.
    pub fn new(ip: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Caller-supplied parameters for one acquisition run. Read-only to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Start of the output angle window, in whole degrees.
    pub start_angle_deg: i32,

    /// End of the output angle window, in whole degrees.
    pub stop_angle_deg: i32,

    /// Linear travel per encoder tick, in millimeters.
    pub encoder_resolution_mm: f64,

    /// When `true`, a direction reversal does not end the sweep; the caller
    /// intends to capture round-trip passes.
    pub reverse_direction_allowed: bool,

    /// Pacing delay between polls, matching the sensor's documented response
    /// latency. Not a correctness requirement, but must not be skipped.
    pub response_interval: Duration,

    /// How long the encoder may stand still before the sweep is considered done.
    pub stationary_timeout: Duration,
}

impl Default for ScanConfig {
    /// LMS4000 defaults: the sensor's fixed 55°..125° window, 0.2 mm encoder
    /// ticks, single-pass sweeps, 50 ms pacing, 2 s stationary window.
    fn default() -> ScanConfig {
        ScanConfig {
            start_angle_deg: 55,
            stop_angle_deg: 125,
            encoder_resolution_mm: 0.2,
            reverse_direction_allowed: false,
            response_interval: Duration::from_millis(50),
            stationary_timeout: Duration::from_secs(2),
        }
    }
}

/// Selects which channels the scan telegram carries (`LMDscandatacfg`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDataContent {
    /// Include distance values in the output telegram.
    pub distance: bool,

    /// Further data channel selector: 0 = none, 1 = remission, 2 = angle,
    /// 3 = remission & angle, 4 = quality, up to 7 = all three.
    pub further_data: u8,

    /// Transmit encoder channel 1 data.
    pub encoder: bool,
}

impl Default for ScanDataContent {
    /// Distance plus angle data plus encoder channel 1, the content this
    /// driver's scan decoder expects.
    fn default() -> ScanDataContent {
        ScanDataContent {
            distance: true,
            further_data: 2,
            encoder: true,
        }
    }
}

/// One decoded `LMDscandata` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTelegram {
    /// Angle of the first sample, in degrees.
    pub start_angle_deg: f64,

    /// Angular distance between consecutive samples, in degrees.
    pub angle_step_deg: f64,

    /// Distance samples in meters, ordered by angle.
    pub distances: Vec<f64>,

    /// Encoder tick counter carried in the telegram's encoder block.
    pub encoder_ticks: u32,
}

/// Scan configuration reported by the sensor (`LMPscancfg`).
///
/// For the LMS4000 these are fixed by the hardware: 600 Hz, one sector,
/// 1/12° resolution over 55°..125°.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCfg {
    /// Scan frequency in Hz.
    pub frequency_hz: f64,

    /// Number of angular sectors.
    pub sector_count: u32,

    /// Angular resolution in degrees.
    pub angular_resolution_deg: f64,

    /// Start of the scan range, in degrees.
    pub start_angle_deg: f64,

    /// End of the scan range, in degrees.
    pub stop_angle_deg: f64,
}

/// A single point of the accumulated cloud, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    /// In-plane coordinate along the scan direction.
    pub x: f64,

    /// In-plane coordinate across the scan direction.
    pub y: f64,

    /// Linear travel axis, derived from the encoder position.
    pub z: f64,
}

/// Direction of encoder travel observed between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The counter did not change.
    Stationary,

    /// The counter grew.
    Increasing,

    /// The counter shrank.
    Decreasing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_displays_as_host_port() {
        let endpoint = Endpoint::new("192.168.0.10", 2111);
        assert_eq!(endpoint.to_string(), "192.168.0.10:2111");
    }

    #[test]
    fn scan_config_default_is_one_way() {
        let config = ScanConfig::default();
        assert!(!config.reverse_direction_allowed);
        assert_eq!(config.start_angle_deg, 55);
        assert_eq!(config.stop_angle_deg, 125);
    }
}
