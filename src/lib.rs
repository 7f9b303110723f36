//! # LMS4000 Driver
//!
//! `lms4000` is a driver for SICK LMS4000 series 2-D LiDAR sensors speaking the
//! CoLa A ASCII telegram protocol over TCP. It covers the configuration
//! handshake required before scanning, per-command access to the sensor, and an
//! acquisition loop that accumulates a 3-D point cloud of a slab moving under
//! the scan plane, using the sensor's encoder input as the travel axis.

extern crate byteorder;
extern crate log;

mod acquisition;
pub mod base;
mod cmds;
pub mod protocol;
pub mod types;

pub use crate::acquisition::{AcquisitionController, ScanSource, StopReason, Sweep, SweepTracker};
pub use crate::base::{Channel, Error, Result};
pub use crate::types::{
    Direction, Endpoint, Point3D, ScanCfg, ScanConfig, ScanDataContent, ScanTelegram,
};

use crate::cmds::*;
use log::{error, info, trace, warn};
use std::io;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Default per-read timeout on the sensor socket. The sensor answers a scan
/// poll within tens of milliseconds; the margin absorbs network jitter.
pub const LMS_DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bounded connect policy: 20 attempts, 0.5 s apart, so an absent
/// sensor surfaces as a failure within roughly ten seconds.
pub const LMS_DEFAULT_CONNECT_ATTEMPTS: u32 = 20;

/// Pause between connect attempts.
pub const LMS_DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Represents a connection to and the command interface of an LMS4000 sensor.
///
/// Owns the single TCP connection of a session. The CoLa A session is strictly
/// synchronous: every command completes its write-then-read cycle before the
/// next one is issued.
///
/// # Example
/// ```ignore
/// # use lms4000::{Endpoint, Lms4000Device};
/// # fn main() -> lms4000::Result<()> {
/// let mut device = Lms4000Device::connect(Endpoint::new("192.168.0.10", 2111))?;
/// device.login()?;
/// let cfg = device.read_scan_config()?;
/// device.logout();
/// device.release();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Lms4000Device {
    endpoint: Endpoint,
    channel: Option<Channel<TcpStream>>,
    read_timeout: Duration,
}

impl Lms4000Device {
    /// Connects to the sensor with the default bounded retry policy.
    pub fn connect(endpoint: Endpoint) -> Result<Lms4000Device> {
        Lms4000Device::connect_with_retry(
            endpoint,
            LMS_DEFAULT_CONNECT_ATTEMPTS,
            LMS_DEFAULT_CONNECT_BACKOFF,
        )
    }

    /// Connects with a caller-chosen retry budget.
    ///
    /// A large `attempts` value gives the patient wait-for-sensor behavior
    /// wanted on production lines where the sensor powers up late.
    pub fn connect_with_retry(
        endpoint: Endpoint,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Lms4000Device> {
        let mut device = Lms4000Device {
            endpoint,
            channel: None,
            read_timeout: LMS_DEFAULT_READ_TIMEOUT,
        };
        device.open(attempts.max(1), backoff)?;
        info!("Connected to LMS4000 at {}", device.endpoint);
        Ok(device)
    }

    fn open(&mut self, attempts: u32, backoff: Duration) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            trace!(
                "Connect attempt {}/{} to {}",
                attempt,
                attempts,
                self.endpoint
            );
            match Lms4000Device::open_stream(&self.endpoint, self.read_timeout) {
                Ok(stream) => {
                    self.channel = Some(Channel::new(Box::new(stream)));
                    return Ok(());
                }
                Err(err) => {
                    if attempt >= attempts {
                        error!(
                            "Giving up connecting to {} after {} attempts: {}",
                            self.endpoint, attempt, err
                        );
                        return Err(Error::ConnectionFail {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt, attempts, self.endpoint, err
                    );
                    thread::sleep(backoff);
                }
            }
        }
    }

    fn open_stream(endpoint: &Endpoint, read_timeout: Duration) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((endpoint.ip.as_str(), endpoint.port))?;
        stream.set_read_timeout(Some(read_timeout))?;
        Ok(stream)
    }

    /// Frames and writes `command`, reads the reply (up to `max_reply_len`
    /// bytes) and returns it with the frame bytes stripped.
    ///
    /// The sensor occasionally drops idle connections; a dropped-connection
    /// error triggers one reconnect-and-resend before the command fails with
    /// `Error::ProtocolIo`.
    pub fn send_command(&mut self, command: &str, max_reply_len: usize) -> Result<String> {
        let channel = self.channel.as_mut().ok_or_else(|| Error::ProtocolIo {
            description: "connection already released".to_owned(),
        })?;

        match channel.invoke(command, max_reply_len) {
            Ok(reply) => Ok(reply),
            Err(Error::IoError(err)) if connection_dropped(&err) => {
                warn!(
                    "Connection to {} dropped mid-command ({}); reconnecting once",
                    self.endpoint, err
                );
                self.channel = None;
                let stream = Lms4000Device::open_stream(&self.endpoint, self.read_timeout)
                    .map_err(|e| Error::ProtocolIo {
                        description: format!("reconnect failed: {}", e),
                    })?;
                let channel = self.channel.insert(Channel::new(Box::new(stream)));
                channel
                    .invoke(command, max_reply_len)
                    .map_err(|e| Error::ProtocolIo {
                        description: format!("re-send after reconnect failed: {}", e),
                    })
            }
            Err(Error::IoError(err)) => Err(Error::ProtocolIo {
                description: err.to_string(),
            }),
            Err(other) => Err(other),
        }
    }

    /// Logs in as "authorized client", the access level required for the
    /// configuration commands.
    pub fn login(&mut self) -> Result<()> {
        let reply = self.send_command(LMS_CMD_LOGIN, LMS_REPLY_LEN_SHORT)?;
        if status_token(&reply) == Some("1") {
            trace!("Logged in as authorized client");
            Ok(())
        } else {
            error!("Login rejected: {:?}", reply);
            Err(Error::AuthenticationRejected { response: reply })
        }
    }

    /// Returns the sensor to the Run user level.
    ///
    /// Runs during teardown, so a failure is logged rather than propagated; it
    /// must not mask the outcome of the run that is ending.
    pub fn logout(&mut self) {
        match self.send_command(LMS_CMD_RUN, LMS_REPLY_LEN_SHORT) {
            Ok(_) => trace!("Returned sensor to Run level"),
            Err(err) => warn!("Logout failed: {}", err),
        }
    }

    /// Configures which channels the scan telegram carries.
    pub fn configure_scan_content(&mut self, content: &ScanDataContent) -> Result<()> {
        let command = scan_data_cfg_command(content);
        self.expect_echo(&command, LMS_NAME_SCAN_DATA_CFG)
    }

    /// Restricts the angle window of the scan data output.
    pub fn configure_output_range(
        &mut self,
        start_angle_deg: i32,
        stop_angle_deg: i32,
    ) -> Result<()> {
        let command = output_range_command(start_angle_deg, stop_angle_deg);
        self.expect_echo(&command, LMS_NAME_OUTPUT_RANGE)
    }

    /// A `sWN` write is accepted when the reply echoes the command name.
    fn expect_echo(&mut self, command: &str, name: &str) -> Result<()> {
        let reply = self.send_command(command, LMS_REPLY_LEN_SHORT)?;
        if reply.split_whitespace().nth(LMS_REPLY_ECHO_TOKEN) == Some(name) {
            trace!("{} accepted", name);
            Ok(())
        } else {
            error!("{} not accepted: {:?}", name, reply);
            Err(Error::ConfigurationRejected {
                command: name.to_owned(),
                response: reply,
            })
        }
    }

    /// Resets the encoder tick counter so the acquisition's Z axis starts at
    /// zero. Must run after login and before the poll loop.
    pub fn reset_encoder(&mut self) -> Result<()> {
        let reply = self.send_command(LMS_CMD_RESET_ENCODER, LMS_REPLY_LEN_SHORT)?;
        if status_token(&reply) == Some("1") {
            trace!("Encoder counter reset");
            Ok(())
        } else {
            error!("Encoder reset not accepted: {:?}", reply);
            Err(Error::ConfigurationRejected {
                command: "LIDrstencoderinc".to_owned(),
                response: reply,
            })
        }
    }

    /// Reads the sensor's current scan configuration.
    ///
    /// For the LMS4000 the values are fixed by the hardware (600 Hz, one
    /// sector, 1/12 degree over 55..125), which makes this a useful
    /// connectivity and sanity probe.
    pub fn read_scan_config(&mut self) -> Result<ScanCfg> {
        let reply = self.send_command(LMS_CMD_READ_SCAN_CFG, LMS_REPLY_LEN_SHORT)?;
        let tokens: Vec<&str> = reply.split_whitespace().collect();
        if tokens.len() < 7 {
            return Err(Error::MalformedTelegram {
                description: format!("scan config reply truncated: {} tokens", tokens.len()),
            });
        }

        let frequency_hz = protocol::parse_hex_u32(tokens[2], "scan frequency")? as f64 / 100.0;
        let sector_count = tokens[3].parse::<u32>().map_err(|_| Error::MalformedTelegram {
            description: format!("sector count field is not decimal: {:?}", tokens[3]),
        })?;
        let angular_resolution_deg =
            protocol::parse_hex_u32(tokens[4], "angular resolution")? as f64 / 10000.0;
        let start_angle_deg = protocol::parse_hex_u32(tokens[5], "start angle")? as f64 / 10000.0;
        let stop_angle_deg = protocol::parse_hex_u32(tokens[6], "stop angle")? as f64 / 10000.0;

        Ok(ScanCfg {
            frequency_hz,
            sector_count,
            angular_resolution_deg,
            start_angle_deg,
            stop_angle_deg,
        })
    }

    /// Polls and decodes one scan telegram.
    pub fn poll_scan(&mut self) -> Result<ScanTelegram> {
        let reply = self.send_command(LMS_CMD_POLL_SCAN, LMS_REPLY_LEN_SCAN)?;
        let tokens: Vec<&str> = reply.split_whitespace().collect();
        protocol::decode_scan(&tokens)
    }

    /// Closes the connection. Idempotent and infallible; safe on every exit
    /// path including after errors.
    pub fn release(&mut self) {
        if self.channel.take().is_some() {
            info!("Connection to {} released", self.endpoint);
        }
    }
}

impl ScanSource for Lms4000Device {
    fn poll_scan(&mut self) -> Result<ScanTelegram> {
        Lms4000Device::poll_scan(self)
    }
}

fn status_token(reply: &str) -> Option<&str> {
    reply.split_whitespace().nth(LMS_REPLY_STATUS_TOKEN)
}

fn connection_dropped(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
