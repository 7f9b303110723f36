//! Acquisition run: configuration sequence, poll loop and the encoder-driven
//! stop-condition policy.
//!
//! The sensor has no concept of a bounded scan job; it streams until told
//! otherwise. The only ground truth for "the sweep is finished" is the
//! physical encoder, so the loop watches the tick counter carried in every
//! scan telegram and stops on wraparound, sustained standstill or a direction
//! reversal.

use crate::base::{Error, Result};
use crate::protocol;
use crate::types::{Direction, Endpoint, Point3D, ScanConfig, ScanDataContent, ScanTelegram};
use crate::Lms4000Device;
use log::{info, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Half the 32-bit encoder counter range; a tick jump larger than this is a
/// wraparound, not genuine travel.
const ENCODER_HALF_RANGE: u32 = u32::MAX / 2;

/// Anything that yields decoded scan telegrams on demand.
///
/// `Lms4000Device` is the production source; tests drive the loop with
/// scripted sources.
pub trait ScanSource {
    /// Polls one scan telegram.
    fn poll_scan(&mut self) -> Result<ScanTelegram>;
}

/// Why a sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The encoder counter wrapped around its 32-bit range; the slab has moved
    /// past the counter's usable span.
    EncoderOverflow,

    /// The encoder stood still for the configured stationary window.
    MotionStopped,

    /// The slab reversed its travel direction and round trips were not requested.
    DirectionReversed,

    /// The caller raised the cancel flag.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EncoderOverflow => write!(f, "encoder counter wrapped"),
            StopReason::MotionStopped => write!(f, "encoder stationary past timeout"),
            StopReason::DirectionReversed => write!(f, "travel direction reversed"),
            StopReason::Cancelled => write!(f, "cancelled by caller"),
        }
    }
}

/// The accumulated result of one completed acquisition run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    /// The point cloud, in scan order. Write-once: handed off to the caller
    /// untouched after the run ends.
    pub points: Vec<Point3D>,

    /// The stop condition that ended the run.
    pub stop_reason: StopReason,
}

fn encoder_wrapped(previous: u32, current: u32) -> bool {
    if current < previous {
        previous - current > ENCODER_HALF_RANGE
    } else {
        current - previous > ENCODER_HALF_RANGE
    }
}

/// Per-poll direction and stop-condition state.
///
/// Fed the encoder reading of every poll; reports the stop condition that
/// fires first, in severity order: wraparound beats the direction logic
/// (which would misread it as a reversal), then the stationary timeout, then
/// the reversal check.
#[derive(Debug)]
pub struct SweepTracker {
    reverse_direction_allowed: bool,
    stationary_timeout: Duration,
    direction: Direction,
    previous_direction: Direction,
    last_motion: Option<Direction>,
    encoder_previous: u32,
    encoder_current: u32,
    idle_since: Instant,
}

impl SweepTracker {
    /// Creates a tracker at rest, with the encoder assumed reset to zero.
    pub fn new(config: &ScanConfig, now: Instant) -> SweepTracker {
        SweepTracker {
            reverse_direction_allowed: config.reverse_direction_allowed,
            stationary_timeout: config.stationary_timeout,
            direction: Direction::Stationary,
            previous_direction: Direction::Stationary,
            last_motion: None,
            encoder_previous: 0,
            encoder_current: 0,
            idle_since: now,
        }
    }

    /// Feeds one poll's encoder reading. Returns the stop condition that
    /// fired, if any; `None` means the sweep continues.
    pub fn update(&mut self, ticks: u32, now: Instant) -> Option<StopReason> {
        self.encoder_previous = self.encoder_current;
        self.encoder_current = ticks;
        self.previous_direction = self.direction;
        self.direction = if self.encoder_current > self.encoder_previous {
            Direction::Increasing
        } else if self.encoder_current < self.encoder_previous {
            Direction::Decreasing
        } else {
            Direction::Stationary
        };
        trace!(
            "Encoder {} -> {}, direction {:?} -> {:?}",
            self.encoder_previous,
            self.encoder_current,
            self.previous_direction,
            self.direction
        );

        if encoder_wrapped(self.encoder_previous, self.encoder_current) {
            return Some(StopReason::EncoderOverflow);
        }

        match self.direction {
            Direction::Stationary => {
                if now.duration_since(self.idle_since) >= self.stationary_timeout {
                    return Some(StopReason::MotionStopped);
                }
            }
            moving => {
                if !self.reverse_direction_allowed {
                    if let Some(last) = self.last_motion {
                        if last != moving {
                            return Some(StopReason::DirectionReversed);
                        }
                    }
                }
                self.last_motion = Some(moving);
                self.idle_since = now;
            }
        }

        None
    }

    /// Direction observed at the most recent poll.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Drives one acquisition run: connect, parameterize, poll until a stop
/// condition fires, hand off the accumulated cloud.
#[derive(Debug)]
pub struct AcquisitionController {
    endpoint: Endpoint,
    config: ScanConfig,
    cancel: Arc<AtomicBool>,
}

impl AcquisitionController {
    /// Creates a controller for one sensor and one run configuration.
    pub fn new(endpoint: Endpoint, config: ScanConfig) -> AcquisitionController {
        AcquisitionController {
            endpoint,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cooperative cancellation. Setting the flag stops the run at
    /// the next poll boundary, never mid-read, so the socket stays in sync.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs one full acquisition and returns the accumulated sweep.
    ///
    /// Uses the bounded connect policy so a truly absent sensor surfaces as
    /// `Error::ConnectionFail` instead of blocking forever. The connection is
    /// released on every exit path.
    pub fn run(&self) -> Result<Sweep> {
        let mut device = Lms4000Device::connect(self.endpoint.clone())?;

        if let Err(err) = self.configure(&mut device) {
            device.release();
            return Err(err);
        }

        let outcome = self.collect_sweep(&mut device);
        device.release();
        outcome
    }

    /// The parameterization sequence required before the sensor streams scan
    /// data: authorized-client login, scan content, output window, encoder
    /// reset so the Z axis starts at zero, and the logout back to Run level.
    fn configure(&self, device: &mut Lms4000Device) -> Result<()> {
        device.login()?;
        device.configure_scan_content(&ScanDataContent::default())?;
        device.configure_output_range(self.config.start_angle_deg, self.config.stop_angle_deg)?;
        device.reset_encoder()?;
        device.logout();
        info!("Sensor parameterization done");
        Ok(())
    }

    /// The measurement loop. Public so callers with a non-TCP source (replays,
    /// simulations) can reuse the stop-condition policy.
    ///
    /// The first poll is discarded: the first reading after reconfiguration
    /// reflects stale buffered data. Points of the stop-triggering poll are
    /// never appended.
    pub fn collect_sweep<S: ScanSource>(&self, source: &mut S) -> Result<Sweep> {
        let mut tracker = SweepTracker::new(&self.config, Instant::now());
        let mut points: Vec<Point3D> = Vec::new();

        source.poll_scan()?;
        trace!("Discarded stale first scan");

        let stop_reason = loop {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Acquisition stopped: {}", StopReason::Cancelled);
                break StopReason::Cancelled;
            }

            let telegram = source.poll_scan()?;
            if let Some(reason) = tracker.update(telegram.encoder_ticks, Instant::now()) {
                info!("Acquisition stopped: {}", reason);
                break reason;
            }

            points.extend(protocol::points_from_telegram(
                &telegram,
                self.config.encoder_resolution_mm,
            ));
            trace!("Accumulated {} points", points.len());

            thread::sleep(self.config.response_interval);
        };

        if points.is_empty() {
            warn!("Stop condition fired before any points were accumulated");
            return Err(Error::EmptyAcquisition);
        }

        info!("Sweep complete: {} points", points.len());
        Ok(Sweep {
            points,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn telegram(ticks: u32) -> ScanTelegram {
        ScanTelegram {
            start_angle_deg: 55.0,
            angle_step_deg: 0.3,
            distances: vec![1.0, 2.0],
            encoder_ticks: ticks,
        }
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            response_interval: Duration::ZERO,
            stationary_timeout: Duration::ZERO,
            ..ScanConfig::default()
        }
    }

    fn controller(config: ScanConfig) -> AcquisitionController {
        AcquisitionController::new(Endpoint::new("127.0.0.1", 2111), config)
    }

    /// Serves scripted telegrams; optionally raises a cancel flag after the
    /// n-th poll.
    struct FakeSource {
        telegrams: VecDeque<ScanTelegram>,
        served: usize,
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl FakeSource {
        fn new(ticks: &[u32]) -> FakeSource {
            FakeSource {
                telegrams: ticks.iter().map(|&t| telegram(t)).collect(),
                served: 0,
                cancel_after: None,
            }
        }
    }

    impl ScanSource for FakeSource {
        fn poll_scan(&mut self) -> Result<ScanTelegram> {
            let next = self.telegrams.pop_front().ok_or(Error::ProtocolIo {
                description: "script exhausted".to_owned(),
            })?;
            self.served += 1;
            if let Some((after, flag)) = &self.cancel_after {
                if self.served >= *after {
                    flag.store(true, Ordering::Relaxed);
                }
            }
            Ok(next)
        }
    }

    #[test]
    fn wraparound_is_not_a_reversal() {
        assert!(encoder_wrapped(0xFFFF_FFF0, 0x0000_0005));
        assert!(encoder_wrapped(0x0000_0005, 0xFFFF_FFF0));
        assert!(!encoder_wrapped(10, 20));
        assert!(!encoder_wrapped(20, 10));
        assert!(!encoder_wrapped(30, 30));
    }

    #[test]
    fn tracker_stops_on_forward_wrap_even_when_reversible() {
        let config = ScanConfig {
            reverse_direction_allowed: true,
            ..ScanConfig::default()
        };
        let t0 = Instant::now();
        let mut tracker = SweepTracker::new(&config, t0);
        assert_eq!(tracker.update(10, t0), None);
        assert_eq!(
            tracker.update(0xFFFF_FFF0, t0),
            Some(StopReason::EncoderOverflow)
        );
    }

    #[test]
    fn tracker_times_out_after_continuous_standstill() {
        let config = ScanConfig::default(); // 2 s window
        let t0 = Instant::now();
        let mut tracker = SweepTracker::new(&config, t0);

        assert_eq!(tracker.update(10, t0), None);
        assert_eq!(tracker.update(10, t0 + Duration::from_secs(1)), None);
        assert_eq!(
            tracker.update(10, t0 + Duration::from_secs(2)),
            Some(StopReason::MotionStopped)
        );
    }

    #[test]
    fn motion_resets_the_idle_window() {
        let config = ScanConfig::default();
        let t0 = Instant::now();
        let mut tracker = SweepTracker::new(&config, t0);

        assert_eq!(tracker.update(10, t0 + Duration::from_secs(1)), None);
        // moved at t0+1s, so standstill is only 1.5 s deep here
        assert_eq!(
            tracker.update(10, t0 + Duration::from_millis(2500)),
            None
        );
        assert_eq!(
            tracker.update(10, t0 + Duration::from_secs(4)),
            Some(StopReason::MotionStopped)
        );
    }

    #[test]
    fn reversal_stops_a_one_way_sweep() {
        let config = ScanConfig::default();
        let t0 = Instant::now();
        let mut tracker = SweepTracker::new(&config, t0);

        assert_eq!(tracker.update(10, t0), None);
        assert_eq!(tracker.update(20, t0), None);
        assert_eq!(tracker.update(15, t0), Some(StopReason::DirectionReversed));
    }

    #[test]
    fn reversal_is_remembered_across_a_stationary_gap() {
        let config = ScanConfig::default();
        let t0 = Instant::now();
        let mut tracker = SweepTracker::new(&config, t0);

        assert_eq!(tracker.update(10, t0), None);
        assert_eq!(tracker.update(10, t0), None);
        assert_eq!(tracker.update(5, t0), Some(StopReason::DirectionReversed));
    }

    #[test]
    fn reversal_is_allowed_for_round_trips() {
        let config = ScanConfig {
            reverse_direction_allowed: true,
            ..ScanConfig::default()
        };
        let t0 = Instant::now();
        let mut tracker = SweepTracker::new(&config, t0);

        assert_eq!(tracker.update(10, t0), None);
        assert_eq!(tracker.update(20, t0), None);
        assert_eq!(tracker.update(15, t0), None);
        assert_eq!(tracker.update(5, t0), None);
    }

    #[test]
    fn sweep_accumulates_until_standstill() {
        // first telegram is the stale-buffer discard; the final stationary
        // poll stops the run without contributing points
        let mut source = FakeSource::new(&[0, 5, 10, 20, 30, 30]);
        let sweep = controller(fast_config()).collect_sweep(&mut source).unwrap();

        assert_eq!(sweep.stop_reason, StopReason::MotionStopped);
        assert_eq!(sweep.points.len(), 4 * 2);
    }

    #[test]
    fn sweep_stops_at_first_reversal() {
        let mut source = FakeSource::new(&[0, 10, 20, 15]);
        let config = ScanConfig {
            response_interval: Duration::ZERO,
            ..ScanConfig::default()
        };
        let sweep = controller(config).collect_sweep(&mut source).unwrap();

        assert_eq!(sweep.stop_reason, StopReason::DirectionReversed);
        assert_eq!(sweep.points.len(), 2 * 2);
    }

    #[test]
    fn sweep_without_motion_is_an_error() {
        let mut source = FakeSource::new(&[0, 0]);
        let err = controller(fast_config())
            .collect_sweep(&mut source)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyAcquisition));
    }

    #[test]
    fn cancel_stops_at_the_next_poll_boundary() {
        let acquisition = controller(fast_config());
        let mut source = FakeSource::new(&[0, 5, 10]);
        source.cancel_after = Some((3, acquisition.cancel_flag()));

        let sweep = acquisition.collect_sweep(&mut source).unwrap();
        assert_eq!(sweep.stop_reason, StopReason::Cancelled);
        assert_eq!(sweep.points.len(), 2 * 2);
    }

    #[test]
    fn poll_failure_aborts_the_run() {
        let mut source = FakeSource::new(&[0, 5]);
        let err = controller(fast_config())
            .collect_sweep(&mut source)
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolIo { .. }));
    }
}
