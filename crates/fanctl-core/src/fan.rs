//! Actuator driver.
//!
//! Translates a commanded speed percentage into a PWM duty value and applies
//! it to a `DutyChannel`. The fan input is active-low: full duty means
//! minimum airflow, so the mapping is inverted:
//!
//! ```text
//! duty = max_duty × (100 − percent) / 100    (integer, truncating)
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::FanCommand;

/// Hue of the status indicator at 100 % speed.
const MAX_HUE: u32 = 240;

/// PWM channel failure.
#[derive(Debug, Clone, Error)]
#[error("PWM channel error: {0}")]
pub struct ChannelError(pub String);

/// A hardware PWM output.
pub trait DutyChannel: Send {
    /// Largest duty value the channel accepts.
    fn max_duty(&self) -> u32;

    /// Apply a duty value. Takes effect before the next PWM period.
    fn set_duty(&mut self, duty: u32) -> Result<(), ChannelError>;
}

/// Duty for a percentage command on a channel with `max_duty` resolution.
pub fn duty_for(percent: i64, max_duty: u32) -> u32 {
    let percent = FanCommand::clamped(percent).speed_percent() as u64;
    (max_duty as u64 * (100 - percent) / 100) as u32
}

/// Indicator hue for a percentage command, 0 (red) to 240 (blue).
pub fn indicator_hue(percent: i64) -> u16 {
    let percent = FanCommand::clamped(percent).speed_percent() as u32;
    (MAX_HUE * percent / 100) as u16
}

/// Status indicator driven alongside the fan.
pub trait Indicator: Send + Sync {
    fn set_hue(&self, hue: u16);
}

/// Indicator that only records and logs the hue.
#[derive(Debug, Default)]
pub struct LogIndicator {
    hue: AtomicU32,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last hue applied.
    pub fn hue(&self) -> u16 {
        self.hue.load(Ordering::Relaxed) as u16
    }
}

impl Indicator for LogIndicator {
    fn set_hue(&self, hue: u16) {
        self.hue.store(hue as u32, Ordering::Relaxed);
        debug!("Indicator hue = {}", hue);
    }
}

/// Channel with no hardware behind it. The duty is readable through a
/// shared handle, which makes it usable both in simulations and tests.
#[derive(Debug, Clone)]
pub struct VirtualChannel {
    max_duty: u32,
    duty: Arc<AtomicU32>,
}

impl VirtualChannel {
    pub fn new(max_duty: u32) -> Self {
        Self {
            max_duty,
            duty: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Handle observing the duty currently applied.
    pub fn duty_handle(&self) -> Arc<AtomicU32> {
        self.duty.clone()
    }
}

impl DutyChannel for VirtualChannel {
    fn max_duty(&self) -> u32 {
        self.max_duty
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), ChannelError> {
        if duty > self.max_duty {
            return Err(ChannelError(format!(
                "duty {} exceeds maximum {}",
                duty, self.max_duty
            )));
        }
        self.duty.store(duty, Ordering::Relaxed);
        Ok(())
    }
}

/// Fire-and-forget fan driver.
pub struct FanDriver {
    channel: Mutex<Box<dyn DutyChannel>>,
    max_duty: u32,
    applied_duty: AtomicU32,
}

impl FanDriver {
    pub fn new(channel: impl DutyChannel + 'static) -> Self {
        let max_duty = channel.max_duty();
        Self {
            channel: Mutex::new(Box::new(channel)),
            max_duty,
            applied_duty: AtomicU32::new(0),
        }
    }

    pub fn max_duty(&self) -> u32 {
        self.max_duty
    }

    /// Clamp `percent`, compute the inverted duty and apply it.
    ///
    /// Channel failures are logged and absorbed. Returns the duty written.
    pub fn set_speed(&self, percent: i64) -> u32 {
        let command = FanCommand::clamped(percent);
        let duty = duty_for(command.speed_percent() as i64, self.max_duty);

        let mut channel = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        match channel.set_duty(duty) {
            Ok(()) => {
                self.applied_duty.store(duty, Ordering::Relaxed);
                info!(
                    "Fan speed {}% -> duty {}/{}",
                    command.speed_percent(),
                    duty,
                    self.max_duty
                );
            }
            Err(e) => warn!("Failed to apply fan duty {}: {}", duty, e),
        }
        duty
    }

    /// Duty most recently accepted by the channel.
    pub fn applied_duty(&self) -> u32 {
        self.applied_duty.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingChannel;

    impl DutyChannel for FailingChannel {
        fn max_duty(&self) -> u32 {
            255
        }

        fn set_duty(&mut self, _duty: u32) -> Result<(), ChannelError> {
            Err(ChannelError("LEDC not configured".to_string()))
        }
    }

    #[test]
    fn test_duty_is_inverted() {
        assert_eq!(duty_for(0, 255), 255);
        assert_eq!(duty_for(100, 255), 0);
        assert_eq!(duty_for(50, 255), 127);
        // 255 * 67 / 100 = 170.85, truncated
        assert_eq!(duty_for(33, 255), 170);
    }

    #[test]
    fn test_duty_matches_formula_for_every_percent() {
        for max_duty in [255u32, 1023, 8191] {
            for percent in 0..=100i64 {
                let expected = max_duty as u64 * (100 - percent as u64) / 100;
                assert_eq!(duty_for(percent, max_duty) as u64, expected);
            }
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(duty_for(-5, 255), 255);
        assert_eq!(duty_for(101, 255), 0);
        assert_eq!(duty_for(i64::MIN, 1023), 1023);
    }

    #[test]
    fn test_driver_applies_to_channel() {
        let channel = VirtualChannel::new(255);
        let duty = channel.duty_handle();
        let driver = FanDriver::new(channel);

        assert_eq!(driver.set_speed(33), 170);
        assert_eq!(duty.load(Ordering::Relaxed), 170);
        assert_eq!(driver.applied_duty(), 170);

        // Idempotent re-application.
        assert_eq!(driver.set_speed(33), 170);
        assert_eq!(duty.load(Ordering::Relaxed), 170);

        driver.set_speed(400);
        assert_eq!(duty.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_driver_absorbs_channel_errors() {
        let driver = FanDriver::new(FailingChannel);
        assert_eq!(driver.set_speed(50), 127);
        assert_eq!(driver.applied_duty(), 0);
    }

    #[test]
    fn test_indicator_hue() {
        assert_eq!(indicator_hue(0), 0);
        assert_eq!(indicator_hue(50), 120);
        assert_eq!(indicator_hue(100), 240);
        assert_eq!(indicator_hue(150), 240);

        let indicator = LogIndicator::new();
        indicator.set_hue(indicator_hue(25));
        assert_eq!(indicator.hue(), 60);
    }
}
