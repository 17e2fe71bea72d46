//! Pulse-counting speed sensor.
//!
//! The tachometer interrupt calls [`SpeedSensor::record_pulse`] on every
//! rising edge; a periodic timer calls [`SpeedSensor::sample`] once per
//! window. The two sides share a single atomic counter:
//!
//! - interrupt: `fetch_add(1)`
//! - timer: `swap(0)`, read and clear in one operation
//!
//! Edges landing between the timer firing and the swap are counted in the
//! next window. The derived RPM is an atomic snapshot, so readers never block.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::model::SpeedSample;

/// Sampling window of the reference hardware.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3);

/// Edges per revolution of a standard PC fan tachometer.
pub const DEFAULT_PULSES_PER_REVOLUTION: u32 = 2;

#[derive(Debug)]
pub struct SpeedSensor {
    pulses: AtomicU32,
    rpm: AtomicU32,
    window: Duration,
    pulses_per_revolution: u32,
}

impl SpeedSensor {
    /// Create a sensor sampled every `window`. Zero values are raised to the
    /// smallest meaningful one (1 ms, 1 pulse per revolution).
    pub fn new(window: Duration, pulses_per_revolution: u32) -> Self {
        Self {
            pulses: AtomicU32::new(0),
            rpm: AtomicU32::new(0),
            window: window.max(Duration::from_millis(1)),
            pulses_per_revolution: pulses_per_revolution.max(1),
        }
    }

    /// Count one edge. Safe to call from interrupt context: a single atomic
    /// add, no allocation, no locking.
    #[inline]
    pub fn record_pulse(&self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the current window and publish its RPM.
    pub fn sample(&self) -> SpeedSample {
        let pulse_count = self.pulses.swap(0, Ordering::AcqRel);
        let sample = SpeedSample {
            pulse_count,
            window: self.window,
        };
        self.rpm
            .store(sample.rpm(self.pulses_per_revolution), Ordering::Release);
        sample
    }

    /// RPM of the last completed window.
    pub fn rpm(&self) -> u32 {
        self.rpm.load(Ordering::Acquire)
    }

    /// Edges counted so far in the open window.
    pub fn pending_pulses(&self) -> u32 {
        self.pulses.load(Ordering::Relaxed)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn pulses_per_revolution(&self) -> u32 {
        self.pulses_per_revolution
    }
}

impl Default for SpeedSensor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_PULSES_PER_REVOLUTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rpm_from_pulses() {
        let sensor = SpeedSensor::new(Duration::from_secs(3), 1);
        for _ in 0..40 {
            sensor.record_pulse();
        }
        let sample = sensor.sample();

        assert_eq!(sample.pulse_count, 40);
        assert_eq!(sensor.rpm(), 800);
        assert_eq!(sensor.pending_pulses(), 0);
    }

    #[test]
    fn test_reference_hardware_scaling() {
        // 3 s window, 2 pulses per revolution: rpm = count * 20 / 2
        let sensor = SpeedSensor::default();
        for _ in 0..150 {
            sensor.record_pulse();
        }
        sensor.sample();
        assert_eq!(sensor.rpm(), 1500);
    }

    #[test]
    fn test_empty_window_reads_zero() {
        let sensor = SpeedSensor::new(Duration::from_secs(3), 2);
        for _ in 0..10 {
            sensor.record_pulse();
        }
        sensor.sample();
        assert_eq!(sensor.rpm(), 100);

        sensor.sample();
        assert_eq!(sensor.rpm(), 0);
    }

    #[test]
    fn test_rpm_is_stable_between_samples() {
        let sensor = SpeedSensor::new(Duration::from_secs(1), 1);
        sensor.record_pulse();
        sensor.sample();
        sensor.record_pulse();
        sensor.record_pulse();

        // New edges do not affect the published value until the next window.
        assert_eq!(sensor.rpm(), 60);
        assert_eq!(sensor.pending_pulses(), 2);
    }

    #[test]
    fn test_sub_second_window() {
        let sensor = SpeedSensor::new(Duration::from_millis(500), 2);
        for _ in 0..25 {
            sensor.record_pulse();
        }
        sensor.sample();
        // 25 pulses / 0.5 s = 50 Hz = 3000 edges/min, 2 per rev
        assert_eq!(sensor.rpm(), 1500);
    }

    #[test]
    fn test_no_pulses_lost_across_threads() {
        let sensor = Arc::new(SpeedSensor::new(Duration::from_secs(1), 1));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let sensor = sensor.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        sensor.record_pulse();
                    }
                })
            })
            .collect();

        let mut total = 0u64;
        while writers.iter().any(|w| !w.is_finished()) {
            total += sensor.sample().pulse_count as u64;
        }
        for w in writers {
            w.join().unwrap();
        }
        total += sensor.sample().pulse_count as u64;

        assert_eq!(total, 40_000);
    }
}
