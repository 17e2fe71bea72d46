//! LEDC PWM channel driving the fan.

use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::ledc::config::TimerConfig;
use esp_idf_hal::ledc::{LedcChannel as LedcChannelPeripheral, LedcDriver, LedcTimer, LedcTimerDriver, Resolution};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::units::Hertz;
use log::info;

use fanctl_core::{ChannelError, DutyChannel};

/// Fan PWM output on one LEDC channel with a dedicated timer.
pub struct LedcChannel {
    driver: LedcDriver<'static>,
}

impl LedcChannel {
    /// Configure an 8-bit channel at `frequency_hz`.
    pub fn new<T, C>(
        timer: impl Peripheral<P = T> + 'static,
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
        frequency_hz: u32,
    ) -> anyhow::Result<Self>
    where
        T: LedcTimer + 'static,
        C: LedcChannelPeripheral<SpeedMode = T::SpeedMode>,
    {
        let timer = LedcTimerDriver::new(
            timer,
            &TimerConfig::new()
                .frequency(Hertz(frequency_hz))
                .resolution(Resolution::Bits8),
        )?;
        let driver = LedcDriver::new(channel, timer, pin)?;
        info!(
            "Fan PWM at {} Hz, max duty {}",
            frequency_hz,
            driver.get_max_duty()
        );
        Ok(Self { driver })
    }
}

impl DutyChannel for LedcChannel {
    fn max_duty(&self) -> u32 {
        self.driver.get_max_duty()
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), ChannelError> {
        self.driver
            .set_duty(duty)
            .map_err(|e| ChannelError(e.to_string()))
    }
}
