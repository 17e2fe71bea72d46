//! Tachometer input and sampling timer.
//!
//! The tachometer pin raises a GPIO interrupt on every rising edge. The
//! handler is registered with the IDF ISR service directly: the HAL's
//! notification-based subscription disables the interrupt after each edge,
//! which would drop pulses between re-arms.

use std::ffi::c_void;
use std::sync::Arc;

use esp_idf_hal::gpio::InputPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_svc::sys::{
    esp, gpio_config, gpio_config_t, gpio_install_isr_service, gpio_int_type_t_GPIO_INTR_POSEDGE,
    gpio_isr_handler_add, gpio_isr_handler_remove, gpio_mode_t_GPIO_MODE_INPUT,
    gpio_pulldown_t_GPIO_PULLDOWN_ENABLE, gpio_pullup_t_GPIO_PULLUP_DISABLE, EspError,
    ESP_ERR_INVALID_STATE,
};
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};
use log::{debug, info};

use fanctl_core::SpeedSensor;

/// An installed tachometer interrupt. Dropping it removes the handler.
pub struct PulseInterrupt {
    pin: i32,
    // Referenced by the ISR argument pointer.
    _sensor: Arc<SpeedSensor>,
}

unsafe extern "C" fn on_pulse(arg: *mut c_void) {
    let sensor = &*(arg as *const SpeedSensor);
    sensor.record_pulse();
}

impl PulseInterrupt {
    /// Count rising edges on `pin` into `sensor`.
    pub fn attach<P: InputPin>(
        pin: impl Peripheral<P = P> + 'static,
        sensor: Arc<SpeedSensor>,
    ) -> Result<Self, EspError> {
        let pin = pin.into_ref().pin();

        let config = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
            ..Default::default()
        };
        esp!(unsafe { gpio_config(&config) })?;

        // Already installed by another driver is fine.
        let rc = unsafe { gpio_install_isr_service(0) };
        if rc != ESP_ERR_INVALID_STATE as i32 {
            esp!(rc)?;
        }

        let arg = Arc::as_ptr(&sensor) as *mut c_void;
        esp!(unsafe { gpio_isr_handler_add(pin, Some(on_pulse), arg) })?;
        info!("Tachometer interrupt on GPIO{}", pin);

        Ok(Self {
            pin,
            _sensor: sensor,
        })
    }
}

impl Drop for PulseInterrupt {
    fn drop(&mut self) {
        unsafe {
            gpio_isr_handler_remove(self.pin);
        }
    }
}

/// Close the sensor window every `sensor.window()` on the timer task.
pub fn start_sampler(
    timers: &EspTaskTimerService,
    sensor: Arc<SpeedSensor>,
) -> Result<EspTimer<'static>, EspError> {
    let window = sensor.window();
    let timer = {
        let sensor = sensor.clone();
        timers.timer(move || {
            let sample = sensor.sample();
            debug!("rpm = {} ({} pulses)", sensor.rpm(), sample.pulse_count);
        })?
    };
    timer.every(window)?;
    info!("Speed sampling every {} ms", window.as_millis());
    Ok(timer)
}
