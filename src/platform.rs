//! Board collaborators the driver needs but does not own: reset/clock/pin
//! sequencing, data cache maintenance and the card detect pin.

use crate::peripheral::Controller;
use crate::sdio::BusWidth;
use core::convert::Infallible;
use embedded_hal::digital::v2::InputPin;

/// Clock, reset, pin and interrupt controller setup for one SDMMC instance
pub trait ControllerSetup {
    /// Hold the peripheral in reset
    fn assert_reset(&mut self, controller: Controller);
    /// Release the peripheral from reset
    fn release_reset(&mut self, controller: Controller);
    /// Enable the peripheral bus clock
    fn enable_clock(&mut self, controller: Controller);
    /// Switch the CLK, CMD and data pins to the SDMMC alternate function.
    /// DAT1-DAT3 are only needed for a 4-bit bus.
    fn configure_pins(&mut self, controller: Controller, width: BusWidth);
    /// Set the interrupt priority and unmask the controller's interrupt
    fn enable_interrupt(&mut self, controller: Controller);
}

/// D-cache maintenance by address range, used around IDMA buffers
pub trait CacheMaintenance {
    /// Write dirty lines back to memory before the IDMA reads them
    fn clean(&self, address: usize, len: usize);
    /// Drop cached lines after the IDMA wrote memory
    fn invalidate(&self, address: usize, len: usize);
}

/// For cores without a data cache, or buffers in non-cacheable memory
#[derive(Default, Clone, Copy)]
pub struct NoCacheMaintenance;

impl CacheMaintenance for NoCacheMaintenance {
    fn clean(&self, _address: usize, _len: usize) {}

    fn invalidate(&self, _address: usize, _len: usize) {}
}

/// Cortex-M7 data cache, maintained through the SCB
#[cfg(feature = "cache-maintenance")]
#[derive(Default, Clone, Copy)]
pub struct ScbCache;

#[cfg(feature = "cache-maintenance")]
impl ScbCache {
    const LINE: usize = 32;

    fn aligned(address: usize, len: usize) -> (usize, usize) {
        let start = address & !(Self::LINE - 1);
        (start, len + (address - start))
    }
}

#[cfg(feature = "cache-maintenance")]
impl CacheMaintenance for ScbCache {
    fn clean(&self, address: usize, len: usize) {
        use cortex_m::peripheral::SCB;

        if SCB::dcache_enabled() {
            let (start, len) = Self::aligned(address, len);
            // SAFETY: cache maintenance only touches SCB write-only registers
            let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
            scb.clean_dcache_by_address(start, len);
        }
    }

    fn invalidate(&self, address: usize, len: usize) {
        use cortex_m::peripheral::SCB;

        if SCB::dcache_enabled() {
            let (start, len) = Self::aligned(address, len);
            // SAFETY: the range covers a DMA buffer nobody wrote through the
            // cache while the transfer ran
            unsafe {
                let mut scb = cortex_m::Peripherals::steal().SCB;
                scb.invalidate_dcache_by_address(start, len);
            }
        }
    }
}

/// Stand-in detect pin for boards without one; the card always reads present
#[derive(Default, Clone, Copy)]
pub struct AlwaysPresent;

impl InputPin for AlwaysPresent {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Returns true if the (active low) detect pin reports a card
pub fn card_present<P: InputPin>(pin: &P) -> bool {
    // A pin that cannot be read is treated as a card being present, the
    // first command will fail if there is none
    pin.is_low().unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pin(bool);

    impl InputPin for Pin {
        type Error = ();

        fn is_high(&self) -> Result<bool, ()> {
            Ok(self.0)
        }

        fn is_low(&self) -> Result<bool, ()> {
            Ok(!self.0)
        }
    }

    #[test]
    fn detect_pin_is_active_low() {
        assert!(card_present(&Pin(false)));
        assert!(!card_present(&Pin(true)));
        assert!(card_present(&AlwaysPresent));
    }
}
