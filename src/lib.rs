//! DMA driven SD card driver for the STM32H7 SDMMC peripheral
//!
//! The driver identifies the card, switches it to a wide bus and moves
//! 512 byte blocks with the peripheral's internal DMA. Transfers finish in
//! the background; the SDMMC interrupt calls [`sdio::Sdmmc::on_interrupt`]
//! and the application polls `check_read`/`check_write`.
//!
//! ```ignore
//! use core::cell::RefCell;
//! use critical_section::Mutex;
//! use h7_sdmmc::peripheral::{Controller, Mmio};
//! use h7_sdmmc::sdio::{Sdmmc, SdmmcConfig};
//! use h7_sdmmc::time::DwtClock;
//!
//! static SD: Mutex<RefCell<Option<Sdmmc<Mmio, DwtClock>>>> = Mutex::new(RefCell::new(None));
//!
//! let mut sd = Sdmmc::new(
//!     unsafe { Mmio::new(Controller::Sdmmc1) },
//!     DwtClock::new(480_000_000),
//!     SdmmcConfig::default(),
//! );
//! sd.initialize_ll(Controller::Sdmmc1, &mut board);
//! sd.init(4)?;
//! critical_section::with(|cs| SD.borrow(cs).replace(Some(sd)));
//!
//! #[interrupt]
//! fn SDMMC1() {
//!     critical_section::with(|cs| {
//!         if let Some(sd) = SD.borrow(cs).borrow().as_ref() {
//!             sd.on_interrupt();
//!         }
//!     });
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod errors;
pub mod peripheral;
pub mod platform;
pub mod registers;
pub mod sdio;
pub mod stream;
pub mod time;
pub mod transfer;

#[cfg(test)]
mod sim;

pub use errors::SdError;
pub use sdio::{BusWidth, Sdmmc, SdmmcConfig};
pub use stream::{BlockDevice, BlockStream};
