//! DMA block transfers, interrupt completion and abort

use crate::errors::SdError;
use crate::peripheral::*;
use crate::platform::CacheMaintenance;
use crate::registers::CardType;
use crate::sdio::{SdCmd, Sdmmc, SD_BLOCK_LEN, SD_BLOCK_WORDS};
use crate::time::{Clock, Deadline};
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use critical_section::Mutex;
use embedded_hal::digital::v2::InputPin;
use log::{debug, warn};

/// Attempts at the read/write command before a transfer is given up
const TRANSFER_RETRIES: u32 = 10;

/// DLEN is 25 bits wide
const MAX_TRANSFER_BLOCKS: u32 = 0x01FF_FFFF / SD_BLOCK_LEN as u32;

const OP_MULTI_BLOCK: u8 = 1 << 0;
const OP_WRITE: u8 = 1 << 1;

/// State shared between the caller and the interrupt handler
///
/// The busy flags are set by `read_blocks`/`write_blocks` and cleared by the
/// interrupt handler on success or by an abort. The controller has one data
/// path, so at most one of them is set at a time and the error slot belongs
/// to that transfer. The slot is written by the handler and cleared by an
/// abort.
pub(crate) struct TransferState {
    operation: AtomicU8,
    complete: AtomicBool,
    rx_busy: AtomicBool,
    tx_busy: AtomicBool,
    error: Mutex<Cell<Option<SdError>>>,
}

impl TransferState {
    pub(crate) const fn new() -> Self {
        Self {
            operation: AtomicU8::new(0),
            complete: AtomicBool::new(false),
            rx_busy: AtomicBool::new(false),
            tx_busy: AtomicBool::new(false),
            error: Mutex::new(Cell::new(None)),
        }
    }

    pub(crate) fn reset(&self) {
        self.operation.store(0, Ordering::Relaxed);
        self.complete.store(false, Ordering::Relaxed);
        self.rx_busy.store(false, Ordering::Relaxed);
        self.tx_busy.store(false, Ordering::Relaxed);
        self.set_error(None);
    }

    fn begin(&self, write: bool, multi_block: bool) {
        let mut operation = 0;
        if multi_block {
            operation |= OP_MULTI_BLOCK;
        }
        if write {
            operation |= OP_WRITE;
        }

        self.operation.store(operation, Ordering::Relaxed);
        self.complete.store(false, Ordering::Relaxed);
        self.set_error(None);
    }

    /// Mark a transfer in `write` direction outstanding, unless one in
    /// either direction already is
    fn claim(&self, write: bool) -> bool {
        critical_section::with(|_| {
            if self.rx_busy.load(Ordering::Acquire) || self.tx_busy.load(Ordering::Acquire) {
                return false;
            }

            self.busy(write).store(true, Ordering::Release);
            true
        })
    }

    /// Drop the outstanding transfer and its recorded error
    fn release(&self) {
        self.rx_busy.store(false, Ordering::Release);
        self.tx_busy.store(false, Ordering::Release);
        self.set_error(None);
    }

    fn busy(&self, write: bool) -> &AtomicBool {
        if write {
            &self.tx_busy
        } else {
            &self.rx_busy
        }
    }

    fn error(&self) -> Option<SdError> {
        critical_section::with(|cs| self.error.borrow(cs).get())
    }

    fn set_error(&self, error: Option<SdError>) {
        critical_section::with(|cs| self.error.borrow(cs).set(error));
    }
}

/// Map the data path error flags to an error, in priority order
fn data_error(status: u32) -> Option<SdError> {
    if (status & STA_IDMATE) != 0 {
        Some(SdError::IdmaError {})
    } else if (status & STA_DCRCFAIL) != 0 {
        Some(SdError::DataCrcFail {})
    } else if (status & STA_DTIMEOUT) != 0 {
        Some(SdError::DataTimeout {})
    } else if (status & STA_RXOVERR) != 0 {
        Some(SdError::RxOverrun {})
    } else if (status & STA_TXUNDERR) != 0 {
        Some(SdError::TxUnderrun {})
    } else {
        None
    }
}

impl<R, C, P, K> Sdmmc<R, C, P, K>
where
    R: SdmmcRegisters,
    C: Clock,
    P: InputPin,
    K: CacheMaintenance,
{
    /// Start reading `num_blocks` blocks at block `address` into `buffer`.
    ///
    /// Returns once the card accepted the command; the data arrives in the
    /// background. Poll [`Self::check_read`] until it stops returning `Busy`.
    ///
    /// # Safety
    /// The IDMA writes into `buffer` after this call returns. The buffer must
    /// not be accessed, moved or dropped until `check_read` stopped returning
    /// `Busy` or [`Self::abort`] ran.
    pub unsafe fn read_blocks(
        &self,
        address: u64,
        buffer: &mut [u32],
        block_size: u32,
        num_blocks: u32,
    ) -> Result<(), SdError> {
        self.start_transfer(
            false,
            address,
            buffer.as_ptr() as usize,
            buffer.len(),
            block_size,
            num_blocks,
        )
    }

    /// Start writing `num_blocks` blocks from `buffer` to block `address`.
    ///
    /// # Safety
    /// The IDMA reads `buffer` after this call returns. The buffer must not
    /// be modified, moved or dropped until `check_write` stopped returning
    /// `Busy` or [`Self::abort`] ran.
    pub unsafe fn write_blocks(
        &self,
        address: u64,
        buffer: &[u32],
        block_size: u32,
        num_blocks: u32,
    ) -> Result<(), SdError> {
        self.start_transfer(
            true,
            address,
            buffer.as_ptr() as usize,
            buffer.len(),
            block_size,
            num_blocks,
        )
    }

    fn start_transfer(
        &self,
        write: bool,
        address: u64,
        buffer: usize,
        words: usize,
        block_size: u32,
        num_blocks: u32,
    ) -> Result<(), SdError> {
        self.check_buffer(buffer, words, block_size, num_blocks)?;
        let address = self.card_address(address)?;

        if !self.transfer.claim(write) {
            return Err(SdError::Busy {});
        }
        let busy = self.transfer.busy(write);

        if let Err(e) = self.send_command(SdCmd::SetBlockLen(block_size)) {
            busy.store(false, Ordering::Release);
            return Err(e);
        }

        self.start_block_transfer(write, num_blocks);

        self.regs.set_bits(Reg::Cmd, CMD_CMDTRANS);
        self.regs.set_bits(Reg::IdmaCtrl, IDMA_IDMAEN);
        self.regs.write(Reg::IdmaBase0, buffer as u32);

        if write {
            self.cache.clean(buffer, num_blocks as usize * SD_BLOCK_LEN);
        }

        let command = match (write, num_blocks > 1) {
            (false, false) => SdCmd::ReadSingleBlock(address),
            (false, true) => SdCmd::ReadMultipleBlock(address),
            (true, false) => SdCmd::WriteBlock(address),
            (true, true) => SdCmd::WriteMultipleBlock(address),
        };

        if let Err(e) = self.send_with_retries(command) {
            self.disarm();
            busy.store(false, Ordering::Release);
            return Err(e);
        }

        Ok(())
    }

    fn check_buffer(
        &self,
        buffer: usize,
        words: usize,
        block_size: u32,
        num_blocks: u32,
    ) -> Result<(), SdError> {
        if block_size as usize != SD_BLOCK_LEN
            || num_blocks == 0
            || num_blocks > MAX_TRANSFER_BLOCKS
            || words < num_blocks as usize * SD_BLOCK_WORDS
        {
            return Err(SdError::InvalidParameter {});
        }

        if let Some(region) = &self.config.dma_region {
            let end = buffer
                .checked_add(num_blocks as usize * SD_BLOCK_LEN)
                .ok_or(SdError::InvalidParameter {})?;
            if buffer < region.start || end > region.end {
                return Err(SdError::InvalidParameter {});
            }
        }

        Ok(())
    }

    /// Standard capacity cards are byte addressed
    fn card_address(&self, block: u64) -> Result<u32, SdError> {
        let address = if self.card_type == CardType::HighCapacity {
            Some(block)
        } else {
            block.checked_mul(SD_BLOCK_LEN as u64)
        };

        address
            .and_then(|address| u32::try_from(address).ok())
            .ok_or(SdError::InvalidParameter {})
    }

    /// Arm the DPSM and the transfer interrupts for a DMA transfer
    fn start_block_transfer(&self, write: bool, num_blocks: u32) {
        self.regs.write(Reg::DCtrl, 0);
        self.transfer.begin(write, num_blocks > 1);

        self.regs.write(Reg::Mask, 0);
        self.regs.write(Reg::DTimer, self.config.data_timer);
        self.regs
            .write(Reg::DLen, num_blocks * SD_BLOCK_LEN as u32);
        self.regs.write(Reg::Icr, STA_IDMABTC | STA_IDMATE);

        if write {
            self.regs.write(Reg::DCtrl, DCTRL_DBLOCKSIZE_512B);
            self.regs.write(
                Reg::Mask,
                MASK_DCRCFAILIE | MASK_DTIMEOUTIE | MASK_TXUNDERRIE | MASK_DATAENDIE,
            );
        } else {
            self.regs
                .write(Reg::DCtrl, DCTRL_DBLOCKSIZE_512B | DCTRL_DTDIR);
            self.regs.write(
                Reg::Mask,
                MASK_DCRCFAILIE | MASK_DTIMEOUTIE | MASK_DATAENDIE | MASK_RXOVERRIE,
            );
        }
    }

    /// Send a read/write command, probing the card with CMD55 between tries
    fn send_with_retries(&self, command: SdCmd) -> Result<(), SdError> {
        let mut attempt = 0;

        loop {
            let error = match self.send_command(command) {
                Ok(_) => return Ok(()),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= TRANSFER_RETRIES {
                debug!(
                    "SDMMC: CMD{} failed {} times, giving up",
                    command.index(),
                    attempt
                );
                return Err(error);
            }

            // Only wakes the card up, the command is sent again regardless
            let _ = self.send_command(SdCmd::AppCmd(0));
        }
    }

    /// Stop the data path and the IDMA and mask the transfer interrupts
    fn disarm(&self) {
        self.regs.clear_bits(Reg::Mask, MASK_TRANSFER);
        self.regs.clear_bits(Reg::Cmd, CMD_CMDTRANS);
        self.regs.clear_bits(Reg::IdmaCtrl, IDMA_IDMAEN);
        self.regs.write(Reg::DCtrl, 0);
        self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);
    }

    /// Service the controller's interrupt. Call this from the SDMMC1 or
    /// SDMMC2 interrupt handler.
    pub fn on_interrupt(&self) {
        let status = self.regs.read(Reg::Sta);

        self.regs.clear_bits(Reg::Mask, MASK_TRANSFER);

        if (status & STA_DATAEND) != 0 {
            self.regs.clear_bits(Reg::Cmd, CMD_CMDTRANS);
            self.regs.clear_bits(Reg::IdmaCtrl, IDMA_IDMAEN);

            let operation = self.transfer.operation.load(Ordering::Relaxed);

            if (operation & OP_MULTI_BLOCK) != 0 {
                if let Err(e) = self.send_command(SdCmd::StopTransmission) {
                    warn!("SDMMC: stop transmission failed: {}", e);
                }
            }

            let write = (operation & OP_WRITE) != 0;
            if !write {
                self.cache.invalidate(
                    self.regs.read(Reg::IdmaBase0) as usize,
                    self.regs.read(Reg::DLen) as usize,
                );
            }

            self.transfer.set_error(None);
            self.transfer.complete.store(true, Ordering::Release);
            self.transfer.busy(write).store(false, Ordering::Release);
        } else if let Some(error) = data_error(status) {
            if error == (SdError::IdmaError {}) {
                self.regs.clear_bits(Reg::IdmaCtrl, IDMA_IDMAEN);
            }

            self.transfer.set_error(Some(error));
        }

        self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);
    }

    /// Force the controller back to idle and stop the card if it is still
    /// sending or receiving. Safe to call with no transfer in flight.
    ///
    /// Once the card is stopped the outstanding transfer is dropped, together
    /// with any error the interrupt handler recorded for it. If the stop
    /// command fails both are kept so the abort can be retried.
    pub fn abort(&self) -> Result<(), SdError> {
        self.regs.clear_bits(Reg::Mask, MASK_TRANSFER);
        self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);
        self.regs.clear_bits(Reg::IdmaCtrl, IDMA_IDMAEN);
        self.regs.clear_bits(Reg::Cmd, CMD_CMDTRANS);

        if self.get_status() == Err(SdError::Busy {}) {
            self.send_command(SdCmd::StopTransmission)?;
        }

        self.transfer.release();

        Ok(())
    }

    /// Poll an outstanding read. `Busy` while the data is still moving.
    pub fn check_read(&self) -> Result<(), SdError> {
        self.check_transfer(false)
    }

    /// Poll an outstanding write. `Busy` while the data is still moving.
    pub fn check_write(&self) -> Result<(), SdError> {
        self.check_transfer(true)
    }

    fn check_transfer(&self, write: bool) -> Result<(), SdError> {
        if !self.transfer.busy(write).load(Ordering::Acquire) {
            return Ok(());
        }

        if let Some(error) = self.transfer.error() {
            warn!(
                "SDMMC: {} error {}, aborting",
                if write { "TX" } else { "RX" },
                error
            );

            self.abort()?;

            return Err(error);
        }

        Err(SdError::Busy {})
    }

    /// Returns true once the last transfer ended without error
    pub fn transfer_complete(&self) -> bool {
        self.transfer.complete.load(Ordering::Acquire)
    }

    /// Error recorded by the interrupt handler and not yet consumed
    pub fn transfer_error(&self) -> Option<SdError> {
        self.transfer.error()
    }

    /// Block until the outstanding read is done, aborting it once the data
    /// timeout has passed
    pub fn wait_read(&self) -> Result<(), SdError> {
        self.wait_transfer(false)
    }

    /// Block until the outstanding write is done, aborting it once the data
    /// timeout has passed
    pub fn wait_write(&self) -> Result<(), SdError> {
        self.wait_transfer(true)
    }

    fn wait_transfer(&self, write: bool) -> Result<(), SdError> {
        let deadline = Deadline::start(&self.clock, self.config.data_timeout);

        loop {
            // Handle the completion here when the interrupt isn't routed
            let status = self.regs.read(Reg::Sta);
            if (status & STA_DATAEND) != 0 || data_error(status).is_some() {
                self.on_interrupt();
            }

            match self.check_transfer(write) {
                Err(SdError::Busy {}) => {}
                result => return result,
            }

            if deadline.expired(&self.clock) {
                warn!("SDMMC: transfer timed out, aborting");

                self.abort()?;

                return Err(SdError::DataTimeout {});
            }
        }
    }

    /// Read whole blocks into `buffer` and wait for the data
    pub fn read_blocks_blocking(&self, address: u64, buffer: &mut [u32]) -> Result<(), SdError> {
        let num_blocks = (buffer.len() / SD_BLOCK_WORDS) as u32;

        // SAFETY: the buffer stays borrowed until the transfer finished or
        // was aborted, which disables the IDMA
        unsafe { self.read_blocks(address, buffer, SD_BLOCK_LEN as u32, num_blocks)? };

        self.wait_read()
    }

    /// Write whole blocks from `buffer` and wait for the card to take them
    pub fn write_blocks_blocking(&self, address: u64, buffer: &[u32]) -> Result<(), SdError> {
        let num_blocks = (buffer.len() / SD_BLOCK_WORDS) as u32;

        // SAFETY: see `read_blocks_blocking`
        unsafe { self.write_blocks(address, buffer, SD_BLOCK_LEN as u32, num_blocks)? };

        self.wait_write()
    }
}
