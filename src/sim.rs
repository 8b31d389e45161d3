//! Simulated SDMMC register file with a scriptable card behind it

use crate::peripheral::*;
use crate::platform::CacheMaintenance;
use crate::registers::CardState;
use crate::sdio::SdmmcConfig;
use crate::time::{Clock, Instant};
use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use embedded_hal::digital::v2::InputPin;
use std::collections::VecDeque;

/// Clock that moves forward by a fixed step every time it is read
pub struct TestClock {
    now: Cell<u64>,
    step: u64,
}

impl TestClock {
    pub fn new(step_us: u64) -> Self {
        Self {
            now: Cell::new(0),
            step: step_us,
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        let now = self.now.get();
        self.now.set(now + self.step);
        Instant::from_ticks(now)
    }
}

/// Detect pin, `true` when a card is inserted
pub struct Detect(pub bool);

impl InputPin for Detect {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(!self.0)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(self.0)
    }
}

/// Cache that remembers every maintenance request
#[derive(Default)]
pub struct RecordingCache {
    pub cleaned: RefCell<Vec<(usize, usize)>>,
    pub invalidated: RefCell<Vec<(usize, usize)>>,
}

impl CacheMaintenance for &RecordingCache {
    fn clean(&self, address: usize, len: usize) {
        self.cleaned.borrow_mut().push((address, len));
    }

    fn invalidate(&self, address: usize, len: usize) {
        self.invalidated.borrow_mut().push((address, len));
    }
}

/// Driver configuration without the DMA region check, host buffers live
/// anywhere
pub fn test_config() -> SdmmcConfig {
    SdmmcConfig {
        dma_region: None,
        ..SdmmcConfig::default()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimKind {
    HighCapacity,
    StandardV2,
    StandardV1,
    /// Doesn't answer CMD8 or CMD55
    Mmc,
}

/// The simulated card
#[derive(Debug, Clone)]
pub struct SimCard {
    pub kind: SimKind,
    /// ACMD41 polls answered with busy before the card is ready
    pub busy_polls: u32,
    pub rca: u16,
    pub cid: [u32; 4],
    pub csd: [u32; 4],
    pub scr: [u8; 8],
    pub sd_status: [u8; 64],
    /// Never raise any flag, commands run into their deadline
    pub mute: bool,
}

impl Default for SimCard {
    fn default() -> Self {
        Self {
            kind: SimKind::HighCapacity,
            busy_polls: 0,
            rca: 0xAAAA,
            cid: [0x0353_4453, 0x5530_3847, 0x8012_3456, 0x7800_DA7F],
            // 32GB SDHC
            csd: [0x400E_0032, 0x5B59_0000, 0xEDC8_7F80, 0x0A40_4000],
            // SD 3.0, 1 and 4 bit bus
            scr: [0x02, 0x35, 0x80, 0x00, 0, 0, 0, 0],
            sd_status: [0; 64],
            mute: false,
        }
    }
}

impl SimCard {
    /// Standard capacity card with a 4 block (2048 byte) CSD
    pub fn standard(kind: SimKind) -> Self {
        Self {
            kind,
            // READ_BL_LEN 9, C_SIZE 0, C_SIZE_MULT 0
            csd: [0, 0x0009_0000, 0, 0],
            ..Self::default()
        }
    }
}

/// Work the card finishes after the command response has been collected
enum Deferred {
    Fifo(Vec<u32>),
    Flags(u32),
}

struct Inner {
    regs: [u32; Reg::Fifo as usize / 4 + 1],
    card: SimCard,
    state: u32,
    locked: bool,
    status_bits: u32,
    app_cmd: bool,
    acmd41_polls: u32,
    wrong_index: bool,
    if_cond_echo: Option<u32>,
    failures: Vec<(u8, u32, u32)>,
    data_fault: Option<u32>,
    complete_transfers: bool,
    ignored_widbus_writes: u32,
    deferred: Option<Deferred>,
    fifo: VecDeque<u32>,
    data_pending: bool,
    log: Vec<(u8, u32)>,
}

/// Register file of one SDMMC controller with `SimCard` attached
pub struct SimRegisters {
    inner: RefCell<Inner>,
}

impl SimRegisters {
    pub fn new(card: SimCard) -> Self {
        Self {
            inner: RefCell::new(Inner {
                regs: [0; Reg::Fifo as usize / 4 + 1],
                card,
                state: CardState::Tran as u32,
                locked: false,
                status_bits: 0,
                app_cmd: false,
                acmd41_polls: 0,
                wrong_index: false,
                if_cond_echo: None,
                failures: Vec::new(),
                data_fault: None,
                complete_transfers: false,
                ignored_widbus_writes: 0,
                deferred: None,
                fifo: VecDeque::new(),
                data_pending: false,
                log: Vec::new(),
            }),
        }
    }

    /// Raw register content, without the FIFO driven status bits
    pub fn reg(&self, reg: Reg) -> u32 {
        self.inner.borrow().regs[reg.offset() / 4]
    }

    /// Set status flags as if the hardware raised them
    pub fn raise(&self, flags: u32) {
        self.inner.borrow_mut().regs[Reg::Sta.offset() / 4] |= flags;
    }

    /// Commands seen so far as (index, argument)
    pub fn commands(&self) -> Vec<(u8, u32)> {
        self.inner.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.inner.borrow_mut().log.clear();
    }

    /// Answer the next `times` commands with index `index` by raising `flags`
    pub fn fail_next(&self, index: u8, times: u32, flags: u32) {
        self.inner.borrow_mut().failures.push((index, times, flags));
    }

    /// Raise `flags` instead of delivering the next SCR or SD status
    pub fn fail_data(&self, flags: u32) {
        self.inner.borrow_mut().data_fault = Some(flags);
    }

    /// Report a wrong command index in RESPCMD
    pub fn echo_wrong_index(&self, wrong: bool) {
        self.inner.borrow_mut().wrong_index = wrong;
    }

    /// Answer CMD8 with `echo` instead of the argument's low 12 bits
    pub fn set_if_cond_echo(&self, echo: u32) {
        self.inner.borrow_mut().if_cond_echo = Some(echo);
    }

    /// Extra bits ORed into every R1 response
    pub fn set_status_bits(&self, bits: u32) {
        self.inner.borrow_mut().status_bits = bits;
    }

    pub fn set_state(&self, state: CardState) {
        self.inner.borrow_mut().state = state as u32;
    }

    pub fn set_locked(&self, locked: bool) {
        self.inner.borrow_mut().locked = locked;
    }

    pub fn set_scr(&self, scr: [u8; 8]) {
        self.inner.borrow_mut().card.scr = scr;
    }

    pub fn set_sd_status(&self, sd_status: [u8; 64]) {
        self.inner.borrow_mut().card.sd_status = sd_status;
    }

    /// Finish DMA transfers right after their command
    pub fn complete_transfers(&self, complete: bool) {
        self.inner.borrow_mut().complete_transfers = complete;
    }

    /// Drop the WIDBUS part of the next `count` CLKCR writes
    pub fn ignore_widbus_writes(&self, count: u32) {
        self.inner.borrow_mut().ignored_widbus_writes = count;
    }
}

impl Inner {
    fn sta(&mut self) -> &mut u32 {
        &mut self.regs[Reg::Sta.offset() / 4]
    }

    fn status(&self) -> u32 {
        let mut status = (self.state << 9) | self.status_bits;
        if self.locked {
            status |= 1 << 25;
        }
        status
    }

    fn respond(&mut self, index: u8, response: u32) {
        let index = if self.wrong_index { (index + 1) & 0x3F } else { index };
        self.regs[Reg::RespCmd.offset() / 4] = index as u32;
        self.regs[Reg::Resp1.offset() / 4] = response;
        *self.sta() |= STA_CMDREND;
    }

    fn respond_long(&mut self, words: [u32; 4]) {
        self.regs[Reg::RespCmd.offset() / 4] = 0x3F;
        self.regs[Reg::Resp1.offset() / 4..=Reg::Resp4.offset() / 4].copy_from_slice(&words);
        *self.sta() |= STA_CMDREND;
    }

    fn timeout(&mut self) {
        *self.sta() |= STA_CTIMEOUT;
    }

    fn send_data(&mut self, bytes: &[u8]) {
        self.deferred = Some(match self.data_fault.take() {
            Some(flags) => Deferred::Flags(flags),
            None => Deferred::Fifo(
                bytes
                    .chunks_exact(4)
                    .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect(),
            ),
        });
    }

    fn injected_failure(&mut self, index: u8) -> Option<u32> {
        let failure = self
            .failures
            .iter_mut()
            .find(|(i, times, _)| *i == index && *times > 0)?;
        failure.1 -= 1;
        Some(failure.2)
    }

    fn execute(&mut self, index: u8) {
        let arg = self.regs[Reg::Arg.offset() / 4];
        self.log.push((index, arg));

        // Indices without an ACMD meaning run as the normal command
        let app = core::mem::take(&mut self.app_cmd) && matches!(index, 6 | 13 | 41 | 51);
        let kind = self.card.kind;
        let is_v2 = matches!(kind, SimKind::HighCapacity | SimKind::StandardV2);

        if self.card.mute {
            return;
        }

        if let Some(flags) = self.injected_failure(index) {
            *self.sta() |= flags;
            return;
        }

        match (app, index) {
            (_, 0) => *self.sta() |= STA_CMDSENT,
            (false, 8) if is_v2 => {
                let echo = self.if_cond_echo.unwrap_or(arg & 0xFFF);
                self.respond(8, echo);
            }
            (false, 8) => self.timeout(),
            (_, 55) if kind == SimKind::Mmc => self.timeout(),
            (_, 55) => {
                self.app_cmd = true;
                let status = self.status() | (1 << 5);
                self.respond(55, status);
            }
            (true, 41) => {
                let mut ocr = 0x00FF_8000;
                if self.acmd41_polls < self.card.busy_polls {
                    self.acmd41_polls += 1;
                } else {
                    ocr |= 1 << 31;
                    if kind == SimKind::HighCapacity && (arg & (1 << 30)) != 0 {
                        ocr |= 1 << 30;
                    }
                }
                self.respond(0x3F, ocr);
            }
            (false, 2) => self.respond_long(self.card.cid),
            (false, 3) => {
                let rca = (self.card.rca as u32) << 16;
                self.respond(3, rca);
            }
            (false, 9) => self.respond_long(self.card.csd),
            (true, 6) => {
                let status = self.status();
                self.respond(6, status);
            }
            (true, 13) => {
                let status = self.status();
                self.respond(13, status);
                let sd_status = self.card.sd_status;
                self.send_data(&sd_status);
            }
            (true, 51) => {
                let status = self.status();
                self.respond(51, status);
                let scr = self.card.scr;
                self.send_data(&scr);
            }
            (false, 17 | 18 | 24 | 25) => {
                let status = self.status();
                self.respond(index, status);
                let transfer = self.regs[Reg::Cmd.offset() / 4] & CMD_CMDTRANS != 0;
                if transfer && self.complete_transfers {
                    self.deferred = Some(Deferred::Flags(STA_DATAEND | STA_DBCKEND));
                }
            }
            (false, 7 | 12 | 13 | 16) => {
                let status = self.status();
                self.respond(index, status);
            }
            _ => self.timeout(),
        }
    }

    fn clear(&mut self, flags: u32) {
        *self.sta() &= !flags;

        if (flags & STA_DATAEND) != 0 && self.fifo.is_empty() {
            self.data_pending = false;
        }

        match self.deferred.take() {
            Some(Deferred::Fifo(words)) => {
                self.fifo.extend(words);
                self.data_pending = true;
            }
            Some(Deferred::Flags(flags)) => *self.sta() |= flags,
            None => {}
        }
    }
}

impl SdmmcRegisters for SimRegisters {
    fn read(&self, reg: Reg) -> u32 {
        let mut inner = self.inner.borrow_mut();

        match reg {
            Reg::Sta => {
                let mut status = *inner.sta();
                if inner.fifo.is_empty() {
                    status |= STA_RXFIFOE;
                    if inner.data_pending {
                        status |= STA_DATAEND | STA_DBCKEND;
                    }
                } else if inner.fifo.len() >= 8 {
                    status |= STA_RXFIFOHF;
                }
                status
            }
            Reg::Fifo => inner.fifo.pop_front().unwrap_or(0),
            _ => inner.regs[reg.offset() / 4],
        }
    }

    fn write(&self, reg: Reg, value: u32) {
        let mut inner = self.inner.borrow_mut();

        match reg {
            Reg::Icr => inner.clear(value),
            Reg::Cmd => {
                inner.regs[reg.offset() / 4] = value & !CMD_CPSMEN;
                if (value & CMD_CPSMEN) != 0 {
                    inner.execute((value & CMD_CMDINDEX) as u8);
                }
            }
            Reg::Clkcr if inner.ignored_widbus_writes > 0 => {
                inner.ignored_widbus_writes -= 1;
                let old = inner.regs[reg.offset() / 4];
                inner.regs[reg.offset() / 4] = (value & !CLKCR_WIDBUS) | (old & CLKCR_WIDBUS);
            }
            _ => inner.regs[reg.offset() / 4] = value,
        }
    }
}
