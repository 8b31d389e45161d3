//! SDMMC peripheral register map and the register access seam
//!
//! The protocol code only ever talks to the controller through
//! [`SdmmcRegisters`], so it can run against the memory mapped peripheral or
//! against a simulated register file.

use core::ptr;

/// Registers of the SDMMC block, with their offsets from the base address
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(usize)]
pub enum Reg {
    Power = 0x00,
    Clkcr = 0x04,
    Arg = 0x08,
    Cmd = 0x0C,
    RespCmd = 0x10,
    Resp1 = 0x14,
    Resp2 = 0x18,
    Resp3 = 0x1C,
    Resp4 = 0x20,
    DTimer = 0x24,
    DLen = 0x28,
    DCtrl = 0x2C,
    DCount = 0x30,
    Sta = 0x34,
    Icr = 0x38,
    Mask = 0x3C,
    IdmaCtrl = 0x50,
    IdmaBase0 = 0x58,
    Fifo = 0x80,
}

impl Reg {
    #[inline]
    /// Byte offset of the register from the peripheral base
    pub fn offset(self) -> usize {
        self as usize
    }
}

/// Narrow read/write interface to the controller registers
pub trait SdmmcRegisters {
    /// Read a register
    fn read(&self, reg: Reg) -> u32;

    /// Write a register
    fn write(&self, reg: Reg, value: u32);

    /// Read-modify-write: clear the bits in `clear`, then set the bits in `set`
    fn modify(&self, reg: Reg, clear: u32, set: u32) {
        let value = self.read(reg);
        self.write(reg, (value & !clear) | set);
    }

    #[inline]
    /// Set bits in a register
    fn set_bits(&self, reg: Reg, bits: u32) {
        self.modify(reg, 0, bits);
    }

    #[inline]
    /// Clear bits in a register
    fn clear_bits(&self, reg: Reg, bits: u32) {
        self.modify(reg, bits, 0);
    }
}

impl<T: SdmmcRegisters> SdmmcRegisters for &T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// The two SDMMC instances of the STM32H7
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Controller {
    Sdmmc1,
    Sdmmc2,
}

impl Controller {
    /// Base address of the controller's register block
    pub fn base_address(self) -> usize {
        match self {
            Self::Sdmmc1 => 0x5200_7000,
            Self::Sdmmc2 => 0x4802_2400,
        }
    }
}

/// Memory mapped register block
pub struct Mmio {
    base: *mut u32,
}

// SAFETY: the register block is a fixed hardware address; ownership of the
// `Mmio` value is what grants access to it.
unsafe impl Send for Mmio {}

impl Mmio {
    /// Access the register block of `controller`
    ///
    /// # Safety
    /// Only one `Mmio` may exist per controller, and the peripheral clock
    /// must be enabled before any register is touched.
    pub unsafe fn new(controller: Controller) -> Self {
        // SAFETY: forwarded to the caller
        unsafe { Self::from_address(controller.base_address()) }
    }

    /// Access a register block at an arbitrary address
    ///
    /// # Safety
    /// `base` must point at an SDMMC register block.
    pub unsafe fn from_address(base: usize) -> Self {
        Self {
            base: base as *mut u32,
        }
    }

    #[inline]
    fn reg_ptr(&self, reg: Reg) -> *mut u32 {
        // Offsets are word aligned
        self.base.wrapping_add(reg.offset() / 4)
    }
}

impl SdmmcRegisters for Mmio {
    #[inline]
    fn read(&self, reg: Reg) -> u32 {
        // SAFETY: points into the register block handed to `new`
        unsafe { ptr::read_volatile(self.reg_ptr(reg)) }
    }

    #[inline]
    fn write(&self, reg: Reg, value: u32) {
        // SAFETY: points into the register block handed to `new`
        unsafe { ptr::write_volatile(self.reg_ptr(reg), value) }
    }
}

// POWER
pub const POWER_PWRCTRL: u32 = 0b11;
pub const POWER_DIRPOL: u32 = 1 << 4;

// CLKCR
pub const CLKCR_CLKDIV: u32 = 0x3FF;
pub const CLKCR_PWRSAV: u32 = 1 << 12;
pub const CLKCR_WIDBUS: u32 = 0b11 << 14;
pub const CLKCR_WIDBUS_4: u32 = 0b01 << 14;
pub const CLKCR_WIDBUS_8: u32 = 0b10 << 14;
pub const CLKCR_NEGEDGE: u32 = 1 << 16;
pub const CLKCR_HWFC_EN: u32 = 1 << 17;
pub const CLKCR_BUSSPEED: u32 = 1 << 19;
pub const CLKCR_CLEAR_MASK: u32 =
    CLKCR_CLKDIV | CLKCR_PWRSAV | CLKCR_BUSSPEED | CLKCR_WIDBUS | CLKCR_NEGEDGE | CLKCR_HWFC_EN;

// CMD
pub const CMD_CMDINDEX: u32 = 0x3F;
pub const CMD_CMDTRANS: u32 = 1 << 6;
pub const CMD_CMDSTOP: u32 = 1 << 7;
pub const CMD_WAITRESP_SHORT: u32 = 0b01 << 8;
pub const CMD_WAITRESP_LONG: u32 = 0b11 << 8;
pub const CMD_WAITRESP: u32 = 0b11 << 8;
pub const CMD_WAITINT: u32 = 1 << 10;
pub const CMD_WAITPEND: u32 = 1 << 11;
pub const CMD_CPSMEN: u32 = 1 << 12;
pub const CMD_CMDSUSPEND: u32 = 1 << 16;
pub const CMD_CLEAR_MASK: u32 = CMD_CMDINDEX
    | CMD_CMDSTOP
    | CMD_WAITRESP
    | CMD_WAITINT
    | CMD_WAITPEND
    | CMD_CPSMEN
    | CMD_CMDSUSPEND;

// DCTRL
pub const DCTRL_DTEN: u32 = 1 << 0;
pub const DCTRL_DTDIR: u32 = 1 << 1;
pub const DCTRL_DBLOCKSIZE_8B: u32 = 3 << 4;
pub const DCTRL_DBLOCKSIZE_64B: u32 = 6 << 4;
pub const DCTRL_DBLOCKSIZE_512B: u32 = 9 << 4;

// STA / ICR / MASK share bit positions
pub const STA_CCRCFAIL: u32 = 1 << 0;
pub const STA_DCRCFAIL: u32 = 1 << 1;
pub const STA_CTIMEOUT: u32 = 1 << 2;
pub const STA_DTIMEOUT: u32 = 1 << 3;
pub const STA_TXUNDERR: u32 = 1 << 4;
pub const STA_RXOVERR: u32 = 1 << 5;
pub const STA_CMDREND: u32 = 1 << 6;
pub const STA_CMDSENT: u32 = 1 << 7;
pub const STA_DATAEND: u32 = 1 << 8;
pub const STA_DBCKEND: u32 = 1 << 10;
pub const STA_TXFIFOHE: u32 = 1 << 14;
pub const STA_RXFIFOHF: u32 = 1 << 15;
pub const STA_RXFIFOE: u32 = 1 << 19;
pub const STA_BUSYD0END: u32 = 1 << 21;
pub const STA_IDMATE: u32 = 1 << 27;
pub const STA_IDMABTC: u32 = 1 << 28;

/// Every clearable ("static") status flag
pub const ICR_STATIC_FLAGS: u32 = 0x1FE0_0FFF;

pub const MASK_DCRCFAILIE: u32 = STA_DCRCFAIL;
pub const MASK_DTIMEOUTIE: u32 = STA_DTIMEOUT;
pub const MASK_TXUNDERRIE: u32 = STA_TXUNDERR;
pub const MASK_RXOVERRIE: u32 = STA_RXOVERR;
pub const MASK_DATAENDIE: u32 = STA_DATAEND;
pub const MASK_TXFIFOHEIE: u32 = STA_TXFIFOHE;
pub const MASK_RXFIFOHFIE: u32 = STA_RXFIFOHF;
pub const MASK_IDMABTCIE: u32 = STA_IDMABTC;

/// Interrupt sources used by block transfers
pub const MASK_TRANSFER: u32 = MASK_DCRCFAILIE
    | MASK_DTIMEOUTIE
    | MASK_DATAENDIE
    | MASK_TXFIFOHEIE
    | MASK_RXFIFOHFIE
    | MASK_TXUNDERRIE
    | MASK_RXOVERRIE
    | MASK_IDMABTCIE;

// IDMACTRL
pub const IDMA_IDMAEN: u32 = 1 << 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_flags_skip_dynamic_bits() {
        // DPSMACT..BUSYD0 (bits 12 to 20) are read-only state bits
        assert_eq!(ICR_STATIC_FLAGS & 0x001F_F000, 0);
        assert_ne!(ICR_STATIC_FLAGS & STA_IDMATE, 0);
        assert_ne!(ICR_STATIC_FLAGS & STA_BUSYD0END, 0);
    }

    #[test]
    fn register_offsets() {
        assert_eq!(Reg::Sta.offset(), 0x34);
        assert_eq!(Reg::IdmaBase0.offset(), 0x58);
        assert_eq!(Reg::Fifo.offset(), 0x80);
    }
}
