//! SD card registers: card status, OCR, CID, CSD, SCR and the SD status

use crate::errors::SdError;

/// Capacity class / family of the attached card
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CardType {
    /// Standard capacity, physical layer v1.x
    StandardV1_1,
    /// Standard capacity, physical layer v2.0
    StandardV2_0,
    /// SDHC/SDXC, block addressed
    HighCapacity,
    SecureDigitalIo,
    SecureDigitalIoCombo,
    Unknown,
}

impl CardType {
    /// True for the memory card types that use the SD command set
    pub fn is_sd_memory(&self) -> bool {
        matches!(
            self,
            Self::StandardV1_1 | Self::StandardV2_0 | Self::HighCapacity
        )
    }
}

/// Card status bits carried by R1 responses, in the order they are checked.
/// The first bit that is set decides the reported error.
const STATUS_ERRORS: [(u32, SdError); 19] = [
    (1 << 31, SdError::AddressOutOfRange {}),
    (1 << 30, SdError::AddressMisaligned {}),
    (1 << 29, SdError::BlockLenError {}),
    (1 << 28, SdError::EraseSeqError {}),
    (1 << 27, SdError::BadEraseParam {}),
    (1 << 26, SdError::WriteProtViolation {}),
    (1 << 24, SdError::LockUnlockFailed {}),
    (1 << 23, SdError::ComCrcFailed {}),
    (1 << 22, SdError::IllegalCommand {}),
    (1 << 21, SdError::CardEccFailed {}),
    (1 << 20, SdError::CcError {}),
    (1 << 19, SdError::GeneralUnknownError {}),
    (1 << 18, SdError::StreamReadUnderrun {}),
    (1 << 17, SdError::StreamWriteOverrun {}),
    (1 << 16, SdError::CidCsdOverwrite {}),
    (1 << 15, SdError::WpEraseSkip {}),
    (1 << 14, SdError::CardEccDisabled {}),
    (1 << 13, SdError::EraseReset {}),
    (1 << 3, SdError::AkeSeqError {}),
];

/// Mask of every error bit in the card status
pub const STATUS_ERROR_BITS: u32 = 0xFDFF_E008;

// R6 keeps a compressed copy of status bits 23, 22 and 19
const R6_GENERAL_UNKNOWN_ERROR: u32 = 1 << 13;
const R6_ILLEGAL_CMD: u32 = 1 << 14;
const R6_COM_CRC_FAILED: u32 = 1 << 15;

/// Status of the sd card, as returned in R1
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CardStatus(pub u32);

impl CardStatus {
    /// Gets the current state of the card
    pub fn current_state(&self) -> CardState {
        CardState::from_int(((self.0 >> 9) & 0xF) as u8)
    }

    /// Returns the highest priority error set in the status, if any
    pub fn check(&self) -> Result<(), SdError> {
        if (self.0 & STATUS_ERROR_BITS) == 0 {
            return Ok(());
        }

        for (bit, error) in STATUS_ERRORS {
            if (self.0 & bit) != 0 {
                return Err(error);
            }
        }

        Ok(())
    }

    #[inline]
    /// Returns true if the CARD_IS_LOCKED bit is set
    pub fn card_is_locked(&self) -> bool {
        (self.0 & (1 << 25)) != 0
    }

    #[inline]
    /// Returns true if the READY_FOR_DATA bit is set
    pub fn ready_for_data(&self) -> bool {
        (self.0 & (1 << 8)) != 0
    }

    #[inline]
    /// Returns true if the APP_CMD bit is set
    pub fn app_cmd(&self) -> bool {
        (self.0 & (1 << 5)) != 0
    }
}

/// Decode an R6 (published RCA) response. Returns the new RCA.
pub fn check_r6(response: u32) -> Result<u16, SdError> {
    if (response & R6_GENERAL_UNKNOWN_ERROR) != 0 {
        return Err(SdError::GeneralUnknownError {});
    }

    if (response & R6_ILLEGAL_CMD) != 0 {
        return Err(SdError::IllegalCommand {});
    }

    if (response & R6_COM_CRC_FAILED) != 0 {
        return Err(SdError::ComCrcFailed {});
    }

    Ok((response >> 16) as u16)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CardState {
    Idle,
    Ready,
    Ident,
    Stby,
    Tran,
    Data,
    Rcv,
    Prg,
    Dis,
    Reserved,
}

impl CardState {
    /// Grabs the sd state from a nibble
    pub fn from_int(nibble: u8) -> Self {
        match nibble {
            0 => Self::Idle,
            1 => Self::Ready,
            2 => Self::Ident,
            3 => Self::Stby,
            4 => Self::Tran,
            5 => Self::Data,
            6 => Self::Rcv,
            7 => Self::Prg,
            8 => Self::Dis,
            _ => Self::Reserved,
        }
    }
}

/// Operating conditions register
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Ocr(pub u32);

impl Ocr {
    /// Returns the voltage window
    pub fn voltage_window(&self) -> u32 {
        self.0 & 0xFF_FFFF
    }
    /// Returns true once the card finished its power up routine
    pub fn is_ready(&self) -> bool {
        (self.0 & (1 << 31)) != 0
    }
    /// Returns true if the CCS bit is set
    pub fn ccs(&self) -> bool {
        (self.0 & (1 << 30)) != 0
    }
}

/// Join the four response words into one 128-bit register, RESP1 on top
fn join(words: &[u32; 4]) -> u128 {
    words
        .iter()
        .fold(0u128, |acc, word| (acc << 32) | *word as u128)
}

/// Extract bits `msb..=lsb` of a 128-bit register
fn field(reg: u128, msb: u32, lsb: u32) -> u32 {
    let width = msb - lsb + 1;
    ((reg >> lsb) & ((1u128 << width) - 1)) as u32
}

/// Card identification register
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Cid {
    pub manufacturer_id: u8,
    pub oem_id: u16,
    pub product_name: [u8; 5],
    pub product_revision: u8,
    pub serial_number: u32,
    /// Raw 12-bit date: years since 2000 in bits 11:4, month in bits 3:0
    pub manufacture_date: u16,
    pub crc: u8,
}

impl Cid {
    pub fn decode(raw: &[u32; 4]) -> Self {
        let reg = join(raw);

        let mut product_name = [0; 5];
        for (i, c) in product_name.iter_mut().enumerate() {
            let msb = 103 - (i as u32) * 8;
            *c = field(reg, msb, msb - 7) as u8;
        }

        Self {
            manufacturer_id: field(reg, 127, 120) as u8,
            oem_id: field(reg, 119, 104) as u16,
            product_name,
            product_revision: field(reg, 63, 56) as u8,
            serial_number: field(reg, 55, 24),
            manufacture_date: field(reg, 19, 8) as u16,
            crc: field(reg, 7, 1) as u8,
        }
    }

    pub fn manufacture_year(&self) -> u16 {
        2000 + (self.manufacture_date >> 4)
    }

    pub fn manufacture_month(&self) -> u8 {
        (self.manufacture_date & 0xF) as u8
    }
}

/// Card specific data register
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Csd {
    pub csd_structure: u8,
    pub taac: u8,
    pub nsac: u8,
    pub max_bus_clk_freq: u8,
    pub card_command_classes: u16,
    pub read_block_len: u8,
    pub partial_block_read: bool,
    pub write_block_misalign: bool,
    pub read_block_misalign: bool,
    pub dsr_implemented: bool,
    /// 12 bits on standard capacity cards, 22 bits on high capacity ones
    pub device_size: u32,
    pub max_read_current_vdd_min: u8,
    pub max_read_current_vdd_max: u8,
    pub max_write_current_vdd_min: u8,
    pub max_write_current_vdd_max: u8,
    pub device_size_mul: u8,
    pub erase_group_size: u8,
    pub erase_group_mul: u8,
    pub write_protect_group_size: u8,
    pub write_protect_group_enable: bool,
    pub manufacturer_default_ecc: u8,
    pub write_speed_factor: u8,
    pub max_write_block_len: u8,
    pub write_block_partial: bool,
    pub content_protect_app: bool,
    pub file_format_group: bool,
    pub copy: bool,
    pub permanent_write_protect: bool,
    pub temporary_write_protect: bool,
    pub file_format: u8,
    pub ecc: u8,
    pub crc: u8,
}

impl Csd {
    /// Decode a CSD. The device size layout depends on the capacity class.
    pub fn decode(card_type: CardType, raw: &[u32; 4]) -> Result<Self, SdError> {
        let reg = join(raw);

        let mut csd = Self {
            csd_structure: field(reg, 127, 126) as u8,
            taac: field(reg, 119, 112) as u8,
            nsac: field(reg, 111, 104) as u8,
            max_bus_clk_freq: field(reg, 103, 96) as u8,
            card_command_classes: field(reg, 95, 84) as u16,
            read_block_len: field(reg, 83, 80) as u8,
            partial_block_read: field(reg, 79, 79) != 0,
            write_block_misalign: field(reg, 78, 78) != 0,
            read_block_misalign: field(reg, 77, 77) != 0,
            dsr_implemented: field(reg, 76, 76) != 0,
            erase_group_size: field(reg, 46, 46) as u8,
            erase_group_mul: field(reg, 45, 39) as u8,
            write_protect_group_size: field(reg, 38, 32) as u8,
            write_protect_group_enable: field(reg, 31, 31) != 0,
            manufacturer_default_ecc: field(reg, 30, 29) as u8,
            write_speed_factor: field(reg, 28, 26) as u8,
            max_write_block_len: field(reg, 25, 22) as u8,
            write_block_partial: field(reg, 21, 21) != 0,
            content_protect_app: field(reg, 16, 16) != 0,
            file_format_group: field(reg, 15, 15) != 0,
            copy: field(reg, 14, 14) != 0,
            permanent_write_protect: field(reg, 13, 13) != 0,
            temporary_write_protect: field(reg, 12, 12) != 0,
            file_format: field(reg, 11, 10) as u8,
            ecc: field(reg, 9, 8) as u8,
            crc: field(reg, 7, 1) as u8,
            ..Default::default()
        };

        match card_type {
            CardType::StandardV1_1 | CardType::StandardV2_0 => {
                csd.device_size = field(reg, 73, 62);
                csd.max_read_current_vdd_min = field(reg, 61, 59) as u8;
                csd.max_read_current_vdd_max = field(reg, 58, 56) as u8;
                csd.max_write_current_vdd_min = field(reg, 55, 53) as u8;
                csd.max_write_current_vdd_max = field(reg, 52, 50) as u8;
                csd.device_size_mul = field(reg, 49, 47) as u8;
            }
            CardType::HighCapacity => {
                csd.device_size = field(reg, 69, 48);
            }
            _ => return Err(SdError::UnknownCardType {}),
        }

        Ok(csd)
    }
}

/// Everything known about the card after identification
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CardInfo {
    pub card_type: CardType,
    pub csd: Csd,
    pub cid: Cid,
    /// Capacity in bytes
    pub capacity: u64,
    /// Block size in bytes
    pub block_size: u32,
}

impl CardInfo {
    pub fn decode(card_type: CardType, csd: &[u32; 4], cid: &[u32; 4]) -> Result<Self, SdError> {
        let csd = Csd::decode(card_type, csd)?;

        let (capacity, block_size) = match card_type {
            CardType::HighCapacity => ((csd.device_size as u64 + 1) * 512 * 1024, 512),
            _ => {
                let block_size = 1u32 << csd.read_block_len;
                let capacity = (csd.device_size as u64 + 1)
                    * (1u64 << (csd.device_size_mul + 2))
                    * block_size as u64;
                (capacity, block_size)
            }
        };

        Ok(Self {
            card_type,
            csd,
            cid: Cid::decode(cid),
            capacity,
            block_size,
        })
    }

    /// Number of 512 byte blocks on the card
    pub fn num_blocks(&self) -> u64 {
        self.capacity / 512
    }
}

/// SD configuration register
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Scr(pub u64);

impl Scr {
    /// Build the SCR from the bytes as they arrived on the bus (MSB first)
    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        Self(u64::from_be_bytes(*bytes))
    }

    /// SD_SPEC field
    pub fn sd_spec(&self) -> u8 {
        ((self.0 >> 56) & 0xF) as u8
    }

    /// Returns true if the card supports a 1-bit bus
    pub fn bus_width_one(&self) -> bool {
        (self.0 >> 48) & 0b0001 != 0
    }

    /// Returns true if the card supports a 4-bit bus
    pub fn bus_width_four(&self) -> bool {
        (self.0 >> 48) & 0b0100 != 0
    }
}

/// SD status register (ACMD13), 512 bits
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SdStatus {
    pub bus_width: u8,
    pub secured_mode: bool,
    pub card_type: u16,
    pub protected_area_size: u32,
    pub speed_class: u8,
    pub performance_move: u8,
    pub au_size: u8,
    pub erase_size: u16,
    pub erase_timeout: u8,
    pub erase_offset: u8,
}

impl SdStatus {
    /// Parse the status from the bytes as they arrived on the bus
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            bus_width: bytes[0] >> 6,
            secured_mode: (bytes[0] & 0x20) != 0,
            card_type: u16::from_be_bytes([bytes[2], bytes[3]]),
            protected_area_size: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            speed_class: bytes[8],
            performance_move: bytes[9],
            au_size: bytes[10] >> 4,
            erase_size: u16::from_be_bytes([bytes[11], bytes[12]]),
            erase_timeout: bytes[13] >> 2,
            erase_offset: bytes[13] & 0b11,
        }
    }
}
