//! Code used to talk to SD cards through the SDMMC peripheral

use crate::errors::SdError;
use crate::peripheral::*;
use crate::platform::{card_present, AlwaysPresent, CacheMaintenance, ControllerSetup, NoCacheMaintenance};
use crate::registers::{check_r6, CardInfo, CardState, CardStatus, CardType, Ocr, Scr, SdStatus};
use crate::time::{delay, Clock, Deadline, Duration};
use crate::transfer::TransferState;
use core::ops::Range;
use embedded_hal::digital::v2::InputPin;
use log::{debug, info};

/// Block length for SD operations
pub const SD_BLOCK_LEN: usize = 512;

/// Words in one block, the unit the IDMA moves
pub const SD_BLOCK_WORDS: usize = SD_BLOCK_LEN / 4;

/// CMD8 argument: 2.7-3.6V supply and the 0xAA check pattern
pub const SD_CHECK_PATTERN: u32 = 0x1AA;

/// ACMD41 voltage window, 3.2-3.4V plus the busy bit
pub const SD_VOLTAGE_WINDOW: u32 = 0x8010_0000;

/// ACMD41 host capacity support bit
pub const SD_HIGH_CAPACITY: u32 = 0x4000_0000;

/// Clock divider used while identifying the card (~400kHz)
pub const SD_INIT_CLK_DIV: u16 = 0xFA;

/// Width of the data bus
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BusWidth {
    One,
    Four,
    /// MMC only, always rejected for SD cards
    Eight,
}

impl BusWidth {
    /// WIDBUS field of CLKCR for this width
    pub fn clkcr_bits(self) -> u32 {
        match self {
            Self::One => 0,
            Self::Four => CLKCR_WIDBUS_4,
            Self::Eight => CLKCR_WIDBUS_8,
        }
    }

    /// ACMD6 argument for this width
    fn acmd6_arg(self) -> u32 {
        match self {
            Self::One => 0b00,
            Self::Four => 0b10,
            Self::Eight => 0b11,
        }
    }
}

impl Default for BusWidth {
    fn default() -> Self {
        if cfg!(feature = "bus-1bit") {
            Self::One
        } else {
            Self::Four
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone)]
pub struct SdmmcConfig {
    /// CLKCR divider used during identification
    pub init_clock_div: u16,
    /// Bus width negotiated at the end of `init`
    pub bus_width: BusWidth,
    /// How long to wait for a command response
    pub command_timeout: Duration,
    /// How long to wait for FIFO data and blocking transfers
    pub data_timeout: Duration,
    /// Value for the DTIMER register, in bus clock cycles
    pub data_timer: u32,
    /// ACMD41 attempts before giving up on the card's voltage range
    pub max_volt_trials: u32,
    /// Wait between powering the bus and the first command
    pub power_up_delay: Duration,
    /// Memory the IDMA can reach. Buffers outside it are rejected.
    pub dma_region: Option<Range<usize>>,
}

impl Default for SdmmcConfig {
    fn default() -> Self {
        Self {
            init_clock_div: SD_INIT_CLK_DIV,
            bus_width: BusWidth::default(),
            command_timeout: Duration::millis(1_000),
            data_timeout: Duration::millis(5_000),
            data_timer: 0xFFFF_FFFF,
            max_volt_trials: 0xFFFF,
            power_up_delay: Duration::millis(2),
            // AXI SRAM
            dma_region: Some(0x2400_0000..0x2408_0000),
        }
    }
}

/// Response format of an SD command
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SdCmdResponseType {
    /// R0, no response
    R0,
    /// R1, normal response
    R1,
    /// R1b, normal response with busy
    R1b,
    /// R2, CID/CSD register
    R2,
    /// R3, OCR register
    R3,
    /// R6, Published RCA response
    R6,
    /// R7, Card interface condition
    R7,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Commands the driver sends to the card
pub enum SdCmd {
    /// CMD0: GO_IDLE_STATE, R0
    GoIdleState,
    /// CMD2: ALL_SEND_CID, R2
    AllSendCid,
    /// CMD3: SEND_RELATIVE_ADDR, R6
    SendRelativeAddr,
    /// CMD7: SELECT_DESELECT_CARD, supply the RCA. R1b
    SelectDeselectCard(u16),
    /// CMD8: SEND_IF_COND, supply voltage and check pattern. R7
    SendIfCond(u32),
    /// CMD9: SEND_CSD, supply the RCA. R2
    SendCsd(u16),
    /// CMD12: STOP_TRANSMISSION, R1b
    StopTransmission,
    /// CMD13: SEND_STATUS, supply the RCA. R1
    SendStatus(u16),
    /// CMD16: SET_BLOCKLEN, R1
    SetBlockLen(u32),
    /// CMD17: READ_SINGLE_BLOCK, supply the data address. R1
    ReadSingleBlock(u32),
    /// CMD18: READ_MULTIPLE_BLOCK, supply the data address. R1
    ReadMultipleBlock(u32),
    /// CMD24: WRITE_BLOCK, supply the data address. R1
    WriteBlock(u32),
    /// CMD25: WRITE_MULTIPLE_BLOCK, supply the data address. R1
    WriteMultipleBlock(u32),
    /// CMD55: APP_CMD, supply the RCA. R1
    AppCmd(u16),
    /// ACMD6: SET_BUS_WIDTH, R1
    SetBusWidth(BusWidth),
    /// ACMD13: SD_STATUS, R1
    SdStatus,
    /// ACMD41: SD_APP_OP_COND, supply HCS and the voltage window. R3
    SdAppOpCond(u32),
    /// ACMD51: SEND_SCR, R1
    SendScr,
}

impl SdCmd {
    /// Get the index of a command
    pub fn index(&self) -> u8 {
        match self {
            Self::GoIdleState => 0,
            Self::AllSendCid => 2,
            Self::SendRelativeAddr => 3,
            Self::SetBusWidth(_) => 6,
            Self::SelectDeselectCard(_) => 7,
            Self::SendIfCond(_) => 8,
            Self::SendCsd(_) => 9,
            Self::StopTransmission => 12,
            Self::SendStatus(_) | Self::SdStatus => 13,
            Self::SetBlockLen(_) => 16,
            Self::ReadSingleBlock(_) => 17,
            Self::ReadMultipleBlock(_) => 18,
            Self::WriteBlock(_) => 24,
            Self::WriteMultipleBlock(_) => 25,
            Self::SdAppOpCond(_) => 41,
            Self::SendScr => 51,
            Self::AppCmd(_) => 55,
        }
    }

    /// Get the 32-bit argument of a command
    pub fn argument(&self) -> u32 {
        match self {
            Self::SetBlockLen(arg)
            | Self::ReadSingleBlock(arg)
            | Self::ReadMultipleBlock(arg)
            | Self::WriteBlock(arg)
            | Self::WriteMultipleBlock(arg)
            | Self::SendIfCond(arg)
            | Self::SdAppOpCond(arg) => *arg,
            // The RCA sits in the top half, the bottom half is stuff bits
            Self::SelectDeselectCard(rca)
            | Self::SendCsd(rca)
            | Self::SendStatus(rca)
            | Self::AppCmd(rca) => (*rca as u32) << 16,
            Self::SetBusWidth(width) => width.acmd6_arg(),
            Self::GoIdleState
            | Self::AllSendCid
            | Self::SendRelativeAddr
            | Self::StopTransmission
            | Self::SdStatus
            | Self::SendScr => 0,
        }
    }

    /// Get the response type of a command
    pub fn response(&self) -> SdCmdResponseType {
        match self {
            Self::GoIdleState => SdCmdResponseType::R0,
            Self::AllSendCid | Self::SendCsd(_) => SdCmdResponseType::R2,
            Self::SendRelativeAddr => SdCmdResponseType::R6,
            Self::SendIfCond(_) => SdCmdResponseType::R7,
            Self::SdAppOpCond(_) => SdCmdResponseType::R3,
            Self::SelectDeselectCard(_) | Self::StopTransmission => SdCmdResponseType::R1b,
            _ => SdCmdResponseType::R1,
        }
    }

    #[inline]
    /// Returns true if a command is an app command
    pub fn is_acmd(&self) -> bool {
        matches!(
            self,
            Self::SetBusWidth(_) | Self::SdStatus | Self::SdAppOpCond(_) | Self::SendScr
        )
    }

    /// Value for the CMD register, without CPSMEN
    pub fn cmd_word(&self) -> u32 {
        let mut word = self.index() as u32;

        word |= match self.response() {
            SdCmdResponseType::R0 => 0,
            SdCmdResponseType::R2 => CMD_WAITRESP_LONG,
            _ => CMD_WAITRESP_SHORT,
        };

        if *self == Self::StopTransmission {
            word |= CMD_CMDSTOP;
        }

        word
    }
}

/// SDMMC driver for one controller and the card behind it
pub struct Sdmmc<R, C, P = AlwaysPresent, K = NoCacheMaintenance> {
    pub(crate) regs: R,
    pub(crate) clock: C,
    detect: P,
    pub(crate) cache: K,
    pub(crate) config: SdmmcConfig,

    /// Card family found during power on
    pub(crate) card_type: CardType,
    /// The RCA register for the card
    pub(crate) rca: u16,
    /// Raw CID as captured by CMD2
    cid: [u32; 4],
    /// Raw CSD as captured by CMD9
    csd: [u32; 4],
    card_info: Option<CardInfo>,

    pub(crate) transfer: TransferState,
}

impl<R: SdmmcRegisters, C: Clock> Sdmmc<R, C> {
    /// Create a driver without a detect pin or cache maintenance
    pub fn new(regs: R, clock: C, config: SdmmcConfig) -> Self {
        Self {
            regs,
            clock,
            detect: AlwaysPresent,
            cache: NoCacheMaintenance,
            config,
            card_type: CardType::Unknown,
            // RCA must initially be 0 for the first CMD55 to work properly
            rca: 0,
            cid: [0; 4],
            csd: [0; 4],
            card_info: None,
            transfer: TransferState::new(),
        }
    }
}

impl<R, C, P, K> Sdmmc<R, C, P, K> {
    /// Use an (active low) card detect pin
    pub fn with_detect<P2: InputPin>(self, detect: P2) -> Sdmmc<R, C, P2, K> {
        Sdmmc {
            regs: self.regs,
            clock: self.clock,
            detect,
            cache: self.cache,
            config: self.config,
            card_type: self.card_type,
            rca: self.rca,
            cid: self.cid,
            csd: self.csd,
            card_info: self.card_info,
            transfer: self.transfer,
        }
    }

    /// Maintain the data cache around DMA buffers
    pub fn with_cache<K2: CacheMaintenance>(self, cache: K2) -> Sdmmc<R, C, P, K2> {
        Sdmmc {
            regs: self.regs,
            clock: self.clock,
            detect: self.detect,
            cache,
            config: self.config,
            card_type: self.card_type,
            rca: self.rca,
            cid: self.cid,
            csd: self.csd,
            card_info: self.card_info,
            transfer: self.transfer,
        }
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    pub fn rca(&self) -> u16 {
        self.rca
    }

    /// Raw CID, valid after `init`
    pub fn cid(&self) -> &[u32; 4] {
        &self.cid
    }

    /// Raw CSD, valid after `init`
    pub fn csd(&self) -> &[u32; 4] {
        &self.csd
    }

    /// Decoded card information, available once `get_card_info` succeeded
    pub fn card_info(&self) -> Option<&CardInfo> {
        self.card_info.as_ref()
    }

    pub fn config(&self) -> &SdmmcConfig {
        &self.config
    }
}

impl<R, C, P, K> Sdmmc<R, C, P, K>
where
    R: SdmmcRegisters,
    C: Clock,
    P: InputPin,
    K: CacheMaintenance,
{
    /// Reset the controller and route its clock, pins and interrupt
    pub fn initialize_ll<S: ControllerSetup>(&mut self, controller: Controller, setup: &mut S) {
        setup.assert_reset(controller);
        delay(&self.clock, Duration::millis(1));
        setup.release_reset(controller);
        delay(&self.clock, Duration::millis(1));

        setup.enable_clock(controller);
        setup.configure_pins(controller, self.config.bus_width);
        setup.enable_interrupt(controller);

        debug!("SDMMC: {:?} ready", controller);
    }

    /// Returns true if a card sits in the slot
    pub fn is_detected(&self) -> bool {
        card_present(&self.detect)
    }

    /// Send a command to the SD card and check its response. Returns RESP1
    /// for short responses.
    pub(crate) fn send_command(&self, command: SdCmd) -> Result<u32, SdError> {
        self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);
        self.regs.write(Reg::Arg, command.argument());
        self.regs
            .modify(Reg::Cmd, CMD_CLEAR_MASK, command.cmd_word() | CMD_CPSMEN);

        let result = self.command_response(command);

        self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);

        if let Err(e) = result {
            debug!(
                "SDMMC: {}CMD{} failed: {}",
                if command.is_acmd() { "A" } else { "" },
                command.index(),
                e
            );
        }

        result
    }

    /// Wait for the command to complete, then classify the response
    fn command_response(&self, command: SdCmd) -> Result<u32, SdError> {
        let response_type = command.response();

        let flags = match response_type {
            SdCmdResponseType::R0 => STA_CMDSENT,
            _ => STA_CCRCFAIL | STA_CMDREND | STA_CTIMEOUT | STA_BUSYD0END,
        };

        let deadline = Deadline::start(&self.clock, self.config.command_timeout);
        while (self.regs.read(Reg::Sta) & flags) == 0 {
            if deadline.expired(&self.clock) {
                return Err(SdError::CmdTimeout {});
            }
        }

        if response_type == SdCmdResponseType::R0 {
            return Ok(0);
        }

        let status = self.regs.read(Reg::Sta);

        if (status & STA_CTIMEOUT) != 0 {
            return Err(SdError::CmdTimeout {});
        }

        // R3 carries no CRC, the CRC flag is expected
        if response_type == SdCmdResponseType::R3 {
            return Ok(self.regs.read(Reg::Resp1));
        }

        if (status & STA_CCRCFAIL) != 0 {
            return Err(SdError::CmdCrcFail {});
        }

        // Long responses are fetched with `long_response`
        if response_type == SdCmdResponseType::R2 {
            return Ok(0);
        }

        if (self.regs.read(Reg::RespCmd) & CMD_CMDINDEX) != command.index() as u32 {
            return Err(SdError::IllegalCommand {});
        }

        let response = self.regs.read(Reg::Resp1);

        match response_type {
            SdCmdResponseType::R1 | SdCmdResponseType::R1b => CardStatus(response).check()?,
            SdCmdResponseType::R6 => {
                check_r6(response)?;
            }
            _ => {}
        }

        Ok(response)
    }

    /// Read the four response registers of an R2 response
    fn long_response(&self) -> [u32; 4] {
        [
            self.regs.read(Reg::Resp1),
            self.regs.read(Reg::Resp2),
            self.regs.read(Reg::Resp3),
            self.regs.read(Reg::Resp4),
        ]
    }

    /// Power the bus and find out which kind of card is attached
    ///
    /// A card that answers CMD8 is a v2.0 card, but only if it echoes the
    /// voltage and check pattern back. Any other echo means the card can't
    /// run in the 2.7-3.6 V window, and it fails with `CardError` instead of
    /// being initialized.
    fn power_on(&mut self) -> Result<(), SdError> {
        self.regs.set_bits(Reg::Power, POWER_PWRCTRL);

        delay(&self.clock, self.config.power_up_delay);

        self.send_command(SdCmd::GoIdleState)?;

        // Only v2.0 cards answer CMD8
        let mut hcs = 0;
        if let Ok(response) = self.send_command(SdCmd::SendIfCond(SD_CHECK_PATTERN)) {
            if (response & 0xFFF) != SD_CHECK_PATTERN {
                debug!("SDMMC: bad CMD8 echo {:#x}", response);
                return Err(SdError::CardError {});
            }

            self.card_type = CardType::StandardV2_0;
            hcs = SD_HIGH_CAPACITY;
        }

        // MMC cards don't know CMD55
        self.send_command(SdCmd::AppCmd(0))?;

        // Send ACMD41 until the card is no longer busy
        let mut ocr = Ocr(0);
        let mut trials = 0;

        while !ocr.is_ready() {
            if trials >= self.config.max_volt_trials {
                return Err(SdError::InvalidVoltageRange {});
            }

            self.send_command(SdCmd::AppCmd(0))?;
            ocr = Ocr(self.send_command(SdCmd::SdAppOpCond(SD_VOLTAGE_WINDOW | hcs))?);
            trials += 1;
        }

        if ocr.ccs() {
            self.card_type = CardType::HighCapacity;
        }

        debug!("SDMMC: OCR {:#010x} after {} trials", ocr.0, trials);

        Ok(())
    }

    /// Fetch the CID, RCA and CSD of a powered card
    fn initialize_card(&mut self) -> Result<(), SdError> {
        if (self.regs.read(Reg::Power) & POWER_PWRCTRL) == 0 {
            return Err(SdError::RequestNotApplicable {});
        }

        if self.card_type != CardType::SecureDigitalIo {
            self.send_command(SdCmd::AllSendCid)?;
            self.cid = self.long_response();
        }

        if self.card_type.is_sd_memory() || self.card_type == CardType::SecureDigitalIoCombo {
            let response = self.send_command(SdCmd::SendRelativeAddr)?;
            self.rca = (response >> 16) as u16;
        }

        if self.card_type != CardType::SecureDigitalIo {
            self.send_command(SdCmd::SendCsd(self.rca))?;
            self.csd = self.long_response();
        }

        Ok(())
    }

    /// Decode the captured CSD and CID
    pub fn get_card_info(&mut self) -> Result<&CardInfo, SdError> {
        let info = CardInfo::decode(self.card_type, &self.csd, &self.cid)?;

        info!(
            "SDMMC: {:?} card, {} bytes, {} byte blocks",
            info.card_type, info.capacity, info.block_size
        );

        Ok(&*self.card_info.insert(info))
    }

    /// Identify the card and bring it into transfer state at `clock_div`
    pub fn init(&mut self, clock_div: u16) -> Result<(), SdError> {
        if !self.is_detected() {
            info!("SDMMC: no card");
            return Err(SdError::NotPresent {});
        }

        self.card_type = CardType::StandardV1_1;
        self.rca = 0;
        self.cid = [0; 4];
        self.csd = [0; 4];
        self.card_info = None;
        self.transfer.reset();

        self.regs.modify(
            Reg::Clkcr,
            CLKCR_CLEAR_MASK,
            self.config.init_clock_div as u32 & CLKCR_CLKDIV,
        );
        self.regs.modify(Reg::Power, POWER_DIRPOL, POWER_DIRPOL);

        self.power_on()?;
        self.initialize_card()?;
        self.get_card_info()?;

        self.send_command(SdCmd::SelectDeselectCard(self.rca))?;

        self.regs
            .modify(Reg::Clkcr, CLKCR_CLEAR_MASK, clock_div as u32 & CLKCR_CLKDIV);

        self.wide_bus_operation_config(self.config.bus_width)?;

        info!(
            "SDMMC: card {:#06x} ready, {:?} bus",
            self.rca, self.config.bus_width
        );

        Ok(())
    }

    /// Switch card and controller to `width`
    pub fn wide_bus_operation_config(&self, width: BusWidth) -> Result<(), SdError> {
        if !self.card_type.is_sd_memory() || width == BusWidth::Eight {
            return Err(SdError::UnsupportedFeature {});
        }

        if CardStatus(self.regs.read(Reg::Resp1)).card_is_locked() {
            return Err(SdError::LockUnlockFailed {});
        }

        let scr = self.find_scr()?;

        let supported = match width {
            BusWidth::Four => scr.bus_width_four(),
            _ => scr.bus_width_one(),
        };

        if !supported {
            return Err(SdError::RequestNotApplicable {});
        }

        self.send_command(SdCmd::AppCmd(self.rca))?;
        self.send_command(SdCmd::SetBusWidth(width))?;

        // The controller doesn't always take the new width on the first
        // write, keep writing until it reads back
        let deadline = Deadline::start(&self.clock, self.config.command_timeout);
        while (self.regs.read(Reg::Clkcr) & CLKCR_WIDBUS) != width.clkcr_bits() {
            if deadline.expired(&self.clock) {
                return Err(SdError::CmdTimeout {});
            }

            self.regs
                .modify(Reg::Clkcr, CLKCR_WIDBUS, width.clkcr_bits());
        }

        Ok(())
    }

    /// Arm the DPSM for a small polled read (SCR, SD status)
    fn data_transfer_init(&self, len: u32, block_size: u32) {
        self.regs.write(Reg::DTimer, self.config.data_timer);
        self.regs.write(Reg::DLen, len);
        self.regs
            .write(Reg::DCtrl, block_size | DCTRL_DTDIR | DCTRL_DTEN);
    }

    /// Drain a polled read from the FIFO into `words`
    fn read_data_fifo(&self, words: &mut [u32]) -> Result<(), SdError> {
        let deadline = Deadline::start(&self.clock, self.config.data_timeout);
        let mut index = 0;

        loop {
            let status = self.regs.read(Reg::Sta);

            if (status & (STA_RXOVERR | STA_DCRCFAIL | STA_DTIMEOUT | STA_DBCKEND | STA_DATAEND))
                != 0
            {
                break;
            }

            if (status & STA_RXFIFOE) == 0 {
                let word = self.regs.read(Reg::Fifo);
                if index < words.len() {
                    words[index] = word;
                    index += 1;
                }
            } else if deadline.expired(&self.clock) {
                self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);
                return Err(SdError::DataTimeout {});
            }
        }

        let status = self.regs.read(Reg::Sta);
        self.regs.write(Reg::Icr, ICR_STATIC_FLAGS);

        if (status & STA_DTIMEOUT) != 0 {
            return Err(SdError::DataTimeout {});
        } else if (status & STA_DCRCFAIL) != 0 {
            return Err(SdError::DataCrcFail {});
        } else if (status & STA_RXOVERR) != 0 {
            return Err(SdError::RxOverrun {});
        }

        // Words can still sit in the FIFO after the end flag
        while index < words.len() && (self.regs.read(Reg::Sta) & STA_RXFIFOE) == 0 {
            words[index] = self.regs.read(Reg::Fifo);
            index += 1;
        }

        Ok(())
    }

    /// Read the card's SD configuration register
    pub fn find_scr(&self) -> Result<Scr, SdError> {
        self.send_command(SdCmd::SetBlockLen(8))?;
        self.send_command(SdCmd::AppCmd(self.rca))?;

        self.data_transfer_init(8, DCTRL_DBLOCKSIZE_8B);

        self.send_command(SdCmd::SendScr)?;

        let mut words = [0u32; 2];
        self.read_data_fifo(&mut words)?;

        let mut bytes = [0u8; 8];
        fifo_to_bytes(&words, &mut bytes);

        Ok(Scr::from_bytes(&bytes))
    }

    /// Ask the card which state it is in: Ok in transfer state, Busy in any
    /// other known state
    pub fn get_status(&self) -> Result<(), SdError> {
        let response = self
            .send_command(SdCmd::SendStatus(self.rca))
            .map_err(|_| SdError::CardError {})?;

        match CardStatus(response).current_state() {
            CardState::Tran => Ok(()),
            CardState::Reserved => Err(SdError::CardError {}),
            _ => Err(SdError::Busy {}),
        }
    }

    /// Returns true if the card is ready for the next transfer
    pub fn is_ready(&self) -> bool {
        self.get_status().is_ok()
    }

    /// Read the 512-bit SD status register
    pub fn get_card_status(&self) -> Result<SdStatus, SdError> {
        if CardStatus(self.regs.read(Reg::Resp1)).card_is_locked() {
            return Err(SdError::LockUnlockFailed {});
        }

        self.send_command(SdCmd::SetBlockLen(64))?;
        self.send_command(SdCmd::AppCmd(self.rca))?;

        self.data_transfer_init(64, DCTRL_DBLOCKSIZE_64B);

        self.send_command(SdCmd::SdStatus)?;

        let mut words = [0u32; 16];
        self.read_data_fifo(&mut words)?;

        let mut bytes = [0u8; 64];
        fifo_to_bytes(&words, &mut bytes);

        Ok(SdStatus::from_bytes(&bytes))
    }
}

/// The FIFO hands over bytes in arrival order, least significant byte first
fn fifo_to_bytes(words: &[u32], bytes: &mut [u8]) {
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}
