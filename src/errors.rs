//! Errors returned by the SDMMC driver

use embedded_io::{blocking::ReadExactError, Error, ErrorKind};
use snafu::prelude::*;

/// Every failure the driver can report. The enum is flat on purpose so it
/// can be stored by the interrupt handler and handed back unchanged by the
/// polling calls.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
pub enum SdError {
    // Command path
    #[snafu(display("(SDMMC) Timeout on SD command!"))]
    CmdTimeout {},
    #[snafu(display("(SDMMC) Bad command response CRC!"))]
    CmdCrcFail {},
    #[snafu(display("(SDMMC) Illegal command!"))]
    IllegalCommand {},

    // Card status (R1) error bits
    #[snafu(display("(SDMMC) Address out of range!"))]
    AddressOutOfRange {},
    #[snafu(display("(SDMMC) Misaligned address!"))]
    AddressMisaligned {},
    #[snafu(display("(SDMMC) Block length incorrect!"))]
    BlockLenError {},
    #[snafu(display("(SDMMC) Erase sequence error!"))]
    EraseSeqError {},
    #[snafu(display("(SDMMC) Erase parameters error!"))]
    BadEraseParam {},
    #[snafu(display("(SDMMC) Write protection violation!"))]
    WriteProtViolation {},
    #[snafu(display("(SDMMC) Failed to lock/unlock card!"))]
    LockUnlockFailed {},
    #[snafu(display("(SDMMC) Card saw a bad command CRC!"))]
    ComCrcFailed {},
    #[snafu(display("(SDMMC) Card ECC failed!"))]
    CardEccFailed {},
    #[snafu(display("(SDMMC) CC Error!"))]
    CcError {},
    #[snafu(display("(SDMMC) Unknown card error!"))]
    GeneralUnknownError {},
    #[snafu(display("(SDMMC) Stream read underrun!"))]
    StreamReadUnderrun {},
    #[snafu(display("(SDMMC) Stream write overrun!"))]
    StreamWriteOverrun {},
    #[snafu(display("(SDMMC) CID/CSD overwrite error!"))]
    CidCsdOverwrite {},
    #[snafu(display("(SDMMC) Wp erase skip!"))]
    WpEraseSkip {},
    #[snafu(display("(SDMMC) Card ECC disabled!"))]
    CardEccDisabled {},
    #[snafu(display("(SDMMC) Erase reset!"))]
    EraseReset {},
    #[snafu(display("(SDMMC) Authentication sequence error!"))]
    AkeSeqError {},

    // Data path
    #[snafu(display("(SDMMC) Data timeout!"))]
    DataTimeout {},
    #[snafu(display("(SDMMC) Bad data CRC!"))]
    DataCrcFail {},
    #[snafu(display("(SDMMC) Receive FIFO overrun!"))]
    RxOverrun {},
    #[snafu(display("(SDMMC) Transmit FIFO underrun!"))]
    TxUnderrun {},
    #[snafu(display("(SDMMC) IDMA transfer error!"))]
    IdmaError {},

    // Request validity
    #[snafu(display("(SDMMC) Request not applicable to this card!"))]
    RequestNotApplicable {},
    #[snafu(display("(SDMMC) Unsupported feature!"))]
    UnsupportedFeature {},
    #[snafu(display("(SDMMC) Invalid parameter!"))]
    InvalidParameter {},
    #[snafu(display("(SDMMC) Bad OCR voltage range!"))]
    InvalidVoltageRange {},
    #[snafu(display("(SDMMC) Unknown card type!"))]
    UnknownCardType {},
    #[snafu(display("(SDMMC) No card present!"))]
    NotPresent {},

    // Status polling
    #[snafu(display("(SDMMC) Card error!"))]
    CardError {},
    #[snafu(display("(SDMMC) Busy!"))]
    Busy {},

    // Byte stream
    #[snafu(display("(IO) Unexpected EOF!"))]
    IoUnexpectedEof {},
    #[snafu(display("(IO) Position is past the end of the card!"))]
    OutOfBounds {},
}

impl Error for SdError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<SdError> for ReadExactError<SdError> {
    fn from(e: SdError) -> ReadExactError<SdError> {
        Self::Other(e)
    }
}

impl From<ReadExactError<SdError>> for SdError {
    fn from(e: ReadExactError<SdError>) -> SdError {
        match e {
            ReadExactError::UnexpectedEof => Self::IoUnexpectedEof {},
            ReadExactError::Other(e) => e,
        }
    }
}
