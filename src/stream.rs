//! Byte stream access to a block device through one working block

use crate::errors::SdError;
use crate::peripheral::SdmmcRegisters;
use crate::platform::CacheMaintenance;
use crate::sdio::{Sdmmc, SD_BLOCK_LEN, SD_BLOCK_WORDS};
use crate::time::Clock;
use core::cmp;
use embedded_hal::digital::v2::InputPin;
use embedded_io::blocking::{Read, Seek, Write};
use embedded_io::{Io, SeekFrom};

/// Storage addressed in 512 byte blocks
pub trait BlockDevice {
    /// Read block `index` into `block`
    fn read_block(&mut self, index: u64, block: &mut [u32; SD_BLOCK_WORDS]) -> Result<(), SdError>;

    /// Write `block` to block `index`
    fn write_block(&mut self, index: u64, block: &[u32; SD_BLOCK_WORDS]) -> Result<(), SdError>;

    /// Number of blocks on the device
    fn num_blocks(&self) -> u64;
}

impl<R, C, P, K> BlockDevice for Sdmmc<R, C, P, K>
where
    R: SdmmcRegisters,
    C: Clock,
    P: InputPin,
    K: CacheMaintenance,
{
    fn read_block(&mut self, index: u64, block: &mut [u32; SD_BLOCK_WORDS]) -> Result<(), SdError> {
        self.read_blocks_blocking(index, block)
    }

    fn write_block(&mut self, index: u64, block: &[u32; SD_BLOCK_WORDS]) -> Result<(), SdError> {
        self.write_blocks_blocking(index, block)
    }

    fn num_blocks(&self) -> u64 {
        self.card_info().map_or(0, |info| info.num_blocks())
    }
}

impl<D: BlockDevice> BlockDevice for &mut D {
    fn read_block(&mut self, index: u64, block: &mut [u32; SD_BLOCK_WORDS]) -> Result<(), SdError> {
        (**self).read_block(index, block)
    }

    fn write_block(&mut self, index: u64, block: &[u32; SD_BLOCK_WORDS]) -> Result<(), SdError> {
        (**self).write_block(index, block)
    }

    fn num_blocks(&self) -> u64 {
        (**self).num_blocks()
    }
}

/// `embedded-io` reader/writer over a [`BlockDevice`]
///
/// Bytes go through a single working block. Writes land in the working block
/// and reach the device when another block is touched or on
/// [`Write::flush`]. The working block is handed to the device for DMA, so
/// it has to live in DMA capable memory.
pub struct BlockStream<'b, D: BlockDevice> {
    device: D,
    block: &'b mut [u32; SD_BLOCK_WORDS],
    block_num: Option<u64>,
    dirty: bool,
    position: u64,
}

impl<'b, D: BlockDevice> BlockStream<'b, D> {
    pub fn new(device: D, block: &'b mut [u32; SD_BLOCK_WORDS]) -> Self {
        Self {
            device,
            block,
            block_num: None,
            dirty: false,
            position: 0,
        }
    }

    /// Size of the device in bytes
    pub fn len(&self) -> u64 {
        self.device.num_blocks() * SD_BLOCK_LEN as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give the device back. Unflushed writes are lost.
    pub fn release(self) -> D {
        self.device
    }

    /// Make block `index` the working block
    fn load(&mut self, index: u64, fetch: bool) -> Result<(), SdError> {
        if self.block_num == Some(index) {
            return Ok(());
        }

        self.flush()?;

        // Forget the old block first, a failed read leaves garbage behind
        self.block_num = None;
        if fetch {
            self.device.read_block(index, self.block)?;
        }
        self.block_num = Some(index);

        Ok(())
    }
}

impl<'b, D: BlockDevice> Io for BlockStream<'b, D> {
    type Error = SdError;
}

impl<'b, D: BlockDevice> Read for BlockStream<'b, D> {
    /// Read bytes from the current position. Stops at the end of the
    /// working block, so it may return fewer bytes than asked for.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SdError> {
        if buffer.is_empty() || self.position >= self.len() {
            return Ok(0);
        }

        let offset = (self.position % SD_BLOCK_LEN as u64) as usize;
        self.load(self.position / SD_BLOCK_LEN as u64, true)?;

        let count = cmp::min(buffer.len(), SD_BLOCK_LEN - offset);
        let bytes: &[u8] = bytemuck::bytes_of(&*self.block);
        buffer[..count].copy_from_slice(&bytes[offset..offset + count]);

        self.position += count as u64;

        Ok(count)
    }
}

impl<'b, D: BlockDevice> Write for BlockStream<'b, D> {
    /// Write bytes at the current position. Stops at the end of the working
    /// block, so it may take fewer bytes than given.
    fn write(&mut self, buffer: &[u8]) -> Result<usize, SdError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        if self.position >= self.len() {
            return Err(SdError::OutOfBounds {});
        }

        let offset = (self.position % SD_BLOCK_LEN as u64) as usize;
        let count = cmp::min(buffer.len(), SD_BLOCK_LEN - offset);

        // A whole block is overwritten anyway, don't read it first
        let fetch = count != SD_BLOCK_LEN;
        self.load(self.position / SD_BLOCK_LEN as u64, fetch)?;

        let bytes: &mut [u8] = bytemuck::bytes_of_mut(&mut *self.block);
        bytes[offset..offset + count].copy_from_slice(&buffer[..count]);

        self.dirty = true;
        self.position += count as u64;

        Ok(count)
    }

    fn flush(&mut self) -> Result<(), SdError> {
        if let (true, Some(index)) = (self.dirty, self.block_num) {
            self.device.write_block(index, self.block)?;
            self.dirty = false;
        }

        Ok(())
    }
}

impl<'b, D: BlockDevice> Seek for BlockStream<'b, D> {
    fn seek(&mut self, position: SeekFrom) -> Result<u64, SdError> {
        let position = match position {
            SeekFrom::Start(position) => Some(position),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        match position {
            Some(position) if position <= self.len() => {
                self.position = position;
                Ok(position)
            }
            _ => Err(SdError::OutOfBounds {}),
        }
    }
}
