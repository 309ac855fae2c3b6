// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flash read/erase/write primitives built on top of [`Registers`].

use std::time::Duration;

use crate::error::{Error, Result};
use crate::register::{
    Registers, CMD_ADDR_HI, CMD_ADDR_LO, CMD_ADDR_MID, CMD_ATTR,
    CMD_ATTR_ERASE_BUSY, ERASE_OPCODE, MCU_MODE, MCU_MODE_ISP,
    MCU_MODE_WRITE_BUF, MCU_MODE_WRITE_BUSY, READ_OPCODE, WRITE_FIFO,
    WRITE_LEN, WRITE_OPCODE,
};
use crate::transport::Transport;

/// Total addressable flash size.
pub const FLASH_SIZE: u32 = 0x100000;
/// Erase-sector granularity.
pub const SECTOR_SIZE: u32 = 0x1000;
/// Erase-block granularity.
pub const BLOCK_SIZE: u32 = 0x10000;
/// Maximum bytes per paged write.
pub const MAX_PAGE: usize = 256;

/// `CMD_ATTR` value selecting erase type and asserting WEL, written before
/// the erase opcode register.
const CMD_ATTR_ERASE_SETUP: u8 = 0xB8;
const ERASE_SECTOR_OPCODE: u8 = 0x20;
const ERASE_BLOCK_OPCODE: u8 = 0xD8;
const READ_FLASH_OPCODE: u8 = 0x03;
const WRITE_FLASH_OPCODE: u8 = 0x02;

const ERASE_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_BUF_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// A no-op progress callback for callers that don't care about chunk
/// progress.
fn no_progress(_done: usize, _total: usize) {}

/// Flash operations over the RTD2142's command/address/FIFO register window.
///
/// Every operation here assumes the session is already in ISP mode (entered
/// by the lifecycle controller's Detach) and that hardware write-protect is
/// disabled.
pub struct Flash<'a, T> {
    regs: &'a mut Registers<T>,
}

impl<'a, T: Transport> Flash<'a, T> {
    pub fn new(regs: &'a mut Registers<T>) -> Self {
        Self { regs }
    }

    fn set_address(&mut self, addr: u32) -> Result<()> {
        self.regs.write_reg(CMD_ADDR_HI, (addr >> 16) as u8)?;
        self.regs.write_reg(CMD_ADDR_MID, (addr >> 8) as u8)?;
        self.regs.write_reg(CMD_ADDR_LO, addr as u8)
    }

    /// Reads `buf.len()` bytes starting at `addr`, reporting `(done, total)`
    /// after each ≤256-byte chunk.
    ///
    /// The read transaction's first returned byte is unpredictable, so the
    /// operation starts one byte before the requested address (wrapping
    /// modulo 2^24, not modulo the flash size) and discards that byte.
    pub fn read_with_progress(
        &mut self,
        addr: u32,
        buf: &mut [u8],
        mut on_chunk: impl FnMut(usize, usize),
    ) -> Result<()> {
        let read_addr = addr.wrapping_sub(1) & 0x00FF_FFFF;
        self.set_address(read_addr)?;
        self.regs.write_reg(READ_OPCODE, READ_FLASH_OPCODE)?;
        // Prime the read pointer and discard the garbage leading byte.
        self.regs.read_reg(WRITE_FIFO)?;

        let total = buf.len();
        let mut done = 0;
        while done < total {
            let chunk_len = (total - done).min(MAX_PAGE);
            self.regs.read_burst(&mut buf[done..done + chunk_len])?;
            done += chunk_len;
            on_chunk(done, total);
        }
        Ok(())
    }

    /// [`Self::read_with_progress`] without progress reporting.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.read_with_progress(addr, buf, no_progress)
    }

    fn wait_erase_done(&mut self) -> Result<()> {
        self.regs
            .poll_reg(CMD_ATTR, CMD_ATTR_ERASE_BUSY, 0, ERASE_TIMEOUT)
    }

    /// Erases the 4 KiB sector containing `addr`. `addr` must be
    /// sector-aligned.
    pub fn erase_sector(&mut self, addr: u32) -> Result<()> {
        if addr % SECTOR_SIZE != 0 {
            return Err(Error::Internal(format!(
                "erase_sector: {addr:#08x} is not 4 KiB aligned"
            )));
        }
        self.set_address(addr)?;
        self.regs.write_reg(CMD_ATTR, CMD_ATTR_ERASE_SETUP)?;
        self.regs.write_reg(ERASE_OPCODE, ERASE_SECTOR_OPCODE)?;
        self.regs
            .write_reg(CMD_ATTR, CMD_ATTR_ERASE_SETUP | CMD_ATTR_ERASE_BUSY)?;
        self.wait_erase_done()
    }

    /// Erases the 64 KiB block containing `addr`. `addr` must be
    /// block-aligned; the mid/lo address bytes are forced to 0, as the chip
    /// uses only the high address byte for block selection.
    pub fn erase_block(&mut self, addr: u32) -> Result<()> {
        if addr % BLOCK_SIZE != 0 {
            return Err(Error::Internal(format!(
                "erase_block: {addr:#08x} is not 64 KiB aligned"
            )));
        }
        self.regs.write_reg(CMD_ADDR_HI, (addr >> 16) as u8)?;
        self.regs.write_reg(CMD_ADDR_MID, 0)?;
        self.regs.write_reg(CMD_ADDR_LO, 0)?;
        self.regs.write_reg(CMD_ATTR, CMD_ATTR_ERASE_SETUP)?;
        self.regs.write_reg(ERASE_OPCODE, ERASE_BLOCK_OPCODE)?;
        self.regs
            .write_reg(CMD_ATTR, CMD_ATTR_ERASE_SETUP | CMD_ATTR_ERASE_BUSY)?;
        self.wait_erase_done()
    }

    /// Writes one page of at most [`MAX_PAGE`] bytes starting at `addr`.
    /// `addr` is not required to be page-aligned, but the write must not
    /// cross a page boundary (the sequencer's chunking enforces this).
    pub fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > MAX_PAGE {
            return Err(Error::Internal(format!(
                "write_page: invalid length {}",
                data.len()
            )));
        }

        let len_reg = if data.len() == MAX_PAGE {
            0xFF
        } else {
            (data.len() - 1) as u8
        };

        self.regs.write_reg(WRITE_OPCODE, WRITE_FLASH_OPCODE)?;
        self.regs.write_reg(WRITE_LEN, len_reg)?;
        self.set_address(addr)?;
        self.regs
            .poll_reg(MCU_MODE, MCU_MODE_WRITE_BUF, 0, WRITE_BUF_DRAIN_TIMEOUT)?;
        self.regs.write_reg_burst(WRITE_FIFO, data)?;
        self.regs
            .write_reg(MCU_MODE, MCU_MODE_ISP | MCU_MODE_WRITE_BUSY)?;
        self.regs
            .poll_reg(MCU_MODE, MCU_MODE_WRITE_BUSY, 0, WRITE_BUSY_TIMEOUT)
            .map_err(|source| Error::PageWriteTimeout {
                address: addr,
                source: Box::new(source),
            })
    }
}
