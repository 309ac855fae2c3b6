// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed register access over the [`Transport`], plus the register-poll
//! primitive every higher-level operation in this crate is built on.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Operation attribute register; bit0 is the erase-busy flag.
pub const CMD_ATTR: u8 = 0x60;
/// Erase opcode register: 0x20 sector, 0xD8 block.
pub const ERASE_OPCODE: u8 = 0x61;
pub const CMD_ADDR_HI: u8 = 0x64;
pub const CMD_ADDR_MID: u8 = 0x65;
pub const CMD_ADDR_LO: u8 = 0x66;
/// Flash read opcode register (0x03).
pub const READ_OPCODE: u8 = 0x6A;
/// Flash write opcode register (0x02).
pub const WRITE_OPCODE: u8 = 0x6D;
/// MCU mode register: bit7 ISP, bit5 WRITE_BUSY, bit4 WRITE_BUF.
pub const MCU_MODE: u8 = 0x6F;
pub const WRITE_FIFO: u8 = 0x70;
/// Write length register; holds `count - 1` (0xFF means 256 bytes).
pub const WRITE_LEN: u8 = 0x71;
pub const INDIRECT_LO: u8 = 0xF4;
pub const INDIRECT_HI: u8 = 0xF5;

pub const MCU_MODE_ISP: u8 = 1 << 7;
pub const MCU_MODE_WRITE_BUSY: u8 = 1 << 5;
pub const MCU_MODE_WRITE_BUF: u8 = 1 << 4;
pub const CMD_ATTR_ERASE_BUSY: u8 = 1 << 0;

pub const GPIO88_CONFIG: u16 = 0x104F;
pub const GPIO88_VALUE: u16 = 0xFE3F;
pub const MCU_CLOCK: u16 = 0x06A0;
pub const MCU_CLOCK_ACCELERATE: u8 = 0x74;

/// Typed wrapper around a [`Transport`] implementing the direct and
/// indirect-16-bit register access patterns the RTD2142 uses, plus
/// register-poll-with-deadline.
pub struct Registers<T> {
    bus: T,
}

impl<T: Transport> Registers<T> {
    pub fn new(bus: T) -> Self {
        Self { bus }
    }

    pub fn into_inner(self) -> T {
        self.bus
    }

    pub fn bus_mut(&mut self) -> &mut T {
        &mut self.bus
    }

    /// `write_reg(addr, val)` -> transaction `[addr, val]`.
    pub fn write_reg(&mut self, addr: u8, val: u8) -> Result<()> {
        log::trace!("write_reg({addr:#04x}, {val:#04x})");
        self.bus.write(&[addr, val]).map_err(Error::from)
    }

    /// `write_reg_burst(addr, data)` -> one transaction `[addr, data...]`.
    pub fn write_reg_burst(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        log::trace!("write_reg_burst({addr:#04x}, {} bytes)", data.len());
        let mut tx = Vec::with_capacity(1 + data.len());
        tx.push(addr);
        tx.extend_from_slice(data);
        self.bus.write(&tx).map_err(Error::from)
    }

    /// `read_reg(addr)` -> write `[addr]` then read one byte.
    pub fn read_reg(&mut self, addr: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.bus.write_then_read(&[addr], &mut buf)?;
        log::trace!("read_reg({addr:#04x}) = {:#04x}", buf[0]);
        Ok(buf[0])
    }

    /// Reads `buf.len()` bytes starting at the current read pointer, in one
    /// transaction (used by the flash reader for its chunked bursts).
    pub fn read_burst(&mut self, buf: &mut [u8]) -> Result<()> {
        self.bus.read(buf).map_err(Error::from)
    }

    /// Points the 16-bit indirect register window at `addr16`.
    pub fn set_indirect(&mut self, addr16: u16) -> Result<()> {
        self.write_reg(INDIRECT_LO, 0x9F)?;
        self.write_reg(INDIRECT_HI, (addr16 >> 8) as u8)?;
        self.write_reg(INDIRECT_LO, (addr16 & 0xFF) as u8)
    }

    pub fn read_reg_indirect(&mut self, addr16: u16) -> Result<u8> {
        self.set_indirect(addr16)?;
        self.read_reg(INDIRECT_HI)
    }

    pub fn write_reg_indirect(&mut self, addr16: u16, val: u8) -> Result<()> {
        self.set_indirect(addr16)?;
        self.write_reg(INDIRECT_HI, val)
    }

    /// Reads `addr` in a loop, sleeping 1 ms between reads, until
    /// `(value & mask) == expected` or `timeout` elapses from the moment
    /// this call started (an absolute monotonic deadline computed once).
    pub fn poll_reg(
        &mut self,
        addr: u8,
        mask: u8,
        expected: u8,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let value = self.read_reg(addr)?;
            if value & mask == expected {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    addr,
                    mask,
                    expected,
                    last_value: value,
                    timeout,
                });
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}
