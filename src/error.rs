// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error kinds produced by the RTD2142 firmware-update core.

use std::time::Duration;

/// Errors that can be produced from the core's public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown quirk key, unsupported device, missing AUX name, bus
    /// discovery failure, or `read_firmware` requested on a bank that isn't
    /// a user bank.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// An underlying I2C read/write failed.
    #[error("i2c transport error")]
    Io(#[from] std::io::Error),

    /// `poll_reg` exceeded its deadline.
    #[error(
        "timed out waiting for register {addr:#04x} & {mask:#04x} == \
         {expected:#04x} (last read {last_value:#04x}) after {timeout:?}"
    )]
    Timeout {
        addr: u8,
        mask: u8,
        expected: u8,
        last_value: u8,
        timeout: Duration,
    },

    /// A page write's busy-poll timed out; carries the page address that was
    /// being written when the timeout occurred.
    #[error("page write at {address:#08x} timed out")]
    PageWriteTimeout {
        address: u32,
        #[source]
        source: Box<Error>,
    },

    /// Read-back after `write_firmware` did not match the image that was
    /// written.
    #[error("flash contents after write do not match firmware image")]
    VerifyMismatch,

    /// The MCU did not leave ISP mode after Attach requested a reset.
    #[error("device failed to reset when requested")]
    NeedsUserAction { needs_shutdown: bool },

    /// An assertion about chip state that should be unreachable failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn needs_shutdown(&self) -> bool {
        matches!(self, Error::NeedsUserAction { needs_shutdown: true })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
