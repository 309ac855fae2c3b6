// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking byte-level I2C transport.
//!
//! Every operation targets offset 0 of the underlying bus: a `write` is one
//! START-ADDR-DATA-STOP transaction, and a `read` is one START-ADDR-DATA-STOP
//! transaction in the other direction, matching i2c-dev semantics on Linux.
//! The peripheral address is latched once, at open time.

use std::io;
use std::path::Path;

/// The RTD2142's fixed 7-bit I2C peripheral address.
pub const PERIPHERAL_ADDRESS: u16 = 0x35;

/// Abstracts the byte-level I2C bus so the register layer can run against a
/// real `/dev/i2c-N` device or a scripted mock.
pub trait Transport {
    /// Issues one write transaction containing `bytes`.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Issues one read transaction, filling `buf` completely.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Writes `tx` then reads into `rx`, as two separate transactions.
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        self.write(tx)?;
        self.read(rx)
    }
}

#[cfg(unix)]
mod linux {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::unix::io::AsRawFd;

    // From include/uapi/linux/i2c-dev.h. This ioctl predates the
    // `_IOW`-style request-number encoding, so it must be issued with the
    // literal request number rather than nix's usual encoded macros.
    const I2C_SLAVE: u64 = 0x0703;

    nix::ioctl_write_int_bad!(set_slave_address, I2C_SLAVE);

    /// A real I2C bus backed by a Linux `i2c-dev` character device.
    pub struct LinuxI2cBus {
        file: File,
    }

    impl LinuxI2cBus {
        /// Opens `path` and latches `address` as the peripheral address for
        /// every subsequent transaction on this descriptor.
        pub fn open(path: impl AsRef<Path>, address: u16) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path.as_ref())?;

            // Safety: `set_slave_address` is a plain integer ioctl with no
            // pointer argument; the fd stays valid for the call's duration.
            unsafe { set_slave_address(file.as_raw_fd(), address as _) }
                .map_err(io::Error::from)?;

            Ok(Self { file })
        }
    }

    impl Transport for LinuxI2cBus {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.file.write_all(bytes)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
            self.file.read_exact(buf)
        }
    }
}

#[cfg(unix)]
pub use linux::LinuxI2cBus;
