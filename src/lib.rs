// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware-update core for the Realtek RTD2142 DisplayPort MST hub.
//!
//! This crate owns the in-band control protocol (DDC/CI over the DP AUX
//! I²C side-channel), the register-level SPI-flash programming state
//! machine, the dual-bank selection policy, and the ISP detach/attach
//! lifecycle. It does not enumerate DP-AUX devices, load configuration, or
//! parse firmware containers: those are the host daemon's job, consumed
//! here only through [`resolver::BusResolver`] and [`quirks::Quirks`].
//!
//! Control flow mirrors the host's driving sequence:
//! [`Session::open`](session::Session::open) → `setup` → `detach` →
//! `write_firmware` → `attach` → `reload`.

pub mod ddcci;
pub mod error;
pub mod flash;
pub mod gpio;
pub mod lifecycle;
pub mod progress;
pub mod quirks;
pub mod register;
pub mod resolver;
pub mod sequencer;
pub mod session;
pub mod transport;

pub use ddcci::{ActiveBank, DualBankMode, DualBankStatus};
pub use error::{Error, Result};
pub use progress::{ProgressSink, Status};
pub use quirks::Quirks;
pub use resolver::BusResolver;
pub use session::{probe, DeviceFlags, ProbedDevice, Session};
