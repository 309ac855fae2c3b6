// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device session: the handle the host daemon drives through
//! `open → setup → detach → write_firmware → attach → reload`.

use bitflags::bitflags;

use crate::ddcci::{self, ActiveBank};
use crate::error::{Error, Result};
use crate::flash::{Flash, FLASH_SIZE};
use crate::lifecycle;
use crate::progress::{ProgressSink, Status};
use crate::quirks::Quirks;
use crate::register::Registers;
use crate::resolver::BusResolver;
use crate::sequencer::{self, USER_IMAGE_SIZE};
use crate::transport::{Transport, PERIPHERAL_ADDRESS};

bitflags! {
    /// Capability/state flags reported to the host alongside the version
    /// string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        /// Dual-bank enabled and in `Diff` mode: an update can proceed.
        const UPDATABLE        = 1 << 0;
        /// Device lives behind an internal (non-removable) connector.
        const INTERNAL          = 1 << 1;
        /// Has an A/B image layout (always set for this chip).
        const DUAL_IMAGE        = 1 << 2;
        /// The active image can be read back for verification.
        const CAN_VERIFY_IMAGE  = 1 << 3;
        /// Currently in ISP mode (between Detach and Attach).
        const IS_BOOTLOADER     = 1 << 4;
        /// Attach failed to confirm ISP exit; needs a manual power cycle.
        const NEEDS_SHUTDOWN    = 1 << 5;
    }
}

/// A probed device, produced by `probe` before a bus connection is opened.
pub struct ProbedDevice {
    dp_aux_name: String,
    bus_path: std::path::PathBuf,
}

/// Looks up the I²C bus for the device named by the `RealtekMstDpAuxName`
/// quirk key.
pub fn probe(
    quirks: &Quirks,
    resolver: &dyn BusResolver,
) -> Result<ProbedDevice> {
    quirks.validate()?;
    let dp_aux_name = quirks.dp_aux_name()?.to_string();
    let bus_path = resolver.resolve(&dp_aux_name)?;
    Ok(ProbedDevice {
        dp_aux_name,
        bus_path,
    })
}

/// An open device session: owns the transport, the last-probed active
/// bank, and the device flags/version exposed to the host.
pub struct Session<T> {
    regs: Registers<T>,
    dp_aux_name: String,
    active_bank: ActiveBank,
    flags: DeviceFlags,
    version: Option<String>,
}

impl Session<crate::transport::LinuxI2cBus> {
    /// Opens the bus found by `probe` and latches the peripheral address.
    pub fn open(probed: ProbedDevice) -> Result<Self> {
        let bus = crate::transport::LinuxI2cBus::open(
            &probed.bus_path,
            PERIPHERAL_ADDRESS,
        )?;
        Ok(Self::from_transport(bus, probed.dp_aux_name))
    }
}

impl<T: Transport> Session<T> {
    /// Constructs a session directly from an already-opened transport
    /// (used by `Session::open` for the real bus and by tests for the
    /// mock one).
    pub fn from_transport(bus: T, dp_aux_name: String) -> Self {
        Self {
            regs: Registers::new(bus),
            dp_aux_name,
            active_bank: ActiveBank::Invalid,
            flags: DeviceFlags::DUAL_IMAGE | DeviceFlags::CAN_VERIFY_IMAGE,
            version: None,
        }
    }

    pub fn dp_aux_name(&self) -> &str {
        &self.dp_aux_name
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn active_bank(&self) -> ActiveBank {
        self.active_bank
    }

    /// Queries dual-bank status and refreshes `flags`/`version`/
    /// `active_bank`. Idempotent: calling it twice in a row with no
    /// intervening chip state change yields identical results.
    fn probe_version(&mut self) -> Result<()> {
        self.flags.remove(DeviceFlags::UPDATABLE);
        self.active_bank = ActiveBank::Invalid;
        self.version = None;

        let status = ddcci::query_dual_bank_status(&mut self.regs)?;
        if !status.updatable() {
            return Ok(());
        }

        self.flags.insert(DeviceFlags::UPDATABLE);
        self.active_bank = status.active_bank;

        self.version = match status.active_bank {
            ActiveBank::User1 => Some(format_version(status.user1_version)),
            ActiveBank::User2 => Some(format_version(status.user2_version)),
            ActiveBank::Boot | ActiveBank::Invalid => None,
        };

        Ok(())
    }

    /// Initial version probe after `open`.
    pub fn setup(&mut self) -> Result<()> {
        self.probe_version()
    }

    /// Re-probes version after `attach`, with the same semantics as
    /// `setup`.
    pub fn reload(&mut self) -> Result<()> {
        self.probe_version()
    }

    /// Enters programming mode.
    pub fn detach(&mut self, progress: &mut dyn ProgressSink) -> Result<()> {
        lifecycle::detach(&mut self.regs, progress)?;
        self.flags.insert(DeviceFlags::IS_BOOTLOADER);
        Ok(())
    }

    /// Leaves programming mode.
    pub fn attach(&mut self, progress: &mut dyn ProgressSink) -> Result<()> {
        match lifecycle::attach(&mut self.regs, progress) {
            Ok(()) => {
                self.flags.remove(DeviceFlags::IS_BOOTLOADER);
                Ok(())
            }
            Err(err) => {
                if err.needs_shutdown() {
                    self.flags.insert(DeviceFlags::NEEDS_SHUTDOWN);
                }
                Err(err)
            }
        }
    }

    /// Writes `blob` to the inactive bank, verifies it, and rewrites the
    /// activation flag. Requires a prior `detach`.
    pub fn write_firmware(
        &mut self,
        blob: &[u8],
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        sequencer::write_firmware(
            &mut self.regs,
            self.active_bank,
            blob,
            progress,
        )
    }

    /// Reads the active bank's image. Fails unless the active bank is a
    /// user bank.
    pub fn read_firmware(
        &mut self,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        let base = match self.active_bank {
            ActiveBank::User1 => sequencer::USER1_BASE,
            ActiveBank::User2 => sequencer::USER2_BASE,
            ActiveBank::Boot | ActiveBank::Invalid => {
                return Err(Error::NotSupported(
                    "read_firmware requires an active user bank".into(),
                ));
            }
        };
        progress.set_status(Status::Read);
        let mut buf = vec![0u8; USER_IMAGE_SIZE as usize];
        Flash::new(&mut self.regs).read_with_progress(
            base,
            &mut buf,
            |done, total| progress.set_progress(done, total),
        )?;
        Ok(buf)
    }

    /// Reads the entire flash.
    pub fn dump_firmware(
        &mut self,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        progress.set_status(Status::Read);
        let mut buf = vec![0u8; FLASH_SIZE as usize];
        Flash::new(&mut self.regs).read_with_progress(
            0,
            &mut buf,
            |done, total| progress.set_progress(done, total),
        )?;
        Ok(buf)
    }

    /// Releases the transport, consuming the session.
    pub fn close(self) -> T {
        self.regs.into_inner()
    }
}

fn format_version(version: (u8, u8)) -> String {
    format!("{}.{}", version.0, version.1)
}
