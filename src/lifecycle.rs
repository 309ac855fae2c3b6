// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detach/attach lifecycle: transitions the MCU between normal operation
//! and ISP (In-System Programming) mode.

use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gpio;
use crate::progress::{ProgressSink, Status};
use crate::register::{
    Registers, MCU_CLOCK, MCU_CLOCK_ACCELERATE, MCU_MODE, MCU_MODE_ISP,
};
use crate::transport::Transport;

const ISP_ENTRY_TIMEOUT: Duration = Duration::from_secs(60);
const RESET_CONFIRM_SETTLE: Duration = Duration::from_secs(1);

/// Register whose bit `0x02` requests an MCU reset. NACKs are expected and
/// ignored when writing it, since the MCU is powering down mid-transaction.
const RESET_REQUEST_REG: u8 = 0xEE;
const RESET_REQUEST_BIT: u8 = 0x02;

/// Enters programming mode: switches the MCU into ISP, accelerates its
/// clock, and disables the external flash's hardware write-protect.
///
/// On success the caller's device-flags should gain `IS_BOOTLOADER`.
pub fn detach<T: Transport>(
    regs: &mut Registers<T>,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    progress.set_status(Status::Restart);
    regs.write_reg(MCU_MODE, MCU_MODE_ISP)?;
    regs.poll_reg(MCU_MODE, MCU_MODE_ISP, MCU_MODE_ISP, ISP_ENTRY_TIMEOUT)?;

    regs.write_reg_indirect(MCU_CLOCK, MCU_CLOCK_ACCELERATE)?;

    progress.set_status(Status::Idle);

    gpio::configure_push_pull(regs)?;
    gpio::set_level(regs, true)?;

    Ok(())
}

/// Leaves programming mode: re-enables write-protect, then if the MCU is
/// still in ISP mode, requests a reset and confirms it actually left ISP.
///
/// Returns `Error::NeedsUserAction { needs_shutdown: true }` if the MCU is
/// still in ISP mode one second after the reset request, since this
/// indicates the MCU needs a manual power cycle.
///
/// On success the caller's device-flags should lose `IS_BOOTLOADER`.
pub fn attach<T: Transport>(
    regs: &mut Registers<T>,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    gpio::set_level(regs, false)?;

    let mode = regs.read_reg(MCU_MODE)?;
    if mode & MCU_MODE_ISP == MCU_MODE_ISP {
        progress.set_status(Status::Restart);

        let current = regs.read_reg(RESET_REQUEST_REG)?;
        // The MCU powers down mid-write, so the bus frequently NACKs this
        // one; that's expected and intentionally ignored.
        let _ = regs.write_reg(RESET_REQUEST_REG, current | RESET_REQUEST_BIT);

        thread::sleep(RESET_CONFIRM_SETTLE);

        let mode_after = regs.read_reg(MCU_MODE)?;
        if mode_after & MCU_MODE_ISP == MCU_MODE_ISP {
            return Err(Error::NeedsUserAction {
                needs_shutdown: true,
            });
        }
    }

    progress.set_status(Status::Idle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{GPIO88_CONFIG, GPIO88_VALUE, INDIRECT_HI, INDIRECT_LO};
    use crate::transport::mock::MockBus;

    #[test]
    fn detach_enters_isp_accelerates_clock_and_drives_gpio_high() {
        let mut bus = MockBus::new();
        bus.expect_write(vec![MCU_MODE, MCU_MODE_ISP])
            .expect_write(vec![MCU_MODE])
            .expect_read(vec![MCU_MODE_ISP])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (MCU_CLOCK >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (MCU_CLOCK & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI, MCU_CLOCK_ACCELERATE])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_CONFIG >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_CONFIG & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI])
            .expect_read(vec![0x00])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_CONFIG >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_CONFIG & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI, 0x01])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_VALUE >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_VALUE & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI])
            .expect_read(vec![0x00])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_VALUE >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_VALUE & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI, 0x01]);
        let mut regs = Registers::new(bus);
        detach(&mut regs, &mut ()).unwrap();
        assert!(regs.into_inner().is_drained());
    }

    /// E6: the MCU refuses to leave ISP mode after a reset request.
    #[test]
    fn e6_reset_confirm_failure_yields_needs_user_action() {
        let mut bus = MockBus::new();
        bus.expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_VALUE >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_VALUE & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI])
            .expect_read(vec![0x01])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_VALUE >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_VALUE & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI, 0x00])
            .expect_write(vec![MCU_MODE])
            .expect_read(vec![MCU_MODE_ISP])
            .expect_write(vec![RESET_REQUEST_REG])
            .expect_read(vec![0x00])
            .expect_write(vec![
                RESET_REQUEST_REG,
                RESET_REQUEST_BIT,
            ])
            .expect_write(vec![MCU_MODE])
            .expect_read(vec![MCU_MODE_ISP]);
        let mut regs = Registers::new(bus);
        let err = attach(&mut regs, &mut ()).unwrap_err();
        assert!(matches!(
            err,
            Error::NeedsUserAction {
                needs_shutdown: true
            }
        ));
        assert!(err.needs_shutdown());
    }

    #[test]
    fn attach_when_already_out_of_isp_does_not_touch_reset_register() {
        let mut bus = MockBus::new();
        bus.expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_VALUE >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_VALUE & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI])
            .expect_read(vec![0x01])
            .expect_write(vec![INDIRECT_LO, 0x9F])
            .expect_write(vec![INDIRECT_HI, (GPIO88_VALUE >> 8) as u8])
            .expect_write(vec![INDIRECT_LO, (GPIO88_VALUE & 0xFF) as u8])
            .expect_write(vec![INDIRECT_HI, 0x00])
            .expect_write(vec![MCU_MODE])
            .expect_read(vec![0x00]);
        let mut regs = Registers::new(bus);
        attach(&mut regs, &mut ()).unwrap();
        assert!(regs.into_inner().is_drained());
    }
}
