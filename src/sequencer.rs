// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Update sequencer: target-bank selection, erase/write/verify, flag
//! record rewrite.

use crate::ddcci::ActiveBank;
use crate::error::{Error, Result};
use crate::flash::{Flash, BLOCK_SIZE, MAX_PAGE};
use crate::progress::{ProgressSink, Status};
use crate::register::Registers;
use crate::transport::Transport;

/// Base offset and size of the USER1 image region.
pub const USER1_BASE: u32 = 0x10000;
/// Base offset and size of the USER2 image region.
pub const USER2_BASE: u32 = 0x80000;
/// Size of each user image region; also the firmware blob's required size.
pub const USER_IMAGE_SIZE: u32 = 0x70000;
/// Offset of the USER1 activation flag record.
pub const FLAG1_ADDRESS: u32 = 0xFE304;
/// Offset of the USER2 activation flag record.
pub const FLAG2_ADDRESS: u32 = 0xFF304;
/// Size in bytes of a flag record.
pub const FLAG_RECORD_SIZE: u32 = 5;

/// The fixed 5-byte record written to a flag slot to mark it non-virgin.
/// Its meaning beyond that is opaque to this crate: the MCU rewrites it on
/// its next boot.
const FLAG_RECORD: [u8; 5] = [0xAA, 0xAA, 0xAA, 0xFF, 0xFF];

/// The bank targeted by an update, with its flash layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBank {
    pub base: u32,
    pub flag_address: u32,
}

/// Picks the update target: `User1` targets `User2`; `User2` or `Boot`
/// target `User1`. The active image is never disturbed.
pub fn select_target(active_bank: ActiveBank) -> TargetBank {
    match active_bank {
        ActiveBank::User1 => TargetBank {
            base: USER2_BASE,
            flag_address: FLAG2_ADDRESS,
        },
        ActiveBank::User2 | ActiveBank::Boot | ActiveBank::Invalid => {
            TargetBank {
                base: USER1_BASE,
                flag_address: FLAG1_ADDRESS,
            }
        }
    }
}

/// Writes `blob` (must be exactly [`USER_IMAGE_SIZE`] bytes) to the inactive
/// bank selected by `active_bank`, verifies it by readback, then rewrites
/// that bank's flag record.
///
/// The caller must already have completed Detach (ISP mode entered, write
/// protect disabled) before calling this.
pub fn write_firmware<T: Transport>(
    regs: &mut Registers<T>,
    active_bank: ActiveBank,
    blob: &[u8],
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    if blob.len() != USER_IMAGE_SIZE as usize {
        return Err(Error::Internal(format!(
            "write_firmware: blob is {} bytes, expected {USER_IMAGE_SIZE:#x}",
            blob.len()
        )));
    }

    let target = select_target(active_bank);
    let mut flash = Flash::new(regs);

    progress.set_status(Status::Erase);
    let block_count = USER_IMAGE_SIZE / BLOCK_SIZE;
    for i in 0..block_count {
        flash.erase_block(target.base + i * BLOCK_SIZE)?;
        progress.set_progress((i + 1) as usize, block_count as usize);
    }

    progress.set_status(Status::Write);
    write_paged(&mut flash, target.base, blob, progress)?;

    progress.set_status(Status::Verify);
    let mut readback = vec![0u8; blob.len()];
    flash.read_with_progress(target.base, &mut readback, |done, total| {
        progress.set_progress(done, total)
    })?;
    if readback != blob {
        return Err(Error::VerifyMismatch);
    }

    progress.set_status(Status::Erase);
    let flag_sector = target.flag_address & !0xFFF;
    flash.erase_sector(flag_sector)?;

    progress.set_status(Status::Write);
    flash.write_page(target.flag_address, &FLAG_RECORD)?;

    Ok(())
}

fn write_paged<T: Transport>(
    flash: &mut Flash<'_, T>,
    base: u32,
    blob: &[u8],
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    let total = blob.len();
    let mut done = 0;
    for chunk in blob.chunks(MAX_PAGE) {
        flash.write_page(base + done as u32, chunk)?;
        done += chunk.len();
        progress.set_progress(done, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockBus;

    #[test]
    fn target_selection_follows_the_active_bank() {
        assert_eq!(select_target(ActiveBank::User1).base, USER2_BASE);
        assert_eq!(select_target(ActiveBank::User1).flag_address, FLAG2_ADDRESS);
        assert_eq!(select_target(ActiveBank::User2).base, USER1_BASE);
        assert_eq!(select_target(ActiveBank::Boot).base, USER1_BASE);
        assert_eq!(select_target(ActiveBank::Invalid).base, USER1_BASE);
    }

    #[test]
    fn rejects_wrong_sized_blob() {
        let mut regs = Registers::new(MockBus::new());
        let err = write_firmware(
            &mut regs,
            ActiveBank::User1,
            &[0u8; 16],
            &mut (),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    /// E4: update from User1 erases seven 64 KiB blocks of USER2, writes the
    /// blob in 256-byte pages, verifies by readback, then rewrites FLAG2.
    #[test]
    fn e4_update_from_user1_targets_user2_and_rewrites_flag2() {
        let blob = vec![0xA5u8; USER_IMAGE_SIZE as usize];
        let mut bus = MockBus::new();

        for i in 0..7u32 {
            let base = USER2_BASE + i * BLOCK_SIZE;
            bus.expect_write(vec![
                crate::register::CMD_ADDR_HI,
                (base >> 16) as u8,
            ])
            .expect_write(vec![crate::register::CMD_ADDR_MID, 0])
            .expect_write(vec![crate::register::CMD_ADDR_LO, 0])
            .expect_write(vec![crate::register::CMD_ATTR, 0xB8])
            .expect_write(vec![crate::register::ERASE_OPCODE, 0xD8])
            .expect_write(vec![crate::register::CMD_ATTR, 0xB9])
            .expect_write(vec![crate::register::CMD_ATTR])
            .expect_read(vec![0]);
        }

        for (i, chunk) in blob.chunks(MAX_PAGE).enumerate() {
            let addr = USER2_BASE + (i * MAX_PAGE) as u32;
            bus.expect_write(vec![crate::register::WRITE_OPCODE, 0x02])
                .expect_write(vec![crate::register::WRITE_LEN, 0xFF])
                .expect_write(vec![
                    crate::register::CMD_ADDR_HI,
                    (addr >> 16) as u8,
                ])
                .expect_write(vec![
                    crate::register::CMD_ADDR_MID,
                    (addr >> 8) as u8,
                ])
                .expect_write(vec![crate::register::CMD_ADDR_LO, addr as u8])
                .expect_write(vec![crate::register::MCU_MODE])
                .expect_read(vec![0]);
            let mut tx = vec![crate::register::WRITE_FIFO];
            tx.extend_from_slice(chunk);
            bus.expect_write(tx)
                .expect_write(vec![
                    crate::register::MCU_MODE,
                    crate::register::MCU_MODE_ISP
                        | crate::register::MCU_MODE_WRITE_BUSY,
                ])
                .expect_write(vec![crate::register::MCU_MODE])
                .expect_read(vec![0]);
        }

        let read_addr = USER2_BASE.wrapping_sub(1) & 0x00FF_FFFF;
        bus.expect_write(vec![
            crate::register::CMD_ADDR_HI,
            (read_addr >> 16) as u8,
        ])
        .expect_write(vec![
            crate::register::CMD_ADDR_MID,
            (read_addr >> 8) as u8,
        ])
        .expect_write(vec![crate::register::CMD_ADDR_LO, read_addr as u8])
        .expect_write(vec![crate::register::READ_OPCODE, 0x03])
        .expect_write(vec![crate::register::WRITE_FIFO])
        .expect_read(vec![0xFF]);
        for chunk in blob.chunks(MAX_PAGE) {
            bus.expect_read(chunk.to_vec());
        }

        let flag_sector = FLAG2_ADDRESS & !0xFFF;
        bus.expect_write(vec![
            crate::register::CMD_ADDR_HI,
            (flag_sector >> 16) as u8,
        ])
        .expect_write(vec![crate::register::CMD_ADDR_MID, (flag_sector >> 8) as u8])
        .expect_write(vec![crate::register::CMD_ADDR_LO, flag_sector as u8])
        .expect_write(vec![crate::register::CMD_ATTR, 0xB8])
        .expect_write(vec![crate::register::ERASE_OPCODE, 0x20])
        .expect_write(vec![crate::register::CMD_ATTR, 0xB9])
        .expect_write(vec![crate::register::CMD_ATTR])
        .expect_read(vec![0]);

        bus.expect_write(vec![crate::register::WRITE_OPCODE, 0x02])
            .expect_write(vec![crate::register::WRITE_LEN, 0x04])
            .expect_write(vec![
                crate::register::CMD_ADDR_HI,
                (FLAG2_ADDRESS >> 16) as u8,
            ])
            .expect_write(vec![
                crate::register::CMD_ADDR_MID,
                (FLAG2_ADDRESS >> 8) as u8,
            ])
            .expect_write(vec![crate::register::CMD_ADDR_LO, FLAG2_ADDRESS as u8])
            .expect_write(vec![crate::register::MCU_MODE])
            .expect_read(vec![0]);
        let mut tx = vec![crate::register::WRITE_FIFO];
        tx.extend_from_slice(&FLAG_RECORD);
        bus.expect_write(tx)
            .expect_write(vec![
                crate::register::MCU_MODE,
                crate::register::MCU_MODE_ISP
                    | crate::register::MCU_MODE_WRITE_BUSY,
            ])
            .expect_write(vec![crate::register::MCU_MODE])
            .expect_read(vec![0]);

        let mut regs = Registers::new(bus);
        write_firmware(&mut regs, ActiveBank::User1, &blob, &mut ()).unwrap();
        assert!(regs.into_inner().is_drained());
    }

    /// E5: a verify readback mismatch fails the update before any flag
    /// rewrite is attempted.
    #[test]
    fn e5_verify_mismatch_skips_flag_rewrite() {
        let blob = vec![0xA5u8; USER_IMAGE_SIZE as usize];
        let mut bus = MockBus::new();

        for i in 0..7u32 {
            let base = USER2_BASE + i * BLOCK_SIZE;
            bus.expect_write(vec![
                crate::register::CMD_ADDR_HI,
                (base >> 16) as u8,
            ])
            .expect_write(vec![crate::register::CMD_ADDR_MID, 0])
            .expect_write(vec![crate::register::CMD_ADDR_LO, 0])
            .expect_write(vec![crate::register::CMD_ATTR, 0xB8])
            .expect_write(vec![crate::register::ERASE_OPCODE, 0xD8])
            .expect_write(vec![crate::register::CMD_ATTR, 0xB9])
            .expect_write(vec![crate::register::CMD_ATTR])
            .expect_read(vec![0]);
        }

        for (i, chunk) in blob.chunks(MAX_PAGE).enumerate() {
            let addr = USER2_BASE + (i * MAX_PAGE) as u32;
            bus.expect_write(vec![crate::register::WRITE_OPCODE, 0x02])
                .expect_write(vec![crate::register::WRITE_LEN, 0xFF])
                .expect_write(vec![
                    crate::register::CMD_ADDR_HI,
                    (addr >> 16) as u8,
                ])
                .expect_write(vec![
                    crate::register::CMD_ADDR_MID,
                    (addr >> 8) as u8,
                ])
                .expect_write(vec![crate::register::CMD_ADDR_LO, addr as u8])
                .expect_write(vec![crate::register::MCU_MODE])
                .expect_read(vec![0]);
            let mut tx = vec![crate::register::WRITE_FIFO];
            tx.extend_from_slice(chunk);
            bus.expect_write(tx)
                .expect_write(vec![
                    crate::register::MCU_MODE,
                    crate::register::MCU_MODE_ISP
                        | crate::register::MCU_MODE_WRITE_BUSY,
                ])
                .expect_write(vec![crate::register::MCU_MODE])
                .expect_read(vec![0]);
        }

        let read_addr = USER2_BASE.wrapping_sub(1) & 0x00FF_FFFF;
        bus.expect_write(vec![
            crate::register::CMD_ADDR_HI,
            (read_addr >> 16) as u8,
        ])
        .expect_write(vec![
            crate::register::CMD_ADDR_MID,
            (read_addr >> 8) as u8,
        ])
        .expect_write(vec![crate::register::CMD_ADDR_LO, read_addr as u8])
        .expect_write(vec![crate::register::READ_OPCODE, 0x03])
        .expect_write(vec![crate::register::WRITE_FIFO])
        .expect_read(vec![0xFF]);
        let mut bad = blob.clone();
        bad[0] = 0x00;
        for chunk in bad.chunks(MAX_PAGE) {
            bus.expect_read(chunk.to_vec());
        }

        let mut regs = Registers::new(bus);
        let err =
            write_firmware(&mut regs, ActiveBank::User1, &blob, &mut ())
                .unwrap_err();
        assert!(matches!(err, Error::VerifyMismatch));
    }
}
