// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DDC/CI dual-bank status query and decoding.

use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::register::Registers;
use crate::transport::Transport;

/// Which bank the MCU is currently executing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBank {
    Boot,
    User1,
    User2,
    Invalid,
}

/// The firmware-layout mode reported by the dual-bank status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualBankMode {
    UserOnly,
    Diff,
    Copy,
    UserOnlyFlag,
}

/// The decoded 11-byte dual-bank status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualBankStatus {
    pub enabled: bool,
    pub mode: Option<DualBankMode>,
    pub active_bank: ActiveBank,
    pub user1_version: (u8, u8),
    pub user2_version: (u8, u8),
}

impl DualBankStatus {
    /// Whether this bank is updatable: dual-bank must be enabled and the
    /// layout mode must be `Diff`.
    pub fn updatable(&self) -> bool {
        self.enabled && matches!(self.mode, Some(DualBankMode::Diff))
    }
}

const ENTER_DDCCI_MODE: u8 = 0xCA;
const DDCCI_OPCODE_REG: u8 = 0x09;
const DDCCI_QUERY_OPCODE: u8 = 0x01;
const RESPONSE_LEN: usize = 11;
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Issues the dual-bank status query and decodes the response.
///
/// Any response not starting with `[0xCA, 9]` is treated as older firmware
/// that doesn't support the query: this returns `enabled: false` rather than
/// an error. Out-of-range `mode`/`active_bank` values downgrade the same way,
/// per spec: they are logged and yield `enabled: false` instead of failing
/// the caller.
pub fn query_dual_bank_status<T: Transport>(
    regs: &mut Registers<T>,
) -> Result<DualBankStatus> {
    let disabled = DualBankStatus {
        enabled: false,
        mode: None,
        active_bank: ActiveBank::Invalid,
        user1_version: (0, 0),
        user2_version: (0, 0),
    };

    regs.write_reg(ENTER_DDCCI_MODE, DDCCI_OPCODE_REG)?;
    thread::sleep(SETTLE_DELAY);
    regs.write_reg(ENTER_DDCCI_MODE, DDCCI_QUERY_OPCODE)?;

    let mut resp = [0u8; RESPONSE_LEN];
    regs.read_burst(&mut resp)?;

    if resp[0] != ENTER_DDCCI_MODE || resp[1] != DDCCI_OPCODE_REG {
        log::debug!(
            "dual-bank query got unexpected header {:#04x} {:#04x}; \
             treating device as not dual-bank capable",
            resp[0],
            resp[1]
        );
        return Ok(disabled);
    }

    if resp[2] != 1 {
        return Ok(disabled);
    }

    let mode = match resp[3] {
        0 => DualBankMode::UserOnly,
        1 => DualBankMode::Diff,
        2 => DualBankMode::Copy,
        3 => DualBankMode::UserOnlyFlag,
        other => {
            log::warn!("dual-bank query returned out-of-range mode {other}");
            return Ok(disabled);
        }
    };

    let active_bank = match resp[4] {
        0 => ActiveBank::Boot,
        1 => ActiveBank::User1,
        2 => ActiveBank::User2,
        other => {
            log::warn!(
                "dual-bank query returned out-of-range active bank {other}"
            );
            return Ok(disabled);
        }
    };

    Ok(DualBankStatus {
        enabled: true,
        mode: Some(mode),
        active_bank,
        user1_version: (resp[5], resp[6]),
        user2_version: (resp[7], resp[8]),
    })
}
