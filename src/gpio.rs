// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO-88 control: the hardware write-protect override toggled across
//! Detach/Attach.

use crate::error::Result;
use crate::register::{Registers, GPIO88_CONFIG, GPIO88_VALUE};
use crate::transport::Transport;

/// Configures GPIO-88 as a push-pull output, preserving the config
/// register's high nibble (the pin's other mux/drive settings) and setting
/// the low nibble to `1`. Idempotent; safe to call on every Detach.
pub fn configure_push_pull<T: Transport>(
    regs: &mut Registers<T>,
) -> Result<()> {
    let current = regs.read_reg_indirect(GPIO88_CONFIG)?;
    regs.write_reg_indirect(GPIO88_CONFIG, (current & 0xF0) | 0x1)
}

/// Drives GPIO-88 high (disables the external flash's hardware
/// write-protect) or low (re-enables it), leaving the register's other
/// bits untouched.
pub fn set_level<T: Transport>(
    regs: &mut Registers<T>,
    high: bool,
) -> Result<()> {
    let current = regs.read_reg_indirect(GPIO88_VALUE)?;
    let next = if high { current | 0x1 } else { current & !0x1 };
    regs.write_reg_indirect(GPIO88_VALUE, next)
}
