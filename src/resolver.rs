// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus discovery, delegated to the host: given a DP-AUX device name, find
//! the sibling I²C bus's device-tree path.

use std::path::PathBuf;

use crate::error::Result;

/// Resolves a DP-AUX device name (e.g. `"card0-DP-1"`) to the filesystem
/// path of its sibling `i2c-dev` character device. Implemented by the host
/// daemon, which owns the udev/sysfs device tree; this crate only consumes
/// the result.
pub trait BusResolver {
    fn resolve(&self, dp_aux_name: &str) -> Result<PathBuf>;
}
