// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status/progress reporting interface consumed by the sequencer and
//! lifecycle controller.

/// A coarse phase of an in-progress operation, reported to the host so it
/// can drive a UI without this crate knowing anything about UI concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Erase,
    Write,
    Verify,
    Restart,
    Idle,
    Read,
}

/// Callback interface the host supplies for status and byte-progress
/// reporting. The blanket `()` implementation discards everything, for
/// callers that don't care.
pub trait ProgressSink {
    fn set_status(&mut self, status: Status);
    fn set_progress(&mut self, done: usize, total: usize);
}

impl ProgressSink for () {
    fn set_status(&mut self, _status: Status) {}
    fn set_progress(&mut self, _done: usize, _total: usize) {}
}
