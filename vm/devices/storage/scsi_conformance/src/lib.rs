// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command verification and persistent reservation test engine for SCSI
//! logical units reached over iSCSI or a local SG_IO device.
//!
//! Every verb follows the same pipeline: encode the CDB, run the skip gate,
//! dispatch through the device's transport and wait for completion, then
//! check the result against an [`Expectation`]. Verbs return a [`Verdict`],
//! which callers propagate with `?` and convert to a [`TestOutcome`] at the
//! top of a test.

#![forbid(unsafe_code)]

pub mod bridge;
pub mod cdb;
pub mod config;
pub mod context;
pub mod device;
pub mod expect;
pub mod gate;
pub mod logging;
pub mod outcome;
pub mod payload;
pub mod pr;
pub mod sense;
pub mod transport;
pub mod verbs;
pub mod xcopy;

#[cfg(any(test, feature = "test"))]
pub mod test_helpers;

#[cfg(test)]
mod tests;

pub use config::DeviceCapabilities;
pub use config::TestConfig;
pub use context::KeyGenerator;
pub use context::TestContext;
pub use device::ScsiDevice;
pub use expect::Expectation;
pub use outcome::CheckError;
pub use outcome::Failure;
pub use outcome::SkipReason;
pub use outcome::TestOutcome;
pub use outcome::Verdict;
pub use transport::ScsiTask;
pub use transport::TaskResult;
pub use transport::Transport;

/// Returns true if every byte of `buf` is zero.
pub fn all_zeroes(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}
