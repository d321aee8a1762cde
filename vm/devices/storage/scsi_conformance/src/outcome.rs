// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pass, fail and skip results.

use crate::bridge::DispatchError;
use crate::cdb::CdbError;
use crate::expect::Mismatch;
use crate::payload::DecodeError;
use crate::xcopy::XcopyError;
use scsi_defs::PeripheralDeviceType;
use std::fmt;
use thiserror::Error;

/// The result of a test step. `Err` carries either a failure or a skip, and
/// `?` propagates both to the top of the test.
pub type Verdict<T = ()> = Result<T, CheckError>;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Failed(#[from] Failure),
    #[error("skipped: {0}")]
    Skipped(#[from] SkipReason),
}

impl CheckError {
    pub fn is_skip(&self) -> bool {
        matches!(self, CheckError::Skipped(_))
    }
}

#[derive(Debug, Error)]
pub enum Failure {
    #[error("{command} failed to dispatch")]
    Dispatch {
        command: &'static str,
        #[source]
        source: DispatchError,
    },
    #[error("{command}: {mismatch}")]
    Mismatch {
        command: &'static str,
        mismatch: Mismatch,
    },
    #[error("failed to encode {command}")]
    Encode {
        command: &'static str,
        #[source]
        source: CdbError,
    },
    #[error("{command} returned malformed data")]
    Decode {
        command: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("failed to build copy parameter list")]
    Descriptor(#[from] XcopyError),
    #[error("{0}")]
    Check(String),
}

impl Failure {
    /// A failed assertion about device state or returned data.
    pub fn check(message: impl Into<String>) -> Self {
        Failure::Check(message.into())
    }
}

/// Why a test was not applicable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("data loss opt-in not set, skipping destructive test")]
    DataLossNotAllowed,
    #[error("sanitize opt-in not set, skipping sanitize test")]
    SanitizeNotAllowed,
    #[error("logical unit is not write protected")]
    NotWriteProtected,
    #[error("logical unit does not have removable media")]
    NotRemovable,
    #[error("logical unit is fully provisioned")]
    FullyProvisioned,
    #[error("logical unit does not support write same (10) unmap")]
    NoLbpws10,
    #[error("logical unit does not support write same (16) unmap")]
    NoLbpws,
    #[error("logical unit does not support unmap")]
    NoLbpu,
    #[error("logical blocks per physical block is {0}, need at least 2")]
    LbppbTooSmall(u32),
    #[error("logical unit is not a block device (type {0})")]
    NotBlockDevice(PeripheralDeviceType),
    #[error("{0} is not implemented on this logical unit")]
    NotImplemented(&'static str),
}

/// The reporting triad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(String),
    Skipped(SkipReason),
}

impl TestOutcome {
    /// Folds a test's verdict into an outcome, logging failures and skips.
    pub fn from_verdict(name: &str, verdict: Verdict) -> Self {
        match verdict {
            Ok(()) => {
                tracing::info!(test = name, "passed");
                TestOutcome::Passed
            }
            Err(CheckError::Skipped(reason)) => {
                tracing::info!(test = name, %reason, "skipped");
                TestOutcome::Skipped(reason)
            }
            Err(CheckError::Failed(failure)) => {
                tracing::error!(
                    test = name,
                    error = &failure as &dyn std::error::Error,
                    "failed"
                );
                TestOutcome::Failed(error_chain(&failure))
            }
        }
    }
}

impl From<Verdict> for TestOutcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Ok(()) => TestOutcome::Passed,
            Err(CheckError::Skipped(reason)) => TestOutcome::Skipped(reason),
            Err(CheckError::Failed(failure)) => TestOutcome::Failed(error_chain(&failure)),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut s = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        s.push_str(": ");
        s.push_str(&err.to_string());
        source = err.source();
    }
    s
}

/// Aggregate counts over a run. Skips never count as failures.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn record(&mut self, outcome: &TestOutcome) {
        match outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Failed(_) => self.failed += 1,
            TestOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

impl<'a> FromIterator<&'a TestOutcome> for Summary {
    fn from_iter<I: IntoIterator<Item = &'a TestOutcome>>(iter: I) -> Self {
        let mut summary = Summary::default();
        for outcome in iter {
            summary.record(outcome);
        }
        summary
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )
    }
}
