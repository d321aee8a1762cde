// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The closed set of outcomes a test may expect from a command.

use crate::sense::Sense;
use scsi_defs::Ascq;
use scsi_defs::ScsiStatus;
use scsi_defs::SenseKey;
use std::fmt;

/// An expected command outcome.
///
/// Check-condition expectations accept any qualifier from a fixed set, since
/// conforming targets legitimately differ in which one they report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expectation {
    Good,
    NoMedium,
    LbaOutOfRange,
    InvalidFieldInCdb,
    ParameterListLength,
    TooManyDescriptors,
    UnsupportedDescriptorCode,
    Miscompare,
    WriteProtected,
    SanitizeInProgress,
    RemovalPrevented,
    ReservationConflict,
    CopyAborted,
}

impl Expectation {
    pub fn status(&self) -> ScsiStatus {
        match self {
            Expectation::Good => ScsiStatus::GOOD,
            Expectation::ReservationConflict => ScsiStatus::RESERVATION_CONFLICT,
            _ => ScsiStatus::CHECK_CONDITION,
        }
    }

    /// The required sense key, if the sense data is checked at all.
    pub fn sense_key(&self) -> Option<SenseKey> {
        let key = match self {
            Expectation::Good | Expectation::ReservationConflict => return None,
            Expectation::NoMedium | Expectation::SanitizeInProgress => SenseKey::NOT_READY,
            Expectation::LbaOutOfRange
            | Expectation::InvalidFieldInCdb
            | Expectation::ParameterListLength
            | Expectation::TooManyDescriptors
            | Expectation::UnsupportedDescriptorCode
            | Expectation::RemovalPrevented => SenseKey::ILLEGAL_REQUEST,
            Expectation::Miscompare => SenseKey::MISCOMPARE,
            Expectation::WriteProtected => SenseKey::DATA_PROTECT,
            Expectation::CopyAborted => SenseKey::COPY_ABORTED,
        };
        Some(key)
    }

    /// The acceptable qualifiers. Empty when sense data is not checked.
    pub fn qualifiers(&self) -> &'static [Ascq] {
        match self {
            Expectation::Good | Expectation::ReservationConflict => &[],
            Expectation::NoMedium => &[
                Ascq::MEDIUM_NOT_PRESENT,
                Ascq::MEDIUM_NOT_PRESENT_TRAY_CLOSED,
                Ascq::MEDIUM_NOT_PRESENT_TRAY_OPEN,
            ],
            Expectation::LbaOutOfRange => &[Ascq::LBA_OUT_OF_RANGE],
            Expectation::InvalidFieldInCdb => &[
                Ascq::INVALID_FIELD_IN_CDB,
                Ascq::INVALID_FIELD_IN_PARAMETER_LIST,
            ],
            Expectation::ParameterListLength => &[Ascq::PARAMETER_LIST_LENGTH_ERROR],
            Expectation::TooManyDescriptors => &[
                Ascq::TOO_MANY_TARGET_DESCRIPTORS,
                Ascq::TOO_MANY_SEGMENT_DESCRIPTORS,
            ],
            Expectation::UnsupportedDescriptorCode => &[
                Ascq::UNSUPPORTED_TARGET_DESCRIPTOR_TYPE_CODE,
                Ascq::UNSUPPORTED_SEGMENT_DESCRIPTOR_TYPE_CODE,
            ],
            Expectation::Miscompare => &[Ascq::MISCOMPARE_DURING_VERIFY_OPERATION],
            Expectation::WriteProtected => &[
                Ascq::WRITE_PROTECTED,
                Ascq::HARDWARE_WRITE_PROTECTED,
                Ascq::SOFTWARE_WRITE_PROTECTED,
            ],
            Expectation::SanitizeInProgress => {
                &[Ascq::LOGICAL_UNIT_NOT_READY_SANITIZE_IN_PROGRESS]
            }
            Expectation::RemovalPrevented => &[Ascq::MEDIUM_REMOVAL_PREVENTED],
            Expectation::CopyAborted => &[
                Ascq::NO_ADDITIONAL_SENSE_INFORMATION,
                Ascq::LOGICAL_UNIT_COMMUNICATION_FAILURE,
                Ascq::COPY_TARGET_DEVICE_NOT_REACHABLE,
            ],
        }
    }

    /// Whether the expectation is for the command to succeed.
    pub fn is_good(&self) -> bool {
        matches!(self, Expectation::Good)
    }

    /// Checks a completed command against this expectation.
    pub fn verify(&self, status: ScsiStatus, sense: Option<&Sense>) -> Result<(), Mismatch> {
        let mismatch = |reason| Mismatch {
            expected: *self,
            status,
            sense: sense.copied(),
            reason,
        };

        if status != self.status() {
            return Err(mismatch(MismatchReason::Status));
        }
        let Some(key) = self.sense_key() else {
            return Ok(());
        };
        let Some(sense) = sense else {
            return Err(mismatch(MismatchReason::NoSense));
        };
        if sense.key != key {
            return Err(mismatch(MismatchReason::SenseKey));
        }
        if !self.qualifiers().contains(&sense.ascq) {
            return Err(mismatch(MismatchReason::Qualifier));
        }
        Ok(())
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status())?;
        if let Some(key) = self.sense_key() {
            write!(f, "/{key}/")?;
            for (i, q) in self.qualifiers().iter().enumerate() {
                if i > 0 {
                    write!(f, "|")?;
                }
                write!(f, "{q}")?;
            }
        }
        Ok(())
    }
}

/// Checks `status` and `sense` against `expect`.
pub fn verify(
    status: ScsiStatus,
    sense: Option<&Sense>,
    expect: Expectation,
) -> Result<(), Mismatch> {
    expect.verify(status, sense)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    Status,
    NoSense,
    SenseKey,
    Qualifier,
}

/// Expected-versus-actual diagnostic for a failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: Expectation,
    pub status: ScsiStatus,
    pub sense: Option<Sense>,
    pub reason: MismatchReason,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.status)?;
        match (&self.sense, self.reason) {
            (_, MismatchReason::NoSense) => write!(f, " without sense data"),
            (Some(sense), _) if self.status == ScsiStatus::CHECK_CONDITION => {
                write!(f, "/{sense}")
            }
            _ => Ok(()),
        }
    }
}

impl std::error::Error for Mismatch {}
