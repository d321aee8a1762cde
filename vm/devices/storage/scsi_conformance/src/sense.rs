// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sense data decoding.

use scsi_defs::AdditionalSenseCode;
use scsi_defs::Ascq;
use scsi_defs::DescriptorSenseDataHeader;
use scsi_defs::SenseData;
use scsi_defs::SenseDataErrorCode;
use scsi_defs::SenseDataHeader;
use scsi_defs::SenseKey;
use std::fmt;
use zerocopy::FromBytes;

/// The parts of sense data the verifier compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sense {
    pub key: SenseKey,
    pub ascq: Ascq,
}

impl Sense {
    pub const fn new(key: SenseKey, ascq: Ascq) -> Self {
        Self { key, ascq }
    }

    /// Decodes fixed or descriptor format sense data.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let code = SenseDataErrorCode(buf.first()? & 0x7f);
        match code {
            SenseDataErrorCode::FIXED_CURRENT | SenseDataErrorCode::FIXED_DEFERRED => {
                let (header, _) = SenseDataHeader::read_from_prefix(buf).ok()?;
                let key = SenseKey(header.sense_key.0 & 0x0f);
                // Devices may truncate fixed sense before the ASC bytes.
                let ascq = match SenseData::read_from_prefix(buf) {
                    Ok((sense, _)) => Ascq::new(
                        sense.additional_sense_code,
                        sense.additional_sense_code_qualifier,
                    ),
                    Err(_) => Ascq::new(AdditionalSenseCode::NO_SENSE, 0),
                };
                Some(Self { key, ascq })
            }
            SenseDataErrorCode::DESCRIPTOR_CURRENT | SenseDataErrorCode::DESCRIPTOR_DEFERRED => {
                let (header, _) = DescriptorSenseDataHeader::read_from_prefix(buf).ok()?;
                Some(Self {
                    key: SenseKey(header.sense_key.0 & 0x0f),
                    ascq: Ascq::new(
                        header.additional_sense_code,
                        header.additional_sense_code_qualifier,
                    ),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.key, self.ascq)
    }
}
