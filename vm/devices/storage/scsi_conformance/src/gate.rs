// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Preconditions that turn an inapplicable test into a skip.
//!
//! Guards never touch the device. Option guards read the run configuration
//! and capability guards read pages cached by discovery, so a skipped test
//! sends no commands at all.

use crate::config::TestConfig;
use crate::outcome::SkipReason;
use crate::outcome::Verdict;
use scsi_defs::PeripheralDeviceType;
use scsi_defs::ScsiOp;

/// The cost class of a guard. Cheaper classes are evaluated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GuardClass {
    Option,
    Capability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The test overwrites medium data.
    DataLoss,
    /// The test sanitizes the medium.
    Sanitize,
    /// The test needs a write-protected unit.
    ReadOnly,
    Removable,
    ThinProvisioning,
    Lbpws10,
    Lbpws,
    Lbpu,
    LbppbGreaterThanOne,
    /// The unit must be a direct-access block device.
    BlockDevice,
}

impl Guard {
    pub fn class(&self) -> GuardClass {
        match self {
            Guard::DataLoss | Guard::Sanitize | Guard::ReadOnly | Guard::LbppbGreaterThanOne => {
                GuardClass::Option
            }
            Guard::Removable
            | Guard::ThinProvisioning
            | Guard::Lbpws10
            | Guard::Lbpws
            | Guard::Lbpu
            | Guard::BlockDevice => GuardClass::Capability,
        }
    }

    pub fn check(&self, config: &TestConfig) -> Result<(), SkipReason> {
        let caps = &config.capabilities;
        let lbp = caps.logical_block_provisioning.as_ref();
        let device_type = caps
            .inquiry
            .as_ref()
            .map_or(PeripheralDeviceType::UNKNOWN, |inq| inq.device_type);
        let (met, reason) = match self {
            Guard::DataLoss => (config.data_loss, SkipReason::DataLossNotAllowed),
            Guard::Sanitize => (config.allow_sanitize, SkipReason::SanitizeNotAllowed),
            Guard::ReadOnly => (config.readonly, SkipReason::NotWriteProtected),
            Guard::LbppbGreaterThanOne => {
                (config.lbppb >= 2, SkipReason::LbppbTooSmall(config.lbppb))
            }
            Guard::Removable => (
                caps.inquiry.as_ref().is_some_and(|inq| inq.removable),
                SkipReason::NotRemovable,
            ),
            Guard::ThinProvisioning => (
                caps.read_capacity16.as_ref().is_some_and(|rc16| rc16.lbpme),
                SkipReason::FullyProvisioned,
            ),
            Guard::Lbpws10 => (lbp.is_some_and(|lbp| lbp.lbpws10), SkipReason::NoLbpws10),
            Guard::Lbpws => (lbp.is_some_and(|lbp| lbp.lbpws), SkipReason::NoLbpws),
            Guard::Lbpu => (lbp.is_some_and(|lbp| lbp.lbpu), SkipReason::NoLbpu),
            Guard::BlockDevice => (
                device_type == PeripheralDeviceType::DIRECT_ACCESS,
                SkipReason::NotBlockDevice(device_type),
            ),
        };
        if met {
            Ok(())
        } else {
            Err(reason)
        }
    }
}

/// Evaluates `guards`, option guards before capability guards, and skips on
/// the first that is not met.
pub fn require(config: &TestConfig, guards: &[Guard]) -> Verdict {
    let mut ordered = guards.to_vec();
    ordered.sort_by_key(Guard::class);
    for guard in ordered {
        if let Err(reason) = guard.check(config) {
            tracing::info!(?guard, %reason, "[SKIPPED]");
            return Err(reason.into());
        }
    }
    Ok(())
}

/// Skips `name` when the cached supported opcodes report omits it. Without
/// a report nothing is known and the command is allowed.
pub fn require_supported(
    config: &TestConfig,
    name: &'static str,
    opcode: ScsiOp,
    service_action: Option<u16>,
) -> Verdict {
    let Some(report) = &config.capabilities.supported_opcodes else {
        return Ok(());
    };
    if report.find(opcode, service_action).is_none() {
        let reason = not_implemented(name);
        tracing::info!(command = name, %reason, "[SKIPPED]");
        return Err(reason.into());
    }
    Ok(())
}

pub fn not_implemented(name: &'static str) -> SkipReason {
    SkipReason::NotImplemented(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CheckError;
    use crate::payload::LogicalBlockProvisioning;
    use crate::payload::StandardInquiry;
    use crate::payload::SupportedCommand;
    use crate::payload::SupportedOpcodes;

    fn skip_reason(verdict: Verdict) -> SkipReason {
        match verdict {
            Err(CheckError::Skipped(reason)) => reason,
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn option_guards_run_first() {
        // Both guards fail. The option guard must win regardless of order.
        let config = TestConfig::default();
        let reason = skip_reason(require(&config, &[Guard::Lbpu, Guard::DataLoss]));
        assert_eq!(reason, SkipReason::DataLossNotAllowed);
    }

    #[test]
    fn missing_pages_mean_absent() {
        let config = TestConfig {
            data_loss: true,
            ..Default::default()
        };
        assert_eq!(
            skip_reason(require(&config, &[Guard::DataLoss, Guard::ThinProvisioning])),
            SkipReason::FullyProvisioned
        );
        assert_eq!(
            skip_reason(require(&config, &[Guard::Removable])),
            SkipReason::NotRemovable
        );
        assert_eq!(
            skip_reason(require(&config, &[Guard::BlockDevice])),
            SkipReason::NotBlockDevice(PeripheralDeviceType::UNKNOWN)
        );
    }

    #[test]
    fn provisioning_bits() {
        let mut config = TestConfig::default();
        config.capabilities.logical_block_provisioning = Some(LogicalBlockProvisioning {
            threshold_exponent: 0,
            lbpu: true,
            lbpws: false,
            lbpws10: true,
            lbprz: false,
            anc_sup: false,
            dp: false,
            provisioning_type: 2,
        });
        assert!(require(&config, &[Guard::Lbpu, Guard::Lbpws10]).is_ok());
        assert_eq!(
            skip_reason(require(&config, &[Guard::Lbpu, Guard::Lbpws])),
            SkipReason::NoLbpws
        );
    }

    #[test]
    fn removable_and_sbc() {
        let mut config = TestConfig::default();
        config.capabilities.inquiry = Some(StandardInquiry {
            qualifier: 0,
            device_type: PeripheralDeviceType::MMC,
            removable: true,
            version: 6,
            response_data_format: 2,
            additional_length: 31,
            third_party_copy: false,
            protect: false,
            vendor_id: String::new(),
            product_id: String::new(),
            revision: String::new(),
        });
        assert!(require(&config, &[Guard::Removable]).is_ok());
        assert_eq!(
            skip_reason(require(&config, &[Guard::BlockDevice])),
            SkipReason::NotBlockDevice(PeripheralDeviceType::MMC)
        );
    }

    #[test]
    fn lbppb() {
        let mut config = TestConfig::default();
        assert_eq!(
            skip_reason(require(&config, &[Guard::LbppbGreaterThanOne])),
            SkipReason::LbppbTooSmall(1)
        );
        config.lbppb = 8;
        assert!(require(&config, &[Guard::LbppbGreaterThanOne]).is_ok());
    }

    #[test]
    fn supported_opcodes_probe() {
        let mut config = TestConfig::default();
        assert!(require_supported(&config, "ORWRITE", ScsiOp::ORWRITE, None).is_ok());

        config.capabilities.supported_opcodes = Some(SupportedOpcodes {
            commands: vec![SupportedCommand {
                opcode: ScsiOp::READ,
                service_action: None,
                cdb_length: 10,
                timeouts: None,
            }],
        });
        assert!(require_supported(&config, "READ10", ScsiOp::READ, None).is_ok());
        assert_eq!(
            skip_reason(require_supported(&config, "ORWRITE", ScsiOp::ORWRITE, None)),
            SkipReason::NotImplemented("ORWRITE")
        );
    }
}
