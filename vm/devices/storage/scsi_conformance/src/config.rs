// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Run-wide test configuration.

use crate::logging::LogLevel;
use crate::payload::BlockDeviceCharacteristics;
use crate::payload::BlockLimits;
use crate::payload::LogicalBlockProvisioning;
use crate::payload::ReadCapacity16;
use crate::payload::StandardInquiry;
use crate::payload::SupportedCommand;
use crate::payload::SupportedOpcodes;
use scsi_defs::ScsiOp;
use serde::Deserialize;

pub const DEFAULT_INITIATOR_NAME1: &str = "iqn.2007-10.com.github:sahlberg:libiscsi:iscsi-test";
pub const DEFAULT_INITIATOR_NAME2: &str = "iqn.2007-10.com.github:sahlberg:libiscsi:iscsi-test-2";

/// Options set once by the loader and read by every test.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TestConfig {
    /// Allow tests that overwrite data on the medium.
    #[serde(alias = "dataloss")]
    pub data_loss: bool,
    /// Allow SANITIZE, which erases the whole medium.
    pub allow_sanitize: bool,
    /// The logical unit is expected to be write protected.
    pub readonly: bool,
    pub block_size: u32,
    pub num_blocks: u64,
    /// Logical blocks per physical block.
    pub lbppb: u32,
    pub sbc3_support: bool,
    /// Largest transfer in blocks, zero when the device reports no limit.
    pub maximum_transfer_length: u32,
    pub initiator_name1: String,
    pub initiator_name2: String,
    pub log_level: LogLevel,
    /// Filled in by discovery.
    #[serde(skip)]
    pub capabilities: DeviceCapabilities,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            data_loss: false,
            allow_sanitize: false,
            readonly: false,
            block_size: 512,
            num_blocks: 0,
            lbppb: 1,
            sbc3_support: false,
            maximum_transfer_length: 0,
            initiator_name1: DEFAULT_INITIATOR_NAME1.into(),
            initiator_name2: DEFAULT_INITIATOR_NAME2.into(),
            log_level: LogLevel::default(),
            capabilities: DeviceCapabilities::default(),
        }
    }
}

impl TestConfig {
    /// Stores discovered capabilities and the geometry they imply.
    pub fn apply_capabilities(&mut self, caps: DeviceCapabilities) {
        if let Some(rc16) = &caps.read_capacity16 {
            self.block_size = rc16.block_length;
            self.num_blocks = rc16.num_blocks();
            self.lbppb = rc16.lbppb();
            self.sbc3_support = true;
        }
        if let Some(bl) = &caps.block_limits {
            self.maximum_transfer_length = bl.max_transfer_length;
        }
        self.capabilities = caps;
    }
}

/// Device pages cached by discovery. A page the device did not return is
/// `None` and counts as the feature being absent.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub inquiry: Option<StandardInquiry>,
    pub block_limits: Option<BlockLimits>,
    pub logical_block_provisioning: Option<LogicalBlockProvisioning>,
    pub block_device_characteristics: Option<BlockDeviceCharacteristics>,
    pub read_capacity16: Option<ReadCapacity16>,
    pub supported_opcodes: Option<SupportedOpcodes>,
}

impl DeviceCapabilities {
    /// Looks up a command in the cached supported opcodes report.
    pub fn command_descriptor(
        &self,
        opcode: ScsiOp,
        service_action: Option<u16>,
    ) -> Option<&SupportedCommand> {
        self.supported_opcodes.as_ref()?.find(opcode, service_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TestConfig::default();
        assert_eq!(config.block_size, 512);
        assert!(!config.data_loss);
        assert!(!config.allow_sanitize);
        assert_ne!(config.initiator_name1, config.initiator_name2);
    }

    #[test]
    fn deserialize_partial() {
        let config: TestConfig = serde_json::from_str(
            r#"{ "dataloss": true, "allow-sanitize": true, "log-level": "verbose" }"#,
        )
        .unwrap();
        assert!(config.data_loss);
        assert!(config.allow_sanitize);
        assert_eq!(config.log_level, LogLevel::Verbose);
        assert_eq!(config.block_size, 512);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(serde_json::from_str::<TestConfig>(r#"{ "data-lose": true }"#).is_err());
    }

    #[test]
    fn capabilities_set_geometry() {
        let mut config = TestConfig::default();
        config.apply_capabilities(DeviceCapabilities {
            read_capacity16: Some(ReadCapacity16 {
                last_lba: 1023,
                block_length: 4096,
                prot_en: false,
                p_type: 0,
                lbppb_exponent: 3,
                lbpme: true,
                lbprz: false,
                lowest_aligned_lba: 0,
            }),
            ..Default::default()
        });
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.num_blocks, 1024);
        assert_eq!(config.lbppb, 8);
        assert!(config.sbc3_support);
    }
}
