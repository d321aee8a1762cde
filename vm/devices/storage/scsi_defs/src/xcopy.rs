// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! EXTENDED COPY (LID1) and RECEIVE COPY RESULTS definitions.

use crate::ScsiOp;
use crate::U16BE;
use crate::U32BE;
use crate::U64BE;
use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

pub const EXTENDED_COPY_LID1: u8 = 0x00;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbExtendedCopy {
    pub operation_code: ScsiOp,
    pub service_action: u8,
    pub reserved: [u8; 8],
    pub parameter_list_length: U32BE,
    pub reserved2: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbReceiveCopyResults {
    pub operation_code: ScsiOp,
    pub service_action: CopyResultsServiceAction,
    pub list_identifier: u8,
    pub reserved: [u8; 7],
    pub allocation_length: U32BE,
    pub reserved2: u8,
    pub control: u8,
}

open_enum! {
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum CopyResultsServiceAction: u8 {
        COPY_STATUS = 0x00,
        RECEIVE_DATA = 0x01,
        OPERATING_PARAMETERS = 0x03,
        FAILED_SEGMENT_DETAILS = 0x04,
    }
}

open_enum! {
    /// Segment and target (CSCD) descriptor type codes.
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum DescriptorTypeCode: u8 {
        BLOCK_TO_STREAM = 0x00,
        STREAM_TO_BLOCK = 0x01,
        BLOCK_TO_BLOCK = 0x02,
        STREAM_TO_STREAM = 0x03,
        BLOCK_TO_STREAM_OFFSET = 0x08,
        STREAM_TO_BLOCK_OFFSET = 0x09,
        BLOCK_TO_BLOCK_OFFSET = 0x0A,
        FIBRE_CHANNEL_N_PORT_NAME = 0xE0,
        FIBRE_CHANNEL_N_PORT_ID = 0xE1,
        PARALLEL_INTERFACE_T_L = 0xE3,
        IDENTIFICATION = 0xE4,
        IPV4 = 0xE5,
        IPV6 = 0xEA,
        IP_COPY_SERVICE = 0xEB,
    }
}

/// Parameter list header, 16 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ParameterListHeader {
    pub list_identifier: u8,
    pub flags: ParameterListFlags,
    pub target_descriptor_list_length: U16BE,
    pub reserved: [u8; 4],
    pub segment_descriptor_list_length: U32BE,
    pub inline_data_length: U32BE,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ParameterListFlags {
    #[bits(3)]
    pub priority: u8,
    #[bits(2)]
    pub list_id_usage: u8,
    pub str: bool,
    pub nrcr: bool,
    _reserved: bool,
}

pub const LIST_ID_USAGE_HOLD: u8 = 0x00;
pub const LIST_ID_USAGE_NO_HOLD: u8 = 0x02;
pub const LIST_ID_USAGE_NONE: u8 = 0x03;

/// Identification descriptor target descriptor (0xE4), 32 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct IdentificationTargetDescriptor {
    pub descriptor_type_code: DescriptorTypeCode,
    pub flags: TargetDescriptorFlags,
    pub relative_initiator_port_identifier: U16BE,
    pub designation_descriptor: [u8; 20],
    pub reserved: [u8; 4],
    pub device_type_specific: BlockDeviceTypeSpecific,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TargetDescriptorFlags {
    #[bits(5)]
    pub peripheral_device_type: u8,
    pub nul: bool,
    #[bits(2)]
    pub lu_id_type: u8,
}

pub const LU_ID_TYPE_LUN: u8 = 0x00;
pub const LU_ID_TYPE_PROXY_TOKEN: u8 = 0x01;

/// Device type specific parameters for block devices.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct BlockDeviceTypeSpecific {
    /// PAD in bit 2.
    pub flags: u8,
    pub disk_block_length: [u8; 3],
}

pub const TARGET_DESCRIPTOR_PAD: u8 = 0x04;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SegmentDescriptorHeader {
    pub descriptor_type_code: DescriptorTypeCode,
    pub flags: SegmentDescriptorFlags,
    /// Length of the descriptor following this field.
    pub descriptor_length: U16BE,
    pub source_index: U16BE,
    pub destination_index: U16BE,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SegmentDescriptorFlags {
    pub cat: bool,
    pub dc: bool,
    #[bits(6)]
    _reserved: u8,
}

/// Block device to block device segment descriptor (0x02), 28 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct BlockToBlockSegmentDescriptor {
    pub header: SegmentDescriptorHeader,
    pub reserved: [u8; 2],
    pub number_of_blocks: U16BE,
    pub source_lba: U64BE,
    pub destination_lba: U64BE,
}

/// Bytes of a descriptor before its descriptor length field ends.
pub const SEGMENT_DESCRIPTOR_FIXED_LENGTH: usize = 4;

/// RECEIVE COPY RESULTS operating parameters, without the trailing list of
/// implemented descriptor type codes.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CopyOperatingParameters {
    pub available_data: U32BE,
    pub reserved: [u8; 4],
    pub max_target_descriptor_count: U16BE,
    pub max_segment_descriptor_count: U16BE,
    pub max_descriptor_list_length: U32BE,
    pub max_segment_length: U32BE,
    pub max_inline_data_length: U32BE,
    pub held_data_limit: U32BE,
    pub max_stream_device_transfer_size: U32BE,
    pub reserved2: [u8; 2],
    pub total_concurrent_copies: U16BE,
    pub max_concurrent_copies: u8,
    pub data_segment_granularity: u8,
    pub inline_data_granularity: u8,
    pub held_data_granularity: u8,
    pub reserved3: [u8; 3],
    pub implemented_descriptor_list_length: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_sizes() {
        assert_eq!(size_of::<CdbExtendedCopy>(), 16);
        assert_eq!(size_of::<CdbReceiveCopyResults>(), 16);
        assert_eq!(size_of::<ParameterListHeader>(), 16);
        assert_eq!(size_of::<IdentificationTargetDescriptor>(), 32);
        assert_eq!(size_of::<SegmentDescriptorHeader>(), 8);
        assert_eq!(size_of::<BlockToBlockSegmentDescriptor>(), 28);
        assert_eq!(size_of::<CopyOperatingParameters>(), 44);
    }
}
