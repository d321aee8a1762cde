// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Encoders for EXTENDED COPY (LID1) parameter lists.
//!
//! Each encoder writes one structure into a caller supplied buffer at
//! `offset` and returns the number of bytes written. A buffer too small for
//! the structure is an error and is left untouched.

use scsi_defs::xcopy::BlockDeviceTypeSpecific;
use scsi_defs::xcopy::BlockToBlockSegmentDescriptor;
use scsi_defs::xcopy::DescriptorTypeCode;
use scsi_defs::xcopy::IdentificationTargetDescriptor;
use scsi_defs::xcopy::ParameterListFlags;
use scsi_defs::xcopy::ParameterListHeader;
use scsi_defs::xcopy::SegmentDescriptorFlags;
use scsi_defs::xcopy::SegmentDescriptorHeader;
use scsi_defs::xcopy::TargetDescriptorFlags;
use scsi_defs::xcopy::LU_ID_TYPE_LUN;
use scsi_defs::xcopy::SEGMENT_DESCRIPTOR_FIXED_LENGTH;
use scsi_defs::xcopy::TARGET_DESCRIPTOR_PAD;
use scsi_defs::PeripheralDeviceType;
use thiserror::Error;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

/// Room for a designation descriptor inside a 0xE4 target descriptor.
pub const MAX_DESIGNATOR_LENGTH: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XcopyError {
    #[error("buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("no length known for descriptor type {0}")]
    UnknownDescriptor(DescriptorTypeCode),
    #[error("designation descriptor is {0} bytes, at most 20 fit")]
    DesignatorTooLong(usize),
}

/// The full length of a descriptor of type `code`, header included.
pub fn descriptor_length(code: DescriptorTypeCode) -> Result<usize, XcopyError> {
    let len = match code {
        DescriptorTypeCode::STREAM_TO_STREAM => 20,
        DescriptorTypeCode::BLOCK_TO_STREAM | DescriptorTypeCode::STREAM_TO_BLOCK => 24,
        DescriptorTypeCode::BLOCK_TO_BLOCK => size_of::<BlockToBlockSegmentDescriptor>(),
        DescriptorTypeCode::BLOCK_TO_STREAM_OFFSET
        | DescriptorTypeCode::STREAM_TO_BLOCK_OFFSET => 28,
        DescriptorTypeCode::BLOCK_TO_BLOCK_OFFSET => 32,
        DescriptorTypeCode::IPV6 | DescriptorTypeCode::IP_COPY_SERVICE => 64,
        // Every other target descriptor up to 0xE9 is fixed at 32 bytes.
        DescriptorTypeCode(0xE0..=0xE9) => size_of::<IdentificationTargetDescriptor>(),
        code => return Err(XcopyError::UnknownDescriptor(code)),
    };
    Ok(len)
}

fn put<T: IntoBytes + Immutable>(
    buf: &mut [u8],
    offset: usize,
    value: &T,
) -> Result<usize, XcopyError> {
    let bytes = value.as_bytes();
    let available = buf.len();
    let dest = offset
        .checked_add(bytes.len())
        .and_then(|end| buf.get_mut(offset..end))
        .ok_or(XcopyError::BufferTooSmall {
            needed: offset.saturating_add(bytes.len()),
            available,
        })?;
    dest.copy_from_slice(bytes);
    Ok(bytes.len())
}

/// Writes an identification descriptor target descriptor (0xE4) naming a
/// block device by `designator`, a raw designation descriptor as returned
/// in VPD page 0x83.
pub fn write_target_descriptor(
    buf: &mut [u8],
    offset: usize,
    designator: &[u8],
    device_type: PeripheralDeviceType,
    block_size: u32,
    pad: bool,
) -> Result<usize, XcopyError> {
    let mut designation_descriptor = [0; MAX_DESIGNATOR_LENGTH];
    designation_descriptor
        .get_mut(..designator.len())
        .ok_or(XcopyError::DesignatorTooLong(designator.len()))?
        .copy_from_slice(designator);
    let [_, len @ ..] = block_size.to_be_bytes();
    let descriptor = IdentificationTargetDescriptor {
        descriptor_type_code: DescriptorTypeCode::IDENTIFICATION,
        flags: TargetDescriptorFlags::new()
            .with_peripheral_device_type(device_type.0)
            .with_lu_id_type(LU_ID_TYPE_LUN),
        relative_initiator_port_identifier: 0u16.into(),
        designation_descriptor,
        reserved: [0; 4],
        device_type_specific: BlockDeviceTypeSpecific {
            flags: if pad { TARGET_DESCRIPTOR_PAD } else { 0 },
            disk_block_length: len,
        },
    };
    put(buf, offset, &descriptor)
}

/// Source and destination of one segment, as indexes into the target
/// descriptor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub code: DescriptorTypeCode,
    pub cat: bool,
    pub dc: bool,
    pub source_index: u16,
    pub destination_index: u16,
}

fn segment_header(header: &SegmentHeader) -> Result<SegmentDescriptorHeader, XcopyError> {
    let len = descriptor_length(header.code)?;
    Ok(SegmentDescriptorHeader {
        descriptor_type_code: header.code,
        flags: SegmentDescriptorFlags::new()
            .with_cat(header.cat)
            .with_dc(header.dc),
        descriptor_length: ((len - SEGMENT_DESCRIPTOR_FIXED_LENGTH) as u16).into(),
        source_index: header.source_index.into(),
        destination_index: header.destination_index.into(),
    })
}

/// Writes the eight byte header common to all segment descriptors.
pub fn write_segment_header(
    buf: &mut [u8],
    offset: usize,
    header: &SegmentHeader,
) -> Result<usize, XcopyError> {
    put(buf, offset, &segment_header(header)?)
}

/// Writes a block device to block device segment descriptor (0x02).
/// `header.code` is ignored.
pub fn write_block_to_block(
    buf: &mut [u8],
    offset: usize,
    header: &SegmentHeader,
    blocks: u16,
    source_lba: u64,
    destination_lba: u64,
) -> Result<usize, XcopyError> {
    let header = SegmentHeader {
        code: DescriptorTypeCode::BLOCK_TO_BLOCK,
        ..*header
    };
    let descriptor = BlockToBlockSegmentDescriptor {
        header: segment_header(&header)?,
        reserved: [0; 2],
        number_of_blocks: blocks.into(),
        source_lba: source_lba.into(),
        destination_lba: destination_lba.into(),
    };
    put(buf, offset, &descriptor)
}

/// Parameter list header fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterList {
    pub list_identifier: u8,
    /// One of the `LIST_ID_USAGE_*` values.
    pub list_id_usage: u8,
    pub priority: u8,
    pub str: bool,
    pub nrcr: bool,
    pub target_descriptor_list_length: u16,
    pub segment_descriptor_list_length: u32,
    pub inline_data_length: u32,
}

pub fn write_parameter_header(
    buf: &mut [u8],
    offset: usize,
    list: &ParameterList,
) -> Result<usize, XcopyError> {
    let header = ParameterListHeader {
        list_identifier: list.list_identifier,
        flags: ParameterListFlags::new()
            .with_priority(list.priority)
            .with_list_id_usage(list.list_id_usage)
            .with_str(list.str)
            .with_nrcr(list.nrcr),
        target_descriptor_list_length: list.target_descriptor_list_length.into(),
        reserved: [0; 4],
        segment_descriptor_list_length: list.segment_descriptor_list_length.into(),
        inline_data_length: list.inline_data_length.into(),
    };
    put(buf, offset, &header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scsi_defs::xcopy::LIST_ID_USAGE_NONE;

    #[test]
    fn lengths() {
        assert_eq!(descriptor_length(DescriptorTypeCode::IDENTIFICATION), Ok(32));
        assert_eq!(descriptor_length(DescriptorTypeCode::BLOCK_TO_BLOCK), Ok(28));
        assert_eq!(
            descriptor_length(DescriptorTypeCode::BLOCK_TO_STREAM_OFFSET),
            Ok(28)
        );
        assert_eq!(
            descriptor_length(DescriptorTypeCode::STREAM_TO_BLOCK_OFFSET),
            Ok(28)
        );
        assert_eq!(
            descriptor_length(DescriptorTypeCode::BLOCK_TO_BLOCK_OFFSET),
            Ok(32)
        );
        assert_eq!(descriptor_length(DescriptorTypeCode::STREAM_TO_STREAM), Ok(20));
        for code in 0xe0..=0xe9 {
            assert_eq!(descriptor_length(DescriptorTypeCode(code)), Ok(32), "{code:#x}");
        }
        assert_eq!(descriptor_length(DescriptorTypeCode::IPV6), Ok(64));
        assert_eq!(descriptor_length(DescriptorTypeCode::IP_COPY_SERVICE), Ok(64));
        assert_eq!(
            descriptor_length(DescriptorTypeCode(0xEC)),
            Err(XcopyError::UnknownDescriptor(DescriptorTypeCode(0xEC)))
        );
        assert_eq!(
            descriptor_length(DescriptorTypeCode(0x42)),
            Err(XcopyError::UnknownDescriptor(DescriptorTypeCode(0x42)))
        );
    }

    #[test]
    fn target_descriptor_layout() {
        let designator = [0x01, 0x03, 0x00, 0x08, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut buf = [0xffu8; 40];
        let n = write_target_descriptor(
            &mut buf,
            4,
            &designator,
            PeripheralDeviceType::DIRECT_ACCESS,
            4096,
            true,
        )
        .unwrap();
        assert_eq!(n, 32);
        assert_eq!(&buf[..4], &[0xff; 4]);
        let d = &buf[4..36];
        assert_eq!(d[0], 0xe4);
        assert_eq!(d[1], 0);
        assert_eq!(&d[4..16], &designator);
        assert!(d[16..28].iter().all(|&b| b == 0));
        assert_eq!(d[28], TARGET_DESCRIPTOR_PAD);
        assert_eq!(&d[29..32], &[0x00, 0x10, 0x00]);
        assert_eq!(&buf[36..], &[0xff; 4]);
    }

    #[test]
    fn designator_too_long() {
        let mut buf = [0u8; 64];
        let err = write_target_descriptor(
            &mut buf,
            0,
            &[0; 21],
            PeripheralDeviceType::DIRECT_ACCESS,
            512,
            false,
        )
        .unwrap_err();
        assert_eq!(err, XcopyError::DesignatorTooLong(21));
    }

    #[test]
    fn no_partial_writes() {
        let mut buf = [0xaau8; 30];
        let header = SegmentHeader {
            code: DescriptorTypeCode::BLOCK_TO_BLOCK,
            cat: false,
            dc: false,
            source_index: 0,
            destination_index: 0,
        };
        let err = write_block_to_block(&mut buf, 4, &header, 1, 0, 1).unwrap_err();
        assert_eq!(
            err,
            XcopyError::BufferTooSmall {
                needed: 32,
                available: 30
            }
        );
        assert!(buf.iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn block_to_block_layout() {
        let mut buf = [0u8; 28];
        let header = SegmentHeader {
            code: DescriptorTypeCode::BLOCK_TO_BLOCK,
            cat: false,
            dc: true,
            source_index: 0,
            destination_index: 1,
        };
        let n = write_block_to_block(&mut buf, 0, &header, 2048, 0x10, 0x2000).unwrap();
        assert_eq!(n, 28);
        assert_eq!(&buf[..8], &[0x02, 0x02, 0x00, 0x18, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&buf[10..12], &[0x08, 0x00]);
        assert_eq!(&buf[12..20], &0x10u64.to_be_bytes());
        assert_eq!(&buf[20..28], &0x2000u64.to_be_bytes());
    }

    #[test]
    fn segment_header_rejects_unknown_type() {
        let mut buf = [0u8; 8];
        let header = SegmentHeader {
            code: DescriptorTypeCode(0x30),
            cat: false,
            dc: false,
            source_index: 0,
            destination_index: 0,
        };
        assert!(matches!(
            write_segment_header(&mut buf, 0, &header),
            Err(XcopyError::UnknownDescriptor(_))
        ));
    }

    #[test]
    fn parameter_header_layout() {
        let mut buf = [0u8; 16];
        let list = ParameterList {
            list_identifier: 7,
            list_id_usage: LIST_ID_USAGE_NONE,
            target_descriptor_list_length: 64,
            segment_descriptor_list_length: 28,
            ..Default::default()
        };
        assert_eq!(write_parameter_header(&mut buf, 0, &list).unwrap(), 16);
        assert_eq!(
            buf,
            [7, 0x18, 0, 64, 0, 0, 0, 0, 0, 0, 0, 28, 0, 0, 0, 0]
        );
    }
}
