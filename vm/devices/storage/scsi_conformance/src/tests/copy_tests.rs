// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! EXTENDED COPY tests using the parameter list encoders.

use super::destructive;
use super::Harness;
use crate::config::TestConfig;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::payload::CopyParameters;
use crate::test_helpers::SimConfig;
use crate::test_helpers::NAA_DESIGNATOR;
use crate::verbs;
use crate::verbs::IoFlags;
use crate::xcopy;
use crate::xcopy::ParameterList;
use crate::xcopy::SegmentHeader;
use scsi_defs::xcopy::CopyResultsServiceAction;
use scsi_defs::xcopy::DescriptorTypeCode;
use scsi_defs::xcopy::LIST_ID_USAGE_NONE;
use scsi_defs::PeripheralDeviceType;

const HEADER_LEN: usize = 16;
const TARGET_LEN: usize = 32;
const B2B_LEN: usize = 28;

fn segment(code: DescriptorTypeCode) -> SegmentHeader {
    SegmentHeader {
        code,
        cat: false,
        dc: false,
        source_index: 0,
        destination_index: 0,
    }
}

/// A parameter list with `targets` copies of `designator` and one block to
/// block segment.
fn copy_list(
    designator: &[u8],
    targets: usize,
    blocks: u16,
    source: u64,
    destination: u64,
) -> Vec<u8> {
    let target_len = targets * TARGET_LEN;
    let mut buf = vec![0; HEADER_LEN + target_len + B2B_LEN];
    let list = ParameterList {
        list_id_usage: LIST_ID_USAGE_NONE,
        target_descriptor_list_length: target_len as u16,
        segment_descriptor_list_length: B2B_LEN as u32,
        ..Default::default()
    };
    let mut offset = xcopy::write_parameter_header(&mut buf, 0, &list).unwrap();
    for _ in 0..targets {
        offset += xcopy::write_target_descriptor(
            &mut buf,
            offset,
            designator,
            PeripheralDeviceType::DIRECT_ACCESS,
            512,
            false,
        )
        .unwrap();
    }
    offset += xcopy::write_block_to_block(
        &mut buf,
        offset,
        &segment(DescriptorTypeCode::BLOCK_TO_BLOCK),
        blocks,
        source,
        destination,
    )
    .unwrap();
    assert_eq!(offset, buf.len());
    buf
}

fn designator(ctx: &TestContext, sd: &mut ScsiDevice) -> Vec<u8> {
    verbs::logical_unit_designator(ctx, sd).unwrap().to_bytes()
}

#[test]
fn copy_within_unit() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let data = h.pattern(2, 0x21);
    let Harness { sim, ctx, sd } = &mut h;

    let designator = designator(ctx, sd);
    assert_eq!(&designator[4..], NAA_DESIGNATOR);
    verbs::write10(ctx, sd, 100, &data, IoFlags::default(), Expectation::Good).unwrap();

    let list = copy_list(&designator, 1, 2, 100, 200);
    assert_eq!(list.len(), HEADER_LEN + TARGET_LEN + B2B_LEN);
    verbs::extended_copy(ctx, sd, &list, Expectation::Good).unwrap();

    let result = verbs::read10(ctx, sd, 200, 2, IoFlags::default(), Expectation::Good).unwrap();
    assert_eq!(result.data_in, data);
    assert_eq!(sim.read_block(201), &data[512..]);
}

#[test]
fn too_many_target_descriptors() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let Harness { ctx, sd, .. } = &mut h;

    let params: CopyParameters = verbs::receive_copy_results(
        ctx,
        sd,
        CopyResultsServiceAction::OPERATING_PARAMETERS,
        0,
        Expectation::Good,
    )
    .unwrap()
    .decode()
    .unwrap();
    let designator = designator(ctx, sd);
    let targets = usize::from(params.max_target_descriptor_count) + 1;
    let list = copy_list(&designator, targets, 1, 0, 1);
    verbs::extended_copy(ctx, sd, &list, Expectation::TooManyDescriptors).unwrap();
}

#[test]
fn unsupported_target_descriptor() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let Harness { ctx, sd, .. } = &mut h;

    let designator = designator(ctx, sd);
    let mut list = copy_list(&designator, 1, 1, 0, 1);
    list[HEADER_LEN] = 0xe0;
    verbs::extended_copy(ctx, sd, &list, Expectation::UnsupportedDescriptorCode).unwrap();
}

#[test]
fn unsupported_segment_descriptor() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let Harness { ctx, sd, .. } = &mut h;

    let designator = designator(ctx, sd);
    let seg_len = xcopy::descriptor_length(DescriptorTypeCode::BLOCK_TO_STREAM).unwrap();
    let mut buf = vec![0; HEADER_LEN + TARGET_LEN + seg_len];
    let list = ParameterList {
        list_id_usage: LIST_ID_USAGE_NONE,
        target_descriptor_list_length: TARGET_LEN as u16,
        segment_descriptor_list_length: seg_len as u32,
        ..Default::default()
    };
    let mut offset = xcopy::write_parameter_header(&mut buf, 0, &list).unwrap();
    offset += xcopy::write_target_descriptor(
        &mut buf,
        offset,
        &designator,
        PeripheralDeviceType::DIRECT_ACCESS,
        512,
        false,
    )
    .unwrap();
    xcopy::write_segment_header(
        &mut buf,
        offset,
        &segment(DescriptorTypeCode::BLOCK_TO_STREAM),
    )
    .unwrap();
    verbs::extended_copy(ctx, sd, &buf, Expectation::UnsupportedDescriptorCode).unwrap();
}

#[test]
fn unreachable_target_aborts_copy() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let Harness { ctx, sd, .. } = &mut h;

    let mut designator = designator(ctx, sd);
    if let Some(last) = designator.last_mut() {
        *last ^= 0xff;
    }
    let list = copy_list(&designator, 1, 1, 0, 1);
    verbs::extended_copy(ctx, sd, &list, Expectation::CopyAborted).unwrap();
}

#[test]
fn copy_operating_parameters() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let result = verbs::receive_copy_results(
        &h.ctx,
        &mut h.sd,
        CopyResultsServiceAction::OPERATING_PARAMETERS,
        0,
        Expectation::Good,
    )
    .unwrap();
    let params: CopyParameters = result.decode().unwrap();
    assert_eq!(params.max_target_descriptor_count, 2);
    assert_eq!(params.max_segment_descriptor_count, 4);
    assert_eq!(params.max_descriptor_list_length, 1024);
    assert!(params.supports(DescriptorTypeCode::BLOCK_TO_BLOCK));
    assert!(params.supports(DescriptorTypeCode::IDENTIFICATION));
    assert!(!params.supports(DescriptorTypeCode::BLOCK_TO_STREAM));
}

#[test]
fn copy_is_gated_on_data_loss() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let list = copy_list(&NAA_DESIGNATOR, 1, 1, 0, 1);
    let before = h.sim.commands_received();
    let err = verbs::extended_copy(&h.ctx, &mut h.sd, &list, Expectation::Good).unwrap_err();
    assert!(err.is_skip());
    assert_eq!(h.sim.commands_received(), before);
}
