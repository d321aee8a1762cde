// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Media access verb tests.

use super::destructive;
use super::Harness;
use crate::config::TestConfig;
use crate::expect::Expectation;
use crate::outcome::CheckError;
use crate::outcome::Failure;
use crate::outcome::SkipReason;
use crate::test_helpers::SimConfig;
use crate::verbs;
use crate::verbs::IoFlags;
use crate::verbs::VerifyOptions;

#[test]
fn write_then_read_back() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let data = h.pattern(2, 7);
    let Harness { sim, ctx, sd } = &mut h;

    verbs::write10(ctx, sd, 10, &data, IoFlags::default(), Expectation::Good).unwrap();
    let result = verbs::read10(ctx, sd, 10, 2, IoFlags::default(), Expectation::Good).unwrap();
    assert_eq!(result.data_in, data);
    assert_eq!(sim.read_block(11), &data[512..]);

    let result = verbs::read6(ctx, sd, 10, 2, Expectation::Good).unwrap();
    assert_eq!(result.data_in, data);
}

#[test]
fn every_address_width_reaches_the_same_blocks() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let a = h.pattern(1, 1);
    let b = h.pattern(1, 2);
    let Harness { ctx, sd, .. } = &mut h;

    verbs::write12(ctx, sd, 30, &a, IoFlags::default(), Expectation::Good).unwrap();
    verbs::write16(ctx, sd, 31, &b, IoFlags::default(), Expectation::Good).unwrap();
    let r12 = verbs::read12(ctx, sd, 31, 1, IoFlags::default(), Expectation::Good).unwrap();
    let r16 = verbs::read16(ctx, sd, 30, 1, IoFlags::default(), Expectation::Good).unwrap();
    assert_eq!(r12.data_in, b);
    assert_eq!(r16.data_in, a);
}

#[test]
fn read_beyond_capacity_is_lba_out_of_range() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let num_blocks = h.ctx.config.num_blocks;
    assert_eq!(num_blocks, 2048);
    let Harness { ctx, sd, .. } = &mut h;

    verbs::read10(
        ctx,
        sd,
        num_blocks as u32,
        1,
        IoFlags::default(),
        Expectation::LbaOutOfRange,
    )
    .unwrap();
    verbs::read16(
        ctx,
        sd,
        num_blocks - 1,
        2,
        IoFlags::default(),
        Expectation::LbaOutOfRange,
    )
    .unwrap();
    verbs::read16(
        ctx,
        sd,
        u64::MAX,
        1,
        IoFlags::default(),
        Expectation::LbaOutOfRange,
    )
    .unwrap();
}

#[test]
fn mismatch_fails_with_diagnostic() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let lba = h.ctx.config.num_blocks as u32;
    let err = verbs::read10(
        &h.ctx,
        &mut h.sd,
        lba,
        1,
        IoFlags::default(),
        Expectation::Good,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CheckError::Failed(Failure::Mismatch {
            command: "READ10",
            ..
        })
    ));
    assert!(h.sd.error().starts_with("READ10"));

    h.sd.clear_error();
    verbs::read10(&h.ctx, &mut h.sd, 0, 1, IoFlags::default(), Expectation::Good).unwrap();
    assert!(h.sd.error().is_empty());
}

#[test]
fn transfer_longer_than_limit_is_rejected() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    assert_eq!(h.ctx.config.maximum_transfer_length, 128);
    verbs::read10(
        &h.ctx,
        &mut h.sd,
        0,
        129,
        IoFlags::default(),
        Expectation::InvalidFieldInCdb,
    )
    .unwrap();
}

#[test]
fn verify_compares_medium() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let data = h.pattern(2, 3);
    let other = h.pattern(2, 4);
    let Harness { ctx, sd, .. } = &mut h;

    verbs::write10(ctx, sd, 5, &data, IoFlags::default(), Expectation::Good).unwrap();
    let bytchk = VerifyOptions {
        bytchk: 1,
        ..Default::default()
    };
    verbs::verify10(ctx, sd, 5, 2, &data, bytchk, Expectation::Good).unwrap();
    verbs::verify16(ctx, sd, 5, 2, &other, bytchk, Expectation::Miscompare).unwrap();
    verbs::verify12(ctx, sd, 5, 2, &[], VerifyOptions::default(), Expectation::Good).unwrap();
}

#[test]
fn verify_single_block_against_range() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let same = h.fill(4, 0x5a);
    let block = h.fill(1, 0x5a);
    let Harness { ctx, sd, .. } = &mut h;

    verbs::write10(ctx, sd, 40, &same, IoFlags::default(), Expectation::Good).unwrap();
    let opts = VerifyOptions {
        bytchk: 3,
        ..Default::default()
    };
    verbs::verify16(ctx, sd, 40, 4, &block, opts, Expectation::Good).unwrap();
    verbs::verify16(ctx, sd, 41, 4, &block, opts, Expectation::Miscompare).unwrap();
}

#[test]
fn write_verify_at_each_width() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let data = h.pattern(1, 9);
    let Harness { sim, ctx, sd } = &mut h;
    let opts = VerifyOptions::default();

    verbs::write_verify10(ctx, sd, 60, &data, opts, Expectation::Good).unwrap();
    verbs::write_verify12(ctx, sd, 61, &data, opts, Expectation::Good).unwrap();
    verbs::write_verify16(ctx, sd, 62, &data, opts, Expectation::Good).unwrap();
    for lba in 60..63 {
        assert_eq!(sim.read_block(lba), data);
    }
}

#[test]
fn compare_and_write_swaps_only_on_match() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let old = h.fill(1, 0x11);
    let new = h.fill(1, 0x22);
    let Harness { sim, ctx, sd } = &mut h;

    verbs::write10(ctx, sd, 7, &old, IoFlags::default(), Expectation::Good).unwrap();
    let swap = [old.as_slice(), new.as_slice()].concat();
    verbs::compare_and_write(ctx, sd, 7, &swap, IoFlags::default(), Expectation::Good).unwrap();
    assert_eq!(sim.read_block(7), new);

    // The medium no longer holds `old`, so the same request miscompares.
    verbs::compare_and_write(
        ctx,
        sd,
        7,
        &swap,
        IoFlags::default(),
        Expectation::Miscompare,
    )
    .unwrap();
    assert_eq!(sim.read_block(7), new);
}

#[test]
fn orwrite_merges() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let low = h.fill(1, 0x0f);
    let high = h.fill(1, 0xf0);
    let Harness { sim, ctx, sd } = &mut h;

    verbs::write10(ctx, sd, 8, &low, IoFlags::default(), Expectation::Good).unwrap();
    verbs::orwrite(ctx, sd, 8, &high, IoFlags::default(), Expectation::Good).unwrap();
    assert!(sim.read_block(8).iter().all(|&b| b == 0xff));
}

#[test]
fn write_atomic_skipped_when_not_reported() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let data = h.fill(1, 1);
    let before = h.sim.commands_received();
    let err = verbs::write_atomic16(
        &h.ctx,
        &mut h.sd,
        0,
        &data,
        IoFlags::default(),
        Expectation::Good,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CheckError::Skipped(SkipReason::NotImplemented("WRITEATOMIC16"))
    ));
    assert_eq!(h.sim.commands_received(), before);
}

#[test]
fn write_atomic_invalid_opcode_becomes_skip() {
    let sim_config = SimConfig {
        report_opcodes: false,
        ..Default::default()
    };
    let mut h = Harness::new(sim_config, destructive());
    assert!(h.ctx.config.capabilities.supported_opcodes.is_none());
    let data = h.fill(1, 1);
    let before = h.sim.commands_received();
    let err = verbs::write_atomic16(
        &h.ctx,
        &mut h.sd,
        0,
        &data,
        IoFlags::default(),
        Expectation::Good,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CheckError::Skipped(SkipReason::NotImplemented("WRITEATOMIC16"))
    ));
    assert_eq!(h.sim.commands_received(), before + 1);
    assert!(h.sd.error().is_empty());
}

#[test]
fn write_atomic_when_implemented() {
    let sim_config = SimConfig {
        unsupported: Vec::new(),
        ..Default::default()
    };
    let mut h = Harness::new(sim_config, destructive());
    let data = h.fill(1, 0x42);
    verbs::write_atomic16(
        &h.ctx,
        &mut h.sd,
        3,
        &data,
        IoFlags::default(),
        Expectation::Good,
    )
    .unwrap();
    assert_eq!(h.sim.read_block(3), data);
}

#[test]
fn negative_writes_need_data_loss() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let data = h.fill(1, 0x42);
    let lba = h.ctx.config.num_blocks as u32;
    let before = h.sim.commands_received();

    for (lba, expect) in [
        (lba, Expectation::LbaOutOfRange),
        (0, Expectation::WriteProtected),
        (0, Expectation::ReservationConflict),
    ] {
        let err = verbs::write10(&h.ctx, &mut h.sd, lba, &data, IoFlags::default(), expect)
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::Skipped(SkipReason::DataLossNotAllowed)
        ));
    }
    assert_eq!(h.sim.commands_received(), before);
}

#[test]
fn oversized_transfer_fails_without_sending() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let before = h.sim.commands_received();
    let err = verbs::read12(
        &h.ctx,
        &mut h.sd,
        0,
        u32::MAX,
        IoFlags::default(),
        Expectation::InvalidFieldInCdb,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CheckError::Failed(Failure::Encode {
            command: "READ12",
            ..
        })
    ));
    assert_eq!(h.sim.commands_received(), before);
}
