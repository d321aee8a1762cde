// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Unit state tests: attentions, removable media, write protection,
//! RESERVE (6) and SANITIZE.

use super::destructive;
use super::Harness;
use super::ENTROPY;
use crate::config::TestConfig;
use crate::context::TestContext;
use crate::expect::Expectation;
use crate::gate::Guard;
use crate::outcome::CheckError;
use crate::outcome::Failure;
use crate::outcome::SkipReason;
use crate::payload::ModeSense6Data;
use crate::test_helpers::init_tracing;
use crate::test_helpers::SimConfig;
use crate::test_helpers::SimTarget;
use crate::verbs;
use crate::verbs::IoFlags;
use crate::verbs::ModeSenseRequest;
use crate::verbs::SanitizeParams;
use crate::verbs::StartStopParams;
use scsi_defs::SanitizeServiceAction;
use scsi_defs::MODE_PAGE_CONTROL;

fn eject() -> StartStopParams {
    StartStopParams {
        load_eject: true,
        start: false,
        ..Default::default()
    }
}

fn load() -> StartStopParams {
    StartStopParams {
        load_eject: true,
        start: true,
        ..Default::default()
    }
}

fn sanitize_config() -> TestConfig {
    TestConfig {
        allow_sanitize: true,
        ..destructive()
    }
}

fn block_erase() -> SanitizeParams {
    SanitizeParams {
        immediate: false,
        ause: false,
        service_action: SanitizeServiceAction::BLOCK_ERASE,
    }
}

#[test]
fn unit_attentions_drain() {
    init_tracing();
    let sim = SimTarget::new(SimConfig {
        power_on_unit_attention: true,
        ..Default::default()
    });
    let config = TestConfig::default();
    let mut sd = sim.device(&config.initiator_name1);
    assert_eq!(verbs::tur_until_good(&mut sd).unwrap(), 1);
    assert_eq!(verbs::tur_until_good(&mut sd).unwrap(), 0);

    let ctx = TestContext::new(config, ENTROPY);
    let mut other = sim.device(&ctx.config.initiator_name2);
    verbs::test_unit_ready_clear_ua(&ctx, &mut other).unwrap();
}

#[test]
fn unit_attention_fails_plain_tur() {
    init_tracing();
    let sim = SimTarget::new(SimConfig {
        power_on_unit_attention: true,
        ..Default::default()
    });
    let ctx = TestContext::new(TestConfig::default(), ENTROPY);
    let mut sd = sim.device(&ctx.config.initiator_name1);
    let err = verbs::test_unit_ready(&ctx, &mut sd, Expectation::Good).unwrap_err();
    assert!(matches!(err, CheckError::Failed(Failure::Mismatch { .. })));
    verbs::test_unit_ready(&ctx, &mut sd, Expectation::Good).unwrap();
}

#[test]
fn removable_medium_lifecycle() {
    let mut h = Harness::new(
        SimConfig {
            removable: true,
            ..Default::default()
        },
        TestConfig::default(),
    );
    let Harness { sim, ctx, sd } = &mut h;
    ctx.require(&[Guard::Removable]).unwrap();

    verbs::prevent_allow(ctx, sd, true, Expectation::Good).unwrap();
    verbs::start_stop_unit(ctx, sd, eject(), Expectation::RemovalPrevented).unwrap();
    assert!(sim.medium_present());

    verbs::prevent_allow(ctx, sd, false, Expectation::Good).unwrap();
    verbs::start_stop_unit(ctx, sd, eject(), Expectation::Good).unwrap();
    assert!(!sim.medium_present());
    verbs::test_unit_ready(ctx, sd, Expectation::NoMedium).unwrap();
    verbs::read10(ctx, sd, 0, 1, IoFlags::default(), Expectation::NoMedium).unwrap();

    verbs::start_stop_unit(ctx, sd, load(), Expectation::Good).unwrap();
    verbs::test_unit_ready(ctx, sd, Expectation::Good).unwrap();
}

#[test]
fn fixed_medium_skips_removable_tests() {
    let h = Harness::new(SimConfig::default(), TestConfig::default());
    assert!(matches!(
        h.ctx.require(&[Guard::Removable]),
        Err(CheckError::Skipped(SkipReason::NotRemovable))
    ));
}

#[test]
fn reserve6_locks_out_other_nexus() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let mut other = h.second();
    let Harness { ctx, sd, .. } = &mut h;

    verbs::reserve6(ctx, sd).unwrap();
    verbs::reserve6_conflict(ctx, &mut other).unwrap();
    verbs::read10(
        ctx,
        &mut other,
        0,
        1,
        IoFlags::default(),
        Expectation::ReservationConflict,
    )
    .unwrap();
    verbs::read10(ctx, sd, 0, 1, IoFlags::default(), Expectation::Good).unwrap();

    verbs::release6(ctx, sd).unwrap();
    verbs::reserve6(ctx, &mut other).unwrap();
    verbs::release6(ctx, &mut other).unwrap();
}

#[test]
fn software_write_protect() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let mut other = h.second();
    let data = h.fill(1, 0x77);
    let Harness { sim, ctx, sd } = &mut h;

    verbs::set_swp(ctx, sd).unwrap();
    assert!(sim.software_write_protect());
    verbs::write10(ctx, sd, 0, &data, IoFlags::default(), Expectation::WriteProtected).unwrap();

    let result = verbs::mode_sense6(
        ctx,
        sd,
        ModeSenseRequest::current(MODE_PAGE_CONTROL),
        Expectation::Good,
    )
    .unwrap();
    let page: ModeSense6Data = result.decode().unwrap();
    assert!(page.write_protected());
    assert_eq!(page.software_write_protect(), Some(true));

    // The other nexus learns of the change through a unit attention.
    assert_eq!(verbs::tur_until_good(&mut other).unwrap(), 1);

    verbs::clear_swp(ctx, sd).unwrap();
    assert!(!sim.software_write_protect());
    verbs::write10(ctx, sd, 0, &data, IoFlags::default(), Expectation::Good).unwrap();
}

#[test]
fn software_write_protect_needs_data_loss() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let before = h.sim.commands_received();
    let err = verbs::set_swp(&h.ctx, &mut h.sd).unwrap_err();
    assert!(matches!(
        err,
        CheckError::Skipped(SkipReason::DataLossNotAllowed)
    ));
    assert_eq!(h.sim.commands_received(), before);
}

#[test]
fn read_only_unit() {
    let mut h = Harness::new(
        SimConfig {
            read_only: true,
            ..Default::default()
        },
        TestConfig {
            readonly: true,
            ..Default::default()
        },
    );
    let data = h.fill(1, 1);
    let Harness { ctx, sd, .. } = &mut h;
    ctx.require(&[Guard::ReadOnly]).unwrap();

    // Negative write tests run without the data loss opt-in.
    verbs::write10(ctx, sd, 0, &data, IoFlags::default(), Expectation::WriteProtected).unwrap();
    verbs::write16(ctx, sd, 0, &data, IoFlags::default(), Expectation::WriteProtected).unwrap();
    let result = verbs::mode_sense6(
        ctx,
        sd,
        ModeSenseRequest::current(MODE_PAGE_CONTROL),
        Expectation::Good,
    )
    .unwrap();
    assert!(result.decode::<ModeSense6Data>().unwrap().write_protected());
}

#[test]
fn sanitize_block_erase() {
    let mut h = Harness::new(SimConfig::default(), sanitize_config());
    let data = h.fill(2, 0xee);
    let Harness { sim, ctx, sd } = &mut h;

    verbs::write10(ctx, sd, 50, &data, IoFlags::default(), Expectation::Good).unwrap();
    verbs::sanitize(ctx, sd, block_erase(), &[], Expectation::Good).unwrap();
    assert!(sim.read_block(50).iter().all(|&b| b == 0));
    assert!(!sim.is_mapped(51));
}

#[test]
fn sanitize_overwrite_pattern() {
    let mut h = Harness::new(SimConfig::default(), sanitize_config());
    let Harness { sim, ctx, sd } = &mut h;

    let params = [0x01, 0x00, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef];
    let overwrite = SanitizeParams {
        service_action: SanitizeServiceAction::OVERWRITE,
        ..block_erase()
    };
    verbs::sanitize(ctx, sd, overwrite, &params, Expectation::Good).unwrap();
    let block = sim.read_block(9);
    assert_eq!(&block[..8], [0xde, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef]);

    verbs::sanitize(ctx, sd, overwrite, &[], Expectation::InvalidFieldInCdb).unwrap();
}

#[test]
fn sanitize_immediate_reports_progress() {
    let mut h = Harness::new(SimConfig::default(), sanitize_config());
    let Harness { ctx, sd, .. } = &mut h;

    let params = SanitizeParams {
        immediate: true,
        ..block_erase()
    };
    verbs::sanitize(ctx, sd, params, &[], Expectation::Good).unwrap();
    verbs::test_unit_ready(ctx, sd, Expectation::SanitizeInProgress).unwrap();
    verbs::test_unit_ready(ctx, sd, Expectation::Good).unwrap();
}

#[test]
fn sanitize_needs_both_opt_ins() {
    let mut h = Harness::new(SimConfig::default(), destructive());
    let before = h.sim.commands_received();
    let err = verbs::sanitize(&h.ctx, &mut h.sd, block_erase(), &[], Expectation::Good)
        .unwrap_err();
    assert!(matches!(
        err,
        CheckError::Skipped(SkipReason::SanitizeNotAllowed)
    ));

    h.ctx.config.allow_sanitize = true;
    h.ctx.config.data_loss = false;
    let err = verbs::sanitize(
        &h.ctx,
        &mut h.sd,
        block_erase(),
        &[0],
        Expectation::InvalidFieldInCdb,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CheckError::Skipped(SkipReason::DataLossNotAllowed)
    ));
    assert_eq!(h.sim.commands_received(), before);
}
