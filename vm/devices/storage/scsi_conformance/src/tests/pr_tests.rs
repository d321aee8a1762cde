// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent reservation tests across two or three nexuses.

use super::destructive;
use super::Harness;
use crate::config::TestConfig;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::outcome::CheckError;
use crate::outcome::SkipReason;
use crate::pr;
use crate::pr::ReservationState;
use crate::test_helpers::SimConfig;
use crate::verbs;
use scsi_defs::ReservationType;
use scsi_defs::ServiceActionIn;

struct Pair {
    h: Harness,
    other: ScsiDevice,
    key: u64,
    other_key: u64,
}

/// Two nexuses, each registered with its own random key.
fn registered_pair(config: TestConfig) -> Pair {
    let mut h = Harness::new(SimConfig::default(), config);
    let mut other = h.second();
    let key = h.ctx.random_key();
    let mut other_key = h.ctx.random_key();
    while other_key == key {
        other_key = h.ctx.random_key();
    }
    pr::register_and_ignore(&h.ctx, &mut h.sd, key, Expectation::Good).unwrap();
    pr::register_and_ignore(&h.ctx, &mut other, other_key, Expectation::Good).unwrap();
    Pair {
        h,
        other,
        key,
        other_key,
    }
}

#[test]
fn second_reservation_conflicts() {
    let Pair {
        mut h,
        mut other,
        key,
        other_key,
    } = registered_pair(TestConfig::default());
    let Harness { ctx, sd, .. } = &mut h;

    pr::verify_not_reserved(ctx, sd).unwrap();
    pr::reserve(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    pr::reserve(
        ctx,
        &mut other,
        other_key,
        ReservationType::EXCLUSIVE,
        Expectation::ReservationConflict,
    )
    .unwrap();
    pr::verify_reserved_as(ctx, sd, key, ReservationType::EXCLUSIVE).unwrap();

    // Reserving again with the same type is not an error for the holder.
    pr::reserve(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    pr::release(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    pr::verify_not_reserved(ctx, sd).unwrap();
}

#[test]
fn unregistered_key_cannot_release() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let mut other = h.second();
    let ty = ReservationType::WRITE_EXCLUSIVE_ALL_REGISTRANTS;
    let Harness { ctx, sd, .. } = &mut h;

    pr::register_and_ignore(ctx, sd, 5, Expectation::Good).unwrap();
    pr::reserve(ctx, sd, 5, ty, Expectation::Good).unwrap();
    pr::release(ctx, &mut other, 9, ty, Expectation::ReservationConflict).unwrap();
    pr::verify_reserved_as(ctx, sd, 5, ty).unwrap();
    assert_eq!(
        ReservationState::observe(ctx, sd).unwrap(),
        ReservationState::Reserved {
            key: 0,
            reservation_type: ty
        }
    );
}

#[test]
fn registration_rules() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let key = h.ctx.random_key();
    let new_key = key.wrapping_add(1).max(1);
    let Harness { sim, ctx, sd } = &mut h;

    pr::register_and_ignore(ctx, sd, key, Expectation::Good).unwrap();
    pr::register_and_ignore(ctx, sd, key, Expectation::Good).unwrap();
    pr::verify_key_presence(ctx, sd, key, true).unwrap();
    assert_eq!(sim.registered_keys(), [key]);

    pr::reregister_key_fails(ctx, sd, key).unwrap();
    let generation = pr::read_keys(ctx, sd).unwrap().generation;

    pr::register_key(ctx, sd, new_key, key, Expectation::Good).unwrap();
    pr::verify_key_presence(ctx, sd, key, false).unwrap();
    pr::verify_key_presence(ctx, sd, new_key, true).unwrap();
    assert_ne!(pr::read_keys(ctx, sd).unwrap().generation, generation);

    pr::register_key(ctx, sd, 0, new_key, Expectation::Good).unwrap();
    pr::verify_key_presence(ctx, sd, new_key, false).unwrap();
    assert!(pr::read_keys(ctx, sd).unwrap().keys.is_empty());
}

#[test]
fn presence_check_reports_missing_key() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let err = pr::verify_key_presence(&h.ctx, &mut h.sd, 0x1234, true).unwrap_err();
    assert!(!err.is_skip());
    assert!(h.sd.error().contains("0x1234"));
}

#[test]
fn reservation_needs_own_key() {
    let Pair {
        mut h,
        mut other,
        key,
        ..
    } = registered_pair(TestConfig::default());
    let Harness { ctx, sd, .. } = &mut h;

    // Presenting another nexus's key is a conflict and changes nothing.
    pr::reserve(
        ctx,
        &mut other,
        key,
        ReservationType::WRITE_EXCLUSIVE,
        Expectation::ReservationConflict,
    )
    .unwrap();
    pr::verify_not_reserved(ctx, sd).unwrap();

    pr::reserve(ctx, sd, key, ReservationType::WRITE_EXCLUSIVE, Expectation::Good).unwrap();
    pr::clear(ctx, &mut other, key, Expectation::ReservationConflict).unwrap();
    pr::verify_reserved_as(ctx, sd, key, ReservationType::WRITE_EXCLUSIVE).unwrap();
}

/// A registered nexus that does not hold the reservation gets success
/// from RELEASE, and the reservation stays put.
#[test]
fn non_holder_release_has_no_effect() {
    let Pair {
        mut h,
        mut other,
        key,
        other_key,
    } = registered_pair(TestConfig::default());
    let Harness { ctx, sd, .. } = &mut h;

    pr::reserve(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    pr::release(
        ctx,
        &mut other,
        other_key,
        ReservationType::EXCLUSIVE,
        Expectation::Good,
    )
    .unwrap();
    pr::verify_reserved_as(ctx, sd, key, ReservationType::EXCLUSIVE).unwrap();
}

#[test]
fn foreign_key_changes_nothing() {
    let Pair {
        mut h,
        mut other,
        key,
        other_key,
    } = registered_pair(TestConfig::default());
    let mut unregistered = h.sim.device("iqn.2007-10.com.example:third");
    let stray = h.ctx.random_key() | 1;
    let ty = ReservationType::EXCLUSIVE;
    let Harness { sim, ctx, sd } = &mut h;

    pr::reserve(ctx, sd, key, ty, Expectation::Good).unwrap();
    let generation = pr::read_keys(ctx, sd).unwrap().generation;
    let conflict = Expectation::ReservationConflict;

    // An unregistered nexus can neither release, preempt, reserve nor clear.
    pr::release(ctx, &mut unregistered, stray, ty, conflict).unwrap();
    pr::preempt(ctx, &mut unregistered, stray, key, ty, conflict).unwrap();
    pr::reserve(ctx, &mut unregistered, stray, ty, conflict).unwrap();
    pr::clear(ctx, &mut unregistered, stray, conflict).unwrap();

    // A registered nexus presenting the holder's key as its own.
    pr::preempt(ctx, &mut other, key, other_key, ty, conflict).unwrap();
    pr::release(ctx, &mut other, key, ty, conflict).unwrap();

    pr::verify_reserved_as(ctx, sd, key, ty).unwrap();
    pr::verify_key_presence(ctx, sd, key, true).unwrap();
    pr::verify_key_presence(ctx, sd, other_key, true).unwrap();
    assert_eq!(pr::read_keys(ctx, sd).unwrap().generation, generation);
    let mut keys = sim.registered_keys();
    keys.sort_unstable();
    let mut expected = vec![key, other_key];
    expected.sort_unstable();
    assert_eq!(keys, expected);
}

#[test]
fn write_exclusive_access() {
    let Pair {
        mut h,
        mut other,
        key,
        ..
    } = registered_pair(destructive());
    let data = h.fill(1, 0x5e);
    let Harness { ctx, sd, .. } = &mut h;

    pr::reserve(ctx, sd, key, ReservationType::WRITE_EXCLUSIVE, Expectation::Good).unwrap();
    pr::verify_write_works(ctx, sd, &data).unwrap();
    pr::verify_read_works(ctx, &mut other).unwrap();
    pr::verify_write_fails(ctx, &mut other, &data).unwrap();
}

#[test]
fn exclusive_access() {
    let Pair {
        mut h,
        mut other,
        key,
        ..
    } = registered_pair(destructive());
    let data = h.fill(1, 0x5f);
    let Harness { ctx, sd, .. } = &mut h;

    pr::reserve(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    assert_eq!(pr::verify_read_works(ctx, sd).unwrap(), [0; 512]);
    pr::verify_read_fails(ctx, &mut other).unwrap();
    pr::verify_write_fails(ctx, &mut other, &data).unwrap();
}

#[test]
fn registrants_only_access() {
    let Pair {
        mut h,
        mut other,
        key,
        ..
    } = registered_pair(destructive());
    let mut unregistered = h.sim.device("iqn.2007-10.com.example:third");
    let data = h.fill(1, 0x60);
    let Harness { ctx, sd, .. } = &mut h;

    let ty = ReservationType::WRITE_EXCLUSIVE_REGISTRANTS;
    pr::reserve(ctx, sd, key, ty, Expectation::Good).unwrap();
    pr::verify_write_works(ctx, &mut other, &data).unwrap();
    pr::verify_read_works(ctx, &mut unregistered).unwrap();
    pr::verify_write_fails(ctx, &mut unregistered, &data).unwrap();
}

#[test]
fn preempt_takes_over_reservation() {
    let Pair {
        mut h,
        mut other,
        key,
        other_key,
    } = registered_pair(TestConfig::default());
    let Harness { ctx, sd, .. } = &mut h;

    pr::reserve(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    pr::preempt(
        ctx,
        &mut other,
        other_key,
        key,
        ReservationType::WRITE_EXCLUSIVE,
        Expectation::Good,
    )
    .unwrap();
    pr::verify_reserved_as(ctx, &mut other, other_key, ReservationType::WRITE_EXCLUSIVE)
        .unwrap();
    pr::verify_key_presence(ctx, &mut other, key, false).unwrap();

    // The preempted nexus is told through a unit attention.
    assert_eq!(verbs::tur_until_good(sd).unwrap(), 1);
    pr::reserve(
        ctx,
        sd,
        key,
        ReservationType::WRITE_EXCLUSIVE,
        Expectation::ReservationConflict,
    )
    .unwrap();
}

#[test]
fn clear_removes_everything() {
    let Pair {
        mut h,
        mut other,
        key,
        other_key,
    } = registered_pair(TestConfig::default());
    let Harness { ctx, sd, .. } = &mut h;

    pr::reserve(ctx, sd, key, ReservationType::EXCLUSIVE, Expectation::Good).unwrap();
    pr::clear(ctx, sd, key, Expectation::Good).unwrap();
    pr::verify_not_reserved(ctx, sd).unwrap();
    pr::verify_key_presence(ctx, sd, key, false).unwrap();
    pr::verify_key_presence(ctx, sd, other_key, false).unwrap();
    assert_eq!(verbs::tur_until_good(&mut other).unwrap(), 1);
}

#[test]
fn all_registrants_release_by_any_registrant() {
    let Pair {
        mut h,
        mut other,
        key,
        other_key,
    } = registered_pair(TestConfig::default());
    let Harness { ctx, sd, .. } = &mut h;

    let ty = ReservationType::EXCLUSIVE_ALL_REGISTRANTS;
    pr::reserve(ctx, sd, key, ty, Expectation::Good).unwrap();
    pr::verify_reserved_as(ctx, &mut other, other_key, ty).unwrap();
    pr::release(ctx, &mut other, other_key, ty, Expectation::Good).unwrap();
    pr::verify_not_reserved(ctx, &mut other).unwrap();
}

#[test]
fn capabilities_report_every_type() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let caps = pr::report_capabilities(&h.ctx, &mut h.sd).unwrap();
    for ty in [
        ReservationType::WRITE_EXCLUSIVE,
        ReservationType::EXCLUSIVE,
        ReservationType::WRITE_EXCLUSIVE_REGISTRANTS,
        ReservationType::EXCLUSIVE_REGISTRANTS,
        ReservationType::WRITE_EXCLUSIVE_ALL_REGISTRANTS,
        ReservationType::EXCLUSIVE_ALL_REGISTRANTS,
    ] {
        assert!(caps.supports(ty), "{ty}");
    }
    assert!(caps.crh);
}

#[test]
fn reserve6_conflicts_with_registrations() {
    let Pair { mut h, .. } = registered_pair(TestConfig::default());
    verbs::reserve6_conflict(&h.ctx, &mut h.sd).unwrap();
}

#[test]
fn unsupported_report_is_rejected() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    pr::prin_task(
        &h.ctx,
        &mut h.sd,
        ServiceActionIn::READ_FULL_STATUS,
        Expectation::InvalidFieldInCdb,
    )
    .unwrap();
    let result = pr::prin_task(
        &h.ctx,
        &mut h.sd,
        ServiceActionIn::READ_RESERVATIONS,
        Expectation::Good,
    )
    .unwrap();
    assert_eq!(result.data_in.len(), 8);
}

#[test]
fn all_registrants_types() {
    assert!(pr::is_all_registrants(ReservationType::WRITE_EXCLUSIVE_ALL_REGISTRANTS));
    assert!(pr::is_all_registrants(ReservationType::EXCLUSIVE_ALL_REGISTRANTS));
    assert!(!pr::is_all_registrants(ReservationType::EXCLUSIVE_REGISTRANTS));
    assert!(!pr::is_all_registrants(ReservationType::WRITE_EXCLUSIVE));
}

#[test]
fn write_access_check_needs_data_loss() {
    let mut h = Harness::new(SimConfig::default(), TestConfig::default());
    let data = h.fill(1, 0xaa);
    let before = h.sim.commands_received();

    // Nothing holds a reservation, so a unit that let this through would
    // overwrite the first block.
    let err = pr::verify_write_fails(&h.ctx, &mut h.sd, &data).unwrap_err();
    assert!(matches!(
        err,
        CheckError::Skipped(SkipReason::DataLossNotAllowed)
    ));
    assert_eq!(h.sim.commands_received(), before);
    assert!(h.sim.read_block(0).iter().all(|&b| b == 0));
}
