// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent reservation operations and the reservation state oracle.
//!
//! PERSISTENT RESERVE OUT operations take an expectation so negative tests
//! reuse them. State checks go through READ RESERVATION and READ KEYS and
//! never change device state.

use crate::cdb;
use crate::cdb::IoFlags;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::outcome::Failure;
use crate::outcome::Verdict;
use crate::payload::ReadKeys;
use crate::payload::ReadReservation;
use crate::payload::ReportCapabilities;
use crate::transport::TaskResult;
use crate::verbs;
use crate::verbs::decode;
use crate::verbs::Command;
use scsi_defs::ReservationType;
use scsi_defs::ServiceActionIn;
use scsi_defs::ServiceActionOut;
use std::fmt;

const PRIN_ALLOCATION: u16 = 16384;

/// Reservation state as reported by READ RESERVATION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Unreserved,
    /// `key` is zero for all registrants types.
    Reserved {
        key: u64,
        reservation_type: ReservationType,
    },
}

impl ReservationState {
    /// The state a successful reservation by `key` must leave behind.
    pub fn held_by(key: u64, reservation_type: ReservationType) -> Self {
        let key = if is_all_registrants(reservation_type) {
            0
        } else {
            key
        };
        ReservationState::Reserved {
            key,
            reservation_type,
        }
    }

    /// Reads the unit's current reservation.
    pub fn observe(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict<Self> {
        let result = prin_task(
            ctx,
            sd,
            ServiceActionIn::READ_RESERVATIONS,
            Expectation::Good,
        )?;
        let report: ReadReservation = decode("PERSISTENTRESERVEIN", &result)?;
        Ok(match report.reservation {
            None => ReservationState::Unreserved,
            Some(d) => ReservationState::Reserved {
                key: d.key,
                reservation_type: d.reservation_type,
            },
        })
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationState::Unreserved => f.write_str("unreserved"),
            ReservationState::Reserved {
                key,
                reservation_type,
            } => write!(f, "reserved by {key:#x} as {reservation_type}"),
        }
    }
}

/// Whether every registrant holds a reservation of type `ty`.
pub fn is_all_registrants(ty: ReservationType) -> bool {
    ty.is_all_registrants()
}

/// PERSISTENT RESERVE IN with any service action.
pub fn prin_task(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    service_action: ServiceActionIn,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::persistent_reserve_in(service_action, PRIN_ALLOCATION);
    verbs::run(ctx, sd, Command::new("PERSISTENTRESERVEIN", task), expect)
}

fn prout(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    service_action: ServiceActionOut,
    reservation_type: ReservationType,
    key: u64,
    service_action_key: u64,
    expect: Expectation,
) -> Verdict {
    tracing::debug!(
        %service_action,
        %reservation_type,
        key = format_args!("{key:#x}"),
        service_action_key = format_args!("{service_action_key:#x}"),
        "persistent reserve out"
    );
    let task =
        cdb::persistent_reserve_out(service_action, reservation_type, key, service_action_key);
    verbs::run(ctx, sd, Command::new("PERSISTENTRESERVEOUT", task), expect)?;
    Ok(())
}

pub fn read_keys(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict<ReadKeys> {
    let result = prin_task(ctx, sd, ServiceActionIn::READ_KEYS, Expectation::Good)?;
    decode("PERSISTENTRESERVEIN", &result)
}

/// REGISTER AND IGNORE EXISTING KEY. Idempotent for a nexus already
/// registered with `key`.
pub fn register_and_ignore(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    key: u64,
    expect: Expectation,
) -> Verdict {
    prout(
        ctx,
        sd,
        ServiceActionOut::REGISTER_IGNORE_EXISTING,
        ReservationType(0),
        0,
        key,
        expect,
    )
}

/// REGISTER, replacing `key` with `new_key`. `key` is zero for a nexus not
/// yet registered, and `new_key` zero unregisters.
pub fn register_key(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    new_key: u64,
    key: u64,
    expect: Expectation,
) -> Verdict {
    prout(
        ctx,
        sd,
        ServiceActionOut::REGISTER,
        ReservationType(0),
        key,
        new_key,
        expect,
    )
}

/// Checks that `key` is, or is not, in the unit's registration list.
pub fn verify_key_presence(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    key: u64,
    present: bool,
) -> Verdict {
    let keys = read_keys(ctx, sd)?;
    if keys.keys.contains(&key) != present {
        let msg = if present {
            format!("key {key:#x} is not registered")
        } else {
            format!("key {key:#x} is still registered")
        };
        sd.set_error(msg.clone());
        return Err(Failure::check(msg).into());
    }
    Ok(())
}

/// A strict REGISTER of `key` from a nexus that is already registered must
/// fail, since it does not present the current key.
pub fn reregister_key_fails(ctx: &TestContext, sd: &mut ScsiDevice, key: u64) -> Verdict {
    register_key(ctx, sd, key, 0, Expectation::ReservationConflict)
}

pub fn reserve(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    key: u64,
    reservation_type: ReservationType,
    expect: Expectation,
) -> Verdict {
    prout(
        ctx,
        sd,
        ServiceActionOut::RESERVE,
        reservation_type,
        key,
        0,
        expect,
    )
}

pub fn release(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    key: u64,
    reservation_type: ReservationType,
    expect: Expectation,
) -> Verdict {
    prout(
        ctx,
        sd,
        ServiceActionOut::RELEASE,
        reservation_type,
        key,
        0,
        expect,
    )
}

/// Removes every registration and any reservation.
pub fn clear(ctx: &TestContext, sd: &mut ScsiDevice, key: u64, expect: Expectation) -> Verdict {
    prout(
        ctx,
        sd,
        ServiceActionOut::CLEAR,
        ReservationType(0),
        key,
        0,
        expect,
    )
}

/// Removes `preempt_key`'s registration, taking over its reservation as
/// `reservation_type`.
pub fn preempt(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    key: u64,
    preempt_key: u64,
    reservation_type: ReservationType,
    expect: Expectation,
) -> Verdict {
    prout(
        ctx,
        sd,
        ServiceActionOut::PREEMPT,
        reservation_type,
        key,
        preempt_key,
        expect,
    )
}

fn verify_state(ctx: &TestContext, sd: &mut ScsiDevice, expected: ReservationState) -> Verdict {
    let actual = ReservationState::observe(ctx, sd)?;
    if actual != expected {
        let msg = format!("expected {expected}, unit is {actual}");
        sd.set_error(msg.clone());
        tracing::error!(%expected, %actual, "reservation state mismatch");
        return Err(Failure::check(msg).into());
    }
    Ok(())
}

pub fn verify_not_reserved(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    verify_state(ctx, sd, ReservationState::Unreserved)
}

/// Checks the unit is reserved as `reservation_type` by `key`. For all
/// registrants types the reported key is zero and that is checked instead.
pub fn verify_reserved_as(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    key: u64,
    reservation_type: ReservationType,
) -> Verdict {
    verify_state(ctx, sd, ReservationState::held_by(key, reservation_type))
}

/// REPORT CAPABILITIES. Devices that do not implement it skip.
pub fn report_capabilities(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict<ReportCapabilities> {
    let task = cdb::persistent_reserve_in(ServiceActionIn::REPORT_CAPABILITIES, PRIN_ALLOCATION);
    let cmd = Command::new("PERSISTENTRESERVEIN", task).optional();
    let result = verbs::run(ctx, sd, cmd, Expectation::Good)?;
    decode("PERSISTENTRESERVEIN", &result)
}

/// Reads the first block. Returns the data read.
pub fn verify_read_works(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict<Vec<u8>> {
    let result = verbs::read10(ctx, sd, 0, 1, IoFlags::default(), Expectation::Good)?;
    Ok(result.data_in)
}

pub fn verify_read_fails(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    verbs::read10(
        ctx,
        sd,
        0,
        1,
        IoFlags::default(),
        Expectation::ReservationConflict,
    )?;
    Ok(())
}

/// Writes `data` to the first block.
pub fn verify_write_works(ctx: &TestContext, sd: &mut ScsiDevice, data: &[u8]) -> Verdict {
    verbs::write10(ctx, sd, 0, data, IoFlags::default(), Expectation::Good)
}

pub fn verify_write_fails(ctx: &TestContext, sd: &mut ScsiDevice, data: &[u8]) -> Verdict {
    verbs::write10(
        ctx,
        sd,
        0,
        data,
        IoFlags::default(),
        Expectation::ReservationConflict,
    )
}
