// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Unit state verbs.

use super::dispatch;
use super::encoded;
use super::run;
use super::Command;
use crate::cdb;
use crate::cdb::SanitizeParams;
use crate::cdb::StartStopParams;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::gate::Guard;
use crate::outcome::Failure;
use crate::outcome::Verdict;
use crate::transport::TaskResult;
use scsi_defs::ScsiStatus;
use scsi_defs::SenseKey;

/// Upper bound on unit attentions drained by [`tur_until_good`]. A target
/// that keeps raising them is broken.
const MAX_UNIT_ATTENTIONS: u32 = 32;

fn is_unit_attention(result: &TaskResult) -> bool {
    result.status == ScsiStatus::CHECK_CONDITION
        && result
            .decoded_sense()
            .is_some_and(|sense| sense.key == SenseKey::UNIT_ATTENTION)
}

pub fn test_unit_ready(ctx: &TestContext, sd: &mut ScsiDevice, expect: Expectation) -> Verdict {
    run(ctx, sd, Command::new("TESTUNITREADY", cdb::test_unit_ready()), expect)?;
    Ok(())
}

/// TEST UNIT READY that tolerates one pending unit attention, as after a
/// login or reset.
pub fn test_unit_ready_clear_ua(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    let result = dispatch(sd, "TESTUNITREADY", cdb::test_unit_ready())?;
    if is_unit_attention(&result) {
        tracing::debug!(sense = ?result.decoded_sense(), "cleared unit attention");
    }
    test_unit_ready(ctx, sd, Expectation::Good)
}

/// Sends TEST UNIT READY until it succeeds and returns how many unit
/// attentions were drained on the way.
pub fn tur_until_good(sd: &mut ScsiDevice) -> Verdict<u32> {
    let mut unit_attentions = 0;
    loop {
        let result = dispatch(sd, "TESTUNITREADY", cdb::test_unit_ready())?;
        if !is_unit_attention(&result) {
            Expectation::Good
                .verify(result.status, result.decoded_sense().as_ref())
                .map_err(|mismatch| Failure::Mismatch {
                    command: "TESTUNITREADY",
                    mismatch,
                })?;
            return Ok(unit_attentions);
        }
        unit_attentions += 1;
        if unit_attentions > MAX_UNIT_ATTENTIONS {
            let msg = format!("unit attention not cleared after {MAX_UNIT_ATTENTIONS} commands");
            sd.set_error(msg.clone());
            return Err(Failure::check(msg).into());
        }
    }
}

pub fn start_stop_unit(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    params: StartStopParams,
    expect: Expectation,
) -> Verdict {
    let task = cdb::start_stop_unit(params);
    run(ctx, sd, Command::new("STARTSTOPUNIT", task), expect)?;
    Ok(())
}

/// PREVENT ALLOW MEDIUM REMOVAL.
pub fn prevent_allow(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    prevent: bool,
    expect: Expectation,
) -> Verdict {
    let task = cdb::prevent_allow(prevent);
    run(ctx, sd, Command::new("PREVENTALLOW", task), expect)?;
    Ok(())
}

pub fn reserve6(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    let cmd = Command::new("RESERVE6", cdb::reserve6()).optional();
    run(ctx, sd, cmd, Expectation::Good)?;
    Ok(())
}

pub fn release6(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    let cmd = Command::new("RELEASE6", cdb::release6()).optional();
    run(ctx, sd, cmd, Expectation::Good)?;
    Ok(())
}

/// RESERVE (6) from a nexus that must be locked out by another's
/// reservation.
pub fn reserve6_conflict(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    let cmd = Command::new("RESERVE6", cdb::reserve6()).optional();
    run(ctx, sd, cmd, Expectation::ReservationConflict)?;
    Ok(())
}

/// SANITIZE. Always needs both the sanitize and the data loss opt-ins,
/// even for negative tests.
pub fn sanitize(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    params: SanitizeParams,
    data: &[u8],
    expect: Expectation,
) -> Verdict {
    let task = encoded("SANITIZE", cdb::sanitize(params, data.to_vec()))?;
    let cmd = Command::new("SANITIZE", task)
        .optional()
        .writes_medium()
        .guard(Guard::Sanitize)
        .guard(Guard::DataLoss);
    run(ctx, sd, cmd, expect)?;
    Ok(())
}
