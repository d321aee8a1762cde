// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command verbs.
//!
//! Each verb builds its CDB, passes the skip gate, dispatches through the
//! device and checks the result against the caller's expectation. Address
//! width only changes the CDB encoding; the pipeline is the same for every
//! verb.

mod cache;
mod copy;
mod discovery;
mod media;
mod provisioning;
mod unit;

pub use crate::cdb::IoFlags;
pub use crate::cdb::SanitizeParams;
pub use crate::cdb::StartStopParams;
pub use crate::cdb::UnmapRange;
pub use crate::cdb::VerifyOptions;
pub use crate::cdb::WriteSameOptions;
pub use cache::*;
pub use copy::*;
pub use discovery::*;
pub use media::*;
pub use provisioning::*;
pub use unit::*;

use crate::bridge::dispatch_and_wait;
use crate::cdb::CdbError;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::gate;
use crate::gate::Guard;
use crate::outcome::CheckError;
use crate::outcome::Failure;
use crate::outcome::Verdict;
use crate::payload::DataIn;
use crate::transport::ScsiTask;
use crate::transport::TaskResult;
use scsi_defs::Ascq;
use scsi_defs::ScsiStatus;
use scsi_defs::SenseKey;

/// A command on its way through the verb pipeline.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: &'static str,
    pub task: ScsiTask,
    /// The device may legitimately not implement the command.
    pub optional: bool,
    /// Success overwrites medium data.
    pub writes_medium: bool,
    pub guards: Vec<Guard>,
}

impl Command {
    pub fn new(name: &'static str, task: ScsiTask) -> Self {
        Self {
            name,
            task,
            optional: false,
            writes_medium: false,
            guards: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn writes_medium(mut self) -> Self {
        self.writes_medium = true;
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }
}

/// Gates, dispatches and verifies `cmd`.
pub fn run(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    cmd: Command,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let Command {
        name,
        task,
        optional,
        writes_medium,
        mut guards,
    } = cmd;

    if writes_medium {
        // A write expected to bounce off a write-protected unit cannot
        // change the medium, so it only needs the read-only precondition.
        let guard = if expect == Expectation::WriteProtected && ctx.config.readonly {
            Guard::ReadOnly
        } else {
            Guard::DataLoss
        };
        if !guards.contains(&guard) {
            guards.push(guard);
        }
    }
    ctx.require(&guards)?;
    if optional {
        gate::require_supported(&ctx.config, name, task.opcode(), task.service_action())?;
    }

    tracing::debug!(
        command = name,
        lun = sd.lun(),
        data_out = task.data_out.len(),
        data_in = task.data_in_length,
        %expect,
        "send"
    );

    let result = dispatch(sd, name, task)?;
    let sense = result.decoded_sense();
    let mismatch = match expect.verify(result.status, sense.as_ref()) {
        Ok(()) => {
            tracing::debug!(command = name, status = %result.status, "complete");
            return Ok(result);
        }
        Err(mismatch) => mismatch,
    };

    if optional
        && result.status == ScsiStatus::CHECK_CONDITION
        && sense.is_some_and(|s| {
            s.key == SenseKey::ILLEGAL_REQUEST && s.ascq == Ascq::INVALID_OPERATION_CODE
        })
    {
        let reason = gate::not_implemented(name);
        tracing::info!(command = name, %reason, "[SKIPPED]");
        return Err(reason.into());
    }

    sd.set_error(format!("{name}: {mismatch}"));
    tracing::error!(command = name, %mismatch, "[FAILED]");
    Err(Failure::Mismatch {
        command: name,
        mismatch,
    }
    .into())
}

/// Dispatches `task` without gating or verification. Transport failures are
/// fatal to the calling test.
pub(crate) fn dispatch(
    sd: &mut ScsiDevice,
    name: &'static str,
    task: ScsiTask,
) -> Verdict<TaskResult> {
    dispatch_and_wait(sd, task).map_err(|err| {
        tracing::error!(
            command = name,
            error = &err as &dyn std::error::Error,
            "dispatch failed"
        );
        CheckError::from(Failure::Dispatch {
            command: name,
            source: err,
        })
    })
}

/// Turns a CDB that could not be built into a failure of `command`.
pub(crate) fn encoded(
    command: &'static str,
    task: Result<ScsiTask, CdbError>,
) -> Verdict<ScsiTask> {
    task.map_err(|source| CheckError::from(Failure::Encode { command, source }))
}

/// Runs `cmd` expecting success and decodes its data-in buffer.
pub(crate) fn fetch<T: DataIn>(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    cmd: Command,
) -> Verdict<T> {
    let name = cmd.name;
    let result = run(ctx, sd, cmd, Expectation::Good)?;
    decode(name, &result)
}

pub(crate) fn decode<T: DataIn>(command: &'static str, result: &TaskResult) -> Verdict<T> {
    result
        .decode()
        .map_err(|source| CheckError::from(Failure::Decode { command, source }))
}
