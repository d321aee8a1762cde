// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Copy offload verbs.

use super::encoded;
use super::fetch;
use super::run;
use super::Command;
use crate::cdb;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::outcome::Failure;
use crate::outcome::Verdict;
use crate::payload::Designator;
use crate::payload::DeviceIdentification;
use crate::transport::TaskResult;
use scsi_defs::xcopy::CopyResultsServiceAction;
use scsi_defs::VPD_DEVICE_IDENTIFIERS;

const COPY_RESULTS_ALLOCATION: u32 = 1024;

/// EXTENDED COPY (LID1). `data` is a parameter list assembled with the
/// [`crate::xcopy`] encoders.
pub fn extended_copy(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    data: &[u8],
    expect: Expectation,
) -> Verdict {
    let task = encoded("EXTENDEDCOPY", cdb::extended_copy(data.to_vec()))?;
    let cmd = Command::new("EXTENDEDCOPY", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

pub fn receive_copy_results(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    service_action: CopyResultsServiceAction,
    list_identifier: u8,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::receive_copy_results(service_action, list_identifier, COPY_RESULTS_ALLOCATION);
    run(
        ctx,
        sd,
        Command::new("RECEIVECOPYRESULTS", task).optional(),
        expect,
    )
}

/// Fetches the designator target descriptors use to name this logical unit.
pub fn logical_unit_designator(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict<Designator> {
    let task = cdb::inquiry(true, VPD_DEVICE_IDENTIFIERS, 255);
    let page: DeviceIdentification = fetch(ctx, sd, Command::new("INQUIRY", task))?;
    page.logical_unit_designator()
        .cloned()
        .ok_or_else(|| Failure::check("no logical unit designator in vpd page 0x83").into())
}
