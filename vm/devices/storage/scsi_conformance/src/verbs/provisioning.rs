// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Thin provisioning verbs.

use super::decode;
use super::encoded;
use super::run;
use super::Command;
use crate::cdb;
use crate::cdb::UnmapRange;
use crate::cdb::WriteSameOptions;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::outcome::Verdict;
use crate::payload::LbaStatusList;

/// UNMAP one block descriptor per range.
pub fn unmap(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    anchor: bool,
    ranges: &[UnmapRange],
    expect: Expectation,
) -> Verdict {
    let task = encoded("UNMAP", cdb::unmap(anchor, 0, ranges))?;
    let cmd = Command::new("UNMAP", task).optional().writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

/// GET LBA STATUS. Returns the decoded descriptors when the command
/// succeeds, `None` otherwise.
pub fn get_lba_status(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    allocation_length: u32,
    expect: Expectation,
) -> Verdict<Option<LbaStatusList>> {
    let task = cdb::get_lba_status(lba, allocation_length);
    let result = run(
        ctx,
        sd,
        Command::new("GETLBASTATUS", task).optional(),
        expect,
    )?;
    if !expect.is_good() {
        return Ok(None);
    }
    decode("GETLBASTATUS", &result).map(Some)
}

/// WRITE SAME (10). With NDOB set `data` must be empty.
pub fn write_same10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u16,
    data: &[u8],
    opts: WriteSameOptions,
    expect: Expectation,
) -> Verdict {
    let task = cdb::write_same10(lba, blocks, data.to_vec(), opts);
    let cmd = Command::new("WRITESAME10", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

pub fn write_same16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    blocks: u32,
    data: &[u8],
    opts: WriteSameOptions,
    expect: Expectation,
) -> Verdict {
    let task = cdb::write_same16(lba, blocks, data.to_vec(), opts);
    let cmd = Command::new("WRITESAME16", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}
