// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::run;
use super::Command;
use crate::cdb;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::outcome::Verdict;

pub fn synchronize_cache10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u16,
    sync_nv: bool,
    immediate: bool,
    expect: Expectation,
) -> Verdict {
    let task = cdb::synchronize_cache10(lba, blocks, sync_nv, immediate);
    run(ctx, sd, Command::new("SYNCHRONIZECACHE10", task), expect)?;
    Ok(())
}

pub fn synchronize_cache16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    blocks: u32,
    sync_nv: bool,
    immediate: bool,
    expect: Expectation,
) -> Verdict {
    let task = cdb::synchronize_cache16(lba, blocks, sync_nv, immediate);
    let cmd = Command::new("SYNCHRONIZECACHE16", task).optional();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

pub fn prefetch10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u16,
    immediate: bool,
    group: u8,
    expect: Expectation,
) -> Verdict {
    let task = cdb::prefetch10(lba, blocks, immediate, group);
    run(ctx, sd, Command::new("PREFETCH10", task).optional(), expect)?;
    Ok(())
}

pub fn prefetch16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    blocks: u32,
    immediate: bool,
    group: u8,
    expect: Expectation,
) -> Verdict {
    let task = cdb::prefetch16(lba, blocks, immediate, group);
    run(ctx, sd, Command::new("PREFETCH16", task).optional(), expect)?;
    Ok(())
}
