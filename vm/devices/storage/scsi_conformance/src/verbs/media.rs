// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Media access verbs.

use super::encoded;
use super::run;
use super::Command;
use crate::cdb;
use crate::cdb::IoFlags;
use crate::cdb::VerifyOptions;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::outcome::Verdict;
use crate::transport::TaskResult;

pub fn read6(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u16,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = encoded("READ6", cdb::read6(lba, blocks, ctx.config.block_size))?;
    run(ctx, sd, Command::new("READ6", task), expect)
}

pub fn read10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u16,
    io: IoFlags,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = encoded("READ10", cdb::read10(lba, blocks, ctx.config.block_size, io))?;
    run(ctx, sd, Command::new("READ10", task), expect)
}

pub fn read12(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u32,
    io: IoFlags,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = encoded("READ12", cdb::read12(lba, blocks, ctx.config.block_size, io))?;
    run(ctx, sd, Command::new("READ12", task), expect)
}

pub fn read16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    blocks: u32,
    io: IoFlags,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = encoded("READ16", cdb::read16(lba, blocks, ctx.config.block_size, io))?;
    run(ctx, sd, Command::new("READ16", task), expect)
}

pub fn write10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    data: &[u8],
    io: IoFlags,
    expect: Expectation,
) -> Verdict {
    let task = encoded("WRITE10", cdb::write10(lba, data.to_vec(), ctx.config.block_size, io))?;
    run(ctx, sd, Command::new("WRITE10", task).writes_medium(), expect)?;
    Ok(())
}

pub fn write12(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    data: &[u8],
    io: IoFlags,
    expect: Expectation,
) -> Verdict {
    let task = encoded("WRITE12", cdb::write12(lba, data.to_vec(), ctx.config.block_size, io))?;
    run(ctx, sd, Command::new("WRITE12", task).writes_medium(), expect)?;
    Ok(())
}

pub fn write16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    data: &[u8],
    io: IoFlags,
    expect: Expectation,
) -> Verdict {
    let task = encoded("WRITE16", cdb::write16(lba, data.to_vec(), ctx.config.block_size, io))?;
    run(ctx, sd, Command::new("WRITE16", task).writes_medium(), expect)?;
    Ok(())
}

pub fn write_atomic16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    data: &[u8],
    io: IoFlags,
    expect: Expectation,
) -> Verdict {
    let task = encoded(
        "WRITEATOMIC16",
        cdb::write_atomic16(lba, data.to_vec(), ctx.config.block_size, io),
    )?;
    let cmd = Command::new("WRITEATOMIC16", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

/// VERIFY (10). `data` is compared against the medium when BYTCHK is set
/// and must be empty otherwise.
pub fn verify10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u16,
    data: &[u8],
    opts: VerifyOptions,
    expect: Expectation,
) -> Verdict {
    let task = cdb::verify10(lba, blocks, data.to_vec(), opts);
    run(ctx, sd, Command::new("VERIFY10", task), expect)?;
    Ok(())
}

pub fn verify12(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    blocks: u32,
    data: &[u8],
    opts: VerifyOptions,
    expect: Expectation,
) -> Verdict {
    let task = cdb::verify12(lba, blocks, data.to_vec(), opts);
    run(ctx, sd, Command::new("VERIFY12", task).optional(), expect)?;
    Ok(())
}

pub fn verify16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    blocks: u32,
    data: &[u8],
    opts: VerifyOptions,
    expect: Expectation,
) -> Verdict {
    let task = cdb::verify16(lba, blocks, data.to_vec(), opts);
    run(ctx, sd, Command::new("VERIFY16", task), expect)?;
    Ok(())
}

pub fn write_verify10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    data: &[u8],
    opts: VerifyOptions,
    expect: Expectation,
) -> Verdict {
    let task = encoded(
        "WRITEVERIFY10",
        cdb::write_verify10(lba, data.to_vec(), ctx.config.block_size, opts),
    )?;
    let cmd = Command::new("WRITEVERIFY10", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

pub fn write_verify12(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    data: &[u8],
    opts: VerifyOptions,
    expect: Expectation,
) -> Verdict {
    let task = encoded(
        "WRITEVERIFY12",
        cdb::write_verify12(lba, data.to_vec(), ctx.config.block_size, opts),
    )?;
    let cmd = Command::new("WRITEVERIFY12", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

pub fn write_verify16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    data: &[u8],
    opts: VerifyOptions,
    expect: Expectation,
) -> Verdict {
    let task = encoded(
        "WRITEVERIFY16",
        cdb::write_verify16(lba, data.to_vec(), ctx.config.block_size, opts),
    )?;
    let cmd = Command::new("WRITEVERIFY16", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

/// COMPARE AND WRITE. `data` is the compare buffer followed by the write
/// buffer.
pub fn compare_and_write(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    data: &[u8],
    io: IoFlags,
    expect: Expectation,
) -> Verdict {
    let task = encoded(
        "COMPAREANDWRITE",
        cdb::compare_and_write(lba, data.to_vec(), ctx.config.block_size, io),
    )?;
    let cmd = Command::new("COMPAREANDWRITE", task)
        .optional()
        .writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}

/// ORWRITE. The device ORs `data` into the medium.
pub fn orwrite(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u64,
    data: &[u8],
    io: IoFlags,
    expect: Expectation,
) -> Verdict {
    let task = encoded("ORWRITE", cdb::orwrite(lba, data.to_vec(), ctx.config.block_size, io))?;
    let cmd = Command::new("ORWRITE", task).optional().writes_medium();
    run(ctx, sd, cmd, expect)?;
    Ok(())
}
