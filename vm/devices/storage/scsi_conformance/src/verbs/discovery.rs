// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Discovery verbs and capability probing.

use super::decode;
use super::dispatch;
use super::encoded;
use super::fetch;
use super::run;
use super::Command;
use crate::cdb;
use crate::config::DeviceCapabilities;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::expect::Expectation;
use crate::gate::Guard;
use crate::outcome::Failure;
use crate::outcome::Verdict;
use crate::payload::BlockDeviceCharacteristics;
use crate::payload::BlockLimits;
use crate::payload::DataIn;
use crate::payload::LogicalBlockProvisioning;
use crate::payload::ModePage;
use crate::payload::ModeSense6Data;
use crate::payload::ReadCapacity10;
use crate::payload::ReadCapacity16;
use crate::payload::StandardInquiry;
use crate::payload::SupportedCommand;
use crate::payload::SupportedOpcodes;
use crate::transport::ScsiTask;
use crate::transport::TaskResult;
use scsi_defs::PeripheralDeviceType;
use scsi_defs::ScsiOp;
use scsi_defs::ScsiStatus;
use scsi_defs::MODE_CONTROL_CURRENT_VALUES;
use scsi_defs::MODE_PAGE_CONTROL;
use scsi_defs::RSOC_ALL_COMMANDS;
use scsi_defs::VPD_BLOCK_DEVICE_CHARACTERISTICS;
use scsi_defs::VPD_BLOCK_LIMITS;
use scsi_defs::VPD_LOGICAL_BLOCK_PROVISIONING;

/// Byte of the control mode page data holding SWP.
const CONTROL_PAGE_FLAGS4: usize = 2;
const CONTROL_PAGE_SWP: u8 = 0x08;

const STANDARD_INQUIRY_ALLOCATION: u16 = 255;
const VPD_ALLOCATION: u16 = 255;
const RC16_ALLOCATION: u32 = 32;
const RSOC_ALLOCATION: u32 = 65535;

pub fn inquiry(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    evpd: bool,
    page_code: u8,
    allocation_length: u16,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::inquiry(evpd, page_code, allocation_length);
    run(ctx, sd, Command::new("INQUIRY", task), expect)
}

/// MODE SENSE (6) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSenseRequest {
    pub dbd: bool,
    /// Page control, one of the `MODE_CONTROL_*` values.
    pub pc: u8,
    pub page_code: u8,
    pub sub_page_code: u8,
    pub allocation_length: u8,
}

impl ModeSenseRequest {
    /// Current values of one page.
    pub fn current(page_code: u8) -> Self {
        Self {
            dbd: false,
            pc: MODE_CONTROL_CURRENT_VALUES,
            page_code,
            sub_page_code: 0,
            allocation_length: 255,
        }
    }
}

pub fn mode_sense6(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    req: ModeSenseRequest,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::mode_sense6(
        req.dbd,
        req.pc,
        req.page_code,
        req.sub_page_code,
        req.allocation_length,
    );
    run(ctx, sd, Command::new("MODESENSE6", task), expect)
}

/// MODE SELECT (6) of a single page, with an empty header and no block
/// descriptors.
pub fn mode_select6(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    pf: bool,
    sp: bool,
    page: &ModePage,
    expect: Expectation,
) -> Verdict {
    let mut data = vec![0u8; 4];
    data.extend_from_slice(&page.to_bytes());
    let task = encoded("MODESELECT6", cdb::mode_select6(pf, sp, data))?;
    run(ctx, sd, Command::new("MODESELECT6", task), expect)?;
    Ok(())
}

fn update_swp(ctx: &TestContext, sd: &mut ScsiDevice, swp: bool) -> Verdict {
    // Write protecting the unit is as disruptive as a write.
    ctx.require(&[Guard::DataLoss])?;
    let result = mode_sense6(
        ctx,
        sd,
        ModeSenseRequest::current(MODE_PAGE_CONTROL),
        Expectation::Good,
    )?;
    let mut data: ModeSense6Data = decode("MODESENSE6", &result)?;
    let Some(page) = data.page_mut(MODE_PAGE_CONTROL) else {
        return Err(Failure::check("control mode page not returned").into());
    };
    let Some(flags) = page.data.get_mut(CONTROL_PAGE_FLAGS4) else {
        return Err(Failure::check("control mode page is truncated").into());
    };
    if swp {
        *flags |= CONTROL_PAGE_SWP;
    } else {
        *flags &= !CONTROL_PAGE_SWP;
    }
    let page = page.clone();
    tracing::debug!(swp, "updating control mode page");
    mode_select6(ctx, sd, true, false, &page, Expectation::Good)
}

/// Sets the software write protect bit of the control mode page.
pub fn set_swp(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    update_swp(ctx, sd, true)
}

pub fn clear_swp(ctx: &TestContext, sd: &mut ScsiDevice) -> Verdict {
    update_swp(ctx, sd, false)
}

pub fn read_capacity10(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    lba: u32,
    pmi: bool,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::read_capacity10(lba, pmi);
    run(ctx, sd, Command::new("READCAPACITY10", task), expect)
}

pub fn read_capacity16(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    allocation_length: u32,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::read_capacity16(allocation_length);
    run(ctx, sd, Command::new("READCAPACITY16", task).optional(), expect)
}

/// REPORT SUPPORTED OPERATION CODES parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeQuery {
    pub rctd: bool,
    /// One of the `RSOC_*` reporting options.
    pub options: u8,
    pub opcode: ScsiOp,
    pub service_action: u16,
    pub allocation_length: u32,
}

impl OpcodeQuery {
    pub fn all_commands(rctd: bool) -> Self {
        Self {
            rctd,
            options: RSOC_ALL_COMMANDS,
            opcode: ScsiOp(0),
            service_action: 0,
            allocation_length: RSOC_ALLOCATION,
        }
    }
}

pub fn report_supported_opcodes(
    ctx: &TestContext,
    sd: &mut ScsiDevice,
    query: OpcodeQuery,
    expect: Expectation,
) -> Verdict<TaskResult> {
    let task = cdb::report_supported_opcodes(
        query.rctd,
        query.options,
        query.opcode,
        query.service_action,
        query.allocation_length,
    );
    let cmd = Command::new("REPORTSUPPORTEDOPCODES", task).optional();
    run(ctx, sd, cmd, expect)
}

/// Looks up a command in the supported opcodes report cached by [`probe`].
pub fn command_descriptor(
    ctx: &TestContext,
    opcode: ScsiOp,
    service_action: Option<u16>,
) -> Option<&SupportedCommand> {
    ctx.config
        .capabilities
        .command_descriptor(opcode, service_action)
}

/// Fetches data the unit need not provide. Any status but GOOD means the
/// unit does not have it, which is neither logged as a failure nor left
/// as the device's error. Transport and decode failures still fail.
fn lookup<T: DataIn>(
    sd: &mut ScsiDevice,
    name: &'static str,
    task: ScsiTask,
) -> Verdict<Option<T>> {
    let result = dispatch(sd, name, task)?;
    if result.status != ScsiStatus::GOOD {
        tracing::debug!(command = name, status = %result.status, "not provided");
        return Ok(None);
    }
    decode(name, &result).map(Some)
}

fn vpd_page<T: DataIn>(sd: &mut ScsiDevice, page_code: u8) -> Verdict<Option<T>> {
    lookup(sd, "INQUIRY", cdb::inquiry(true, page_code, VPD_ALLOCATION))
}

/// Discovers the unit's capabilities and stores them, with the geometry they
/// imply, in the context's configuration. Every page but standard INQUIRY
/// data is optional.
pub fn probe(ctx: &mut TestContext, sd: &mut ScsiDevice) -> Verdict {
    let task = cdb::inquiry(false, 0, STANDARD_INQUIRY_ALLOCATION);
    let inquiry: StandardInquiry = fetch(ctx, sd, Command::new("INQUIRY", task))?;

    let mut caps = DeviceCapabilities::default();
    if inquiry.device_type == PeripheralDeviceType::DIRECT_ACCESS {
        caps.block_limits = vpd_page::<BlockLimits>(sd, VPD_BLOCK_LIMITS)?;
        caps.block_device_characteristics =
            vpd_page::<BlockDeviceCharacteristics>(sd, VPD_BLOCK_DEVICE_CHARACTERISTICS)?;
        caps.logical_block_provisioning =
            vpd_page::<LogicalBlockProvisioning>(sd, VPD_LOGICAL_BLOCK_PROVISIONING)?;
    }
    caps.inquiry = Some(inquiry);

    let task = cdb::read_capacity16(RC16_ALLOCATION);
    caps.read_capacity16 = lookup::<ReadCapacity16>(sd, "READCAPACITY16", task)?;
    let rc10 = if caps.read_capacity16.is_none() {
        let task = cdb::read_capacity10(0, false);
        Some(fetch::<ReadCapacity10>(
            ctx,
            sd,
            Command::new("READCAPACITY10", task),
        )?)
    } else {
        None
    };

    let query = OpcodeQuery::all_commands(false);
    let task = cdb::report_supported_opcodes(
        query.rctd,
        query.options,
        query.opcode,
        query.service_action,
        query.allocation_length,
    );
    caps.supported_opcodes = lookup::<SupportedOpcodes>(sd, "REPORTSUPPORTEDOPCODES", task)?;

    let device_type = caps
        .inquiry
        .as_ref()
        .map_or(PeripheralDeviceType::UNKNOWN, |i| i.device_type);
    tracing::info!(
        %device_type,
        block_limits = caps.block_limits.is_some(),
        provisioning = caps.logical_block_provisioning.is_some(),
        rc16 = caps.read_capacity16.is_some(),
        opcodes = caps.supported_opcodes.as_ref().map_or(0, |r| r.commands.len()),
        "probed logical unit"
    );

    ctx.config.apply_capabilities(caps);
    if let Some(rc10) = rc10 {
        ctx.config.block_size = rc10.block_length;
        ctx.config.num_blocks = u64::from(rc10.last_lba) + 1;
    }
    Ok(())
}
