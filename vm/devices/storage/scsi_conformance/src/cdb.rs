// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CDB construction. Every builder returns a task ready for dispatch.

use crate::transport::ScsiTask;
use scsi_defs::xcopy::CdbExtendedCopy;
use scsi_defs::xcopy::CdbReceiveCopyResults;
use scsi_defs::xcopy::CopyResultsServiceAction;
use scsi_defs::xcopy::EXTENDED_COPY_LID1;
use scsi_defs::CacheFlags;
use scsi_defs::Cdb10;
use scsi_defs::Cdb12;
use scsi_defs::Cdb16;
use scsi_defs::Cdb6;
use scsi_defs::Cdb6ReadWrite;
use scsi_defs::CdbCompareAndWrite;
use scsi_defs::CdbFlags;
use scsi_defs::CdbInquiry;
use scsi_defs::CdbMediaRemoval;
use scsi_defs::CdbReadCapacity;
use scsi_defs::CdbReportSupportedOpcodes;
use scsi_defs::CdbSanitize;
use scsi_defs::CdbWriteAtomic16;
use scsi_defs::InquiryFlags;
use scsi_defs::MediaRemovalFlags;
use scsi_defs::ModeSelect;
use scsi_defs::ModeSelectFlags;
use scsi_defs::ModeSense;
use scsi_defs::ModeSenseFlags;
use scsi_defs::PersistentReserveIn;
use scsi_defs::PersistentReserveOut;
use scsi_defs::PersistentReserveServiceActionIn;
use scsi_defs::PersistentReserveServiceActionOut;
use scsi_defs::PersistentReserveTypeScope;
use scsi_defs::ProParameterList;
use scsi_defs::ReportSupportedOpcodesFlags;
use scsi_defs::ReservationType;
use scsi_defs::SanitizeFlags;
use scsi_defs::SanitizeServiceAction;
use scsi_defs::ScsiOp;
use scsi_defs::ServiceActionIn;
use scsi_defs::ServiceActionIn16;
use scsi_defs::ServiceActionOut;
use scsi_defs::StartStop;
use scsi_defs::StartStopFlags;
use scsi_defs::Unmap;
use scsi_defs::UnmapBlockDescriptor;
use scsi_defs::UnmapListHeader;
use scsi_defs::VerifyFlags;
use scsi_defs::WriteSameFlags;
use scsi_defs::MAINTENANCE_IN_REPORT_SUPPORTED_OPCODES;
use scsi_defs::MODE_SENSE_DBD;
use scsi_defs::RESERVATION_SCOPE_LU;
use scsi_defs::SERVICE_ACTION_GET_LBA_STATUS;
use scsi_defs::SERVICE_ACTION_READ_CAPACITY16;
use thiserror::Error;
use zerocopy::IntoBytes;

/// A CDB field too narrow for the requested value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdbError {
    #[error("{blocks} blocks of {block_size} bytes exceed the largest transfer")]
    TransferTooLong { blocks: u64, block_size: u32 },
    #[error("{field} of {value} does not fit in the cdb")]
    FieldTooLarge { field: &'static str, value: usize },
}

/// Protection and caching bits shared by the READ, WRITE and ORWRITE CDBs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoFlags {
    /// RDPROTECT or WRPROTECT.
    pub protect: u8,
    pub dpo: bool,
    pub fua: bool,
    pub fua_nv: bool,
    pub group: u8,
}

impl IoFlags {
    fn cdb_flags(&self) -> CdbFlags {
        CdbFlags::new()
            .with_protection(self.protect)
            .with_disable_page_out(self.dpo)
            .with_fua(self.fua)
            .with_fua_nv(self.fua_nv)
    }
}

/// VERIFY and WRITE AND VERIFY options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// VRPROTECT or WRPROTECT.
    pub protect: u8,
    pub dpo: bool,
    pub bytchk: u8,
    pub group: u8,
}

impl VerifyOptions {
    fn cdb_flags(&self) -> CdbFlags {
        CdbFlags::from_bits(
            VerifyFlags::new()
                .with_protection(self.protect)
                .with_disable_page_out(self.dpo)
                .with_bytchk(self.bytchk)
                .into_bits(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSameOptions {
    pub anchor: bool,
    pub unmap: bool,
    pub ndob: bool,
    pub protect: u8,
    pub group: u8,
}

impl WriteSameOptions {
    fn cdb_flags(&self) -> CdbFlags {
        CdbFlags::from_bits(
            WriteSameFlags::new()
                .with_anchor(self.anchor)
                .with_unmap(self.unmap)
                .with_ndob(self.ndob)
                .with_protection(self.protect)
                .into_bits(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartStopParams {
    pub immediate: bool,
    pub power_condition_modifier: u8,
    pub power_condition: u8,
    pub no_flush: bool,
    pub load_eject: bool,
    pub start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeParams {
    pub immediate: bool,
    pub ause: bool,
    pub service_action: SanitizeServiceAction,
}

/// One UNMAP block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmapRange {
    pub lba: u64,
    pub blocks: u32,
}

fn cache_flags(immediate: bool, sync_nv: bool) -> CdbFlags {
    CdbFlags::from_bits(
        CacheFlags::new()
            .with_immediate(immediate)
            .with_sync_nv(sync_nv)
            .into_bits(),
    )
}

fn cdb10(op: ScsiOp, flags: CdbFlags, lba: u32, blocks: u16, group: u8) -> Cdb10 {
    Cdb10 {
        operation_code: op,
        flags,
        logical_block: lba.into(),
        group_number: group & 0x1f,
        transfer_blocks: blocks.into(),
        control: 0,
    }
}

fn cdb12(op: ScsiOp, flags: CdbFlags, lba: u32, blocks: u32, group: u8) -> Cdb12 {
    Cdb12 {
        operation_code: op,
        flags,
        logical_block: lba.into(),
        transfer_blocks: blocks.into(),
        group_number: group & 0x1f,
        control: 0,
    }
}

fn cdb16(op: ScsiOp, flags: CdbFlags, lba: u64, blocks: u32, group: u8) -> Cdb16 {
    Cdb16 {
        operation_code: op,
        flags,
        logical_block: lba.into(),
        transfer_blocks: blocks.into(),
        group_number: group & 0x1f,
        control: 0,
    }
}

fn field<T: TryFrom<usize>>(field: &'static str, value: usize) -> Result<T, CdbError> {
    T::try_from(value).map_err(|_| CdbError::FieldTooLarge { field, value })
}

fn blocks_in<T: TryFrom<usize>>(data: &[u8], block_size: u32) -> Result<T, CdbError> {
    let blocks = data.len().checked_div(block_size as usize).unwrap_or(0);
    field("transfer length", blocks)
}

fn transfer_length(blocks: u32, block_size: u32) -> Result<u32, CdbError> {
    blocks
        .checked_mul(block_size)
        .ok_or(CdbError::TransferTooLong {
            blocks: blocks.into(),
            block_size,
        })
}

pub fn test_unit_ready() -> ScsiTask {
    ScsiTask::new(&Cdb6 {
        operation_code: ScsiOp::TEST_UNIT_READY,
        reserved: [0; 4],
        control: 0,
    })
}

/// READ (6). A transfer length of 256 blocks is encoded as zero.
pub fn read6(lba: u32, blocks: u16, block_size: u32) -> Result<ScsiTask, CdbError> {
    let transfer_blocks = match blocks {
        256 => 0,
        blocks => field("transfer length", blocks.into())?,
    };
    let lba = lba.to_be_bytes();
    let cdb = Cdb6ReadWrite {
        operation_code: ScsiOp::READ6,
        logical_block: [lba[1] & 0x1f, lba[2], lba[3]],
        transfer_blocks,
        control: 0,
    };
    let blocks = if blocks == 0 { 256 } else { u32::from(blocks) };
    Ok(ScsiTask::read(&cdb, transfer_length(blocks, block_size)?))
}

pub fn read10(lba: u32, blocks: u16, block_size: u32, io: IoFlags) -> Result<ScsiTask, CdbError> {
    let cdb = cdb10(ScsiOp::READ, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::read(&cdb, transfer_length(blocks.into(), block_size)?))
}

pub fn read12(lba: u32, blocks: u32, block_size: u32, io: IoFlags) -> Result<ScsiTask, CdbError> {
    let cdb = cdb12(ScsiOp::READ12, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::read(&cdb, transfer_length(blocks, block_size)?))
}

pub fn read16(lba: u64, blocks: u32, block_size: u32, io: IoFlags) -> Result<ScsiTask, CdbError> {
    let cdb = cdb16(ScsiOp::READ16, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::read(&cdb, transfer_length(blocks, block_size)?))
}

pub fn write10(
    lba: u32,
    data: Vec<u8>,
    block_size: u32,
    io: IoFlags,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb10(ScsiOp::WRITE, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::write(&cdb, data))
}

pub fn write12(
    lba: u32,
    data: Vec<u8>,
    block_size: u32,
    io: IoFlags,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb12(ScsiOp::WRITE12, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::write(&cdb, data))
}

pub fn write16(
    lba: u64,
    data: Vec<u8>,
    block_size: u32,
    io: IoFlags,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb16(ScsiOp::WRITE16, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::write(&cdb, data))
}

pub fn write_atomic16(
    lba: u64,
    data: Vec<u8>,
    block_size: u32,
    io: IoFlags,
) -> Result<ScsiTask, CdbError> {
    let cdb = CdbWriteAtomic16 {
        operation_code: ScsiOp::WRITE_ATOMIC16,
        flags: io.cdb_flags().with_fua_nv(false),
        logical_block: lba.into(),
        reserved: [0; 2],
        transfer_blocks: blocks_in::<u16>(&data, block_size)?.into(),
        group_number: io.group & 0x1f,
        control: 0,
    };
    Ok(ScsiTask::write(&cdb, data))
}

pub fn orwrite(
    lba: u64,
    data: Vec<u8>,
    block_size: u32,
    io: IoFlags,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb16(ScsiOp::ORWRITE, io.cdb_flags(), lba, blocks, io.group);
    Ok(ScsiTask::write(&cdb, data))
}

/// COMPARE AND WRITE. `data` holds the verify blocks followed by the write
/// blocks, so it is twice the transfer length.
pub fn compare_and_write(
    lba: u64,
    data: Vec<u8>,
    block_size: u32,
    io: IoFlags,
) -> Result<ScsiTask, CdbError> {
    let blocks: usize = blocks_in(&data, block_size)?;
    let cdb = CdbCompareAndWrite {
        operation_code: ScsiOp::COMPARE_AND_WRITE,
        flags: io.cdb_flags().with_fua_nv(false),
        logical_block: lba.into(),
        reserved: [0; 3],
        number_of_blocks: field("number of logical blocks", blocks / 2)?,
        group_number: io.group & 0x1f,
        control: 0,
    };
    Ok(ScsiTask::write(&cdb, data))
}

/// VERIFY (10). With BYTCHK clear, `data` must be empty and nothing is
/// transferred.
pub fn verify10(lba: u32, blocks: u16, data: Vec<u8>, opts: VerifyOptions) -> ScsiTask {
    let cdb = cdb10(ScsiOp::VERIFY, opts.cdb_flags(), lba, blocks, opts.group);
    ScsiTask::write(&cdb, data)
}

pub fn verify12(lba: u32, blocks: u32, data: Vec<u8>, opts: VerifyOptions) -> ScsiTask {
    let cdb = cdb12(ScsiOp::VERIFY12, opts.cdb_flags(), lba, blocks, opts.group);
    ScsiTask::write(&cdb, data)
}

pub fn verify16(lba: u64, blocks: u32, data: Vec<u8>, opts: VerifyOptions) -> ScsiTask {
    let cdb = cdb16(ScsiOp::VERIFY16, opts.cdb_flags(), lba, blocks, opts.group);
    ScsiTask::write(&cdb, data)
}

pub fn write_verify10(
    lba: u32,
    data: Vec<u8>,
    block_size: u32,
    opts: VerifyOptions,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb10(ScsiOp::WRITE_VERIFY, opts.cdb_flags(), lba, blocks, opts.group);
    Ok(ScsiTask::write(&cdb, data))
}

pub fn write_verify12(
    lba: u32,
    data: Vec<u8>,
    block_size: u32,
    opts: VerifyOptions,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb12(ScsiOp::WRITE_VERIFY12, opts.cdb_flags(), lba, blocks, opts.group);
    Ok(ScsiTask::write(&cdb, data))
}

pub fn write_verify16(
    lba: u64,
    data: Vec<u8>,
    block_size: u32,
    opts: VerifyOptions,
) -> Result<ScsiTask, CdbError> {
    let blocks = blocks_in(&data, block_size)?;
    let cdb = cdb16(ScsiOp::WRITE_VERIFY16, opts.cdb_flags(), lba, blocks, opts.group);
    Ok(ScsiTask::write(&cdb, data))
}

pub fn write_same10(lba: u32, blocks: u16, data: Vec<u8>, opts: WriteSameOptions) -> ScsiTask {
    let cdb = cdb10(ScsiOp::WRITE_SAME, opts.cdb_flags(), lba, blocks, opts.group);
    ScsiTask::write(&cdb, data)
}

pub fn write_same16(lba: u64, blocks: u32, data: Vec<u8>, opts: WriteSameOptions) -> ScsiTask {
    let cdb = cdb16(ScsiOp::WRITE_SAME16, opts.cdb_flags(), lba, blocks, opts.group);
    ScsiTask::write(&cdb, data)
}

/// UNMAP with one block descriptor per range. The whole parameter list
/// must fit the 16-bit parameter list length.
pub fn unmap(anchor: bool, group: u8, ranges: &[UnmapRange]) -> Result<ScsiTask, CdbError> {
    let desc_len = ranges.len() * size_of::<UnmapBlockDescriptor>();
    let list_len = size_of::<UnmapListHeader>() + desc_len;
    let parameter_list_length: u16 = field("unmap parameter list length", list_len)?;
    let header = UnmapListHeader {
        data_length: (parameter_list_length - 2).into(),
        block_descriptor_data_length: field::<u16>("block descriptor data length", desc_len)?
            .into(),
        reserved: [0; 4],
    };
    let mut data = header.as_bytes().to_vec();
    for range in ranges {
        let desc = UnmapBlockDescriptor {
            start_lba: range.lba.into(),
            lba_count: range.blocks.into(),
            reserved: [0; 4],
        };
        data.extend_from_slice(desc.as_bytes());
    }
    let cdb = Unmap {
        operation_code: ScsiOp::UNMAP,
        anchor: anchor as u8,
        reserved2: [0; 4],
        group_number: group & 0x1f,
        parameter_list_length: parameter_list_length.into(),
        control: 0,
    };
    Ok(ScsiTask::write(&cdb, data))
}

pub fn get_lba_status(lba: u64, allocation_length: u32) -> ScsiTask {
    let cdb = ServiceActionIn16 {
        operation_code: ScsiOp::SERVICE_ACTION_IN16,
        service_action: SERVICE_ACTION_GET_LBA_STATUS,
        logical_block: lba.into(),
        allocation_length: allocation_length.into(),
        flags: 0,
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length)
}

pub fn synchronize_cache10(lba: u32, blocks: u16, sync_nv: bool, immediate: bool) -> ScsiTask {
    let cdb = cdb10(
        ScsiOp::SYNCHRONIZE_CACHE,
        cache_flags(immediate, sync_nv),
        lba,
        blocks,
        0,
    );
    ScsiTask::new(&cdb)
}

pub fn synchronize_cache16(lba: u64, blocks: u32, sync_nv: bool, immediate: bool) -> ScsiTask {
    let cdb = cdb16(
        ScsiOp::SYNCHRONIZE_CACHE16,
        cache_flags(immediate, sync_nv),
        lba,
        blocks,
        0,
    );
    ScsiTask::new(&cdb)
}

pub fn prefetch10(lba: u32, blocks: u16, immediate: bool, group: u8) -> ScsiTask {
    let cdb = cdb10(ScsiOp::PREFETCH, cache_flags(immediate, false), lba, blocks, group);
    ScsiTask::new(&cdb)
}

pub fn prefetch16(lba: u64, blocks: u32, immediate: bool, group: u8) -> ScsiTask {
    let cdb = cdb16(ScsiOp::PREFETCH16, cache_flags(immediate, false), lba, blocks, group);
    ScsiTask::new(&cdb)
}

pub fn start_stop_unit(params: StartStopParams) -> ScsiTask {
    ScsiTask::new(&StartStop {
        operation_code: ScsiOp::START_STOP_UNIT,
        immediate: params.immediate as u8,
        reserved2: 0,
        power_condition_modifier: params.power_condition_modifier & 0xf,
        flag: StartStopFlags::new()
            .with_start(params.start)
            .with_load_eject(params.load_eject)
            .with_no_flush(params.no_flush)
            .with_power_condition(params.power_condition),
        control: 0,
    })
}

pub fn prevent_allow(prevent: bool) -> ScsiTask {
    ScsiTask::new(&CdbMediaRemoval {
        operation_code: ScsiOp::MEDIUM_REMOVAL,
        lun: 0,
        reserved: [0; 2],
        flags: MediaRemovalFlags::new().with_prevent(prevent),
        control: 0,
    })
}

pub fn reserve6() -> ScsiTask {
    ScsiTask::new(&Cdb6 {
        operation_code: ScsiOp::RESERVE_UNIT,
        reserved: [0; 4],
        control: 0,
    })
}

pub fn release6() -> ScsiTask {
    ScsiTask::new(&Cdb6 {
        operation_code: ScsiOp::RELEASE_UNIT,
        reserved: [0; 4],
        control: 0,
    })
}

pub fn sanitize(params: SanitizeParams, data: Vec<u8>) -> Result<ScsiTask, CdbError> {
    let cdb = CdbSanitize {
        operation_code: ScsiOp::SANITIZE,
        flags: SanitizeFlags::new()
            .with_service_action(params.service_action.0)
            .with_ause(params.ause)
            .with_immediate(params.immediate),
        reserved: [0; 5],
        parameter_list_length: field::<u16>("parameter list length", data.len())?.into(),
        control: 0,
    };
    Ok(ScsiTask::write(&cdb, data))
}

pub fn inquiry(evpd: bool, page_code: u8, allocation_length: u16) -> ScsiTask {
    let cdb = CdbInquiry {
        operation_code: ScsiOp::INQUIRY,
        flags: InquiryFlags::new().with_vpd(evpd),
        page_code,
        allocation_length: allocation_length.into(),
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length.into())
}

/// MODE SENSE (6). `pc` is one of the `MODE_CONTROL_*` values.
pub fn mode_sense6(
    dbd: bool,
    pc: u8,
    page_code: u8,
    sub_page_code: u8,
    allocation_length: u8,
) -> ScsiTask {
    let cdb = ModeSense {
        operation_code: ScsiOp::MODE_SENSE,
        flags1: if dbd { MODE_SENSE_DBD } else { 0 },
        flags2: ModeSenseFlags::new()
            .with_page_code(page_code)
            .with_pc(pc),
        sub_page_code,
        allocation_length,
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length.into())
}

/// MODE SELECT (6). `data` is the full parameter list, header included.
pub fn mode_select6(pf: bool, sp: bool, data: Vec<u8>) -> Result<ScsiTask, CdbError> {
    let cdb = ModeSelect {
        operation_code: ScsiOp::MODE_SELECT,
        flags: ModeSelectFlags::new().with_pf(pf).with_spbit(sp),
        reserved2: [0; 2],
        parameter_list_length: field("parameter list length", data.len())?,
        control: 0,
    };
    Ok(ScsiTask::write(&cdb, data))
}

pub fn read_capacity10(lba: u32, pmi: bool) -> ScsiTask {
    let cdb = CdbReadCapacity {
        operation_code: ScsiOp::READ_CAPACITY,
        reserved1: 0,
        logical_block: lba.into(),
        reserved2: [0; 2],
        pmi: pmi as u8,
        control: 0,
    };
    ScsiTask::read(&cdb, 8)
}

pub fn read_capacity16(allocation_length: u32) -> ScsiTask {
    let cdb = ServiceActionIn16 {
        operation_code: ScsiOp::SERVICE_ACTION_IN16,
        service_action: SERVICE_ACTION_READ_CAPACITY16,
        logical_block: 0u64.into(),
        allocation_length: allocation_length.into(),
        flags: 0,
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length)
}

pub fn report_supported_opcodes(
    rctd: bool,
    reporting_options: u8,
    opcode: ScsiOp,
    service_action: u16,
    allocation_length: u32,
) -> ScsiTask {
    let cdb = CdbReportSupportedOpcodes {
        operation_code: ScsiOp::MAINTENANCE_IN,
        service_action: MAINTENANCE_IN_REPORT_SUPPORTED_OPCODES,
        flags: ReportSupportedOpcodesFlags::new()
            .with_reporting_options(reporting_options)
            .with_rctd(rctd),
        requested_operation_code: opcode.0,
        requested_service_action: service_action.into(),
        allocation_length: allocation_length.into(),
        reserved: 0,
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length)
}

pub fn persistent_reserve_in(service_action: ServiceActionIn, allocation_length: u16) -> ScsiTask {
    let cdb = PersistentReserveIn {
        operation_code: ScsiOp::PERSISTENT_RESERVE_IN,
        service_action: PersistentReserveServiceActionIn::new().with_service_action(service_action),
        reserved2: [0; 5],
        allocation_length: allocation_length.into(),
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length.into())
}

/// PERSISTENT RESERVE OUT with the basic 24 byte parameter list.
pub fn persistent_reserve_out(
    service_action: ServiceActionOut,
    reservation_type: ReservationType,
    reservation_key: u64,
    service_action_key: u64,
) -> ScsiTask {
    let params = ProParameterList {
        reservation_key: reservation_key.into(),
        service_action_reservation_key: service_action_key.into(),
        obsolete: [0; 4],
        flags: Default::default(),
        reserved3: 0,
        obsolete2: [0; 2],
    };
    let cdb = PersistentReserveOut {
        operation_code: ScsiOp::PERSISTENT_RESERVE_OUT,
        service_action: PersistentReserveServiceActionOut::new()
            .with_service_action(service_action),
        type_scope: PersistentReserveTypeScope::new()
            .with_reserve_type(reservation_type)
            .with_scope(RESERVATION_SCOPE_LU),
        reserved2: [0; 2],
        parameter_list_length: (size_of::<ProParameterList>() as u32).into(),
        control: 0,
    };
    ScsiTask::write(&cdb, params.as_bytes().to_vec())
}

pub fn extended_copy(data: Vec<u8>) -> Result<ScsiTask, CdbError> {
    let cdb = CdbExtendedCopy {
        operation_code: ScsiOp::EXTENDED_COPY,
        service_action: EXTENDED_COPY_LID1,
        reserved: [0; 8],
        parameter_list_length: field::<u32>("parameter list length", data.len())?.into(),
        reserved2: 0,
        control: 0,
    };
    Ok(ScsiTask::write(&cdb, data))
}

pub fn receive_copy_results(
    service_action: CopyResultsServiceAction,
    list_identifier: u8,
    allocation_length: u32,
) -> ScsiTask {
    let cdb = CdbReceiveCopyResults {
        operation_code: ScsiOp::RECEIVE_COPY_RESULTS,
        service_action,
        list_identifier,
        reserved: [0; 7],
        allocation_length: allocation_length.into(),
        reserved2: 0,
        control: 0,
    };
    ScsiTask::read(&cdb, allocation_length)
}
