// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-memory block logical unit.
//!
//! Commands execute synchronously against a byte vector. Each nexus has its
//! own unit attention queue, and reservation state is shared by all of them.

use super::reservation::Access;
use super::reservation::ReservationState;
use super::NexusId;
use super::SimConfig;
use crate::transport::ScsiTask;
use crate::transport::TaskResult;
use scsi_defs as scsi;
use scsi_defs::xcopy::BlockToBlockSegmentDescriptor;
use scsi_defs::xcopy::CdbExtendedCopy;
use scsi_defs::xcopy::CdbReceiveCopyResults;
use scsi_defs::xcopy::CopyOperatingParameters;
use scsi_defs::xcopy::CopyResultsServiceAction;
use scsi_defs::xcopy::DescriptorTypeCode;
use scsi_defs::xcopy::IdentificationTargetDescriptor;
use scsi_defs::xcopy::ParameterListHeader;
use scsi_defs::xcopy::SegmentDescriptorHeader;
use scsi_defs::xcopy::SEGMENT_DESCRIPTOR_FIXED_LENGTH;
use scsi_defs::Ascq;
use scsi_defs::ScsiOp;
use scsi_defs::ScsiStatus;
use scsi_defs::SenseData;
use scsi_defs::SenseKey;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

const VENDOR_ID: [u8; 8] = *b"OPENVMM ";
const PRODUCT_ID: [u8; 16] = *b"SIM LOGICAL UNIT";
const PRODUCT_REVISION: [u8; 4] = *b"1.0 ";

/// NAA registered extended designator of the logical unit.
pub const NAA_DESIGNATOR: [u8; 8] = [0x60, 0x01, 0x40, 0x5a, 0x11, 0x00, 0x00, 0x01];

const MAX_TARGET_DESCRIPTORS: u16 = 2;
const MAX_SEGMENT_DESCRIPTORS: u16 = 4;
const MAX_DESCRIPTOR_LIST_LENGTH: u32 = 1024;
const MAX_COMPARE_AND_WRITE_BLOCKS: u8 = 8;
const MAX_WRITE_SAME_BLOCKS: u64 = 0x1000;
const COMMAND_TIMEOUT_SECONDS: u32 = 30;
const PRO_PARAMETER_LIST_LENGTH: u32 = size_of::<scsi::ProParameterList>() as u32;

/// Commands the unit implements, with their service action and CDB length.
const COMMANDS: &[(ScsiOp, Option<u16>, u16)] = &[
    (ScsiOp::TEST_UNIT_READY, None, 6),
    (ScsiOp::REQUEST_SENSE, None, 6),
    (ScsiOp::READ6, None, 6),
    (ScsiOp::INQUIRY, None, 6),
    (ScsiOp::MODE_SELECT, None, 6),
    (ScsiOp::RESERVE_UNIT, None, 6),
    (ScsiOp::RELEASE_UNIT, None, 6),
    (ScsiOp::MODE_SENSE, None, 6),
    (ScsiOp::START_STOP_UNIT, None, 6),
    (ScsiOp::MEDIUM_REMOVAL, None, 6),
    (ScsiOp::READ_CAPACITY, None, 10),
    (ScsiOp::READ, None, 10),
    (ScsiOp::WRITE, None, 10),
    (ScsiOp::WRITE_VERIFY, None, 10),
    (ScsiOp::VERIFY, None, 10),
    (ScsiOp::PREFETCH, None, 10),
    (ScsiOp::SYNCHRONIZE_CACHE, None, 10),
    (ScsiOp::WRITE_SAME, None, 10),
    (ScsiOp::UNMAP, None, 10),
    (ScsiOp::SANITIZE, None, 10),
    (ScsiOp::PERSISTENT_RESERVE_IN, Some(0x00), 10),
    (ScsiOp::PERSISTENT_RESERVE_IN, Some(0x01), 10),
    (ScsiOp::PERSISTENT_RESERVE_IN, Some(0x02), 10),
    (ScsiOp::PERSISTENT_RESERVE_OUT, Some(0x00), 10),
    (ScsiOp::PERSISTENT_RESERVE_OUT, Some(0x01), 10),
    (ScsiOp::PERSISTENT_RESERVE_OUT, Some(0x02), 10),
    (ScsiOp::PERSISTENT_RESERVE_OUT, Some(0x03), 10),
    (ScsiOp::PERSISTENT_RESERVE_OUT, Some(0x04), 10),
    (ScsiOp::PERSISTENT_RESERVE_OUT, Some(0x06), 10),
    (ScsiOp::EXTENDED_COPY, Some(0x00), 16),
    (ScsiOp::RECEIVE_COPY_RESULTS, Some(0x03), 16),
    (ScsiOp::READ16, None, 16),
    (ScsiOp::COMPARE_AND_WRITE, None, 16),
    (ScsiOp::WRITE16, None, 16),
    (ScsiOp::ORWRITE, None, 16),
    (ScsiOp::WRITE_VERIFY16, None, 16),
    (ScsiOp::VERIFY16, None, 16),
    (ScsiOp::PREFETCH16, None, 16),
    (ScsiOp::SYNCHRONIZE_CACHE16, None, 16),
    (ScsiOp::WRITE_SAME16, None, 16),
    (ScsiOp::WRITE_ATOMIC16, None, 16),
    (ScsiOp::SERVICE_ACTION_IN16, Some(0x10), 16),
    (ScsiOp::SERVICE_ACTION_IN16, Some(0x12), 16),
    (ScsiOp::MAINTENANCE_IN, Some(0x0C), 12),
    (ScsiOp::READ12, None, 12),
    (ScsiOp::WRITE12, None, 12),
    (ScsiOp::WRITE_VERIFY12, None, 12),
    (ScsiOp::VERIFY12, None, 12),
];

#[derive(Debug, Error)]
pub(crate) enum ScsiError {
    #[error("illegal request, ascq: {0}")]
    IllegalRequest(Ascq),
    #[error("reservation conflict")]
    ReservationConflict,
    #[error("{0}, ascq: {1}")]
    Sense(SenseKey, Ascq),
}

impl ScsiError {
    fn into_result(self) -> TaskResult {
        match self {
            ScsiError::IllegalRequest(ascq) => {
                TaskResult::check_condition(SenseData::with_ascq(SenseKey::ILLEGAL_REQUEST, ascq))
            }
            ScsiError::ReservationConflict => TaskResult::status(ScsiStatus::RESERVATION_CONFLICT),
            ScsiError::Sense(key, ascq) => {
                TaskResult::check_condition(SenseData::with_ascq(key, ascq))
            }
        }
    }
}

fn invalid_cdb() -> ScsiError {
    ScsiError::IllegalRequest(Ascq::INVALID_FIELD_IN_CDB)
}

fn invalid_parameter() -> ScsiError {
    ScsiError::IllegalRequest(Ascq::INVALID_FIELD_IN_PARAMETER_LIST)
}

fn parameter_list_length() -> ScsiError {
    ScsiError::IllegalRequest(Ascq::PARAMETER_LIST_LENGTH_ERROR)
}

fn parse_cdb<T: FromBytes>(task: &ScsiTask) -> Result<T, ScsiError> {
    T::read_from_prefix(&task.cdb)
        .map(|(cdb, _)| cdb)
        .map_err(|_| invalid_cdb())
}

fn parse_parameter<T: FromBytes>(buf: &[u8]) -> Result<(T, &[u8]), ScsiError> {
    T::read_from_prefix(buf).map_err(|_| parameter_list_length())
}

/// The addressing fields of a medium access command.
#[derive(Debug, Clone, Copy)]
struct Extent {
    lba: u64,
    blocks: u64,
    /// Byte 1 of the CDB.
    flags: u8,
}

fn extent(op: ScsiOp, task: &ScsiTask) -> Result<Extent, ScsiError> {
    let extent = match op {
        ScsiOp::READ6 => {
            let cdb: scsi::Cdb6ReadWrite = parse_cdb(task)?;
            let [a, b, c] = cdb.logical_block;
            Extent {
                lba: u32::from_be_bytes([0, a & 0x1f, b, c]).into(),
                blocks: if cdb.transfer_blocks == 0 {
                    256
                } else {
                    cdb.transfer_blocks.into()
                },
                flags: 0,
            }
        }
        ScsiOp::READ
        | ScsiOp::WRITE
        | ScsiOp::WRITE_VERIFY
        | ScsiOp::VERIFY
        | ScsiOp::PREFETCH
        | ScsiOp::SYNCHRONIZE_CACHE
        | ScsiOp::WRITE_SAME => {
            let cdb: scsi::Cdb10 = parse_cdb(task)?;
            Extent {
                lba: cdb.logical_block.get().into(),
                blocks: cdb.transfer_blocks.get().into(),
                flags: cdb.flags.into_bits(),
            }
        }
        ScsiOp::READ12 | ScsiOp::WRITE12 | ScsiOp::WRITE_VERIFY12 | ScsiOp::VERIFY12 => {
            let cdb: scsi::Cdb12 = parse_cdb(task)?;
            Extent {
                lba: cdb.logical_block.get().into(),
                blocks: cdb.transfer_blocks.get().into(),
                flags: cdb.flags.into_bits(),
            }
        }
        ScsiOp::READ16
        | ScsiOp::WRITE16
        | ScsiOp::ORWRITE
        | ScsiOp::WRITE_VERIFY16
        | ScsiOp::VERIFY16
        | ScsiOp::PREFETCH16
        | ScsiOp::SYNCHRONIZE_CACHE16
        | ScsiOp::WRITE_SAME16 => {
            let cdb: scsi::Cdb16 = parse_cdb(task)?;
            Extent {
                lba: cdb.logical_block.get(),
                blocks: cdb.transfer_blocks.get().into(),
                flags: cdb.flags.into_bits(),
            }
        }
        ScsiOp::WRITE_ATOMIC16 => {
            let cdb: scsi::CdbWriteAtomic16 = parse_cdb(task)?;
            Extent {
                lba: cdb.logical_block.get(),
                blocks: cdb.transfer_blocks.get().into(),
                flags: cdb.flags.into_bits(),
            }
        }
        ScsiOp::COMPARE_AND_WRITE => {
            let cdb: scsi::CdbCompareAndWrite = parse_cdb(task)?;
            Extent {
                lba: cdb.logical_block.get(),
                blocks: cdb.number_of_blocks.into(),
                flags: cdb.flags.into_bits(),
            }
        }
        _ => return Err(invalid_cdb()),
    };
    Ok(extent)
}

/// The persistent reservation access class of `op`, if it touches the
/// medium.
fn access_class(op: ScsiOp) -> Option<Access> {
    match op {
        ScsiOp::READ6
        | ScsiOp::READ
        | ScsiOp::READ12
        | ScsiOp::READ16
        | ScsiOp::VERIFY
        | ScsiOp::VERIFY12
        | ScsiOp::VERIFY16
        | ScsiOp::PREFETCH
        | ScsiOp::PREFETCH16 => Some(Access::Read),
        ScsiOp::WRITE
        | ScsiOp::WRITE12
        | ScsiOp::WRITE16
        | ScsiOp::WRITE_ATOMIC16
        | ScsiOp::WRITE_VERIFY
        | ScsiOp::WRITE_VERIFY12
        | ScsiOp::WRITE_VERIFY16
        | ScsiOp::ORWRITE
        | ScsiOp::COMPARE_AND_WRITE
        | ScsiOp::WRITE_SAME
        | ScsiOp::WRITE_SAME16
        | ScsiOp::UNMAP
        | ScsiOp::SANITIZE
        | ScsiOp::EXTENDED_COPY
        | ScsiOp::MODE_SELECT => Some(Access::Write),
        _ => None,
    }
}

/// Commands that neither report nor clear a pending unit attention.
fn ignores_unit_attention(op: ScsiOp) -> bool {
    matches!(
        op,
        ScsiOp::INQUIRY | ScsiOp::REQUEST_SENSE | ScsiOp::REPORT_LUNS
    )
}

/// Commands allowed from other nexuses while a RESERVE (6) is held.
fn allowed_under_reserve6(op: ScsiOp) -> bool {
    matches!(
        op,
        ScsiOp::INQUIRY
            | ScsiOp::REQUEST_SENSE
            | ScsiOp::REPORT_LUNS
            | ScsiOp::RELEASE_UNIT
            | ScsiOp::PERSISTENT_RESERVE_IN
    )
}

pub(crate) struct SimLun {
    config: SimConfig,
    storage: Vec<u8>,
    mapped: Vec<bool>,
    medium_present: bool,
    removal_prevented: bool,
    swp: bool,
    sanitize_pending: bool,
    reserve6: Option<NexusId>,
    pr: ReservationState,
    unit_attentions: BTreeMap<NexusId, VecDeque<Ascq>>,
}

impl SimLun {
    pub fn new(config: SimConfig) -> Self {
        let blocks = config.num_blocks as usize;
        Self {
            storage: vec![0; blocks * config.block_size as usize],
            mapped: vec![!config.thin; blocks],
            medium_present: true,
            removal_prevented: false,
            swp: false,
            sanitize_pending: false,
            reserve6: None,
            pr: ReservationState::default(),
            unit_attentions: BTreeMap::new(),
            config,
        }
    }

    /// Registers a new I_T nexus.
    pub fn add_nexus(&mut self, nexus: NexusId) {
        let queue = self.unit_attentions.entry(nexus).or_default();
        if self.config.power_on_unit_attention {
            queue.push_back(Ascq::POWER_ON_OCCURRED);
        }
    }

    pub fn block(&self, lba: u64) -> &[u8] {
        let bs = self.config.block_size as usize;
        let start = lba as usize * bs;
        &self.storage[start..start + bs]
    }

    pub fn is_mapped(&self, lba: u64) -> bool {
        self.mapped[lba as usize]
    }

    pub fn software_write_protect(&self) -> bool {
        self.swp
    }

    pub fn medium_present(&self) -> bool {
        self.medium_present
    }

    pub fn reservations(&self) -> &ReservationState {
        &self.pr
    }

    pub fn execute(&mut self, nexus: NexusId, task: &ScsiTask) -> TaskResult {
        let op = task.opcode();
        match self.dispatch(nexus, op, task) {
            Ok(mut data) => {
                data.truncate(task.data_in_length as usize);
                TaskResult::good(data)
            }
            Err(err) => {
                tracing::debug!(
                    ?nexus,
                    %op,
                    error = &err as &dyn std::error::Error,
                    "scsi_error"
                );
                err.into_result()
            }
        }
    }

    fn supports(&self, op: ScsiOp) -> bool {
        self.commands().any(|(o, _, _)| o == op)
    }

    fn commands(&self) -> impl Iterator<Item = (ScsiOp, Option<u16>, u16)> + '_ {
        COMMANDS.iter().copied().filter(|&(op, sa, _)| {
            !self.config.unsupported.contains(&op)
                && (self.config.thin
                    || !(op == ScsiOp::UNMAP
                        || (op == ScsiOp::SERVICE_ACTION_IN16
                            && sa == Some(scsi::SERVICE_ACTION_GET_LBA_STATUS.into()))))
                && (self.config.report_opcodes || op != ScsiOp::MAINTENANCE_IN)
        })
    }

    fn notify(&mut self, notices: Vec<(NexusId, Ascq)>) {
        for (nexus, ascq) in notices {
            self.unit_attentions.entry(nexus).or_default().push_back(ascq);
        }
    }

    fn dispatch(
        &mut self,
        nexus: NexusId,
        op: ScsiOp,
        task: &ScsiTask,
    ) -> Result<Vec<u8>, ScsiError> {
        if !ignores_unit_attention(op) {
            if let Some(ascq) = self
                .unit_attentions
                .get_mut(&nexus)
                .and_then(VecDeque::pop_front)
            {
                return Err(ScsiError::Sense(SenseKey::UNIT_ATTENTION, ascq));
            }
        }
        if !self.supports(op) {
            return Err(ScsiError::IllegalRequest(Ascq::INVALID_OPERATION_CODE));
        }
        if self.reserve6.is_some_and(|holder| holder != nexus) && !allowed_under_reserve6(op) {
            return Err(ScsiError::ReservationConflict);
        }
        if let Some(access) = access_class(op) {
            self.pr.check_access(nexus, access)?;
        }
        if self.sanitize_pending && !ignores_unit_attention(op) {
            self.sanitize_pending = false;
            return Err(ScsiError::Sense(
                SenseKey::NOT_READY,
                Ascq::LOGICAL_UNIT_NOT_READY_SANITIZE_IN_PROGRESS,
            ));
        }

        match op {
            ScsiOp::TEST_UNIT_READY => {
                self.check_medium()?;
                Ok(Vec::new())
            }
            ScsiOp::REQUEST_SENSE => Ok(SenseData::with_ascq(
                SenseKey::NO_SENSE,
                Ascq::NO_ADDITIONAL_SENSE_INFORMATION,
            )
            .as_bytes()
            .to_vec()),
            ScsiOp::INQUIRY => self.handle_inquiry(task),
            ScsiOp::MODE_SENSE => self.handle_mode_sense(task),
            ScsiOp::MODE_SELECT => self.handle_mode_select(nexus, task),
            ScsiOp::RESERVE_UNIT => {
                if self.pr.has_registrations() {
                    return Err(ScsiError::ReservationConflict);
                }
                self.reserve6 = Some(nexus);
                Ok(Vec::new())
            }
            ScsiOp::RELEASE_UNIT => {
                if self.reserve6 == Some(nexus) {
                    self.reserve6 = None;
                }
                Ok(Vec::new())
            }
            ScsiOp::START_STOP_UNIT => self.handle_start_stop(task),
            ScsiOp::MEDIUM_REMOVAL => {
                let cdb: scsi::CdbMediaRemoval = parse_cdb(task)?;
                self.removal_prevented = cdb.flags.prevent();
                Ok(Vec::new())
            }
            ScsiOp::READ_CAPACITY => self.handle_read_capacity(),
            ScsiOp::SERVICE_ACTION_IN16 => self.handle_service_action_in16(task),
            ScsiOp::MAINTENANCE_IN => self.handle_report_supported_opcodes(task),
            ScsiOp::READ6 | ScsiOp::READ | ScsiOp::READ12 | ScsiOp::READ16 => {
                let extent = extent(op, task)?;
                self.handle_read(extent)
            }
            ScsiOp::WRITE
            | ScsiOp::WRITE12
            | ScsiOp::WRITE16
            | ScsiOp::WRITE_ATOMIC16
            | ScsiOp::WRITE_VERIFY
            | ScsiOp::WRITE_VERIFY12
            | ScsiOp::WRITE_VERIFY16 => {
                let extent = extent(op, task)?;
                self.handle_write(extent, &task.data_out)
            }
            ScsiOp::VERIFY | ScsiOp::VERIFY12 | ScsiOp::VERIFY16 => {
                let extent = extent(op, task)?;
                self.handle_verify(extent, &task.data_out)
            }
            ScsiOp::ORWRITE => {
                let extent = extent(op, task)?;
                self.handle_orwrite(extent, &task.data_out)
            }
            ScsiOp::COMPARE_AND_WRITE => {
                let extent = extent(op, task)?;
                self.handle_compare_and_write(extent, &task.data_out)
            }
            ScsiOp::PREFETCH
            | ScsiOp::PREFETCH16
            | ScsiOp::SYNCHRONIZE_CACHE
            | ScsiOp::SYNCHRONIZE_CACHE16 => {
                let extent = extent(op, task)?;
                self.check_medium()?;
                self.check_range(extent.lba, extent.blocks)?;
                Ok(Vec::new())
            }
            ScsiOp::WRITE_SAME | ScsiOp::WRITE_SAME16 => {
                let extent = extent(op, task)?;
                self.handle_write_same(op, extent, &task.data_out)
            }
            ScsiOp::UNMAP => self.handle_unmap(task),
            ScsiOp::SANITIZE => self.handle_sanitize(task),
            ScsiOp::PERSISTENT_RESERVE_IN => self.handle_persistent_reserve_in(task),
            ScsiOp::PERSISTENT_RESERVE_OUT => self.handle_persistent_reserve_out(nexus, task),
            ScsiOp::EXTENDED_COPY => self.handle_extended_copy(task),
            ScsiOp::RECEIVE_COPY_RESULTS => self.handle_receive_copy_results(task),
            _ => Err(ScsiError::IllegalRequest(Ascq::INVALID_OPERATION_CODE)),
        }
    }

    fn check_medium(&self) -> Result<(), ScsiError> {
        if self.medium_present {
            Ok(())
        } else {
            Err(ScsiError::Sense(
                SenseKey::NOT_READY,
                Ascq::MEDIUM_NOT_PRESENT_TRAY_OPEN,
            ))
        }
    }

    fn check_writable(&self) -> Result<(), ScsiError> {
        if self.config.read_only {
            Err(ScsiError::Sense(
                SenseKey::DATA_PROTECT,
                Ascq::WRITE_PROTECTED,
            ))
        } else if self.swp {
            Err(ScsiError::Sense(
                SenseKey::DATA_PROTECT,
                Ascq::SOFTWARE_WRITE_PROTECTED,
            ))
        } else {
            Ok(())
        }
    }

    /// A zero length transfer still needs `lba` inside the medium.
    fn check_range(&self, lba: u64, blocks: u64) -> Result<(), ScsiError> {
        let num_blocks = self.config.num_blocks;
        if lba >= num_blocks || lba.checked_add(blocks).map_or(true, |end| end > num_blocks) {
            return Err(ScsiError::IllegalRequest(Ascq::LBA_OUT_OF_RANGE));
        }
        Ok(())
    }

    fn check_transfer_length(&self, blocks: u64) -> Result<(), ScsiError> {
        let max = self.config.max_transfer_length;
        if max != 0 && blocks > max.into() {
            return Err(invalid_cdb());
        }
        Ok(())
    }

    fn byte_range(&self, lba: u64, blocks: u64) -> std::ops::Range<usize> {
        let bs = self.config.block_size as usize;
        lba as usize * bs..(lba + blocks) as usize * bs
    }

    fn block_range(lba: u64, blocks: u64) -> std::ops::Range<usize> {
        lba as usize..(lba + blocks) as usize
    }

    /// Validates a medium access and returns the bytes it covers.
    fn prepare(&self, extent: Extent, write: bool) -> Result<std::ops::Range<usize>, ScsiError> {
        self.check_medium()?;
        self.check_range(extent.lba, extent.blocks)?;
        if write {
            self.check_writable()?;
        }
        self.check_transfer_length(extent.blocks)?;
        Ok(self.byte_range(extent.lba, extent.blocks))
    }

    fn handle_read(&self, extent: Extent) -> Result<Vec<u8>, ScsiError> {
        let range = self.prepare(extent, false)?;
        Ok(self.storage[range].to_vec())
    }

    fn handle_write(&mut self, extent: Extent, data: &[u8]) -> Result<Vec<u8>, ScsiError> {
        let range = self.prepare(extent, true)?;
        let data = data.get(..range.len()).ok_or_else(invalid_cdb)?;
        self.storage[range].copy_from_slice(data);
        self.mapped[Self::block_range(extent.lba, extent.blocks)].fill(true);
        Ok(Vec::new())
    }

    fn handle_verify(&self, extent: Extent, data: &[u8]) -> Result<Vec<u8>, ScsiError> {
        let range = self.prepare(extent, false)?;
        let bs = self.config.block_size as usize;
        let medium = &self.storage[range];
        let matches = match scsi::VerifyFlags::from_bits(extent.flags).bytchk() {
            0 => true,
            1 => medium == data.get(..medium.len()).ok_or_else(invalid_cdb)?,
            3 => {
                let block = data.get(..bs).ok_or_else(invalid_cdb)?;
                medium.chunks(bs).all(|chunk| chunk == block)
            }
            _ => return Err(invalid_cdb()),
        };
        if !matches {
            return Err(ScsiError::Sense(
                SenseKey::MISCOMPARE,
                Ascq::MISCOMPARE_DURING_VERIFY_OPERATION,
            ));
        }
        Ok(Vec::new())
    }

    fn handle_orwrite(&mut self, extent: Extent, data: &[u8]) -> Result<Vec<u8>, ScsiError> {
        let range = self.prepare(extent, true)?;
        let data = data.get(..range.len()).ok_or_else(invalid_cdb)?;
        for (dst, src) in self.storage[range].iter_mut().zip(data) {
            *dst |= src;
        }
        self.mapped[Self::block_range(extent.lba, extent.blocks)].fill(true);
        Ok(Vec::new())
    }

    fn handle_compare_and_write(
        &mut self,
        extent: Extent,
        data: &[u8],
    ) -> Result<Vec<u8>, ScsiError> {
        if extent.blocks == 0 {
            return Ok(Vec::new());
        }
        if extent.blocks > MAX_COMPARE_AND_WRITE_BLOCKS.into() {
            return Err(invalid_cdb());
        }
        let range = self.prepare(extent, true)?;
        let len = range.len();
        if data.len() < 2 * len {
            return Err(invalid_cdb());
        }
        let (verify, write) = data.split_at(len);
        if self.storage[range.clone()] != *verify {
            return Err(ScsiError::Sense(
                SenseKey::MISCOMPARE,
                Ascq::MISCOMPARE_DURING_VERIFY_OPERATION,
            ));
        }
        self.storage[range].copy_from_slice(&write[..len]);
        self.mapped[Self::block_range(extent.lba, extent.blocks)].fill(true);
        Ok(Vec::new())
    }

    fn handle_write_same(
        &mut self,
        op: ScsiOp,
        extent: Extent,
        data: &[u8],
    ) -> Result<Vec<u8>, ScsiError> {
        let flags = scsi::WriteSameFlags::from_bits(extent.flags);
        if extent.blocks == 0 || extent.blocks > MAX_WRITE_SAME_BLOCKS || flags.anchor() {
            return Err(invalid_cdb());
        }
        if flags.ndob() && op != ScsiOp::WRITE_SAME16 {
            return Err(invalid_cdb());
        }
        if flags.unmap() && !self.config.thin {
            return Err(invalid_cdb());
        }
        // Only one block crosses the wire, so the transfer limit does not apply.
        self.check_medium()?;
        self.check_range(extent.lba, extent.blocks)?;
        self.check_writable()?;
        let range = self.byte_range(extent.lba, extent.blocks);
        let bs = self.config.block_size as usize;
        let pattern = if flags.ndob() {
            vec![0; bs]
        } else {
            data.get(..bs).ok_or_else(invalid_cdb)?.to_vec()
        };
        let blocks = Self::block_range(extent.lba, extent.blocks);
        if flags.unmap() && crate::all_zeroes(&pattern) {
            self.storage[range].fill(0);
            self.mapped[blocks].fill(false);
        } else {
            for chunk in self.storage[range].chunks_mut(bs) {
                chunk.copy_from_slice(&pattern);
            }
            self.mapped[blocks].fill(true);
        }
        Ok(Vec::new())
    }

    fn handle_unmap(&mut self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::Unmap = parse_cdb(task)?;
        if cdb.anchor & 1 != 0 {
            return Err(invalid_cdb());
        }
        let len = cdb.parameter_list_length.get() as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let params = task.data_out.get(..len).ok_or_else(parameter_list_length)?;
        let (header, rest) = parse_parameter::<scsi::UnmapListHeader>(params)?;
        let desc_len = header.block_descriptor_data_length.get() as usize;
        let rest = rest.get(..desc_len).ok_or_else(parameter_list_length)?;
        let (descriptors, _) = <[scsi::UnmapBlockDescriptor]>::ref_from_prefix_with_elems(
            rest,
            desc_len / size_of::<scsi::UnmapBlockDescriptor>(),
        )
        .map_err(|_| parameter_list_length())?;
        if descriptors.len() > self.config.max_unmap_block_descriptors as usize {
            return Err(invalid_parameter());
        }
        self.check_medium()?;
        self.check_writable()?;
        for d in descriptors {
            self.check_range(d.start_lba.get(), d.lba_count.get().into())?;
        }
        for d in descriptors {
            let (lba, blocks) = (d.start_lba.get(), u64::from(d.lba_count.get()));
            let range = self.byte_range(lba, blocks);
            self.storage[range].fill(0);
            self.mapped[Self::block_range(lba, blocks)].fill(false);
        }
        Ok(Vec::new())
    }

    fn handle_get_lba_status(&self, cdb: &scsi::ServiceActionIn16) -> Result<Vec<u8>, ScsiError> {
        let start = cdb.logical_block.get();
        self.check_range(start, 0)?;
        let mut descriptors = Vec::new();
        let mut lba = start;
        while lba < self.config.num_blocks {
            let mapped = self.mapped[lba as usize];
            let run = self.mapped[lba as usize..]
                .iter()
                .take_while(|&&m| m == mapped)
                .count() as u64;
            descriptors.push(scsi::LbaStatusDescriptor {
                start_lba: lba.into(),
                logical_block_count: (run as u32).into(),
                provisioning_status: if mapped {
                    scsi::LBA_STATUS_MAPPED
                } else {
                    scsi::LBA_STATUS_DEALLOCATED
                },
                reserved2: [0; 3],
            });
            lba += run;
        }
        let header = scsi::LbaStatusListHeader {
            parameter_length: ((4 + descriptors.len() * size_of::<scsi::LbaStatusDescriptor>())
                as u32)
                .into(),
            reserved: [0; 4],
        };
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(descriptors.as_bytes());
        Ok(data)
    }

    fn handle_start_stop(&mut self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::StartStop = parse_cdb(task)?;
        if cdb.flag.power_condition() != 0 || !cdb.flag.load_eject() {
            return Ok(Vec::new());
        }
        if cdb.flag.start() {
            self.medium_present = true;
        } else if self.removal_prevented {
            return Err(ScsiError::IllegalRequest(Ascq::MEDIUM_REMOVAL_PREVENTED));
        } else if self.config.removable {
            self.medium_present = false;
        }
        Ok(Vec::new())
    }

    fn handle_sanitize(&mut self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::CdbSanitize = parse_cdb(task)?;
        let len = cdb.parameter_list_length.get() as usize;
        let service_action = scsi::SanitizeServiceAction(cdb.flags.service_action());
        self.check_writable()?;
        let (pattern, deallocate) = match service_action {
            scsi::SanitizeServiceAction::OVERWRITE => {
                if len == 0 {
                    return Err(invalid_cdb());
                }
                let params = task.data_out.get(..len).ok_or_else(parameter_list_length)?;
                // Four byte header, then the pattern.
                let pattern_len = params
                    .get(2..4)
                    .map_or(0, |b| u16::from_be_bytes([b[0], b[1]]) as usize);
                let pattern = params
                    .get(4..4 + pattern_len)
                    .filter(|p| !p.is_empty() && p.len() <= self.config.block_size as usize)
                    .ok_or_else(invalid_parameter)?;
                (pattern.to_vec(), false)
            }
            scsi::SanitizeServiceAction::BLOCK_ERASE
            | scsi::SanitizeServiceAction::CRYPTO_ERASE => {
                if len != 0 {
                    return Err(invalid_cdb());
                }
                (vec![0], self.config.thin)
            }
            scsi::SanitizeServiceAction::EXIT_FAILURE_MODE => return Ok(Vec::new()),
            _ => return Err(invalid_cdb()),
        };
        let bs = self.config.block_size as usize;
        for block in self.storage.chunks_mut(bs) {
            for (i, b) in block.iter_mut().enumerate() {
                *b = pattern[i % pattern.len()];
            }
        }
        self.mapped.fill(!deallocate);
        if cdb.flags.immediate() {
            self.sanitize_pending = true;
        }
        Ok(Vec::new())
    }

    fn handle_inquiry(&self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::CdbInquiry = parse_cdb(task)?;
        if !cdb.flags.vpd() {
            if cdb.page_code != 0 {
                return Err(invalid_cdb());
            }
            let data = scsi::InquiryData {
                header: scsi::InquiryDataHeader {
                    device_type: scsi::PeripheralDeviceType::DIRECT_ACCESS.0,
                    flags2: scsi::InquiryDataFlag2::new()
                        .with_removable_media(self.config.removable),
                    versions: scsi::T10_VERSION_SPC4,
                    flags3: scsi::InquiryDataFlag3::new()
                        .with_response_data_format(scsi::T10_RESPONSE_DATA_SPC3),
                    additional_length: scsi::INQUIRY_DATA_BUFFER_SIZE - 5,
                },
                flags5: scsi::INQUIRY_FLAGS5_3PC,
                flags6: 0,
                flags7: 0x02,
                vendor_id: VENDOR_ID,
                product_id: PRODUCT_ID,
                product_revision_level: PRODUCT_REVISION,
            };
            return Ok(data.as_bytes().to_vec());
        }

        let payload = match cdb.page_code {
            scsi::VPD_SUPPORTED_PAGES => vec![
                scsi::VPD_SUPPORTED_PAGES,
                scsi::VPD_DEVICE_IDENTIFIERS,
                scsi::VPD_BLOCK_LIMITS,
                scsi::VPD_BLOCK_DEVICE_CHARACTERISTICS,
                scsi::VPD_LOGICAL_BLOCK_PROVISIONING,
            ],
            scsi::VPD_DEVICE_IDENTIFIERS => {
                let descriptor = scsi::VpdIdentificationDescriptor {
                    code_set: scsi::VPD_CODE_SET_BINARY,
                    identifiertype: scsi::VPD_IDENTIFIER_TYPE_NAA,
                    reserved3: 0,
                    identifier_length: NAA_DESIGNATOR.len() as u8,
                };
                let mut page = descriptor.as_bytes().to_vec();
                page.extend_from_slice(&NAA_DESIGNATOR);
                page
            }
            scsi::VPD_BLOCK_LIMITS => self.block_limits().as_bytes().to_vec(),
            scsi::VPD_BLOCK_DEVICE_CHARACTERISTICS => scsi::VpdBlockDeviceCharacteristicsPage {
                medium_rotation_rate: 1u16.into(),
                product_type: 0,
                flags: 0,
                data: [0; 56],
            }
            .as_bytes()
            .to_vec(),
            scsi::VPD_LOGICAL_BLOCK_PROVISIONING => {
                let thin = self.config.thin;
                scsi::VpdLogicalBlockProvisioningPage {
                    threshold_exponent: 0,
                    flags: scsi::LogicalBlockProvisioningFlags::new()
                        .with_lbpu(thin)
                        .with_lbpws(thin)
                        .with_lbpws10(thin)
                        .with_lbprz(thin),
                    provisioning_type: if thin {
                        scsi::PROVISIONING_TYPE_THIN
                    } else {
                        scsi::PROVISIONING_TYPE_UNKNOWN
                    },
                    reserved2: 0,
                }
                .as_bytes()
                .to_vec()
            }
            _ => return Err(invalid_cdb()),
        };
        let header = scsi::VpdPageHeader {
            device_type: scsi::PeripheralDeviceType::DIRECT_ACCESS.0,
            page_code: cdb.page_code,
            reserved: 0,
            page_length: payload.len() as u8,
        };
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(&payload);
        Ok(data)
    }

    fn block_limits(&self) -> scsi::VpdBlockLimitsDescriptor {
        let (max_unmap_lba_count, max_unmap_descriptors) = if self.config.thin {
            (
                self.config.num_blocks.min(u32::MAX.into()) as u32,
                self.config.max_unmap_block_descriptors,
            )
        } else {
            (0, 0)
        };
        scsi::VpdBlockLimitsDescriptor {
            reserved0: 0,
            max_compare_and_write_length: MAX_COMPARE_AND_WRITE_BLOCKS,
            optimal_transfer_length_granularity: (1u16 << self.config.lbppb_exponent).into(),
            max_transfer_length: self.config.max_transfer_length.into(),
            optimal_transfer_length: 0u32.into(),
            max_prefetch_xd_read_xd_write_transfer_length: 0u32.into(),
            max_unmap_lba_count: max_unmap_lba_count.into(),
            max_unmap_block_descriptor_count: max_unmap_descriptors.into(),
            optimal_unmap_granularity: 1u32.into(),
            unmap_granularity_alignment: [0; 4],
            max_write_same_length: MAX_WRITE_SAME_BLOCKS.into(),
            max_atomic_transfer_length: 0u32.into(),
            atomic_alignment: 0u32.into(),
            atomic_transfer_length_granularity: 0u32.into(),
            reserved1: [0; 8],
        }
    }

    fn control_page(&self, changeable: bool) -> scsi::ModeControlPage {
        scsi::ModeControlPage {
            page_code: scsi::MODE_PAGE_CONTROL,
            page_length: (size_of::<scsi::ModeControlPage>() - 2) as u8,
            flags2: 0,
            flags3: 0,
            flags4: scsi::ModeControlFlags4::new().with_swp(changeable || self.swp),
            flags5: 0,
            obsolete: [0; 2],
            busy_timeout_period: 0u16.into(),
            extended_self_test_completion_time: 0u16.into(),
        }
    }

    fn handle_mode_sense(&self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::ModeSense = parse_cdb(task)?;
        let page_code = cdb.flags2.page_code();
        if page_code != scsi::MODE_PAGE_CONTROL && page_code != scsi::MODE_PAGE_ALL {
            return Err(invalid_cdb());
        }
        let page = match cdb.flags2.pc() {
            scsi::MODE_CONTROL_CURRENT_VALUES | scsi::MODE_CONTROL_DEFAULT_VALUES => {
                self.control_page(false)
            }
            scsi::MODE_CONTROL_CHANGEABLE_VALUES => self.control_page(true),
            _ => return Err(invalid_cdb()),
        };
        let write_protected = self.config.read_only || self.swp;
        let header = scsi::ModeParameterHeader {
            mode_data_length: (size_of::<scsi::ModeParameterHeader>()
                + size_of::<scsi::ModeControlPage>()
                - 1) as u8,
            medium_type: 0,
            device_specific_parameter: scsi::MODE_DSP_FUA_SUPPORTED
                | if write_protected {
                    scsi::MODE_DSP_WRITE_PROTECT
                } else {
                    0
                },
            block_descriptor_length: 0,
        };
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(page.as_bytes());
        Ok(data)
    }

    fn handle_mode_select(
        &mut self,
        nexus: NexusId,
        task: &ScsiTask,
    ) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::ModeSelect = parse_cdb(task)?;
        if !cdb.flags.pf() || cdb.flags.spbit() {
            return Err(invalid_cdb());
        }
        let len = cdb.parameter_list_length as usize;
        let params = task.data_out.get(..len).ok_or_else(parameter_list_length)?;
        let (header, rest) = parse_parameter::<scsi::ModeParameterHeader>(params)?;
        let mut rest = rest
            .get(header.block_descriptor_length as usize..)
            .ok_or_else(parameter_list_length)?;
        let mut swp = self.swp;
        while !rest.is_empty() {
            let [code, page_len, ..] = *rest else {
                return Err(parameter_list_length());
            };
            let page = rest
                .get(2..2 + page_len as usize)
                .ok_or_else(parameter_list_length)?;
            if code & scsi::MODE_PAGE_CODE_MASK != scsi::MODE_PAGE_CONTROL
                || page_len as usize != size_of::<scsi::ModeControlPage>() - 2
            {
                return Err(invalid_parameter());
            }
            swp = scsi::ModeControlFlags4::from_bits(page[2]).swp();
            rest = &rest[2 + page_len as usize..];
        }
        if swp != self.swp {
            self.swp = swp;
            let others = self
                .unit_attentions
                .keys()
                .copied()
                .filter(|&n| n != nexus)
                .map(|n| (n, Ascq::MODE_PARAMETERS_CHANGED))
                .collect();
            self.notify(others);
        }
        Ok(Vec::new())
    }

    fn handle_read_capacity(&self) -> Result<Vec<u8>, ScsiError> {
        self.check_medium()?;
        let last_lba = (self.config.num_blocks - 1).min(u32::MAX.into()) as u32;
        let data = scsi::ReadCapacityData {
            logical_block_address: last_lba.into(),
            bytes_per_block: self.config.block_size.into(),
        };
        Ok(data.as_bytes().to_vec())
    }

    fn handle_service_action_in16(&self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::ServiceActionIn16 = parse_cdb(task)?;
        let service_action = cdb.service_action & 0x1f;
        if !self
            .commands()
            .any(|(op, sa, _)| {
                op == ScsiOp::SERVICE_ACTION_IN16 && sa == Some(service_action.into())
            })
        {
            return Err(invalid_cdb());
        }
        self.check_medium()?;
        match service_action {
            scsi::SERVICE_ACTION_READ_CAPACITY16 => {
                let mut lbp = 0;
                if self.config.thin {
                    lbp |= scsi::READ_CAPACITY16_LBPME | scsi::READ_CAPACITY16_LBPRZ;
                }
                let data = scsi::ReadCapacity16Data {
                    ex: scsi::ReadCapacityDataEx {
                        logical_block_address: (self.config.num_blocks - 1).into(),
                        bytes_per_block: self.config.block_size.into(),
                    },
                    flags: 0,
                    exponents: self.config.lbppb_exponent & 0xf,
                    lowest_aligned_block_msb: lbp,
                    lowest_aligned_block_lsb: 0,
                    reserved: [0; 16],
                };
                let mut data = data.as_bytes().to_vec();
                data.truncate(cdb.allocation_length.get() as usize);
                Ok(data)
            }
            scsi::SERVICE_ACTION_GET_LBA_STATUS => {
                let mut data = self.handle_get_lba_status(&cdb)?;
                data.truncate(cdb.allocation_length.get() as usize);
                Ok(data)
            }
            _ => Err(invalid_cdb()),
        }
    }

    fn handle_report_supported_opcodes(&self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::CdbReportSupportedOpcodes = parse_cdb(task)?;
        if cdb.service_action & 0x1f != scsi::MAINTENANCE_IN_REPORT_SUPPORTED_OPCODES
            || cdb.flags.reporting_options() != scsi::RSOC_ALL_COMMANDS
        {
            return Err(invalid_cdb());
        }
        let rctd = cdb.flags.rctd();
        let mut body = Vec::new();
        for (op, sa, cdb_length) in self.commands() {
            let descriptor = scsi::CommandDescriptor {
                operation_code: op.0,
                reserved: 0,
                service_action: sa.unwrap_or(0).into(),
                reserved2: 0,
                flags: scsi::CommandDescriptorFlags::new()
                    .with_servactv(sa.is_some())
                    .with_ctdp(rctd),
                cdb_length: cdb_length.into(),
            };
            body.extend_from_slice(descriptor.as_bytes());
            if rctd {
                let timeouts = scsi::CommandTimeoutsDescriptor {
                    descriptor_length: ((size_of::<scsi::CommandTimeoutsDescriptor>() - 2)
                        as u16)
                        .into(),
                    reserved: 0,
                    command_specific: 0,
                    nominal_command_processing_timeout: COMMAND_TIMEOUT_SECONDS.into(),
                    recommended_command_timeout: COMMAND_TIMEOUT_SECONDS.into(),
                };
                body.extend_from_slice(timeouts.as_bytes());
            }
        }
        let header = scsi::SupportedOpcodesHeader {
            command_data_length: (body.len() as u32).into(),
        };
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(&body);
        data.truncate(cdb.allocation_length.get() as usize);
        Ok(data)
    }

    fn handle_persistent_reserve_in(&self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::PersistentReserveIn = parse_cdb(task)?;
        let generation = self.pr.generation().into();
        let mut data = match cdb.service_action.service_action() {
            scsi::ServiceActionIn::READ_KEYS => {
                let keys: Vec<scsi::U64BE> = self.pr.keys().into_iter().map(Into::into).collect();
                let header = scsi::PriRegistrationListHeader {
                    generation,
                    additional_length: ((keys.len() * 8) as u32).into(),
                };
                let mut data = header.as_bytes().to_vec();
                data.extend_from_slice(keys.as_bytes());
                data
            }
            scsi::ServiceActionIn::READ_RESERVATIONS => {
                let descriptor = self.pr.reservation().map(|res| scsi::PriReservationDescriptor {
                    reservation_key: self.pr.reservation_key().unwrap_or(0).into(),
                    obsolete: [0; 4],
                    reserved: 0,
                    type_scope: scsi::PersistentReserveTypeScope::new()
                        .with_reserve_type(res.reservation_type)
                        .with_scope(scsi::RESERVATION_SCOPE_LU),
                    obsolete2: [0; 2],
                });
                let header = scsi::PriReservationListHeader {
                    generation,
                    additional_length: (descriptor.map_or(0, |d| d.as_bytes().len()) as u32).into(),
                };
                let mut data = header.as_bytes().to_vec();
                if let Some(descriptor) = descriptor {
                    data.extend_from_slice(descriptor.as_bytes());
                }
                data
            }
            scsi::ServiceActionIn::REPORT_CAPABILITIES => {
                let caps = scsi::PriReportCapabilities {
                    length: (size_of::<scsi::PriReportCapabilities>() as u16).into(),
                    flags: scsi::PriReportCapabilitiesFlags::new()
                        .with_compatible_reservation_handling(true)
                        .with_type_mask_valid(true),
                    type_mask: scsi::PriReportCapabilitiesTypeMask::new()
                        .with_write_exclusive(true)
                        .with_exclusive_access(true)
                        .with_write_exclusive_registrants_only(true)
                        .with_exclusive_access_registrants_only(true)
                        .with_write_exclusive_all_registrants(true)
                        .with_exclusive_access_all_registrants(true),
                    reserved7: [0; 2],
                };
                caps.as_bytes().to_vec()
            }
            _ => return Err(invalid_cdb()),
        };
        data.truncate(cdb.allocation_length.get() as usize);
        Ok(data)
    }

    fn handle_persistent_reserve_out(
        &mut self,
        nexus: NexusId,
        task: &ScsiTask,
    ) -> Result<Vec<u8>, ScsiError> {
        let cdb: scsi::PersistentReserveOut = parse_cdb(task)?;
        if cdb.parameter_list_length.get() != PRO_PARAMETER_LIST_LENGTH {
            return Err(parameter_list_length());
        }
        let (params, _) = parse_parameter::<scsi::ProParameterList>(&task.data_out)?;
        if params.flags.aptpl()
            || params.flags.specify_initiator_ports()
            || params.flags.all_target_ports()
        {
            return Err(invalid_parameter());
        }
        let key = params.reservation_key.get();
        let sa_key = params.service_action_reservation_key.get();
        let ty = cdb.type_scope.reserve_type();
        let service_action = cdb.service_action.service_action();
        if cdb.type_scope.scope() != scsi::RESERVATION_SCOPE_LU
            && matches!(
                service_action,
                scsi::ServiceActionOut::RESERVE
                    | scsi::ServiceActionOut::RELEASE
                    | scsi::ServiceActionOut::PREEMPT
            )
        {
            return Err(invalid_cdb());
        }
        let notices = match service_action {
            scsi::ServiceActionOut::REGISTER => {
                self.pr.register(nexus, key, sa_key, false)?;
                Vec::new()
            }
            scsi::ServiceActionOut::REGISTER_IGNORE_EXISTING => {
                self.pr.register(nexus, key, sa_key, true)?;
                Vec::new()
            }
            scsi::ServiceActionOut::RESERVE => {
                self.pr.reserve(nexus, key, ty)?;
                Vec::new()
            }
            scsi::ServiceActionOut::RELEASE => self.pr.release(nexus, key, ty)?,
            scsi::ServiceActionOut::CLEAR => self.pr.clear(nexus, key)?,
            scsi::ServiceActionOut::PREEMPT => self.pr.preempt(nexus, key, sa_key, ty)?,
            _ => return Err(invalid_cdb()),
        };
        self.notify(notices);
        Ok(Vec::new())
    }

    fn designator_bytes(&self) -> Vec<u8> {
        let descriptor = scsi::VpdIdentificationDescriptor {
            code_set: scsi::VPD_CODE_SET_BINARY,
            identifiertype: scsi::VPD_IDENTIFIER_TYPE_NAA,
            reserved3: 0,
            identifier_length: NAA_DESIGNATOR.len() as u8,
        };
        let mut bytes = descriptor.as_bytes().to_vec();
        bytes.extend_from_slice(&NAA_DESIGNATOR);
        bytes
    }

    fn handle_extended_copy(&mut self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: CdbExtendedCopy = parse_cdb(task)?;
        if cdb.service_action & 0x1f != scsi::xcopy::EXTENDED_COPY_LID1 {
            return Err(invalid_cdb());
        }
        let len = cdb.parameter_list_length.get() as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let params = task.data_out.get(..len).ok_or_else(parameter_list_length)?;
        let (header, rest) = parse_parameter::<ParameterListHeader>(params)?;
        let target_len = header.target_descriptor_list_length.get() as usize;
        let segment_len = header.segment_descriptor_list_length.get() as usize;
        let inline_len = header.inline_data_length.get() as usize;
        if target_len + segment_len + inline_len > rest.len() {
            return Err(parameter_list_length());
        }
        if (target_len + segment_len) as u32 > MAX_DESCRIPTOR_LIST_LENGTH {
            return Err(parameter_list_length());
        }
        let (targets, rest) = rest.split_at(target_len);
        let segments = &rest[..segment_len];

        // Target descriptors are all 32 bytes long.
        let target_size = size_of::<IdentificationTargetDescriptor>();
        if target_len % target_size != 0 {
            return Err(parameter_list_length());
        }
        let target_count = target_len / target_size;
        if target_count > MAX_TARGET_DESCRIPTORS.into() {
            return Err(ScsiError::IllegalRequest(Ascq::TOO_MANY_TARGET_DESCRIPTORS));
        }
        let designator = self.designator_bytes();
        for raw in targets.chunks(target_size) {
            let (target, _) = parse_parameter::<IdentificationTargetDescriptor>(raw)?;
            if target.descriptor_type_code != DescriptorTypeCode::IDENTIFICATION {
                return Err(ScsiError::IllegalRequest(
                    Ascq::UNSUPPORTED_TARGET_DESCRIPTOR_TYPE_CODE,
                ));
            }
            if !target.designation_descriptor.starts_with(&designator) {
                return Err(ScsiError::Sense(
                    SenseKey::COPY_ABORTED,
                    Ascq::COPY_TARGET_DEVICE_NOT_REACHABLE,
                ));
            }
        }

        let mut copies = Vec::new();
        let mut rest = segments;
        while !rest.is_empty() {
            if copies.len() == MAX_SEGMENT_DESCRIPTORS as usize {
                return Err(ScsiError::IllegalRequest(Ascq::TOO_MANY_SEGMENT_DESCRIPTORS));
            }
            let (seg, _) = parse_parameter::<SegmentDescriptorHeader>(rest)?;
            let seg_size = SEGMENT_DESCRIPTOR_FIXED_LENGTH + seg.descriptor_length.get() as usize;
            if seg.descriptor_type_code != DescriptorTypeCode::BLOCK_TO_BLOCK {
                return Err(ScsiError::IllegalRequest(
                    Ascq::UNSUPPORTED_SEGMENT_DESCRIPTOR_TYPE_CODE,
                ));
            }
            let (b2b, _) = parse_parameter::<BlockToBlockSegmentDescriptor>(rest)?;
            if usize::from(b2b.header.source_index.get()) >= target_count
                || usize::from(b2b.header.destination_index.get()) >= target_count
            {
                return Err(invalid_parameter());
            }
            copies.push(b2b);
            rest = rest.get(seg_size..).ok_or_else(parameter_list_length)?;
        }

        self.check_medium()?;
        self.check_writable()?;
        for copy in &copies {
            let blocks = u64::from(copy.number_of_blocks.get());
            self.check_range(copy.source_lba.get(), blocks)?;
            self.check_range(copy.destination_lba.get(), blocks)?;
        }
        for copy in &copies {
            let blocks = u64::from(copy.number_of_blocks.get());
            let (src, dst) = (copy.source_lba.get(), copy.destination_lba.get());
            let range = self.byte_range(src, blocks);
            let dst_start = self.byte_range(dst, blocks).start;
            self.storage.copy_within(range, dst_start);
            let mapped = self.mapped[Self::block_range(src, blocks)].to_vec();
            self.mapped[Self::block_range(dst, blocks)].copy_from_slice(&mapped);
        }
        tracing::debug!(segments = copies.len(), "extended copy complete");
        Ok(Vec::new())
    }

    fn handle_receive_copy_results(&self, task: &ScsiTask) -> Result<Vec<u8>, ScsiError> {
        let cdb: CdbReceiveCopyResults = parse_cdb(task)?;
        if CopyResultsServiceAction(cdb.service_action.0 & 0x1f)
            != CopyResultsServiceAction::OPERATING_PARAMETERS
        {
            return Err(invalid_cdb());
        }
        let implemented = [
            DescriptorTypeCode::BLOCK_TO_BLOCK.0,
            DescriptorTypeCode::IDENTIFICATION.0,
        ];
        let params = CopyOperatingParameters {
            available_data: ((size_of::<CopyOperatingParameters>() - 4 + implemented.len()) as u32)
                .into(),
            reserved: [0; 4],
            max_target_descriptor_count: MAX_TARGET_DESCRIPTORS.into(),
            max_segment_descriptor_count: MAX_SEGMENT_DESCRIPTORS.into(),
            max_descriptor_list_length: MAX_DESCRIPTOR_LIST_LENGTH.into(),
            max_segment_length: (u32::from(u16::MAX) * self.config.block_size).into(),
            max_inline_data_length: 0u32.into(),
            held_data_limit: 0u32.into(),
            max_stream_device_transfer_size: 0u32.into(),
            reserved2: [0; 2],
            total_concurrent_copies: 1u16.into(),
            max_concurrent_copies: 1,
            data_segment_granularity: 0,
            inline_data_granularity: 0,
            held_data_granularity: 0,
            reserved3: [0; 3],
            implemented_descriptor_list_length: implemented.len() as u8,
        };
        let mut data = params.as_bytes().to_vec();
        data.extend_from_slice(&implemented);
        data.truncate(cdb.allocation_length.get() as usize);
        Ok(data)
    }
}
