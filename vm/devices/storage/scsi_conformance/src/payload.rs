// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed decoding of data-in buffers.

use scsi_defs::xcopy::CopyOperatingParameters;
use scsi_defs::xcopy::DescriptorTypeCode;
use scsi_defs::CommandDescriptor;
use scsi_defs::CommandTimeoutsDescriptor;
use scsi_defs::InquiryData;
use scsi_defs::LbaStatusDescriptor;
use scsi_defs::LbaStatusListHeader;
use scsi_defs::ModeControlPage;
use scsi_defs::ModeParameterHeader;
use scsi_defs::PeripheralDeviceType;
use scsi_defs::PriRegistrationListHeader;
use scsi_defs::PriReportCapabilities;
use scsi_defs::PriReportCapabilitiesTypeMask;
use scsi_defs::PriReservationDescriptor;
use scsi_defs::PriReservationListHeader;
use scsi_defs::ReadCapacity16Data;
use scsi_defs::ReadCapacityData;
use scsi_defs::ReservationType;
use scsi_defs::ScsiOp;
use scsi_defs::SupportedOpcodesHeader;
use scsi_defs::VpdBlockDeviceCharacteristicsPage;
use scsi_defs::VpdBlockLimitsDescriptor;
use scsi_defs::VpdIdentificationDescriptor;
use scsi_defs::VpdLogicalBlockProvisioningPage;
use scsi_defs::VpdPageHeader;
use scsi_defs::INQUIRY_FLAGS5_3PC;
use scsi_defs::INQUIRY_FLAGS5_PROTECT;
use scsi_defs::MODE_DSP_WRITE_PROTECT;
use scsi_defs::MODE_PAGE_CODE_MASK;
use scsi_defs::MODE_PAGE_CONTROL;
use scsi_defs::MODE_PAGE_PS;
use scsi_defs::READ_CAPACITY16_LBPME;
use scsi_defs::READ_CAPACITY16_LBPRZ;
use scsi_defs::U64BE;
use scsi_defs::VPD_BLOCK_DEVICE_CHARACTERISTICS;
use scsi_defs::VPD_BLOCK_LIMITS;
use scsi_defs::VPD_DEVICE_IDENTIFIERS;
use scsi_defs::VPD_LOGICAL_BLOCK_PROVISIONING;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::KnownLayout;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{what} needs {needed} bytes, got {actual}")]
    Short {
        what: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("expected vpd page {expected:#x}, got {actual:#x}")]
    WrongPage { expected: u8, actual: u8 },
    #[error("{what}: {reason}")]
    Invalid {
        what: &'static str,
        reason: String,
    },
}

/// A structure decoded from a command's data-in buffer.
pub trait DataIn: Sized {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>;
}

fn read<'a, T: FromBytes + KnownLayout + Immutable>(
    what: &'static str,
    buf: &'a [u8],
) -> Result<(T, &'a [u8]), DecodeError> {
    T::read_from_prefix(buf).map_err(|_| DecodeError::Short {
        what,
        needed: size_of::<T>(),
        actual: buf.len(),
    })
}

fn trimmed_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_owned()
}

/// Returns the payload of a VPD page after checking its page code.
fn vpd_payload(page_code: u8, buf: &[u8]) -> Result<(VpdPageHeader, &[u8]), DecodeError> {
    let (header, rest) = read::<VpdPageHeader>("vpd page header", buf)?;
    if header.page_code != page_code {
        return Err(DecodeError::WrongPage {
            expected: page_code,
            actual: header.page_code,
        });
    }
    Ok((header, rest))
}

/// Standard INQUIRY data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardInquiry {
    pub qualifier: u8,
    pub device_type: PeripheralDeviceType,
    pub removable: bool,
    pub version: u8,
    pub response_data_format: u8,
    pub additional_length: u8,
    pub third_party_copy: bool,
    pub protect: bool,
    pub vendor_id: String,
    pub product_id: String,
    pub revision: String,
}

impl DataIn for StandardInquiry {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (data, _) = read::<InquiryData>("standard inquiry", buf)?;
        Ok(Self {
            qualifier: data.header.peripheral_qualifier(),
            device_type: data.header.peripheral_device_type(),
            removable: data.header.flags2.removable_media(),
            version: data.header.versions,
            response_data_format: data.header.flags3.response_data_format(),
            additional_length: data.header.additional_length,
            third_party_copy: data.flags5 & INQUIRY_FLAGS5_3PC != 0,
            protect: data.flags5 & INQUIRY_FLAGS5_PROTECT != 0,
            vendor_id: trimmed_ascii(&data.vendor_id),
            product_id: trimmed_ascii(&data.product_id),
            revision: trimmed_ascii(&data.product_revision_level),
        })
    }
}

/// VPD page 0xB0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLimits {
    pub max_compare_and_write_length: u8,
    pub optimal_transfer_length_granularity: u16,
    pub max_transfer_length: u32,
    pub optimal_transfer_length: u32,
    pub max_prefetch_length: u32,
    pub max_unmap_lba_count: u32,
    pub max_unmap_block_descriptor_count: u32,
    pub optimal_unmap_granularity: u32,
    /// Present only when UGAVALID is set.
    pub unmap_granularity_alignment: Option<u32>,
    pub max_write_same_length: u64,
    pub max_atomic_transfer_length: u32,
    pub atomic_alignment: u32,
    pub atomic_transfer_length_granularity: u32,
}

impl DataIn for BlockLimits {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (_, rest) = vpd_payload(VPD_BLOCK_LIMITS, buf)?;
        // SBC-2 devices return a shorter page. Zero-fill the tail.
        let mut page = [0u8; size_of::<VpdBlockLimitsDescriptor>()];
        let len = rest.len().min(page.len());
        if len < 16 {
            return Err(DecodeError::Short {
                what: "block limits vpd page",
                needed: 16,
                actual: len,
            });
        }
        page[..len].copy_from_slice(&rest[..len]);
        let (d, _) = read::<VpdBlockLimitsDescriptor>("block limits vpd page", &page)?;
        let alignment = u32::from_be_bytes(d.unmap_granularity_alignment);
        Ok(Self {
            max_compare_and_write_length: d.max_compare_and_write_length,
            optimal_transfer_length_granularity: d.optimal_transfer_length_granularity.get(),
            max_transfer_length: d.max_transfer_length.get(),
            optimal_transfer_length: d.optimal_transfer_length.get(),
            max_prefetch_length: d.max_prefetch_xd_read_xd_write_transfer_length.get(),
            max_unmap_lba_count: d.max_unmap_lba_count.get(),
            max_unmap_block_descriptor_count: d.max_unmap_block_descriptor_count.get(),
            optimal_unmap_granularity: d.optimal_unmap_granularity.get(),
            unmap_granularity_alignment: (alignment & 0x8000_0000 != 0)
                .then_some(alignment & 0x7fff_ffff),
            max_write_same_length: d.max_write_same_length.get(),
            max_atomic_transfer_length: d.max_atomic_transfer_length.get(),
            atomic_alignment: d.atomic_alignment.get(),
            atomic_transfer_length_granularity: d.atomic_transfer_length_granularity.get(),
        })
    }
}

/// VPD page 0xB2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalBlockProvisioning {
    pub threshold_exponent: u8,
    pub lbpu: bool,
    pub lbpws: bool,
    pub lbpws10: bool,
    pub lbprz: bool,
    pub anc_sup: bool,
    pub dp: bool,
    pub provisioning_type: u8,
}

impl DataIn for LogicalBlockProvisioning {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (_, rest) = vpd_payload(VPD_LOGICAL_BLOCK_PROVISIONING, buf)?;
        let (page, _) =
            read::<VpdLogicalBlockProvisioningPage>("logical block provisioning", rest)?;
        Ok(Self {
            threshold_exponent: page.threshold_exponent,
            lbpu: page.flags.lbpu(),
            lbpws: page.flags.lbpws(),
            lbpws10: page.flags.lbpws10(),
            lbprz: page.flags.lbprz(),
            anc_sup: page.flags.anc_sup(),
            dp: page.flags.dp(),
            provisioning_type: page.provisioning_type & 0x7,
        })
    }
}

/// VPD page 0xB1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDeviceCharacteristics {
    /// 1 for non-rotating media, otherwise the nominal RPM.
    pub medium_rotation_rate: u16,
    pub product_type: u8,
    pub nominal_form_factor: u8,
}

impl DataIn for BlockDeviceCharacteristics {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (_, rest) = vpd_payload(VPD_BLOCK_DEVICE_CHARACTERISTICS, buf)?;
        // Only the first four bytes carry fields this crate reads.
        let mut page = [0u8; size_of::<VpdBlockDeviceCharacteristicsPage>()];
        let len = rest.len().min(page.len());
        if len < 4 {
            return Err(DecodeError::Short {
                what: "block device characteristics",
                needed: 4,
                actual: len,
            });
        }
        page[..len].copy_from_slice(&rest[..len]);
        let (p, _) =
            read::<VpdBlockDeviceCharacteristicsPage>("block device characteristics", &page)?;
        Ok(Self {
            medium_rotation_rate: p.medium_rotation_rate.get(),
            product_type: p.product_type,
            nominal_form_factor: p.flags & 0xf,
        })
    }
}

/// One designation descriptor from VPD page 0x83.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Designator {
    pub protocol_identifier: u8,
    pub code_set: u8,
    pub piv: bool,
    pub association: u8,
    pub designator_type: u8,
    pub value: Vec<u8>,
}

impl Designator {
    /// The descriptor as it appears on the wire, header included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.value.len());
        out.push((self.protocol_identifier << 4) | (self.code_set & 0xf));
        out.push(
            ((self.piv as u8) << 7)
                | ((self.association & 0x3) << 4)
                | (self.designator_type & 0xf),
        );
        out.push(0);
        out.push(self.value.len() as u8);
        out.extend_from_slice(&self.value);
        out
    }
}

/// VPD page 0x83.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentification {
    pub designators: Vec<Designator>,
}

impl DeviceIdentification {
    /// The first designator associated with the logical unit itself, which
    /// is what EXTENDED COPY target descriptors carry.
    pub fn logical_unit_designator(&self) -> Option<&Designator> {
        self.designators.iter().find(|d| d.association == 0)
    }
}

impl DataIn for DeviceIdentification {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (header, mut rest) = vpd_payload(VPD_DEVICE_IDENTIFIERS, buf)?;
        rest = &rest[..rest.len().min(header.page_length as usize)];
        let mut designators = Vec::new();
        while !rest.is_empty() {
            let (d, tail) = read::<VpdIdentificationDescriptor>("designation descriptor", rest)?;
            let len = d.identifier_length as usize;
            let value = tail.get(..len).ok_or(DecodeError::Short {
                what: "designator",
                needed: len,
                actual: tail.len(),
            })?;
            designators.push(Designator {
                protocol_identifier: d.code_set >> 4,
                code_set: d.code_set & 0xf,
                piv: d.identifiertype & 0x80 != 0,
                association: (d.identifiertype >> 4) & 0x3,
                designator_type: d.identifiertype & 0xf,
                value: value.to_vec(),
            });
            rest = &tail[len..];
        }
        Ok(Self { designators })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCapacity10 {
    pub last_lba: u32,
    pub block_length: u32,
}

impl DataIn for ReadCapacity10 {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (data, _) = read::<ReadCapacityData>("read capacity (10)", buf)?;
        Ok(Self {
            last_lba: data.logical_block_address.get(),
            block_length: data.bytes_per_block.get(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCapacity16 {
    pub last_lba: u64,
    pub block_length: u32,
    pub prot_en: bool,
    pub p_type: u8,
    pub lbppb_exponent: u8,
    pub lbpme: bool,
    pub lbprz: bool,
    pub lowest_aligned_lba: u16,
}

impl ReadCapacity16 {
    pub fn num_blocks(&self) -> u64 {
        self.last_lba + 1
    }

    /// Logical blocks per physical block.
    pub fn lbppb(&self) -> u32 {
        1 << self.lbppb_exponent
    }
}

impl DataIn for ReadCapacity16 {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        // Only the first 16 bytes are mandatory.
        let mut data = [0u8; size_of::<ReadCapacity16Data>()];
        let len = buf.len().min(data.len());
        if len < 12 {
            return Err(DecodeError::Short {
                what: "read capacity (16)",
                needed: 12,
                actual: len,
            });
        }
        data[..len].copy_from_slice(&buf[..len]);
        let (d, _) = read::<ReadCapacity16Data>("read capacity (16)", &data)?;
        Ok(Self {
            last_lba: d.ex.logical_block_address.get(),
            block_length: d.ex.bytes_per_block.get(),
            prot_en: d.flags & 1 != 0,
            p_type: (d.flags >> 1) & 0x7,
            lbppb_exponent: d.exponents & 0xf,
            lbpme: d.lowest_aligned_block_msb & READ_CAPACITY16_LBPME != 0,
            lbprz: d.lowest_aligned_block_msb & READ_CAPACITY16_LBPRZ != 0,
            lowest_aligned_lba: u16::from_be_bytes([
                d.lowest_aligned_block_msb & 0x3f,
                d.lowest_aligned_block_lsb,
            ]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbaStatus {
    pub start_lba: u64,
    pub block_count: u32,
    pub provisioning_status: u8,
}

/// GET LBA STATUS parameter data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LbaStatusList {
    pub descriptors: Vec<LbaStatus>,
}

impl DataIn for LbaStatusList {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (header, rest) = read::<LbaStatusListHeader>("lba status header", buf)?;
        // The parameter length counts from byte 4.
        let len = (header.parameter_length.get() as usize).saturating_sub(4);
        let rest = &rest[..rest.len().min(len)];
        let (descs, _) = <[LbaStatusDescriptor]>::ref_from_prefix_with_elems(
            rest,
            rest.len() / size_of::<LbaStatusDescriptor>(),
        )
        .map_err(|_| DecodeError::Invalid {
            what: "lba status descriptors",
            reason: "misaligned list".into(),
        })?;
        Ok(Self {
            descriptors: descs
                .iter()
                .map(|d| LbaStatus {
                    start_lba: d.start_lba.get(),
                    block_count: d.logical_block_count.get(),
                    provisioning_status: d.provisioning_status & 0xf,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModePage {
    pub page_code: u8,
    pub ps: bool,
    /// The page bytes following the two byte header.
    pub data: Vec<u8>,
}

impl ModePage {
    /// The page as MODE SELECT expects it, with PS cleared.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        out.push(self.page_code & MODE_PAGE_CODE_MASK);
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out
    }
}

/// MODE SENSE (6) parameter data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSense6Data {
    pub medium_type: u8,
    pub device_specific_parameter: u8,
    pub block_descriptors: Vec<u8>,
    pub pages: Vec<ModePage>,
}

impl ModeSense6Data {
    pub fn write_protected(&self) -> bool {
        self.device_specific_parameter & MODE_DSP_WRITE_PROTECT != 0
    }

    pub fn page(&self, code: u8) -> Option<&ModePage> {
        self.pages.iter().find(|p| p.page_code == code)
    }

    pub fn page_mut(&mut self, code: u8) -> Option<&mut ModePage> {
        self.pages.iter_mut().find(|p| p.page_code == code)
    }

    /// The SWP bit of the control page, if the page was returned.
    pub fn software_write_protect(&self) -> Option<bool> {
        let page = self.page(MODE_PAGE_CONTROL)?;
        let mut raw = [0u8; size_of::<ModeControlPage>()];
        let len = page.data.len().min(raw.len() - 2);
        raw[2..2 + len].copy_from_slice(&page.data[..len]);
        let (control, _) = ModeControlPage::read_from_prefix(&raw[..]).ok()?;
        (len >= 3).then_some(control.flags4.swp())
    }
}

impl DataIn for ModeSense6Data {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (header, rest) = read::<ModeParameterHeader>("mode parameter header", buf)?;
        // Mode data length excludes itself.
        let total = (header.mode_data_length as usize + 1)
            .saturating_sub(size_of::<ModeParameterHeader>());
        let rest = &rest[..rest.len().min(total)];
        let bd_len = header.block_descriptor_length as usize;
        let block_descriptors = rest.get(..bd_len).ok_or(DecodeError::Short {
            what: "mode block descriptors",
            needed: bd_len,
            actual: rest.len(),
        })?;
        let mut rest = &rest[bd_len..];
        let mut pages = Vec::new();
        while rest.len() >= 2 {
            let len = rest[1] as usize;
            let data = rest.get(2..2 + len).ok_or(DecodeError::Short {
                what: "mode page",
                needed: 2 + len,
                actual: rest.len(),
            })?;
            pages.push(ModePage {
                page_code: rest[0] & MODE_PAGE_CODE_MASK,
                ps: rest[0] & MODE_PAGE_PS != 0,
                data: data.to_vec(),
            });
            rest = &rest[2 + len..];
        }
        Ok(Self {
            medium_type: header.medium_type,
            device_specific_parameter: header.device_specific_parameter,
            block_descriptors: block_descriptors.to_vec(),
            pages,
        })
    }
}

/// PERSISTENT RESERVE IN, READ KEYS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadKeys {
    pub generation: u32,
    pub keys: Vec<u64>,
}

impl DataIn for ReadKeys {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (header, rest) = read::<PriRegistrationListHeader>("registration list", buf)?;
        let len = (header.additional_length.get() as usize).min(rest.len());
        let (keys, _) = <[U64BE]>::ref_from_prefix_with_elems(&rest[..len], len / 8).map_err(
            |_| DecodeError::Invalid {
                what: "registration list",
                reason: "truncated key".into(),
            },
        )?;
        Ok(Self {
            generation: header.generation.get(),
            keys: keys.iter().map(|k| k.get()).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationDescriptor {
    pub key: u64,
    pub scope: u8,
    pub reservation_type: ReservationType,
}

/// PERSISTENT RESERVE IN, READ RESERVATION.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReservation {
    pub generation: u32,
    pub reservation: Option<ReservationDescriptor>,
}

impl DataIn for ReadReservation {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (header, rest) = read::<PriReservationListHeader>("reservation list", buf)?;
        let reservation = if header.additional_length.get() == 0 {
            None
        } else {
            let (d, _) = read::<PriReservationDescriptor>("reservation descriptor", rest)?;
            Some(ReservationDescriptor {
                key: d.reservation_key.get(),
                scope: d.type_scope.scope(),
                reservation_type: d.type_scope.reserve_type(),
            })
        };
        Ok(Self {
            generation: header.generation.get(),
            reservation,
        })
    }
}

/// PERSISTENT RESERVE IN, REPORT CAPABILITIES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCapabilities {
    pub length: u16,
    pub crh: bool,
    pub sip_c: bool,
    pub atp_c: bool,
    pub ptpl_c: bool,
    pub ptpl_a: bool,
    pub allow_commands: u8,
    /// Present only when TMV is set.
    pub type_mask: Option<PriReportCapabilitiesTypeMask>,
}

impl ReportCapabilities {
    /// Whether the device claims support for `ty`. Without a valid type
    /// mask nothing can be assumed.
    pub fn supports(&self, ty: ReservationType) -> bool {
        self.type_mask.is_some_and(|mask| mask.supports(ty))
    }
}

impl DataIn for ReportCapabilities {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (caps, _) = read::<PriReportCapabilities>("report capabilities", buf)?;
        let flags = caps.flags;
        Ok(Self {
            length: caps.length.get(),
            crh: flags.compatible_reservation_handling(),
            sip_c: flags.specify_initiator_ports_capable(),
            atp_c: flags.all_target_ports_capable(),
            ptpl_c: flags.persist_through_power_loss_capable(),
            ptpl_a: flags.persist_through_power_loss_activated(),
            allow_commands: flags.allow_commands(),
            type_mask: flags.type_mask_valid().then_some(caps.type_mask),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    pub nominal: u32,
    pub recommended: u32,
}

/// One entry of REPORT SUPPORTED OPERATION CODES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedCommand {
    pub opcode: ScsiOp,
    pub service_action: Option<u16>,
    pub cdb_length: u16,
    pub timeouts: Option<CommandTimeouts>,
}

/// The all-commands form of REPORT SUPPORTED OPERATION CODES.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedOpcodes {
    pub commands: Vec<SupportedCommand>,
}

impl SupportedOpcodes {
    /// Looks up `opcode`, matching `service_action` only for commands that
    /// have one.
    pub fn find(&self, opcode: ScsiOp, service_action: Option<u16>) -> Option<&SupportedCommand> {
        self.commands.iter().find(|c| {
            c.opcode == opcode && (c.service_action.is_none() || c.service_action == service_action)
        })
    }
}

impl DataIn for SupportedOpcodes {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (header, rest) = read::<SupportedOpcodesHeader>("supported opcodes header", buf)?;
        let mut rest = &rest[..rest.len().min(header.command_data_length.get() as usize)];
        let mut commands = Vec::new();
        while !rest.is_empty() {
            let (d, tail) = read::<CommandDescriptor>("command descriptor", rest)?;
            rest = tail;
            let timeouts = if d.flags.ctdp() {
                let (t, tail) = read::<CommandTimeoutsDescriptor>("command timeouts", rest)?;
                rest = tail;
                Some(CommandTimeouts {
                    nominal: t.nominal_command_processing_timeout.get(),
                    recommended: t.recommended_command_timeout.get(),
                })
            } else {
                None
            };
            commands.push(SupportedCommand {
                opcode: ScsiOp(d.operation_code),
                service_action: d.flags.servactv().then_some(d.service_action.get()),
                cdb_length: d.cdb_length.get(),
                timeouts,
            });
        }
        Ok(Self { commands })
    }
}

/// RECEIVE COPY RESULTS, OPERATING PARAMETERS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyParameters {
    pub max_target_descriptor_count: u16,
    pub max_segment_descriptor_count: u16,
    pub max_descriptor_list_length: u32,
    pub max_segment_length: u32,
    pub max_inline_data_length: u32,
    pub held_data_limit: u32,
    pub max_concurrent_copies: u8,
    pub implemented_descriptors: Vec<DescriptorTypeCode>,
}

impl CopyParameters {
    pub fn supports(&self, code: DescriptorTypeCode) -> bool {
        self.implemented_descriptors.contains(&code)
    }
}

impl DataIn for CopyParameters {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (p, rest) = read::<CopyOperatingParameters>("copy operating parameters", buf)?;
        let n = (p.implemented_descriptor_list_length as usize).min(rest.len());
        Ok(Self {
            max_target_descriptor_count: p.max_target_descriptor_count.get(),
            max_segment_descriptor_count: p.max_segment_descriptor_count.get(),
            max_descriptor_list_length: p.max_descriptor_list_length.get(),
            max_segment_length: p.max_segment_length.get(),
            max_inline_data_length: p.max_inline_data_length.get(),
            held_data_limit: p.held_data_limit.get(),
            max_concurrent_copies: p.max_concurrent_copies,
            implemented_descriptors: rest[..n].iter().copied().map(DescriptorTypeCode).collect(),
        })
    }
}

/// Raw bytes, for commands whose data the caller inspects directly.
impl DataIn for Vec<u8> {
    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(buf.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scsi_defs::PriReportCapabilitiesFlags;
    use zerocopy::IntoBytes;

    #[test]
    fn short_inquiry() {
        let err = StandardInquiry::decode(&[0; 5]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Short {
                needed: 36,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn inquiry_fields() {
        let mut buf = [0u8; 36];
        buf[0] = 0x00;
        buf[1] = 0x80;
        buf[2] = 0x06;
        buf[5] = INQUIRY_FLAGS5_3PC;
        buf[8..16].copy_from_slice(b"ACME    ");
        let inq = StandardInquiry::decode(&buf).unwrap();
        assert_eq!(inq.device_type, PeripheralDeviceType::DIRECT_ACCESS);
        assert!(inq.removable);
        assert!(inq.third_party_copy);
        assert_eq!(inq.vendor_id, "ACME");
    }

    #[test]
    fn vpd_page_code_checked() {
        let buf = [0, VPD_BLOCK_LIMITS, 0, 0x3c];
        assert!(matches!(
            LogicalBlockProvisioning::decode(&buf),
            Err(DecodeError::WrongPage { .. })
        ));
    }

    #[test]
    fn lbp_flags() {
        let buf = [0, VPD_LOGICAL_BLOCK_PROVISIONING, 0, 4, 0, 0b1010_0000, 2, 0];
        let lbp = LogicalBlockProvisioning::decode(&buf).unwrap();
        assert!(lbp.lbpu);
        assert!(!lbp.lbpws);
        assert!(lbp.lbpws10);
        assert_eq!(lbp.provisioning_type, 2);
    }

    #[test]
    fn read_keys_list() {
        let mut buf = vec![0, 0, 0, 7, 0, 0, 0, 16];
        buf.extend_from_slice(&5u64.to_be_bytes());
        buf.extend_from_slice(&9u64.to_be_bytes());
        let keys = ReadKeys::decode(&buf).unwrap();
        assert_eq!(keys.generation, 7);
        assert_eq!(keys.keys, [5, 9]);
    }

    #[test]
    fn empty_reservation() {
        let res = ReadReservation::decode(&[0, 0, 0, 1, 0, 0, 0, 0]).unwrap();
        assert_eq!(res.reservation, None);
    }

    #[test]
    fn capabilities_mask_needs_tmv() {
        let mask = PriReportCapabilitiesTypeMask::new()
            .with_write_exclusive(true)
            .with_exclusive_access(true);
        let mut raw = PriReportCapabilities {
            length: 8.into(),
            flags: PriReportCapabilitiesFlags::new().with_compatible_reservation_handling(true),
            type_mask: mask,
            reserved7: [0; 2],
        };
        let caps = ReportCapabilities::decode(raw.as_bytes()).unwrap();
        assert!(caps.crh);
        assert_eq!(caps.type_mask, None);
        assert!(!caps.supports(ReservationType::WRITE_EXCLUSIVE));

        raw.flags.set_type_mask_valid(true);
        let valid = ReportCapabilities::decode(raw.as_bytes()).unwrap();
        assert_ne!(valid, caps);
        assert_eq!(valid.type_mask, Some(mask));
        assert!(valid.supports(ReservationType::EXCLUSIVE));
        assert!(!valid.supports(ReservationType::EXCLUSIVE_REGISTRANTS));
    }

    #[test]
    fn mode_pages() {
        // Header, no block descriptors, control page with SWP set.
        let mut buf = vec![0, 0, MODE_DSP_WRITE_PROTECT, 0];
        buf.extend_from_slice(&[MODE_PAGE_CONTROL, 10, 0, 0, 0x08, 0, 0, 0, 0, 0, 0, 0]);
        buf[0] = (buf.len() - 1) as u8;
        let data = ModeSense6Data::decode(&buf).unwrap();
        assert!(data.write_protected());
        assert_eq!(data.pages.len(), 1);
        assert_eq!(data.software_write_protect(), Some(true));
        assert_eq!(data.page(MODE_PAGE_CONTROL).unwrap().to_bytes()[1], 10);
    }

    #[test]
    fn supported_opcode_lookup() {
        let mut buf = vec![0, 0, 0, 16];
        buf.extend_from_slice(&[0x28, 0, 0, 0, 0, 0, 0, 10]);
        buf.extend_from_slice(&[0x9e, 0, 0, 0x10, 0, 1, 0, 16]);
        let ops = SupportedOpcodes::decode(&buf).unwrap();
        assert!(ops.find(ScsiOp::READ, None).is_some());
        assert!(ops.find(ScsiOp::SERVICE_ACTION_IN16, Some(0x10)).is_some());
        assert!(ops.find(ScsiOp::SERVICE_ACTION_IN16, Some(0x12)).is_none());
        assert!(ops.find(ScsiOp::WRITE, None).is_none());
    }

    #[test]
    fn designators() {
        let mut buf = vec![0, VPD_DEVICE_IDENTIFIERS, 0, 0];
        let naa = Designator {
            protocol_identifier: 0,
            code_set: 1,
            piv: false,
            association: 0,
            designator_type: 3,
            value: vec![0x60, 1, 2, 3, 4, 5, 6, 7],
        };
        buf.extend_from_slice(&naa.to_bytes());
        buf[3] = (buf.len() - 4) as u8;
        let id = DeviceIdentification::decode(&buf).unwrap();
        assert_eq!(id.logical_unit_designator(), Some(&naa));
    }
}
