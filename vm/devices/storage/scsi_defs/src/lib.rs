// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! SCSI command, status, sense and parameter-data definitions used to build
//! and decode conformance test traffic.

#![forbid(unsafe_code)]

#[macro_use]
mod open_enum;

pub mod xcopy;

use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

pub type U16BE = zerocopy::byteorder::U16<zerocopy::byteorder::BigEndian>;
pub type U32BE = zerocopy::byteorder::U32<zerocopy::byteorder::BigEndian>;
pub type U64BE = zerocopy::byteorder::U64<zerocopy::byteorder::BigEndian>;

open_enum! {
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum ScsiOp: u8 {
        TEST_UNIT_READY = 0x00,
        REQUEST_SENSE = 0x03,
        READ6 = 0x08,
        WRITE6 = 0x0A,
        INQUIRY = 0x12,
        MODE_SELECT = 0x15,
        RESERVE_UNIT = 0x16,
        RELEASE_UNIT = 0x17,
        MODE_SENSE = 0x1A,
        START_STOP_UNIT = 0x1B,
        MEDIUM_REMOVAL = 0x1E,
        READ_CAPACITY = 0x25,
        READ = 0x28,
        WRITE = 0x2A,
        WRITE_VERIFY = 0x2E,
        VERIFY = 0x2F,
        PREFETCH = 0x34,
        SYNCHRONIZE_CACHE = 0x35,
        WRITE_SAME = 0x41,
        UNMAP = 0x42,
        SANITIZE = 0x48,
        MODE_SELECT10 = 0x55,
        MODE_SENSE10 = 0x5A,
        PERSISTENT_RESERVE_IN = 0x5E,
        PERSISTENT_RESERVE_OUT = 0x5F,
        EXTENDED_COPY = 0x83,
        RECEIVE_COPY_RESULTS = 0x84,
        READ16 = 0x88,
        COMPARE_AND_WRITE = 0x89,
        WRITE16 = 0x8A,
        ORWRITE = 0x8B,
        WRITE_VERIFY16 = 0x8E,
        VERIFY16 = 0x8F,
        PREFETCH16 = 0x90,
        SYNCHRONIZE_CACHE16 = 0x91,
        WRITE_SAME16 = 0x93,
        WRITE_ATOMIC16 = 0x9C,
        SERVICE_ACTION_IN16 = 0x9E,
        REPORT_LUNS = 0xA0,
        MAINTENANCE_IN = 0xA3,
        READ12 = 0xA8,
        WRITE12 = 0xAA,
        WRITE_VERIFY12 = 0xAE,
        VERIFY12 = 0xAF,
    }
}

pub const VPD_SUPPORTED_PAGES: u8 = 0x00;
pub const VPD_DEVICE_IDENTIFIERS: u8 = 0x83;
pub const VPD_BLOCK_LIMITS: u8 = 0xB0;
pub const VPD_BLOCK_DEVICE_CHARACTERISTICS: u8 = 0xB1;
pub const VPD_LOGICAL_BLOCK_PROVISIONING: u8 = 0xB2;

open_enum! {
    pub enum PeripheralDeviceType: u8 {
        DIRECT_ACCESS = 0x00,
        SEQUENTIAL_ACCESS = 0x01,
        PRINTER = 0x02,
        PROCESSOR = 0x03,
        WRITE_ONCE = 0x04,
        MMC = 0x05,
        OPTICAL_MEMORY = 0x07,
        MEDIA_CHANGER = 0x08,
        STORAGE_ARRAY_CONTROLLER = 0x0C,
        ENCLOSURE_SERVICES = 0x0D,
        SIMPLIFIED_DIRECT_ACCESS = 0x0E,
        UNKNOWN = 0x1F,
    }
}

pub const INQUIRY_DATA_BUFFER_SIZE: u8 = 36;
pub const T10_VERSION_SPC4: u8 = 0x06;
pub const T10_RESPONSE_DATA_SPC3: u8 = 0x02;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbInquiry {
    pub operation_code: ScsiOp,
    pub flags: InquiryFlags,
    pub page_code: u8,
    pub allocation_length: U16BE,
    pub control: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct InquiryFlags {
    #[bits(1)]
    pub vpd: bool,
    #[bits(1)]
    pub csd: bool,
    #[bits(6)]
    pub reserved: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct InquiryDataHeader {
    /// Peripheral device type in the low five bits, qualifier in the high three.
    pub device_type: u8,
    pub flags2: InquiryDataFlag2,
    pub versions: u8,
    pub flags3: InquiryDataFlag3,
    pub additional_length: u8,
}

impl InquiryDataHeader {
    pub fn peripheral_device_type(&self) -> PeripheralDeviceType {
        PeripheralDeviceType(self.device_type & 0x1f)
    }

    pub fn peripheral_qualifier(&self) -> u8 {
        self.device_type >> 5
    }
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct InquiryDataFlag2 {
    #[bits(7)]
    pub device_type_modifier: u8,
    #[bits(1)]
    pub removable_media: bool,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct InquiryDataFlag3 {
    #[bits(4)]
    pub response_data_format: u8,
    #[bits(1)]
    pub hi_support: bool,
    #[bits(1)]
    pub norm_aca: bool,
    #[bits(1)]
    pub reserved_bit: bool,
    #[bits(1)]
    pub aerc: bool,
}

/// The first 36 bytes of standard INQUIRY data.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct InquiryData {
    pub header: InquiryDataHeader,
    /// SCCS, ACC, TPGS, 3PC and PROTECT.
    pub flags5: u8,
    pub flags6: u8,
    pub flags7: u8,
    pub vendor_id: [u8; 8],
    pub product_id: [u8; 16],
    pub product_revision_level: [u8; 4],
}

pub const INQUIRY_FLAGS5_3PC: u8 = 0x08;
pub const INQUIRY_FLAGS5_PROTECT: u8 = 0x01;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VpdPageHeader {
    pub device_type: u8,
    pub page_code: u8,
    pub reserved: u8,
    pub page_length: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VpdIdentificationDescriptor {
    /// Protocol identifier in the high nibble, code set in the low nibble.
    pub code_set: u8,
    /// PIV and association in the high nibble, designator type in the low.
    pub identifiertype: u8,
    pub reserved3: u8,
    pub identifier_length: u8,
}

pub const VPD_CODE_SET_BINARY: u8 = 1;
pub const VPD_CODE_SET_ASCII: u8 = 2;
pub const VPD_IDENTIFIER_TYPE_VENDOR_ID: u8 = 1;
pub const VPD_IDENTIFIER_TYPE_EUI64: u8 = 2;
pub const VPD_IDENTIFIER_TYPE_NAA: u8 = 3;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VpdBlockLimitsDescriptor {
    pub reserved0: u8,
    pub max_compare_and_write_length: u8,
    pub optimal_transfer_length_granularity: U16BE,
    pub max_transfer_length: U32BE,
    pub optimal_transfer_length: U32BE,
    pub max_prefetch_xd_read_xd_write_transfer_length: U32BE,
    pub max_unmap_lba_count: U32BE,
    pub max_unmap_block_descriptor_count: U32BE,
    pub optimal_unmap_granularity: U32BE,
    pub unmap_granularity_alignment: [u8; 4],
    pub max_write_same_length: U64BE,
    pub max_atomic_transfer_length: U32BE,
    pub atomic_alignment: U32BE,
    pub atomic_transfer_length_granularity: U32BE,
    pub reserved1: [u8; 8],
}

/// VPD Page 0xB1, Block Device Characteristics
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VpdBlockDeviceCharacteristicsPage {
    pub medium_rotation_rate: U16BE,
    pub product_type: u8,
    /// WABEREQ, WACEREQ and nominal form factor.
    pub flags: u8,
    pub data: [u8; 56],
}

// VPD Page 0xB2, Logical Block Provisioning

pub const PROVISIONING_TYPE_UNKNOWN: u8 = 0x0;
pub const PROVISIONING_TYPE_RESOURCE: u8 = 0x1;
pub const PROVISIONING_TYPE_THIN: u8 = 0x2;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VpdLogicalBlockProvisioningPage {
    pub threshold_exponent: u8,
    pub flags: LogicalBlockProvisioningFlags,
    /// Provisioning type in the low three bits.
    pub provisioning_type: u8,
    pub reserved2: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct LogicalBlockProvisioningFlags {
    pub dp: bool,
    pub anc_sup: bool,
    pub lbprz: bool,
    #[bits(2)]
    _reserved: u8,
    pub lbpws10: bool,
    pub lbpws: bool,
    pub lbpu: bool,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SenseDataHeader {
    pub error_code: SenseDataErrorCode,
    pub segment_number: u8,
    /// Sense key in the low nibble; ILI, EOM and FILEMARK above it.
    pub sense_key: SenseKey,
    pub information: [u8; 4],
    pub additional_sense_length: u8,
}

/// Fixed format sense data.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SenseData {
    pub header: SenseDataHeader,
    pub command_specific_information: [u8; 4],
    pub additional_sense_code: AdditionalSenseCode,
    pub additional_sense_code_qualifier: u8,
    pub field_replaceable_unit_code: u8,
    pub sense_key_specific: [u8; 3],
}

impl SenseData {
    pub const fn new(
        sense_key: SenseKey,
        additional_sense_code: AdditionalSenseCode,
        additional_sense_code_qualifier: u8,
    ) -> Self {
        SenseData {
            header: SenseDataHeader {
                error_code: SenseDataErrorCode::FIXED_CURRENT,
                segment_number: 0,
                sense_key,
                information: [0; 4],
                additional_sense_length: (size_of::<SenseData>() - size_of::<SenseDataHeader>())
                    as u8,
            },
            command_specific_information: [0; 4],
            additional_sense_code,
            additional_sense_code_qualifier,
            field_replaceable_unit_code: 0,
            sense_key_specific: [0; 3],
        }
    }

    /// Builds fixed sense data from a packed additional sense qualifier.
    pub const fn with_ascq(sense_key: SenseKey, ascq: Ascq) -> Self {
        Self::new(
            sense_key,
            AdditionalSenseCode((ascq.0 >> 8) as u8),
            ascq.0 as u8,
        )
    }
}

/// Descriptor format sense data header.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct DescriptorSenseDataHeader {
    pub error_code: SenseDataErrorCode,
    pub sense_key: SenseKey,
    pub additional_sense_code: AdditionalSenseCode,
    pub additional_sense_code_qualifier: u8,
    pub reserved: [u8; 3],
    pub additional_sense_length: u8,
}

open_enum! {
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum SenseKey: u8 {
        NO_SENSE = 0x00,
        RECOVERED_ERROR = 0x01,
        NOT_READY = 0x02,
        MEDIUM_ERROR = 0x03,
        HARDWARE_ERROR = 0x04,
        ILLEGAL_REQUEST = 0x05,
        UNIT_ATTENTION = 0x06,
        DATA_PROTECT = 0x07,
        BLANK_CHECK = 0x08,
        UNIQUE = 0x09,
        COPY_ABORTED = 0x0A,
        ABORTED_COMMAND = 0x0B,
        EQUAL = 0x0C,
        VOL_OVERFLOW = 0x0D,
        MISCOMPARE = 0x0E,
        RESERVED = 0x0F,
    }
}

open_enum! {
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum SenseDataErrorCode: u8 {
        FIXED_CURRENT = 0x70,
        FIXED_DEFERRED = 0x71,
        DESCRIPTOR_CURRENT = 0x72,
        DESCRIPTOR_DEFERRED = 0x73,
    }
}

open_enum! {
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum AdditionalSenseCode: u8 {
        NO_SENSE = 0x00,
        LUN_NOT_READY = 0x04,
        LUN_COMMUNICATION = 0x08,
        COPY_TARGET_DEVICE_ERROR = 0x0D,
        PARAMETER_LIST_LENGTH = 0x1A,
        MISCOMPARE_DURING_VERIFY_OPERATION = 0x1D,
        ILLEGAL_COMMAND = 0x20,
        ILLEGAL_BLOCK = 0x21,
        INVALID_CDB = 0x24,
        INVALID_LUN = 0x25,
        INVALID_FIELD_PARAMETER_LIST = 0x26,
        WRITE_PROTECT = 0x27,
        MEDIUM_CHANGED = 0x28,
        BUS_RESET = 0x29,
        PARAMETERS_CHANGED = 0x2A,
        COMMAND_SEQUENCE_ERROR = 0x2C,
        NO_MEDIA_IN_DEVICE = 0x3a,
        OPERATING_CONDITIONS_CHANGED = 0x3f,
        MEDIUM_REMOVAL_PREVENTED = 0x53,
    }
}

open_enum! {
    /// An additional sense code and its qualifier, packed as
    /// `asc << 8 | ascq`.
    pub enum Ascq: u16 {
        NO_ADDITIONAL_SENSE_INFORMATION = 0x0000,
        LOGICAL_UNIT_NOT_READY_SANITIZE_IN_PROGRESS = 0x041B,
        LOGICAL_UNIT_COMMUNICATION_FAILURE = 0x0800,
        COPY_TARGET_DEVICE_NOT_REACHABLE = 0x0D02,
        PARAMETER_LIST_LENGTH_ERROR = 0x1A00,
        MISCOMPARE_DURING_VERIFY_OPERATION = 0x1D00,
        INVALID_OPERATION_CODE = 0x2000,
        LBA_OUT_OF_RANGE = 0x2100,
        INVALID_FIELD_IN_CDB = 0x2400,
        LOGICAL_UNIT_NOT_SUPPORTED = 0x2500,
        INVALID_FIELD_IN_PARAMETER_LIST = 0x2600,
        INVALID_RELEASE_OF_PERSISTENT_RESERVATION = 0x2604,
        TOO_MANY_TARGET_DESCRIPTORS = 0x2606,
        UNSUPPORTED_TARGET_DESCRIPTOR_TYPE_CODE = 0x2607,
        TOO_MANY_SEGMENT_DESCRIPTORS = 0x2608,
        UNSUPPORTED_SEGMENT_DESCRIPTOR_TYPE_CODE = 0x2609,
        WRITE_PROTECTED = 0x2700,
        HARDWARE_WRITE_PROTECTED = 0x2701,
        SOFTWARE_WRITE_PROTECTED = 0x2702,
        POWER_ON_RESET_OR_BUS_DEVICE_RESET_OCCURRED = 0x2900,
        POWER_ON_OCCURRED = 0x2901,
        BUS_RESET_OCCURRED = 0x2902,
        I_T_NEXUS_LOSS_OCCURRED = 0x2907,
        MODE_PARAMETERS_CHANGED = 0x2A01,
        RESERVATIONS_PREEMPTED = 0x2A03,
        RESERVATIONS_RELEASED = 0x2A04,
        REGISTRATIONS_PREEMPTED = 0x2A05,
        CAPACITY_DATA_HAS_CHANGED = 0x2A09,
        MEDIUM_NOT_PRESENT = 0x3A00,
        MEDIUM_NOT_PRESENT_TRAY_CLOSED = 0x3A01,
        MEDIUM_NOT_PRESENT_TRAY_OPEN = 0x3A02,
        REPORTED_LUNS_DATA_HAS_CHANGED = 0x3F0E,
        MEDIUM_REMOVAL_PREVENTED = 0x5302,
    }
}

impl Ascq {
    pub const fn new(asc: AdditionalSenseCode, ascq: u8) -> Self {
        Self(((asc.0 as u16) << 8) | ascq as u16)
    }

    pub const fn asc(&self) -> AdditionalSenseCode {
        AdditionalSenseCode((self.0 >> 8) as u8)
    }

    pub const fn ascq(&self) -> u8 {
        self.0 as u8
    }
}

open_enum! {
    #[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub enum ScsiStatus: u8 {
        GOOD = 0x00,
        CHECK_CONDITION = 0x02,
        CONDITION_MET = 0x04,
        BUSY = 0x08,
        INTERMEDIATE = 0x10,
        INTERMEDIATE_COND_MET = 0x14,
        RESERVATION_CONFLICT = 0x18,
        COMMAND_TERMINATED = 0x22,
        QUEUE_FULL = 0x28,
        TASK_ABORTED = 0x40,
    }
}

/// A six byte CDB with no fields beyond the operation code.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb6 {
    pub operation_code: ScsiOp,
    pub reserved: [u8; 4],
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbReadCapacity {
    pub operation_code: ScsiOp,
    pub reserved1: u8,
    pub logical_block: U32BE,
    pub reserved2: [u8; 2],
    /// PMI in bit 0.
    pub pmi: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ReadCapacityData {
    pub logical_block_address: U32BE,
    pub bytes_per_block: U32BE,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeSense {
    pub operation_code: ScsiOp,
    /// DBD in bit 3.
    pub flags1: u8,
    pub flags2: ModeSenseFlags,
    pub sub_page_code: u8,
    pub allocation_length: u8,
    pub control: u8,
}

pub const MODE_SENSE_DBD: u8 = 0x08;

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeSenseFlags {
    #[bits(6)]
    pub page_code: u8,
    #[bits(2)]
    pub pc: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeSelect {
    pub operation_code: ScsiOp,
    pub flags: ModeSelectFlags,
    pub reserved2: [u8; 2],
    pub parameter_list_length: u8,
    pub control: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeSelectFlags {
    pub spbit: bool,
    #[bits(3)]
    _reserved: u8,
    pub pf: bool,
    #[bits(3)]
    _reserved2: u8,
}

pub const MODE_CONTROL_CURRENT_VALUES: u8 = 0x00;
pub const MODE_CONTROL_CHANGEABLE_VALUES: u8 = 0x01;
pub const MODE_CONTROL_DEFAULT_VALUES: u8 = 0x02;
pub const MODE_CONTROL_SAVED_VALUES: u8 = 0x03;

pub const MODE_PAGE_CONTROL: u8 = 0x0A;
pub const MODE_PAGE_ALL: u8 = 0x3f;

/// The PS bit in a mode page's first byte.
pub const MODE_PAGE_PS: u8 = 0x80;
pub const MODE_PAGE_CODE_MASK: u8 = 0x3f;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeParameterHeader {
    pub mode_data_length: u8,
    pub medium_type: u8,
    pub device_specific_parameter: u8,
    pub block_descriptor_length: u8,
}

pub const MODE_DSP_FUA_SUPPORTED: u8 = 0x10;
pub const MODE_DSP_WRITE_PROTECT: u8 = 0x80;

/// Mode page 0x0A, Control.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeControlPage {
    pub page_code: u8,
    pub page_length: u8,
    pub flags2: u8,
    pub flags3: u8,
    pub flags4: ModeControlFlags4,
    pub flags5: u8,
    pub obsolete: [u8; 2],
    pub busy_timeout_period: U16BE,
    pub extended_self_test_completion_time: U16BE,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ModeControlFlags4 {
    #[bits(3)]
    _reserved: u8,
    pub swp: bool,
    #[bits(2)]
    pub ua_intlck_ctrl: u8,
    pub rac: bool,
    pub vs: bool,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb6ReadWrite {
    pub operation_code: ScsiOp,
    /// 21-bit logical block address.
    pub logical_block: [u8; 3],
    /// Zero means 256 blocks.
    pub transfer_blocks: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb10 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U32BE,
    pub group_number: u8,
    pub transfer_blocks: U16BE,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb12 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U32BE,
    pub transfer_blocks: U32BE,
    pub group_number: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb16 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U64BE,
    pub transfer_blocks: U32BE,
    pub group_number: u8,
    pub control: u8,
}

/// Byte 1 of the READ, WRITE and ORWRITE CDBs.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbFlags {
    pub relative_address: bool,
    pub fua_nv: bool,
    _reserved: bool,
    pub fua: bool,
    pub disable_page_out: bool,
    #[bits(3)]
    pub protection: u8,
}

/// Byte 1 of the VERIFY and WRITE AND VERIFY CDBs.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct VerifyFlags {
    _obsolete: bool,
    #[bits(2)]
    pub bytchk: u8,
    _reserved: bool,
    pub disable_page_out: bool,
    #[bits(3)]
    pub protection: u8,
}

/// Byte 1 of the WRITE SAME CDBs.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct WriteSameFlags {
    pub ndob: bool,
    #[bits(2)]
    _reserved: u8,
    pub unmap: bool,
    pub anchor: bool,
    #[bits(3)]
    pub protection: u8,
}

/// Byte 1 of the SYNCHRONIZE CACHE and PRE-FETCH CDBs.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CacheFlags {
    _obsolete: bool,
    pub immediate: bool,
    pub sync_nv: bool,
    #[bits(5)]
    _reserved: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbCompareAndWrite {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U64BE,
    pub reserved: [u8; 3],
    pub number_of_blocks: u8,
    pub group_number: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbWriteAtomic16 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U64BE,
    pub reserved: [u8; 2],
    pub transfer_blocks: U16BE,
    pub group_number: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ServiceActionIn16 {
    pub operation_code: ScsiOp,
    pub service_action: u8,
    pub logical_block: U64BE,
    pub allocation_length: U32BE,
    pub flags: u8,
    pub control: u8,
}

pub const SERVICE_ACTION_READ_CAPACITY16: u8 = 0x10;
pub const SERVICE_ACTION_GET_LBA_STATUS: u8 = 0x12;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ReadCapacityDataEx {
    pub logical_block_address: U64BE,
    pub bytes_per_block: U32BE,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ReadCapacity16Data {
    pub ex: ReadCapacityDataEx,
    /// PROT_EN in bit 0, P_TYPE in bits 1-3.
    pub flags: u8,
    /// Low nibble: logical blocks per physical block exponent.
    pub exponents: u8,
    /// LBPME in bit 7, LBPRZ in bit 6, lowest aligned LBA high bits below.
    pub lowest_aligned_block_msb: u8,
    pub lowest_aligned_block_lsb: u8,
    pub reserved: [u8; 16],
}

pub const READ_CAPACITY16_LBPRZ: u8 = 1 << 6;
pub const READ_CAPACITY16_LBPME: u8 = 1 << 7;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct LbaStatusDescriptor {
    pub start_lba: U64BE,
    pub logical_block_count: U32BE,
    /// Provisioning status in the low nibble.
    pub provisioning_status: u8,
    pub reserved2: [u8; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct LbaStatusListHeader {
    pub parameter_length: U32BE,
    pub reserved: [u8; 4],
}

pub const LBA_STATUS_MAPPED: u8 = 0x0;
pub const LBA_STATUS_DEALLOCATED: u8 = 0x1;
pub const LBA_STATUS_ANCHORED: u8 = 0x2;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Unmap {
    pub operation_code: ScsiOp,
    /// ANCHOR in bit 0.
    pub anchor: u8,
    pub reserved2: [u8; 4],
    /// Group number in the low five bits.
    pub group_number: u8,
    pub parameter_list_length: U16BE,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct UnmapBlockDescriptor {
    pub start_lba: U64BE,
    pub lba_count: U32BE,
    pub reserved: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct UnmapListHeader {
    pub data_length: U16BE,
    pub block_descriptor_data_length: U16BE,
    pub reserved: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct StartStop {
    pub operation_code: ScsiOp,
    /// IMMED in bit 0.
    pub immediate: u8,
    pub reserved2: u8,
    /// Power condition modifier in the low nibble.
    pub power_condition_modifier: u8,
    pub flag: StartStopFlags,
    pub control: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct StartStopFlags {
    #[bits(1)]
    pub start: bool,
    #[bits(1)]
    pub load_eject: bool,
    #[bits(1)]
    pub no_flush: bool,
    #[bits(1)]
    _reserved: bool,
    #[bits(4)]
    pub power_condition: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbMediaRemoval {
    pub operation_code: ScsiOp,
    pub lun: u8,
    pub reserved: [u8; 2],
    pub flags: MediaRemovalFlags,
    pub control: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MediaRemovalFlags {
    #[bits(1)]
    pub prevent: bool,
    #[bits(1)]
    pub persistent: bool,
    #[bits(6)]
    pub reserved: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbSanitize {
    pub operation_code: ScsiOp,
    pub flags: SanitizeFlags,
    pub reserved: [u8; 5],
    pub parameter_list_length: U16BE,
    pub control: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SanitizeFlags {
    #[bits(5)]
    pub service_action: u8,
    pub ause: bool,
    _reserved: bool,
    pub immediate: bool,
}

open_enum! {
    pub enum SanitizeServiceAction: u8 {
        OVERWRITE = 0x01,
        BLOCK_ERASE = 0x02,
        CRYPTO_ERASE = 0x03,
        EXIT_FAILURE_MODE = 0x1F,
    }
}

/// REPORT SUPPORTED OPERATION CODES, a MAINTENANCE IN service action.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbReportSupportedOpcodes {
    pub operation_code: ScsiOp,
    pub service_action: u8,
    pub flags: ReportSupportedOpcodesFlags,
    pub requested_operation_code: u8,
    pub requested_service_action: U16BE,
    pub allocation_length: U32BE,
    pub reserved: u8,
    pub control: u8,
}

pub const MAINTENANCE_IN_REPORT_SUPPORTED_OPCODES: u8 = 0x0C;

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ReportSupportedOpcodesFlags {
    #[bits(3)]
    pub reporting_options: u8,
    #[bits(4)]
    _reserved: u8,
    pub rctd: bool,
}

pub const RSOC_ALL_COMMANDS: u8 = 0x00;
pub const RSOC_ONE_COMMAND: u8 = 0x01;
pub const RSOC_ONE_COMMAND_SERVICE_ACTION: u8 = 0x02;

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SupportedOpcodesHeader {
    pub command_data_length: U32BE,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CommandDescriptor {
    pub operation_code: u8,
    pub reserved: u8,
    pub service_action: U16BE,
    pub reserved2: u8,
    pub flags: CommandDescriptorFlags,
    pub cdb_length: U16BE,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CommandDescriptorFlags {
    pub servactv: bool,
    pub ctdp: bool,
    #[bits(6)]
    _reserved: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CommandTimeoutsDescriptor {
    pub descriptor_length: U16BE,
    pub reserved: u8,
    pub command_specific: u8,
    pub nominal_command_processing_timeout: U32BE,
    pub recommended_command_timeout: U32BE,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PersistentReserveIn {
    pub operation_code: ScsiOp,
    pub service_action: PersistentReserveServiceActionIn,
    pub reserved2: [u8; 5],
    pub allocation_length: U16BE,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PersistentReserveOut {
    pub operation_code: ScsiOp,
    pub service_action: PersistentReserveServiceActionOut,
    pub type_scope: PersistentReserveTypeScope,
    pub reserved2: [u8; 2],
    pub parameter_list_length: U32BE,
    pub control: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PersistentReserveTypeScope {
    #[bits(4)]
    reserve_type_bits: u8,
    #[bits(4)]
    pub scope: u8,
}

impl PersistentReserveTypeScope {
    pub fn reserve_type(&self) -> ReservationType {
        ReservationType(self.reserve_type_bits())
    }

    pub fn with_reserve_type(self, ty: ReservationType) -> Self {
        self.with_reserve_type_bits(ty.0)
    }
}

pub const RESERVATION_SCOPE_LU: u8 = 0x00;

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PersistentReserveServiceActionIn {
    #[bits(5)]
    service_action_bits: u8,
    #[bits(3)]
    pub reserved1: u8,
}

impl PersistentReserveServiceActionIn {
    pub fn service_action(&self) -> ServiceActionIn {
        ServiceActionIn(self.service_action_bits())
    }

    pub fn with_service_action(self, act: ServiceActionIn) -> Self {
        self.with_service_action_bits(act.0)
    }
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PersistentReserveServiceActionOut {
    #[bits(5)]
    service_action_bits: u8,
    #[bits(3)]
    pub reserved1: u8,
}

impl PersistentReserveServiceActionOut {
    pub fn service_action(&self) -> ServiceActionOut {
        ServiceActionOut(self.service_action_bits())
    }

    pub fn with_service_action(self, act: ServiceActionOut) -> Self {
        self.with_service_action_bits(act.0)
    }
}

//
// PERSISTENT_RESERVE_* definitions
//
open_enum! {
    pub enum ServiceActionIn: u8 {
        READ_KEYS = 0x00,
        READ_RESERVATIONS = 0x01,
        REPORT_CAPABILITIES = 0x02,
        READ_FULL_STATUS = 0x03,
    }
}

open_enum! {
    pub enum ServiceActionOut: u8 {
        REGISTER = 0x00,
        RESERVE = 0x01,
        RELEASE = 0x02,
        CLEAR = 0x03,
        PREEMPT = 0x04,
        PREEMPT_ABORT = 0x05,
        REGISTER_IGNORE_EXISTING = 0x06,
        REGISTER_AND_MOVE = 0x07,
        REPLACE_LOST_RESERVATION = 0x08,
    }
}

open_enum! {
    pub enum ReservationType: u8 {
        WRITE_EXCLUSIVE = 0x01,
        EXCLUSIVE = 0x03,
        WRITE_EXCLUSIVE_REGISTRANTS = 0x05,
        EXCLUSIVE_REGISTRANTS = 0x06,
        WRITE_EXCLUSIVE_ALL_REGISTRANTS = 0x07,
        EXCLUSIVE_ALL_REGISTRANTS = 0x08,
    }
}

impl ReservationType {
    /// Whether every registrant is a reservation holder.
    pub fn is_all_registrants(&self) -> bool {
        matches!(
            *self,
            Self::WRITE_EXCLUSIVE_ALL_REGISTRANTS | Self::EXCLUSIVE_ALL_REGISTRANTS
        )
    }

    /// Whether registrants (not just the holder) keep write access.
    pub fn is_registrants_only(&self) -> bool {
        matches!(
            *self,
            Self::WRITE_EXCLUSIVE_REGISTRANTS | Self::EXCLUSIVE_REGISTRANTS
        ) || self.is_all_registrants()
    }

    /// Whether reads are restricted as well as writes.
    pub fn is_exclusive_access(&self) -> bool {
        matches!(
            *self,
            Self::EXCLUSIVE | Self::EXCLUSIVE_REGISTRANTS | Self::EXCLUSIVE_ALL_REGISTRANTS
        )
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ProParameterList {
    pub reservation_key: U64BE,
    pub service_action_reservation_key: U64BE,
    pub obsolete: [u8; 4],
    pub flags: ProParameterListFlags,
    pub reserved3: u8,
    pub obsolete2: [u8; 2],
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct ProParameterListFlags {
    pub aptpl: bool,
    pub reserved1: bool,
    pub all_target_ports: bool,
    pub specify_initiator_ports: bool,
    #[bits(4)]
    pub reserved2: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PriReportCapabilities {
    pub length: U16BE,
    pub flags: PriReportCapabilitiesFlags,
    pub type_mask: PriReportCapabilitiesTypeMask,
    pub reserved7: [u8; 2],
}

#[bitfield(u16)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PriReportCapabilitiesFlags {
    pub persist_through_power_loss_capable: bool,
    _reserved: bool,
    pub all_target_ports_capable: bool,
    pub specify_initiator_ports_capable: bool,
    pub compatible_reservation_handling: bool,
    #[bits(2)]
    _reserved1: u8,
    pub replace_lost_reservation_capable: bool,
    pub persist_through_power_loss_activated: bool,
    #[bits(3)]
    _reserved2: u8,
    #[bits(3)]
    pub allow_commands: u8,
    pub type_mask_valid: bool,
}

#[bitfield(u16)]
#[derive(PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PriReportCapabilitiesTypeMask {
    _reserved: bool,
    pub write_exclusive: bool,
    _reserved2: bool,
    pub exclusive_access: bool,
    _reserved3: bool,
    pub write_exclusive_registrants_only: bool,
    pub exclusive_access_registrants_only: bool,
    pub write_exclusive_all_registrants: bool,
    pub exclusive_access_all_registrants: bool,
    #[bits(7)]
    _reserved4: u8,
}

impl PriReportCapabilitiesTypeMask {
    pub fn supports(&self, ty: ReservationType) -> bool {
        match ty {
            ReservationType::WRITE_EXCLUSIVE => self.write_exclusive(),
            ReservationType::EXCLUSIVE => self.exclusive_access(),
            ReservationType::WRITE_EXCLUSIVE_REGISTRANTS => {
                self.write_exclusive_registrants_only()
            }
            ReservationType::EXCLUSIVE_REGISTRANTS => self.exclusive_access_registrants_only(),
            ReservationType::WRITE_EXCLUSIVE_ALL_REGISTRANTS => {
                self.write_exclusive_all_registrants()
            }
            ReservationType::EXCLUSIVE_ALL_REGISTRANTS => self.exclusive_access_all_registrants(),
            _ => false,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PriRegistrationListHeader {
    pub generation: U32BE,
    pub additional_length: U32BE,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PriReservationListHeader {
    pub generation: U32BE,
    pub additional_length: U32BE,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PriReservationDescriptor {
    pub reservation_key: U64BE,
    pub obsolete: [u8; 4],
    pub reserved: u8,
    pub type_scope: PersistentReserveTypeScope,
    pub obsolete2: [u8; 2],
}
