//! CFDP wire format: the fixed PDU header and the file directive codes.
//!
//! Layout follows CCSDS 727.0-B-5 §5.1 (fixed PDU header) and §5.2
//! (file directive PDUs). The router only reads PDUs, it never rewrites
//! them, so everything here is a borrowed view over the stored bytes.
//!
//! The 4-octet fixed prefix is a zerocopy struct. The variable part
//! (entity IDs and transaction sequence number) is decoded by hand since
//! its width is given by the prefix.

use std::fmt;

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Version field value for CFDP version 2 (CCSDS 727.0-B-4 onwards).
pub const CFDP_VERSION: u8 = 0b001;

/// Length of the fixed part of the PDU header.
pub const FIXED_HEADER_LEN: usize = 4;

/// Smallest possible header: fixed part plus one-octet source ID,
/// sequence number and destination ID.
pub const MIN_HEADER_LEN: usize = FIXED_HEADER_LEN + 3;

/// Widest entity ID or sequence number the 3-bit length fields allow.
pub const MAX_FIELD_LEN: usize = 8;

/// Lower nibble of the ACK subfield when a Finished PDU is acknowledged.
/// EOF acknowledgements use subtype 0b0000.
pub const ACK_SUBTYPE_FINISHED: u8 = 0b0001;

const VERSION_SHIFT: u8 = 5;
const PDU_TYPE_BIT: u8 = 0x10;
const DIRECTION_BIT: u8 = 0x08;
const MODE_BIT: u8 = 0x04;
const CRC_BIT: u8 = 0x02;
const LARGE_FILE_BIT: u8 = 0x01;

const SEGMENTATION_BIT: u8 = 0x80;
const ENTITY_LEN_SHIFT: u8 = 4;
const SEGMENT_METADATA_BIT: u8 = 0x08;
const LEN_MASK: u8 = 0x07;

// ── Fixed Header ──────────────────────────────────────────────────────────────

/// The first four octets of every CFDP PDU.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FixedHeader {
    /// version(3) | pdu type(1) | direction(1) | transmission mode(1) |
    /// CRC flag(1) | large file flag(1)
    pub flags: u8,

    /// Length of the PDU data field in octets, big-endian.
    pub data_field_len: [u8; 2],

    /// segmentation control(1) | entity ID length - 1 (3) |
    /// segment metadata flag(1) | sequence number length - 1 (3)
    pub id_lengths: u8,
}

assert_eq_size!(FixedHeader, [u8; FIXED_HEADER_LEN]);

impl FixedHeader {
    pub fn version(&self) -> u8 {
        self.flags >> VERSION_SHIFT
    }

    pub fn pdu_type(&self) -> PduType {
        if self.flags & PDU_TYPE_BIT != 0 {
            PduType::FileData
        } else {
            PduType::FileDirective
        }
    }

    pub fn data_field_len(&self) -> usize {
        u16::from_be_bytes(self.data_field_len) as usize
    }

    pub fn entity_id_len(&self) -> usize {
        ((self.id_lengths >> ENTITY_LEN_SHIFT) & LEN_MASK) as usize + 1
    }

    pub fn seq_num_len(&self) -> usize {
        (self.id_lengths & LEN_MASK) as usize + 1
    }

    /// Octets taken by the whole header, fixed and variable parts.
    pub fn header_len(&self) -> usize {
        FIXED_HEADER_LEN + 2 * self.entity_id_len() + self.seq_num_len()
    }
}

// ── Header Fields ─────────────────────────────────────────────────────────────

/// PDU type bit of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    /// Carries a file directive code in data field octet 0.
    FileDirective = 0,
    /// Carries file segment data. No directive code.
    FileData = 1,
}

/// Direction bit: which side of the transaction the PDU travels to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TowardReceiver,
    TowardSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMode {
    Acknowledged,
    Unacknowledged,
}

/// Source entity ID plus transaction sequence number.
/// Unique for every transaction in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
    pub source_entity_id: u64,
    pub seq_num: u64,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_entity_id, self.seq_num)
    }
}

// ── Header Reader ─────────────────────────────────────────────────────────────

/// Parsed view over a stored PDU.
///
/// Borrows the buffer, so it is only valid while the store slot is held.
/// Construction checks every length field against the buffer; a value of
/// this type always has a complete header and data field behind it.
#[derive(Debug, Clone)]
pub struct PduHeader<'a> {
    fixed: FixedHeader,
    source_entity_id: u64,
    seq_num: u64,
    dest_entity_id: u64,
    data_field: &'a [u8],
}

impl<'a> PduHeader<'a> {
    /// Parse the header of the PDU at the start of `buf`.
    ///
    /// Only version `0b001` headers are accepted. CFDP version 1 PDUs
    /// (`0b000`) fail with [`WireError::UnsupportedVersion`]. Bytes past the
    /// declared data field are ignored.
    pub fn parse(buf: &'a [u8]) -> Result<Self, WireError> {
        let fixed = FixedHeader::read_from_prefix(buf).ok_or(WireError::HeaderTooShort {
            needed: FIXED_HEADER_LEN,
            actual: buf.len(),
        })?;

        let version = fixed.version();
        if version != CFDP_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let header_len = fixed.header_len();
        if buf.len() < header_len {
            return Err(WireError::HeaderTooShort {
                needed: header_len,
                actual: buf.len(),
            });
        }

        let entity_len = fixed.entity_id_len();
        let seq_len = fixed.seq_num_len();
        let mut offset = FIXED_HEADER_LEN;
        let source_entity_id = read_be(&buf[offset..offset + entity_len]);
        offset += entity_len;
        let seq_num = read_be(&buf[offset..offset + seq_len]);
        offset += seq_len;
        let dest_entity_id = read_be(&buf[offset..offset + entity_len]);

        let declared = fixed.data_field_len();
        let available = buf.len() - header_len;
        if declared > available {
            return Err(WireError::DataFieldTruncated {
                declared,
                available,
            });
        }

        Ok(Self {
            fixed,
            source_entity_id,
            seq_num,
            dest_entity_id,
            data_field: &buf[header_len..header_len + declared],
        })
    }

    pub fn pdu_type(&self) -> PduType {
        self.fixed.pdu_type()
    }

    pub fn direction(&self) -> Direction {
        if self.fixed.flags & DIRECTION_BIT != 0 {
            Direction::TowardSender
        } else {
            Direction::TowardReceiver
        }
    }

    pub fn transmission_mode(&self) -> TransmissionMode {
        if self.fixed.flags & MODE_BIT != 0 {
            TransmissionMode::Unacknowledged
        } else {
            TransmissionMode::Acknowledged
        }
    }

    pub fn crc_flag(&self) -> bool {
        self.fixed.flags & CRC_BIT != 0
    }

    pub fn large_file(&self) -> bool {
        self.fixed.flags & LARGE_FILE_BIT != 0
    }

    pub fn segmentation_control(&self) -> bool {
        self.fixed.id_lengths & SEGMENTATION_BIT != 0
    }

    pub fn segment_metadata(&self) -> bool {
        self.fixed.id_lengths & SEGMENT_METADATA_BIT != 0
    }

    pub fn entity_id_len(&self) -> usize {
        self.fixed.entity_id_len()
    }

    pub fn seq_num_len(&self) -> usize {
        self.fixed.seq_num_len()
    }

    pub fn source_entity_id(&self) -> u64 {
        self.source_entity_id
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn dest_entity_id(&self) -> u64 {
        self.dest_entity_id
    }

    pub fn transaction_id(&self) -> TransactionId {
        TransactionId {
            source_entity_id: self.source_entity_id,
            seq_num: self.seq_num,
        }
    }

    pub fn header_len(&self) -> usize {
        self.fixed.header_len()
    }

    /// Header plus data field.
    pub fn pdu_len(&self) -> usize {
        self.header_len() + self.data_field.len()
    }

    /// The PDU data field, or `None` for a header-only PDU.
    pub fn data_field(&self) -> Option<&'a [u8]> {
        if self.data_field.is_empty() {
            None
        } else {
            Some(self.data_field)
        }
    }
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

// ── Header Writer ─────────────────────────────────────────────────────────────

/// Field values for building a PDU. Used by ground tooling and tests;
/// the router itself never serializes.
#[derive(Debug, Clone)]
pub struct PduHeaderFields {
    pub pdu_type: PduType,
    pub direction: Direction,
    pub transmission_mode: TransmissionMode,
    pub crc_flag: bool,
    pub large_file: bool,
    pub segmentation_control: bool,
    pub segment_metadata: bool,
    /// Octets per entity ID, 1..=8.
    pub entity_id_len: usize,
    /// Octets for the sequence number, 1..=8.
    pub seq_num_len: usize,
    pub source_entity_id: u64,
    pub seq_num: u64,
    pub dest_entity_id: u64,
}

impl Default for PduHeaderFields {
    fn default() -> Self {
        Self {
            pdu_type: PduType::FileDirective,
            direction: Direction::TowardReceiver,
            transmission_mode: TransmissionMode::Acknowledged,
            crc_flag: false,
            large_file: false,
            segmentation_control: false,
            segment_metadata: false,
            entity_id_len: 1,
            seq_num_len: 1,
            source_entity_id: 0,
            seq_num: 0,
            dest_entity_id: 0,
        }
    }
}

impl PduHeaderFields {
    /// Encode a full PDU: header followed by `data_field`.
    pub fn to_pdu(&self, data_field: &[u8]) -> Result<Vec<u8>, WireError> {
        check_width("entity ID", self.entity_id_len, self.source_entity_id)?;
        check_width("entity ID", self.entity_id_len, self.dest_entity_id)?;
        check_width("sequence number", self.seq_num_len, self.seq_num)?;
        let data_len = u16::try_from(data_field.len())
            .map_err(|_| WireError::DataFieldTooLarge(data_field.len()))?;

        let mut flags = CFDP_VERSION << VERSION_SHIFT;
        if self.pdu_type == PduType::FileData {
            flags |= PDU_TYPE_BIT;
        }
        if self.direction == Direction::TowardSender {
            flags |= DIRECTION_BIT;
        }
        if self.transmission_mode == TransmissionMode::Unacknowledged {
            flags |= MODE_BIT;
        }
        if self.crc_flag {
            flags |= CRC_BIT;
        }
        if self.large_file {
            flags |= LARGE_FILE_BIT;
        }

        let mut id_lengths = ((self.entity_id_len as u8 - 1) << ENTITY_LEN_SHIFT)
            | (self.seq_num_len as u8 - 1);
        if self.segmentation_control {
            id_lengths |= SEGMENTATION_BIT;
        }
        if self.segment_metadata {
            id_lengths |= SEGMENT_METADATA_BIT;
        }

        let fixed = FixedHeader {
            flags,
            data_field_len: data_len.to_be_bytes(),
            id_lengths,
        };

        let mut out = Vec::with_capacity(fixed.header_len() + data_field.len());
        out.extend_from_slice(fixed.as_bytes());
        write_be(&mut out, self.source_entity_id, self.entity_id_len);
        write_be(&mut out, self.seq_num, self.seq_num_len);
        write_be(&mut out, self.dest_entity_id, self.entity_id_len);
        out.extend_from_slice(data_field);
        Ok(out)
    }
}

fn check_width(field: &'static str, len: usize, value: u64) -> Result<(), WireError> {
    if !(1..=MAX_FIELD_LEN).contains(&len) {
        return Err(WireError::FieldLength { field, len });
    }
    if len < MAX_FIELD_LEN && value >> (8 * len) != 0 {
        return Err(WireError::FieldOverflow { field, len, value });
    }
    Ok(())
}

fn write_be(out: &mut Vec<u8>, value: u64, len: usize) {
    out.extend_from_slice(&value.to_be_bytes()[MAX_FIELD_LEN - len..]);
}

// ── File Directives ───────────────────────────────────────────────────────────

/// File directive code, data field octet 0 of a directive PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileDirective {
    Eof = 0x04,
    Finished = 0x05,
    Ack = 0x06,
    Metadata = 0x07,
    Nak = 0x08,
    Prompt = 0x09,
    KeepAlive = 0x0c,
}

impl FileDirective {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FileDirective {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x04 => Ok(FileDirective::Eof),
            0x05 => Ok(FileDirective::Finished),
            0x06 => Ok(FileDirective::Ack),
            0x07 => Ok(FileDirective::Metadata),
            0x08 => Ok(FileDirective::Nak),
            0x09 => Ok(FileDirective::Prompt),
            0x0c => Ok(FileDirective::KeepAlive),
            other => Err(WireError::InvalidDirectiveCode(other)),
        }
    }
}

impl From<FileDirective> for u8 {
    fn from(d: FileDirective) -> u8 {
        d as u8
    }
}

/// The directive an ACK PDU acknowledges. Only EOF and Finished PDUs
/// are ever acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckedDirective {
    Eof,
    Finished,
}

impl AckedDirective {
    pub fn directive(self) -> FileDirective {
        match self {
            AckedDirective::Eof => FileDirective::Eof,
            AckedDirective::Finished => FileDirective::Finished,
        }
    }

    /// The ACK data field octet 1 for this acknowledgement: directive code
    /// in the upper nibble, directive subtype code in the lower nibble.
    pub fn subfield(self) -> u8 {
        let subtype = match self {
            AckedDirective::Eof => 0,
            AckedDirective::Finished => ACK_SUBTYPE_FINISHED,
        };
        (self.directive().code() << 4) | subtype
    }
}

impl TryFrom<u8> for AckedDirective {
    type Error = WireError;

    /// Decode ACK data field octet 1. The subtype nibble does not take
    /// part in validation.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value >> 4 {
            0x04 => Ok(AckedDirective::Eof),
            0x05 => Ok(AckedDirective::Finished),
            _ => Err(WireError::InvalidAckedDirective(value)),
        }
    }
}

/// Read the directive code from a directive PDU's data field.
pub fn classify_directive(data_field: &[u8]) -> Result<FileDirective, WireError> {
    let code = *data_field.first().ok_or(WireError::EmptyDataField)?;
    FileDirective::try_from(code)
}

/// Read the acknowledged directive from an ACK PDU's data field.
pub fn classify_acked_directive(data_field: &[u8]) -> Result<AckedDirective, WireError> {
    match data_field.get(1) {
        Some(&subfield) => AckedDirective::try_from(subfield),
        None => Err(WireError::AckFieldTooShort(data_field.len())),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("header needs {needed} bytes, buffer has {actual}")]
    HeaderTooShort { needed: usize, actual: usize },

    #[error("unsupported CFDP version: {0:#05b}")]
    UnsupportedVersion(u8),

    #[error("data field length {declared} exceeds the {available} bytes after the header")]
    DataFieldTruncated { declared: usize, available: usize },

    #[error("directive PDU has an empty data field")]
    EmptyDataField,

    #[error("unknown file directive code: 0x{0:02x}")]
    InvalidDirectiveCode(u8),

    #[error("unknown acknowledged directive subfield: 0x{0:02x}")]
    InvalidAckedDirective(u8),

    #[error("ACK data field too short: {0} bytes")]
    AckFieldTooShort(usize),

    #[error("{field} length {len} outside 1..=8")]
    FieldLength { field: &'static str, len: usize },

    #[error("{field} value {value} does not fit in {len} bytes")]
    FieldOverflow {
        field: &'static str,
        len: usize,
        value: u64,
    },

    #[error("data field of {0} bytes exceeds the 16-bit length field")]
    DataFieldTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
