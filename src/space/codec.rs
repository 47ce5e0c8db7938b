//! Index record codec
//!
//! Binary records for container index dumps. Integers are unsigned LEB128
//! varints.
//!
//! ## Record Format
//! ```text
//! Container header:
//! ┌────────┬────┬──────┬────────────┬───────────┬────────────────┬──────────┐
//! │ 3 (1)  │ id │ size │ file_count │ file_size │ file_real_size │ flag (1) │
//! └────────┴────┴──────┴────────────┴───────────┴────────────────┴──────────┘
//!   flag: 11 = backing file created, 10 = not created
//!
//! File record:
//! ┌────────┬──────────┬──────┬──────┬──────┬─────────┬─────────────┐
//! │ 1 (1)  │ name_len │ time │ size │ name │ md5(16) │ Hole record │
//! └────────┴──────────┴──────┴──────┴──────┴─────────┴─────────────┘
//!
//! Hole record:
//! ┌────────┬────────────┬────────┐
//! │ 0 (1)  │ size_class │ offset │
//! └────────┴────────────┴────────┘
//! ```

use std::io::{self, Read};

use bytes::{BufMut, BytesMut};

use crate::error::{AtlasError, Result};
use crate::size_class::SizeClass;

pub const TAG_HOLE: u8 = 0;
pub const TAG_FILE: u8 = 1;
pub const TAG_CONTAINER: u8 = 3;

pub const FLAG_CREATED: u8 = 11;
pub const FLAG_NOT_CREATED: u8 = 10;

/// Longest file name accepted from a dump
pub const MAX_NAME_LEN: u64 = 64 * 1024;

const MAX_VARINT_LEN: usize = 10;

// =============================================================================
// Varints
// =============================================================================

pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = read_u8(reader)?;
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(AtlasError::Corruption("varint overflows u64".to_string()));
        }
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(AtlasError::Corruption("varint overflows u64".to_string()))
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    read_exact(reader, &mut byte)?;
    Ok(byte[0])
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            AtlasError::Corruption("index truncated inside a record".to_string())
        }
        _ => AtlasError::Io(e),
    })
}

/// Next tag byte, or `None` at a clean end of stream
fn read_tag<R: Read>(reader: &mut R) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_class<R: Read>(reader: &mut R) -> Result<SizeClass> {
    let class = read_varint(reader)?;
    SizeClass::try_from(class)
        .map_err(|_| AtlasError::Corruption(format!("size class {} out of range", class)))
}

// =============================================================================
// Container Header
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub id: u64,
    pub size: u64,
    pub file_count: u64,
    pub file_size: u64,
    pub file_real_size: u64,
    pub created: bool,
}

impl ContainerHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(TAG_CONTAINER);
        put_varint(buf, self.id);
        put_varint(buf, self.size);
        put_varint(buf, self.file_count);
        put_varint(buf, self.file_size);
        put_varint(buf, self.file_real_size);
        buf.put_u8(if self.created {
            FLAG_CREATED
        } else {
            FLAG_NOT_CREATED
        });
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        match read_tag(reader)? {
            Some(TAG_CONTAINER) => {}
            Some(tag) => {
                return Err(AtlasError::Corruption(format!(
                    "expected container header, got tag {}",
                    tag
                )))
            }
            None => return Err(AtlasError::Corruption("empty index".to_string())),
        }

        let id = read_varint(reader)?;
        let size = read_varint(reader)?;
        let file_count = read_varint(reader)?;
        let file_size = read_varint(reader)?;
        let file_real_size = read_varint(reader)?;
        let created = match read_u8(reader)? {
            FLAG_CREATED => true,
            FLAG_NOT_CREATED => false,
            flag => {
                return Err(AtlasError::Corruption(format!(
                    "unknown container flag {}",
                    flag
                )))
            }
        };

        Ok(Self {
            id,
            size,
            file_count,
            file_size,
            file_real_size,
            created,
        })
    }
}

// =============================================================================
// Chain Records
// =============================================================================

/// Geometry of one chain node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoleRecord {
    pub size_class: SizeClass,
    pub offset: u64,
}

impl HoleRecord {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(TAG_HOLE);
        put_varint(buf, self.size_class as u64);
        put_varint(buf, self.offset);
    }

    fn decode_body<R: Read>(reader: &mut R) -> Result<Self> {
        let size_class = read_class(reader)?;
        let offset = read_varint(reader)?;
        Ok(Self { size_class, offset })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub time: u64,
    pub size: u64,
    pub md5: [u8; 16],
    pub hole: HoleRecord,
}

impl FileRecord {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(TAG_FILE);
        put_varint(buf, self.name.len() as u64);
        put_varint(buf, self.time);
        put_varint(buf, self.size);
        buf.put_slice(self.name.as_bytes());
        buf.put_slice(&self.md5);
        self.hole.encode(buf);
    }

    fn decode_body<R: Read>(reader: &mut R) -> Result<Self> {
        let name_len = read_varint(reader)?;
        if name_len > MAX_NAME_LEN {
            return Err(AtlasError::Corruption(format!(
                "file name length {} exceeds {}",
                name_len, MAX_NAME_LEN
            )));
        }
        let time = read_varint(reader)?;
        let size = read_varint(reader)?;

        let mut name = vec![0u8; name_len as usize];
        read_exact(reader, &mut name)?;
        let name = String::from_utf8(name)
            .map_err(|_| AtlasError::Corruption("file name is not UTF-8".to_string()))?;

        let mut md5 = [0u8; 16];
        read_exact(reader, &mut md5)?;

        let hole = match read_tag(reader)? {
            Some(TAG_HOLE) => HoleRecord::decode_body(reader)?,
            _ => {
                return Err(AtlasError::Corruption(format!(
                    "file {} has no geometry record",
                    name
                )))
            }
        };

        Ok(Self {
            name,
            time,
            size,
            md5,
            hole,
        })
    }
}

/// One dumped chain node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    File(FileRecord),
    Hole(HoleRecord),
}

impl Record {
    pub fn geometry(&self) -> HoleRecord {
        match self {
            Record::File(file) => file.hole,
            Record::Hole(hole) => *hole,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Record::File(file) => file.encode(buf),
            Record::Hole(hole) => hole.encode(buf),
        }
    }

    /// Next record, or `None` when the stream ends on a record boundary
    pub fn decode<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        match read_tag(reader)? {
            None => Ok(None),
            Some(TAG_HOLE) => Ok(Some(Record::Hole(HoleRecord::decode_body(reader)?))),
            Some(TAG_FILE) => Ok(Some(Record::File(FileRecord::decode_body(reader)?))),
            Some(tag) => Err(AtlasError::Corruption(format!("unknown record tag {}", tag))),
        }
    }
}
