//! Minimal little-endian TIFF reader used by the encoder tests.

use std::collections::HashMap;

use crate::pipeline::dng::tags;

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// BYTE, SHORT, LONG and UNDEFINED values widened to u64.
    Integers(Vec<u64>),
    Ascii(String),
    Rationals(Vec<(u32, u32)>),
    SRationals(Vec<(i32, i32)>),
}

#[derive(Debug, Default)]
pub struct ParsedIfd {
    pub tags: HashMap<u16, TagValue>,
    /// Tag numbers in on-disk IFD order.
    pub order: Vec<u16>,
}

impl ParsedIfd {
    pub fn get(&self, tag: u16) -> Option<&TagValue> {
        self.tags.get(&tag)
    }

    pub fn values(&self, tag: u16) -> Option<Vec<u64>> {
        match self.tags.get(&tag)? {
            TagValue::Integers(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn long(&self, tag: u16) -> Option<u32> {
        self.values(tag)?.first().map(|&v| v as u32)
    }

    pub fn short(&self, tag: u16) -> Option<u16> {
        self.values(tag)?.first().map(|&v| v as u16)
    }

    pub fn ascii(&self, tag: u16) -> Option<String> {
        match self.tags.get(&tag)? {
            TagValue::Ascii(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn rational(&self, tag: u16) -> Option<f64> {
        match self.tags.get(&tag)? {
            TagValue::Rationals(v) => v.first().map(|&(n, d)| n as f64 / d as f64),
            TagValue::SRationals(v) => v.first().map(|&(n, d)| n as f64 / d as f64),
            _ => None,
        }
    }

    /// The raw image strip, located via the offset/count tags.
    pub fn strip(&self, file: &[u8]) -> Vec<u8> {
        let offset = self.long(tags::STRIP_OFFSETS).unwrap() as usize;
        let count = self.long(tags::STRIP_BYTE_COUNTS).unwrap() as usize;
        file[offset..offset + count].to_vec()
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn type_size(field_type: u16) -> usize {
    match field_type {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 => 4,
        5 | 10 | 12 => 8,
        _ => panic!("unknown field type {field_type}"),
    }
}

/// Parse the first IFD of a little-endian TIFF.
pub fn parse_dng(file: &[u8]) -> ParsedIfd {
    assert_eq!(&file[0..2], b"II", "not little-endian TIFF");
    assert_eq!(read_u16(file, 2), 42);

    let ifd_offset = read_u32(file, 4) as usize;
    let entry_count = read_u16(file, ifd_offset) as usize;

    let mut parsed = ParsedIfd::default();
    for i in 0..entry_count {
        let base = ifd_offset + 2 + i * 12;
        let tag = read_u16(file, base);
        let field_type = read_u16(file, base + 2);
        let count = read_u32(file, base + 4) as usize;

        let byte_len = count * type_size(field_type);
        let data_offset = if byte_len <= 4 {
            base + 8
        } else {
            read_u32(file, base + 8) as usize
        };
        let data = &file[data_offset..data_offset + byte_len];

        let value = match field_type {
            1 | 7 => TagValue::Integers(data.iter().map(|&b| b as u64).collect()),
            2 => {
                let text = data
                    .split(|&b| b == 0)
                    .next()
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .unwrap_or_default();
                TagValue::Ascii(text)
            }
            3 => TagValue::Integers(
                (0..count).map(|j| read_u16(data, j * 2) as u64).collect(),
            ),
            4 => TagValue::Integers(
                (0..count).map(|j| read_u32(data, j * 4) as u64).collect(),
            ),
            5 => TagValue::Rationals(
                (0..count)
                    .map(|j| (read_u32(data, j * 8), read_u32(data, j * 8 + 4)))
                    .collect(),
            ),
            10 => TagValue::SRationals(
                (0..count)
                    .map(|j| {
                        (
                            read_u32(data, j * 8) as i32,
                            read_u32(data, j * 8 + 4) as i32,
                        )
                    })
                    .collect(),
            ),
            other => panic!("unhandled field type {other}"),
        };

        parsed.order.push(tag);
        parsed.tags.insert(tag, value);
    }

    parsed
}
