//! Little-endian single-IFD TIFF assembly.
//!
//! The encoder collects typed tag values, then lays the file out as header,
//! image strip, IFD, and out-of-line value area. Entry order and value
//! placement are deterministic, so identical inputs produce identical bytes.

use crate::pipeline::dng::tags::{
    self, TYPE_ASCII, TYPE_BYTE, TYPE_LONG, TYPE_RATIONAL, TYPE_SHORT, TYPE_SRATIONAL,
    TYPE_UNDEFINED,
};
use crate::pipeline::error::{RenderError, Result};

struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    /// Raw little-endian value bytes, before inline/offset placement.
    payload: Vec<u8>,
}

/// Builder for one DNG image file.
pub struct DngEncoder {
    entries: Vec<IfdEntry>,
    strip: Vec<u8>,
}

impl DngEncoder {
    /// Start an encoder around the packed image strip.
    pub fn new(strip: Vec<u8>) -> Self {
        Self {
            entries: Vec::with_capacity(40),
            strip,
        }
    }

    fn push(&mut self, tag: u16, field_type: u16, count: u32, payload: Vec<u8>) {
        // Last write wins so callers may overwrite defaults.
        self.entries.retain(|e| e.tag != tag);
        self.entries.push(IfdEntry {
            tag,
            field_type,
            count,
            payload,
        });
    }

    pub fn set_short(&mut self, tag: u16, value: u16) {
        self.set_shorts(tag, &[value]);
    }

    pub fn set_shorts(&mut self, tag: u16, values: &[u16]) {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(tag, TYPE_SHORT, values.len() as u32, payload);
    }

    pub fn set_long(&mut self, tag: u16, value: u32) {
        self.set_longs(tag, &[value]);
    }

    pub fn set_longs(&mut self, tag: u16, values: &[u32]) {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(tag, TYPE_LONG, values.len() as u32, payload);
    }

    pub fn set_bytes(&mut self, tag: u16, values: &[u8]) {
        self.push(tag, TYPE_BYTE, values.len() as u32, values.to_vec());
    }

    pub fn set_undefined(&mut self, tag: u16, values: &[u8]) {
        self.push(tag, TYPE_UNDEFINED, values.len() as u32, values.to_vec());
    }

    pub fn set_ascii(&mut self, tag: u16, value: &str) {
        let mut payload = value.as_bytes().to_vec();
        payload.push(0);
        self.push(tag, TYPE_ASCII, payload.len() as u32, payload);
    }

    pub fn set_rational(&mut self, tag: u16, numerator: u32, denominator: u32) {
        self.set_rationals(tag, &[(numerator, denominator)]);
    }

    pub fn set_rationals(&mut self, tag: u16, values: &[(u32, u32)]) {
        let mut payload = Vec::with_capacity(values.len() * 8);
        for (num, den) in values {
            payload.extend_from_slice(&num.to_le_bytes());
            payload.extend_from_slice(&den.to_le_bytes());
        }
        self.push(tag, TYPE_RATIONAL, values.len() as u32, payload);
    }

    pub fn set_srational(&mut self, tag: u16, numerator: i32, denominator: i32) {
        self.set_srationals(tag, &[(numerator, denominator)]);
    }

    pub fn set_srationals(&mut self, tag: u16, values: &[(i32, i32)]) {
        let mut payload = Vec::with_capacity(values.len() * 8);
        for (num, den) in values {
            payload.extend_from_slice(&num.to_le_bytes());
            payload.extend_from_slice(&den.to_le_bytes());
        }
        self.push(tag, TYPE_SRATIONAL, values.len() as u32, payload);
    }

    /// Matrix tags are written as 1/10000-precision signed rationals.
    pub fn set_matrix(&mut self, tag: u16, matrix: &[f32; 9]) {
        let values: Vec<(i32, i32)> = matrix
            .iter()
            .map(|&v| ((v * 10000.0).round() as i32, 10000))
            .collect();
        self.set_srationals(tag, &values);
    }

    /// Serialize to the final DNG byte stream.
    pub fn encode(mut self) -> Result<Vec<u8>> {
        if self.strip.is_empty() {
            return Err(RenderError::Encode("empty image strip".to_string()));
        }

        const HEADER_LEN: usize = 8;
        let strip_offset = HEADER_LEN;

        self.set_longs(tags::STRIP_OFFSETS, &[strip_offset as u32]);
        self.set_longs(tags::STRIP_BYTE_COUNTS, &[self.strip.len() as u32]);

        // TIFF requires ascending tag order inside the IFD.
        self.entries.sort_by_key(|e| e.tag);

        let mut ifd_offset = HEADER_LEN + self.strip.len();
        ifd_offset += ifd_offset % 2;

        let entry_count = self.entries.len();
        // Count field + entries + next-IFD pointer.
        let value_area_start = ifd_offset + 2 + entry_count * 12 + 4;

        let mut out = Vec::with_capacity(value_area_start + 256);
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
        out.extend_from_slice(&self.strip);
        while out.len() < ifd_offset {
            out.push(0);
        }

        out.extend_from_slice(&(entry_count as u16).to_le_bytes());

        let mut value_area: Vec<u8> = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(&entry.tag.to_le_bytes());
            out.extend_from_slice(&entry.field_type.to_le_bytes());
            out.extend_from_slice(&entry.count.to_le_bytes());

            if entry.payload.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..entry.payload.len()].copy_from_slice(&entry.payload);
                out.extend_from_slice(&inline);
            } else {
                let mut offset = value_area_start + value_area.len();
                if offset % 2 != 0 {
                    value_area.push(0);
                    offset += 1;
                }
                out.extend_from_slice(&(offset as u32).to_le_bytes());
                value_area.extend_from_slice(&entry.payload);
            }
        }

        // No chained IFDs.
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&value_area);

        Ok(out)
    }
}
