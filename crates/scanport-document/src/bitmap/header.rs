// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DIB header parsing.
//
// Layout at offset 0 of a transferred buffer (little-endian):
//
//   0  u32  header size (offset of the colour table)
//   4  i32  width in pixels
//   8  i32  height in pixels; positive = bottom-up rows, otherwise top-down
//  12  u16  planes (ignored)
//  14  u16  bits per pixel

use scanport_core::error::{Result, ScanportError};

/// Bytes that must be present to read every field we use.
pub const MIN_HEADER_LEN: usize = 16;

/// Bit depths the decoder can reconstruct.
pub const SUPPORTED_BIT_DEPTHS: &[u16] = &[1, 4, 8, 24, 32];

/// Row length in bytes, padded to a 4-byte boundary.
pub fn stride(width: u32, bit_depth: u16) -> usize {
    (width as usize * bit_depth as usize).div_ceil(32) * 4
}

/// Size of the colour table that follows the header.
pub fn color_table_size(bit_depth: u16) -> usize {
    if bit_depth <= 8 {
        (1usize << bit_depth) * 4
    } else {
        0
    }
}

/// Fields recovered from the start of a DIB buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DibHeader {
    pub header_size: u32,
    pub width: i32,
    pub height: i32,
    pub bit_depth: u16,
}

impl DibHeader {
    /// Parse and sanity-check the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_HEADER_LEN {
            return Err(ScanportError::Decode(format!(
                "buffer of {} bytes is too short for a bitmap header",
                bytes.len()
            )));
        }

        let header = Self {
            header_size: read_u32(bytes, 0)?,
            width: read_i32(bytes, 4)?,
            height: read_i32(bytes, 8)?,
            bit_depth: read_u16(bytes, 14)?,
        };

        if (header.header_size as usize) < MIN_HEADER_LEN {
            return Err(ScanportError::Decode(format!(
                "header size {} is smaller than the fixed fields",
                header.header_size
            )));
        }
        if header.width <= 0 {
            return Err(ScanportError::Decode(format!(
                "invalid bitmap width {}",
                header.width
            )));
        }
        if header.height == 0 {
            return Err(ScanportError::Decode("bitmap height is zero".into()));
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&header.bit_depth) {
            return Err(ScanportError::Decode(format!(
                "unsupported bit depth {}",
                header.bit_depth
            )));
        }
        Ok(header)
    }

    pub fn width_px(&self) -> u32 {
        self.width.unsigned_abs()
    }

    pub fn abs_height(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Positive heights store the last image row first.
    pub fn is_bottom_up(&self) -> bool {
        self.height > 0
    }

    pub fn stride(&self) -> usize {
        stride(self.width_px(), self.bit_depth)
    }

    pub fn color_table_size(&self) -> usize {
        color_table_size(self.bit_depth)
    }

    /// Offset of the first pixel row.
    pub fn pixel_offset(&self) -> usize {
        self.header_size as usize + self.color_table_size()
    }

    /// Total bytes the header says the buffer must hold.
    pub fn required_len(&self) -> Option<usize> {
        self.stride()
            .checked_mul(self.abs_height() as usize)?
            .checked_add(self.pixel_offset())
    }
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            ScanportError::Decode(format!("header field at offset {offset} is out of bounds"))
        })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    field::<4>(bytes, offset).map(u32::from_le_bytes)
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32> {
    field::<4>(bytes, offset).map(i32::from_le_bytes)
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    field::<2>(bytes, offset).map(u16::from_le_bytes)
}
