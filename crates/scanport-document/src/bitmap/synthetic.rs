// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Builders for DIB buffers in the layout drivers hand over. Used by the
// simulated driver, tests, and benchmarks.

const HEADER_SIZE: u32 = 40;

fn header(width: u32, height: i32, bit_depth: u16) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE as usize];
    bytes[0..4].copy_from_slice(&HEADER_SIZE.to_le_bytes());
    bytes[4..8].copy_from_slice(&(width as i32).to_le_bytes());
    bytes[8..12].copy_from_slice(&height.to_le_bytes());
    bytes[12..14].copy_from_slice(&1u16.to_le_bytes());
    bytes[14..16].copy_from_slice(&bit_depth.to_le_bytes());
    bytes
}

/// Image row stored at buffer row `stored` for the given orientation.
fn image_row(stored: u32, abs_height: u32, bottom_up: bool) -> u32 {
    if bottom_up { abs_height - 1 - stored } else { stored }
}

/// Build a 24- or 32-bit DIB. `pixel(x, y)` returns RGB for image
/// coordinates (row 0 at the top). Padding bytes are filled with `0xEE`.
/// Any depth other than 32 produces a 24-bit buffer.
pub fn rgb_dib(
    width: u32,
    height: i32,
    bit_depth: u16,
    pixel: impl Fn(u32, u32) -> [u8; 3],
) -> Vec<u8> {
    let bit_depth = if bit_depth == 32 { 32 } else { 24 };
    let abs_height = height.unsigned_abs();
    let stride = super::header::stride(width, bit_depth);
    let bytes_per_pixel = (bit_depth / 8) as usize;

    let mut bytes = header(width, height, bit_depth);
    for stored in 0..abs_height {
        let y = image_row(stored, abs_height, height > 0);
        let mut row = vec![0xEEu8; stride];
        for x in 0..width {
            let [r, g, b] = pixel(x, y);
            let at = x as usize * bytes_per_pixel;
            row[at] = b;
            row[at + 1] = g;
            row[at + 2] = r;
            if bytes_per_pixel == 4 {
                row[at + 3] = 0;
            }
        }
        bytes.extend_from_slice(&row);
    }
    bytes
}

/// Build an 8-bit palette DIB with a full 256-entry colour table.
pub fn indexed8_dib(
    width: u32,
    height: i32,
    palette: &[[u8; 3]],
    index: impl Fn(u32, u32) -> u8,
) -> Vec<u8> {
    indexed_dib(width, height, 8, palette, index)
}

/// Build a 1-, 4- or 8-bit palette DIB with a full colour table. Pixels are
/// packed most significant bits first; unused palette entries are black.
/// Any other depth produces an 8-bit buffer.
pub fn indexed_dib(
    width: u32,
    height: i32,
    bit_depth: u16,
    palette: &[[u8; 3]],
    index: impl Fn(u32, u32) -> u8,
) -> Vec<u8> {
    let bit_depth = if matches!(bit_depth, 1 | 4) { bit_depth } else { 8 };
    let abs_height = height.unsigned_abs();
    let stride = super::header::stride(width, bit_depth);
    let entries = 1usize << bit_depth;
    let depth = bit_depth as u32;
    let per_byte = 8 / depth;
    let mask = ((1u16 << depth) - 1) as u8;

    let mut bytes = header(width, height, bit_depth);
    for entry in 0..entries {
        let [r, g, b] = palette.get(entry).copied().unwrap_or([0, 0, 0]);
        bytes.extend_from_slice(&[b, g, r, 0]);
    }
    for stored in 0..abs_height {
        let y = image_row(stored, abs_height, height > 0);
        let mut row = vec![0u8; stride];
        for x in 0..width {
            let shift = 8 - depth * (x % per_byte + 1);
            row[(x / per_byte) as usize] |= (index(x, y) & mask) << shift;
        }
        bytes.extend_from_slice(&row);
    }
    bytes
}
