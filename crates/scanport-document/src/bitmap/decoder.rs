// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bitmap decoder — reconstructs an RGB raster from a driver DIB buffer and
// writes it as a JPEG named after the capture time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{DynamicImage, RgbImage};
use scanport_core::error::{Result, ScanportError};
use scanport_core::native::{LockedRegion, TransferMemory};
use tracing::{debug, info, instrument};

use super::header::DibHeader;
use crate::image::processor::ImageProcessor;

/// JPEG quality used for acquired pages.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Converts raw transfer buffers into image files.
#[derive(Debug, Clone, Copy)]
pub struct BitmapDecoder {
    quality: u8,
}

impl Default for BitmapDecoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl BitmapDecoder {
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn stride(width: u32, bit_depth: u16) -> usize {
        super::header::stride(width, bit_depth)
    }

    pub fn color_table_size(bit_depth: u16) -> usize {
        super::header::color_table_size(bit_depth)
    }

    pub fn parse_header(bytes: &[u8]) -> Result<DibHeader> {
        DibHeader::parse(bytes)
    }

    /// Decode a DIB buffer into a top-down RGB image.
    ///
    /// Every read is bounds-checked against `bytes`; a buffer shorter than
    /// the header describes is a decode error.
    pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
        let header = DibHeader::parse(bytes)?;
        let width = header.width_px();
        let abs_height = header.abs_height();
        let stride = header.stride();
        let pixel_offset = header.pixel_offset();

        let required = header.required_len().ok_or_else(|| {
            ScanportError::Decode(format!("bitmap dimensions {width}x{abs_height} overflow"))
        })?;
        if bytes.len() < required {
            return Err(ScanportError::Decode(format!(
                "buffer holds {} bytes but a {}x{} {}-bit bitmap needs {}",
                bytes.len(),
                width,
                abs_height,
                header.bit_depth,
                required
            )));
        }

        let palette = read_palette(bytes, &header);
        let dst_row_len = width as usize * 3;
        let mut image = RgbImage::new(width, abs_height);

        for (row, dst) in image.chunks_exact_mut(dst_row_len).enumerate() {
            let src_row = if header.is_bottom_up() {
                abs_height as usize - 1 - row
            } else {
                row
            };
            let start = pixel_offset + src_row * stride;
            let src = bytes.get(start..start + stride).ok_or_else(|| {
                ScanportError::Decode(format!("source row {src_row} is out of bounds"))
            })?;
            convert_row(src, dst, header.bit_depth, &palette);
        }

        debug!(
            width,
            height = abs_height,
            bit_depth = header.bit_depth,
            bottom_up = header.is_bottom_up(),
            "Bitmap reconstructed"
        );
        Ok(image)
    }

    /// Decode `bytes` and write the page into `output_dir`.
    #[instrument(skip(self, bytes), fields(len = bytes.len(), dir = %output_dir.display()))]
    pub fn decode_to_file(
        &self,
        bytes: &[u8],
        output_dir: &Path,
        captured_at: DateTime<Local>,
    ) -> Result<PathBuf> {
        let image = Self::decode(bytes)?;
        std::fs::create_dir_all(output_dir)?;
        let path = capture_path(output_dir, captured_at);

        ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(image))
            .save_jpeg(&path, self.quality)?;
        info!(path = %path.display(), "Scan page saved");
        Ok(path)
    }

    /// Lock a driver transfer, decode it to a file, and unlock it again.
    ///
    /// The region is unlocked on every path, including decode failures.
    pub fn decode_transfer(
        &self,
        memory: &mut dyn TransferMemory,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let region = LockedRegion::acquire(memory)?;
        self.decode_to_file(&region, output_dir, Local::now())
    }
}

/// `scan_<yyyyMMdd_HHmmss>.jpg`, suffixed `_N` if the name is taken.
pub fn capture_path(output_dir: &Path, captured_at: DateTime<Local>) -> PathBuf {
    let stem = format!("scan_{}", captured_at.format("%Y%m%d_%H%M%S"));
    let first = output_dir.join(format!("{stem}.jpg"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| output_dir.join(format!("{stem}_{n}.jpg")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn read_palette(bytes: &[u8], header: &DibHeader) -> Vec<[u8; 3]> {
    let start = header.header_size as usize;
    let end = header.pixel_offset();
    bytes
        .get(start..end)
        .map(|table| {
            table
                .chunks_exact(4)
                .map(|quad| [quad[2], quad[1], quad[0]])
                .collect()
        })
        .unwrap_or_default()
}

/// Convert one stored row into packed RGB. Reads stay inside `src`, which is
/// exactly one stride long; writes stay inside `dst`.
fn convert_row(src: &[u8], dst: &mut [u8], bit_depth: u16, palette: &[[u8; 3]]) {
    match bit_depth {
        24 => {
            for (out, bgr) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                out.copy_from_slice(&[bgr[2], bgr[1], bgr[0]]);
            }
        }
        32 => {
            for (out, bgrx) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                out.copy_from_slice(&[bgrx[2], bgrx[1], bgrx[0]]);
            }
        }
        depth => {
            let per_byte = 8 / depth as usize;
            let mask = ((1u16 << depth) - 1) as u8;
            for (x, out) in dst.chunks_exact_mut(3).enumerate() {
                let Some(byte) = src.get(x / per_byte) else {
                    break;
                };
                let shift = 8 - depth as usize * (x % per_byte + 1);
                let index = (byte >> shift) & mask;
                let rgb = palette.get(index as usize).copied().unwrap_or([0, 0, 0]);
                out.copy_from_slice(&rgb);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::synthetic::{indexed_dib, indexed8_dib, rgb_dib};
    use scanport_core::native::{HeapMemory, NativeHandle};

    /// Each row gets a distinct colour so flips are visible.
    fn row_colour(_x: u32, y: u32) -> [u8; 3] {
        [y as u8, 255 - y as u8, (y * 3) as u8]
    }

    #[test]
    fn bottom_up_buffer_is_flipped() {
        let bytes = rgb_dib(5, 4, 24, row_colour);
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.dimensions(), (5, 4));
        for y in 0..4 {
            assert_eq!(image.get_pixel(2, y).0, row_colour(2, y));
        }
    }

    #[test]
    fn bottom_up_row_zero_comes_from_last_stored_row() {
        let bytes = rgb_dib(5, 3, 24, row_colour);
        // Stored row 2 (the last in memory) must become image row 0.
        let stride = 16;
        let last_stored = 40 + 2 * stride;
        let [b, g, r] = [bytes[last_stored], bytes[last_stored + 1], bytes[last_stored + 2]];
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [r, g, b]);
    }

    #[test]
    fn top_down_buffer_is_not_flipped() {
        let bytes = rgb_dib(100, -50, 24, row_colour);
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.dimensions(), (100, 50));
        // First stored row is image row 0.
        assert_eq!(&image.as_raw()[0..3], &[bytes[42], bytes[41], bytes[40]]);
        assert_eq!(image.get_pixel(99, 49).0, row_colour(99, 49));
    }

    #[test]
    fn thirty_two_bit_drops_padding_channel() {
        let bytes = rgb_dib(3, 2, 32, |x, _| [x as u8 * 10, 20, 30]);
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.get_pixel(2, 1).0, [20, 20, 30]);
    }

    #[test]
    fn indexed_buffer_applies_palette() {
        let palette = [[0, 0, 0], [255, 0, 0], [0, 0, 255]];
        let bytes = indexed8_dib(3, 2, &palette, |x, y| ((x + y) % 3) as u8);
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(1, 1).0, [0, 0, 255]);
    }

    #[test]
    fn indexed8_greyscale_uses_every_palette_entry() {
        let grey: Vec<[u8; 3]> = (0..=255u8).map(|v| [v, v, v]).collect();
        let bytes = indexed8_dib(4, -2, &grey, |x, y| if y == 0 { 255 - x as u8 } else { x as u8 });
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(3, 0).0, [252, 252, 252]);
        assert_eq!(image.get_pixel(2, 1).0, [2, 2, 2]);
    }

    #[test]
    fn four_bit_buffer_unpacks_high_nibble_first() {
        let palette: Vec<[u8; 3]> = (0..16u8).map(|i| [i * 16, 0, 255 - i * 16]).collect();
        // Odd width leaves a half-used final byte in every row.
        let bytes = indexed_dib(5, 3, 4, &palette, |x, y| ((x + y * 5) % 16) as u8);
        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.dimensions(), (5, 3));
        for y in 0..3 {
            for x in 0..5 {
                let index = ((x + y * 5) % 16) as usize;
                assert_eq!(image.get_pixel(x, y).0, palette[index], "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn one_bit_rows_unpack_msb_first() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&9i32.to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.resize(40, 0);
        bytes.extend_from_slice(&[0, 0, 0, 0, 255, 255, 255, 0]);
        bytes.extend_from_slice(&[0b1000_0001, 0b1000_0000, 0, 0]);

        let image = BitmapDecoder::decode(&bytes).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(7, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(8, 0).0, [255, 255, 255]);
    }

    #[test]
    fn truncated_pixel_data_is_a_decode_error() {
        let mut bytes = rgb_dib(5, 4, 24, row_colour);
        bytes.truncate(bytes.len() - 1);
        let err = BitmapDecoder::decode(&bytes).unwrap_err();
        assert!(matches!(err, ScanportError::Decode(_)));
    }

    #[test]
    fn decode_to_file_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = rgb_dib(8, 8, 24, row_colour);
        let path = BitmapDecoder::default()
            .decode_to_file(&bytes, dir.path(), Local::now())
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("scan_") && name.ends_with(".jpg"));
        let reopened = image::open(&path).unwrap();
        assert_eq!((reopened.width(), reopened.height()), (8, 8));
    }

    #[test]
    fn capture_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let first = capture_path(dir.path(), now);
        std::fs::write(&first, b"x").unwrap();
        let second = capture_path(dir.path(), now);
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_1.jpg"));
    }

    #[test]
    fn decode_transfer_unlocks_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = HeapMemory::new(NativeHandle(1), vec![0u8; 8]);
        assert!(BitmapDecoder::default()
            .decode_transfer(&mut memory, dir.path())
            .is_err());
        assert_eq!(memory.lock_count(), 0);
    }

    #[test]
    fn null_transfer_handle_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = HeapMemory::new(NativeHandle::NULL, Vec::new());
        let err = BitmapDecoder::default()
            .decode_transfer(&mut memory, dir.path())
            .unwrap_err();
        assert!(matches!(err, ScanportError::Decode(_)));
    }
}
