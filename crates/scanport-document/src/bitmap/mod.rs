// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bitmap module — DIB header parsing, pixel reconstruction, and test buffers.

pub mod decoder;
pub mod header;
pub mod synthetic;

pub use decoder::{BitmapDecoder, DEFAULT_JPEG_QUALITY, capture_path};
pub use header::{DibHeader, color_table_size, stride};
