//! Conversion of mapped readback pixels into the tightly packed, top-down
//! RGB8/RGBA8 buffers image encoders accept.

mod f16;
mod parallel;

use parallel::{parallel_chunk_rows, should_parallelize};
use rayon::prelude::*;

use crate::backend::{PixelView, SourcePixelFormat};
use crate::error::{ShotError, ShotResult};
use crate::format::ColorMode;

const PARALLEL_MIN_PIXELS: usize = 1_048_576;
const PARALLEL_MIN_CHUNK_PIXELS: usize = 131_072;
const PARALLEL_MAX_WORKERS: usize = 8;

/// Byte length of the encodable buffer for `view` in `mode`.
pub fn encodable_len(view: &PixelView, mode: ColorMode) -> ShotResult<usize> {
    let width = usize::try_from(view.width()).map_err(|_| ShotError::BufferOverflow)?;
    let height = usize::try_from(view.height()).map_err(|_| ShotError::BufferOverflow)?;
    width
        .checked_mul(height)
        .and_then(|px| px.checked_mul(mode.channels()))
        .ok_or(ShotError::BufferOverflow)
}

/// Copy `view` into a new top-down buffer with `mode`'s channel layout.
///
/// Bottom-up sources are flipped, BGRA is swizzled, and half-float sources
/// are sRGB-encoded. Large images are split into row chunks on the current
/// rayon pool.
pub fn convert_to_encodable(view: &PixelView, mode: ColorMode) -> ShotResult<Vec<u8>> {
    let mut dst = vec![0u8; encodable_len(view, mode)?];
    if dst.is_empty() {
        return Ok(dst);
    }

    let width = view.width() as usize;
    let height = view.height() as usize;
    let format = view.layout().format;
    let dst_row_bytes = width * mode.channels();

    let chunk_rows = if should_parallelize(
        width * height,
        PARALLEL_MIN_PIXELS,
        PARALLEL_MIN_CHUNK_PIXELS,
        PARALLEL_MAX_WORKERS,
    ) {
        parallel_chunk_rows(width, height, PARALLEL_MIN_CHUNK_PIXELS, PARALLEL_MAX_WORKERS)
    } else {
        None
    };

    match chunk_rows {
        Some(rows) => {
            dst.par_chunks_mut(dst_row_bytes * rows)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| {
                    let first_row = chunk_idx * rows;
                    for (offset, dst_row) in chunk.chunks_exact_mut(dst_row_bytes).enumerate() {
                        convert_row(format, view.image_row(first_row + offset), dst_row, mode);
                    }
                });
        }
        None => {
            for (y, dst_row) in dst.chunks_exact_mut(dst_row_bytes).enumerate() {
                convert_row(format, view.image_row(y), dst_row, mode);
            }
        }
    }

    Ok(dst)
}

/// Convert one row of `format` pixels into `mode` channels.
pub fn convert_row(format: SourcePixelFormat, src: &[u8], dst: &mut [u8], mode: ColorMode) {
    let channels = mode.channels();
    match format {
        SourcePixelFormat::Rgba8 => match mode {
            ColorMode::Rgba => dst.copy_from_slice(&src[..dst.len()]),
            ColorMode::Rgb => {
                for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
                    out.copy_from_slice(&px[..3]);
                }
            }
        },
        SourcePixelFormat::Bgra8 => {
            for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(channels)) {
                out[0] = px[2];
                out[1] = px[1];
                out[2] = px[0];
                if channels == 4 {
                    out[3] = px[3];
                }
            }
        }
        SourcePixelFormat::Rgba16Float => f16::convert_f16_row(src, dst, channels),
    }
}
