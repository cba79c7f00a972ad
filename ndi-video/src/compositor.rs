//! Format-preserving image composition between locked buffers
//!
//! The normalizer never touches individual pixels. It hands both buffers to
//! a [`Compositor`], which moves whole rows with `copy_from_slice` (memcpy,
//! vectorized by the platform) spread across the rayon thread pool.

use crate::error::RenderError;
use crate::pixel_buffer::{ReadLock, WriteLock};
use rayon::prelude::*;

/// Rows handed to one rayon task
const MIN_ROWS_PER_TASK: usize = 64;

/// Renders the visible region of one buffer into another of the same format
pub trait Compositor: Send {
    fn render(&self, source: &ReadLock<'_>, destination: &mut WriteLock<'_>)
        -> Result<(), RenderError>;
}

/// Parallel row copy of every plane
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneCompositor;

impl Compositor for PlaneCompositor {
    fn render(
        &self,
        source: &ReadLock<'_>,
        destination: &mut WriteLock<'_>,
    ) -> Result<(), RenderError> {
        let format = source.format();
        if format != destination.format() {
            return Err(RenderError::FormatMismatch {
                source_format: format,
                destination: destination.format(),
            });
        }

        for plane in 0..format.plane_count() {
            let src_layout = *source
                .plane_layout(plane)
                .ok_or(RenderError::PlaneUnavailable { plane })?;
            let dst_layout = *destination
                .plane_layout(plane)
                .ok_or(RenderError::PlaneUnavailable { plane })?;

            if src_layout.width != dst_layout.width || src_layout.height != dst_layout.height {
                return Err(RenderError::GeometryMismatch { plane });
            }

            let rows = src_layout.height as usize;
            let row_bytes = src_layout.width as usize * format.bytes_per_pixel(plane);
            if rows == 0 || row_bytes == 0 {
                continue;
            }

            let src = source
                .plane(plane)
                .filter(|bytes| fits(bytes.len(), rows, src_layout.bytes_per_row, row_bytes))
                .ok_or(RenderError::PlaneUnavailable { plane })?;
            let dst = destination
                .plane_mut(plane)
                .filter(|bytes| fits(bytes.len(), rows, dst_layout.bytes_per_row, row_bytes))
                .ok_or(RenderError::PlaneUnavailable { plane })?;

            dst.par_chunks_mut(dst_layout.bytes_per_row)
                .zip(src.par_chunks(src_layout.bytes_per_row))
                .take(rows)
                .with_min_len(MIN_ROWS_PER_TASK)
                .for_each(|(dst_row, src_row)| {
                    dst_row[..row_bytes].copy_from_slice(&src_row[..row_bytes]);
                });
        }

        Ok(())
    }
}

/// Whether `rows` visible rows of `row_bytes` fit in a plane slice
fn fits(len: usize, rows: usize, bytes_per_row: usize, row_bytes: usize) -> bool {
    bytes_per_row >= row_bytes
        && (rows - 1)
            .checked_mul(bytes_per_row)
            .and_then(|n| n.checked_add(row_bytes))
            .is_some_and(|needed| needed <= len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_buffer::PixelBuffer;
    use crate::types::{ExtendedPixels, PixelFormat};

    fn patterned(width: u32, height: u32, extended: ExtendedPixels) -> PixelBuffer {
        let buffer = PixelBuffer::new(PixelFormat::Nv12FullRange, width, height, extended).unwrap();
        {
            let mut lock = buffer.lock_write().unwrap();
            for plane in 0..2 {
                for (i, byte) in lock.plane_mut(plane).unwrap().iter_mut().enumerate() {
                    *byte = (i * 7 % 251) as u8 ^ plane as u8;
                }
            }
        }
        buffer
    }

    #[test]
    fn test_copies_visible_region_across_strides() {
        let source = patterned(100, 50, ExtendedPixels::new(16, 16, 8, 8));
        let destination =
            PixelBuffer::new(PixelFormat::Nv12FullRange, 100, 50, ExtendedPixels::NONE).unwrap();
        assert_ne!(
            source.bytes_per_row_of_plane(0),
            destination.bytes_per_row_of_plane(0)
        );

        let src = source.lock_read().unwrap();
        let mut dst = destination.lock_write().unwrap();
        PlaneCompositor.render(&src, &mut dst).unwrap();
        drop(dst);

        let dst = destination.lock_read().unwrap();
        for y in 0..50 {
            assert_eq!(src.row(0, y, 100), dst.row(0, y, 100), "luma row {}", y);
        }
        for y in 0..25 {
            assert_eq!(src.row(1, y, 100), dst.row(1, y, 100), "chroma row {}", y);
        }
    }

    #[test]
    fn test_rejects_geometry_mismatch() {
        let source = patterned(64, 64, ExtendedPixels::NONE);
        let destination =
            PixelBuffer::new(PixelFormat::Nv12FullRange, 64, 32, ExtendedPixels::NONE).unwrap();

        let src = source.lock_read().unwrap();
        let mut dst = destination.lock_write().unwrap();
        assert_eq!(
            PlaneCompositor.render(&src, &mut dst),
            Err(RenderError::GeometryMismatch { plane: 0 })
        );
    }

    #[test]
    fn test_rejects_format_mismatch() {
        let source = patterned(16, 16, ExtendedPixels::NONE);
        let destination =
            PixelBuffer::new(PixelFormat::Nv12VideoRange, 16, 16, ExtendedPixels::NONE).unwrap();

        let src = source.lock_read().unwrap();
        let mut dst = destination.lock_write().unwrap();
        assert!(matches!(
            PlaneCompositor.render(&src, &mut dst),
            Err(RenderError::FormatMismatch { .. })
        ));
    }
}
