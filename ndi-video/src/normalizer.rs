//! Frame Normalizer
//!
//! Copies every captured frame into a pooled buffer of the canonical
//! biplanar 4:2:0 full-range format, keeping the capture system's
//! extended-pixel padding so downstream stride/height math stays valid.

use crate::buffer_pool::{BufferPool, PoolGeometry, PoolStats};
use crate::compositor::{Compositor, PlaneCompositor};
use crate::error::NormalizeError;
use crate::pixel_buffer::PixelBuffer;
use crate::types::PixelFormat;

/// Frame Normalizer configuration
#[derive(Debug, Clone, Copy)]
pub struct NormalizerConfig {
    /// Output buffers that may be outstanding at once
    pub pool_capacity: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { pool_capacity: 6 }
    }
}

/// Produces canonical-format copies of captured frames
///
/// Not reentrant: the capture system delivers frames serially and each
/// `duplicate` call runs to completion before the next one starts.
pub struct FrameNormalizer<C: Compositor = PlaneCompositor> {
    config: NormalizerConfig,
    compositor: C,
    pool: Option<BufferPool>,
    rebuilds: u64,
}

impl FrameNormalizer<PlaneCompositor> {
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_compositor(config, PlaneCompositor)
    }
}

impl Default for FrameNormalizer<PlaneCompositor> {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl<C: Compositor> FrameNormalizer<C> {
    pub fn with_compositor(config: NormalizerConfig, compositor: C) -> Self {
        FrameNormalizer {
            config,
            compositor,
            pool: None,
            rebuilds: 0,
        }
    }

    /// Copy `input` into a pooled canonical-format buffer
    ///
    /// The input is read-locked only for the copy. Format is checked
    /// before the pool is touched, so a rejected frame leaves it intact.
    pub fn duplicate(&mut self, input: &PixelBuffer) -> Result<PixelBuffer, NormalizeError> {
        let format = input.format();
        if !format.is_canonical() {
            return Err(NormalizeError::UnsupportedFormat {
                actual: format,
                expected: PixelFormat::CANONICAL,
            });
        }

        let source = input.lock_read().ok_or(NormalizeError::InputUnavailable)?;

        let geometry = PoolGeometry::of(input);
        let pool = self.pool_for(geometry)?;

        let output = pool
            .acquire()
            .ok_or_else(|| NormalizeError::AllocationFailed {
                reason: format!("pool exhausted ({} buffers in use)", pool.stats().in_use),
            })?;

        {
            let mut destination =
                output
                    .lock_write()
                    .ok_or_else(|| NormalizeError::AllocationFailed {
                        reason: "output buffer is locked".to_string(),
                    })?;
            self.compositor
                .render(&source, &mut destination)
                .map_err(|e| NormalizeError::AllocationFailed {
                    reason: e.to_string(),
                })?;
        }

        log::trace!(
            "Duplicated {}x{} frame into pool {}",
            geometry.width,
            geometry.height,
            output.pool_id().unwrap_or_default()
        );

        Ok(output)
    }

    /// Current pool, rebuilt when the input geometry changed
    fn pool_for(&mut self, geometry: PoolGeometry) -> Result<&BufferPool, NormalizeError> {
        let stale = self
            .pool
            .as_ref()
            .map_or(true, |pool| pool.geometry() != geometry);

        if stale {
            // Drop the old pool first; its outstanding buffers free themselves.
            self.pool = None;
            let pool = BufferPool::new(geometry, self.config.pool_capacity)
                .map_err(NormalizeError::PoolUnavailable)?;
            log::info!(
                "Created output buffer pool {} for {}x{} {} (extended {:?})",
                pool.id(),
                geometry.width,
                geometry.height,
                geometry.format,
                geometry.extended
            );
            self.rebuilds += 1;
            self.pool = Some(pool);
        }

        self.pool
            .as_ref()
            .ok_or_else(|| NormalizeError::AllocationFailed {
                reason: "no output pool".to_string(),
            })
    }

    /// Geometry of the current output pool
    pub fn pool_geometry(&self) -> Option<PoolGeometry> {
        self.pool.as_ref().map(BufferPool::geometry)
    }

    pub fn pool_id(&self) -> Option<u64> {
        self.pool.as_ref().map(BufferPool::id)
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(BufferPool::stats)
    }

    /// Number of times an output pool was created
    pub fn pool_rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LayoutError, RenderError};
    use crate::pixel_buffer::{ReadLock, WriteLock};
    use crate::types::ExtendedPixels;

    fn captured(width: u32, height: u32, extended: ExtendedPixels, seed: u8) -> PixelBuffer {
        let buffer =
            PixelBuffer::new(PixelFormat::Nv12FullRange, width, height, extended).unwrap();
        {
            let mut lock = buffer.lock_write().unwrap();
            for plane in 0..2 {
                for (i, byte) in lock.plane_mut(plane).unwrap().iter_mut().enumerate() {
                    *byte = (i as u8).wrapping_mul(31).wrapping_add(seed + plane as u8);
                }
            }
        }
        buffer
    }

    fn assert_same_pixels(a: &PixelBuffer, b: &PixelBuffer) {
        let a = a.lock_read().unwrap();
        let b = b.lock_read().unwrap();
        for plane in 0..2 {
            let layout = *a.plane_layout(plane).unwrap();
            let row_bytes = layout.width as usize * PixelFormat::CANONICAL.bytes_per_pixel(plane);
            for y in 0..layout.height {
                assert_eq!(
                    a.row(plane, y, row_bytes),
                    b.row(plane, y, row_bytes),
                    "plane {} row {}",
                    plane,
                    y
                );
            }
        }
    }

    #[test]
    fn test_duplicate_preserves_geometry_and_pixels() {
        let mut normalizer = FrameNormalizer::default();
        let ext = ExtendedPixels::new(0, 8, 0, 16);
        let input = captured(1920, 1080, ext, 3);

        let output = normalizer.duplicate(&input).unwrap();

        assert_eq!(output.format(), PixelFormat::Nv12FullRange);
        assert_eq!(output.width(), 1920);
        assert_eq!(output.height(), 1080);
        assert_eq!(output.extended_pixels(), ext);
        assert_same_pixels(&input, &output);
    }

    #[test]
    fn test_input_is_unlocked_after_duplicate() {
        let mut normalizer = FrameNormalizer::default();
        let input = captured(64, 64, ExtendedPixels::NONE, 0);

        let _output = normalizer.duplicate(&input).unwrap();
        assert!(input.lock_write().is_some());
    }

    #[test]
    fn test_unsupported_format_leaves_pool_untouched() {
        let mut normalizer = FrameNormalizer::default();
        let first = captured(640, 480, ExtendedPixels::NONE, 0);
        normalizer.duplicate(&first).unwrap();
        let pool_before = normalizer.pool_id();

        let bgra = PixelBuffer::new(PixelFormat::Bgra, 1280, 720, ExtendedPixels::NONE).unwrap();
        let err = normalizer.duplicate(&bgra).unwrap_err();

        assert_eq!(
            err,
            NormalizeError::UnsupportedFormat {
                actual: PixelFormat::Bgra,
                expected: PixelFormat::Nv12FullRange,
            }
        );
        assert_eq!(normalizer.pool_id(), pool_before);
        assert_eq!(normalizer.pool_rebuilds(), 1);
    }

    #[test]
    fn test_video_range_input_is_rejected() {
        let mut normalizer = FrameNormalizer::default();
        let input =
            PixelBuffer::new(PixelFormat::Nv12VideoRange, 64, 64, ExtendedPixels::NONE).unwrap();

        assert!(matches!(
            normalizer.duplicate(&input),
            Err(NormalizeError::UnsupportedFormat { .. })
        ));
        assert_eq!(normalizer.pool_geometry(), None);
    }

    #[test]
    fn test_steady_state_reuses_pool() {
        let mut normalizer = FrameNormalizer::default();
        for seed in 0..10 {
            let input = captured(320, 240, ExtendedPixels::NONE, seed);
            let output = normalizer.duplicate(&input).unwrap();
            assert_same_pixels(&input, &output);
        }
        assert_eq!(normalizer.pool_rebuilds(), 1);
        assert_eq!(normalizer.pool_stats().unwrap().in_use, 0);
    }

    #[test]
    fn test_resolution_change_rebuilds_pool() {
        let mut normalizer = FrameNormalizer::default();

        let small = captured(640, 360, ExtendedPixels::NONE, 1);
        let old = normalizer.duplicate(&small).unwrap();
        let old_pool = old.pool_id();

        let ext = ExtendedPixels::new(0, 0, 0, 8);
        let large = captured(1280, 720, ext, 2);
        let new = normalizer.duplicate(&large).unwrap();

        assert_ne!(new.pool_id(), old_pool);
        assert_eq!(normalizer.pool_rebuilds(), 2);
        let geometry = normalizer.pool_geometry().unwrap();
        assert_eq!(geometry.width, 1280);
        assert_eq!(geometry.height, 720);
        assert_eq!(geometry.extended, ext);

        // Buffers from the old pool never come back
        drop(old);
        for _ in 0..3 {
            let next = normalizer.duplicate(&large).unwrap();
            assert_eq!(next.pool_id(), normalizer.pool_id());
            assert_eq!(next.width(), 1280);
        }
    }

    #[test]
    fn test_exhausted_pool_fails_allocation() {
        let mut normalizer = FrameNormalizer::new(NormalizerConfig { pool_capacity: 2 });
        let input = captured(64, 64, ExtendedPixels::NONE, 0);

        let _a = normalizer.duplicate(&input).unwrap();
        let _b = normalizer.duplicate(&input).unwrap();
        assert!(matches!(
            normalizer.duplicate(&input),
            Err(NormalizeError::AllocationFailed { .. })
        ));
        // The failed call still released the input lock
        assert!(input.lock_write().is_some());
    }

    #[test]
    fn test_write_locked_input_is_unavailable() {
        let mut normalizer = FrameNormalizer::default();
        let input = captured(64, 64, ExtendedPixels::NONE, 0);
        let _held = input.lock_write().unwrap();

        assert_eq!(
            normalizer.duplicate(&input).unwrap_err(),
            NormalizeError::InputUnavailable
        );
    }

    struct FailingCompositor;

    impl Compositor for FailingCompositor {
        fn render(
            &self,
            _source: &ReadLock<'_>,
            _destination: &mut WriteLock<'_>,
        ) -> Result<(), RenderError> {
            Err(RenderError::PlaneUnavailable { plane: 0 })
        }
    }

    #[test]
    fn test_render_failure_is_allocation_failure() {
        let mut normalizer =
            FrameNormalizer::with_compositor(NormalizerConfig::default(), FailingCompositor);
        let input = captured(64, 64, ExtendedPixels::NONE, 0);

        assert!(matches!(
            normalizer.duplicate(&input),
            Err(NormalizeError::AllocationFailed { .. })
        ));
        // The buffer acquired for the failed render went back to the pool
        assert_eq!(normalizer.pool_stats().unwrap().in_use, 0);
        assert!(input.lock_write().is_some());
    }

    #[test]
    fn test_pool_error_surfaces_as_pool_unavailable() {
        let err = NormalizeError::PoolUnavailable(LayoutError::Overflow);
        assert_eq!(
            err.to_string(),
            "output buffer pool is unavailable: buffer layout overflows the address space"
        );
    }
}
