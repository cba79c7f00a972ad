//! Outbound video frame descriptor

use crate::error::TransmitError;
use crate::pixel_buffer::{PixelBuffer, ReadLock};
use crate::types::{fourcc, FourCc, PixelFormat};

/// Wire code of the canonical biplanar 4:2:0 layout (Y plane, interleaved CbCr)
pub const WIRE_FOURCC_NV12: FourCc = FourCc(fourcc(b"NV12"));

/// Ask the engine to synthesize the timecode
pub const TIMECODE_SYNTHESIZE: i64 = i64::MAX;

/// Field layout of a frame on the wire
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Interleaved = 0,
    Progressive = 1,
}

/// One frame as handed to the send engine
///
/// Borrows plane memory from a [`ReadLock`], so the buffer stays locked for
/// as long as the descriptor exists and the descriptor cannot outlive a
/// single send.
#[derive(Clone, Copy)]
pub struct VideoFrameDescriptor<'a> {
    pub xres: u32,
    /// Visible rows plus the bottom extended rows
    pub yres: u32,
    pub fourcc: FourCc,
    pub line_stride: usize,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,
    /// 0.0 means square pixels
    pub picture_aspect_ratio: f32,
    pub frame_format: FrameFormat,
    pub timecode: i64,
    data: &'a [u8],
}

impl<'a> VideoFrameDescriptor<'a> {
    /// Describe plane 0 of a locked canonical-format buffer
    ///
    /// The transmitted height includes the bottom padding rows: they are
    /// physically present in plane 0 and the chroma plane follows them.
    ///
    /// The engine reads `yres` luma rows and then `ceil(yres / 2)` chroma
    /// rows at the same stride, starting at `yres * line_stride`. A buffer
    /// whose memory does not have that shape (wrapped planes in separate
    /// allocations, for instance) yields `AddressUnavailable`.
    pub fn from_locked(
        buffer: &PixelBuffer,
        lock: &'a ReadLock<'_>,
        frame_rate_n: i32,
        frame_rate_d: i32,
    ) -> Result<Self, TransmitError> {
        let luma = lock
            .plane_layout(0)
            .ok_or(TransmitError::AddressUnavailable)?;
        let chroma = lock
            .plane_layout(1)
            .ok_or(TransmitError::AddressUnavailable)?;
        let xres = luma.width;
        let yres = luma
            .height
            .checked_add(buffer.extended_pixels().bottom)
            .ok_or(TransmitError::AddressUnavailable)?;
        let line_stride = luma.bytes_per_row;
        if chroma.bytes_per_row != line_stride {
            return Err(TransmitError::AddressUnavailable);
        }

        let data = lock
            .contiguous_from_plane(0)
            .ok_or(TransmitError::AddressUnavailable)?;

        let chroma_offset = (yres as usize)
            .checked_mul(line_stride)
            .ok_or(TransmitError::AddressUnavailable)?;
        let chroma_row_bytes = chroma.width as usize * PixelFormat::CANONICAL.bytes_per_pixel(1);
        let needed = (yres.div_ceil(2) as usize - 1)
            .checked_mul(line_stride)
            .and_then(|n| n.checked_add(chroma_offset))
            .and_then(|n| n.checked_add(chroma_row_bytes.max(xres as usize)))
            .ok_or(TransmitError::AddressUnavailable)?;
        if data.len() < needed {
            return Err(TransmitError::AddressUnavailable);
        }

        // The chroma plane must start exactly where the engine looks for it
        let wire_chroma = data[chroma_offset..].as_ptr();
        let chroma_origin = lock
            .base_address_of_plane(1)
            .ok_or(TransmitError::AddressUnavailable)?;
        if chroma_origin.as_ptr() as *const u8 != wire_chroma {
            return Err(TransmitError::AddressUnavailable);
        }

        Ok(VideoFrameDescriptor {
            xres,
            yres,
            fourcc: WIRE_FOURCC_NV12,
            line_stride,
            frame_rate_n,
            frame_rate_d,
            picture_aspect_ratio: 0.0,
            frame_format: FrameFormat::Progressive,
            timecode: TIMECODE_SYNTHESIZE,
            data,
        })
    }

    /// Plane 0 memory from the first visible sample through the chroma rows
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl std::fmt::Debug for VideoFrameDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrameDescriptor")
            .field("xres", &self.xres)
            .field("yres", &self.yres)
            .field("fourcc", &self.fourcc)
            .field("line_stride", &self.line_stride)
            .field("frame_rate", &(self.frame_rate_n, self.frame_rate_d))
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_buffer::RawPlane;
    use crate::types::ExtendedPixels;

    #[test]
    fn test_height_includes_bottom_padding() {
        let buffer = PixelBuffer::new(
            PixelFormat::Nv12FullRange,
            1920,
            1080,
            ExtendedPixels::new(0, 0, 0, 16),
        )
        .unwrap();
        let lock = buffer.lock_read().unwrap();
        let frame = VideoFrameDescriptor::from_locked(&buffer, &lock, 30000, 1001).unwrap();

        assert_eq!(frame.xres, 1920);
        assert_eq!(frame.yres, 1096);
        assert_eq!(frame.line_stride, buffer.bytes_per_row_of_plane(0));
        assert_eq!(frame.fourcc, WIRE_FOURCC_NV12);
        assert_eq!(frame.frame_format, FrameFormat::Progressive);
        assert_eq!(
            frame.data_ptr(),
            lock.base_address_of_plane(0).unwrap().as_ptr() as *const u8
        );
    }

    #[test]
    fn test_chroma_follows_declared_luma_rows() {
        for ext in [
            ExtendedPixels::NONE,
            ExtendedPixels::new(0, 0, 0, 8),
            ExtendedPixels::new(0, 0, 4, 0),
            ExtendedPixels::new(8, 8, 4, 4),
            ExtendedPixels::new(3, 5, 7, 9),
        ] {
            let buffer = PixelBuffer::new(PixelFormat::Nv12FullRange, 640, 360, ext).unwrap();
            let lock = buffer.lock_read().unwrap();
            let frame = VideoFrameDescriptor::from_locked(&buffer, &lock, 60, 1).unwrap();

            let chroma = lock.base_address_of_plane(1).unwrap().as_ptr() as usize;
            assert_eq!(
                frame.data_ptr() as usize + frame.line_stride * frame.yres as usize,
                chroma,
                "{:?}",
                ext
            );
            assert_eq!(buffer.bytes_per_row_of_plane(1), frame.line_stride);

            let chroma_rows = frame.yres.div_ceil(2) as usize;
            let last_row = (frame.yres as usize + chroma_rows - 1) * frame.line_stride;
            assert!(frame.data().len() >= last_row + frame.xres as usize, "{:?}", ext);
        }
    }

    #[test]
    fn test_odd_bottom_padding_covers_chroma_rows() {
        let buffer = PixelBuffer::new(
            PixelFormat::Nv12FullRange,
            64,
            31,
            ExtendedPixels::new(0, 0, 0, 3),
        )
        .unwrap();
        let lock = buffer.lock_read().unwrap();
        let frame = VideoFrameDescriptor::from_locked(&buffer, &lock, 30, 1).unwrap();

        assert_eq!(frame.yres, 34);
        assert!(frame.data().len() >= (34 + 17 - 1) * frame.line_stride + 64);
    }

    #[test]
    fn test_separate_plane_allocations_are_rejected() {
        let stride = 64usize;
        let mut luma = vec![0u8; stride * 32];
        let mut chroma = vec![0u8; stride * 16];
        let buffer = unsafe {
            PixelBuffer::from_raw_parts(
                PixelFormat::Nv12FullRange,
                64,
                32,
                ExtendedPixels::NONE,
                &[
                    RawPlane {
                        base_address: luma.as_mut_ptr(),
                        bytes_per_row: stride,
                    },
                    RawPlane {
                        base_address: chroma.as_mut_ptr(),
                        bytes_per_row: stride,
                    },
                ],
            )
        }
        .unwrap();
        let lock = buffer.lock_read().unwrap();

        assert_eq!(
            VideoFrameDescriptor::from_locked(&buffer, &lock, 30, 1).unwrap_err(),
            TransmitError::AddressUnavailable
        );
    }

    #[test]
    fn test_wire_fourcc() {
        assert_eq!(WIRE_FOURCC_NV12.to_string(), "NV12");
    }
}
