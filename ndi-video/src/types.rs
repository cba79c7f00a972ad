//! Pixel format and geometry types

use std::fmt;

/// Build a little-endian four-character code
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

/// Four-character code as carried in buffer headers and on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub fn bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc('{}')", self)
    }
}

/// Pixel formats a capture source can hand us
///
/// Only [`PixelFormat::CANONICAL`] is accepted by the pipeline; the other
/// variants exist so a mismatch can be reported precisely.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Nv12FullRange = fourcc(b"420f"),  // Biplanar YCbCr 4:2:0, full range
    Nv12VideoRange = fourcc(b"420v"), // Biplanar YCbCr 4:2:0, video range
    I420 = fourcc(b"y420"),           // Planar YCbCr 4:2:0
    Uyvy = fourcc(b"2vuy"),           // Packed YCbCr 4:2:2
    Bgra = fourcc(b"BGRA"),           // Packed BGRA 8-bit
}

impl PixelFormat {
    /// The one format the pipeline normalizes to and transmits
    pub const CANONICAL: PixelFormat = PixelFormat::Nv12FullRange;

    pub fn from_fourcc(code: u32) -> Option<Self> {
        [
            PixelFormat::Nv12FullRange,
            PixelFormat::Nv12VideoRange,
            PixelFormat::I420,
            PixelFormat::Uyvy,
            PixelFormat::Bgra,
        ]
        .into_iter()
        .find(|format| *format as u32 == code)
    }

    pub fn fourcc(self) -> FourCc {
        FourCc(self as u32)
    }

    pub fn is_canonical(self) -> bool {
        self == Self::CANONICAL
    }

    /// Returns number of planes for this format
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Nv12FullRange | PixelFormat::Nv12VideoRange => 2,
            PixelFormat::I420 => 3,
            PixelFormat::Uyvy | PixelFormat::Bgra => 1,
        }
    }

    /// Bytes per sample position in the given plane
    pub fn bytes_per_pixel(self, plane: usize) -> usize {
        match (self, plane) {
            (PixelFormat::Nv12FullRange | PixelFormat::Nv12VideoRange, 0) => 1,
            (PixelFormat::Nv12FullRange | PixelFormat::Nv12VideoRange, _) => 2, // interleaved CbCr
            (PixelFormat::I420, _) => 1,
            (PixelFormat::Uyvy, _) => 2,
            (PixelFormat::Bgra, _) => 4,
        }
    }

    /// Horizontal and vertical subsampling divisors for a plane
    pub fn subsampling(self, plane: usize) -> (u32, u32) {
        match self {
            PixelFormat::Nv12FullRange | PixelFormat::Nv12VideoRange | PixelFormat::I420
                if plane > 0 =>
            {
                (2, 2)
            }
            _ => (1, 1),
        }
    }

    /// Luma plane followed by one interleaved chroma plane
    pub fn is_biplanar(self) -> bool {
        self.plane_count() == 2
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

/// Padding reserved around the visible image, in luma samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExtendedPixels {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl ExtendedPixels {
    pub const NONE: ExtendedPixels = ExtendedPixels {
        left: 0,
        right: 0,
        top: 0,
        bottom: 0,
    };

    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

/// Memory layout of one plane inside a buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Visible width in samples
    pub width: u32,
    /// Visible height in rows
    pub height: u32,
    pub bytes_per_row: usize,
    /// Byte offset of the first visible sample from the allocation start
    pub origin: usize,
    /// Rows reserved below the visible region
    pub bottom_rows: u32,
    /// Bytes from the origin to the end of the plane
    pub len_from_origin: usize,
}
