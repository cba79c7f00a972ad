//! Pixel buffers with scoped base-address locking
//!
//! A [`PixelBuffer`] either owns 64-byte aligned plane memory (allocated
//! directly or handed out by a [`crate::BufferPool`]) or wraps memory owned by
//! the capture system for the duration of one pipeline pass.
//!
//! Plane memory is only reachable through [`ReadLock`] / [`WriteLock`]
//! guards. Releasing the guard unlocks the buffer on every exit path.

use crate::buffer_pool::Recycler;
use crate::error::LayoutError;
use crate::types::{ExtendedPixels, PixelFormat, PlaneLayout};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Row and plane alignment of owned buffers
pub const BUFFER_ALIGNMENT: usize = 64;

/// Zeroed, aligned heap allocation holding every plane of one buffer
pub(crate) struct AlignedStorage {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The allocation is uniquely owned; access is serialized by the buffer lock.
unsafe impl Send for AlignedStorage {}
unsafe impl Sync for AlignedStorage {}

impl AlignedStorage {
    pub(crate) fn zeroed(size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size.max(1), BUFFER_ALIGNMENT).ok()?;
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).map(|ptr| AlignedStorage { ptr, layout })
    }

    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedStorage {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Plane memory owned by someone else
struct ExternalPlane {
    start: NonNull<u8>,
    len: usize,
}

// Validity and exclusivity are guaranteed by the `from_raw_parts` contract.
unsafe impl Send for ExternalPlane {}
unsafe impl Sync for ExternalPlane {}

enum Backing {
    Owned(AlignedStorage),
    External(Vec<ExternalPlane>),
}

/// Base address and stride of one externally owned plane
#[derive(Debug, Clone, Copy)]
pub struct RawPlane {
    /// First visible sample of the plane
    pub base_address: *mut u8,
    pub bytes_per_row: usize,
}

/// Compute the plane layouts and total allocation size for an owned buffer
pub(crate) fn owned_layout(
    format: PixelFormat,
    width: u32,
    height: u32,
    extended: ExtendedPixels,
) -> Result<(Vec<PlaneLayout>, usize), LayoutError> {
    if width == 0 || height == 0 {
        return Err(LayoutError::InvalidGeometry { width, height });
    }
    if format.is_biplanar() {
        return biplanar_layout(format, width, height, extended);
    }

    let mut planes = Vec::with_capacity(format.plane_count());
    let mut offset = 0usize;

    for plane in 0..format.plane_count() {
        let (sx, sy) = format.subsampling(plane);
        let bpp = format.bytes_per_pixel(plane);

        let w = width.div_ceil(sx) as usize;
        let h = height.div_ceil(sy) as usize;
        let left = extended.left.div_ceil(sx) as usize;
        let right = extended.right.div_ceil(sx) as usize;
        let top = extended.top.div_ceil(sy) as usize;
        let bottom = extended.bottom.div_ceil(sy) as usize;

        let row_bytes = (left + w + right)
            .checked_mul(bpp)
            .ok_or(LayoutError::Overflow)?;
        let bytes_per_row = align_up(row_bytes).ok_or(LayoutError::Overflow)?;
        let rows = top + h + bottom;
        let plane_size = rows
            .checked_mul(bytes_per_row)
            .ok_or(LayoutError::Overflow)?;

        let lead = top * bytes_per_row + left * bpp;
        planes.push(PlaneLayout {
            width: w as u32,
            height: h as u32,
            bytes_per_row,
            origin: offset + lead,
            bottom_rows: bottom as u32,
            len_from_origin: plane_size - lead,
        });

        offset = offset
            .checked_add(plane_size)
            .and_then(align_up)
            .ok_or(LayoutError::Overflow)?;
    }

    check_allocation_size(offset)?;
    Ok((planes, offset))
}

/// Layout of a biplanar luma + interleaved chroma buffer
///
/// Both planes share one stride and one column origin, and the first chroma
/// row directly follows the luma bottom padding rows. Plane 0 memory can
/// then be sent as a single image whose height includes the bottom padding.
/// The top padding rows of both planes lead the allocation.
fn biplanar_layout(
    format: PixelFormat,
    width: u32,
    height: u32,
    extended: ExtendedPixels,
) -> Result<(Vec<PlaneLayout>, usize), LayoutError> {
    let (sx, sy) = format.subsampling(1);
    let luma_bpp = format.bytes_per_pixel(0);
    let chroma_bpp = format.bytes_per_pixel(1);

    let chroma_width = width.div_ceil(sx);
    let chroma_height = height.div_ceil(sy);
    let chroma_top = extended.top.div_ceil(sy);
    let chroma_bottom = extended.bottom.div_ceil(sy);

    let left = extended.left as usize * luma_bpp;
    let luma_span = (width as usize + extended.right as usize) * luma_bpp;
    let chroma_span =
        (chroma_width as usize + extended.right.div_ceil(sx) as usize) * chroma_bpp;
    let bytes_per_row = left
        .checked_add(luma_span.max(chroma_span))
        .and_then(align_up)
        .ok_or(LayoutError::Overflow)?;

    let lead_rows = extended.top as usize + chroma_top as usize;
    let luma_rows = height as usize + extended.bottom as usize;
    let chroma_rows = chroma_height as usize + chroma_bottom as usize;

    let rows_to_bytes =
        |rows: usize| rows.checked_mul(bytes_per_row).ok_or(LayoutError::Overflow);
    let luma_bytes = rows_to_bytes(luma_rows)?;
    let luma_len = luma_bytes - left;
    let chroma_len = rows_to_bytes(chroma_rows)? - left;
    let luma_origin = rows_to_bytes(lead_rows)?
        .checked_add(left)
        .ok_or(LayoutError::Overflow)?;
    let chroma_origin = luma_origin
        .checked_add(luma_bytes)
        .ok_or(LayoutError::Overflow)?;
    let size = chroma_origin
        .checked_add(chroma_len)
        .ok_or(LayoutError::Overflow)?;
    check_allocation_size(size)?;

    let planes = vec![
        PlaneLayout {
            width,
            height,
            bytes_per_row,
            origin: luma_origin,
            bottom_rows: extended.bottom,
            len_from_origin: luma_len,
        },
        PlaneLayout {
            width: chroma_width,
            height: chroma_height,
            bytes_per_row,
            origin: chroma_origin,
            bottom_rows: chroma_bottom,
            len_from_origin: chroma_len,
        },
    ];
    Ok((planes, size))
}

// Layout::from_size_align rejects sizes above isize::MAX
fn check_allocation_size(size: usize) -> Result<(), LayoutError> {
    if size > isize::MAX as usize - BUFFER_ALIGNMENT {
        return Err(LayoutError::Overflow);
    }
    Ok(())
}

fn align_up(n: usize) -> Option<usize> {
    n.checked_add(BUFFER_ALIGNMENT - 1)
        .map(|v| v & !(BUFFER_ALIGNMENT - 1))
}

/// An image buffer with per-plane geometry and extended-pixel padding
pub struct PixelBuffer {
    format: PixelFormat,
    width: u32,
    height: u32,
    extended: ExtendedPixels,
    planes: Vec<PlaneLayout>,
    backing: RwLock<Backing>,
    recycler: Option<Recycler>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer that owns its plane memory
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        extended: ExtendedPixels,
    ) -> Result<Self, LayoutError> {
        let (planes, size) = owned_layout(format, width, height, extended)?;
        let storage = AlignedStorage::zeroed(size).ok_or(LayoutError::Overflow)?;
        Ok(Self::with_storage(
            format, width, height, extended, planes, storage, None,
        ))
    }

    pub(crate) fn with_storage(
        format: PixelFormat,
        width: u32,
        height: u32,
        extended: ExtendedPixels,
        planes: Vec<PlaneLayout>,
        storage: AlignedStorage,
        recycler: Option<Recycler>,
    ) -> Self {
        PixelBuffer {
            format,
            width,
            height,
            extended,
            planes,
            backing: RwLock::new(Backing::Owned(storage)),
            recycler,
        }
    }

    /// Wrap plane memory owned by the capture system
    ///
    /// Each plane must be readable (and writable, if a write lock is taken)
    /// from `base_address` for `bytes_per_row * (rows + bottom padding rows)`
    /// bytes, minus the unused tail of the last row.
    ///
    /// # Safety
    /// The memory must stay valid and must not be mutated by anyone else
    /// until the returned buffer is dropped.
    pub unsafe fn from_raw_parts(
        format: PixelFormat,
        width: u32,
        height: u32,
        extended: ExtendedPixels,
        raw_planes: &[RawPlane],
    ) -> Result<Self, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::InvalidGeometry { width, height });
        }
        if raw_planes.len() != format.plane_count() {
            return Err(LayoutError::PlaneCount {
                expected: format.plane_count(),
                actual: raw_planes.len(),
            });
        }

        let mut planes = Vec::with_capacity(raw_planes.len());
        let mut external = Vec::with_capacity(raw_planes.len());

        for (index, raw) in raw_planes.iter().enumerate() {
            let start = NonNull::new(raw.base_address)
                .ok_or(LayoutError::NullPlane { plane: index })?;
            let (sx, sy) = format.subsampling(index);
            let w = width.div_ceil(sx);
            let h = height.div_ceil(sy);
            let bottom = extended.bottom.div_ceil(sy);
            let row_bytes = (w as usize)
                .checked_mul(format.bytes_per_pixel(index))
                .ok_or(LayoutError::Overflow)?;

            if raw.bytes_per_row < row_bytes {
                return Err(LayoutError::StrideTooSmall {
                    plane: index,
                    bytes_per_row: raw.bytes_per_row,
                    min: row_bytes,
                });
            }

            let rows = h.checked_add(bottom).ok_or(LayoutError::Overflow)?;
            let len = raw
                .bytes_per_row
                .checked_mul(rows as usize - 1)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or(LayoutError::Overflow)?;

            planes.push(PlaneLayout {
                width: w,
                height: h,
                bytes_per_row: raw.bytes_per_row,
                origin: 0,
                bottom_rows: bottom,
                len_from_origin: len,
            });
            external.push(ExternalPlane { start, len });
        }

        Ok(PixelBuffer {
            format,
            width,
            height,
            extended,
            planes,
            backing: RwLock::new(Backing::External(external)),
            recycler: None,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extended_pixels(&self) -> ExtendedPixels {
        self.extended
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn plane_layout(&self, plane: usize) -> Option<&PlaneLayout> {
        self.planes.get(plane)
    }

    pub fn width_of_plane(&self, plane: usize) -> u32 {
        self.planes.get(plane).map_or(0, |p| p.width)
    }

    pub fn height_of_plane(&self, plane: usize) -> u32 {
        self.planes.get(plane).map_or(0, |p| p.height)
    }

    pub fn bytes_per_row_of_plane(&self, plane: usize) -> usize {
        self.planes.get(plane).map_or(0, |p| p.bytes_per_row)
    }

    /// Id of the pool this buffer was handed out by
    pub fn pool_id(&self) -> Option<u64> {
        self.recycler.as_ref().map(Recycler::pool_id)
    }

    /// Lock the base address for reading
    ///
    /// Returns `None` while a write lock is held.
    pub fn lock_read(&self) -> Option<ReadLock<'_>> {
        self.backing.try_read().map(|backing| ReadLock {
            format: self.format,
            planes: &self.planes,
            backing,
        })
    }

    /// Lock the base address for writing
    ///
    /// Returns `None` while any other lock is held.
    pub fn lock_write(&self) -> Option<WriteLock<'_>> {
        self.backing.try_write().map(|backing| WriteLock {
            format: self.format,
            planes: &self.planes,
            backing,
        })
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("extended", &self.extended)
            .field("pool_id", &self.pool_id())
            .finish()
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        let Some(recycler) = self.recycler.take() else {
            return;
        };
        let backing = std::mem::replace(self.backing.get_mut(), Backing::External(Vec::new()));
        if let Backing::Owned(storage) = backing {
            recycler.recycle(storage);
        }
    }
}

fn plane_slice<'a>(backing: &'a Backing, planes: &[PlaneLayout], plane: usize) -> Option<&'a [u8]> {
    let layout = planes.get(plane)?;
    match backing {
        Backing::Owned(storage) => storage
            .as_slice()
            .get(layout.origin..layout.origin + layout.len_from_origin),
        Backing::External(external) => {
            let ext = external.get(plane)?;
            Some(unsafe { std::slice::from_raw_parts(ext.start.as_ptr(), ext.len) })
        }
    }
}

fn plane_slice_mut<'a>(
    backing: &'a mut Backing,
    planes: &[PlaneLayout],
    plane: usize,
) -> Option<&'a mut [u8]> {
    let layout = planes.get(plane)?;
    match backing {
        Backing::Owned(storage) => storage
            .as_mut_slice()
            .get_mut(layout.origin..layout.origin + layout.len_from_origin),
        Backing::External(external) => {
            let ext = external.get(plane)?;
            Some(unsafe { std::slice::from_raw_parts_mut(ext.start.as_ptr(), ext.len) })
        }
    }
}

/// Read access to a locked buffer's planes
pub struct ReadLock<'a> {
    format: PixelFormat,
    planes: &'a [PlaneLayout],
    backing: RwLockReadGuard<'a, Backing>,
}

impl<'a> ReadLock<'a> {
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Plane memory from the first visible sample through the bottom padding rows
    pub fn plane(&self, plane: usize) -> Option<&[u8]> {
        plane_slice(&self.backing, self.planes, plane)
    }

    pub fn base_address_of_plane(&self, plane: usize) -> Option<NonNull<u8>> {
        self.plane(plane)
            .and_then(|bytes| NonNull::new(bytes.as_ptr() as *mut u8))
    }

    pub fn plane_layout(&self, plane: usize) -> Option<&PlaneLayout> {
        self.planes.get(plane)
    }

    /// Memory from a plane's first visible sample to the end of the region
    /// known to be contiguous with it
    ///
    /// For owned buffers this runs through every following plane; wrapped
    /// external planes only cover themselves.
    pub fn contiguous_from_plane(&self, plane: usize) -> Option<&[u8]> {
        let layout = self.planes.get(plane)?;
        match &*self.backing {
            Backing::Owned(storage) => storage.as_slice().get(layout.origin..),
            Backing::External(_) => self.plane(plane),
        }
    }

    /// Visible bytes of one row
    pub fn row(&self, plane: usize, y: u32, row_bytes: usize) -> Option<&[u8]> {
        let layout = self.planes.get(plane)?;
        let start = y as usize * layout.bytes_per_row;
        self.plane(plane)?.get(start..start + row_bytes)
    }
}

/// Write access to a locked buffer's planes
pub struct WriteLock<'a> {
    format: PixelFormat,
    planes: &'a [PlaneLayout],
    backing: RwLockWriteGuard<'a, Backing>,
}

impl<'a> WriteLock<'a> {
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn plane(&self, plane: usize) -> Option<&[u8]> {
        plane_slice(&self.backing, self.planes, plane)
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<&mut [u8]> {
        plane_slice_mut(&mut self.backing, self.planes, plane)
    }

    pub fn plane_layout(&self, plane: usize) -> Option<&PlaneLayout> {
        self.planes.get(plane)
    }
}
