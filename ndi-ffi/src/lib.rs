//! NDI FFI - C Foreign Function Interface
//!
//! Provides a C-compatible API so a capture extension can drive a broadcast
//! session with raw plane pointers from its own pixel buffers.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use ndi_video::{
    BroadcastSession, ExtendedPixels, PixelBuffer, PixelFormat, RawPlane, SampleBuffer,
    SessionConfig,
};

#[cfg(feature = "libndi")]
type Engine = ndi_video::NdiEngine;
#[cfg(not(feature = "libndi"))]
type Engine = ndi_video::NullEngine;

/// Opaque handle to a broadcast session (C-compatible)
pub struct NDISession {
    _private: [u8; 0],
}

struct FfiSession {
    session: BroadcastSession<Engine>,
    last_error: Option<CString>,
}

impl FfiSession {
    fn record_error(&mut self, message: String) {
        log::warn!("{}", message);
        self.last_error = CString::new(message).ok();
    }
}

/// C-compatible captured video frame
///
/// `data[i]` points at the first visible sample of plane `i`; unused planes
/// are null.
#[repr(C)]
pub struct CVideoFrame {
    pub data: [*mut u8; 4],
    pub linesize: [u32; 4],
    pub width: u32,
    pub height: u32,
    /// Four-character pixel format code
    pub format: u32,
    pub extended_left: u32,
    pub extended_right: u32,
    pub extended_top: u32,
    pub extended_bottom: u32,
}

unsafe fn session_mut<'a>(ptr: *mut NDISession) -> Option<&'a mut FfiSession> {
    (ptr as *mut FfiSession).as_mut()
}

unsafe fn session_ref<'a>(ptr: *const NDISession) -> Option<&'a FfiSession> {
    (ptr as *const FfiSession).as_ref()
}

// ============================================================================
// SESSION API
// ============================================================================

/// Create a new broadcast session
///
/// `name` may be null to use the default channel name. Returns null if the
/// name is not valid UTF-8.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_create(name: *const c_char) -> *mut NDISession {
    let mut config = SessionConfig::default();
    if !name.is_null() {
        match CStr::from_ptr(name).to_str() {
            Ok(name) => config.source_name = name.to_string(),
            Err(_) => return ptr::null_mut(),
        }
    }

    let session = Box::new(FfiSession {
        session: BroadcastSession::new(Engine::default(), config),
        last_error: None,
    });
    Box::into_raw(session) as *mut NDISession
}

/// Destroy a session, closing its channel
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_destroy(ptr: *mut NDISession) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr as *mut FfiSession);
    }
}

/// Initialize the engine and open the channel
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_start(ptr: *mut NDISession) -> c_int {
    let Some(ffi) = session_mut(ptr) else {
        return 0;
    };

    match ffi.session.start() {
        Ok(()) => 1,
        Err(e) => {
            ffi.record_error(e.to_string());
            0
        }
    }
}

/// Normalize and send one captured video frame
///
/// Returns 0 when the session has failed; the reason is available from
/// `ndi_session_last_error` and the channel is already closed.
///
/// # Safety
/// Caller must ensure ptr and frame are valid, and that every plane pointer
/// addresses `linesize * (rows + extended_bottom)` bytes that stay
/// untouched until this call returns.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_submit_video(
    ptr: *mut NDISession,
    frame: *const CVideoFrame,
) -> c_int {
    let Some(ffi) = session_mut(ptr) else {
        return 0;
    };
    let Some(frame) = frame.as_ref() else {
        return 0;
    };

    let Some(format) = PixelFormat::from_fourcc(frame.format) else {
        ffi.record_error(format!(
            "failed to duplicate sample buffer: unknown pixel format {}",
            ndi_video::FourCc(frame.format)
        ));
        ffi.session.finish();
        return 0;
    };

    let planes: Vec<RawPlane> = (0..format.plane_count())
        .map(|i| RawPlane {
            base_address: frame.data[i],
            bytes_per_row: frame.linesize[i] as usize,
        })
        .collect();
    let extended = ExtendedPixels::new(
        frame.extended_left,
        frame.extended_right,
        frame.extended_top,
        frame.extended_bottom,
    );

    let buffer = match PixelBuffer::from_raw_parts(
        format,
        frame.width,
        frame.height,
        extended,
        &planes,
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            ffi.record_error(format!("failed to wrap sample buffer: {}", e));
            ffi.session.finish();
            return 0;
        }
    };

    match ffi.session.process_sample(SampleBuffer::Video(&buffer)) {
        Ok(()) => 1,
        Err(e) => {
            ffi.record_error(e.to_string());
            0
        }
    }
}

/// Finish the session and close its channel
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_finish(ptr: *mut NDISession) {
    if let Some(ffi) = session_mut(ptr) {
        ffi.session.finish();
    }
}

/// Last failure reason, or null
///
/// The string stays valid until the next call on this session.
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_last_error(ptr: *const NDISession) -> *const c_char {
    session_ref(ptr)
        .and_then(|ffi| ffi.last_error.as_ref())
        .map_or(ptr::null(), |e| e.as_ptr())
}

/// Get frames handed to the engine
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_get_frames_sent(ptr: *const NDISession) -> u64 {
    session_ref(ptr).map_or(0, |ffi| ffi.session.stats().frames_sent)
}

/// Get frames the engine dropped
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_get_frames_dropped(ptr: *const NDISession) -> u64 {
    session_ref(ptr).map_or(0, |ffi| ffi.session.stats().frames_dropped)
}

/// Get frames sent slower than the send budget
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn ndi_session_get_frames_late(ptr: *const NDISession) -> u64 {
    session_ref(ptr).map_or(0, |ffi| ffi.session.stats().frames_late)
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Get library version string
///
/// # Safety
/// Returns a static string, safe to call.
#[no_mangle]
pub extern "C" fn ndi_rust_version() -> *const c_char {
    "0.1.0\0".as_ptr() as *const c_char
}
