//! NDI runtime send engine
//!
//! Links the system NDI library (`libndi`, `libndi_ios` on iOS) and maps the
//! [`SendEngine`] calls onto its C entry points.

#![allow(non_camel_case_types, non_snake_case)]

use crate::descriptor::VideoFrameDescriptor;
use crate::engine::{SendEngine, SenderSettings};
use libc::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};

#[repr(C)]
struct NDIlib_send_create_t {
    p_ndi_name: *const c_char,
    p_groups: *const c_char,
    clock_video: bool,
    clock_audio: bool,
}

#[repr(C)]
struct NDIlib_video_frame_v2_t {
    xres: c_int,
    yres: c_int,
    FourCC: u32,
    frame_rate_N: c_int,
    frame_rate_D: c_int,
    picture_aspect_ratio: f32,
    frame_format_type: c_int,
    timecode: i64,
    p_data: *mut u8,
    line_stride_in_bytes: c_int,
    p_metadata: *const c_char,
    timestamp: i64,
}

type NDIlib_send_instance_t = *mut c_void;

#[cfg_attr(target_os = "ios", link(name = "ndi_ios"))]
#[cfg_attr(not(target_os = "ios"), link(name = "ndi"))]
extern "C" {
    fn NDIlib_initialize() -> bool;
    fn NDIlib_send_create(p_create_settings: *const NDIlib_send_create_t)
        -> NDIlib_send_instance_t;
    fn NDIlib_send_destroy(p_instance: NDIlib_send_instance_t);
    fn NDIlib_send_send_video_v2(
        p_instance: NDIlib_send_instance_t,
        p_video_data: *const NDIlib_video_frame_v2_t,
    );
}

/// Handle to one NDI send instance
#[derive(Debug)]
pub struct NdiSendInstance(NonNull<c_void>);

// NDI send instances may be used from any thread, one call at a time.
unsafe impl Send for NdiSendInstance {}

/// Send engine backed by the NDI runtime
#[derive(Debug, Default)]
pub struct NdiEngine;

impl SendEngine for NdiEngine {
    type Handle = NdiSendInstance;

    fn initialize(&mut self) -> bool {
        unsafe { NDIlib_initialize() }
    }

    fn create_sender(&mut self, settings: &SenderSettings<'_>) -> Option<NdiSendInstance> {
        let create = NDIlib_send_create_t {
            p_ndi_name: settings.name.as_ptr(),
            p_groups: settings.groups.map_or(ptr::null(), |g| g.as_ptr()),
            clock_video: settings.clock_video,
            clock_audio: settings.clock_audio,
        };
        // The name strings are copied by NDIlib_send_create.
        let instance = unsafe { NDIlib_send_create(&create) };
        NonNull::new(instance).map(NdiSendInstance)
    }

    fn send_video(&mut self, sender: &NdiSendInstance, frame: &VideoFrameDescriptor<'_>) -> bool {
        let (Ok(xres), Ok(yres), Ok(stride)) = (
            c_int::try_from(frame.xres),
            c_int::try_from(frame.yres),
            c_int::try_from(frame.line_stride),
        ) else {
            log::warn!("Frame geometry does not fit the NDI frame header: {:?}", frame);
            return false;
        };

        let video = NDIlib_video_frame_v2_t {
            xres,
            yres,
            FourCC: frame.fourcc.0,
            frame_rate_N: frame.frame_rate_n,
            frame_rate_D: frame.frame_rate_d,
            picture_aspect_ratio: frame.picture_aspect_ratio,
            frame_format_type: frame.frame_format as c_int,
            timecode: frame.timecode,
            // Read-only for the synchronous send
            p_data: frame.data_ptr() as *mut u8,
            line_stride_in_bytes: stride,
            p_metadata: ptr::null(),
            timestamp: 0,
        };

        // Synchronous: NDI has consumed p_data when this returns.
        unsafe { NDIlib_send_send_video_v2(sender.0.as_ptr(), &video) };
        true
    }

    fn destroy_sender(&mut self, sender: NdiSendInstance) {
        unsafe { NDIlib_send_destroy(sender.0.as_ptr()) };
    }
}
