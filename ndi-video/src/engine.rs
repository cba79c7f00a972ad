//! Seam between the transmitter and the network send engine

use crate::descriptor::VideoFrameDescriptor;
use std::ffi::CStr;

/// Settings for one outbound channel
#[derive(Debug, Clone, Copy)]
pub struct SenderSettings<'a> {
    pub name: &'a CStr,
    pub groups: Option<&'a CStr>,
    pub clock_video: bool,
    pub clock_audio: bool,
}

/// A synchronous network video send engine
///
/// Implementations must finish reading `frame.data()` before `send_video`
/// returns; the buffer is recycled right after.
pub trait SendEngine {
    /// Opaque per-channel handle
    type Handle;

    /// Bootstrap the engine; `false` if it is unusable on this machine
    fn initialize(&mut self) -> bool;

    fn create_sender(&mut self, settings: &SenderSettings<'_>) -> Option<Self::Handle>;

    /// Send one frame; `false` if the engine dropped it
    fn send_video(&mut self, sender: &Self::Handle, frame: &VideoFrameDescriptor<'_>) -> bool;

    fn destroy_sender(&mut self, sender: Self::Handle);
}

/// Engine that accepts every call and sends nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEngine;

impl SendEngine for NullEngine {
    type Handle = ();

    fn initialize(&mut self) -> bool {
        true
    }

    fn create_sender(&mut self, _settings: &SenderSettings<'_>) -> Option<()> {
        Some(())
    }

    fn send_video(&mut self, _sender: &(), _frame: &VideoFrameDescriptor<'_>) -> bool {
        true
    }

    fn destroy_sender(&mut self, _sender: ()) {}
}
