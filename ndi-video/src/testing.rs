//! In-process send engine that records every call
//!
//! Shares its log through an `Arc` so tests can inspect it after the engine
//! has been moved into a transmitter or session.
//!
//! Available behind the `test-util` feature or in `#[cfg(test)]`.

use crate::descriptor::VideoFrameDescriptor;
use crate::engine::{SendEngine, SenderSettings};
use crate::types::FourCc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// What the engine saw for one sent frame
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub sender: u64,
    pub xres: u32,
    pub yres: u32,
    pub fourcc: FourCc,
    pub line_stride: usize,
    pub data_len: usize,
    /// Visible bytes of the first row
    pub first_row: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct EngineLog {
    pub initialize_calls: usize,
    pub created: Vec<String>,
    pub destroyed: Vec<u64>,
    pub frames: Vec<SentFrame>,
}

type SendHook = Box<dyn FnMut(&VideoFrameDescriptor<'_>) + Send>;

/// Scriptable [`SendEngine`] for tests and benchmarks
pub struct RecordingEngine {
    log: Arc<Mutex<EngineLog>>,
    next_sender: u64,
    pub initialize_result: bool,
    pub refuse_create: bool,
    pub send_result: bool,
    pub send_delay: Option<Duration>,
    pub keep_frames: bool,
    on_send: Option<SendHook>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        RecordingEngine {
            log: Arc::new(Mutex::new(EngineLog::default())),
            next_sender: 1,
            initialize_result: true,
            refuse_create: false,
            send_result: true,
            send_delay: None,
            keep_frames: true,
            on_send: None,
        }
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the call log
    pub fn log(&self) -> Arc<Mutex<EngineLog>> {
        self.log.clone()
    }

    /// Run `hook` inside every `send_video` call
    pub fn on_send(mut self, hook: impl FnMut(&VideoFrameDescriptor<'_>) + Send + 'static) -> Self {
        self.on_send = Some(Box::new(hook));
        self
    }
}

impl SendEngine for RecordingEngine {
    type Handle = u64;

    fn initialize(&mut self) -> bool {
        self.log.lock().initialize_calls += 1;
        self.initialize_result
    }

    fn create_sender(&mut self, settings: &SenderSettings<'_>) -> Option<u64> {
        if self.refuse_create {
            return None;
        }
        let id = self.next_sender;
        self.next_sender += 1;
        self.log
            .lock()
            .created
            .push(settings.name.to_string_lossy().into_owned());
        Some(id)
    }

    fn send_video(&mut self, sender: &u64, frame: &VideoFrameDescriptor<'_>) -> bool {
        if let Some(hook) = self.on_send.as_mut() {
            hook(frame);
        }
        if let Some(delay) = self.send_delay {
            std::thread::sleep(delay);
        }
        if self.keep_frames {
            let row = frame.xres as usize;
            self.log.lock().frames.push(SentFrame {
                sender: *sender,
                xres: frame.xres,
                yres: frame.yres,
                fourcc: frame.fourcc,
                line_stride: frame.line_stride,
                data_len: frame.data().len(),
                first_row: frame.data()[..row].to_vec(),
            });
        }
        self.send_result
    }

    fn destroy_sender(&mut self, sender: u64) {
        self.log.lock().destroyed.push(sender);
    }
}
