//! Frame Transmitter
//!
//! Owns one outbound sender channel and marshals normalized buffers into
//! wire frame descriptors for the send engine.
//!
//! Lifecycle: `Uninitialized -> Initialized -> ChannelOpen -> Closed`, where
//! `Closed` accepts a fresh `create`. Per-frame send failures never become
//! errors; they are counted in [`TransmitStats`].

use crate::descriptor::VideoFrameDescriptor;
use crate::engine::{SendEngine, SenderSettings};
use crate::error::TransmitError;
use crate::pixel_buffer::PixelBuffer;
use crate::types::PixelFormat;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Frame Transmitter configuration
#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    /// Comma-separated NDI groups; `None` for the default group
    pub groups: Option<String>,
    pub clock_video: bool,
    pub clock_audio: bool,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,
    /// Sends slower than this are counted as late
    pub send_budget: Duration,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            groups: None,
            clock_video: false,
            clock_audio: false,
            frame_rate_n: 30000,
            frame_rate_d: 1001,
            send_budget: Duration::from_micros(33_333),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Uninitialized,
    Initialized,
    ChannelOpen,
    Closed,
}

/// Result of one best-effort send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Sent, but slower than the configured budget
    Late(Duration),
    /// The engine dropped the frame
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_late: u64,
}

struct Channel<H> {
    handle: H,
    name: String,
}

/// Owns the outbound channel of one broadcast session
pub struct FrameTransmitter<E: SendEngine> {
    engine: E,
    config: TransmitterConfig,
    initialized: bool,
    closed: bool,
    channel: Option<Channel<E::Handle>>,

    // Statistics (atomic for lock-free reads)
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    frames_late: AtomicU64,
}

impl<E: SendEngine> FrameTransmitter<E> {
    pub fn new(engine: E, config: TransmitterConfig) -> Self {
        FrameTransmitter {
            engine,
            config,
            initialized: false,
            closed: false,
            channel: None,
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_late: AtomicU64::new(0),
        }
    }

    /// Bootstrap the send engine
    ///
    /// Idempotent: once it has succeeded the engine is not touched again.
    /// Returns `false` if the engine is unusable; the caller may retry.
    pub fn initialize(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        self.initialized = self.engine.initialize();
        if self.initialized {
            log::info!("Send engine initialized");
        } else {
            log::warn!("Send engine failed to initialize");
        }
        self.initialized
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> SenderState {
        match (&self.channel, self.initialized, self.closed) {
            (Some(_), _, _) => SenderState::ChannelOpen,
            (None, true, true) => SenderState::Closed,
            (None, true, false) => SenderState::Initialized,
            (None, false, _) => SenderState::Uninitialized,
        }
    }

    /// Name of the open channel
    pub fn channel_name(&self) -> Option<&str> {
        self.channel.as_ref().map(|c| c.name.as_str())
    }

    /// Open the outbound channel
    ///
    /// At most one channel exists at a time; a second `create` is rejected
    /// rather than replacing the first.
    pub fn create(&mut self, name: &str) -> Result<(), TransmitError> {
        if !self.initialized {
            return Err(TransmitError::NotInitialized);
        }
        if self.channel.is_some() {
            return Err(TransmitError::AlreadyCreated);
        }

        let invalid_name = || TransmitError::InvalidName {
            name: name.to_string(),
        };
        if name.is_empty() {
            return Err(invalid_name());
        }
        let c_name = CString::new(name).map_err(|_| invalid_name())?;
        let c_groups = self
            .config
            .groups
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|_| invalid_name())?;

        let settings = SenderSettings {
            name: &c_name,
            groups: c_groups.as_deref(),
            clock_video: self.config.clock_video,
            clock_audio: self.config.clock_audio,
        };

        let handle = self
            .engine
            .create_sender(&settings)
            .ok_or_else(|| TransmitError::CreateFailed {
                name: name.to_string(),
            })?;

        log::info!("Created sender channel {:?}", name);
        self.channel = Some(Channel {
            handle,
            name: name.to_string(),
        });
        self.closed = false;
        Ok(())
    }

    /// Send one canonical-format buffer
    ///
    /// The buffer stays read-locked until the synchronous engine call has
    /// returned. Engine drops and budget overruns are counted, not raised.
    pub fn send(&mut self, buffer: &PixelBuffer) -> Result<SendOutcome, TransmitError> {
        let channel = self.channel.as_ref().ok_or(TransmitError::NoChannel)?;

        let format = buffer.format();
        if !format.is_canonical() {
            return Err(TransmitError::InvalidFormat {
                expected: PixelFormat::CANONICAL,
                actual: format,
            });
        }

        let lock = buffer
            .lock_read()
            .ok_or(TransmitError::AddressUnavailable)?;
        let frame = VideoFrameDescriptor::from_locked(
            buffer,
            &lock,
            self.config.frame_rate_n,
            self.config.frame_rate_d,
        )?;

        let (xres, yres) = (frame.xres, frame.yres);

        let start = Instant::now();
        let accepted = self.engine.send_video(&channel.handle, &frame);
        let elapsed = start.elapsed();
        drop(lock);

        if !accepted {
            let dropped = self.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!("Send engine dropped a frame ({} dropped so far)", dropped);
            return Ok(SendOutcome::Dropped);
        }

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        if elapsed > self.config.send_budget {
            let late = self.frames_late.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "Send took {:?}, over the {:?} budget ({} late so far)",
                elapsed,
                self.config.send_budget,
                late
            );
            return Ok(SendOutcome::Late(elapsed));
        }

        log::trace!("Sent {}x{} frame", xres, yres);
        Ok(SendOutcome::Sent)
    }

    /// Close the outbound channel
    ///
    /// No-op when no channel is open.
    pub fn destroy(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        self.engine.destroy_sender(channel.handle);
        self.closed = true;
        log::info!("Destroyed sender channel {:?}", channel.name);
    }

    /// Get statistics
    pub fn stats(&self) -> TransmitStats {
        TransmitStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_late: self.frames_late.load(Ordering::Relaxed),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: SendEngine> Drop for FrameTransmitter<E> {
    fn drop(&mut self) {
        self.destroy();
    }
}
