//! Broadcast session driver
//!
//! Glues the capture callbacks to the pipeline: start opens the channel,
//! every video sample is duplicated then sent, and any error ends the
//! session with a reason. Audio samples are accepted and discarded.

use crate::compositor::{Compositor, PlaneCompositor};
use crate::engine::SendEngine;
use crate::error::SessionError;
use crate::normalizer::{FrameNormalizer, NormalizerConfig};
use crate::pixel_buffer::PixelBuffer;
use crate::transmitter::{
    FrameTransmitter, SendOutcome, SenderState, TransmitStats, TransmitterConfig,
};

/// Broadcast session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channel name advertised on the local network
    pub source_name: String,
    pub normalizer: NormalizerConfig,
    pub transmitter: TransmitterConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_name: "NDI Test".to_string(),
            normalizer: NormalizerConfig::default(),
            transmitter: TransmitterConfig::default(),
        }
    }
}

/// One sample delivered by the capture system
#[derive(Debug, Clone, Copy)]
pub enum SampleBuffer<'a> {
    Video(&'a PixelBuffer),
    AudioApp,
    AudioMic,
}

/// Drives one broadcast from start to finish
pub struct BroadcastSession<E: SendEngine, C: Compositor = PlaneCompositor> {
    source_name: String,
    normalizer: FrameNormalizer<C>,
    transmitter: FrameTransmitter<E>,
    finished: bool,
    failure: Option<SessionError>,
}

impl<E: SendEngine> BroadcastSession<E, PlaneCompositor> {
    pub fn new(engine: E, config: SessionConfig) -> Self {
        Self::with_compositor(engine, PlaneCompositor, config)
    }
}

impl<E: SendEngine, C: Compositor> BroadcastSession<E, C> {
    pub fn with_compositor(engine: E, compositor: C, config: SessionConfig) -> Self {
        BroadcastSession {
            source_name: config.source_name,
            normalizer: FrameNormalizer::with_compositor(config.normalizer, compositor),
            transmitter: FrameTransmitter::new(engine, config.transmitter),
            finished: false,
            failure: None,
        }
    }

    /// Initialize the engine and open the channel
    ///
    /// An engine that failed to initialize surfaces as `NotInitialized`
    /// from the create step.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.transmitter.initialize();
        match self.transmitter.create(&self.source_name) {
            Ok(()) => {
                self.finished = false;
                self.failure = None;
                Ok(())
            }
            Err(e) => Err(self.fail(SessionError::Start(e))),
        }
    }

    /// Push one captured sample through the pipeline
    ///
    /// Samples arriving after the session finished are ignored.
    pub fn process_sample(&mut self, sample: SampleBuffer<'_>) -> Result<(), SessionError> {
        if self.finished {
            log::trace!("Ignoring sample after session finished");
            return Ok(());
        }

        match sample {
            SampleBuffer::Video(buffer) => match self.send_video(buffer) {
                Ok(_) => Ok(()),
                Err(e) => Err(self.fail(e)),
            },
            SampleBuffer::AudioApp | SampleBuffer::AudioMic => Ok(()),
        }
    }

    fn send_video(&mut self, buffer: &PixelBuffer) -> Result<SendOutcome, SessionError> {
        let normalized = self.normalizer.duplicate(buffer)?;
        Ok(self.transmitter.send(&normalized)?)
    }

    /// End the session and close the channel; idempotent
    pub fn finish(&mut self) {
        if !self.finished {
            log::info!("Broadcast session {:?} finished", self.source_name);
        }
        self.finished = true;
        self.transmitter.destroy();
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        log::warn!("Broadcast session failed: {}", error);
        self.failure = Some(error.clone());
        self.finish();
        error
    }

    pub fn is_running(&self) -> bool {
        !self.finished && self.transmitter.state() == SenderState::ChannelOpen
    }

    /// Reason the session ended early, if it did
    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    pub fn stats(&self) -> TransmitStats {
        self.transmitter.stats()
    }

    pub fn normalizer(&self) -> &FrameNormalizer<C> {
        &self.normalizer
    }

    pub fn transmitter(&self) -> &FrameTransmitter<E> {
        &self.transmitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NormalizeError, TransmitError};
    use crate::testing::RecordingEngine;
    use crate::types::{ExtendedPixels, PixelFormat};

    fn frame(width: u32, height: u32, fill: u8) -> PixelBuffer {
        let buffer = PixelBuffer::new(
            PixelFormat::Nv12FullRange,
            width,
            height,
            ExtendedPixels::new(0, 0, 0, 8),
        )
        .unwrap();
        buffer.lock_write().unwrap().plane_mut(0).unwrap().fill(fill);
        buffer
    }

    #[test]
    fn test_video_samples_flow_to_engine() {
        let engine = RecordingEngine::new();
        let log = engine.log();
        let mut session = BroadcastSession::new(engine, SessionConfig::default());
        session.start().unwrap();
        assert!(session.is_running());

        for fill in 0..3 {
            let captured = frame(1280, 720, fill);
            session.process_sample(SampleBuffer::Video(&captured)).unwrap();
        }
        session.process_sample(SampleBuffer::AudioApp).unwrap();
        session.process_sample(SampleBuffer::AudioMic).unwrap();
        session.finish();

        let log = log.lock();
        assert_eq!(log.created, vec!["NDI Test"]);
        assert_eq!(log.frames.len(), 3);
        assert_eq!(log.frames[2].yres, 728);
        assert!(log.frames[2].first_row.iter().all(|&b| b == 2));
        assert_eq!(log.destroyed, vec![1]);
        assert_eq!(session.stats().frames_sent, 3);
        assert_eq!(session.normalizer().pool_rebuilds(), 1);
    }

    #[test]
    fn test_start_without_engine_fails() {
        let mut engine = RecordingEngine::new();
        engine.initialize_result = false;
        let mut session = BroadcastSession::new(engine, SessionConfig::default());

        assert_eq!(
            session.start(),
            Err(SessionError::Start(TransmitError::NotInitialized))
        );
        assert!(!session.is_running());
        assert!(session.failure().is_some());
    }

    #[test]
    fn test_unsupported_frame_ends_session() {
        let engine = RecordingEngine::new();
        let log = engine.log();
        let mut session = BroadcastSession::new(engine, SessionConfig::default());
        session.start().unwrap();

        let bgra = PixelBuffer::new(PixelFormat::Bgra, 64, 64, ExtendedPixels::NONE).unwrap();
        let err = session.process_sample(SampleBuffer::Video(&bgra)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Normalize(NormalizeError::UnsupportedFormat { .. })
        ));
        assert!(!session.is_running());
        assert_eq!(log.lock().destroyed, vec![1]);

        // Later samples are ignored
        let captured = frame(64, 64, 0);
        session.process_sample(SampleBuffer::Video(&captured)).unwrap();
        assert!(log.lock().frames.is_empty());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let engine = RecordingEngine::new();
        let log = engine.log();
        let mut session = BroadcastSession::new(engine, SessionConfig::default());
        session.start().unwrap();

        session.finish();
        session.finish();
        assert_eq!(log.lock().destroyed.len(), 1);
        assert!(session.failure().is_none());
    }

    #[test]
    fn test_session_can_restart_after_finish() {
        let engine = RecordingEngine::new();
        let log = engine.log();
        let mut session = BroadcastSession::new(engine, SessionConfig::default());
        session.start().unwrap();
        session.finish();
        session.start().unwrap();

        assert!(session.is_running());
        assert_eq!(log.lock().initialize_calls, 1);
        assert_eq!(log.lock().created.len(), 2);
    }
}
