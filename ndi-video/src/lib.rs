//! NDI Video Pipeline
//!
//! Normalizes captured screen frames and transmits them over NDI.
//!
//! Per frame: capture callback -> [`FrameNormalizer::duplicate`] ->
//! [`FrameTransmitter::send`]. Both stages run synchronously on the capture
//! callback; there is no queue between them.
//!
//! Key points:
//! - Closed [`PixelFormat`] enum; only biplanar 4:2:0 full range is accepted
//! - Output buffers come from a recycling pool rebuilt on geometry change
//! - Transmitted height includes the bottom extended-pixel rows
//! - Per-frame send failures are counted, never raised

pub mod buffer_pool;
pub mod compositor;
pub mod descriptor;
pub mod engine;
pub mod error;
#[cfg(feature = "libndi")]
pub mod ndi;
pub mod normalizer;
pub mod pixel_buffer;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transmitter;
pub mod types;

pub use buffer_pool::*;
pub use compositor::*;
pub use descriptor::*;
pub use engine::*;
pub use error::*;
#[cfg(feature = "libndi")]
pub use ndi::*;
pub use normalizer::*;
pub use pixel_buffer::*;
pub use session::*;
pub use transmitter::*;
pub use types::*;

pub fn version() -> &'static str {
    "0.1.0"
}
