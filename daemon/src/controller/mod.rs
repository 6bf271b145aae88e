//! Playback sessions against the media backend
//!
//! A [`StreamController`] owns one playback session: it takes commands from
//! the coordinator and reports a polled [`StreamStatus`]. Decoded frames are
//! pushed from the backend's own streaming thread through a [`FrameSender`],
//! tagged with the [`ControllerId`] the coordinator handed out when the
//! session started.
//!
//! - `pipeline`: GStreamer pipeline setup, frame callbacks and bus handling
//! - `playbin`: the GStreamer-backed controller
//! - `fake`: scripted controller used by the coordinator tests

#[cfg(feature = "video")]
mod pipeline;
#[cfg(feature = "video")]
mod playbin;

#[cfg(test)]
pub mod fake;

#[cfg(feature = "video")]
pub use playbin::PlaybinController;

#[cfg(not(feature = "video"))]
pub use playbin_stub::PlaybinController;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Lifecycle of one playback session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Opening,
    Buffering,
    Playing,
    Paused,
    Ended,
    Error,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Opening => "Opening",
            Self::Buffering => "Buffering",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Ended => "Ended",
            Self::Error => "Error",
        }
    }

    /// Playback will not continue without a new `play`
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

/// Geometry, timing and buffering of the current source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub total_time_ms: u64,
    pub current_time_ms: u64,
    /// Read-ahead buffer fill, 0 - 100
    pub buffer_level_pct: f32,
    /// Valid only once `is_ready`
    pub frame_size_bytes: usize,
    pub is_ready: bool,
}

/// Bytes per RGBA pixel delivered by every backend
pub const BYTES_PER_PIXEL: usize = 4;

impl VideoInfo {
    /// Mark the geometry known
    pub fn set_geometry(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.frame_size_bytes = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(BYTES_PER_PIXEL);
        self.is_ready = width > 0 && height > 0;
    }
}

/// Snapshot of one controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStatus {
    pub video_url: String,
    pub video_info: VideoInfo,
    pub state: LifecycleState,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub info: Option<String>,
}

/// Structural position of a controller inside the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerSlot {
    First,
    Second,
}

impl ControllerSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::First => "main",
            Self::Second => "spare",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// Identity attached to every delivered frame.
///
/// `session` increases every time the coordinator starts or stops a
/// session on `slot`, so frames from an earlier session never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerId {
    pub slot: ControllerSlot,
    pub session: u64,
}

/// One decoded RGBA frame
#[derive(Debug)]
pub struct FrameMessage {
    pub data: Vec<u8>,
    pub source: ControllerId,
}

/// Producer half of the frame channel handed to a controller on `play`.
///
/// Never blocks the streaming thread: a frame that does not fit in the
/// bounded channel is dropped and counted.
#[derive(Debug, Clone)]
pub struct FrameSender {
    id: ControllerId,
    tx: mpsc::Sender<FrameMessage>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    pub fn new(id: ControllerId, tx: mpsc::Sender<FrameMessage>, dropped: Arc<AtomicU64>) -> Self {
        Self { id, tx, dropped }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Queue a frame, returns false if it was dropped
    pub fn send(&self, data: Vec<u8>) -> bool {
        match self.tx.try_send(FrameMessage {
            data,
            source: self.id,
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Frame from {} dropped (queue full)", self.id.slot.name());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Backend bounds for playback rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimits {
    pub min: f32,
    pub max: f32,
}

impl SpeedLimits {
    pub fn clamp(&self, rate: f32) -> f32 {
        if rate.is_nan() {
            return 1.0;
        }
        rate.clamp(self.min, self.max)
    }
}

impl Default for SpeedLimits {
    fn default() -> Self {
        Self {
            min: 0.25,
            max: 4.0,
        }
    }
}

/// Command surface of one playback session.
///
/// Every call returns promptly. Failures never come back as errors: they
/// move the session to [`LifecycleState::Error`] and show up in `status`.
pub trait StreamController: Send {
    /// Open `url` and start delivering frames through `frames`
    fn play(&mut self, url: &str, frames: FrameSender);

    fn pause(&mut self, paused: bool);

    /// Release the session. Safe in any state.
    fn stop(&mut self);

    /// Jump to `fraction` of the duration; ignored until the duration is known
    fn seek(&mut self, fraction: f32);

    fn set_playback_speed(&mut self, rate: f32);

    fn status(&self) -> StreamStatus;
}

#[cfg(not(feature = "video"))]
mod playbin_stub {
    use super::{FrameSender, LifecycleState, SpeedLimits, StreamController, StreamStatus};
    use common::PlaybackError;

    /// Stub controller when the video feature is disabled.
    ///
    /// Every load ends in a load failure.
    pub struct PlaybinController {
        status: StreamStatus,
    }

    impl PlaybinController {
        pub fn new(_name: &'static str, _limits: SpeedLimits) -> Self {
            Self {
                status: StreamStatus::default(),
            }
        }
    }

    impl StreamController for PlaybinController {
        fn play(&mut self, url: &str, _frames: FrameSender) {
            self.status = StreamStatus {
                video_url: url.to_string(),
                state: LifecycleState::Error,
                error: Some(
                    PlaybackError::LoadFailure("Video support not compiled in".to_string())
                        .to_string(),
                ),
                ..Default::default()
            };
        }

        fn pause(&mut self, _paused: bool) {}

        fn stop(&mut self) {
            self.status = StreamStatus::default();
        }

        fn seek(&mut self, _fraction: f32) {}

        fn set_playback_speed(&mut self, _rate: f32) {}

        fn status(&self) -> StreamStatus {
            self.status.clone()
        }
    }
}
