//! Scripted controller for coordinator tests
//!
//! The test keeps a [`FakeHandle`] to the same state the controller uses, so
//! it can play the backend's part: report readiness, buffer levels and end
//! of stream, and push frames through the sender of the current session.

use super::{FrameSender, LifecycleState, StreamController, StreamStatus};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Play(String),
    Pause(bool),
    Stop,
    Seek(f32),
    Speed(f32),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub status: StreamStatus,
    pub calls: Vec<Call>,
    pub frames: Option<FrameSender>,
    pub paused: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeHandle(Arc<Mutex<FakeState>>);

impl FakeHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.0.lock().unwrap().calls.clear();
    }

    pub fn url(&self) -> String {
        self.0.lock().unwrap().status.video_url.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.0.lock().unwrap().paused
    }

    /// Report decoded geometry and a buffer level
    pub fn make_ready(&self, width: u32, height: u32, total_ms: u64, buffer_pct: f32) {
        let mut state = self.0.lock().unwrap();
        state.status.video_info.set_geometry(width, height);
        state.status.video_info.total_time_ms = total_ms;
        state.status.video_info.buffer_level_pct = buffer_pct;
        state.status.state = LifecycleState::Playing;
    }

    pub fn set_buffer_level(&self, pct: f32) {
        self.0.lock().unwrap().status.video_info.buffer_level_pct = pct;
    }

    pub fn set_position(&self, ms: u64) {
        self.0.lock().unwrap().status.video_info.current_time_ms = ms;
    }

    pub fn set_state(&self, state: LifecycleState) {
        self.0.lock().unwrap().status.state = state;
    }

    pub fn set_error(&self, message: &str) {
        let mut state = self.0.lock().unwrap();
        state.status.state = LifecycleState::Error;
        state.status.error = Some(message.to_string());
    }

    /// Push a frame through the current session, as the streaming thread would
    pub fn push_frame(&self, data: Vec<u8>) -> bool {
        let sender = self.0.lock().unwrap().frames.clone();
        sender.is_some_and(|s| s.send(data))
    }

    /// Sender of the current session. Clone it before a `stop` to model late frames.
    pub fn sender(&self) -> Option<FrameSender> {
        self.0.lock().unwrap().frames.clone()
    }
}

pub struct FakeController {
    handle: FakeHandle,
}

impl FakeController {
    pub fn new() -> (Self, FakeHandle) {
        let handle = FakeHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl StreamController for FakeController {
    fn play(&mut self, url: &str, frames: FrameSender) {
        let mut state = self.handle.0.lock().unwrap();
        state.calls.push(Call::Play(url.to_string()));
        state.status = StreamStatus {
            video_url: url.to_string(),
            state: LifecycleState::Opening,
            ..Default::default()
        };
        state.frames = Some(frames);
        state.paused = false;
    }

    fn pause(&mut self, paused: bool) {
        let mut state = self.handle.0.lock().unwrap();
        state.calls.push(Call::Pause(paused));
        state.paused = paused;
        state.status.state = match (state.status.state, paused) {
            (LifecycleState::Playing, true) => LifecycleState::Paused,
            (LifecycleState::Paused, false) => LifecycleState::Playing,
            (other, _) => other,
        };
    }

    fn stop(&mut self) {
        let mut state = self.handle.0.lock().unwrap();
        state.calls.push(Call::Stop);
        state.status = StreamStatus::default();
        state.frames = None;
        state.paused = false;
    }

    fn seek(&mut self, fraction: f32) {
        self.handle.0.lock().unwrap().calls.push(Call::Seek(fraction));
    }

    fn set_playback_speed(&mut self, rate: f32) {
        self.handle.0.lock().unwrap().calls.push(Call::Speed(rate));
    }

    fn status(&self) -> StreamStatus {
        self.handle.0.lock().unwrap().status.clone()
    }
}
