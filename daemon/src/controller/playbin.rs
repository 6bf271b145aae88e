//! GStreamer-backed stream controller

use super::pipeline;
use super::{FrameSender, LifecycleState, SpeedLimits, StreamController, StreamStatus};
use common::PlaybackError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::sync::{Arc, Mutex};

/// A live pipeline and the status its callbacks write into
struct Session {
    pipeline: gst::Element,
    app_sink: gst_app::AppSink,
    status: Arc<Mutex<StreamStatus>>,
    paused: bool,
    /// Whether the pipeline already runs at the controller's rate
    rate_applied: bool,
}

/// One `playbin` session at a time.
///
/// Each `play` builds a fresh pipeline with a fresh status cell, so late
/// callbacks from a torn-down pipeline can only touch state nobody reads.
pub struct PlaybinController {
    name: &'static str,
    limits: SpeedLimits,
    rate: f64,
    session: Option<Session>,
    /// Status kept when there is no live session (idle or failed load)
    idle_status: StreamStatus,
}

impl PlaybinController {
    pub fn new(name: &'static str, limits: SpeedLimits) -> Self {
        Self {
            name,
            limits,
            rate: 1.0,
            session: None,
            idle_status: StreamStatus::default(),
        }
    }

    fn start(&self, url: &str, frames: FrameSender) -> anyhow::Result<Session> {
        pipeline::initialize_gstreamer()?;
        let uri = pipeline::to_uri(url)?;

        let pipeline_name = format!("{}-{}", self.name, frames.id().session);
        let (pipeline, app_sink) = pipeline::build_pipeline(&pipeline_name, &uri)?;

        let status = Arc::new(Mutex::new(StreamStatus {
            video_url: url.to_string(),
            state: LifecycleState::Opening,
            ..Default::default()
        }));
        pipeline::setup_frame_callbacks(&app_sink, Arc::clone(&status), frames);

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            pipeline::shutdown(&pipeline, &app_sink);
            anyhow::bail!("Failed to start pipeline: {}", e);
        }

        Ok(Session {
            pipeline,
            app_sink,
            status,
            paused: false,
            rate_applied: self.rate == 1.0,
        })
    }

    /// Re-apply a non-default rate once the new pipeline reports a position
    fn apply_pending_rate(&mut self) {
        let rate = self.rate;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.rate_applied {
            return;
        }
        if let Some(position) = session.pipeline.query_position::<gst::ClockTime>() {
            session.rate_applied = seek_pipeline(self.name, &session.pipeline, rate, position);
        }
    }
}

/// Flushing seek that also sets the playback rate
fn seek_pipeline(name: &str, pipeline: &gst::Element, rate: f64, position: gst::ClockTime) -> bool {
    let result = pipeline.seek(
        rate,
        gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
        gst::SeekType::Set,
        position,
        gst::SeekType::End,
        gst::ClockTime::ZERO,
    );
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{}: seek to {} failed: {}", name, position, e);
            false
        }
    }
}

impl StreamController for PlaybinController {
    fn play(&mut self, url: &str, frames: FrameSender) {
        self.stop();
        log::info!("{}: loading {}", self.name, url);

        match self.start(url, frames) {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                let err = PlaybackError::LoadFailure(format!("{:#}", e));
                log::error!("{}: {}", self.name, err);
                self.idle_status = StreamStatus {
                    video_url: url.to_string(),
                    state: LifecycleState::Error,
                    error: Some(err.to_string()),
                    ..Default::default()
                };
            }
        }
    }

    fn pause(&mut self, paused: bool) {
        self.apply_pending_rate();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.paused == paused {
            return;
        }

        let target = if paused {
            gst::State::Paused
        } else {
            gst::State::Playing
        };
        match session.pipeline.set_state(target) {
            Ok(_) => session.paused = paused,
            Err(e) => log::warn!("{}: failed to set {:?}: {}", self.name, target, e),
        }
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("{}: stopping {}", self.name, session.pipeline.name());
            pipeline::shutdown(&session.pipeline, &session.app_sink);
        }
        self.idle_status = StreamStatus::default();
    }

    fn seek(&mut self, fraction: f32) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(duration) = session.pipeline.query_duration::<gst::ClockTime>() else {
            log::debug!("{}: seek ignored, duration unknown", self.name);
            return;
        };

        let fraction = f64::from(fraction.clamp(0.0, 1.0));
        let position =
            gst::ClockTime::from_nseconds((duration.nseconds() as f64 * fraction) as u64);
        seek_pipeline(self.name, &session.pipeline, self.rate, position);
    }

    fn set_playback_speed(&mut self, rate: f32) {
        let rate = self.limits.clamp(rate);
        if f64::from(rate) == self.rate {
            return;
        }
        self.rate = f64::from(rate);
        log::info!("{}: playback speed {:.2}", self.name, rate);

        // Applied on a later cycle if the position is not known yet
        if let Some(session) = self.session.as_mut() {
            session.rate_applied = false;
        }
        self.apply_pending_rate();
    }

    fn status(&self) -> StreamStatus {
        let Some(session) = self.session.as_ref() else {
            return self.idle_status.clone();
        };

        pipeline::drain_bus(&session.pipeline, &session.status);

        let mut status = match session.status.lock() {
            Ok(status) => status.clone(),
            Err(_) => return self.idle_status.clone(),
        };

        if let Some(duration) = session.pipeline.query_duration::<gst::ClockTime>() {
            status.video_info.total_time_ms = duration.mseconds();
        }
        if let Some(position) = session.pipeline.query_position::<gst::ClockTime>() {
            status.video_info.current_time_ms = position.mseconds();
        }
        status
    }
}

impl Drop for PlaybinController {
    fn drop(&mut self) {
        self.stop();
    }
}
