//! GStreamer pipeline setup and bus handling
//!
//! Each session is a `playbin` whose video sink is an RGBA `AppSink`. Audio
//! is discarded. The AppSink callbacks run on the streaming thread: preroll
//! publishes the decoded geometry, every sample is pushed to the coordinator
//! through the session's [`FrameSender`].

use super::{FrameSender, LifecycleState, StreamStatus};
use anyhow::{Context, Result};
use common::PlaybackError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

/// Initialize GStreamer (idempotent, safe to call multiple times)
pub fn initialize_gstreamer() -> Result<()> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized");
            Ok(())
        })
        .clone()
        .map_err(|e| anyhow::anyhow!("Failed to initialize GStreamer: {}", e))
}

/// Turn a URL or local path into something `playbin` accepts
pub fn to_uri(url: &str) -> Result<String> {
    if url.contains("://") {
        return Ok(url.to_string());
    }

    let path = Path::new(url)
        .canonicalize()
        .with_context(|| format!("Video file not found: {}", url))?;
    let uri = gst::glib::filename_to_uri(&path, None)
        .with_context(|| format!("Cannot build URI for {}", path.display()))?;
    Ok(uri.to_string())
}

/// Build a `playbin` pipeline with an RGBA AppSink as video sink
pub fn build_pipeline(name: &str, uri: &str) -> Result<(gst::Element, gst_app::AppSink)> {
    log::debug!("Creating playbin '{}' for {}", name, uri);

    let app_sink = gst_app::AppSink::builder()
        .caps(
            &gst_video::VideoCapsBuilder::new()
                .format(gst_video::VideoFormat::Rgba)
                .build(),
        )
        .max_buffers(2)
        .drop(true)
        .sync(true)
        .build();

    let audio_sink = gst::ElementFactory::make("fakesink")
        .property("sync", true)
        .build()
        .context("Failed to create audio sink")?;

    let pipeline = gst::ElementFactory::make("playbin")
        .name(name)
        .property("uri", uri)
        .property("video-sink", &app_sink)
        .property("audio-sink", &audio_sink)
        .build()
        .context("Failed to create playbin")?;

    Ok((pipeline, app_sink))
}

/// Geometry from negotiated caps
fn caps_geometry(sample: &gst::Sample) -> Option<(u32, u32)> {
    let caps = sample.caps()?;
    let info = gst_video::VideoInfo::from_caps(caps).ok()?;
    Some((info.width(), info.height()))
}

/// Setup preroll and sample callbacks for the AppSink
pub fn setup_frame_callbacks(
    app_sink: &gst_app::AppSink,
    status: Arc<Mutex<StreamStatus>>,
    frames: FrameSender,
) {
    let preroll_status = Arc::clone(&status);

    app_sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_preroll(move |sink| {
                let sample = sink.pull_preroll().map_err(|_| gst::FlowError::Eos)?;
                if let Some((width, height)) = caps_geometry(&sample)
                    && let Ok(mut status) = preroll_status.lock()
                    && !status.video_info.is_ready
                {
                    status.video_info.set_geometry(width, height);
                    log::debug!("Prerolled {}x{}", width, height);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;

                // Geometry may change mid-stream
                if let Some((width, height)) = caps_geometry(&sample)
                    && let Ok(mut status) = status.lock()
                    && (status.video_info.width != width || status.video_info.height != height)
                {
                    status.video_info.set_geometry(width, height);
                }

                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                #[cfg(feature = "profiling")]
                log::trace!(
                    "Frame from {} ({} bytes)",
                    frames.id().slot.name(),
                    map.as_slice().len()
                );

                frames.send(map.as_slice().to_vec());
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

/// Drain the bus into `status`.
///
/// Drains every pending message so the bus never grows unbounded.
pub fn drain_bus(pipeline: &gst::Element, status: &Mutex<StreamStatus>) {
    let Some(bus) = pipeline.bus() else {
        return;
    };
    let Ok(mut status) = status.lock() else {
        return;
    };

    while let Some(msg) = bus.pop() {
        match msg.view() {
            gst::MessageView::Eos(_) => {
                log::info!("{}: end of stream", pipeline.name());
                status.state = LifecycleState::Ended;
            }

            gst::MessageView::Error(err) => {
                log::error!(
                    "{}: GStreamer error: {} (debug: {:?})",
                    pipeline.name(),
                    err.error(),
                    err.debug()
                );
                // Errors before the first frame mean the source never opened
                let message = err.error().to_string();
                let error = match status.state {
                    LifecycleState::Opening | LifecycleState::Buffering => {
                        PlaybackError::LoadFailure(message)
                    }
                    _ => PlaybackError::DecodeError(message),
                };
                status.state = LifecycleState::Error;
                status.error = Some(error.to_string());
            }

            gst::MessageView::Warning(warning) => {
                log::warn!("{}: {}", pipeline.name(), warning.error());
                status.warning = Some(warning.error().to_string());
            }

            gst::MessageView::Buffering(buffering) => {
                let percent = buffering.percent().clamp(0, 100);
                status.video_info.buffer_level_pct = percent as f32;
                status.info = (percent < 100).then(|| format!("Buffering {}%", percent));
                if status.state == LifecycleState::Opening {
                    status.state = LifecycleState::Buffering;
                }
            }

            gst::MessageView::StateChanged(change)
                if change
                    .src()
                    .is_some_and(|src| src == pipeline.upcast_ref::<gst::Object>()) =>
            {
                if status.state.is_finished() {
                    continue;
                }
                match (change.current(), change.pending()) {
                    (gst::State::Playing, _) => status.state = LifecycleState::Playing,
                    (gst::State::Paused, gst::State::VoidPending) => {
                        status.state = LifecycleState::Paused;
                    }
                    (gst::State::Paused, _) if status.state == LifecycleState::Opening => {
                        status.state = LifecycleState::Buffering;
                    }
                    _ => {}
                }
            }

            gst::MessageView::AsyncDone(_) => {
                // Local sources never post buffering messages
                if status.video_info.buffer_level_pct == 0.0 && status.info.is_none() {
                    status.video_info.buffer_level_pct = 100.0;
                }
            }

            _ => {}
        }
    }
}

/// Stop a pipeline and release its resources
pub fn shutdown(pipeline: &gst::Element, app_sink: &gst_app::AppSink) {
    // Clear callbacks first to prevent new frames
    app_sink.set_callbacks(gst_app::AppSinkCallbacks::builder().build());

    if let Err(e) = pipeline.set_state(gst::State::Null) {
        log::warn!("{}: failed to set pipeline to Null: {}", pipeline.name(), e);
    }

    if let Some(bus) = pipeline.bus() {
        let mut drained = 0;
        while bus.pop().is_some() {
            drained += 1;
        }
        if drained > 0 {
            log::debug!("Drained {} pending messages from bus", drained);
        }
    }
}
