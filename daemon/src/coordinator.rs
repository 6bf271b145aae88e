//! Dual-session handover coordinator
//!
//! Drives a [`StreamControllerPair`]: the active controller renders, the
//! handover controller pre-buffers whatever should play next (a new URL, or
//! the same URL again for a gapless loop). When the handover controller has
//! buffered enough, the roles swap on the following cycle.
//!
//! Each cycle runs in a fixed order:
//! 1. refresh both controller statuses and the parameters
//! 2. take in frames that arrived since the last cycle
//! 3. decide on loads, swaps and ordinary playback
//! 4. evaluate output format and handover readiness
//!
//! A handover that becomes ready in step 4 is therefore swapped in by step 3
//! of the next cycle at the earliest.

use crate::controller::{
    ControllerId, ControllerSlot, FrameMessage, FrameSender, LifecycleState, StreamController,
    StreamStatus,
};
use crate::frame_buffer::FrameBuffer;
use crate::info::{self, InfoField, InfoValue};
use crate::inputs::{InputArrays, InputTable};
use crate::node::{NodeReport, PollNode, RenderSink};
use crate::pair::{ControllerRole, StreamControllerPair};
use crate::parameters::PlaybackParameters;
use crate::stats::{CycleStats, Discard};
use common::OutputFormat;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TopState {
    /// No active source with known geometry
    None,
    /// Geometry known, not producing frames
    ReadyToRun,
    /// Producing frames
    Running,
}

impl TopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::ReadyToRun => "ReadyToRun",
            Self::Running => "Running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverState {
    NoHandover,
    /// Handover controller is loading
    Initiated,
    /// Buffered past the threshold, waiting for the swap
    Ready,
}

impl HandoverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoHandover => "No handover",
            Self::Initiated => "Initiated",
            Self::Ready => "Ready",
        }
    }
}

/// What the next `consume_frame` hands out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum PendingOutput {
    #[default]
    Nothing,
    Frame,
    Blackout,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Handover buffer level (percent) at which the swap may happen
    pub ready_buffer_level: f32,
    /// Frames buffered between the streaming threads and the cycle
    pub frame_queue_depth: usize,
    pub stats_interval: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            ready_buffer_level: 90.0,
            frame_queue_depth: 4,
            stats_interval: Duration::from_secs(5),
        }
    }
}

fn slot_index(slot: ControllerSlot) -> usize {
    match slot {
        ControllerSlot::First => 0,
        ControllerSlot::Second => 1,
    }
}

/// Whole seconds of `sec`, in milliseconds
fn whole_seconds_ms(sec: f32) -> u64 {
    if sec.is_finite() && sec > 0.0 {
        (sec.trunc() as u64).saturating_mul(1000)
    } else {
        0
    }
}

pub struct HandoverCoordinator<C> {
    settings: CoordinatorSettings,
    table: Arc<InputTable>,
    params: PlaybackParameters,
    pair: StreamControllerPair<C>,

    /// One bounded frame queue per slot, so a buffering handover session
    /// cannot crowd out active frames
    frame_tx: [mpsc::Sender<FrameMessage>; 2],
    frame_rx: [mpsc::Receiver<FrameMessage>; 2],
    /// Current session per slot; frames tagged otherwise are stale
    sessions: [u64; 2],
    session_counter: u64,

    top_state: TopState,
    handover_state: HandoverState,
    active_status: StreamStatus,
    handover_status: StreamStatus,

    frame_buffer: Arc<FrameBuffer>,
    /// Geometry and message of the last failed reallocation
    alloc_failure: Option<((u32, u32), String)>,
    pending: PendingOutput,
    format: Option<OutputFormat>,

    start_time_ms: u64,
    end_time_ms: u64,
    need_adjust_start_active: bool,
    need_adjust_start_handover: bool,

    execute_count: u64,
    stats: CycleStats,
}

impl<C: StreamController> HandoverCoordinator<C> {
    pub fn new(
        pair: StreamControllerPair<C>,
        table: Arc<InputTable>,
        frame_buffer: Arc<FrameBuffer>,
        settings: CoordinatorSettings,
    ) -> Self {
        let depth = settings.frame_queue_depth.max(1);
        let (first_tx, first_rx) = mpsc::channel(depth);
        let (second_tx, second_rx) = mpsc::channel(depth);

        Self {
            settings,
            table,
            params: PlaybackParameters::default(),
            pair,
            frame_tx: [first_tx, second_tx],
            frame_rx: [first_rx, second_rx],
            sessions: [0; 2],
            session_counter: 0,
            top_state: TopState::None,
            handover_state: HandoverState::NoHandover,
            active_status: StreamStatus::default(),
            handover_status: StreamStatus::default(),
            frame_buffer,
            alloc_failure: None,
            pending: PendingOutput::Nothing,
            format: None,
            start_time_ms: 0,
            end_time_ms: 0,
            need_adjust_start_active: false,
            need_adjust_start_handover: false,
            execute_count: 0,
            stats: CycleStats::new(),
        }
    }

    fn refresh_statuses(&mut self) {
        self.active_status = self.pair.active().status();
        self.handover_status = self.pair.handover().status();
    }

    fn open_session(&mut self, slot: ControllerSlot) -> FrameSender {
        self.session_counter += 1;
        self.sessions[slot_index(slot)] = self.session_counter;
        FrameSender::new(
            ControllerId {
                slot,
                session: self.session_counter,
            },
            self.frame_tx[slot_index(slot)].clone(),
            self.stats.frames_dropped_handle(),
        )
    }

    fn close_session(&mut self, slot: ControllerSlot) {
        self.session_counter += 1;
        self.sessions[slot_index(slot)] = self.session_counter;
    }

    fn play_slot(&mut self, slot: ControllerSlot, url: &str) {
        let frames = self.open_session(slot);
        log::debug!("Loading {} on {}", url, slot.name());
        self.pair.slot_mut(slot).play(url, frames);
    }

    fn stop_slot(&mut self, slot: ControllerSlot) {
        self.close_session(slot);
        self.pair.slot_mut(slot).stop();
    }

    /// Why a frame from `source` must not reach the buffer, if at all
    fn classify(&self, source: ControllerId) -> Option<Discard> {
        if source.session != self.sessions[slot_index(source.slot)] {
            Some(Discard::StaleSession)
        } else if self.pair.role_of(source.slot) == ControllerRole::Handover {
            Some(Discard::HandoverRole)
        } else if self.top_state != TopState::Running {
            Some(Discard::NotRunning)
        } else {
            None
        }
    }

    /// Drain both frame queues, keeping only the newest valid frame
    fn collect_frames(&mut self) {
        let mut latest: Option<Vec<u8>> = None;

        for slot in [ControllerSlot::First, ControllerSlot::Second] {
            while let Ok(message) = self.frame_rx[slot_index(slot)].try_recv() {
                match self.classify(message.source) {
                    Some(reason) => self.stats.record_discard(reason),
                    None => {
                        if latest.replace(message.data).is_some() {
                            self.stats.record_discard(Discard::Superseded);
                        }
                    }
                }
            }
        }

        if let Some(frame) = latest {
            if self.frame_buffer.write(&frame) {
                self.stats.frames_rendered += 1;
            } else {
                self.stats.record_discard(Discard::SizeMismatch);
            }
        }
    }

    /// Size the frame buffer to the active video.
    ///
    /// `force` reallocates even at the same size, dropping any stale frame.
    fn resize_frame_buffer(&mut self, force: bool) {
        let info = &self.active_status.video_info;
        if !info.is_ready {
            return;
        }
        let geometry = (info.width, info.height);

        if !force {
            if self.frame_buffer.dimensions() == geometry
                && self.frame_buffer.len() == info.frame_size_bytes
            {
                return;
            }
            if matches!(&self.alloc_failure, Some((failed, _)) if *failed == geometry) {
                return;
            }
        }

        match self.frame_buffer.reallocate(geometry.0, geometry.1) {
            Ok(()) => self.alloc_failure = None,
            Err(e) => {
                log::error!("{}", e);
                self.alloc_failure = Some((geometry, e.to_string()));
            }
        }
    }

    fn past_end_time(&self) -> bool {
        let info = &self.active_status.video_info;
        self.end_time_ms > 0 && info.total_time_ms > 0 && info.current_time_ms >= self.end_time_ms
    }

    fn active_finished(&self) -> bool {
        self.active_status.state.is_finished() || self.past_end_time()
    }

    /// Empty URL: stop everything and black out
    fn full_stop(&mut self) {
        log::info!("Source cleared, stopping playback");

        self.top_state = TopState::None;
        self.handover_state = HandoverState::NoHandover;
        self.stop_slot(ControllerSlot::First);
        self.stop_slot(ControllerSlot::Second);
        self.pending = PendingOutput::Blackout;
        self.refresh_statuses();
    }

    /// Nothing on screen yet: load `url` into both controllers
    fn cold_load(&mut self, url: &str) {
        log::info!("Loading {}", url);

        self.top_state = TopState::None;
        self.handover_state = HandoverState::NoHandover;
        // A frame of the previous source must not open the new one
        if self.frame_buffer.discard_pending() {
            log::debug!("Dropped unshown frame of the previous source");
        }
        self.play_slot(self.pair.active_slot(), url);
        self.play_slot(self.pair.handover_slot(), url);
        self.refresh_statuses();
    }

    /// Playing: prepare `url` on the handover controller
    fn begin_handover(&mut self, url: &str) {
        log::info!(
            "Initiating handover to {} on {}",
            url,
            self.pair.handover_slot().name()
        );

        self.handover_state = HandoverState::Initiated;
        self.play_slot(self.pair.handover_slot(), url);
        self.refresh_statuses();
    }

    /// Swap roles and re-arm the new handover controller with the current URL
    fn perform_transition(&mut self) {
        log::info!(
            "Handing over from {} to {}",
            self.pair.active_slot().name(),
            self.pair.handover_slot().name()
        );

        self.stop_slot(self.pair.active_slot());
        self.pair.swap();
        self.handover_state = HandoverState::NoHandover;
        self.top_state = TopState::ReadyToRun;
        self.params.switch_cue = false;

        let url = self.params.current_url.clone();
        if !url.is_empty() {
            self.play_slot(self.pair.handover_slot(), &url);
        }

        self.refresh_statuses();
        self.resize_frame_buffer(true);
    }

    fn run_playback(&mut self) {
        let hold_at_end = self.past_end_time() && !self.params.is_looping;
        self.pair
            .active_mut()
            .pause(self.params.is_paused || hold_at_end);

        if self.params.is_new_seek_value {
            self.params.is_new_seek_value = false;
            let position = self.params.last_seek_position;
            self.pair.active_mut().seek(position);
        }

        if self.params.is_new_playback_speed {
            self.params.is_new_playback_speed = false;
            let rate = self.params.last_playback_speed;
            for controller in self.pair.both_mut() {
                controller.set_playback_speed(rate);
            }
        }

        self.top_state = if self.params.is_paused {
            TopState::ReadyToRun
        } else {
            TopState::Running
        };

        if self.top_state == TopState::Running && self.active_finished() {
            self.top_state = TopState::ReadyToRun;

            if self.active_status.state == LifecycleState::Error {
                log::warn!(
                    "Active stream failed: {}",
                    self.active_status.error.as_deref().unwrap_or("unknown error")
                );
            }

            // Swapping to a failed spare would only reload in a loop
            if self.params.is_looping && self.handover_status.state != LifecycleState::Error {
                log::debug!("End reached, looping");
                self.perform_transition();
                self.need_adjust_start_handover = true;
                let paused = self.params.is_paused;
                self.pair.active_mut().pause(paused);
            }
        }

        if self.top_state == TopState::Running {
            self.pending = if self.params.blackout {
                PendingOutput::Blackout
            } else {
                PendingOutput::Frame
            };
        }
    }

    fn execute(&mut self) {
        if self.params.is_new_start_time {
            self.params.is_new_start_time = false;
            self.start_time_ms = whole_seconds_ms(self.params.last_start_time_sec);
            self.need_adjust_start_active =
                self.start_time_ms > self.active_status.video_info.current_time_ms;
            self.need_adjust_start_handover = true;
        }

        if self.params.is_new_end_time {
            self.params.is_new_end_time = false;
            self.end_time_ms = whole_seconds_ms(self.params.last_end_time_sec);
        }

        let url = self.params.current_url.clone();
        let need_load =
            url != self.active_status.video_url && url != self.handover_status.video_url;

        if need_load {
            if url.is_empty() {
                self.full_stop();
            } else if self.top_state == TopState::Running {
                self.begin_handover(&url);
            } else {
                self.cold_load(&url);
            }
            return;
        }

        if self.handover_state == HandoverState::Ready && self.params.can_switch() {
            self.perform_transition();
        }

        if self.top_state > TopState::None {
            self.run_playback();
        }
    }

    fn evaluate_format(&mut self) {
        if self.active_status.video_info.is_ready {
            let info = &self.active_status.video_info;
            self.format = Some(OutputFormat::new(info.width, info.height));

            if self.top_state == TopState::None {
                self.top_state = TopState::ReadyToRun;
            }
            self.resize_frame_buffer(false);

            let total = self.active_status.video_info.total_time_ms;
            if self.need_adjust_start_active && self.start_time_ms < total {
                self.pair
                    .active_mut()
                    .seek(self.start_time_ms as f32 / total as f32);
            }
            self.need_adjust_start_active = false;
        }

        if self.handover_status.video_info.is_ready {
            self.pair.handover_mut().pause(true);

            let total = self.handover_status.video_info.total_time_ms;
            if self.need_adjust_start_handover && self.start_time_ms < total {
                self.need_adjust_start_handover = false;
                self.pair
                    .handover_mut()
                    .seek(self.start_time_ms as f32 / total as f32);
            }

            let info = &self.handover_status.video_info;
            if self.handover_state == HandoverState::Initiated
                && info.buffer_level_pct >= self.settings.ready_buffer_level
            {
                self.handover_state = HandoverState::Ready;
                log::info!(
                    "Handover to {} ready ({:.0}% buffered)",
                    self.handover_status.video_url,
                    info.buffer_level_pct
                );

                if self.params.can_switch() {
                    self.format = Some(OutputFormat::new(info.width, info.height));
                }
            }
        }
    }

    fn info_value(&self, field: InfoField) -> InfoValue {
        let active = &self.active_status;
        let video = &active.video_info;
        let params = &self.params;
        let int = |v: u64| InfoValue::Int(i64::try_from(v).unwrap_or(i64::MAX));

        match field {
            InfoField::ExecuteCount => int(self.execute_count),
            InfoField::Url => InfoValue::Text(active.video_url.clone()),
            InfoField::IsLooping => params.is_looping.into(),
            InfoField::IsPaused => params.is_paused.into(),
            InfoField::State => InfoValue::Text(active.state.as_str().to_string()),
            InfoField::TopStatus => InfoValue::Text(self.top_state.as_str().to_string()),
            InfoField::Duration => int(video.total_time_ms),
            InfoField::PlaybackProgress => InfoValue::Float(if video.total_time_ms == 0 {
                0.0
            } else {
                video.current_time_ms as f64 / video.total_time_ms as f64
            }),
            InfoField::BufferingProgress => InfoValue::Float(f64::from(video.buffer_level_pct)),
            InfoField::VideoWidth => int(u64::from(video.width)),
            InfoField::VideoHeight => int(u64::from(video.height)),
            InfoField::Handover => InfoValue::Float(f64::from(
                self.handover_status.video_info.buffer_level_pct,
            )),
            InfoField::HandoverState => {
                InfoValue::Text(self.handover_state.as_str().to_string())
            }
            InfoField::SwitchOnCue => (!params.seamless_mode_on).into(),
            InfoField::SwitchCue => params.switch_cue.into(),
            InfoField::PlaybackSpeed => InfoValue::Float(f64::from(params.last_playback_speed)),
            InfoField::StartTime => InfoValue::Whole(f64::from(params.last_start_time_sec)),
            InfoField::EndTime => InfoValue::Whole(f64::from(params.last_end_time_sec)),
            InfoField::Blackout => params.blackout.into(),
        }
    }
}

#[cfg(test)]
impl<C: StreamController> HandoverCoordinator<C> {
    pub fn top_state(&self) -> TopState {
        self.top_state
    }

    pub fn handover_state(&self) -> HandoverState {
        self.handover_state
    }

    pub fn active_slot(&self) -> ControllerSlot {
        self.pair.active_slot()
    }

    pub fn parameters(&self) -> &PlaybackParameters {
        &self.params
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }
}

impl<C: StreamController> PollNode for HandoverCoordinator<C> {
    fn cook(&mut self, inputs: &InputArrays) {
        self.execute_count += 1;
        self.stats.cycles += 1;

        self.refresh_statuses();
        self.params.update(inputs, &self.table);
        self.collect_frames();
        self.execute();
        self.evaluate_format();

        self.stats.maybe_log_stats(self.settings.stats_interval);
    }

    fn report_format(&self) -> Option<OutputFormat> {
        self.format
    }

    fn report_status(&self) -> NodeReport {
        let error = match &self.alloc_failure {
            Some((_, message)) => Some(message.clone()),
            None => self.active_status.error.clone(),
        };

        NodeReport {
            rows: info::rows(|field| self.info_value(field)),
            warning: self.active_status.warning.clone(),
            error,
            info: self.active_status.info.clone(),
        }
    }

    fn consume_frame(&mut self, sink: &mut dyn RenderSink) -> bool {
        match std::mem::take(&mut self.pending) {
            PendingOutput::Nothing => false,
            PendingOutput::Frame => self
                .frame_buffer
                .consume_updated(|data, width, height| sink.present(data, width, height))
                .is_some(),
            PendingOutput::Blackout => {
                if self.frame_buffer.is_empty() {
                    return false;
                }
                self.frame_buffer
                    .blackout(|data, width, height| sink.present(data, width, height));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::fake::{Call, FakeController, FakeHandle};
    use common::ParameterChange;

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<(Vec<u8>, u32, u32)>,
    }

    impl RenderSink for RecordingSink {
        fn present(&mut self, frame: &[u8], width: u32, height: u32) {
            self.frames.push((frame.to_vec(), width, height));
        }
    }

    struct Harness {
        node: HandoverCoordinator<FakeController>,
        main: FakeHandle,
        spare: FakeHandle,
        table: Arc<InputTable>,
        inputs: InputArrays,
        sink: RecordingSink,
    }

    impl Harness {
        fn new() -> Self {
            let (first, main) = FakeController::new();
            let (second, spare) = FakeController::new();
            let table = Arc::new(InputTable::standard());
            let node = HandoverCoordinator::new(
                StreamControllerPair::new(first, second),
                Arc::clone(&table),
                Arc::new(FrameBuffer::new()),
                CoordinatorSettings::default(),
            );

            Self {
                node,
                main,
                spare,
                table,
                inputs: InputArrays::standard(),
                sink: RecordingSink::default(),
            }
        }

        /// Cold-load `url` at 4x2 and run until frames are produced
        fn running(url: &str) -> Self {
            let mut h = Self::new();
            h.set(ParameterChange::Url(url.to_string()));
            h.cycle();
            h.main.make_ready(4, 2, 10_000, 100.0);
            h.spare.make_ready(4, 2, 10_000, 100.0);
            h.cycle();
            h.cycle();
            assert_eq!(h.node.top_state(), TopState::Running);
            h
        }

        fn set(&mut self, change: ParameterChange) {
            assert!(self.inputs.apply(&self.table, &change));
        }

        fn cycle(&mut self) -> bool {
            self.node.cook(&self.inputs);
            self.node.consume_frame(&mut self.sink)
        }

        fn row(&self, name: &str) -> String {
            self.node
                .report_status()
                .rows
                .into_iter()
                .find(|r| r.name == name)
                .map(|r| r.value)
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_cold_start_loads_both_and_starts_running() {
        let mut h = Harness::new();
        h.set(ParameterChange::Url("a.mp4".to_string()));

        h.cycle();
        assert_eq!(h.main.url(), "a.mp4");
        assert_eq!(h.spare.url(), "a.mp4");
        assert_eq!(h.node.top_state(), TopState::None);
        assert_eq!(h.node.report_format(), None);

        h.main.make_ready(4, 2, 10_000, 100.0);
        h.spare.make_ready(4, 2, 10_000, 100.0);
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::ReadyToRun);
        assert_eq!(h.node.report_format(), Some(OutputFormat::new(4, 2)));
        assert!(h.spare.calls().contains(&Call::Pause(true)));
        assert!(h.spare.is_paused());

        h.cycle();
        assert_eq!(h.node.top_state(), TopState::Running);
        assert!(!h.main.is_paused());
        assert_eq!(h.row("TOPstatus"), "Running");
    }

    #[test]
    fn test_active_frames_reach_sink() {
        let mut h = Harness::running("a.mp4");

        assert!(h.main.push_frame(vec![7; 32]));
        assert!(h.cycle());
        assert_eq!(h.sink.frames.last(), Some(&(vec![7; 32], 4, 2)));

        // Nothing new, nothing presented
        assert!(!h.cycle());
    }

    #[test]
    fn test_newest_frame_wins_within_a_cycle() {
        let mut h = Harness::running("a.mp4");

        h.main.push_frame(vec![1; 32]);
        h.main.push_frame(vec![2; 32]);
        h.cycle();

        assert_eq!(h.sink.frames.last().map(|f| f.0[0]), Some(2));
        assert_eq!(h.node.stats().superseded, 1);
    }

    #[test]
    fn test_url_change_hands_over_on_following_cycle() {
        let mut h = Harness::running("a.mp4");

        h.set(ParameterChange::Url("b.mp4".to_string()));
        h.cycle();
        assert_eq!(h.node.handover_state(), HandoverState::Initiated);
        assert_eq!(h.spare.url(), "b.mp4");
        assert_eq!(h.main.url(), "a.mp4");

        h.spare.make_ready(8, 4, 20_000, 50.0);
        h.cycle();
        assert_eq!(h.node.handover_state(), HandoverState::Initiated);
        assert!(h.spare.is_paused());
        assert_eq!(h.node.report_format(), Some(OutputFormat::new(4, 2)));

        h.spare.set_buffer_level(95.0);
        h.cycle();
        assert_eq!(h.node.handover_state(), HandoverState::Ready);
        assert_eq!(h.node.report_format(), Some(OutputFormat::new(8, 4)));
        assert_eq!(h.node.active_slot(), ControllerSlot::First);

        h.main.clear_calls();
        h.cycle();
        assert_eq!(h.node.active_slot(), ControllerSlot::Second);
        assert_eq!(h.node.handover_state(), HandoverState::NoHandover);
        assert_eq!(h.node.top_state(), TopState::Running);
        assert!(!h.spare.is_paused());

        // Old active is stopped and re-armed with the current URL
        let calls = h.main.calls();
        assert_eq!(calls[0], Call::Stop);
        assert_eq!(calls[1], Call::Play("b.mp4".to_string()));
        assert_eq!(h.node.report_format(), Some(OutputFormat::new(8, 4)));
        assert_eq!(h.row("URL"), "b.mp4");
    }

    #[test]
    fn test_switch_on_cue_waits_for_cue() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::SwitchOnCue(true));
        h.cycle();

        h.set(ParameterChange::Url("b.mp4".to_string()));
        h.cycle();
        h.spare.make_ready(8, 4, 20_000, 100.0);
        h.cycle();
        assert_eq!(h.node.handover_state(), HandoverState::Ready);
        // No cue: the format stays with the visible stream
        assert_eq!(h.node.report_format(), Some(OutputFormat::new(4, 2)));

        for _ in 0..5 {
            h.cycle();
        }
        assert_eq!(h.node.active_slot(), ControllerSlot::First);
        assert_eq!(h.node.handover_state(), HandoverState::Ready);

        h.set(ParameterChange::SwitchCue);
        h.cycle();
        assert_eq!(h.node.active_slot(), ControllerSlot::Second);
        assert_eq!(h.main.url(), "b.mp4");
        assert_eq!(h.node.report_format(), Some(OutputFormat::new(8, 4)));
        assert!(!h.node.parameters().switch_cue);
    }

    #[test]
    fn test_loop_swaps_to_prebuffered_spare() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::Looping(true));
        h.cycle();

        h.main.set_state(LifecycleState::Ended);
        h.main.clear_calls();
        h.cycle();

        assert_eq!(h.node.active_slot(), ControllerSlot::Second);
        assert_eq!(h.node.top_state(), TopState::ReadyToRun);
        let calls = h.main.calls();
        let stop = calls.iter().position(|c| *c == Call::Stop).unwrap();
        assert_eq!(calls[stop + 1], Call::Play("a.mp4".to_string()));

        h.cycle();
        assert_eq!(h.node.top_state(), TopState::Running);
        assert!(!h.spare.is_paused());
    }

    #[test]
    fn test_loop_reapplies_start_time_to_rearmed_spare() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::Looping(true));
        h.set(ParameterChange::StartTime(3.7));
        h.cycle();
        assert!(h.main.calls().contains(&Call::Seek(0.3)));
        assert!(h.spare.calls().contains(&Call::Seek(0.3)));

        h.main.set_state(LifecycleState::Ended);
        h.cycle();
        h.main.clear_calls();
        h.main.make_ready(4, 2, 10_000, 100.0);
        h.cycle();

        assert!(h.main.calls().contains(&Call::Seek(0.3)));
        assert_eq!(h.row("startTime"), "4");
    }

    #[test]
    fn test_start_time_skips_forward_but_never_rewinds() {
        let mut h = Harness::running("a.mp4");
        h.main.set_position(1_000);
        h.set(ParameterChange::StartTime(3.0));
        h.cycle();
        assert!(h.main.calls().contains(&Call::Seek(0.3)));

        h.main.clear_calls();
        h.main.set_position(5_000);
        h.set(ParameterChange::StartTime(2.0));
        h.cycle();
        assert!(!h.main.calls().iter().any(|c| matches!(c, Call::Seek(_))));
    }

    #[test]
    fn test_end_without_loop_stops_frames() {
        let mut h = Harness::running("a.mp4");

        h.main.set_state(LifecycleState::Ended);
        h.main.push_frame(vec![3; 32]);
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::ReadyToRun);
        assert_eq!(h.node.active_slot(), ControllerSlot::First);

        h.main.push_frame(vec![4; 32]);
        assert!(!h.cycle());
        assert_eq!(h.node.stats().not_running, 1);
    }

    #[test]
    fn test_error_loops_like_end() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::Looping(true));
        h.cycle();

        h.main.set_error("decoder exploded");
        h.cycle();
        assert_eq!(h.node.active_slot(), ControllerSlot::Second);
    }

    #[test]
    fn test_end_time_holds_active_stream() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::EndTime(2.0));
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::Running);

        h.main.set_position(2_500);
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::ReadyToRun);
        assert!(h.main.is_paused());
        assert_eq!(h.row("endTime"), "2");
    }

    #[test]
    fn test_handover_frames_never_visible() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::Url("b.mp4".to_string()));
        h.cycle();

        assert!(h.spare.push_frame(vec![9; 32]));
        h.cycle();

        assert!(h.sink.frames.iter().all(|(data, _, _)| data[0] != 9));
        assert_eq!(h.node.stats().handover, 1);
    }

    #[test]
    fn test_buffering_handover_cannot_crowd_out_active_frames() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::Url("b.mp4".to_string()));
        h.cycle();

        for _ in 0..4 {
            assert!(h.spare.push_frame(vec![9; 32]));
        }
        assert!(!h.spare.push_frame(vec![9; 32]));

        assert!(h.main.push_frame(vec![5; 32]));
        assert!(h.cycle());
        assert_eq!(h.sink.frames.last(), Some(&(vec![5; 32], 4, 2)));
        assert_eq!(h.node.stats().handover, 4);
    }

    #[test]
    fn test_pause_stops_frames_until_resumed() {
        let mut h = Harness::running("a.mp4");

        h.set(ParameterChange::Paused(true));
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::ReadyToRun);
        assert!(h.main.calls().contains(&Call::Pause(true)));
        assert!(h.main.is_paused());
        assert_eq!(h.row("isPaused"), "1");

        h.main.push_frame(vec![3; 32]);
        assert!(!h.cycle());
        assert_eq!(h.node.stats().not_running, 1);

        h.set(ParameterChange::Paused(false));
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::Running);
        assert!(!h.main.is_paused());

        h.main.push_frame(vec![4; 32]);
        assert!(h.cycle());
        assert_eq!(h.sink.frames.last(), Some(&(vec![4; 32], 4, 2)));
    }

    #[test]
    fn test_reload_never_shows_previous_source_frame() {
        let mut h = Harness::running("a.mp4");

        // Written in the same cycle that leaves Running, so never shown
        h.main.push_frame(vec![1; 32]);
        h.set(ParameterChange::Paused(true));
        assert!(!h.cycle());

        h.set(ParameterChange::Url("b.mp4".to_string()));
        h.cycle();
        assert_eq!(h.main.url(), "b.mp4");

        h.main.make_ready(4, 2, 10_000, 100.0);
        h.spare.make_ready(4, 2, 10_000, 100.0);
        h.set(ParameterChange::Paused(false));
        h.cycle();
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::Running);
        assert!(h.sink.frames.iter().all(|(data, _, _)| data[0] != 1));

        h.main.push_frame(vec![2; 32]);
        assert!(h.cycle());
        assert_eq!(h.sink.frames.last(), Some(&(vec![2; 32], 4, 2)));
    }

    #[test]
    fn test_frames_from_stopped_session_are_stale() {
        let mut h = Harness::running("a.mp4");
        let late = h.main.sender().unwrap();

        h.set(ParameterChange::Url(String::new()));
        h.cycle();
        assert_eq!(h.node.top_state(), TopState::None);

        late.send(vec![5; 32]);
        h.cycle();
        assert_eq!(h.node.stats().stale, 1);
    }

    #[test]
    fn test_empty_url_stops_both_and_blacks_out() {
        let mut h = Harness::running("a.mp4");
        h.main.push_frame(vec![8; 32]);
        h.cycle();

        h.set(ParameterChange::Url(String::new()));
        assert!(h.cycle());

        assert!(h.main.calls().contains(&Call::Stop));
        assert!(h.spare.calls().contains(&Call::Stop));
        assert_eq!(h.node.handover_state(), HandoverState::NoHandover);
        assert_eq!(h.sink.frames.last(), Some(&(vec![0; 32], 4, 2)));

        // Stays stopped without reissuing commands
        h.main.clear_calls();
        h.cycle();
        assert!(h.main.calls().is_empty());

        // Same URL again reloads after a full stop
        h.set(ParameterChange::Url("a.mp4".to_string()));
        h.cycle();
        assert_eq!(h.main.url(), "a.mp4");
    }

    #[test]
    fn test_blackout_replaces_frame() {
        let mut h = Harness::running("a.mp4");
        h.set(ParameterChange::Blackout(true));
        h.main.push_frame(vec![6; 32]);

        assert!(h.cycle());
        assert_eq!(h.sink.frames.last().map(|f| f.0.clone()), Some(vec![0; 32]));
        assert_eq!(h.row("blackout"), "1");
    }

    #[test]
    fn test_seek_and_speed_are_one_shot() {
        let mut h = Harness::running("a.mp4");
        h.main.clear_calls();
        h.spare.clear_calls();

        h.set(ParameterChange::Seek(0.5));
        h.set(ParameterChange::Speed(2.0));
        h.cycle();
        assert!(h.main.calls().contains(&Call::Seek(0.5)));
        assert!(h.main.calls().contains(&Call::Speed(2.0)));
        assert!(h.spare.calls().contains(&Call::Speed(2.0)));
        assert!(!h.spare.calls().contains(&Call::Seek(0.5)));

        h.main.clear_calls();
        h.cycle();
        assert!(h.main.calls().iter().all(|c| !matches!(c, Call::Seek(_) | Call::Speed(_))));
        assert_eq!(h.row("playbackSpeed"), "2.00");
    }

    #[test]
    fn test_seek_waits_until_source_is_ready() {
        let mut h = Harness::new();
        h.set(ParameterChange::Url("a.mp4".to_string()));
        h.set(ParameterChange::Seek(0.25));
        h.cycle();
        h.cycle();
        assert!(!h.main.calls().contains(&Call::Seek(0.25)));
        assert!(h.node.parameters().is_new_seek_value);

        h.main.make_ready(4, 2, 10_000, 100.0);
        h.cycle();
        h.cycle();
        assert!(h.main.calls().contains(&Call::Seek(0.25)));
        assert!(!h.node.parameters().is_new_seek_value);
    }

    #[test]
    fn test_failed_allocation_keeps_buffer_and_reports() {
        let mut h = Harness::running("a.mp4");
        h.main.make_ready(u32::MAX, u32::MAX, 10_000, 100.0);
        h.cycle();

        let report = h.node.report_status();
        assert!(report.error.unwrap().starts_with("Frame buffer allocation failed"));

        // Previous buffer still accepts frames of the old size
        h.main.push_frame(vec![2; 32]);
        assert!(h.cycle());
    }

    #[test]
    fn test_load_failure_surfaces_error() {
        let mut h = Harness::new();
        h.set(ParameterChange::Url("missing.mp4".to_string()));
        h.cycle();
        h.main.set_error("Load failure: no such file");
        h.main.clear_calls();

        for _ in 0..3 {
            h.cycle();
        }
        // Not retried until the URL changes
        assert!(h.main.calls().is_empty());
        assert_eq!(h.node.top_state(), TopState::None);
        assert_eq!(
            h.node.report_status().error.as_deref(),
            Some("Load failure: no such file")
        );
        assert_eq!(h.row("state"), "Error");
    }

    #[test]
    fn test_status_rows() {
        let mut h = Harness::running("a.mp4");
        h.main.set_position(2_500);
        h.cycle();

        let report = h.node.report_status();
        assert_eq!(report.rows.len(), 19);
        assert_eq!(h.row("executeCount"), "4");
        assert_eq!(h.row("Duration"), "10000");
        assert_eq!(h.row("playbackProgress"), "0.25");
        assert_eq!(h.row("bufferingProgress"), "100.00");
        assert_eq!(h.row("videoWidth"), "4");
        assert_eq!(h.row("handoverState"), "No handover");
        assert_eq!(h.row("switchOnCue"), "0");
        assert_eq!(h.row("handover"), "100.00");
    }

    #[test]
    fn test_progress_zero_without_duration() {
        let mut h = Harness::new();
        h.set(ParameterChange::Url("live".to_string()));
        h.cycle();
        h.main.make_ready(4, 2, 0, 100.0);
        h.main.set_position(5_000);
        h.cycle();
        assert_eq!(h.row("playbackProgress"), "0.00");
    }
}
