//! Fixed-rate host loop driving a [`PollNode`]
//!
//! Plays the host's part: owns the input arrays, folds in parameter changes
//! received over IPC, cooks the node once per tick and publishes its report
//! to the shared daemon state.

use crate::DaemonState;
use crate::inputs::{InputArrays, InputTable};
use crate::node::{PollNode, RenderSink};
use anyhow::Result;
use common::ParameterChange;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;

/// Headless render target standing in for the host's texture
#[derive(Debug, Default)]
pub struct PreviewSurface {
    frames_presented: u64,
    geometry: (u32, u32),
}

impl PreviewSurface {
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl RenderSink for PreviewSurface {
    fn present(&mut self, frame: &[u8], width: u32, height: u32) {
        if self.geometry != (width, height) {
            log::info!("Output surface now {}x{}", width, height);
            self.geometry = (width, height);
        }
        self.frames_presented += 1;
        log::trace!(
            "Presented frame {} ({} bytes)",
            self.frames_presented,
            frame.len()
        );
    }
}

pub async fn run<N: PollNode + Send>(
    state: Arc<Mutex<DaemonState>>,
    mut param_rx: mpsc::UnboundedReceiver<ParameterChange>,
    table: Arc<InputTable>,
    mut node: N,
    period: Duration,
) -> Result<()> {
    let mut inputs = InputArrays::standard();
    let mut surface = PreviewSurface::default();

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::info!(
        "Poll loop running at {:.1} cycles/s",
        1.0 / period.as_secs_f64()
    );

    loop {
        interval.tick().await;

        while let Ok(change) = param_rx.try_recv() {
            if !inputs.apply(&table, &change) {
                log::warn!("No input slot for {:?}", change);
            }
        }

        node.cook(&inputs);
        let format = node.report_format();
        node.consume_frame(&mut surface);
        let report = node.report_status();

        let mut state = state.lock().await;
        if state.should_exit {
            break;
        }
        state.publish(format, report);
    }

    log::info!(
        "Poll loop stopped after presenting {} frames",
        surface.frames_presented()
    );
    Ok(())
}
