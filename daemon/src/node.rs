//! Capability set a polled host drives once per cycle

use crate::inputs::InputArrays;
use common::{InfoRow, OutputFormat};

/// Receives the frame produced by a cycle
pub trait RenderSink {
    /// `frame` is tightly packed RGBA, `width * height * 4` bytes
    fn present(&mut self, frame: &[u8], width: u32, height: u32);
}

/// Status rows plus the optional messages of the active stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeReport {
    pub rows: Vec<InfoRow>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub info: Option<String>,
}

/// A node cooked by the host's poll loop.
///
/// Per cycle the host calls [`cook`](Self::cook) with its current inputs,
/// then reads the format, lets the node hand over a frame and finally
/// collects the status report.
pub trait PollNode {
    fn cook(&mut self, inputs: &InputArrays);

    /// Geometry to render at, `None` until a source reports it
    fn report_format(&self) -> Option<OutputFormat>;

    fn report_status(&self) -> NodeReport;

    /// Hand this cycle's frame (or black frame) to `sink`.
    ///
    /// Returns false when there was nothing new to present.
    fn consume_frame(&mut self, sink: &mut dyn RenderSink) -> bool;
}
