//! Status table fields and their formatting

use common::InfoRow;
use std::fmt;

/// Every field of the status table, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoField {
    ExecuteCount,
    Url,
    IsLooping,
    IsPaused,
    State,
    TopStatus,
    Duration,
    PlaybackProgress,
    BufferingProgress,
    VideoWidth,
    VideoHeight,
    Handover,
    HandoverState,
    SwitchOnCue,
    SwitchCue,
    PlaybackSpeed,
    StartTime,
    EndTime,
    Blackout,
}

impl InfoField {
    pub const ALL: [InfoField; 19] = [
        Self::ExecuteCount,
        Self::Url,
        Self::IsLooping,
        Self::IsPaused,
        Self::State,
        Self::TopStatus,
        Self::Duration,
        Self::PlaybackProgress,
        Self::BufferingProgress,
        Self::VideoWidth,
        Self::VideoHeight,
        Self::Handover,
        Self::HandoverState,
        Self::SwitchOnCue,
        Self::SwitchCue,
        Self::PlaybackSpeed,
        Self::StartTime,
        Self::EndTime,
        Self::Blackout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecuteCount => "executeCount",
            Self::Url => "URL",
            Self::IsLooping => "isLooping",
            Self::IsPaused => "isPaused",
            Self::State => "state",
            Self::TopStatus => "TOPstatus",
            Self::Duration => "Duration",
            Self::PlaybackProgress => "playbackProgress",
            Self::BufferingProgress => "bufferingProgress",
            Self::VideoWidth => "videoWidth",
            Self::VideoHeight => "videoHeight",
            Self::Handover => "handover",
            Self::HandoverState => "handoverState",
            Self::SwitchOnCue => "switchOnCue",
            Self::SwitchCue => "switchCue",
            Self::PlaybackSpeed => "playbackSpeed",
            Self::StartTime => "startTime",
            Self::EndTime => "endTime",
            Self::Blackout => "blackout",
        }
    }
}

/// A field value together with how it is printed
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Int(i64),
    /// Two decimals
    Float(f64),
    /// No decimals
    Whole(f64),
    Text(String),
}

impl From<bool> for InfoValue {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.2}", v),
            Self::Whole(v) => write!(f, "{:.0}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Build the full table from a per-field lookup
pub fn rows(mut value_of: impl FnMut(InfoField) -> InfoValue) -> Vec<InfoRow> {
    InfoField::ALL
        .iter()
        .map(|field| InfoRow {
            name: field.name().to_string(),
            value: value_of(*field).to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_formatting() {
        assert_eq!(InfoValue::Int(42).to_string(), "42");
        assert_eq!(InfoValue::Float(0.456).to_string(), "0.46");
        assert_eq!(InfoValue::Float(90.0).to_string(), "90.00");
        assert_eq!(InfoValue::Whole(12.6).to_string(), "13");
        assert_eq!(InfoValue::from(true).to_string(), "1");
        assert_eq!(InfoValue::Text("Ready".to_string()).to_string(), "Ready");
    }

    #[test]
    fn test_rows_in_display_order() {
        let rows = rows(|_| InfoValue::Int(0));
        assert_eq!(rows.len(), 19);
        assert_eq!(rows[0].name, "executeCount");
        assert_eq!(rows[5].name, "TOPstatus");
        assert_eq!(rows[12].name, "handoverState");
        assert_eq!(rows[18].name, "blackout");
    }
}
