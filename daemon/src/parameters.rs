//! Desired playback configuration, refreshed from host inputs every cycle

use crate::inputs::{InputArrays, InputKey, InputTable};

/// Snapshot of what the host currently asks for.
///
/// Switches (`is_paused`, `is_looping`, `blackout`) always hold the latest
/// read. One-shot commands (seek, speed, start and end time, switch cue) keep
/// their last value and raise an `is_new_*` flag when it changes; the flag
/// stays raised until the coordinator acts on it and clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackParameters {
    pub current_url: String,
    pub is_paused: bool,
    pub is_looping: bool,
    pub blackout: bool,
    pub seamless_mode_on: bool,
    pub switch_cue: bool,
    pub last_seek_position: f32,
    pub is_new_seek_value: bool,
    pub last_playback_speed: f32,
    pub is_new_playback_speed: bool,
    pub last_start_time_sec: f32,
    pub is_new_start_time: bool,
    pub last_end_time_sec: f32,
    pub is_new_end_time: bool,
    last_switch_cue_value: f32,
}

impl Default for PlaybackParameters {
    fn default() -> Self {
        Self {
            current_url: String::new(),
            is_paused: false,
            is_looping: false,
            blackout: false,
            seamless_mode_on: true,
            switch_cue: false,
            last_seek_position: 0.0,
            is_new_seek_value: false,
            last_playback_speed: 0.0,
            is_new_playback_speed: false,
            last_start_time_sec: 0.0,
            is_new_start_time: false,
            last_end_time_sec: 0.0,
            is_new_end_time: false,
            last_switch_cue_value: 0.0,
        }
    }
}

/// Store `read` into `value`, raising `updated` on change.
///
/// Never clears `updated`: that is the consumer's job.
fn update_one_shot(read: Option<f64>, updated: &mut bool, value: &mut f32) {
    if let Some(read) = read {
        let read = read as f32;
        if *value != read {
            *value = read;
            *updated = true;
        }
    }
}

impl PlaybackParameters {
    /// Refresh every field from the host inputs
    pub fn update(&mut self, inputs: &InputArrays, table: &InputTable) {
        if let Some(url) = table.read_string(inputs, InputKey::Url) {
            self.current_url = url;
        }
        if let Some(v) = table.read_bool(inputs, InputKey::Pause) {
            self.is_paused = v;
        }
        if let Some(v) = table.read_bool(inputs, InputKey::Loop) {
            self.is_looping = v;
        }
        if let Some(v) = table.read_bool(inputs, InputKey::Blackout) {
            self.blackout = v;
        }

        update_one_shot(
            table.read_float(inputs, InputKey::SeekPosition),
            &mut self.is_new_seek_value,
            &mut self.last_seek_position,
        );
        update_one_shot(
            table.read_float(inputs, InputKey::PlaybackSpeed),
            &mut self.is_new_playback_speed,
            &mut self.last_playback_speed,
        );
        update_one_shot(
            table.read_float(inputs, InputKey::StartTime),
            &mut self.is_new_start_time,
            &mut self.last_start_time_sec,
        );
        update_one_shot(
            table.read_float(inputs, InputKey::EndTime),
            &mut self.is_new_end_time,
            &mut self.last_end_time_sec,
        );

        let switch_on_cue = table
            .read_bool(inputs, InputKey::SwitchOnCue)
            .unwrap_or(false);
        self.seamless_mode_on = !switch_on_cue;

        if self.seamless_mode_on {
            self.switch_cue = false;
        } else {
            update_one_shot(
                table.read_float(inputs, InputKey::SwitchCue),
                &mut self.switch_cue,
                &mut self.last_switch_cue_value,
            );
        }
    }

    /// Whether a ready handover may be swapped in now
    pub fn can_switch(&self) -> bool {
        self.seamless_mode_on || self.switch_cue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ParameterChange;

    fn setup() -> (InputTable, InputArrays, PlaybackParameters) {
        (
            InputTable::standard(),
            InputArrays::standard(),
            PlaybackParameters::default(),
        )
    }

    #[test]
    fn test_one_shot_flag_raised_once_per_change() {
        let (table, mut inputs, mut params) = setup();

        inputs.apply(&table, &ParameterChange::Seek(0.5));
        params.update(&inputs, &table);
        assert!(params.is_new_seek_value);
        assert_eq!(params.last_seek_position, 0.5);

        // Consumer acts and clears; same value does not re-raise
        params.is_new_seek_value = false;
        params.update(&inputs, &table);
        assert!(!params.is_new_seek_value);

        inputs.apply(&table, &ParameterChange::Seek(0.25));
        params.update(&inputs, &table);
        assert!(params.is_new_seek_value);
        assert_eq!(params.last_seek_position, 0.25);
    }

    #[test]
    fn test_unconsumed_flag_stays_raised() {
        let (table, mut inputs, mut params) = setup();

        inputs.apply(&table, &ParameterChange::Speed(2.0));
        params.update(&inputs, &table);
        params.update(&inputs, &table);
        assert!(params.is_new_playback_speed);
        assert_eq!(params.last_playback_speed, 2.0);
    }

    #[test]
    fn test_switches_are_level_triggered() {
        let (table, mut inputs, mut params) = setup();

        inputs.apply(&table, &ParameterChange::Paused(true));
        inputs.apply(&table, &ParameterChange::Looping(true));
        params.update(&inputs, &table);
        params.update(&inputs, &table);
        assert!(params.is_paused);
        assert!(params.is_looping);
        assert!(!params.blackout);

        inputs.apply(&table, &ParameterChange::Paused(false));
        params.update(&inputs, &table);
        assert!(!params.is_paused);
    }

    #[test]
    fn test_switch_cue_ignored_in_seamless_mode() {
        let (table, mut inputs, mut params) = setup();

        inputs.apply(&table, &ParameterChange::SwitchCue);
        params.update(&inputs, &table);
        assert!(params.seamless_mode_on);
        assert!(!params.switch_cue);
        assert!(params.can_switch());
    }

    #[test]
    fn test_switch_cue_is_one_shot_when_cue_mode_on() {
        let (table, mut inputs, mut params) = setup();

        inputs.apply(&table, &ParameterChange::SwitchOnCue(true));
        params.update(&inputs, &table);
        assert!(!params.seamless_mode_on);
        assert!(!params.switch_cue);
        assert!(!params.can_switch());

        inputs.apply(&table, &ParameterChange::SwitchCue);
        params.update(&inputs, &table);
        assert!(params.switch_cue);
        assert!(params.can_switch());
    }

    #[test]
    fn test_missing_inputs_leave_fields_untouched() {
        let table = InputTable::standard();
        let mut params = PlaybackParameters {
            current_url: "keep.mp4".to_string(),
            is_looping: true,
            ..Default::default()
        };

        params.update(&InputArrays::default(), &table);
        assert_eq!(params.current_url, "keep.mp4");
        assert!(params.is_looping);
        assert!(!params.is_new_seek_value);
    }
}
