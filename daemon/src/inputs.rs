//! Host input slots
//!
//! The engine reads its parameters from named input slots the way a node in
//! a polled host graph does: one array of string slots and one array of
//! four-wide float slots. Each logical input is addressed through an
//! [`InputTable`] entry of slot name, slot index and sub-index. A slot that
//! is missing or carries a different name is "no value", never an error.

use common::ParameterChange;
use std::collections::HashMap;

/// Logical inputs the engine reads each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKey {
    Url,
    Loop,
    Pause,
    Blackout,
    SeekPosition,
    SwitchOnCue,
    SwitchCue,
    PlaybackSpeed,
    StartTime,
    EndTime,
}

/// Address of one logical input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub name: &'static str,
    pub index: usize,
    pub sub_index: usize,
}

impl InputSlot {
    const fn new(name: &'static str, index: usize, sub_index: usize) -> Self {
        Self {
            name,
            index,
            sub_index,
        }
    }
}

/// Immutable mapping from logical inputs to host slots.
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct InputTable {
    slots: HashMap<InputKey, InputSlot>,
}

impl InputTable {
    /// The standard slot layout
    pub fn standard() -> Self {
        let slots = HashMap::from([
            (InputKey::Url, InputSlot::new("string0", 0, 0)),
            (InputKey::Loop, InputSlot::new("value0", 0, 0)),
            (InputKey::Pause, InputSlot::new("value0", 0, 1)),
            (InputKey::Blackout, InputSlot::new("value0", 0, 2)),
            (InputKey::SeekPosition, InputSlot::new("value2", 2, 0)),
            (InputKey::SwitchOnCue, InputSlot::new("value3", 3, 0)),
            (InputKey::SwitchCue, InputSlot::new("value3", 3, 1)),
            (InputKey::PlaybackSpeed, InputSlot::new("value4", 4, 0)),
            (InputKey::StartTime, InputSlot::new("value5", 5, 0)),
            (InputKey::EndTime, InputSlot::new("value5", 5, 1)),
        ]);
        Self { slots }
    }

    pub fn slot(&self, key: InputKey) -> Option<InputSlot> {
        self.slots.get(&key).copied()
    }

    /// Read a string input with CR/LF removed
    pub fn read_string(&self, inputs: &InputArrays, key: InputKey) -> Option<String> {
        let slot = self.slot(key)?;
        let input = inputs.strings.get(slot.index)?;
        if input.name != slot.name {
            return None;
        }
        Some(input.value.replace(['\r', '\n'], ""))
    }

    pub fn read_float(&self, inputs: &InputArrays, key: InputKey) -> Option<f64> {
        let slot = self.slot(key)?;
        let input = inputs.floats.get(slot.index)?;
        if input.name != slot.name {
            return None;
        }
        input.values.get(slot.sub_index).copied()
    }

    /// Read a float input as a switch (`> 0.5`)
    pub fn read_bool(&self, inputs: &InputArrays, key: InputKey) -> Option<bool> {
        self.read_float(inputs, key).map(|v| v > 0.5)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringInput {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatInput {
    pub name: String,
    pub values: [f64; 4],
}

/// Current values of every host input slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputArrays {
    pub strings: Vec<StringInput>,
    pub floats: Vec<FloatInput>,
}

impl InputArrays {
    /// Slots laid out to match [`InputTable::standard`], all zeroed
    pub fn standard() -> Self {
        Self {
            strings: vec![StringInput {
                name: "string0".to_string(),
                value: String::new(),
            }],
            floats: (0..6)
                .map(|i| FloatInput {
                    name: format!("value{}", i),
                    values: [0.0; 4],
                })
                .collect(),
        }
    }

    fn string_mut(&mut self, table: &InputTable, key: InputKey) -> Option<&mut String> {
        let slot = table.slot(key)?;
        let input = self.strings.get_mut(slot.index)?;
        (input.name == slot.name).then_some(&mut input.value)
    }

    fn float_mut(&mut self, table: &InputTable, key: InputKey) -> Option<&mut f64> {
        let slot = table.slot(key)?;
        let input = self.floats.get_mut(slot.index)?;
        if input.name != slot.name {
            return None;
        }
        input.values.get_mut(slot.sub_index)
    }

    fn set_float(&mut self, table: &InputTable, key: InputKey, value: f64) -> bool {
        match self.float_mut(table, key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn set_bool(&mut self, table: &InputTable, key: InputKey, value: bool) -> bool {
        self.set_float(table, key, if value { 1.0 } else { 0.0 })
    }

    /// Write a parameter change into its slot.
    ///
    /// Returns false when the slot does not exist in this layout. The switch
    /// cue slot is incremented so every cue reads as a distinct value.
    pub fn apply(&mut self, table: &InputTable, change: &ParameterChange) -> bool {
        match change {
            ParameterChange::Url(url) => match self.string_mut(table, InputKey::Url) {
                Some(slot) => {
                    slot.clone_from(url);
                    true
                }
                None => false,
            },
            ParameterChange::Paused(v) => self.set_bool(table, InputKey::Pause, *v),
            ParameterChange::Looping(v) => self.set_bool(table, InputKey::Loop, *v),
            ParameterChange::Blackout(v) => self.set_bool(table, InputKey::Blackout, *v),
            ParameterChange::SwitchOnCue(v) => self.set_bool(table, InputKey::SwitchOnCue, *v),
            ParameterChange::Seek(v) => {
                self.set_float(table, InputKey::SeekPosition, f64::from(v.clamp(0.0, 1.0)))
            }
            ParameterChange::Speed(v) => {
                self.set_float(table, InputKey::PlaybackSpeed, f64::from(*v))
            }
            ParameterChange::StartTime(v) => {
                self.set_float(table, InputKey::StartTime, f64::from(v.max(0.0)))
            }
            ParameterChange::EndTime(v) => {
                self.set_float(table, InputKey::EndTime, f64::from(v.max(0.0)))
            }
            ParameterChange::SwitchCue => match self.float_mut(table, InputKey::SwitchCue) {
                Some(slot) => {
                    *slot += 1.0;
                    true
                }
                None => false,
            },
        }
    }
}
