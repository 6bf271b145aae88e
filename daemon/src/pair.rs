//! The two playback sessions and their roles

use crate::controller::{ControllerSlot, StreamController};

/// Role a controller currently plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    /// Drives the visible frame
    Active,
    /// Pre-buffers the next source
    Handover,
}

/// Owns exactly two controllers.
///
/// Only the active slot is stored; the handover role is always the other
/// slot, so roles can never be duplicated or lost. [`swap`](Self::swap) is
/// the only way to change them.
pub struct StreamControllerPair<C> {
    first: C,
    second: C,
    active: ControllerSlot,
}

impl<C: StreamController> StreamControllerPair<C> {
    pub fn new(first: C, second: C) -> Self {
        Self {
            first,
            second,
            active: ControllerSlot::First,
        }
    }

    fn get(&self, slot: ControllerSlot) -> &C {
        match slot {
            ControllerSlot::First => &self.first,
            ControllerSlot::Second => &self.second,
        }
    }

    pub fn slot_mut(&mut self, slot: ControllerSlot) -> &mut C {
        match slot {
            ControllerSlot::First => &mut self.first,
            ControllerSlot::Second => &mut self.second,
        }
    }

    pub fn active_slot(&self) -> ControllerSlot {
        self.active
    }

    pub fn handover_slot(&self) -> ControllerSlot {
        self.active.other()
    }

    pub fn active(&self) -> &C {
        self.get(self.active_slot())
    }

    pub fn handover(&self) -> &C {
        self.get(self.handover_slot())
    }

    pub fn active_mut(&mut self) -> &mut C {
        self.slot_mut(self.active_slot())
    }

    pub fn handover_mut(&mut self) -> &mut C {
        self.slot_mut(self.handover_slot())
    }

    /// Both controllers, active first
    pub fn both_mut(&mut self) -> [&mut C; 2] {
        match self.active {
            ControllerSlot::First => [&mut self.first, &mut self.second],
            ControllerSlot::Second => [&mut self.second, &mut self.first],
        }
    }

    pub fn role_of(&self, slot: ControllerSlot) -> ControllerRole {
        if slot == self.active {
            ControllerRole::Active
        } else {
            ControllerRole::Handover
        }
    }

    /// Exchange the active and handover roles
    pub fn swap(&mut self) {
        self.active = self.active.other();
        log::debug!(
            "Controller roles swapped: {} is now active",
            self.active.name()
        );
    }
}
