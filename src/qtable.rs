// src/qtable.rs
//
// Lookup table from discretised occupancy state to learned value and
// best action. 512 entries, indexed directly by the 9-bit state.

use serde::{Deserialize, Serialize};

use crate::fixed::QValue;
use crate::types::{Action, OccupancyState, NUM_STATES};

/// One table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QEntry {
    pub q: QValue,
    pub action: Action,
}

impl QEntry {
    /// Q = 0, all stages at full speed.
    pub const SAFE: QEntry = QEntry {
        q: 0,
        action: Action::FULL_SPEED,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QTable {
    entries: Box<[QEntry; NUM_STATES]>,
}

impl QTable {
    pub fn new() -> Self {
        Self {
            entries: Box::new([QEntry::SAFE; NUM_STATES]),
        }
    }

    pub fn entry(&self, state: OccupancyState) -> QEntry {
        self.entries[state.index()]
    }

    pub fn q(&self, state: OccupancyState) -> QValue {
        self.entry(state).q
    }

    pub fn best_action(&self, state: OccupancyState) -> Action {
        self.entry(state).action
    }

    pub fn store(&mut self, state: OccupancyState, q: QValue, action: Action) {
        self.entries[state.index()] = QEntry { q, action };
    }

    /// Restore every row to the safe default.
    pub fn reset(&mut self) {
        self.entries.fill(QEntry::SAFE);
    }

    pub fn is_pristine(&self) -> bool {
        self.entries.iter().all(|e| *e == QEntry::SAFE)
    }

    /// States whose row differs from the safe default, in index order.
    pub fn visited_states(&self) -> impl Iterator<Item = (OccupancyState, QEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| **e != QEntry::SAFE)
            .map(|(i, e)| (OccupancyState::from_bits(i as u16), *e))
    }

    pub fn iter(&self) -> impl Iterator<Item = &QEntry> {
        self.entries.iter()
    }
}

impl Default for QTable {
    fn default() -> Self {
        Self::new()
    }
}
