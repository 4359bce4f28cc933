//! Look-ahead throttling.

use sratim_common::{buffered_end, TimeRange};

/// What the fetch pipeline should do after a flow check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowDecision {
    /// Keep the current state.
    Hold,
    /// Stop pulling: `ahead` seconds are buffered.
    Pause { ahead: f64 },
    /// Pull again: only `ahead` seconds are buffered.
    Resume { ahead: f64 },
}

/// Keeps the buffered look-ahead under a ceiling.
#[derive(Debug, Clone)]
pub struct FlowController {
    ceiling_secs: f64,
    paused: bool,
}

impl FlowController {
    pub fn new(ceiling_secs: f64) -> Self {
        Self {
            ceiling_secs,
            paused: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Forget the paused state, for a freshly opened fetch.
    pub fn reset(&mut self) {
        self.paused = false;
    }

    /// Seconds buffered past `position`, measured to the furthest edge.
    pub fn ahead(buffered: &[TimeRange], position: f64) -> f64 {
        buffered_end(buffered).map_or(0.0, |end| (end - position).max(0.0))
    }

    /// Compare the look-ahead with the ceiling and flip state if needed.
    pub fn check(&mut self, buffered: &[TimeRange], position: f64) -> FlowDecision {
        let ahead = Self::ahead(buffered, position);
        match (self.paused, ahead >= self.ceiling_secs) {
            (false, true) => {
                self.paused = true;
                FlowDecision::Pause { ahead }
            }
            (true, false) => {
                self.paused = false;
                FlowDecision::Resume { ahead }
            }
            _ => FlowDecision::Hold,
        }
    }
}
