/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-item metastable voting state.

/// How one recorded poll moved an item's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollEffect {
    /// Neither side reached alpha_preference. Confidence was reset.
    Inconclusive,
    /// The winning side matched the current preference.
    Reinforced,
    /// The winning side flipped the preference.
    Flipped,
    /// Confidence reached beta; the item is now decided with the carried preference.
    Decided(bool),
    /// The item was already decided; the poll was ignored.
    Frozen,
}

/// The metastable state of one item.
///
/// `pref` starts true (accept) on observation; `conf` counts consecutive agreeing rounds
/// at or above alpha_confidence. Once `decided`, the state is frozen and later polls have
/// no effect.
#[derive(Clone, Copy, Debug)]
pub struct WaveState {
    pref: bool,
    conf: u32,
    last_pref: bool,
    decided: bool,
    rounds: u64,
}

impl Default for WaveState {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveState {
    pub fn new() -> Self {
        Self {
            pref: true,
            conf: 0,
            last_pref: true,
            decided: false,
            rounds: 0,
        }
    }

    pub fn preference(&self) -> bool {
        self.pref
    }

    pub fn confidence(&self) -> u32 {
        self.conf
    }

    pub fn last_preference(&self) -> bool {
        self.last_pref
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Applies one completed poll.
    ///
    /// All threshold comparisons are `>=`. On a tie the preference does not change and
    /// confidence resets to zero (a tie can never reach alpha_preference, since
    /// alpha_preference > k/2).
    pub fn record_poll(
        &mut self,
        yes: u32,
        no: u32,
        alpha_preference: u32,
        alpha_confidence: u32,
        beta: u32,
    ) -> PollEffect {
        if self.decided {
            return PollEffect::Frozen;
        }
        self.rounds += 1;
        self.last_pref = self.pref;

        let max_count = yes.max(no);
        if max_count < alpha_preference {
            self.conf = 0;
            return PollEffect::Inconclusive;
        }

        let winner = yes >= alpha_preference;
        let effect = if winner == self.pref {
            if max_count >= alpha_confidence {
                self.conf += 1;
            }
            PollEffect::Reinforced
        } else {
            self.pref = winner;
            self.conf = if max_count >= alpha_confidence { 1 } else { 0 };
            PollEffect::Flipped
        };

        if self.conf >= beta {
            self.decided = true;
            return PollEffect::Decided(self.pref);
        }
        effect
    }

    /// Counts an expired or cancelled poll: inconclusive, confidence reset.
    pub fn record_inconclusive(&mut self) -> PollEffect {
        self.record_poll(0, 0, 1, 1, u32::MAX)
    }
}
