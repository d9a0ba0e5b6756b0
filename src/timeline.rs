use serde::{Deserialize, Serialize};

/// Timing of one character currently in the input buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterTiming {
    pub index: usize,
    pub ch: char,
    pub elapsed: f64,
    pub is_correct: bool,
}

/// One accepted keystroke. The keypress log is never truncated, so an index
/// can appear more than once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeypressEvent {
    pub elapsed: f64,
    pub char_index: usize,
    pub is_correct: bool,
}

/// Records per-character timings and the keypress audit trail for the
/// running session.
///
/// The character log always has exactly one entry per character of the last
/// recorded input.
#[derive(Debug, Clone, Default)]
pub struct TimelineRecorder {
    target: Vec<char>,
    last_input: Vec<char>,
    char_timings: Vec<CharacterTiming>,
    keypresses: Vec<KeypressEvent>,
}

impl TimelineRecorder {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.chars().collect(),
            ..Self::default()
        }
    }

    /// Clear both logs and switch to a new target text
    pub fn reset(&mut self, target: &str) {
        *self = Self::new(target);
    }

    /// Record the authoritative input observed `elapsed` seconds after the
    /// first keystroke.
    pub fn record(&mut self, input: &str, elapsed: f64) {
        let input: Vec<char> = input.chars().collect();
        if input == self.last_input {
            return;
        }

        if let Some(&last) = input.last() {
            let idx = input.len() - 1;
            self.keypresses.push(KeypressEvent {
                elapsed,
                char_index: idx,
                is_correct: self.is_correct_at(idx, last),
            });
        }

        // Everything past the unchanged prefix is stale: a shrink truncates,
        // a one-char grow appends, a replace of the last char overwrites it.
        let kept = self
            .last_input
            .iter()
            .zip(input.iter())
            .take_while(|(a, b)| a == b)
            .count();
        self.char_timings.truncate(kept);

        let added = input.len() - kept;
        if added > 0 {
            // Pasted runs are spread evenly between the last kept timing and
            // now, matching the uniform spacing used for synthetic timelines.
            let from = self.char_timings.last().map_or(0.0, |t| t.elapsed);
            let from = from.min(elapsed);
            for (step, idx) in (kept..input.len()).enumerate() {
                let fraction = (step + 1) as f64 / added as f64;
                let ch = input[idx];
                self.char_timings.push(CharacterTiming {
                    index: idx,
                    ch,
                    elapsed: from + (elapsed - from) * fraction,
                    is_correct: self.is_correct_at(idx, ch),
                });
            }
        }

        self.last_input = input;
    }

    pub fn char_timings(&self) -> &[CharacterTiming] {
        &self.char_timings
    }

    pub fn keypresses(&self) -> &[KeypressEvent] {
        &self.keypresses
    }

    /// Snapshot both logs into an immutable timeline
    pub fn freeze(&self) -> FrozenTimeline {
        FrozenTimeline {
            char_timings: self.char_timings.clone(),
            keypresses: self.keypresses.clone(),
        }
    }

    fn is_correct_at(&self, idx: usize, ch: char) -> bool {
        self.target.get(idx) == Some(&ch)
    }
}

/// Final copy of a session's timeline. Only readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrozenTimeline {
    char_timings: Vec<CharacterTiming>,
    keypresses: Vec<KeypressEvent>,
}

impl FrozenTimeline {
    pub fn from_parts(char_timings: Vec<CharacterTiming>, keypresses: Vec<KeypressEvent>) -> Self {
        Self {
            char_timings,
            keypresses,
        }
    }

    pub fn char_timings(&self) -> &[CharacterTiming] {
        &self.char_timings
    }

    pub fn keypresses(&self) -> &[KeypressEvent] {
        &self.keypresses
    }

    pub fn is_empty(&self) -> bool {
        self.char_timings.is_empty() && self.keypresses.is_empty()
    }

    /// Elapsed time of the latest recorded character, if any
    pub fn last_elapsed(&self) -> Option<f64> {
        self.char_timings.last().map(|t| t.elapsed)
    }
}
