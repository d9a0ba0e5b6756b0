use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::util::chars_to_wpm;

/// Trailing window used for the live peak raw speed
pub const RAW_PEAK_WINDOW_SECS: f64 = 0.5;

/// Snapshot of a session's typing performance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub wpm: f64,
    pub raw_wpm: f64,
    pub accuracy: f64,
    pub time: f64,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub total_chars: usize,
    pub current_streak: usize,
    pub best_streak: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            wpm: 0.0,
            raw_wpm: 0.0,
            accuracy: 100.0,
            time: 0.0,
            correct_chars: 0,
            incorrect_chars: 0,
            total_chars: 0,
            current_streak: 0,
            best_streak: 0,
        }
    }
}

impl Stats {
    /// Replace accuracy and the incorrect count with the engine's values.
    /// The engine tracks mistakes across corrections, which a recompute from
    /// the final buffer cannot see.
    pub fn with_authoritative(mut self, accuracy: f64, mistakes: u32) -> Self {
        self.accuracy = accuracy.clamp(0.0, 100.0);
        self.incorrect_chars = mistakes as usize;
        self
    }
}

/// Arrival time of character `index` out of `count` when `elapsed_secs` is
/// spread evenly across them. This is an estimate, not a measurement; the
/// live raw speed and the synthetic graph timeline both rely on it.
pub fn uniform_arrival(index: usize, count: usize, elapsed_secs: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (index as f64 / count as f64) * elapsed_secs
}

/// Compute a stats snapshot from the current buffer, the target text, and the
/// seconds since the first keystroke. Pure: same inputs, same output.
pub fn compute_stats(input: &str, target: &str, elapsed_secs: f64) -> Stats {
    let input: Vec<char> = input.chars().collect();
    let target: Vec<char> = target.chars().collect();
    let elapsed_secs = if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
        elapsed_secs
    } else {
        0.0
    };

    let mut correct = 0;
    let mut streak = 0;
    let mut best_streak = 0;
    for (i, c) in input.iter().enumerate() {
        if target.get(i) == Some(c) {
            correct += 1;
            streak += 1;
            best_streak = best_streak.max(streak);
        } else {
            streak = 0;
        }
    }

    let accuracy = if input.is_empty() {
        100.0
    } else {
        (100.0 * correct as f64 / input.len() as f64).clamp(0.0, 100.0)
    };

    Stats {
        wpm: chars_to_wpm(correct as f64, elapsed_secs),
        raw_wpm: peak_raw_wpm(&input, &target, elapsed_secs),
        accuracy,
        time: elapsed_secs,
        correct_chars: correct,
        incorrect_chars: input.len() - correct,
        total_chars: target.len(),
        current_streak: streak,
        best_streak,
    }
}

/// Peak speed over a trailing window of estimated arrival times.
///
/// Characters enter the window one at a time; entries more than
/// [`RAW_PEAK_WINDOW_SECS`] older than the newest are evicted. The rate uses
/// the span actually covered by what is left, so a window holding two close
/// characters does not divide by the full window length.
fn peak_raw_wpm(input: &[char], target: &[char], elapsed_secs: f64) -> f64 {
    if input.is_empty() || elapsed_secs <= 0.0 {
        return 0.0;
    }

    let mut window: VecDeque<(f64, bool)> = VecDeque::with_capacity(input.len());
    let mut window_correct = 0usize;
    let mut peak = 0.0_f64;

    for (i, c) in input.iter().enumerate() {
        let at = uniform_arrival(i, input.len(), elapsed_secs);
        let is_correct = target.get(i) == Some(c);
        window.push_back((at, is_correct));
        if is_correct {
            window_correct += 1;
        }

        while let Some(&(oldest, oldest_correct)) = window.front() {
            if at - oldest <= RAW_PEAK_WINDOW_SECS {
                break;
            }
            window.pop_front();
            if oldest_correct {
                window_correct -= 1;
            }
        }

        let span = window.front().map_or(0.0, |&(oldest, _)| at - oldest);
        if span > 0.0 {
            peak = peak.max(chars_to_wpm(window_correct as f64, span));
        }
    }

    peak
}
