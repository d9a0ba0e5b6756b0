//! Results graph: per-second WPM and raw samples over trailing windows,
//! smoothed for display, with error markers pinned to the WPM line.
//!
//! Smoothing is presentation only. Nothing here feeds back into [`Stats`].

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::stats::{uniform_arrival, Stats};
use crate::time_series::{ErrorMarker, GraphPoint};
use crate::timeline::FrozenTimeline;
use crate::util::{chars_to_wpm, trailing_mean};

pub const GRAPH_INTERVAL_SECS: f64 = 1.0;
/// Net WPM counts correct characters over this trailing window
pub const WPM_WINDOW_SECS: f64 = 2.0;
/// Raw speed counts every character over this trailing window
pub const RAW_WINDOW_SECS: f64 = 0.5;
/// Number of ticks (including the current one) averaged per point
pub const SMOOTHING_TICKS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub points: Vec<GraphPoint>,
    pub markers: Vec<ErrorMarker>,
    /// True when the points were built from timings estimated from the
    /// aggregate stats because no timeline was recorded
    pub synthetic: bool,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn peak_wpm(&self) -> f64 {
        self.points.iter().map(|p| p.wpm.max(p.raw)).fold(0.0, f64::max)
    }

    pub fn duration(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    elapsed: f64,
    is_correct: bool,
}

/// Build the results graph from a frozen timeline and the final stats.
///
/// When the timeline holds no character timings the samples are synthesized
/// from `stats` with the same uniform spacing the live raw speed uses, so a
/// graph can be drawn from any stats snapshot.
pub fn build_graph(timeline: &FrozenTimeline, stats: &Stats) -> Graph {
    let recorded: Vec<Sample> = timeline
        .char_timings()
        .iter()
        .map(|t| Sample {
            elapsed: t.elapsed,
            is_correct: t.is_correct,
        })
        .collect();

    let synthetic = recorded.is_empty();
    let (samples, duration) = if synthetic {
        debug!(
            correct = stats.correct_chars,
            incorrect = stats.incorrect_chars,
            time = stats.time,
            "no recorded timings, synthesizing graph samples"
        );
        (synthesize(stats), stats.time)
    } else {
        let last = timeline.last_elapsed().unwrap_or(0.0);
        (recorded, stats.time.max(last))
    };

    let errors: Vec<f64> = if timeline.keypresses().is_empty() {
        samples
            .iter()
            .filter(|s| !s.is_correct)
            .map(|s| s.elapsed)
            .collect()
    } else {
        timeline
            .keypresses()
            .iter()
            .filter(|k| !k.is_correct)
            .map(|k| k.elapsed)
            .collect()
    };
    // every error needs a tick to sit on, even when no time has passed
    let duration = if !errors.is_empty() && tick_count(duration) == 0 {
        GRAPH_INTERVAL_SECS
    } else {
        duration
    };
    let points = smooth(sample_ticks(&samples, duration));
    let markers = place_markers(&points, &errors);

    Graph {
        points,
        markers,
        synthetic,
    }
}

/// Number of whole-second ticks covering `duration`
pub fn tick_count(duration: f64) -> usize {
    if duration.is_finite() && duration > 0.0 {
        (duration / GRAPH_INTERVAL_SECS).ceil() as usize
    } else {
        0
    }
}

fn synthesize(stats: &Stats) -> Vec<Sample> {
    let count = stats.correct_chars + stats.incorrect_chars;
    (0..count)
        .map(|i| Sample {
            elapsed: uniform_arrival(i, count, stats.time),
            is_correct: i < stats.correct_chars,
        })
        .collect()
}

fn sample_ticks(samples: &[Sample], duration: f64) -> Vec<GraphPoint> {
    (1..=tick_count(duration))
        .map(|tick| {
            let t = tick as f64 * GRAPH_INTERVAL_SECS;
            let in_window = |s: &&Sample, window: f64| s.elapsed > t - window && s.elapsed <= t;

            let correct = samples
                .iter()
                .filter(|s| in_window(s, WPM_WINDOW_SECS) && s.is_correct)
                .count();
            let all = samples
                .iter()
                .filter(|s| in_window(s, RAW_WINDOW_SECS))
                .count();

            GraphPoint::new(
                t,
                chars_to_wpm(correct as f64, WPM_WINDOW_SECS),
                chars_to_wpm(all as f64, RAW_WINDOW_SECS),
            )
        })
        .collect()
}

fn smooth(points: Vec<GraphPoint>) -> Vec<GraphPoint> {
    let wpm: Vec<f64> = points.iter().map(|p| p.wpm).collect();
    let raw: Vec<f64> = points.iter().map(|p| p.raw).collect();
    let wpm = trailing_mean(&wpm, SMOOTHING_TICKS);
    let raw = trailing_mean(&raw, SMOOTHING_TICKS);

    points
        .iter()
        .zip(wpm.into_iter().zip(raw))
        .map(|(p, (wpm, raw))| GraphPoint::new(p.time, wpm, raw))
        .collect()
}

/// One marker per error, at the closest tick. Ties go to the earlier tick.
fn place_markers(points: &[GraphPoint], errors: &[f64]) -> Vec<ErrorMarker> {
    errors
        .iter()
        .filter_map(|&at| {
            points
                .iter()
                .min_by(|a, b| {
                    (a.time - at)
                        .abs()
                        .partial_cmp(&(b.time - at).abs())
                        .unwrap_or(Ordering::Equal)
                })
                .map(ErrorMarker::from)
        })
        .collect()
}
