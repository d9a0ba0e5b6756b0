//! Session lifecycle: Idle -> Running -> Finished.
//!
//! The session owns the engine handle, the serializer feeding it, and the
//! timeline recorder. Engine results are applied on the caller's thread by
//! [`Session::pump`], so everything in here is single threaded apart from the
//! drain loop inside the serializer.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::{secs_between, Clock};
use crate::corpus::TextItem;
use crate::engine::{
    release_shared, shared, with_engine, EngineError, EngineFactory, EngineHandle, EngineStats,
    SharedEngine,
};
use crate::graph::{build_graph, Graph};
use crate::serializer::{Backspace, EngineSnapshot, Enqueue, InputSerializer};
use crate::stats::{compute_stats, Stats};
use crate::timeline::{FrozenTimeline, TimelineRecorder};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("could not start the typing engine: {0}")]
    EngineInit(#[source] EngineError),

    #[error("no session is running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionState {
    Idle,
    Running,
    Finished,
}

/// Everything the results screen needs. Built once, at the moment the
/// engine reports completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResult {
    pub stats: Stats,
    pub final_input: String,
    pub timeline: FrozenTimeline,
    pub graph: Graph,
}

/// The engine's own live figures, read without waiting on the drain loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineMetrics {
    pub wpm: f64,
    pub raw_wpm: f64,
    pub elapsed: f64,
}

pub struct Session {
    factory: Arc<dyn EngineFactory>,
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
    state: SessionState,
    text: Option<TextItem>,
    generation: u64,
    serializer: Option<InputSerializer>,
    updates: Option<Receiver<EngineSnapshot>>,
    recorder: TimelineRecorder,
    /// Buffer as the user has typed it, ahead of the engine
    buffer: String,
    /// Buffer as the engine last reported it
    input: String,
    accuracy: f64,
    mistakes: u32,
    started_at: Option<Instant>,
    stats: Stats,
    result: Option<SessionResult>,
    last_error: Option<SessionError>,
}

impl Session {
    pub fn new(factory: Arc<dyn EngineFactory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory,
            engine: shared(EngineHandle::new()),
            clock,
            state: SessionState::Idle,
            text: None,
            generation: 0,
            serializer: None,
            updates: None,
            recorder: TimelineRecorder::default(),
            buffer: String::new(),
            input: String::new(),
            accuracy: 100.0,
            mistakes: 0,
            started_at: None,
            stats: Stats::default(),
            result: None,
            last_error: None,
        }
    }

    /// Start typing `item`, replacing whatever session came before. On engine
    /// failure the session is left Idle with no engine attached.
    pub fn start(&mut self, item: &TextItem) -> Result<(), SessionError> {
        self.clear();

        let engine = match self.factory.construct_with_text(&item.content) {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, category = %item.category, "engine construction failed");
                release_shared(&self.engine);
                self.state = SessionState::Idle;
                let err = SessionError::EngineInit(e);
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        self.generation = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .install(engine);
        let (serializer, updates) =
            InputSerializer::new(Arc::clone(&self.engine), &item.content, self.generation);
        self.serializer = Some(serializer);
        self.updates = Some(updates);
        self.recorder.reset(&item.content);
        self.text = Some(item.clone());
        self.state = SessionState::Running;

        info!(
            category = %item.category,
            chars = item.content.chars().count(),
            generation = self.generation,
            "session started"
        );
        Ok(())
    }

    /// Drop the current session entirely and release the engine
    pub fn return_to_idle(&mut self) {
        self.clear();
        release_shared(&self.engine);
        self.text = None;
        self.state = SessionState::Idle;
        info!("session returned to idle");
    }

    /// Queue the full buffer `raw`. Buffers longer than the target are
    /// ignored.
    pub fn type_input(&mut self, raw: &str) -> Result<Enqueue, SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        let serializer = self.serializer.as_ref().ok_or(SessionError::NotRunning)?;

        let at = self.clock.now();
        let outcome = serializer.enqueue(raw, at);
        if outcome == Enqueue::Accepted {
            if self.started_at.is_none() && !raw.is_empty() {
                self.started_at = Some(at);
                debug!("first keystroke");
            }
            self.buffer = raw.to_string();
        }
        Ok(outcome)
    }

    /// Append one character to the buffer
    pub fn type_char(&mut self, c: char) -> Result<Enqueue, SessionError> {
        let mut raw = self.buffer.clone();
        raw.push(c);
        self.type_input(&raw)
    }

    pub fn backspace(&mut self, word_boundary: bool) -> Result<Backspace, SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        let serializer = self.serializer.as_ref().ok_or(SessionError::NotRunning)?;

        let at = self.clock.now();
        let outcome = serializer.backspace(word_boundary, at);
        if let Backspace::Applied(snapshot) | Backspace::Failed(snapshot) = &outcome {
            self.buffer = snapshot.input.clone();
        }
        self.pump();
        Ok(outcome)
    }

    /// Apply every engine result published since the last pump. Returns how
    /// many were applied.
    pub fn pump(&mut self) -> usize {
        let Some(updates) = &self.updates else {
            return 0;
        };
        let snapshots: Vec<EngineSnapshot> = updates.try_iter().collect();

        let mut applied = 0;
        for snapshot in snapshots {
            if self.state != SessionState::Running {
                break;
            }
            if self.apply(snapshot) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the drain loop to go idle, then pump. Returns false if the
    /// engine was still busy after `timeout`.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let idle = self
            .serializer
            .as_ref()
            .map_or(true, |s| s.wait_idle(timeout));
        self.pump();
        idle
    }

    /// Recompute live stats from the latest published engine result and the
    /// clock. Only reads session state; the finished stats are never
    /// recomputed.
    pub fn refresh(&mut self) -> Stats {
        if self.state != SessionState::Running {
            return self.stats;
        }

        let input = self
            .serializer
            .as_ref()
            .and_then(|s| s.latest())
            .filter(|s| s.generation == self.generation)
            .map_or_else(|| self.input.clone(), |s| s.input);
        self.stats = compute_stats(&input, self.target(), self.elapsed());
        self.stats
    }

    /// True while an engine call has been running for at least `threshold`
    pub fn engine_stalled(&self, threshold: Duration) -> bool {
        self.serializer
            .as_ref()
            .is_some_and(|s| s.stalled(threshold))
    }

    /// The engine's own figures, or None if it is busy or absent
    pub fn engine_metrics(&self) -> Option<EngineMetrics> {
        let handle = self.engine.try_lock().ok()?;
        let engine = handle.get().ok()?;
        Some(EngineMetrics {
            wpm: engine.wpm(),
            raw_wpm: engine.raw_wpm(),
            elapsed: engine.time_elapsed(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn text(&self) -> Option<&TextItem> {
        self.text.as_ref()
    }

    pub fn target(&self) -> &str {
        self.text.as_ref().map_or("", |t| t.content.as_str())
    }

    /// What the user has typed, including keystrokes the engine has not
    /// answered yet
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// The engine's view of the input
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn mistakes(&self) -> u32 {
        self.mistakes
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Seconds since the first keystroke, or the final time once finished
    pub fn elapsed(&self) -> f64 {
        match (self.state, self.started_at) {
            (SessionState::Finished, _) => self.stats.time,
            (_, Some(started)) => secs_between(started, self.clock.now()),
            _ => 0.0,
        }
    }

    pub fn recorder(&self) -> &TimelineRecorder {
        &self.recorder
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn engine_attached(&self) -> bool {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_attached()
    }

    fn apply(&mut self, snapshot: EngineSnapshot) -> bool {
        if snapshot.generation != self.generation {
            debug!(
                generation = snapshot.generation,
                current = self.generation,
                "ignoring result from a previous session"
            );
            return false;
        }

        let started = *self.started_at.get_or_insert(snapshot.at);
        self.recorder
            .record(&snapshot.input, secs_between(started, snapshot.at));

        self.input = snapshot.input.clone();
        self.accuracy = snapshot.accuracy;
        self.mistakes = snapshot.mistakes;
        // once the engine has answered the newest keystroke it wins
        let newest = self
            .serializer
            .as_ref()
            .is_some_and(|s| s.last_seq() == snapshot.seq);
        if newest {
            self.buffer = snapshot.input;
        }

        if snapshot.finished {
            self.finish(snapshot.at);
        }
        true
    }

    fn finish(&mut self, at: Instant) {
        let elapsed = self.started_at.map_or(0.0, |started| secs_between(started, at));

        let (accuracy, mistakes) = match self.engine_stats() {
            Ok(stats) => (stats.accuracy, stats.mistakes),
            Err(e) => {
                warn!(error = %e, "engine stats unavailable, using last reported values");
                (self.accuracy, self.mistakes)
            }
        };
        let stats = compute_stats(&self.input, self.target(), elapsed)
            .with_authoritative(accuracy, mistakes);

        let timeline = self.recorder.freeze();
        if timeline.is_empty() {
            warn!("session finished with an empty timeline, graph will be estimated");
        }
        let graph = build_graph(&timeline, &stats);

        if let Some(serializer) = &self.serializer {
            serializer.invalidate();
        }
        self.stats = stats;
        self.result = Some(SessionResult {
            stats,
            final_input: self.input.clone(),
            timeline,
            graph,
        });
        self.state = SessionState::Finished;

        info!(
            wpm = stats.wpm,
            raw_wpm = stats.raw_wpm,
            accuracy = stats.accuracy,
            time = stats.time,
            "session finished"
        );
    }

    fn engine_stats(&self) -> Result<EngineStats, EngineError> {
        with_engine(&self.engine, |engine| engine.stats())
    }

    /// Reset every per-session field. Results still in flight for the old
    /// session are discarded by the generation check.
    fn clear(&mut self) {
        if let Some(serializer) = self.serializer.take() {
            serializer.invalidate();
        }
        self.updates = None;
        self.recorder = TimelineRecorder::default();
        self.buffer.clear();
        self.input.clear();
        self.accuracy = 100.0;
        self.mistakes = 0;
        self.started_at = None;
        self.stats = Stats::default();
        self.result = None;
        self.last_error = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(serializer) = self.serializer.take() {
            serializer.invalidate();
        }
        release_shared(&self.engine);
    }
}
