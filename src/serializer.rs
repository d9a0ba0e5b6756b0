//! Serializes buffer updates into the engine.
//!
//! Keystrokes arrive far faster than the engine answers. Every accepted input
//! goes into a FIFO queue and a single drain thread applies them one at a
//! time, so at most one engine call is ever in flight and results come back
//! in keystroke order. Results are published on a channel and in
//! [`InputSerializer::latest`].

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::engine::{with_engine_generation, EngineError, EngineReport, SharedEngine};

/// How long a backspace waits for an active drain before giving up
pub const DEFAULT_GATE_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Read back from the engine after a successful call
    Engine,
    /// The engine call failed and the raw input was echoed instead
    LocalEcho,
}

/// Authoritative view of the buffer after one serialized update
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub generation: u64,
    /// Order of the keystroke behind this snapshot, see
    /// [`InputSerializer::last_seq`]
    pub seq: u64,
    pub input: String,
    pub accuracy: f64,
    pub mistakes: u32,
    pub finished: bool,
    /// When the keystroke behind this snapshot happened
    pub at: Instant,
    pub source: SnapshotSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Accepted,
    /// Longer than the target text
    Rejected,
    /// Invalidated or finished; nothing more is accepted
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Backspace {
    Applied(EngineSnapshot),
    /// The engine declined to delete anything
    Unchanged,
    /// A drain was still running after the gate wait
    Busy,
    /// The engine call failed and the last known-good input was kept
    Failed(EngineSnapshot),
    Closed,
}

struct Pending {
    seq: u64,
    input: String,
    at: Instant,
}

struct QueueState {
    queue: VecDeque<Pending>,
    /// Set while a drain or a backspace owns the engine
    busy: bool,
    closed: bool,
    generation: u64,
    issued: u64,
    last_good: EngineReport,
    in_flight_since: Option<Instant>,
}

struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
    latest: RwLock<Option<EngineSnapshot>>,
    updates: Mutex<Sender<EngineSnapshot>>,
    engine: SharedEngine,
    engine_generation: u64,
    target_len: usize,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_gate(state: &mut QueueState, idle: &Condvar) {
        state.busy = false;
        state.in_flight_since = None;
        idle.notify_all();
    }

    fn call_input(&self, input: &str) -> Result<(EngineReport, bool), EngineError> {
        with_engine_generation(&self.engine, self.engine_generation, |engine| {
            let report = engine.handle_input(input)?;
            Ok((report, engine.is_finished()))
        })
    }

    /// One bounded retry, then echo the raw input so typing never stalls
    fn apply(&self, pending: Pending, generation: u64) -> EngineSnapshot {
        let result = self.call_input(&pending.input).or_else(|e| match e {
            EngineError::Released => Err(e),
            e => {
                debug!(error = %e, "engine call failed, retrying once");
                self.call_input(&pending.input)
            }
        });

        match result {
            Ok((report, finished)) => EngineSnapshot {
                generation,
                seq: pending.seq,
                input: report.input,
                accuracy: report.accuracy,
                mistakes: report.mistakes,
                finished,
                at: pending.at,
                source: SnapshotSource::Engine,
            },
            Err(e) => {
                warn!(error = %e, "engine unavailable, echoing input locally");
                let last_good = self.lock_state().last_good.clone();
                EngineSnapshot {
                    generation,
                    seq: pending.seq,
                    input: pending.input,
                    accuracy: last_good.accuracy,
                    mistakes: last_good.mistakes,
                    finished: false,
                    at: pending.at,
                    source: SnapshotSource::LocalEcho,
                }
            }
        }
    }

    /// Publish unless the snapshot belongs to an invalidated generation
    fn publish(&self, snapshot: &EngineSnapshot) -> bool {
        let mut state = self.lock_state();
        state.in_flight_since = None;
        if state.closed || snapshot.generation != state.generation {
            debug!(
                generation = snapshot.generation,
                current = state.generation,
                "discarding stale engine result"
            );
            return false;
        }

        if snapshot.source == SnapshotSource::Engine {
            state.last_good = EngineReport {
                input: snapshot.input.clone(),
                accuracy: snapshot.accuracy,
                mistakes: snapshot.mistakes,
            };
        }
        if snapshot.finished {
            let dropped = state.queue.len();
            state.queue.clear();
            state.closed = true;
            debug!(dropped, "engine reported completion, closing queue");
        }

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        // the receiver going away only means nobody is listening any more
        let _ = self
            .updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(snapshot.clone());
        true
    }

    fn drain(self: Arc<Self>) {
        loop {
            let (pending, generation) = {
                let mut state = self.lock_state();
                match state.queue.pop_front() {
                    Some(pending) if !state.closed => {
                        state.in_flight_since = Some(Instant::now());
                        (pending, state.generation)
                    }
                    _ => {
                        state.queue.clear();
                        Self::release_gate(&mut state, &self.idle);
                        trace!("input queue drained");
                        return;
                    }
                }
            };

            let snapshot = self.apply(pending, generation);
            self.publish(&snapshot);
        }
    }

    fn spawn_drain(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("input-drain".to_string())
            .spawn(move || shared.drain());
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn drain thread, draining inline");
            Arc::clone(self).drain();
        }
    }
}

/// FIFO front door to the engine for one session
pub struct InputSerializer {
    shared: Arc<Shared>,
    gate_wait: Duration,
}

impl InputSerializer {
    /// Serializer for a session whose target is `target`. Snapshots tagged
    /// with `generation` are published on the returned receiver.
    pub fn new(
        engine: SharedEngine,
        target: &str,
        generation: u64,
    ) -> (Self, Receiver<EngineSnapshot>) {
        let (tx, rx) = mpsc::channel();
        let shared = Shared {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                busy: false,
                closed: false,
                generation,
                issued: 0,
                last_good: EngineReport {
                    input: String::new(),
                    accuracy: 100.0,
                    mistakes: 0,
                },
                in_flight_since: None,
            }),
            idle: Condvar::new(),
            latest: RwLock::new(None),
            updates: Mutex::new(tx),
            engine,
            engine_generation: generation,
            target_len: target.chars().count(),
        };
        (
            Self {
                shared: Arc::new(shared),
                gate_wait: DEFAULT_GATE_WAIT,
            },
            rx,
        )
    }

    pub fn with_gate_wait(mut self, gate_wait: Duration) -> Self {
        self.gate_wait = gate_wait;
        self
    }

    /// Queue the whole buffer `input`, typed at `at`. Returns immediately.
    pub fn enqueue(&self, input: &str, at: Instant) -> Enqueue {
        if input.chars().count() > self.shared.target_len {
            debug!(len = input.chars().count(), "input longer than target, rejected");
            return Enqueue::Rejected;
        }

        let mut state = self.shared.lock_state();
        if state.closed {
            return Enqueue::Closed;
        }
        state.issued += 1;
        let seq = state.issued;
        state.queue.push_back(Pending {
            seq,
            input: input.to_string(),
            at,
        });
        trace!(queued = state.queue.len(), "input queued");

        if !state.busy {
            state.busy = true;
            drop(state);
            self.shared.spawn_drain();
        }
        Enqueue::Accepted
    }

    /// Apply a backspace directly on the engine. Never runs alongside a
    /// drain: waits up to the gate wait for one to finish, then reports
    /// [`Backspace::Busy`].
    pub fn backspace(&self, word_boundary: bool, at: Instant) -> Backspace {
        let (generation, seq) = {
            let state = self.shared.lock_state();
            let (mut state, _) = self
                .shared
                .idle
                .wait_timeout_while(state, self.gate_wait, |s| s.busy && !s.closed)
                .unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return Backspace::Closed;
            }
            if state.busy {
                debug!("backspace refused while input is draining");
                return Backspace::Busy;
            }
            state.busy = true;
            state.in_flight_since = Some(Instant::now());
            state.issued += 1;
            (state.generation, state.issued)
        };

        let shared = &self.shared;
        let result = with_engine_generation(&shared.engine, shared.engine_generation, |engine| {
            if !engine.handle_backspace(word_boundary)? {
                return Ok(None);
            }
            Ok(Some((engine.report()?, engine.is_finished())))
        });

        let outcome = match result {
            Ok(Some((report, finished))) => {
                let snapshot = EngineSnapshot {
                    generation,
                    seq,
                    input: report.input,
                    accuracy: report.accuracy,
                    mistakes: report.mistakes,
                    finished,
                    at,
                    source: SnapshotSource::Engine,
                };
                if self.shared.publish(&snapshot) {
                    Backspace::Applied(snapshot)
                } else {
                    Backspace::Closed
                }
            }
            Ok(None) => Backspace::Unchanged,
            Err(e) => {
                warn!(error = %e, word_boundary, "backspace failed, keeping last good input");
                let last_good = self.shared.lock_state().last_good.clone();
                let snapshot = EngineSnapshot {
                    generation,
                    seq,
                    input: last_good.input,
                    accuracy: last_good.accuracy,
                    mistakes: last_good.mistakes,
                    finished: false,
                    at,
                    source: SnapshotSource::LocalEcho,
                };
                self.shared.publish(&snapshot);
                Backspace::Failed(snapshot)
            }
        };

        let mut state = self.shared.lock_state();
        if state.queue.is_empty() || state.closed {
            Shared::release_gate(&mut state, &self.shared.idle);
        } else {
            drop(state);
            self.shared.spawn_drain();
        }
        outcome
    }

    /// Drop queued input and discard any result still in flight. Nothing is
    /// accepted afterwards.
    pub fn invalidate(&self) {
        let mut state = self.shared.lock_state();
        state.generation += 1;
        state.closed = true;
        let dropped = state.queue.len();
        state.queue.clear();
        self.shared.idle.notify_all();
        debug!(dropped, generation = state.generation, "serializer invalidated");
    }

    /// Block until nothing is queued or in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock_state();
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |s| s.busy)
            .unwrap_or_else(PoisonError::into_inner);
        !state.busy
    }

    pub fn latest(&self) -> Option<EngineSnapshot> {
        self.shared
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sequence number of the newest keystroke accepted so far
    pub fn last_seq(&self) -> u64 {
        self.shared.lock_state().issued
    }

    pub fn pending(&self) -> usize {
        self.shared.lock_state().queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_state().closed
    }

    /// True when the current engine call has been running for `threshold`
    pub fn stalled(&self, threshold: Duration) -> bool {
        self.shared
            .lock_state()
            .in_flight_since
            .is_some_and(|since| since.elapsed() >= threshold)
    }
}

impl Drop for InputSerializer {
    fn drop(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Probe, ProbeEngine};
    use assert_matches::assert_matches;
    use std::sync::atomic::Ordering;

    const IDLE: Duration = Duration::from_secs(5);

    fn serializer(
        text: &str,
        latency_ms: u64,
    ) -> (InputSerializer, Receiver<EngineSnapshot>, Arc<Probe>) {
        let (engine, probe) = ProbeEngine::shared(text, Duration::from_millis(latency_ms));
        let (serializer, rx) = InputSerializer::new(engine, text, 1);
        (serializer, rx, probe)
    }

    #[test]
    fn test_inputs_reach_engine_in_order() {
        let (serializer, rx, probe) = serializer("ab cd", 30);
        let now = Instant::now();

        assert_eq!(serializer.enqueue("a", now), Enqueue::Accepted);
        assert_eq!(serializer.enqueue("ab", now), Enqueue::Accepted);
        assert_eq!(serializer.enqueue("ab c", now), Enqueue::Accepted);
        assert!(serializer.wait_idle(IDLE));

        assert_eq!(probe.calls(), vec!["a", "ab", "ab c"]);
        let published: Vec<String> = rx.try_iter().map(|s| s.input).collect();
        assert_eq!(published, vec!["a", "ab", "ab c"]);
        assert_eq!(serializer.latest().unwrap().input, "ab c");
    }

    #[test]
    fn test_one_call_in_flight_across_producers() {
        let (serializer, _rx, probe) = serializer("abcdefghij", 2);
        let serializer = Arc::new(serializer);

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let serializer = Arc::clone(&serializer);
                thread::spawn(move || {
                    for n in 1..=5 {
                        serializer.enqueue(&"abcdefghij"[..n], Instant::now());
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert!(serializer.wait_idle(IDLE));

        assert_eq!(probe.calls().len(), 20);
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_longer_than_target_is_rejected() {
        let (serializer, rx, probe) = serializer("cat", 0);
        assert_eq!(serializer.enqueue("cats", Instant::now()), Enqueue::Rejected);
        assert!(serializer.wait_idle(IDLE));
        assert!(probe.calls().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_call_retries_once() {
        let (serializer, rx, probe) = serializer("cat", 0);
        probe.fail_next_inputs.store(1, Ordering::SeqCst);

        serializer.enqueue("c", Instant::now());
        assert!(serializer.wait_idle(IDLE));

        assert_eq!(probe.calls(), vec!["c", "c"]);
        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.source, SnapshotSource::Engine);
        assert_eq!(snapshot.input, "c");
    }

    #[test]
    fn test_persistent_failure_echoes_input() {
        let (serializer, rx, probe) = serializer("cat", 0);
        serializer.enqueue("c", Instant::now());
        assert!(serializer.wait_idle(IDLE));

        probe.fail_next_inputs.store(4, Ordering::SeqCst);
        serializer.enqueue("cx", Instant::now());
        serializer.enqueue("cxy", Instant::now());
        assert!(serializer.wait_idle(IDLE));

        let snapshots: Vec<EngineSnapshot> = rx.try_iter().collect();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].source, SnapshotSource::Engine);
        assert_eq!(snapshots[1].source, SnapshotSource::LocalEcho);
        assert_eq!(snapshots[1].input, "cx");
        assert_eq!(snapshots[2].input, "cxy");
        // accuracy stays at the last engine-confirmed value
        assert_eq!(snapshots[2].accuracy, 100.0);
    }

    #[test]
    fn test_invalidate_discards_in_flight_result() {
        let (serializer, rx, probe) = serializer("cat", 100);
        serializer.enqueue("c", Instant::now());
        serializer.enqueue("ca", Instant::now());
        thread::sleep(Duration::from_millis(20));
        serializer.invalidate();

        assert!(serializer.wait_idle(IDLE));
        assert_eq!(probe.calls(), vec!["c"]);
        assert!(rx.try_recv().is_err());
        assert!(serializer.latest().is_none());
        assert_eq!(serializer.enqueue("c", Instant::now()), Enqueue::Closed);
    }

    #[test]
    fn test_backspace_waits_out_short_drain() {
        let (serializer, rx, _probe) = serializer("Hello", 30);
        serializer.enqueue("Hel", Instant::now());

        let outcome = serializer.backspace(false, Instant::now());
        assert_matches!(outcome, Backspace::Applied(ref s) if s.input == "He");

        let published: Vec<String> = rx.try_iter().map(|s| s.input).collect();
        assert_eq!(published, vec!["Hel", "He"]);
    }

    #[test]
    fn test_backspace_busy_during_slow_drain() {
        let (serializer, _rx, _probe) = serializer("Hello", 300);
        let serializer = serializer.with_gate_wait(Duration::from_millis(20));
        serializer.enqueue("Hel", Instant::now());

        assert_eq!(serializer.backspace(false, Instant::now()), Backspace::Busy);
        assert!(serializer.wait_idle(IDLE));
        assert_eq!(serializer.latest().unwrap().input, "Hel");
    }

    #[test]
    fn test_backspace_failure_keeps_last_good_input() {
        let (serializer, _rx, probe) = serializer("Hello", 0);
        serializer.enqueue("Hel", Instant::now());
        assert!(serializer.wait_idle(IDLE));

        probe.fail_backspace.store(true, Ordering::SeqCst);
        assert_matches!(
            serializer.backspace(true, Instant::now()),
            Backspace::Failed(ref s) if s.input == "Hel"
        );
        assert!(serializer.wait_idle(IDLE));
    }

    #[test]
    fn test_backspace_with_nothing_to_delete() {
        let (serializer, _rx, _probe) = serializer("Hello", 0);
        assert_eq!(serializer.backspace(false, Instant::now()), Backspace::Unchanged);
        assert!(serializer.wait_idle(IDLE));
    }

    #[test]
    fn test_completion_closes_queue() {
        let (serializer, rx, _probe) = serializer("hi", 0);
        serializer.enqueue("hi", Instant::now());
        assert!(serializer.wait_idle(IDLE));

        assert!(rx.try_recv().unwrap().finished);
        assert!(serializer.is_closed());
        assert_eq!(serializer.enqueue("h", Instant::now()), Enqueue::Closed);
    }

    #[test]
    fn test_stalled_while_engine_is_slow() {
        let (serializer, _rx, _probe) = serializer("abc", 200);
        serializer.enqueue("a", Instant::now());
        thread::sleep(Duration::from_millis(60));

        assert!(serializer.stalled(Duration::from_millis(50)));
        serializer.enqueue("ab", Instant::now());
        assert_eq!(serializer.pending(), 1);
        assert!(serializer.wait_idle(IDLE));
        assert_eq!(serializer.pending(), 0);
        assert!(!serializer.stalled(Duration::ZERO));
    }
}
