//! Contract for the typing-correctness engine that holds the authoritative
//! input, accuracy, and mistake count, plus the owned handle the session
//! keeps it in.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("engine failed to initialize: {0}")]
    Init(String),

    #[error("engine is in an invalid state: {0}")]
    InvalidState(String),

    #[error("engine call failed: {0}")]
    Call(String),

    #[error("engine has been released")]
    Released,
}

/// Authoritative (input, accuracy, mistakes) triple read back after a call
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub input: String,
    pub accuracy: f64,
    pub mistakes: u32,
}

/// Authoritative end-of-session figures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub accuracy: f64,
    pub mistakes: u32,
}

pub trait TypingEngine: Send {
    /// Fails with [`EngineError::InvalidState`] once input has started
    fn set_text(&mut self, text: &str) -> Result<(), EngineError>;

    /// Apply the entire current buffer (not a delta)
    fn handle_input(&mut self, input: &str) -> Result<EngineReport, EngineError>;

    /// Returns whether anything was deleted. A word-boundary backspace deletes
    /// back to the start of the previous word.
    fn handle_backspace(&mut self, word_boundary: bool) -> Result<bool, EngineError>;

    /// Current (input, accuracy, mistakes) without mutating anything
    fn report(&self) -> Result<EngineReport, EngineError>;

    fn is_finished(&self) -> bool;

    fn wpm(&self) -> f64;

    fn raw_wpm(&self) -> f64;

    fn time_elapsed(&self) -> f64;

    fn stats(&self) -> Result<EngineStats, EngineError>;

    /// Release engine resources. Called exactly once per instance.
    fn dispose(&mut self);
}

/// Builds fresh engine instances
pub trait EngineFactory: Send + Sync {
    fn construct(&self) -> Result<Box<dyn TypingEngine>, EngineError>;

    fn construct_with_text(&self, text: &str) -> Result<Box<dyn TypingEngine>, EngineError> {
        let mut engine = self.construct()?;
        if let Err(e) = engine.set_text(text) {
            engine.dispose();
            return Err(e);
        }
        Ok(engine)
    }
}

/// Owns at most one engine. Replacing or releasing disposes the previous
/// instance first, and each instance is disposed exactly once.
#[derive(Default)]
pub struct EngineHandle {
    engine: Option<Box<dyn TypingEngine>>,
    generation: u64,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("attached", &self.engine.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `engine`, disposing whatever was attached before. Returns the
    /// new handle generation.
    pub fn install(&mut self, engine: Box<dyn TypingEngine>) -> u64 {
        self.release();
        self.engine = Some(engine);
        self.generation += 1;
        debug!(generation = self.generation, "engine installed");
        self.generation
    }

    pub fn release(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
            debug!(generation = self.generation, "engine released");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.engine.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self) -> Result<&dyn TypingEngine, EngineError> {
        self.engine.as_deref().ok_or(EngineError::Released)
    }

    pub fn get_mut(&mut self) -> Result<&mut (dyn TypingEngine + 'static), EngineError> {
        self.engine.as_deref_mut().ok_or(EngineError::Released)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Engine handle shared between the session and the input serializer
pub type SharedEngine = Arc<Mutex<EngineHandle>>;

pub fn shared(handle: EngineHandle) -> SharedEngine {
    Arc::new(Mutex::new(handle))
}

/// Run `f` against the attached engine, if any
pub fn with_engine<R>(
    engine: &SharedEngine,
    f: impl FnOnce(&mut dyn TypingEngine) -> Result<R, EngineError>,
) -> Result<R, EngineError> {
    let mut handle = engine
        .lock()
        .map_err(|_| EngineError::Call("engine lock poisoned".to_string()))?;
    f(handle.get_mut()?)
}

/// Like [`with_engine`], but only if the attached engine is still the one
/// installed as `generation`
pub fn with_engine_generation<R>(
    engine: &SharedEngine,
    generation: u64,
    f: impl FnOnce(&mut dyn TypingEngine) -> Result<R, EngineError>,
) -> Result<R, EngineError> {
    let mut handle = engine
        .lock()
        .map_err(|_| EngineError::Call("engine lock poisoned".to_string()))?;
    if handle.generation() != generation {
        return Err(EngineError::Released);
    }
    f(handle.get_mut()?)
}

/// Like [`with_engine`] but tolerant of a poisoned lock, for teardown
pub fn release_shared(engine: &SharedEngine) {
    engine
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .release();
}


#[cfg(test)]
mod tests {
    use super::testing::{Probe, ProbeEngine};
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    // assert_matches! formats the scrutinee on failure, so the Ok side needs Debug
    impl<'a> std::fmt::Debug for dyn TypingEngine + 'a {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn TypingEngine")
        }
    }

    fn counting() -> (Box<dyn TypingEngine>, Arc<Probe>) {
        let (engine, probe) = ProbeEngine::new("abc", Duration::ZERO);
        (Box::new(engine), probe)
    }

    #[test]
    fn test_empty_handle_reports_released() {
        let handle = EngineHandle::new();
        assert!(!handle.is_attached());
        assert_matches!(handle.get(), Err(EngineError::Released));
    }

    #[test]
    fn test_replace_disposes_previous_once() {
        let (first, first_disposed) = counting();
        let (second, second_disposed) = counting();
        let mut handle = EngineHandle::new();

        assert_eq!(handle.install(first), 1);
        assert_eq!(handle.install(second), 2);
        assert_eq!(first_disposed.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(second_disposed.disposed.load(Ordering::SeqCst), 0);

        handle.release();
        handle.release();
        drop(handle);
        assert_eq!(first_disposed.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(second_disposed.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (engine, disposed) = counting();
        {
            let mut handle = EngineHandle::new();
            handle.install(engine);
        }
        assert_eq!(disposed.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_engine_after_release_fails() {
        let (engine, _disposed) = counting();
        let mut handle = EngineHandle::new();
        handle.install(engine);
        let engine = shared(handle);

        let report = with_engine(&engine, |e| e.handle_input("ab")).unwrap();
        assert_eq!(report.input, "ab");

        release_shared(&engine);
        assert_matches!(
            with_engine(&engine, |e| e.handle_input("abc")),
            Err(EngineError::Released)
        );
    }

    #[test]
    fn test_with_engine_generation_rejects_replaced_engine() {
        let (first, _) = counting();
        let (second, _) = counting();
        let mut handle = EngineHandle::new();
        let old = handle.install(first);
        let engine = shared(handle);

        assert!(with_engine_generation(&engine, old, |e| e.handle_input("a")).is_ok());
        engine.lock().unwrap().install(second);
        assert_matches!(
            with_engine_generation(&engine, old, |e| e.handle_input("ab")),
            Err(EngineError::Released)
        );
    }
}
