use std::time::Instant;

use crate::engine::{EngineError, EngineFactory, EngineReport, EngineStats, TypingEngine};
use crate::util::chars_to_wpm;

/// In-process typing engine.
///
/// Accuracy is keystroke based: every newly typed position counts once, so
/// fixing a mistake later does not restore it. `mistakes` is the number of
/// errors ever made, not the number currently on screen.
#[derive(Debug, Default)]
pub struct LocalEngine {
    text: Vec<char>,
    input: Vec<char>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    error_positions: Vec<usize>,
    last_len: usize,
    typed: u32,
    typed_correct: u32,
    mistakes: u32,
    disposed: bool,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.chars().collect(),
            ..Self::default()
        }
    }

    pub fn error_positions(&self) -> &[usize] {
        &self.error_positions
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.disposed {
            Err(EngineError::Released)
        } else {
            Ok(())
        }
    }

    fn input_string(&self) -> String {
        self.input.iter().collect()
    }

    fn accuracy(&self) -> f64 {
        if self.typed == 0 {
            return 100.0;
        }
        (100.0 * self.typed_correct as f64 / self.typed as f64).clamp(0.0, 100.0)
    }

    fn current_word_start(&self) -> usize {
        self.input
            .iter()
            .rposition(|c| c.is_whitespace())
            .map_or(0, |i| i + 1)
    }

    fn previous_word_start(&self) -> usize {
        let mut cut = self.input.len();
        while cut > 0 && self.input[cut - 1].is_whitespace() {
            cut -= 1;
        }
        while cut > 0 && !self.input[cut - 1].is_whitespace() {
            cut -= 1;
        }
        cut
    }

    /// Deleting inside the current word is always allowed. Reaching back into
    /// earlier words is only allowed while one of them holds a mistake.
    fn can_backspace_to(&self, pos: usize) -> bool {
        let word_start = self.current_word_start();
        pos >= word_start || self.error_positions.iter().any(|&e| e < word_start)
    }

    fn update(&mut self) {
        for i in self.last_len..self.input.len() {
            self.typed += 1;
            if self.text.get(i) == Some(&self.input[i]) {
                self.typed_correct += 1;
            } else {
                self.mistakes += 1;
            }
        }

        self.error_positions = self
            .input
            .iter()
            .enumerate()
            .filter(|&(i, c)| self.text.get(i) != Some(c))
            .map(|(i, _)| i)
            .collect();
        self.last_len = self.input.len();

        let input = self.input_string();
        let text: String = self.text.iter().collect();
        let complete = !self.input.is_empty()
            && self.input.len() >= self.text.len()
            && input.trim() == text.trim();
        if complete && self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
        }
    }

    fn elapsed_secs(&self) -> f64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start).as_secs_f64(),
            (Some(start), None) => start.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }
}

impl TypingEngine for LocalEngine {
    fn set_text(&mut self, text: &str) -> Result<(), EngineError> {
        self.ensure_live()?;
        if !self.input.is_empty() || self.started_at.is_some() {
            return Err(EngineError::InvalidState(
                "text cannot change once input has started".to_string(),
            ));
        }
        *self = Self::with_text(text);
        Ok(())
    }

    fn handle_input(&mut self, input: &str) -> Result<EngineReport, EngineError> {
        self.ensure_live()?;
        if self.is_finished() {
            return self.report();
        }

        let clamped: Vec<char> = input.chars().take(self.text.len()).collect();
        if self.started_at.is_none() && !clamped.is_empty() {
            self.started_at = Some(Instant::now());
        }
        self.input = clamped;
        self.update();
        self.report()
    }

    fn handle_backspace(&mut self, word_boundary: bool) -> Result<bool, EngineError> {
        self.ensure_live()?;
        if self.is_finished() || self.input.is_empty() {
            return Ok(false);
        }

        let new_len = if word_boundary {
            self.previous_word_start()
        } else {
            self.input.len() - 1
        };
        if !self.can_backspace_to(new_len) {
            return Ok(false);
        }

        self.input.truncate(new_len);
        self.update();
        Ok(true)
    }

    fn report(&self) -> Result<EngineReport, EngineError> {
        self.ensure_live()?;
        Ok(EngineReport {
            input: self.input_string(),
            accuracy: self.accuracy(),
            mistakes: self.mistakes,
        })
    }

    fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    fn wpm(&self) -> f64 {
        let correct = self.input.len() - self.error_positions.len();
        chars_to_wpm(correct as f64, self.elapsed_secs())
    }

    fn raw_wpm(&self) -> f64 {
        chars_to_wpm(self.input.len() as f64, self.elapsed_secs())
    }

    fn time_elapsed(&self) -> f64 {
        self.elapsed_secs()
    }

    fn stats(&self) -> Result<EngineStats, EngineError> {
        self.ensure_live()?;
        Ok(EngineStats {
            accuracy: self.accuracy(),
            mistakes: self.mistakes,
        })
    }

    fn dispose(&mut self) {
        *self = Self {
            disposed: true,
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngineFactory;

impl EngineFactory for LocalEngineFactory {
    fn construct(&self) -> Result<Box<dyn TypingEngine>, EngineError> {
        Ok(Box::new(LocalEngine::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn engine(text: &str) -> LocalEngine {
        let mut engine = LocalEngine::new();
        engine.set_text(text).unwrap();
        engine
    }

    #[test]
    fn test_backspace_within_current_word() {
        let mut game = engine("Hello world");
        game.handle_input("Hello").unwrap();

        assert!(game.handle_backspace(false).unwrap());
        assert_eq!(game.report().unwrap().input, "Hell");
    }

    #[test]
    fn test_backspace_into_previous_word_with_error() {
        let mut game = engine("Hello world");
        game.handle_input("Hallo world").unwrap();

        assert!(game.handle_backspace(false).unwrap());
        assert_eq!(game.report().unwrap().input, "Hallo worl");
        assert!(game.handle_backspace(true).unwrap());
        assert_eq!(game.report().unwrap().input, "Hallo ");
        // "Hallo" holds the mistake, so backing into it is allowed
        assert!(game.handle_backspace(false).unwrap());
        assert_eq!(game.report().unwrap().input, "Hallo");
    }

    #[test]
    fn test_backspace_refused_into_correct_word() {
        let mut game = engine("Hello world");
        game.handle_input("Hello ").unwrap();

        assert!(!game.handle_backspace(false).unwrap());
        assert!(!game.handle_backspace(true).unwrap());
        assert_eq!(game.report().unwrap().input, "Hello ");
    }

    #[test]
    fn test_word_boundary_backspace_deletes_current_word() {
        let mut game = engine("foo bar baz");
        game.handle_input("foo bar ba").unwrap();

        assert!(game.handle_backspace(true).unwrap());
        assert_eq!(game.report().unwrap().input, "foo bar ");
    }

    #[test]
    fn test_backspace_on_empty_or_finished() {
        let mut game = engine("hi");
        assert!(!game.handle_backspace(false).unwrap());

        game.handle_input("hi").unwrap();
        assert!(game.is_finished());
        assert!(!game.handle_backspace(false).unwrap());
    }

    #[test]
    fn test_completion_detection() {
        let mut game = engine("Hello world");
        assert!(!game.is_finished());
        game.handle_input("Hello worl").unwrap();
        assert!(!game.is_finished());
        game.handle_input("Hello world").unwrap();
        assert!(game.is_finished());
    }

    #[test]
    fn test_input_clamped_to_target() {
        let mut game = engine("abc");
        let report = game.handle_input("abxdef").unwrap();
        assert_eq!(report.input, "abx");
        assert!(!game.is_finished());
    }

    #[test]
    fn test_mistakes_survive_corrections() {
        let mut game = engine("Hello world");
        game.handle_input("Ha").unwrap();
        assert_eq!(game.stats().unwrap().mistakes, 1);

        assert!(game.handle_backspace(false).unwrap());
        let report = game.handle_input("He").unwrap();
        assert_eq!(report.mistakes, 1);
        // three keystrokes, one wrong
        assert!((report.accuracy - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_before_typing() {
        let game = engine("abc");
        assert_eq!(game.stats().unwrap().accuracy, 100.0);
        assert_eq!(game.time_elapsed(), 0.0);
        assert_eq!(game.wpm(), 0.0);
    }

    #[test]
    fn test_set_text_after_start_is_invalid() {
        let mut game = engine("abc");
        game.handle_input("a").unwrap();
        assert_matches!(game.set_text("xyz"), Err(EngineError::InvalidState(_)));
    }

    #[test]
    fn test_disposed_engine_rejects_calls() {
        let mut game = engine("abc");
        game.dispose();
        assert_matches!(game.handle_input("a"), Err(EngineError::Released));
        assert_matches!(game.stats(), Err(EngineError::Released));
    }

    #[test]
    fn test_factory_constructs_with_text() {
        let mut engine = LocalEngineFactory.construct_with_text("ok").unwrap();
        let report = engine.handle_input("ok").unwrap();
        assert_eq!(report.input, "ok");
        assert!(engine.is_finished());
    }
}
