use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info, trace, warn};

use crate::config::{Config, ConfigStore};
use crate::corpus::{Corpus, TextItem, RANDOM_CATEGORY};
use crate::session::{Session, SessionState};
use crate::stats::Stats;

/// An engine call running longer than this is reported on screen
pub const STALL_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum AppState {
    Menu,
    Typing,
    Results,
}

pub struct App {
    pub state: AppState,
    pub session: Session,
    corpus: Corpus,
    /// "random" first, then the corpus categories
    categories: Vec<String>,
    selected: usize,
    custom_prompt: Option<TextItem>,
    store: Box<dyn ConfigStore>,
    /// Last live stats from the periodic refresh
    pub live: Stats,
    /// Error indicator shown on the current screen
    pub notice: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        session: Session,
        corpus: Corpus,
        store: Box<dyn ConfigStore>,
        custom_prompt: Option<TextItem>,
    ) -> Self {
        let mut categories = vec![RANDOM_CATEGORY.to_string()];
        categories.extend(corpus.categories());

        let config = store.load();
        let selected = categories
            .iter()
            .position(|c| *c == config.last_category)
            .unwrap_or(0);

        Self {
            state: AppState::Menu,
            session,
            corpus,
            categories,
            selected,
            custom_prompt,
            store,
            live: Stats::default(),
            notice: None,
            should_quit: false,
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn selected_category(&self) -> &str {
        self.categories
            .get(self.selected)
            .map_or(RANDOM_CATEGORY, |c| c.as_str())
    }

    /// Select `category` if it exists. Returns whether it did.
    pub fn select_category(&mut self, category: &str) -> bool {
        match self.categories.iter().position(|c| c == category) {
            Some(idx) => {
                self.selected = idx;
                true
            }
            None => false,
        }
    }

    fn cycle_category(&mut self, forward: bool) {
        let len = self.categories.len().max(1);
        self.selected = if forward {
            (self.selected + 1) % len
        } else {
            (self.selected + len - 1) % len
        };
    }

    /// Start a fresh session on a new text. Stays on (or returns to) the menu
    /// when the engine cannot be started.
    pub fn start_session(&mut self) {
        let item = match &self.custom_prompt {
            Some(prompt) => prompt.clone(),
            None => self.corpus.pick(self.selected_category()),
        };

        match self.session.start(&item) {
            Ok(()) => {
                self.state = AppState::Typing;
                self.live = Stats::default();
                self.notice = None;
                self.remember_category();
            }
            Err(e) => {
                self.state = AppState::Menu;
                self.notice = Some(e.to_string());
            }
        }
    }

    fn remember_category(&self) {
        let config = Config {
            last_category: self.selected_category().to_string(),
        };
        if let Err(e) = self.store.save(&config) {
            warn!(error = %e, "failed to save config");
        }
    }

    fn to_menu(&mut self) {
        self.session.return_to_idle();
        self.live = Stats::default();
        self.state = AppState::Menu;
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match self.state {
            AppState::Menu => match key.code {
                KeyCode::Esc => self.should_quit = true,
                KeyCode::Enter | KeyCode::Tab => self.start_session(),
                KeyCode::Left => self.cycle_category(false),
                KeyCode::Right => self.cycle_category(true),
                _ => {}
            },
            AppState::Typing => {
                match key.code {
                    KeyCode::Esc => self.to_menu(),
                    KeyCode::Tab => self.start_session(),
                    KeyCode::Backspace => {
                        let word = key
                            .modifiers
                            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
                        self.backspace(word);
                    }
                    KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        self.backspace(true)
                    }
                    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                        if let Err(e) = self.session.type_char(c) {
                            debug!(error = %e, "keystroke ignored");
                        }
                    }
                    _ => {}
                }
                self.sync();
            }
            AppState::Results => match key.code {
                KeyCode::Esc => self.to_menu(),
                KeyCode::Enter | KeyCode::Tab => self.start_session(),
                _ => {}
            },
        }
    }

    fn backspace(&mut self, word_boundary: bool) {
        match self.session.backspace(word_boundary) {
            Ok(outcome) => debug!(?outcome, word_boundary, "backspace"),
            Err(e) => debug!(error = %e, "backspace ignored"),
        }
    }

    /// Periodic refresh: apply engine results and recompute live stats
    pub fn on_tick(&mut self) {
        if self.state != AppState::Typing {
            return;
        }
        self.sync();
        self.live = self.session.refresh();
        if let Some(engine) = self.session.engine_metrics() {
            trace!(
                live_wpm = self.live.wpm,
                engine_wpm = engine.wpm,
                engine_raw = engine.raw_wpm,
                "tick"
            );
        }

        self.notice = self
            .session
            .engine_stalled(STALL_THRESHOLD)
            .then(|| "engine is not responding".to_string());
    }

    fn sync(&mut self) {
        self.session.pump();
        if self.state == AppState::Typing && self.session.state() == SessionState::Finished {
            self.live = self.session.stats();
            self.state = AppState::Results;
            self.notice = None;
            info!(category = self.selected_category(), "showing results");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FileConfigStore;
    use crate::engine::testing::FailingFactory;
    use crate::local_engine::LocalEngineFactory;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app_with(corpus: Corpus, prompt: Option<&str>) -> (App, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let session = Session::new(Arc::new(LocalEngineFactory), Arc::new(ManualClock::new()));
        let app = App::new(session, corpus, Box::new(store), prompt.map(TextItem::custom));
        (app, dir)
    }

    fn type_str(app: &mut App, s: &str) {
        for c in s.chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
    }

    fn settle(app: &mut App) {
        app.session.settle(Duration::from_secs(5));
        app.on_tick();
    }

    #[test]
    fn test_menu_cycles_categories() {
        let corpus = Corpus::new(vec![
            TextItem::new("code", "fn main", ""),
            TextItem::new("quotes", "be kind", ""),
        ]);
        let (mut app, _dir) = app_with(corpus, None);

        assert_eq!(app.categories(), ["random", "code", "quotes"]);
        assert_eq!(app.selected_category(), "random");
        app.on_key(key(KeyCode::Left));
        assert_eq!(app.selected_category(), "quotes");
        app.on_key(key(KeyCode::Right));
        app.on_key(key(KeyCode::Right));
        assert_eq!(app.selected_category(), "code");
    }

    #[test]
    fn test_typing_to_results_and_back() {
        let (mut app, _dir) = app_with(Corpus::default(), Some("hi"));
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::Typing);

        type_str(&mut app, "hi");
        settle(&mut app);

        assert_eq!(app.state, AppState::Results);
        assert!(app.session.result().is_some());

        app.on_key(key(KeyCode::Esc));
        assert_eq!(app.state, AppState::Menu);
        assert_eq!(app.session.state(), SessionState::Idle);
        app.on_key(key(KeyCode::Esc));
        assert!(app.should_quit);
    }

    #[test]
    fn test_word_backspace_shortcuts() {
        let (mut app, _dir) = app_with(Corpus::default(), Some("foo bar baz"));
        app.start_session();
        type_str(&mut app, "foo ba");
        settle(&mut app);

        app.on_key(KeyEvent::new(KeyCode::Char('w'), KeyModifiers::CONTROL));
        assert_eq!(app.session.buffer(), "foo ");
        app.on_key(key(KeyCode::Backspace));
        // "foo" has no mistakes, so the engine refuses to go back into it
        assert_eq!(app.session.buffer(), "foo ");
    }

    #[test]
    fn test_tab_restarts_with_new_session() {
        let (mut app, _dir) = app_with(Corpus::default(), Some("hello"));
        app.start_session();
        type_str(&mut app, "he");
        settle(&mut app);
        let generation = app.session.generation();

        app.on_key(key(KeyCode::Tab));
        assert_eq!(app.state, AppState::Typing);
        assert_eq!(app.session.generation(), generation + 1);
        assert_eq!(app.session.buffer(), "");
    }

    #[test]
    fn test_engine_failure_stays_on_menu() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let session = Session::new(Arc::new(FailingFactory), Arc::new(ManualClock::new()));
        let mut app = App::new(session, Corpus::default(), Box::new(store), None);

        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::Menu);
        assert!(app.notice.as_deref().unwrap().contains("engine"));
    }

    #[test]
    fn test_last_category_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let corpus = Corpus::new(vec![TextItem::new("quotes", "be kind", "")]);

        let session = Session::new(Arc::new(LocalEngineFactory), Arc::new(ManualClock::new()));
        let mut app = App::new(
            session,
            corpus.clone(),
            Box::new(FileConfigStore::with_path(&path)),
            None,
        );
        assert!(app.select_category("quotes"));
        app.start_session();
        assert_eq!(app.session.target(), "be kind");

        let session = Session::new(Arc::new(LocalEngineFactory), Arc::new(ManualClock::new()));
        let app = App::new(session, corpus, Box::new(FileConfigStore::with_path(&path)), None);
        assert_eq!(app.selected_category(), "quotes");
    }

    #[test]
    fn test_ctrl_c_quits_anywhere() {
        let (mut app, _dir) = app_with(Corpus::default(), Some("hi"));
        app.start_session();
        app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
        assert_eq!(app.session.buffer(), "");
    }
}
