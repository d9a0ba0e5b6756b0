use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use keyrate::{
    app::App,
    app_dirs::AppDirs,
    clock::SystemClock,
    config::FileConfigStore,
    corpus::{Corpus, TextItem},
    local_engine::LocalEngineFactory,
    logging,
    runtime::{CrosstermEventSource, FixedTicker, Runner, TermEvent, DEFAULT_TICK_MS},
    session::Session,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
};
use tracing::{info, warn};

/// typing speed test with live metrics and smoothed results graphs
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A typing speed test that scores every keystroke as you type, records a per-character timeline, and plots WPM and raw speed once the text is done."
)]
pub struct Cli {
    /// text category to start on (random picks from every category)
    #[clap(short = 'c', long)]
    category: Option<String>,

    /// JSON file of texts to use instead of the built-in packs
    #[clap(short = 't', long)]
    texts: Option<PathBuf>,

    /// custom prompt to use
    #[clap(short = 'p', long)]
    prompt: Option<String>,

    /// milliseconds between live stat refreshes
    #[clap(long, default_value_t = DEFAULT_TICK_MS)]
    tick_ms: u64,

    /// log filter directive, e.g. "debug" or "keyrate::serializer=trace"
    #[clap(long)]
    log_filter: Option<String>,
}

impl Cli {
    fn corpus(&self) -> Result<Corpus, Box<dyn Error>> {
        match &self.texts {
            Some(path) => Ok(Corpus::from_path(path)?),
            None => Ok(Corpus::embedded()),
        }
    }

    fn custom_prompt(&self) -> Option<TextItem> {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(TextItem::custom)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    // logs go to a file; the terminal belongs to the UI
    let _guard = match logging::init_file_logging(&AppDirs::log_path(), cli.log_filter.as_deref())
    {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging disabled: {e}");
            None
        }
    };

    let corpus = cli.corpus()?;
    info!(texts = corpus.len(), "corpus loaded");

    let session = Session::new(Arc::new(LocalEngineFactory), Arc::new(SystemClock));
    let mut app = App::new(
        session,
        corpus,
        Box::new(FileConfigStore::new()),
        cli.custom_prompt(),
    );
    if let Some(category) = &cli.category {
        if !app.select_category(category) {
            warn!(category = %category, "unknown category, using the saved one");
        }
    }
    if cli.custom_prompt().is_some() {
        app.start_session();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app, FixedTicker::from_millis(cli.tick_ms));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    result
}

fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    ticker: FixedTicker,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), ticker);
    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    while !app.should_quit {
        match runner.step() {
            TermEvent::Key(key) => app.on_key(key),
            TermEvent::Tick => app.on_tick(),
            TermEvent::Resize => {}
        }
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    }

    info!("bye");
    Ok(())
}
