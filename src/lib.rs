// Library surface for the binary, headless drivers and integration tests.
pub mod app;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod graph;
pub mod local_engine;
pub mod logging;
pub mod runtime;
pub mod serializer;
pub mod session;
pub mod stats;
pub mod time_series;
pub mod timeline;
pub mod ui;
pub mod util;
