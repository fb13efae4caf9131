//! Shared state handed to every request handler

use crate::engine::EngineHandle;
use std::path::PathBuf;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    /// Directory the server was started with, reported by `/api/server-info`
    pub default_watch_dir: PathBuf,
}
