use std::path::PathBuf;
use std::sync::Arc;

use daqg_buffer::Buffer;
use daqg_engine::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub buffer: Arc<dyn Buffer>,
    pub auth_token: Arc<String>,
    pub sources_path: Arc<PathBuf>,
    pub storage_path: Arc<PathBuf>,
}
