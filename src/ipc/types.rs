use std::path::PathBuf;

use serde::Deserialize;

use crate::auth::HmacAuthProvider;
use crate::service::AttendanceService;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The service variant the daemon actually runs.
pub type WorkspaceService = AttendanceService<SqliteStore, HmacAuthProvider>;

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub service: Option<WorkspaceService>,
}
