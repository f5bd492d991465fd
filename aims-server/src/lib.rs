pub mod api;
pub mod config;
pub mod repository;
pub mod service;
pub mod status;

use service::AcademicService;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub struct AppState {
    pub service: AcademicService,
    /// Bearer token required on `/api` routes when set.
    pub api_token: Option<String>,
    /// Name of the storage backend, reported by `/status`.
    pub storage: &'static str,
}
