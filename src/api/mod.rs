//! Catalog API for addon clients
//!
//! Serves one manifest and one paginated catalog per collection, plus health,
//! reload and a self-description at `/`.

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::info;

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{build_router, AppState};

/// API server with its scheduled reload task
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Start the API server in the background
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.start().await })
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        if let Some(every) = self.state.config.server.reload_interval() {
            info!("⏰ Reloading collections every {}s", every.as_secs());
            server::spawn_reload_task(self.state.clone(), every);
        }

        server::start_http_server(self.state).await
    }
}
