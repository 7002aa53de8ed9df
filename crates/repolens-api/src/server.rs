use crate::routes::create_router;
use crate::state::AppState;
use repolens_core::{RepoLensError, Result, Settings};
use tokio::signal;
use tracing::info;

pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(settings: Settings) -> Result<Self> {
        let state = AppState::new(settings)?;
        Ok(Self { state })
    }

    pub fn with_state(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.settings.host, self.state.settings.port
        );
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(RepoLensError::Io)?;
        info!("repolens worker listening on http://{}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(RepoLensError::Io)?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }
}
