//! HTTP server for booklog.
//!
//! Exposes book CRUD, check-out/check-in, the status report and the
//! transaction log as JSON endpoints backed by a [`LibraryHandle`].

mod config;
mod error;
pub mod handlers;
mod middleware;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tokio::signal;

pub use config::{CliArgs, ServerConfig};
pub use error::ApiError;

use crate::runtime::handle::LibraryHandle;
use handlers::{
    AppState, handle_check_in, handle_check_out, handle_create_book, handle_delete_book,
    handle_get_book, handle_healthy, handle_history, handle_list_books, handle_record_transaction,
    handle_status_report, handle_update_book,
};
use middleware::TracingLayer;

/// Builds the application router.
///
/// Static segments win over `{id}`, so `/books/status/report` and
/// `/books/transactions` never parse as book ids.
pub fn router(library: LibraryHandle) -> Router {
    Router::new()
        .route("/books", get(handle_list_books).post(handle_create_book))
        .route("/books/status/report", get(handle_status_report))
        .route("/books/transactions", post(handle_record_transaction))
        .route(
            "/books/{id}",
            get(handle_get_book)
                .patch(handle_update_book)
                .delete(handle_delete_book),
        )
        .route("/books/{id}/check-out", post(handle_check_out))
        .route("/books/{id}/check-in", post(handle_check_in))
        .route("/books/{id}/transactions", get(handle_history))
        .route("/-/healthy", get(handle_healthy))
        .layer(TracingLayer)
        .with_state(AppState { library })
}

/// HTTP front end over a running library runtime.
pub struct LibraryServer {
    library: LibraryHandle,
    config: ServerConfig,
}

impl LibraryServer {
    pub fn new(library: LibraryHandle, config: ServerConfig) -> Self {
        Self { library, config }
    }

    /// Serves until SIGINT/SIGTERM, then flushes the journal.
    pub async fn run(self) -> std::io::Result<()> {
        let app = router(self.library.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Starting booklog server on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Flushing journal before shutdown...");
        if let Err(e) = self.library.flush().await {
            tracing::error!("Failed to flush journal on shutdown: {}", e);
        }

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
