//! Anonymous polls with live results.
//!
//! A poll is created with a question and at least two options, shared by
//! link, and voted on once per network address. Every accepted vote pushes
//! the full tallies to everyone watching that poll over a WebSocket.
//!
//! # Vote integrity
//!
//! - The voter token is the caller's network origin (first `X-Forwarded-For`
//!   entry, then `X-Real-IP`, then the peer address).
//! - The store checks membership, increments the counter and records the
//!   address as one atomic step per poll (a per-poll mutex in memory, a
//!   conditional insert inside one transaction in Postgres).
//! - Clients keep their own "already voted" memory ([`tracker::VoteTracker`])
//!   to skip the voting form. The server never relies on it.
//!
//! Address-based limits are weak: voters behind one NAT share an address and
//! a voter who can change address can vote again.
//!
//! # Endpoints
//!
//! - `GET /api/health`
//! - `POST /api/polls`
//! - `GET /api/polls/{id}`
//! - `POST /api/polls/{id}/vote`
//! - `GET /ws` (`joinPoll` / `leavePoll`, pushes `pollUpdate`)
//!
//! # Setup
//!
//! Without `DATABASE_URL` the server keeps polls in memory.
//! ```sh
//! PORT=5000 DATABASE_URL=postgres://localhost/polls cargo run
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod broadcast;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod poll;
pub mod routes;
pub mod tracker;
pub mod ws;

use broadcast::PollHub;
use config::Config;
use guard::VoteGuard;
use poll::PollStore;

pub struct AppState<S> {
    pub guard: VoteGuard<S, PollHub>,
    pub hub: Arc<PollHub>,
    pub config: Arc<Config>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            hub: self.hub.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: PollStore> AppState<S> {
    pub fn new(store: S, config: Config) -> Self {
        let hub = Arc::new(PollHub::new());
        Self {
            guard: VoteGuard::new(Arc::new(store), hub.clone()),
            hub,
            config: Arc::new(config),
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Serves the API on an already bound listener until Ctrl+C or SIGTERM.
pub async fn serve<S: PollStore>(listener: TcpListener, state: AppState<S>) -> std::io::Result<()> {
    let app = routes::create_routes(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

pub async fn start_server<S: PollStore>(store: S, config: Config) -> std::io::Result<()> {
    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    serve(listener, AppState::new(store, config)).await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
