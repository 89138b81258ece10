pub mod error_mapping;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::routes;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve<S>(state: AppState, addr: SocketAddr, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", bound);
    server.await;
    Ok(())
}
