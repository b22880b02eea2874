//! HTTP listener with a bounded graceful drain.

use std::future::{Future, IntoFuture};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Serve `router` until `signal` resolves, then let in-flight requests
/// finish for at most `grace`.
///
/// Returns `Ok(true)` when every connection drained in time and `Ok(false)`
/// when the grace deadline cut the drain short.
pub async fn serve_until<F>(
    listener: TcpListener,
    router: Router,
    signal: F,
    grace: Duration,
) -> std::io::Result<bool>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (fired_tx, mut fired_rx) = watch::channel(false);

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            let _ = fired_tx.send(true);
        })
        .into_future();

    let deadline = async move {
        if fired_rx.wait_for(|fired| *fired).await.is_err() {
            // Server exited before any signal.
            std::future::pending::<()>().await;
        }
        info!(grace_secs = grace.as_secs_f64(), "Draining HTTP connections");
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map(|()| true),
        () = deadline => {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "HTTP drain deadline passed, dropping open connections"
            );
            Ok(false)
        }
    }
}
