//! Webhook and artifact server.
//!
//! ```text
//! main thread: tiny_http request loop ──► rayon request pool
//!                                            │
//! tokio runtime: Orchestrator actor ◄────────┘ (pushes, recomputes)
//!                event logger ◄── BuildSystem::subscribe()
//! ```

mod lifecycle;
mod response;
mod routes;

pub use lifecycle::setup_shutdown_handler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver};
use tiny_http::Server;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::orchestrator::Orchestrator;
use crate::system::{BuildEvent, BuildSystem};
use crate::{debug, log};
use routes::App;

/// Request handler threads.
const REQUEST_THREADS: usize = 4;

/// How long the request loop blocks before checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Serve until Ctrl+C. `system` must already be started.
pub fn serve(system: Arc<BuildSystem>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("bindery-actor")
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let (orchestrator, actor) = {
        let _guard = runtime.enter();
        Orchestrator::spawn(Arc::clone(&system))
    };
    runtime.spawn(log_events(system.subscribe()));

    let serve = &system.config().serve;
    let (server, addr) = lifecycle::bind_with_retry(serve.interface, serve.port)?;
    let server = Arc::new(server);
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
    lifecycle::register_server(Arc::clone(&server), shutdown_tx);
    log!("serve"; "http://{}", addr);

    let app = Arc::new(App {
        system: Arc::clone(&system),
        orchestrator: orchestrator.clone(),
    });
    run_request_loop(&server, &app, &shutdown_rx)?;

    orchestrator.shutdown_blocking();
    if let Err(e) = runtime.block_on(actor) {
        debug!("serve"; "orchestrator task ended abnormally: {}", e);
    }
    runtime.shutdown_timeout(Duration::from_secs(2));
    Ok(())
}

fn run_request_loop(server: &Server, app: &Arc<App>, shutdown_rx: &Receiver<()>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .thread_name(|i| format!("bindery-http-{i}"))
        .build()
        .context("failed to create request pool")?;

    loop {
        if shutdown_rx.try_recv().is_ok() || lifecycle::is_shutdown() {
            break;
        }
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => {
                let app = Arc::clone(app);
                pool.spawn(move || {
                    if let Err(e) = routes::handle_request(request, &app) {
                        log!("serve"; "request error: {:#}", e);
                    }
                });
            }
            Ok(None) => {}
            Err(e) if lifecycle::is_shutdown() => {
                debug!("serve"; "server unblocked: {}", e);
                break;
            }
            Err(e) => log!("serve"; "accept error: {}", e),
        }
    }
    Ok(())
}

/// Trace lifecycle events. Builds and changes are already logged where
/// they happen.
async fn log_events(mut rx: broadcast::Receiver<BuildEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => debug!("event"; "{}", event),
            Err(RecvError::Lagged(missed)) => debug!("event"; "missed {} events", missed),
            Err(RecvError::Closed) => break,
        }
    }
}
