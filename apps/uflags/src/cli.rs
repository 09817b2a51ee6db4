//! # CLI Commands
//!
//! Entry points behind the `uflags` subcommands.
//!
//! - `serve`: allocate the registry, run the startup route, expose the
//!   management endpoint until Ctrl-C, then release the registry
//! - `check`: compile a route script and report the first fixup error

use crate::api::{AppState, create_router};
use crate::config::ServiceConfig;
use serde::Serialize;
use std::error::Error;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use uflags_core::RegistryCell;
use uflags_core::script::{ActionResult, RouteKind, RouteScript};

/// Result type of the CLI commands.
pub type CliResult<T = ()> = Result<T, Box<dyn Error + Send + Sync>>;

// =============================================================================
// ROUTE SCRIPTS
// =============================================================================

/// Read and compile a route script.
pub fn load_route(path: &Path, route: RouteKind) -> CliResult<RouteScript> {
    let source = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read route {}: {}", path.display(), err))?;
    match RouteScript::compile(route, &source) {
        Ok(script) => {
            debug!(path = %path.display(), route = %route, actions = script.len(), "route compiled");
            Ok(script)
        }
        Err(err) => {
            error!(path = %path.display(), route = %route, line = err.line(), error = %err, "route fixup failed");
            Err(format!("{}: {}", path.display(), err).into())
        }
    }
}

/// Summary printed by `check --json`.
#[derive(Debug, Serialize)]
struct CheckReport {
    route: RouteKind,
    actions: Vec<String>,
}

/// Compile a route script and print what it binds to.
pub fn cmd_check(path: &Path, route: RouteKind, json: bool) -> CliResult {
    let script = load_route(path, route)?;
    let actions: Vec<String> = script.actions().iter().map(ToString::to_string).collect();

    if json {
        let report = CheckReport { route, actions };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {} action(s) OK for {} route", path.display(), actions.len(), route);
        for (action, bound) in actions.iter().zip(script.actions()) {
            println!("  {:<16} mask {}", action, bound.mask);
        }
    }
    Ok(())
}

// =============================================================================
// SERVE
// =============================================================================

/// A service whose registry is allocated and whose startup route has run.
#[derive(Debug)]
pub struct Service {
    pub config: ServiceConfig,
    pub state: AppState,
    pub startup_results: Vec<ActionResult>,
}

impl Service {
    /// Load-time work: compile the startup route, allocate the registry, run
    /// the startup route.
    ///
    /// A route fixup error stops here, before the registry exists.
    pub fn prepare(config: ServiceConfig) -> CliResult<Self> {
        let startup = config
            .startup_route
            .as_deref()
            .map(|path| load_route(path, RouteKind::Startup))
            .transpose()?;

        let cell = Arc::new(RegistryCell::new());
        let registry = cell.init(&config.params).map_err(|err| {
            error!(error = %err, kind = ?err.kind(), "failed to allocate flag registry");
            err
        })?;
        info!(initial = config.params.initial, "flag registry initialized");

        let startup_results = match &startup {
            Some(script) => run_startup(script, &cell),
            None => Vec::new(),
        };
        if !startup_results.is_empty() {
            let matched = startup_results.iter().filter(|r| r.is_matched()).count();
            info!(
                flags = registry.get_all(),
                actions = startup_results.len(),
                matched,
                "startup route done"
            );
        }

        let state = AppState::new(cell).with_api_key(config.api_key.clone());
        Ok(Self {
            config,
            state,
            startup_results,
        })
    }

    /// Serve on `listener` until `shutdown` resolves, then release the registry.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> CliResult
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cell = Arc::clone(self.state.cell());
        let app = create_router(self.state);

        info!(addr = %listener.local_addr()?, "management endpoint listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        if cell.destroy() {
            info!("flag registry released");
        }
        Ok(())
    }
}

fn run_startup(script: &RouteScript, cell: &RegistryCell) -> Vec<ActionResult> {
    let results = script.run(cell);
    for (action, result) in script.actions().iter().zip(&results) {
        match result {
            ActionResult::ExecutionError(reason) => {
                warn!(action = %action, reason = %reason, "startup action failed");
            }
            _ => debug!(action = %action, code = result.code(), "startup action"),
        }
    }
    results
}

/// Run the service until Ctrl-C.
pub async fn cmd_serve(config: ServiceConfig) -> CliResult {
    let service = Service::prepare(config)?;
    let listener = TcpListener::bind(service.config.listen).await?;
    if service.config.api_key.is_none() {
        warn!("management endpoint has no API key; /mi is open");
    }
    service.run(listener, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
