//! Server command handlers
//!
//! Implements `server run` and `server validate`.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{OutputFormat, ServerRunArgs, ServerValidateArgs};
use crate::config::loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
use crate::error::{ConfigError, DefuseError, Severity, ValidationIssue};
use crate::game::{BombEngine, GameState};
use crate::notifier::{BroadcastNotifier, EventNotifier, FanoutNotifier};
use crate::observability::events::{Event, EventEmitter};
use crate::transport::http::{HttpConfig, HttpServer, parse_bind_addr};
use crate::transport::DEFAULT_MAX_BODY_SIZE;

/// Start the game server and run until `cancel` fires.
///
/// # Errors
///
/// Returns a config error if the game file is invalid, an I/O error if
/// the metrics endpoint or events file cannot be opened, or a transport
/// error if the HTTP listener cannot bind.
pub async fn run(args: &ServerRunArgs, cancel: CancellationToken) -> Result<(), DefuseError> {
    // Initialize Prometheus metrics if --metrics-port is provided
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let loader = ConfigLoader::new(LoaderOptions {
        overrides: args.overrides(),
        ..LoaderOptions::default()
    });
    let load_result = if let Some(ref path) = args.config {
        tracing::info!(config = %path.display(), "loading game file");
        loader.load(path)?
    } else {
        tracing::info!("no game file given, using the stock round");
        loader.load_defaults()?
    };
    log_warnings(&load_result.warnings);

    let emitter = Arc::new(if let Some(ref path) = args.events_file {
        EventEmitter::from_file(path)?
    } else {
        EventEmitter::stderr()
    });

    let LoadResult {
        settings,
        tick_interval,
        ..
    } = load_result;
    let countdown_seconds = settings.countdown_seconds;

    let broadcast = BroadcastNotifier::default();
    let baseline = GameState::new(settings.clone()).snapshot();
    let notifier = FanoutNotifier::new()
        .with(Arc::new(broadcast.clone()))
        .with(Arc::new(EventNotifier::with_baseline(
            Arc::clone(&emitter),
            baseline,
        )));

    let engine = BombEngine::new(settings, tick_interval, Arc::new(notifier));

    let http_config = HttpConfig {
        bind_addr: parse_bind_addr(&args.http)?,
        max_body_size: DEFAULT_MAX_BODY_SIZE,
    };
    let (server, bound_addr) =
        HttpServer::bind(&http_config, engine.clone(), broadcast, cancel.clone()).await?;

    emitter.emit(Event::ServerStarted {
        timestamp: Utc::now(),
        bind_addr: bound_addr.to_string(),
        countdown_seconds,
    });

    engine.start();

    cancel.cancelled().await;
    tracing::info!("shutting down");

    engine.shutdown().await;
    server.wait().await;

    emitter.emit(Event::ServerStopped {
        timestamp: Utc::now(),
        reason: "shutdown signal".to_string(),
    });
    Ok(())
}

/// Validate game files without starting the server.
///
/// Every file is checked even after a failure.
///
/// # Errors
///
/// Returns the first file's config error, or a validation error for
/// warnings under `--strict`.
pub fn validate(args: &ServerValidateArgs) -> Result<(), DefuseError> {
    let loader = ConfigLoader::with_defaults();
    let mut first_error: Option<ConfigError> = None;
    let mut reports = Vec::with_capacity(args.files.len());

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating game file");

        let outcome = loader.load(path).and_then(|result| {
            if args.strict && !result.warnings.is_empty() {
                Err(ConfigError::ValidationError {
                    path: path.display().to_string(),
                    errors: result.warnings.iter().map(strict_issue).collect(),
                })
            } else {
                Ok(result.warnings)
            }
        });

        match outcome {
            Ok(warnings) => {
                log_warnings(&warnings);
                if args.format == OutputFormat::Human {
                    println!("ok: {}", path.display());
                    for warning in &warnings {
                        println!("  warning: {}", describe_warning(warning));
                    }
                }
                reports.push(serde_json::json!({
                    "file": path.display().to_string(),
                    "valid": true,
                    "warnings": warnings.iter().map(describe_warning).collect::<Vec<_>>(),
                }));
            }
            Err(e) => {
                if args.format == OutputFormat::Human {
                    println!("invalid: {}", path.display());
                }
                reports.push(serde_json::json!({
                    "file": path.display().to_string(),
                    "valid": false,
                    "error": e.to_string(),
                }));
                first_error.get_or_insert(e);
            }
        }
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}

fn log_warnings(warnings: &[LoadWarning]) {
    for warning in warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
}

fn describe_warning(warning: &LoadWarning) -> String {
    warning.location.as_ref().map_or_else(
        || warning.message.clone(),
        |location| format!("{} at {location}", warning.message),
    )
}

fn strict_issue(warning: &LoadWarning) -> ValidationIssue {
    ValidationIssue {
        path: warning.location.clone().unwrap_or_default(),
        message: warning.message.clone(),
        severity: Severity::Error,
    }
}
