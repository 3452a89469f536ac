//! DataPub - dataset upload tool
//!
//! Submits a file to a dataset endpoint and waits through any deferral the
//! service answers with. When polling gives up, the checkpoint is written to
//! `DATAPUB_TICKET_FILE`; rerun with `DATAPUB_RESUME=true` to keep polling
//! without resubmitting the payload.

mod config;
mod ticket_file;

use anyhow::{Context, Result};
use datapub_domain::continuation::{CancelToken, Continuation, ContinuationError, SystemClock};
use datapub_http::{HttpIssuer, Payload, StatusRoute};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::ticket_file::SavedTicket;

type Engine = Continuation<SystemClock, CancelToken>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_json);

    info!(resume = config.resume, "Starting DataPub upload tool");

    // Ctrl-C interrupts the current poll wait
    let token = CancelToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    // The HTTP client and the poll waits block
    let result = tokio::task::spawn_blocking(move || run(&config, token))
        .await
        .context("Upload task panicked")??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(config: &Config, token: CancelToken) -> Result<Value> {
    let issuer = HttpIssuer::with_timeout(config.request_timeout)?;
    let engine = Continuation::with_cancellation(config.policy.clone(), token);

    if config.resume {
        resume(config, &issuer, &engine)
    } else {
        upload(config, &issuer, &engine)
    }
}

fn upload(config: &Config, issuer: &HttpIssuer, engine: &Engine) -> Result<Value> {
    let endpoint = config
        .endpoint
        .clone()
        .context("DATAPUB_ENDPOINT is not set")?;

    let payload = match &config.payload {
        Some(path) if config.gzip => Some(Payload::gzip_file(path, config.content_type.as_str())?),
        Some(path) => Some(Payload::file(path, config.content_type.as_str())?),
        None => None,
    };

    info!(
        url = %endpoint,
        method = %config.method,
        gzip = config.gzip,
        "Submitting upload"
    );

    let route = StatusRoute::new(&config.method, &endpoint);
    let result = issuer.perform(
        engine,
        config.method.clone(),
        endpoint,
        config.resource_id.as_str(),
        payload,
    );
    settle(config, route, result)
}

fn resume(config: &Config, issuer: &HttpIssuer, engine: &Engine) -> Result<Value> {
    let saved = SavedTicket::load(&config.ticket_file)?;
    info!(
        path = %config.ticket_file.display(),
        resource = %saved.request.resource_id,
        "Resuming from saved ticket"
    );

    let route = saved.route.clone();
    let ticket = saved.into_ticket(issuer, *engine.clock());
    let result = engine.resume(
        ticket,
        config.policy.max_local_retries,
        config.policy.retry_interval,
    );
    settle(config, route, result)
}

/// Persist the checkpoint of an escalated error. A resumed run that ends any
/// other way leaves nothing to resume, so its ticket file goes away.
fn settle(
    config: &Config,
    route: StatusRoute,
    result: Result<Value, ContinuationError<Value>>,
) -> Result<Value> {
    match result {
        Ok(value) => {
            if config.resume {
                clear_ticket_file(config);
            }
            info!("Upload completed");
            Ok(value)
        }
        Err(err) => {
            match err.ticket() {
                Some(ticket) => {
                    SavedTicket::capture(route, ticket).save(&config.ticket_file)?;
                    warn!(
                        path = %config.ticket_file.display(),
                        operation_id = %ticket.operation_id(),
                        "Saved ticket, rerun with DATAPUB_RESUME=true to continue polling"
                    );
                }
                None if config.resume => clear_ticket_file(config),
                None => {}
            }
            error!(error = %err, "Upload failed");
            Err(err.into())
        }
    }
}

fn clear_ticket_file(config: &Config) {
    if let Err(e) = std::fs::remove_file(&config.ticket_file) {
        warn!(path = %config.ticket_file.display(), error = %e, "Failed to remove ticket file");
    }
}
