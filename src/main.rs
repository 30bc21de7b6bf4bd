mod agents;
mod call_state;
mod chatwoot;
mod chatwoot_types;
mod config;
mod conversations;
mod dedup;
mod dyte;
mod dyte_types;
mod error;
mod handlers;
mod meetings;
mod orchestrator;
mod recording;
mod tasks;
#[cfg(test)]
mod testing;
mod twilio;
mod twilio_types;
mod types;
mod utils;

use crate::chatwoot::ChatwootClient;
use crate::config::Config;
use crate::dedup::InMemoryDedupStore;
use crate::dyte::DyteClient;
use crate::orchestrator::CallOrchestrator;
use crate::twilio::TwilioClient;
use crate::types::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

pub mod consts {
    use std::time::Duration;

    pub const GREETING: &str =
        "Thank you for calling. This call may be recorded to improve the quality of our service.";
    pub const PLEASE_HOLD: &str = "Please hold while we connect you to an available agent.";
    pub const ALL_AGENTS_BUSY: &str =
        "All our agents are busy. Please hold while we connect you to the next available agent.";
    pub const AGENTS_STILL_BUSY: &str =
        "All our agents are still busy. Please hold while we connect you to the next available agent.";
    pub const NO_AGENT_APOLOGY: &str =
        "We're sorry, but all our agents are still unavailable. Please try calling back later.";
    pub const AGENT_SHORTLY: &str = "An agent will be with you shortly.";
    pub const TECHNICAL_DIFFICULTIES: &str =
        "We're experiencing technical difficulties. Please try calling again later.";
    pub const SIGNATURE_APOLOGY: &str =
        "We apologize, but there was an issue processing your call. Please try again later.";
    pub const UNABLE_TO_PROCESS: &str =
        "We are unable to process your call at the moment. Please try again later.";

    pub const AGENT_MAX_ATTEMPTS: u32 = 3;
    pub const AGENT_POLL_INTERVAL: Duration = Duration::from_secs(3);
    /// Wait after the agent joins before checking the bridge and starting the recording.
    pub const RECORDING_SETTLE_DELAY: Duration = Duration::from_secs(3);
    pub const RELAY_MAX_ATTEMPTS: u32 = 5;
    pub const RELAY_RETRY_DELAY: Duration = Duration::from_secs(3);

    pub const OUTBOUND_REQUEST_DEDUP_TTL: Duration = Duration::from_secs(10);
    pub const OUTBOUND_CALL_DEDUP_TTL: Duration = Duration::from_secs(60);
    pub const MEETING_LINK_DEDUP_TTL: Duration = Duration::from_secs(10);
    pub const EVENT_DEDUP_TTL: Duration = Duration::from_secs(10);
    pub const RECORDING_DEDUP_TTL: Duration = Duration::from_secs(60);

    pub const SESSION_TTL: Duration = Duration::from_secs(4 * 60 * 60);
    pub const SUBSCRIPTION_TTL: Duration = Duration::from_secs(6 * 60 * 60);
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
}

pub mod paths {
    pub const INBOUND_CALL: &str = "/api/inbound-call";
    pub const INITIATE_OUTBOUND: &str = "/api/initiate-outbound-call";
    pub const CONNECT_OUTBOUND: &str = "/api/connect-outbound-call-to-meeting";
    pub const CALL_STATUS: &str = "/api/call-status";
    pub const TWILIO_FAILURE: &str = "/api/twilio-failure";
    pub const RECORDING_STATUS: &str = "/api/recording-status";
    pub const AGENT_JOINED: &str = "/api/dyte-agent-joined";
    pub const AGENT_JOINED_OUTBOUND: &str = "/api/dyte-agent-joined-outbound-call";
    pub const LISTEN_CHATWOOT: &str = "/api/listen-chatwoot-outbound-call";
}

pub fn app(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(paths::INBOUND_CALL, post(handlers::inbound_call))
        .route(paths::INITIATE_OUTBOUND, post(handlers::initiate_outbound_call))
        .route(
            paths::CONNECT_OUTBOUND,
            post(handlers::connect_outbound_call_to_meeting),
        )
        .route(paths::CALL_STATUS, post(handlers::call_status))
        .route(paths::TWILIO_FAILURE, post(handlers::twilio_failure))
        .route(paths::RECORDING_STATUS, post(handlers::recording_status))
        .route(paths::AGENT_JOINED, post(handlers::agent_joined))
        .route(
            paths::AGENT_JOINED_OUTBOUND,
            post(handlers::agent_joined_outbound),
        )
        .route(paths::LISTEN_CHATWOOT, post(handlers::listen_chatwoot))
        .route("/", get(|| async { "OK" }))
        .with_state(app_state)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error=%e, "failed to listen for ctrl-c");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    info!("shutting down");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("call_bridge", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Arc::new(Config::from_env()?);
    if !config.twilio.validate_signatures {
        info!("twilio signature validation is disabled");
    }
    let http_client = reqwest::Client::new();

    let orchestrator = CallOrchestrator::new(
        config.clone(),
        Arc::new(InMemoryDedupStore::new()),
        Arc::new(TwilioClient::new(http_client.clone(), config.twilio.clone())),
        Arc::new(ChatwootClient::new(
            http_client.clone(),
            config.chatwoot.clone(),
        )),
        Arc::new(DyteClient::new(http_client, config.dyte.clone())),
    );

    let shutdown = CancellationToken::new();
    let sweeper = tasks::spawn_maintenance(
        orchestrator.dedup(),
        orchestrator.sessions().clone(),
        orchestrator.meetings().clone(),
        consts::SUBSCRIPTION_TTL,
        consts::SWEEP_INTERVAL,
        shutdown.clone(),
    );

    let app_state = Arc::new(AppState {
        config: config.clone(),
        orchestrator,
    });

    info!(addr=%config.bind_addr, "listening");
    axum::Server::try_bind(&config.bind_addr)?
        .serve(app(app_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}
