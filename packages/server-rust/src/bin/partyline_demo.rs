//! Runs every unit on an in-process bus and walks the full flow once:
//! login, app-ready handshake, redirect, state write, two-stage view fetch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use partyline_core::messages::{AppReady, AuthSuccess, StateSet};
use partyline_core::{ClockSource, Envelope, SystemClock, Topic};
use partyline_server::{
    spawn_unit, BusPoller, BusTransport, EngineKind, InMemoryBus, SessionCoordinator,
    ShutdownController, StateService, StorageConfig, UnitConfig, UnitHandler,
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "partyline-demo", about = "Walk the partyline flow on an in-process bus")]
struct Cli {
    /// Tracing filter, e.g. `info` or `partyline_server=debug`.
    #[arg(long, env = "PARTYLINE_LOG", default_value = "info")]
    log: String,

    /// Run the state unit on the in-memory engine instead of redb.
    #[arg(long)]
    memory: bool,

    /// Database file for the durable engine.
    #[arg(long, env = "PARTYLINE_DB", default_value = "partyline_state.redb")]
    db_path: PathBuf,
}

/// Stand-in downstream unit: greets every successful login with an
/// app-ready announcement pointing at its own URL.
struct DemoApp {
    bus: Arc<dyn BusTransport>,
    clock: Arc<dyn ClockSource>,
    redirect_url: String,
}

#[async_trait]
impl UnitHandler for DemoApp {
    fn subscriptions(&self) -> Vec<String> {
        vec![Topic::AuthSuccess.wire().to_string()]
    }

    async fn handle(&self, _topic: Topic, envelope: Envelope) {
        let auth: AuthSuccess = match envelope.payload() {
            Ok(auth) => auth,
            Err(err) => {
                warn!(%err, "dropping malformed auth event");
                return;
            }
        };
        info!(user_id = %auth.user_id, "auth success received, announcing readiness");
        let ready = AppReady {
            app_name: "demo-app".to_string(),
            redirect_url: self.redirect_url.clone(),
            session_id: auth.session_id,
        };
        match Envelope::build(&ready, self.clock.as_ref()) {
            Ok(env) => {
                if let Err(err) = self.bus.publish(Topic::AppReady.wire(), env.encode()).await {
                    warn!(%err, "app-ready announcement failed");
                }
            }
            Err(err) => warn!(%err, "app-ready payload did not serialize"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    let config = UnitConfig::default();
    let storage = StorageConfig {
        engine: if cli.memory {
            EngineKind::Memory
        } else {
            EngineKind::Redb
        },
        db_path: cli.db_path,
    };

    let bus: Arc<dyn BusTransport> = Arc::new(InMemoryBus::new());
    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
    let controller = ShutdownController::new();

    let coordinator = Arc::new(SessionCoordinator::new(Arc::clone(&bus), Arc::clone(&clock)));
    spawn_unit(
        Arc::clone(&bus),
        Arc::clone(&coordinator) as Arc<dyn UnitHandler>,
        controller.shutdown_receiver(),
    )
    .await?;

    let state = Arc::new(StateService::new(
        Arc::clone(&bus),
        storage.build_engine()?,
        Arc::clone(&clock),
    ));
    spawn_unit(
        Arc::clone(&bus),
        state as Arc<dyn UnitHandler>,
        controller.shutdown_receiver(),
    )
    .await?;

    let app = Arc::new(DemoApp {
        bus: Arc::clone(&bus),
        clock: Arc::clone(&clock),
        redirect_url: "http://localhost:5001/".to_string(),
    });
    spawn_unit(
        Arc::clone(&bus),
        app as Arc<dyn UnitHandler>,
        controller.shutdown_receiver(),
    )
    .await?;

    let poller = Arc::new(BusPoller::new(
        Arc::clone(&bus),
        Arc::clone(&clock),
        config.poll_interval,
    ));
    spawn_unit(
        Arc::clone(&bus),
        Arc::clone(&poller) as Arc<dyn UnitHandler>,
        controller.shutdown_receiver(),
    )
    .await?;

    controller.set_ready();
    info!("all units running");

    // 1. Login mints a session and fans the auth event out to the units.
    let session_id = coordinator.authenticate("u1", "admin").await?;
    info!(%session_id, "logged in");

    // 2. The front end waits for the demo app's ready announcement.
    match coordinator
        .await_redirect(&session_id, config.redirect_deadline)
        .await
    {
        Some(url) => info!(%url, "redirecting browser"),
        None => anyhow::bail!("no unit announced readiness in time"),
    }

    // 3. Store a preference through the state unit's topic interface.
    let set = StateSet::new("u1", "theme", json!("dark"));
    let envelope = Envelope::build(&set, clock.as_ref())?;
    bus.publish(Topic::StateSet.wire(), envelope.encode())
        .await?;

    // 4. Read it back the way the viewer does: session id in, data out.
    let Some(_guard) = controller.begin_request() else {
        anyhow::bail!("shutting down");
    };
    let view = poller
        .fetch_view(&session_id, "theme", config.view_deadline)
        .await?;
    info!(user_id = %view.user_id, value = %view.value, "view rendered");
    drop(_guard);

    controller.trigger_shutdown();
    controller.wait_for_drain(Duration::from_secs(5)).await;
    info!("drained, bye");
    Ok(())
}
