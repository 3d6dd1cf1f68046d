use std::sync::Arc;

use courier::app::{AppShell, build_registry, transient_components};
use courier::config::{ApiMode, ConfigStore};
use courier::router::MessageRouter;
use courier::surface::InMemoryRegion;
use courier::templates::StaticTemplates;
use courier_core::{ComponentKind, EventBus, PanelController, UserDirectory};
use courier_gateway::{DataGateway, HttpGateway, MockGateway, SessionStore};
use courier_live::LiveUpdateChannel;

/// Application entry point.
///
/// Composition root: constructs the bus, gateway, directory, both panel
/// controllers, the message router and the live channel, wires them
/// together, then drives the action loop until interrupted.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_store = ConfigStore::load();
    let config = config_store.settings();
    tracing::info!(api = ?config.api, "starting courier");

    let session = Arc::new(SessionStore::open_default());
    let gateway: Arc<dyn DataGateway> = match config.api {
        ApiMode::Local => Arc::new(MockGateway::new()),
        ApiMode::Http => Arc::new(HttpGateway::new(&config.http_base_url, session.clone())),
    };

    // The explicit local identity every outgoing/incoming decision hangs on.
    let local_user = match gateway.get_current_user().await {
        Ok(user) => user,
        Err(error) => {
            tracing::error!(error = %error, "cannot resolve the signed-in user; sign in first");
            std::process::exit(1);
        }
    };
    tracing::info!(user_id = %local_user.id, username = %local_user.username, "signed in");

    let bus = EventBus::new();
    let directory = Arc::new(UserDirectory::new(gateway.clone()));
    let registry = Arc::new(build_registry(
        bus.clone(),
        gateway.clone(),
        directory.clone(),
        local_user.id,
    ));
    let templates = Arc::new(StaticTemplates::new());

    let primary = PanelController::with_history(
        "primary",
        Arc::new(InMemoryRegion::new("primary")),
        templates.clone(),
        registry.clone(),
        ComponentKind::ChatsList,
        transient_components(),
    );
    let secondary = PanelController::without_history(
        "secondary",
        Arc::new(InMemoryRegion::new("secondary")),
        templates,
        registry,
    );

    let mut router = MessageRouter::install(bus.clone(), gateway.clone(), local_user.id);
    let mut shell = AppShell::new(bus.clone(), gateway, directory, primary, secondary);
    shell.bootstrap().await;

    let channel = LiveUpdateChannel::new(bus.clone(), config.live_config());
    if config.api == ApiMode::Http {
        match session.access_token() {
            Some(token) => {
                if let Err(error) = channel.connect(&token) {
                    tracing::warn!(error = %error, "live channel unavailable");
                }
            }
            None => {
                tracing::warn!("no live credential stored; running without real-time updates");
            }
        }
    }

    tokio::select! {
        _ = shell.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }

    channel.disconnect();
    router.dispose();
}
