//! CLI for perspectivecast
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `client`: connect to a topic and print every frame (smoke tests)

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use perspectivecast::activity::TracingActivityRecorder;
use perspectivecast::broker::{NamespaceManager, SledTopicCatalog};
use perspectivecast::config::{Settings, StoreBackend, load_config};
use perspectivecast::gate::{ConnectionGate, MemorySessionStore, RedisSessionStore, SessionStore};
use perspectivecast::persistence::{CounterStore, RedisCounterStore, SledCounterStore};
use perspectivecast::recovery::RecoveryReconciler;
use perspectivecast::subscription::SubscriptionService;
use perspectivecast::transport::start_websocket_server;
use perspectivecast::utils::logging;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "perspectivecast")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Subscribe to a topic and print incoming frames
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:3000")]
        url: String,
        /// Topic (perspective) to subscribe to
        #[arg(long)]
        topic: String,
        /// Cookie header sent with the upgrade request
        #[arg(long, default_value = "connect.sid=s%3Adev.signature")]
        cookie: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            if let Err(e) = run_server().await {
                // no-op when the configured subscriber is already installed
                logging::init("error");
                error!("Server failed: {e}");
            }
        }
        Command::Client { url, topic, cookie } => {
            logging::init("info");
            if let Err(e) = run_client(&url, &topic, &cookie).await {
                error!("Client failed: {e}");
            }
        }
    }
}

async fn run_server() -> Result<(), Box<dyn Error>> {
    let settings = load_config()?;
    logging::init(&settings.log.level);

    let db = sled::open(&settings.store.sled_path)?;
    let catalog = SledTopicCatalog::with_db(&db)?;
    for topic in &settings.topics.catalog {
        catalog.register(topic)?;
    }

    let (counters, sessions) = open_stores(&settings, &db).await?;
    if settings.gate.require_access_token && settings.store.backend == StoreBackend::Sled {
        warn!(
            "access tokens required but no shared session store configured; \
             every session will be rejected"
        );
    }

    let namespaces = Arc::new(NamespaceManager::new(Arc::new(catalog)));
    let gate = ConnectionGate::from_settings(&settings.gate, sessions)?;
    let service = Arc::new(SubscriptionService::new(
        gate,
        counters.clone(),
        namespaces.clone(),
        Arc::new(TracingActivityRecorder),
        settings.retry.clone(),
        Duration::from_millis(settings.server.handshake_timeout_ms),
    ));

    RecoveryReconciler::new(counters, namespaces)
        .with_reset(settings.recovery.reset_stale_counters)
        .spawn();
    tokio::spawn(service.clone().run_maintenance_loop());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    tokio::select! {
        result = start_websocket_server(&addr, service) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    db.flush_async().await?;
    Ok(())
}

async fn open_stores(
    settings: &Settings,
    db: &sled::Db,
) -> Result<(Arc<dyn CounterStore>, Arc<dyn SessionStore>), Box<dyn Error>> {
    let store = &settings.store;
    match store.backend {
        StoreBackend::Sled => {
            info!(path = %store.sled_path, "using sled counter store");
            let counters = SledCounterStore::with_db(db, &store.key_prefix)?;
            Ok((Arc::new(counters), Arc::new(MemorySessionStore::new())))
        }
        StoreBackend::Redis => {
            info!(url = %store.redis_url, "using redis counter store");
            let client = redis::Client::open(store.redis_url.as_str())?;
            let conn = client.get_multiplexed_tokio_connection().await?;
            let counters = RedisCounterStore::with_connection(conn.clone(), &store.key_prefix);
            let sessions = RedisSessionStore::new(conn, &store.session_prefix);
            Ok((Arc::new(counters), Arc::new(sessions)))
        }
    }
}

async fn run_client(url: &str, topic: &str, cookie: &str) -> Result<(), Box<dyn Error>> {
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    let mut target = url::Url::parse(url)?;
    target.query_pairs_mut().append_pair("p", topic);

    let mut request = target.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert("Cookie", HeaderValue::from_str(cookie)?);

    let (mut ws_stream, _response) = connect_async(request).await?;
    info!(topic = %topic, "connected, waiting for events");

    while let Some(frame) = ws_stream.next().await {
        match frame? {
            WsMessage::Text(text) => println!("{text}"),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    info!("connection closed by server");
    Ok(())
}
