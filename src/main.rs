use anyhow::Result;
use std::sync::{Arc, Mutex};
use stomp_live::client::ClientOptions;
use stomp_live::config;
use stomp_live::live_data::{run_live_data_publisher, LiveData, LiveDataPublisher, LIVE_DATA_TOPIC};
use stomp_live::memory::MemoryBroker;
use stomp_live::session::StompSession;
use stomp_live::view;
use tokio::sync::Notify;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stomp_live=info".into()),
        )
        .init();

    info!("stomp-live starting...");

    let config = config::load_from_env()?;
    info!(
        broker_url = %config.client.broker_url,
        reconnect_delay_ms = config.client.reconnect_delay_ms,
        heartbeat_ms = config.client.heartbeat_incoming_ms,
        "Configuration loaded"
    );

    // In-process broker standing in for the backend
    let broker = MemoryBroker::auto_accept();

    let publisher_task = if config.publisher.enabled {
        let publisher = LiveDataPublisher::new(broker.clone(), &config.publisher);
        Some(tokio::spawn(run_live_data_publisher(
            publisher,
            config.publisher.interval_ms,
        )))
    } else {
        info!("Live data publisher disabled");
        None
    };

    let session = StompSession::mount(
        ClientOptions::new(config.client.clone()),
        Arc::new(broker.transport()),
    );

    // Latest value, updated by the subscription callback
    let latest: Arc<Mutex<Option<LiveData>>> = Arc::new(Mutex::new(None));
    let changed = Arc::new(Notify::new());

    let subscription = {
        let latest = Arc::clone(&latest);
        let changed = Arc::clone(&changed);
        session
            .subscriber()
            .subscribe(LIVE_DATA_TOPIC, move |frame| match LiveData::parse(&frame.body) {
                Ok(data) => {
                    if let Ok(mut latest) = latest.lock() {
                        *latest = Some(data);
                    }
                    changed.notify_one();
                }
                Err(e) => warn!(error = %e, "Ignoring malformed live data"),
            })
    };

    let mut state_rx = session.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            result = state_rx.changed() => {
                if result.is_err() {
                    break;
                }
            }
            _ = changed.notified() => {}
        }

        let state = state_rx.borrow_and_update().clone();
        let snapshot = latest.lock().ok().and_then(|latest| latest.clone());
        info!(view = %view::render(&state, snapshot.as_ref()), "Render");
    }

    subscription.unsubscribe();
    session.unmount();

    if let Some(task) = publisher_task {
        task.abort();
    }

    info!("stomp-live stopped");
    Ok(())
}
