use super::*;
use crate::memory::MemoryBroker;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting(count: &Arc<AtomicUsize>) -> impl Fn(&Frame) + Send + Sync + 'static {
    let count = Arc::clone(count);
    move |_frame: &Frame| {
        count.fetch_add(1, Ordering::SeqCst);
    }
}

fn client_for(broker: &MemoryBroker) -> StompClient {
    StompClient::new(
        ClientOptions::new(ClientConfig::with_broker_url("ws://x/ws")),
        &broker.transport(),
    )
}

#[test]
fn test_broker_url_is_constant() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    assert_eq!(client.broker_url(), "ws://x/ws");
    client.connect();
    broker.accept_all();
    client.disconnect();
    assert_eq!(client.broker_url(), "ws://x/ws");
}

#[test]
fn test_not_connected_until_connect_event() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    assert!(!client.is_connected());
    client.connect();
    assert!(!client.is_connected());

    assert_eq!(broker.accept_all(), 1);
    assert!(client.is_connected());
}

#[test]
fn test_transport_settings_passed_through() {
    let broker = MemoryBroker::new();
    let _client = client_for(&broker);

    let settings = broker.last_settings().unwrap();
    assert_eq!(settings.broker_url, "ws://x/ws");
    assert_eq!(settings.reconnect_delay.as_millis(), 3000);
    assert_eq!(settings.heartbeat_incoming.as_millis(), 10000);
    assert_eq!(settings.heartbeat_outgoing.as_millis(), 10000);
}

#[test]
fn test_subscriptions_before_connect_materialize_once() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    let first = counter();
    let second = counter();
    client.subscribe("/topic/a", counting(&first));
    client.subscribe("/topic/b", counting(&second));
    assert_eq!(broker.subscription_count("/topic/a"), 0);

    client.connect();
    broker.accept_all();

    assert_eq!(broker.subscription_count("/topic/a"), 1);
    assert_eq!(broker.subscription_count("/topic/b"), 1);

    broker.publish("/topic/a", "1");
    broker.publish("/topic/b", "2");
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subscribe_while_connected_is_immediate() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    client.connect();
    broker.accept_all();

    let count = counter();
    let sub = client.subscribe("/topic/live-data", counting(&count));
    assert!(sub.is_active());
    assert_eq!(sub.destination(), Some("/topic/live-data"));
    assert_eq!(broker.subscription_count("/topic/live-data"), 1);

    broker.publish("/topic/live-data", "{}");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_connect_twice_is_noop() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    let count = counter();
    client.subscribe("/topic/live-data", counting(&count));

    client.connect();
    client.connect();
    broker.accept_all();
    client.connect();

    assert_eq!(broker.client_count(), 1);
    assert_eq!(broker.subscription_count("/topic/live-data"), 1);

    broker.publish("/topic/live-data", "{}");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_repeated_connect_events_do_not_duplicate() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    let count = counter();
    client.subscribe("/topic/live-data", counting(&count));

    client.connect();
    broker.accept_all();
    // Already connected: nothing to accept
    assert_eq!(broker.accept_all(), 0);

    assert_eq!(broker.subscription_count("/topic/live-data"), 1);
}

#[test]
fn test_disconnect_stops_all_callbacks() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    let count = counter();
    let sub = client.subscribe("/topic/live-data", counting(&count));

    client.connect();
    broker.accept_all();
    client.disconnect();

    assert!(!client.is_connected());
    assert!(!sub.is_active());
    assert_eq!(client.subscription_count(), 0);
    assert_eq!(broker.publish("/topic/live-data", "{}"), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_buffered_message_after_disconnect_is_dropped() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    let count = counter();
    client.subscribe("/topic/live-data", counting(&count));

    client.connect();
    broker.accept_all();

    // Frame already in flight when the client disconnects
    let in_flight = broker.prepare("/topic/live-data", r#"{"value": 1}"#);
    assert_eq!(in_flight.len(), 1);

    client.disconnect();
    in_flight.dispatch();

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_disconnect_is_idempotent() {
    let broker = MemoryBroker::new();
    let disconnects = counter();
    let on_disconnect = Arc::clone(&disconnects);
    let client = StompClient::new(
        ClientOptions::new(ClientConfig::with_broker_url("ws://x/ws")).on_disconnect(move || {
            on_disconnect.fetch_add(1, Ordering::SeqCst);
        }),
        &broker.transport(),
    );

    // Never connected: no-op
    client.disconnect();
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);

    client.connect();
    broker.accept_all();
    client.disconnect();
    client.disconnect();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reconnect_after_disconnect() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    client.connect();
    broker.accept_all();
    client.disconnect();

    let count = counter();
    client.subscribe("/topic/live-data", counting(&count));
    client.connect();
    broker.accept_all();

    assert!(client.is_connected());
    broker.publish("/topic/live-data", "{}");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_then_reconnect_replays_once() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    let live = counter();
    let other = counter();
    client.subscribe("/topic/live-data", counting(&live));
    client.subscribe("/topic/other", counting(&other));

    client.connect();
    broker.accept_all();

    assert_eq!(broker.drop_all(), 1);
    assert!(!client.is_connected());
    assert_eq!(broker.subscription_count("/topic/live-data"), 0);
    // Logical subscriptions survive the close
    assert_eq!(client.subscription_count(), 2);

    assert_eq!(broker.accept_all(), 1);
    assert_eq!(broker.subscription_count("/topic/live-data"), 1);
    assert_eq!(broker.subscription_count("/topic/other"), 1);

    broker.publish("/topic/live-data", "{}");
    broker.publish("/topic/other", "{}");
    assert_eq!(live.load(Ordering::SeqCst), 1);
    assert_eq!(other.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_removes_only_that_subscription() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    client.connect();
    broker.accept_all();

    let first = counter();
    let second = counter();
    let sub_first = client.subscribe("/topic/live-data", counting(&first));
    let _sub_second = client.subscribe("/topic/live-data", counting(&second));
    assert_eq!(broker.subscription_count("/topic/live-data"), 2);

    sub_first.unsubscribe();
    sub_first.unsubscribe();

    assert_eq!(client.subscription_count(), 1);
    assert_eq!(broker.subscription_count("/topic/live-data"), 1);

    broker.publish("/topic/live-data", "{}");
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_before_connect_never_materializes() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    let count = counter();
    let sub = client.subscribe("/topic/live-data", counting(&count));
    sub.unsubscribe();

    client.connect();
    broker.accept_all();
    assert_eq!(broker.subscription_count("/topic/live-data"), 0);
}

#[test]
fn test_unsubscribed_handle_stays_removed_after_reconnect() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    let count = counter();
    let sub = client.subscribe("/topic/live-data", counting(&count));

    client.connect();
    broker.accept_all();
    broker.drop_all();
    sub.unsubscribe();
    broker.accept_all();

    assert_eq!(broker.subscription_count("/topic/live-data"), 0);
}

#[test]
fn test_message_delivered_with_exact_body() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    let bodies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&bodies);
    client.subscribe("/topic/live-data", move |frame: &Frame| {
        sink.lock().unwrap().push(frame.body.clone());
    });

    client.connect();
    broker.accept_all();
    assert_eq!(broker.subscription_count("/topic/live-data"), 1);

    let body = r#"{"value": 95.5, "timestamp": 1700000000000}"#;
    broker.publish("/topic/live-data", body);

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0], body);
}

#[test]
fn test_message_frame_carries_destination() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    client.subscribe("/topic/live-data", move |frame: &Frame| {
        sink.lock().unwrap().push(frame.clone());
    });
    client.connect();
    broker.accept_all();
    broker.publish("/topic/live-data", "x");

    let frames = frames.lock().unwrap();
    assert_eq!(frames[0].command, Command::Message);
    assert_eq!(frames[0].destination(), Some("/topic/live-data"));
    assert!(frames[0].header("subscription").unwrap().starts_with("sub-"));
}

#[test]
fn test_error_frame_message_header() {
    let broker = MemoryBroker::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let client = StompClient::new(
        ClientOptions::new(ClientConfig::with_broker_url("ws://x/ws")).on_error(move |e| {
            sink.lock().unwrap().push(e.to_string());
        }),
        &broker.transport(),
    );

    client.connect();
    broker.accept_all();
    broker.send_error("auth failed");

    assert_eq!(*errors.lock().unwrap(), vec!["auth failed".to_string()]);
    // Errors do not tear anything down
    assert!(client.is_connected());
}

#[test]
fn test_error_frame_without_message_header_uses_frame_text() {
    let broker = MemoryBroker::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let client = StompClient::new(
        ClientOptions::new(ClientConfig::with_broker_url("ws://x/ws")).on_error(move |e| {
            sink.lock().unwrap().push(e.to_string());
        }),
        &broker.transport(),
    );

    client.connect();
    broker.accept_all();
    let frame = Frame::error(Default::default(), "broker exploded");
    broker.send_error_frame(&frame);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("ERROR\n"));
    assert!(errors[0].ends_with("broker exploded"));
}

#[test]
fn test_lifecycle_callbacks_fire_in_order() {
    let broker = MemoryBroker::new();
    let events = Arc::new(Mutex::new(Vec::new()));

    let (on_connect, on_error, on_disconnect) =
        (Arc::clone(&events), Arc::clone(&events), Arc::clone(&events));
    let options = ClientOptions::new(ClientConfig::with_broker_url("ws://x/ws"))
        .on_connect(move || on_connect.lock().unwrap().push("connect".to_string()))
        .on_error(move |e| on_error.lock().unwrap().push(format!("error:{}", e)))
        .on_disconnect(move || on_disconnect.lock().unwrap().push("disconnect".to_string()));
    let client = StompClient::new(options, &broker.transport());

    client.connect();
    broker.accept_all();
    broker.send_error("boom");
    broker.drop_all();
    broker.accept_all();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["connect", "error:boom", "disconnect", "connect"]
    );
}

#[test]
fn test_callback_may_unsubscribe_itself() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    client.connect();
    broker.accept_all();

    let count = counter();
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let (inner_count, inner_slot) = (Arc::clone(&count), Arc::clone(&slot));
    let sub = client.subscribe("/topic/live-data", move |_frame: &Frame| {
        inner_count.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = inner_slot.lock().unwrap().as_ref() {
            sub.unsubscribe();
        }
    });
    *slot.lock().unwrap() = Some(sub);

    broker.publish("/topic/live-data", "1");
    broker.publish("/topic/live-data", "2");
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(client.subscription_count(), 0);
}

#[test]
fn test_dropping_client_deactivates_transport() {
    let broker = MemoryBroker::new();
    let client = client_for(&broker);
    client.connect();
    broker.accept_all();
    assert_eq!(broker.connected_count(), 1);

    drop(client);
    assert_eq!(broker.connected_count(), 0);
    assert_eq!(broker.client_count(), 0);
}

#[test]
fn test_noop_subscription() {
    let sub = Subscription::noop();
    assert!(!sub.is_active());
    assert_eq!(sub.destination(), None);
    sub.unsubscribe();
}

/// Protocol client whose transport closes right after a chosen
/// `connected()` check has reported true
#[derive(Default)]
struct ClosingClient {
    connected: AtomicBool,
    handler: Mutex<Option<Arc<dyn ConnectionHandler>>>,
    /// Close on this many more `connected()` calls (0 = never)
    close_after_checks: AtomicUsize,
    live_subscribes: AtomicUsize,
}

struct NoopSubscription;

impl ProtocolSubscription for NoopSubscription {
    fn unsubscribe(&self) {}
}

impl ClosingClient {
    fn handler(&self) -> Arc<dyn ConnectionHandler> {
        self.handler.lock().unwrap().clone().unwrap()
    }

    fn establish(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.handler().on_connect();
    }
}

impl ProtocolClient for ClosingClient {
    fn activate(&self) {}

    fn deactivate(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn connected(&self) -> bool {
        let connected = self.connected.load(Ordering::SeqCst);
        if self.close_after_checks.load(Ordering::SeqCst) > 0
            && self.close_after_checks.fetch_sub(1, Ordering::SeqCst) == 1
        {
            self.connected.store(false, Ordering::SeqCst);
            self.handler().on_web_socket_close();
        }
        connected
    }

    fn subscribe(
        &self,
        _destination: &str,
        _callback: MessageCallback,
    ) -> Box<dyn ProtocolSubscription> {
        if self.connected.load(Ordering::SeqCst) {
            self.live_subscribes.fetch_add(1, Ordering::SeqCst);
        }
        Box::new(NoopSubscription)
    }
}

struct ClosingTransport {
    client: Arc<ClosingClient>,
}

impl Transport for ClosingTransport {
    fn open(
        &self,
        _settings: TransportSettings,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Arc<dyn ProtocolClient> {
        *self.client.handler.lock().unwrap() = Some(handler);
        self.client.clone()
    }
}

#[test]
fn test_close_between_check_and_subscribe_is_replayed() {
    let protocol = Arc::new(ClosingClient::default());
    let client = StompClient::new(
        ClientOptions::new(ClientConfig::with_broker_url("ws://x/ws")),
        &ClosingTransport {
            client: Arc::clone(&protocol),
        },
    );
    client.connect();
    protocol.establish();

    // subscribe() checks once, apply_subscriptions checks again and then loses the transport
    protocol.close_after_checks.store(2, Ordering::SeqCst);
    let sub = client.subscribe("/topic/live-data", |_frame: &Frame| {});
    assert!(!client.is_connected());
    assert_eq!(protocol.live_subscribes.load(Ordering::SeqCst), 0);

    protocol.establish();

    assert_eq!(protocol.live_subscribes.load(Ordering::SeqCst), 1);
    assert!(sub.is_active());
    assert_eq!(client.subscription_count(), 1);
}
