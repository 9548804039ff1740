//! Bus client abstraction.
//!
//! The tracker core never talks to a broker directly; it speaks to the
//! [`BusClient`] trait. [`ManagedBusClient`] implements the client-side
//! contract (pending-subscription replay, drop-publish when disconnected,
//! retryable/permanent connect classification, and a drain-then-disable
//! disconnect) over an abstract [`BusTransport`]. The physical broker
//! transport lives outside this crate; the in-process [`LoopbackBroker`]
//! stands in for wiring and tests.
//!
//! # Callback lifetime safety
//!
//! Transport callbacks run on transport-owned threads. Every callback body
//! executes under a [`CallbackGuard`]: an RAII token that increments a
//! shared in-flight counter on entry and decrements it on every exit path.
//! `disconnect` sets the stop flag, waits for the counter to drain (bounded
//! by the drain timeout), and only then disables callbacks and closes the
//! transport.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use scene_tracker_core::TrackerError;

/// Default time to wait for in-flight callbacks during disconnect.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Handler invoked for each inbound message: `(topic, payload)`.
pub type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

// ---------------------------------------------------------------------------
// BusClient trait
// ---------------------------------------------------------------------------

/// Publish/subscribe client surface the service is written against.
pub trait BusClient: Send + Sync {
    /// Initiate the initial connection.
    fn connect(&self) -> Result<(), TrackerError>;

    /// Drain in-flight callbacks, disable them, and close the transport.
    fn disconnect(&self, drain_timeout: Duration);

    /// Subscribe to a topic. When disconnected, the subscription is stored
    /// and applied on the next connect.
    fn subscribe(&self, topic: &str);

    /// Unsubscribe from a topic, removing it from the pending set.
    fn unsubscribe(&self, topic: &str);

    /// Publish a payload. When disconnected, the message is dropped and
    /// logged; there is no implicit queueing.
    fn publish(&self, topic: &str, payload: &str);

    /// Install or clear the inbound message callback.
    fn set_message_callback(&self, callback: Option<MessageCallback>);

    /// Whether the transport currently reports a live connection.
    fn is_connected(&self) -> bool;
}

// ---------------------------------------------------------------------------
// CallbackGuard
// ---------------------------------------------------------------------------

/// RAII guard for in-flight async callbacks during shutdown.
///
/// Increments the counter on construction, decrements on drop. The stop
/// flag is captured at construction so [`CallbackGuard::should_skip`] is
/// consistent for the guard's lifetime.
pub struct CallbackGuard {
    counter: Arc<AtomicUsize>,
    should_skip: bool,
}

impl CallbackGuard {
    /// Enter a callback: increments `counter` and captures `stop_flag`.
    pub fn new(counter: Arc<AtomicUsize>, stop_flag: &AtomicBool) -> Self {
        let should_skip = stop_flag.load(Ordering::SeqCst);
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            should_skip,
        }
    }

    /// Whether the callback body should early-return because shutdown was
    /// already requested when the callback entered.
    pub fn should_skip(&self) -> bool {
        self.should_skip
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Connect failure classification
// ---------------------------------------------------------------------------

/// Broker response to a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted
    Accepted,
    /// Broker does not speak the requested protocol version
    UnacceptableProtocolVersion,
    /// Client identifier rejected
    IdentifierRejected,
    /// Broker temporarily unavailable
    ServerUnavailable,
    /// Bad user name or password
    BadCredentials,
    /// Client not authorized to connect
    NotAuthorized,
    /// Transport-level or unclassified failure
    Other(i32),
}

impl ConnectReturnCode {
    /// Whether retrying the connection can succeed.
    ///
    /// Protocol-version, identifier, credential, and authorization
    /// rejections are permanent; everything else (network failures, a
    /// momentarily unavailable broker) is retryable.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::UnacceptableProtocolVersion
                | Self::IdentifierRejected
                | Self::BadCredentials
                | Self::NotAuthorized
        )
    }
}

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub min_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Policy with the 1-second minimum and a configurable maximum.
    pub fn with_max_delay_secs(max_delay_secs: u64) -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(max_delay_secs.max(1)),
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based): the minimum
    /// delay doubled per attempt, clamped to the maximum.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self
            .min_delay
            .checked_mul(factor.min(u32::MAX as u64) as u32)
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::with_max_delay_secs(30)
    }
}

// ---------------------------------------------------------------------------
// Transport abstraction
// ---------------------------------------------------------------------------

/// Events a transport delivers to its owner, on transport-owned threads.
pub trait TransportEvents: Send + Sync {
    /// Connection established. `reconnect` distinguishes automatic
    /// reconnects from the initial connect.
    fn connected(&self, reconnect: bool);
    /// Connection dropped; the transport will reconnect on its own.
    fn connection_lost(&self, cause: &str);
    /// Inbound message.
    fn message_arrived(&self, topic: &str, payload: &str);
    /// A connect attempt was refused.
    fn connect_failed(&self, code: ConnectReturnCode, message: &str);
}

/// The physical byte-moving layer under [`ManagedBusClient`].
///
/// Implementations own their I/O threads, deliver events through the
/// installed sink, and handle automatic reconnection per
/// [`ReconnectPolicy`]. On reconnect the client re-issues subscriptions
/// from its pending set before messages flow.
pub trait BusTransport: Send + Sync + 'static {
    /// Install the event sink. Called once before `open`.
    fn install_event_sink(&self, sink: Arc<dyn TransportEvents>);
    /// Initiate the connection; completion arrives as an event.
    fn open(&self) -> Result<(), TrackerError>;
    /// Tear the connection down. No events are delivered afterwards.
    fn close(&self);
    /// Send one message.
    fn send(&self, topic: &str, payload: &str) -> Result<(), TrackerError>;
    /// Ask the broker for a subscription.
    fn request_subscribe(&self, topic: &str) -> Result<(), TrackerError>;
    /// Ask the broker to drop a subscription.
    fn request_unsubscribe(&self, topic: &str) -> Result<(), TrackerError>;
}

// ---------------------------------------------------------------------------
// ManagedBusClient
// ---------------------------------------------------------------------------

struct ClientState {
    client_id: String,
    connected: AtomicBool,
    stop_requested: AtomicBool,
    in_flight: Arc<AtomicUsize>,
    pending_subscriptions: Mutex<BTreeSet<String>>,
    message_callback: Mutex<Option<MessageCallback>>,
    exit_code: AtomicI32,
}

/// Generic bus client: the connection/subscription state machine over an
/// abstract transport.
pub struct ManagedBusClient<T: BusTransport> {
    transport: Arc<T>,
    state: Arc<ClientState>,
}

/// Client id of the form `tracker-{hostname}-{pid}`.
fn generate_client_id() -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    format!("tracker-{hostname}-{}", std::process::id())
}

impl<T: BusTransport> ManagedBusClient<T> {
    /// Wrap a transport and wire its events into this client.
    pub fn new(transport: T) -> Self {
        let transport = Arc::new(transport);
        let state = Arc::new(ClientState {
            client_id: generate_client_id(),
            connected: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            in_flight: Arc::new(AtomicUsize::new(0)),
            pending_subscriptions: Mutex::new(BTreeSet::new()),
            message_callback: Mutex::new(None),
            exit_code: AtomicI32::new(0),
        });

        let sink = Arc::new(EventSink {
            transport: Arc::clone(&transport),
            state: Arc::clone(&state),
        });
        transport.install_event_sink(sink);

        Self { transport, state }
    }

    /// This client's generated identifier.
    pub fn client_id(&self) -> &str {
        &self.state.client_id
    }

    /// Exit code the process should use after this client stops: 1 when a
    /// transient failure warrants a supervisor restart, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        self.state.exit_code.load(Ordering::SeqCst)
    }

    /// Number of callbacks currently executing (drain instrumentation).
    pub fn callbacks_in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }
}

impl<T: BusTransport> BusClient for ManagedBusClient<T> {
    fn connect(&self) -> Result<(), TrackerError> {
        info!(client_id = %self.state.client_id, "Bus connecting");
        self.transport.open().map_err(|e| {
            // Synchronous open failures are network-level and retryable.
            self.state.exit_code.store(1, Ordering::SeqCst);
            error!(error = %e, "Bus connect failed");
            e
        })
    }

    fn disconnect(&self, drain_timeout: Duration) {
        if self.state.stop_requested.swap(true, Ordering::SeqCst) {
            debug!("Bus disconnect already in progress or completed");
            return;
        }

        info!(drain_timeout_ms = drain_timeout.as_millis() as u64, "Bus disconnecting");

        // Phase 1: wait for in-flight callbacks to drain.
        let deadline = Instant::now() + drain_timeout;
        while self.state.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    in_flight = self.state.in_flight.load(Ordering::SeqCst),
                    "Drain timeout expired with callbacks still in flight"
                );
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        // Phase 2: disable callbacks, then close the transport.
        *self.state.message_callback.lock() = None;
        self.transport.close();
        self.state.connected.store(false, Ordering::SeqCst);
        debug!("Bus disconnect completed");
    }

    fn subscribe(&self, topic: &str) {
        self.state
            .pending_subscriptions
            .lock()
            .insert(topic.to_string());

        if !self.state.connected.load(Ordering::SeqCst) {
            debug!(topic, "Bus subscribe deferred (not connected)");
            return;
        }

        if let Err(e) = self.transport.request_subscribe(topic) {
            error!(topic, error = %e, "Bus subscribe failed");
        } else {
            debug!(topic, "Bus subscribe request queued");
        }
    }

    fn unsubscribe(&self, topic: &str) {
        self.state.pending_subscriptions.lock().remove(topic);

        if !self.state.connected.load(Ordering::SeqCst) {
            debug!(topic, "Bus unsubscribe skipped (not connected)");
            return;
        }

        if let Err(e) = self.transport.request_unsubscribe(topic) {
            error!(topic, error = %e, "Bus unsubscribe failed");
        }
    }

    fn publish(&self, topic: &str, payload: &str) {
        if !self.state.connected.load(Ordering::SeqCst) {
            warn!(topic, "Bus publish dropped (not connected)");
            return;
        }

        if let Err(e) = self.transport.send(topic, payload) {
            error!(topic, error = %e, "Bus publish failed");
        } else {
            debug!(topic, bytes = payload.len(), "Bus published");
        }
    }

    fn set_message_callback(&self, callback: Option<MessageCallback>) {
        *self.state.message_callback.lock() = callback;
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

/// Receives transport events and applies them to the client state.
struct EventSink<T: BusTransport> {
    transport: Arc<T>,
    state: Arc<ClientState>,
}

impl<T: BusTransport> TransportEvents for EventSink<T> {
    fn connected(&self, reconnect: bool) {
        let guard = CallbackGuard::new(Arc::clone(&self.state.in_flight), &self.state.stop_requested);
        if guard.should_skip() {
            return;
        }

        info!(
            reconnect,
            client_id = %self.state.client_id,
            "Bus connected"
        );
        self.state.connected.store(true, Ordering::SeqCst);

        // Re-issue every pending subscription before messages flow.
        let topics: Vec<String> = self
            .state
            .pending_subscriptions
            .lock()
            .iter()
            .cloned()
            .collect();
        for topic in topics {
            if let Err(e) = self.transport.request_subscribe(&topic) {
                error!(topic, error = %e, "Bus re-subscribe failed");
            } else {
                debug!(topic, "Bus subscribe request queued");
            }
        }
    }

    fn connection_lost(&self, cause: &str) {
        let guard = CallbackGuard::new(Arc::clone(&self.state.in_flight), &self.state.stop_requested);
        if guard.should_skip() {
            return;
        }

        warn!(
            cause = if cause.is_empty() { "unknown" } else { cause },
            "Bus connection lost, transport will reconnect"
        );
        self.state.connected.store(false, Ordering::SeqCst);
    }

    fn message_arrived(&self, topic: &str, payload: &str) {
        let guard = CallbackGuard::new(Arc::clone(&self.state.in_flight), &self.state.stop_requested);
        if guard.should_skip() {
            return;
        }

        // Clone the handler out so the lock is not held across user code.
        let callback = self.state.message_callback.lock().clone();
        if let Some(callback) = callback {
            callback(topic, payload);
        }
    }

    fn connect_failed(&self, code: ConnectReturnCode, message: &str) {
        let guard = CallbackGuard::new(Arc::clone(&self.state.in_flight), &self.state.stop_requested);
        if guard.should_skip() {
            return;
        }

        let retryable = code.is_retryable();
        self.state
            .exit_code
            .store(i32::from(retryable), Ordering::SeqCst);
        error!(
            ?code,
            message,
            retryable,
            exit_code = i32::from(retryable),
            "Bus connect failed"
        );
    }
}

// ---------------------------------------------------------------------------
// Loopback transport
// ---------------------------------------------------------------------------

struct LoopbackClientSlot {
    sink: Arc<dyn TransportEvents>,
    topics: BTreeSet<String>,
}

#[derive(Default)]
struct LoopbackBrokerInner {
    clients: Mutex<std::collections::HashMap<usize, LoopbackClientSlot>>,
    next_id: AtomicUsize,
}

/// In-process broker: exact-topic routing between loopback transports.
///
/// Stands in for the physical broker in tests and local wiring. Message
/// delivery happens on the publisher's thread, which from the subscriber's
/// point of view is exactly the "transport-owned thread" the callback
/// contract is written for.
#[derive(Clone, Default)]
pub struct LoopbackBroker {
    inner: Arc<LoopbackBrokerInner>,
}

impl LoopbackBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport attached to this broker.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            broker: self.clone(),
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            sink: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    fn route(&self, topic: &str, payload: &str, sender: usize) {
        // Collect receivers under the lock, deliver outside it so a
        // handler that publishes from its callback cannot deadlock.
        let receivers: Vec<Arc<dyn TransportEvents>> = {
            let clients = self.inner.clients.lock();
            clients
                .iter()
                .filter(|(id, slot)| **id != sender && slot.topics.contains(topic))
                .map(|(_, slot)| Arc::clone(&slot.sink))
                .collect()
        };
        for sink in receivers {
            sink.message_arrived(topic, payload);
        }
    }
}

/// Transport endpoint attached to a [`LoopbackBroker`].
pub struct LoopbackTransport {
    broker: LoopbackBroker,
    id: usize,
    sink: Mutex<Option<Arc<dyn TransportEvents>>>,
    open: AtomicBool,
}

impl LoopbackTransport {
    fn sink(&self) -> Option<Arc<dyn TransportEvents>> {
        self.sink.lock().clone()
    }
}

impl BusTransport for LoopbackTransport {
    fn install_event_sink(&self, sink: Arc<dyn TransportEvents>) {
        *self.sink.lock() = Some(sink);
    }

    fn open(&self) -> Result<(), TrackerError> {
        let sink = self
            .sink()
            .ok_or_else(|| TrackerError::bus_transient("no event sink installed"))?;

        self.broker.inner.clients.lock().insert(
            self.id,
            LoopbackClientSlot {
                sink: Arc::clone(&sink),
                topics: BTreeSet::new(),
            },
        );
        self.open.store(true, Ordering::SeqCst);
        sink.connected(false);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.broker.inner.clients.lock().remove(&self.id);
    }

    fn send(&self, topic: &str, payload: &str) -> Result<(), TrackerError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TrackerError::bus_transient("transport not open"));
        }
        self.broker.route(topic, payload, self.id);
        Ok(())
    }

    fn request_subscribe(&self, topic: &str) -> Result<(), TrackerError> {
        let mut clients = self.broker.inner.clients.lock();
        let slot = clients
            .get_mut(&self.id)
            .ok_or_else(|| TrackerError::bus_transient("transport not open"))?;
        slot.topics.insert(topic.to_string());
        Ok(())
    }

    fn request_unsubscribe(&self, topic: &str) -> Result<(), TrackerError> {
        let mut clients = self.broker.inner.clients.lock();
        let slot = clients
            .get_mut(&self.id)
            .ok_or_else(|| TrackerError::bus_transient("transport not open"))?;
        slot.topics.remove(topic);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
