//! Notification Relay (spec §4.6): forwards downstream notifications to
//! whichever upstream sinks are currently attached, and batches
//! `tools/list_changed` during eager startup into exactly one emission.
//!
//! Grounded in the teacher's dual-sink shape (`mcp-statuses-changed` via
//! Tauri event emission, and the axum SSE stream in `proxy/server.rs`) —
//! here generalized to the stdio-callback / streamable-HTTP pair the
//! spec names.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

pub type StdioSink = Arc<dyn Fn(Value) + Send + Sync>;
pub type HttpSink = Arc<dyn Fn(Value) + Send + Sync>;

/// A named local event for in-process observers (spec §4.6 step 3, §8
/// scenario 4's `server:auto-restart-success`) — distinct from the
/// upstream-facing notifications forwarded to the stdio/HTTP sinks.
#[derive(Debug, Clone)]
pub struct LocalEvent {
    pub name: &'static str,
    pub data: Value,
}

/// Tracks whether the hub is still in its eager-startup window, during
/// which per-server `tools/list_changed` emissions are suppressed (spec
/// §4.6).
struct StartupBatch {
    active: bool,
    pending: bool,
}

pub struct NotificationRelay {
    stdio_sink: RwLock<Option<StdioSink>>,
    http_sink: RwLock<Option<HttpSink>>,
    startup: Mutex<StartupBatch>,
    observers: broadcast::Sender<LocalEvent>,
}

impl Default for NotificationRelay {
    fn default() -> Self {
        let (observers, _rx) = broadcast::channel(256);
        Self {
            stdio_sink: RwLock::new(None),
            http_sink: RwLock::new(None),
            startup: Mutex::new(StartupBatch { active: false, pending: false }),
            observers,
        }
    }
}

impl NotificationRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to local observer events (spec §4.6 step 3). Observers that
    /// never subscribe pay nothing — `emit_local` just drops the event.
    pub fn subscribe_observers(&self) -> broadcast::Receiver<LocalEvent> {
        self.observers.subscribe()
    }

    /// Emit one local event for observers, independent of whatever stdio/HTTP
    /// sinks are attached (spec §4.6 step 3).
    pub fn emit_local(&self, name: &'static str, data: Value) {
        let _ = self.observers.send(LocalEvent { name, data });
    }

    pub async fn set_stdio_sink(&self, sink: Option<StdioSink>) {
        *self.stdio_sink.write().await = sink;
    }

    pub async fn set_http_sink(&self, sink: Option<HttpSink>) {
        *self.http_sink.write().await = sink;
    }

    /// Begin the eager-startup batching window (spec §4.6). Call
    /// `finish_startup_batch` once all eager connects have settled.
    pub async fn begin_startup_batch(&self) {
        let mut startup = self.startup.lock().await;
        startup.active = true;
        startup.pending = false;
    }

    /// End the batching window, emitting exactly one
    /// `notifications/tools/list_changed` if any server mutated the
    /// toolset while the window was open (spec §4.6, §8 "exactly one...
    /// regardless of K").
    pub async fn finish_startup_batch(&self) {
        let should_emit = {
            let mut startup = self.startup.lock().await;
            startup.active = false;
            std::mem::take(&mut startup.pending)
        };
        if should_emit {
            self.emit_list_changed().await;
        }
    }

    /// Forward a downstream notification verbatim to every attached sink,
    /// then emit it as a local observer event (spec §4.6 steps 1-3).
    pub async fn forward(&self, notification: Value) {
        if let Some(sink) = self.stdio_sink.read().await.as_ref() {
            sink(notification.clone());
        }
        if let Some(sink) = self.http_sink.read().await.as_ref() {
            sink(notification.clone());
        }
        self.emit_local("notification:forwarded", notification);
    }

    /// Notify that the toolset changed. During the startup batch window
    /// this only marks a pending emission; otherwise it emits
    /// immediately, unless the caller explicitly suppresses it.
    pub async fn notify_tools_changed(&self, suppress: bool) {
        if suppress {
            return;
        }
        let mut startup = self.startup.lock().await;
        if startup.active {
            startup.pending = true;
            return;
        }
        drop(startup);
        self.emit_list_changed().await;
    }

    async fn emit_list_changed(&self) {
        self.forward(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/tools/list_changed",
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn startup_batch_emits_exactly_once_regardless_of_server_count() {
        let relay = NotificationRelay::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        relay
            .set_stdio_sink(Some(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .await;

        relay.begin_startup_batch().await;
        for _ in 0..5 {
            relay.notify_tools_changed(false).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        relay.finish_startup_batch().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_pending_mutation_means_no_emission_at_batch_end() {
        let relay = NotificationRelay::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        relay
            .set_stdio_sink(Some(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .await;

        relay.begin_startup_batch().await;
        relay.finish_startup_batch().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn outside_startup_each_mutation_emits_immediately() {
        let relay = NotificationRelay::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        relay
            .set_stdio_sink(Some(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .await;

        relay.notify_tools_changed(false).await;
        relay.notify_tools_changed(false).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn suppressed_mutation_never_emits() {
        let relay = NotificationRelay::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        relay
            .set_stdio_sink(Some(Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .await;

        relay.notify_tools_changed(true).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forward_reaches_both_sinks() {
        let relay = NotificationRelay::new();
        let stdio_count = Arc::new(AtomicUsize::new(0));
        let http_count = Arc::new(AtomicUsize::new(0));
        let sc = stdio_count.clone();
        let hc = http_count.clone();
        relay.set_stdio_sink(Some(Arc::new(move |_| { sc.fetch_add(1, Ordering::SeqCst); }))).await;
        relay.set_http_sink(Some(Arc::new(move |_| { hc.fetch_add(1, Ordering::SeqCst); }))).await;

        relay.forward(serde_json::json!({"method": "notifications/progress"})).await;

        assert_eq!(stdio_count.load(Ordering::SeqCst), 1);
        assert_eq!(http_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forward_emits_a_local_observer_event() {
        let relay = NotificationRelay::new();
        let mut observer = relay.subscribe_observers();

        relay.forward(serde_json::json!({"method": "notifications/progress"})).await;

        let event = observer.recv().await.unwrap();
        assert_eq!(event.name, "notification:forwarded");
    }

    #[tokio::test]
    async fn emit_local_reaches_subscribed_observers() {
        let relay = NotificationRelay::new();
        let mut observer = relay.subscribe_observers();

        relay.emit_local("server:auto-restart-success", serde_json::json!({"serverId": "fs"}));

        let event = observer.recv().await.unwrap();
        assert_eq!(event.name, "server:auto-restart-success");
        assert_eq!(event.data["serverId"], "fs");
    }
}
