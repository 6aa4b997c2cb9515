// State broadcaster: one fan-out channel per server, diffed payloads, pings, idle pruning.
// Subscribers only see events published after they subscribed.

pub mod diff;

use crate::models::Server;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Events of `/api/server/{id}/state/sse`; the SSE event name is the tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StateEvent {
    /// Changed fields of the server (plus `id`); the first event after a resync carries all fields.
    UpdateState(Value),
    Ping,
}

impl StateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StateEvent::UpdateState(_) => "update_state",
            StateEvent::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcasterSettings {
    pub channel_capacity: usize,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

impl From<&crate::config::BroadcasterConfig> for BroadcasterSettings {
    fn from(c: &crate::config::BroadcasterConfig) -> Self {
        Self {
            channel_capacity: c.channel_capacity,
            ping_interval: Duration::from_secs(c.ping_interval_secs),
            idle_timeout: Duration::from_secs(c.idle_timeout_secs),
        }
    }
}

struct Slot {
    /// Milliseconds since the broadcaster epoch at the last poll.
    last_polled: Arc<AtomicU64>,
    cancel: CancellationToken,
}

struct Channel {
    tx: broadcast::Sender<StateEvent>,
    last: Option<Map<String, Value>>,
    slots: HashMap<u64, Slot>,
}

pub struct StateBroadcaster {
    channels: Mutex<HashMap<String, Channel>>,
    next_slot: AtomicU64,
    epoch: Instant,
    settings: BroadcasterSettings,
}

impl StateBroadcaster {
    pub fn new(settings: BroadcasterSettings) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            next_slot: AtomicU64::new(0),
            epoch: Instant::now(),
            settings,
        })
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_channel(&self) -> Channel {
        let (tx, _) = broadcast::channel(self.settings.channel_capacity);
        Channel {
            tx,
            last: None,
            slots: HashMap::new(),
        }
    }

    /// Diff `server` against the previous snapshot and fan out the changed fields.
    /// Returns true when an event was emitted.
    pub fn publish(&self, server: &Server) -> bool {
        let map = match serde_json::to_value(server) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return false,
            Err(e) => {
                tracing::warn!(error = %e, server_id = %server.id, "state serialization failed");
                return false;
            }
        };
        let mut channels = self.channels();
        let channel = channels
            .entry(server.id.clone())
            .or_insert_with(|| self.new_channel());
        let changes = diff::changed_fields(channel.last.as_ref(), &map);
        channel.last = Some(map);
        match changes {
            Some(changes) => {
                // No receivers is fine: the server keeps running without watchers.
                let _ = channel.tx.send(StateEvent::UpdateState(changes));
                true
            }
            None => false,
        }
    }

    /// Last published snapshot for a server.
    pub fn snapshot(&self, server_id: &str) -> Option<Value> {
        self.channels()
            .get(server_id)
            .and_then(|c| c.last.clone())
            .map(Value::Object)
    }

    pub fn subscribe(self: &Arc<Self>, server_id: &str) -> Subscription {
        let slot_id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let last_polled = Arc::new(AtomicU64::new(self.elapsed_ms()));
        let cancel = CancellationToken::new();
        let rx = {
            let mut channels = self.channels();
            let channel = channels
                .entry(server_id.to_string())
                .or_insert_with(|| self.new_channel());
            channel.slots.insert(
                slot_id,
                Slot {
                    last_polled: last_polled.clone(),
                    cancel: cancel.clone(),
                },
            );
            channel.tx.subscribe()
        };
        let period = self.settings.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(server_id, slot_id, "state subscriber connected");
        Subscription {
            server_id: server_id.to_string(),
            slot_id,
            rx,
            ping,
            last_polled,
            cancel,
            broadcaster: self.clone(),
        }
    }

    pub fn subscriber_count(&self, server_id: &str) -> usize {
        self.channels()
            .get(server_id)
            .map(|c| c.slots.len())
            .unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        self.channels().values().map(|c| c.slots.len()).sum()
    }

    /// Cancel subscribers that have not been polled within the idle timeout. Returns how many.
    pub fn prune_idle(&self) -> usize {
        let now = self.elapsed_ms();
        let timeout = self.settings.idle_timeout.as_millis() as u64;
        let mut pruned = 0;
        for (server_id, channel) in self.channels().iter_mut() {
            channel.slots.retain(|slot_id, slot| {
                let idle = now.saturating_sub(slot.last_polled.load(Ordering::Relaxed));
                if idle > timeout {
                    tracing::debug!(server_id = %server_id, slot_id, idle_ms = idle, "pruning idle state subscriber");
                    slot.cancel.cancel();
                    pruned += 1;
                    false
                } else {
                    true
                }
            });
        }
        pruned
    }

    /// Drop a server's channel; its subscribers end.
    pub fn remove(&self, server_id: &str) {
        if let Some(channel) = self.channels().remove(server_id) {
            for slot in channel.slots.values() {
                slot.cancel.cancel();
            }
        }
    }

    fn release(&self, server_id: &str, slot_id: u64) {
        if let Some(channel) = self.channels().get_mut(server_id) {
            channel.slots.remove(&slot_id);
        }
    }
}

/// One subscriber slot; frees itself on drop.
pub struct Subscription {
    server_id: String,
    slot_id: u64,
    rx: broadcast::Receiver<StateEvent>,
    ping: Interval,
    last_polled: Arc<AtomicU64>,
    cancel: CancellationToken,
    broadcaster: Arc<StateBroadcaster>,
}

impl Subscription {
    /// Next event in publish order, a Ping when idle, or None once pruned or closed.
    pub async fn next(&mut self) -> Option<StateEvent> {
        self.last_polled
            .store(self.broadcaster.elapsed_ms(), Ordering::Relaxed);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.rx.recv() => match result {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(server_id = %self.server_id, skipped = n, "state subscriber lagged, resyncing");
                        if let Some(full) = self.broadcaster.snapshot(&self.server_id) {
                            return Some(StateEvent::UpdateState(full));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                _ = self.ping.tick() => return Some(StateEvent::Ping),
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.release(&self.server_id, self.slot_id);
        tracing::debug!(server_id = %self.server_id, slot_id = self.slot_id, "state subscriber released");
    }
}
