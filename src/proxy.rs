//! Fan-out of token events to WebSocket clients.
//!
//! The proxy is the single consumer of the upstream ingress connection. Each
//! upstream batch is transformed, split by namespace, and delivered to the
//! current primary client of each namespace as one `batch` message. The
//! upstream batch is acknowledged only after every namespace sub-batch has
//! been acknowledged downstream, so an unacked batch survives a client
//! disconnect and is redelivered to the next client that starts on the same
//! namespace. The most recently started client is the primary; a prior
//! primary is demoted and its in-flight batches are reassigned.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use uuid::Uuid;

use tokens_types::events::{TokenEvent, WsBatch, WsMessage, WsStarted};

use crate::eventstream::{StreamConnection, StreamMessage};
use crate::listener::TokenListener;

/// A connected WebSocket client as seen by the transport layer.
pub struct WsClient {
    pub id: u64,
    /// Serialized frames to forward to the socket.
    pub receiver: mpsc::UnboundedReceiver<String>,
}

struct ClientHandle {
    sender: mpsc::UnboundedSender<String>,
    namespace: Option<String>,
}

struct PendingBatch {
    /// Current message id; regenerated on every delivery attempt.
    id: String,
    events: Vec<TokenEvent>,
    batch_number: Option<u64>,
    delivered_to: Option<u64>,
    gate: watch::Sender<usize>,
}

#[derive(Default)]
struct NamespaceState {
    primary: Option<u64>,
    pending: VecDeque<PendingBatch>,
}

#[derive(Default)]
struct ProxyState {
    clients: HashMap<u64, ClientHandle>,
    namespaces: HashMap<String, NamespaceState>,
}

/// Transforms upstream batches and multicasts them to clients with
/// acknowledgment tracking.
pub struct EventStreamProxy {
    topic: String,
    listener: TokenListener,
    state: Mutex<ProxyState>,
    next_client: AtomicU64,
}

impl EventStreamProxy {
    pub fn new(listener: TokenListener, topic: String) -> Self {
        EventStreamProxy {
            topic,
            listener,
            state: Mutex::new(ProxyState::default()),
            next_client: AtomicU64::new(1),
        }
    }

    /// Main loop: processes each upstream message to completion, in order.
    pub async fn run(self: Arc<Self>, mut connection: StreamConnection) {
        while let Some(message) = connection.messages.recv().await {
            match message {
                StreamMessage::Batch(batch) => {
                    let events = self.listener.transform_batch(&batch.events).await;
                    if let Some(mut acked) = self.dispatch(events, batch.batch_number).await {
                        // Hold off the upstream ack until every namespace
                        // sub-batch has been acked by a client.
                        let _ = acked.wait_for(|remaining| *remaining == 0).await;
                    }
                    connection.acks.ack(batch.batch_number);
                }
                StreamMessage::Receipt(receipt) => {
                    self.broadcast_receipt(receipt).await;
                }
            }
        }
    }

    /// Queues transformed events per namespace and delivers them to primary
    /// clients. Returns a receiver that reaches zero when all sub-batches are
    /// acked, or `None` when nothing was deliverable.
    pub(crate) async fn dispatch(
        &self,
        events: Vec<TokenEvent>,
        batch_number: Option<u64>,
    ) -> Option<watch::Receiver<usize>> {
        let mut groups: HashMap<String, Vec<TokenEvent>> = HashMap::new();
        for event in events {
            let namespace = event.pool_data().unwrap_or(&self.topic).to_string();
            groups.entry(namespace).or_default().push(event);
        }
        if groups.is_empty() {
            return None;
        }

        let (gate_tx, gate_rx) = watch::channel(groups.len());
        let mut state = self.state.lock().await;
        for (namespace, events) in groups {
            let ns = state.namespaces.entry(namespace.clone()).or_default();
            ns.pending.push_back(PendingBatch {
                id: Uuid::new_v4().to_string(),
                events,
                batch_number,
                delivered_to: None,
                gate: gate_tx.clone(),
            });
            Self::deliver_pending(&mut state, &namespace);
        }
        Some(gate_rx)
    }

    /// Registers a freshly connected socket.
    pub async fn register_client(&self) -> WsClient {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.lock().await.clients.insert(
            id,
            ClientHandle {
                sender,
                namespace: None,
            },
        );
        WsClient { id, receiver }
    }

    /// Handles a client's `start` message: the client becomes the namespace
    /// primary and receives `started` plus any pending batches, in order.
    pub async fn start(&self, client_id: u64, namespace: &str) {
        let mut state = self.state.lock().await;
        let Some(client) = state.clients.get_mut(&client_id) else {
            return;
        };
        client.namespace = Some(namespace.to_string());
        let started = WsMessage::Started {
            data: WsStarted {
                namespace: namespace.to_string(),
            },
        };
        let _ = client.sender.send(serialize(&started));

        let ns = state.namespaces.entry(namespace.to_string()).or_default();
        if ns.primary != Some(client_id) {
            tracing::debug!(namespace, client_id, "Client takes over namespace");
        }
        ns.primary = Some(client_id);
        // Reassign everything unacked to the new primary.
        for batch in ns.pending.iter_mut() {
            batch.delivered_to = None;
        }
        Self::deliver_pending(&mut state, namespace);
    }

    /// Handles a client's `ack`: discards the matching pending batch.
    pub async fn ack(&self, client_id: u64, message_id: &str) {
        let mut state = self.state.lock().await;
        let Some(namespace) = state
            .clients
            .get(&client_id)
            .and_then(|client| client.namespace.clone())
        else {
            return;
        };
        let Some(ns) = state.namespaces.get_mut(&namespace) else {
            return;
        };
        let position = ns
            .pending
            .iter()
            .position(|batch| batch.id == message_id && batch.delivered_to == Some(client_id));
        match position {
            Some(index) => {
                let batch = ns.pending.remove(index).expect("position is in bounds");
                batch
                    .gate
                    .send_modify(|remaining| *remaining = remaining.saturating_sub(1));
            }
            None => {
                tracing::debug!(message_id, client_id, "Stale ack ignored");
            }
        }
    }

    /// Handles a socket close: pending batches return to the queue for the
    /// next primary.
    pub async fn disconnect(&self, client_id: u64) {
        let mut state = self.state.lock().await;
        let Some(client) = state.clients.remove(&client_id) else {
            return;
        };
        let Some(namespace) = client.namespace else {
            return;
        };
        if let Some(ns) = state.namespaces.get_mut(&namespace) {
            if ns.primary == Some(client_id) {
                ns.primary = None;
            }
            for batch in ns.pending.iter_mut() {
                if batch.delivered_to == Some(client_id) {
                    batch.delivered_to = None;
                }
            }
        }
    }

    /// Receipts bypass batching and acks; every started client gets a copy.
    pub async fn broadcast_receipt(&self, receipt: serde_json::Value) {
        let state = self.state.lock().await;
        let frame = serialize(&WsMessage::Receipt { data: receipt });
        for client in state.clients.values() {
            if client.namespace.is_some() {
                let _ = client.sender.send(frame.clone());
            }
        }
    }

    fn deliver_pending(state: &mut ProxyState, namespace: &str) {
        let ProxyState {
            clients,
            namespaces,
        } = state;
        let Some(ns) = namespaces.get_mut(namespace) else {
            return;
        };
        let Some(primary_id) = ns.primary else {
            return;
        };
        let Some(client) = clients.get(&primary_id) else {
            return;
        };
        for batch in ns.pending.iter_mut() {
            if batch.delivered_to.is_some() {
                continue;
            }
            batch.id = Uuid::new_v4().to_string();
            let frame = serialize(&WsMessage::Batch {
                id: batch.id.clone(),
                data: WsBatch {
                    events: batch.events.clone(),
                    batch_number: batch.batch_number,
                },
            });
            if client.sender.send(frame).is_err() {
                // Socket is going away; disconnect handling requeues.
                break;
            }
            batch.delivered_to = Some(primary_id);
        }
    }
}

fn serialize(message: &WsMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|error| {
        tracing::warn!(%error, "Failed to serialize outbound frame");
        String::new()
    })
}
