//! The message hub: live room registry plus the workers that feed it.
//!
//! Three workers run once [`Hub::run`] is called:
//!
//! - **lifecycle** applies register/unregister events to the registry
//! - **inbound** classifies client events one at a time (persist, broadcast
//!   typing, drop reserved kinds)
//! - **outbound** fans events out to every mailbox in the target room
//!
//! Nothing on the fan-out path ever waits on a connection. A mailbox that is
//! full marks its client as a slow consumer: the mailbox is closed and the
//! client is removed from the room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;

use crate::config::HubConfig;
use crate::domain::chat::{InboundMessage, MessageKind, OutboundMessage};
use crate::domain::foundation::{ClientId, RoomId, UserId};
use crate::ports::MessagePersister;

use super::client::{Client, ConnectionTiming, DeliveryError};
use super::room::Room;

/// How long a typing indicator lasts without an explicit stop.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(5);

/// Reason sent to an author whose message outran the persistence deadline.
const PERSIST_TIMEOUT_REASON: &str = "message could not be saved in time";

/// Errors returned by hub operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("hub is closed")]
    Closed,

    #[error("hub workers are already running")]
    AlreadyRunning,
}

enum LifecycleEvent {
    /// Acked once the client is in its room.
    Register(Arc<Client>, oneshot::Sender<()>),
    Unregister(Arc<Client>),
}

/// Receivers handed to the workers by [`Hub::run`].
struct Queues {
    lifecycle: mpsc::Receiver<LifecycleEvent>,
    inbound: mpsc::Receiver<InboundMessage>,
    outbound: mpsc::Receiver<Arc<OutboundMessage>>,
}

struct Workers {
    lifecycle: JoinHandle<()>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

/// Shutdown progress, observed by the workers.
///
/// Intake (lifecycle and inbound) stops at `Draining`. Fan-out keeps going
/// until `Stopped` so results of in-flight persistence still go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Running,
    Draining,
    Stopped,
}

/// Single process-wide coordinator for live rooms.
pub struct Hub {
    config: HubConfig,
    persister: Arc<dyn MessagePersister>,
    rooms: RwLock<HashMap<RoomId, Room>>,
    lifecycle_tx: mpsc::Sender<LifecycleEvent>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    outbound_tx: mpsc::Sender<Arc<OutboundMessage>>,
    queues: Mutex<Option<Queues>>,
    workers: Mutex<Option<Workers>>,
    phase: watch::Sender<Phase>,
    closed: AtomicBool,
}

impl Hub {
    /// Build an idle hub. Call [`Hub::run`] to start its workers.
    pub fn new(config: HubConfig, persister: Arc<dyn MessagePersister>) -> Arc<Self> {
        let (lifecycle_tx, lifecycle) = mpsc::channel(config.lifecycle_capacity);
        let (inbound_tx, inbound) = mpsc::channel(config.inbound_capacity);
        let (outbound_tx, outbound) = mpsc::channel(config.outbound_capacity);
        let (phase, _) = watch::channel(Phase::Running);

        Arc::new(Self {
            config,
            persister,
            rooms: RwLock::new(HashMap::new()),
            lifecycle_tx,
            inbound_tx,
            outbound_tx,
            queues: Mutex::new(Some(Queues {
                lifecycle,
                inbound,
                outbound,
            })),
            workers: Mutex::new(None),
            phase,
            closed: AtomicBool::new(false),
        })
    }

    /// Start the lifecycle, inbound and outbound workers.
    pub fn run(self: &Arc<Self>) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::Closed);
        }
        let Queues {
            lifecycle,
            inbound,
            outbound,
        } = lock(&self.queues).take().ok_or(HubError::AlreadyRunning)?;

        let workers = Workers {
            lifecycle: tokio::spawn(self.clone().lifecycle_worker(lifecycle, self.phase.subscribe())),
            inbound: tokio::spawn(self.clone().inbound_worker(inbound, self.phase.subscribe())),
            outbound: tokio::spawn(self.clone().outbound_worker(outbound, self.phase.subscribe())),
        };
        *lock(&self.workers) = Some(workers);

        tracing::info!(
            mailbox_capacity = self.config.mailbox_capacity,
            inbound_capacity = self.config.inbound_capacity,
            outbound_capacity = self.config.outbound_capacity,
            "Hub started"
        );
        Ok(())
    }

    /// Stop the workers and close every live connection.
    ///
    /// In-flight persistence finishes and already queued broadcasts are
    /// delivered before mailboxes are closed. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Hub closing");

        let workers = lock(&self.workers).take();
        self.phase.send_replace(Phase::Draining);
        if let Some(workers) = workers {
            join_worker("lifecycle", workers.lifecycle).await;
            join_worker("inbound", workers.inbound).await;
            self.phase.send_replace(Phase::Stopped);
            join_worker("outbound", workers.outbound).await;
        } else {
            self.phase.send_replace(Phase::Stopped);
            let queues = lock(&self.queues).take();
            if let Some(queues) = queues {
                self.discard_pending(queues.lifecycle).await;
            }
        }

        let rooms = std::mem::take(&mut *self.rooms.write().await);
        let mut closed = 0usize;
        for room in rooms.into_values() {
            for client in room.into_members() {
                if client.close_mailbox() {
                    closed += 1;
                }
            }
        }

        tracing::info!(connections = closed, "Hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Heartbeat settings for connections served by this hub.
    pub fn timing(&self) -> ConnectionTiming {
        ConnectionTiming::from(&self.config)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ════════════════════════════════════════════════════════════════════════════

    /// Admit a freshly upgraded connection to its room.
    ///
    /// Resolves once the client is in the registry, so anything it submits
    /// afterwards is fanned out to it too. Fails with [`HubError::Closed`] if
    /// the hub shuts down before admission; the client's mailbox is closed
    /// in that case.
    pub async fn register(&self, client: Arc<Client>) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::Closed);
        }
        let (ack, admitted) = oneshot::channel();
        self.lifecycle_tx
            .send(LifecycleEvent::Register(client, ack))
            .await
            .map_err(|_| HubError::Closed)?;
        admitted.await.map_err(|_| HubError::Closed)
    }

    /// Remove a connection from its room and close its mailbox.
    ///
    /// Idempotent. Once the lifecycle worker is gone the removal is applied
    /// directly.
    pub async fn unregister(&self, client: &Arc<Client>) {
        let queued = !self.is_closed()
            && self
                .lifecycle_tx
                .send(LifecycleEvent::Unregister(client.clone()))
                .await
                .is_ok();

        if !queued {
            self.remove_client(client).await;
        }
    }

    async fn add_client(&self, client: Arc<Client>) {
        let room_id = client.room_id();
        let user_id = client.user_id();

        let (displaced, members) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.entry(room_id).or_insert_with(|| {
                tracing::debug!(room_id = %room_id, is_private = client.room_is_private(), "Room opened");
                Room::new(room_id, client.room_is_private())
            });
            let displaced = room.insert(client.clone());
            if let Some(previous) = &displaced {
                previous.close_mailbox();
            }
            (displaced, room.len())
        };

        if let Some(previous) = displaced {
            tracing::debug!(
                user_id = %user_id,
                room_id = %room_id,
                replaced = %previous.id(),
                "Replaced existing connection"
            );
        }

        tracing::debug!(
            client_id = %client.id(),
            user_id = %user_id,
            room_id = %room_id,
            members,
            "Client joined room"
        );

        self.publish(OutboundMessage::join(room_id, user_id));
    }

    async fn remove_client(&self, client: &Arc<Client>) {
        let room_id = client.room_id();
        let user_id = client.user_id();

        let announce_leave = {
            let mut rooms = self.rooms.write().await;
            let announce = match rooms.get_mut(&room_id) {
                Some(room) => {
                    let removed = room.remove_if_current(user_id, client.id()).is_some();
                    if room.is_empty() {
                        rooms.remove(&room_id);
                        tracing::debug!(room_id = %room_id, "Room closed");
                        false
                    } else {
                        removed
                    }
                }
                None => false,
            };
            client.close_mailbox();
            announce
        };

        tracing::debug!(
            client_id = %client.id(),
            user_id = %user_id,
            room_id = %room_id,
            "Client left room"
        );

        if announce_leave {
            self.publish(OutboundMessage::leave(room_id, user_id));
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Event intake
    // ════════════════════════════════════════════════════════════════════════════

    /// Hand a client event to the inbound worker without waiting.
    ///
    /// Returns false if the event was dropped (queue full or hub closed).
    pub fn submit(&self, message: InboundMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.inbound_tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    user_id = %message.user_id(),
                    room_id = %message.room_id(),
                    kind = ?message.kind,
                    "Inbound queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queue an event for fan-out to its room without waiting.
    ///
    /// Returns false if the event was dropped.
    pub fn publish(&self, message: OutboundMessage) -> bool {
        match self.outbound_tx.try_send(Arc::new(message)) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    room_id = %message.room_id,
                    kind = ?message.kind,
                    "Outbound queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    async fn classify(&self, message: InboundMessage) {
        let room_id = message.room_id();
        let user_id = message.user_id();

        match message.kind {
            MessageKind::Text => self.handle_text(message).await,
            MessageKind::Typing => {
                self.publish(OutboundMessage::typing(room_id, user_id));
                self.schedule_stop_typing(room_id, user_id);
            }
            MessageKind::StopTyping => {
                self.publish(OutboundMessage::stop_typing(room_id, user_id));
            }
            MessageKind::Read => {
                tracing::trace!(user_id = %user_id, room_id = %room_id, "Read receipt ignored");
            }
            MessageKind::Edit | MessageKind::Delete | MessageKind::React => {
                tracing::debug!(
                    user_id = %user_id,
                    room_id = %room_id,
                    kind = ?message.kind,
                    "Unsupported event dropped"
                );
            }
            MessageKind::Join | MessageKind::Leave | MessageKind::Error => {
                tracing::warn!(
                    user_id = %user_id,
                    room_id = %room_id,
                    kind = ?message.kind,
                    "Client sent server-only event, dropped"
                );
            }
            MessageKind::Unknown => {
                tracing::warn!(user_id = %user_id, room_id = %room_id, "Unrecognised event dropped");
            }
        }
    }

    async fn handle_text(&self, message: InboundMessage) {
        let room_id = message.room_id();
        let user_id = message.user_id();

        if let Err(e) = message.validate_text() {
            tracing::debug!(user_id = %user_id, room_id = %room_id, "Rejected text: {}", e);
            self.send_to_user(room_id, user_id, OutboundMessage::error(room_id, user_id, e.to_string()))
                .await;
            return;
        }

        let outcome =
            tokio::time::timeout(self.config.persist_timeout(), self.persister.persist(&message)).await;

        let reason = match outcome {
            Ok(Ok(mut saved)) => {
                // Fan-out target and attribution always follow the connection.
                saved.room_id = room_id;
                saved.author_id = user_id;
                tracing::debug!(
                    user_id = %user_id,
                    room_id = %room_id,
                    message_id = ?saved.id,
                    "Message saved"
                );
                self.publish(saved);
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, room_id = %room_id, "Failed to save message: {}", e);
                e.message
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    room_id = %room_id,
                    timeout_ms = self.config.persist_timeout_ms,
                    "Timed out saving message"
                );
                PERSIST_TIMEOUT_REASON.to_string()
            }
        };

        self.send_to_user(room_id, user_id, OutboundMessage::error(room_id, user_id, reason))
            .await;
    }

    /// Publish `stop_typing` once the indicator expires.
    ///
    /// A later `typing` from the same user does not reset this timer.
    fn schedule_stop_typing(&self, room_id: RoomId, user_id: UserId) {
        let outbound = self.outbound_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TYPING_EXPIRY).await;
            let stop = Arc::new(OutboundMessage::stop_typing(room_id, user_id));
            if outbound.try_send(stop).is_err() {
                tracing::debug!(user_id = %user_id, room_id = %room_id, "Typing expiry dropped");
            }
        });
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Delivery
    // ════════════════════════════════════════════════════════════════════════════

    async fn fan_out(&self, message: Arc<OutboundMessage>) {
        let room_id = message.room_id;

        let stale: Vec<(UserId, ClientId)> = {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(&room_id) else {
                tracing::trace!(room_id = %room_id, "No live room, event discarded");
                return;
            };

            room.members()
                .filter_map(|client| match client.try_deliver(message.clone()) {
                    Ok(()) => None,
                    Err(DeliveryError::MailboxFull) => {
                        tracing::warn!(
                            client_id = %client.id(),
                            user_id = %client.user_id(),
                            room_id = %room_id,
                            "Slow consumer, disconnecting"
                        );
                        client.close_mailbox();
                        Some((client.user_id(), client.id()))
                    }
                    Err(DeliveryError::MailboxClosed) => Some((client.user_id(), client.id())),
                })
                .collect()
        };

        if !stale.is_empty() {
            self.evict(room_id, &stale).await;
        }
    }

    /// Deliver to one user's connection in a room.
    ///
    /// Returns true if the frame was queued. Saturation is handled as in
    /// fan-out: the connection is closed and removed.
    pub async fn send_to_user(&self, room_id: RoomId, user_id: UserId, message: OutboundMessage) -> bool {
        let message = Arc::new(message);

        let failure = {
            let rooms = self.rooms.read().await;
            let Some(client) = rooms.get(&room_id).and_then(|room| room.get(&user_id)) else {
                tracing::debug!(user_id = %user_id, room_id = %room_id, "Recipient not connected");
                return false;
            };

            match client.try_deliver(message) {
                Ok(()) => None,
                Err(e) => {
                    if e == DeliveryError::MailboxFull {
                        client.close_mailbox();
                    }
                    Some((e, client.id()))
                }
            }
        };

        match failure {
            None => true,
            Some((e, client_id)) => {
                tracing::warn!(
                    client_id = %client_id,
                    user_id = %user_id,
                    room_id = %room_id,
                    "Direct delivery failed, disconnecting: {}",
                    e
                );
                self.evict(room_id, &[(user_id, client_id)]).await;
                false
            }
        }
    }

    /// Remove connections whose mailbox is gone. No leave is announced.
    async fn evict(&self, room_id: RoomId, stale: &[(UserId, ClientId)]) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&room_id) else {
            return;
        };
        for (user_id, client_id) in stale {
            room.remove_if_current(*user_id, *client_id);
        }
        if room.is_empty() {
            rooms.remove(&room_id);
            tracing::debug!(room_id = %room_id, "Room closed");
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Introspection
    // ════════════════════════════════════════════════════════════════════════════

    /// Users currently connected to a room. Empty if the room is not live.
    pub async fn online_users(&self, room_id: &RoomId) -> Vec<UserId> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(Room::user_ids)
            .unwrap_or_default()
    }

    /// Connected users with their display names. Empty if the room is not live.
    pub async fn online_members(&self, room_id: &RoomId) -> Vec<(UserId, String)> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(Room::presence)
            .unwrap_or_default()
    }

    pub async fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms.read().await.get(room_id).map_or(0, Room::len)
    }

    pub async fn active_rooms(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Privacy flag of a live room, `None` if the room is not live.
    pub async fn room_is_private(&self, room_id: &RoomId) -> Option<bool> {
        self.rooms.read().await.get(room_id).map(Room::is_private)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Workers
    // ════════════════════════════════════════════════════════════════════════════

    async fn lifecycle_worker(
        self: Arc<Self>,
        mut events: mpsc::Receiver<LifecycleEvent>,
        mut phase: watch::Receiver<Phase>,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = reached(&mut phase, Phase::Draining) => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                LifecycleEvent::Register(client, ack) => {
                    self.add_client(client.clone()).await;
                    if ack.send(()).is_err() {
                        // Registering side went away before the ack.
                        self.remove_client(&client).await;
                    }
                }
                LifecycleEvent::Unregister(client) => self.remove_client(&client).await,
            }
        }

        self.discard_pending(events).await;
        tracing::debug!("Lifecycle worker stopped");
    }

    /// Settle lifecycle events still queued at shutdown.
    ///
    /// Pending registrations are refused: the mailbox is closed and the
    /// dropped ack fails the waiting `register`.
    async fn discard_pending(&self, mut events: mpsc::Receiver<LifecycleEvent>) {
        events.close();
        let mut refused = 0usize;
        while let Ok(event) = events.try_recv() {
            match event {
                LifecycleEvent::Register(client, _ack) => {
                    client.close_mailbox();
                    refused += 1;
                }
                LifecycleEvent::Unregister(client) => self.remove_client(&client).await,
            }
        }
        if refused > 0 {
            tracing::debug!(refused, "Refused registrations queued at shutdown");
        }
    }

    async fn inbound_worker(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut phase: watch::Receiver<Phase>,
    ) {
        loop {
            let message = tokio::select! {
                biased;
                _ = reached(&mut phase, Phase::Draining) => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            self.classify(message).await;
        }
        tracing::debug!("Inbound worker stopped");
    }

    async fn outbound_worker(
        self: Arc<Self>,
        mut outbound: mpsc::Receiver<Arc<OutboundMessage>>,
        mut phase: watch::Receiver<Phase>,
    ) {
        loop {
            let message = tokio::select! {
                biased;
                _ = reached(&mut phase, Phase::Stopped) => break,
                message = outbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            self.fan_out(message).await;
        }

        let mut flushed = 0usize;
        while let Ok(message) = outbound.try_recv() {
            self.fan_out(message).await;
            flushed += 1;
        }
        tracing::debug!(flushed, "Outbound worker stopped");
    }
}

/// Resolves once the hub has reached `target`, or its sender is gone.
async fn reached(phase: &mut watch::Receiver<Phase>, target: Phase) {
    while *phase.borrow_and_update() < target {
        if phase.changed().await.is_err() {
            return;
        }
    }
}

async fn join_worker(name: &'static str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        tracing::error!(worker = name, "Hub worker failed: {}", e);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
