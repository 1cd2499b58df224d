//! One physical WebSocket connection.
//!
//! A [`Client`] owns the connection's identity and its bounded mailbox.
//! Two loops run per connection, coordinated only through the mailbox and
//! the hub's unregister path:
//!
//! ```text
//!   socket ──► read_loop ──► Hub inbound queue
//!                 │
//!                 └── on exit: Hub::unregister ──► mailbox closed
//!
//!   Hub fan-out ──► mailbox ──► write_loop ──► socket
//!                                  │
//!                                  └── mailbox closed: close frame, exit
//! ```

use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::HubConfig;
use crate::domain::chat::{InboundFrame, OutboundMessage};
use crate::domain::foundation::{ClientId, RoomId, Timestamp, UserId};

use super::hub::Hub;

/// Receiving end of a client's mailbox, drained by its write loop.
pub type MailboxReceiver = mpsc::Receiver<Arc<OutboundMessage>>;

/// Why a non-blocking push onto a mailbox did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The consumer is not keeping up.
    #[error("mailbox is full")]
    MailboxFull,

    /// The mailbox was closed (unregistered, evicted, or write loop gone).
    #[error("mailbox is closed")]
    MailboxClosed,
}

/// Heartbeat and deadline settings for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTiming {
    /// Read deadline, pushed forward by every pong.
    pub pong_wait: Duration,
    /// Interval between keepalive pings.
    pub ping_period: Duration,
    /// Deadline for writing a single frame.
    pub write_wait: Duration,
}

impl From<&HubConfig> for ConnectionTiming {
    fn from(config: &HubConfig) -> Self {
        Self {
            pong_wait: config.pong_wait(),
            ping_period: config.ping_period(),
            write_wait: config.write_wait(),
        }
    }
}

/// Runtime state of one open connection.
///
/// A client belongs to exactly one room for its whole life. Identity is
/// fixed at construction from the authenticated session.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    user_id: UserId,
    username: String,
    room_id: RoomId,
    room_is_private: bool,
    connected_at: Timestamp,
    last_heartbeat: Mutex<Timestamp>,
    /// `None` once closed. The lock makes closing idempotent across the
    /// fan-out worker and the unregister path.
    mailbox: Mutex<Option<mpsc::Sender<Arc<OutboundMessage>>>>,
}

impl Client {
    /// Create a client and the receiving end of its mailbox.
    ///
    /// `room_is_private` mirrors the durable room record and seeds the live
    /// room if this client is the first to register.
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        room_id: RoomId,
        room_is_private: bool,
        mailbox_capacity: usize,
    ) -> (Arc<Self>, MailboxReceiver) {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let now = Timestamp::now();
        let client = Self {
            id: ClientId::new(),
            user_id,
            username: username.into(),
            room_id,
            room_is_private,
            connected_at: now,
            last_heartbeat: Mutex::new(now),
            mailbox: Mutex::new(Some(tx)),
        };
        (Arc::new(client), rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn room_is_private(&self) -> bool {
        self.room_is_private
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn last_heartbeat(&self) -> Timestamp {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that the peer answered a ping.
    pub fn touch_heartbeat(&self) {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Timestamp::now();
    }

    /// Push a frame onto the mailbox without waiting.
    pub fn try_deliver(&self, message: Arc<OutboundMessage>) -> Result<(), DeliveryError> {
        let mailbox = self.lock_mailbox();
        let sender = mailbox.as_ref().ok_or(DeliveryError::MailboxClosed)?;
        sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::MailboxFull,
            TrySendError::Closed(_) => DeliveryError::MailboxClosed,
        })
    }

    /// Close the mailbox. Returns true only for the call that closed it.
    ///
    /// Frames already queued are still drained by the write loop, which then
    /// sends a close frame and exits.
    pub fn close_mailbox(&self) -> bool {
        self.lock_mailbox().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_mailbox().is_none()
    }

    fn lock_mailbox(&self) -> MutexGuard<'_, Option<mpsc::Sender<Arc<OutboundMessage>>>> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drive an upgraded socket until either side of it ends.
///
/// If the read side ends first it has already unregistered the client, so
/// the write side is left to flush the mailbox and say goodbye. If the write
/// side ends first (write error, eviction, shutdown) the read side is
/// aborted and the client is unregistered here.
pub async fn serve(
    hub: Arc<Hub>,
    client: Arc<Client>,
    mailbox: MailboxReceiver,
    socket: WebSocket,
    timing: ConnectionTiming,
) {
    let (sink, stream) = socket.split();

    let mut write_task = tokio::spawn(write_loop(client.clone(), mailbox, sink, timing));
    let mut read_task = tokio::spawn(read_loop(
        hub.clone(),
        client.clone(),
        stream,
        timing.pong_wait,
    ));

    tokio::select! {
        _ = &mut read_task => {
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            read_task.abort();
            hub.unregister(&client).await;
        }
    }

    tracing::debug!(
        client_id = %client.id(),
        user_id = %client.user_id(),
        room_id = %client.room_id(),
        "Connection closed"
    );
}

/// Decode frames off the wire and forward them to the hub.
///
/// Exits on peer close, transport error, malformed frame, or when no pong
/// arrives within `pong_wait`. Always unregisters the client on the way out.
pub async fn read_loop<S, E>(hub: Arc<Hub>, client: Arc<Client>, mut stream: S, pong_wait: Duration)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let message = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!(client_id = %client.id(), "Receive error: {}", e);
                break;
            }
            Ok(None) => {
                tracing::debug!(client_id = %client.id(), "Peer went away");
                break;
            }
            Err(_) => {
                tracing::debug!(client_id = %client.id(), "Read deadline elapsed");
                break;
            }
        };

        let decoded = match message {
            Message::Text(text) => serde_json::from_str::<InboundFrame>(&text),
            Message::Binary(bytes) => serde_json::from_slice::<InboundFrame>(&bytes),
            Message::Pong(_) => {
                client.touch_heartbeat();
                deadline = Instant::now() + pong_wait;
                continue;
            }
            // Answered by the protocol layer.
            Message::Ping(_) => continue,
            Message::Close(_) => {
                tracing::debug!(client_id = %client.id(), "Client sent close frame");
                break;
            }
        };

        match decoded {
            Ok(frame) => {
                let inbound = frame.stamp(client.user_id(), client.room_id());
                hub.submit(inbound);
            }
            Err(e) => {
                tracing::debug!(client_id = %client.id(), "Malformed frame: {}", e);
                break;
            }
        }
    }

    hub.unregister(&client).await;
}

/// Errors that end the write loop.
#[derive(Debug, Error)]
enum WriteError {
    #[error("write deadline elapsed")]
    Deadline,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Drain the mailbox onto the wire, pinging when idle.
///
/// Exits when the mailbox is closed (after sending a close frame) or when a
/// write fails or misses its deadline.
pub async fn write_loop<W>(
    client: Arc<Client>,
    mut mailbox: MailboxReceiver,
    mut sink: W,
    timing: ConnectionTiming,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut heartbeat =
        tokio::time::interval_at(Instant::now() + timing.ping_period, timing.ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            next = mailbox.recv() => {
                let Some(message) = next else {
                    let _ = send_with_deadline(&mut sink, Message::Close(None), timing.write_wait).await;
                    break;
                };

                let json = match serde_json::to_string(message.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(client_id = %client.id(), "Failed to encode frame: {}", e);
                        continue;
                    }
                };

                if let Err(e) = send_with_deadline(&mut sink, Message::Text(json), timing.write_wait).await {
                    tracing::debug!(client_id = %client.id(), "Send error, closing connection: {}", e);
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = send_with_deadline(&mut sink, Message::Ping(Vec::new()), timing.write_wait).await {
                    tracing::debug!(client_id = %client.id(), "Ping failed, closing connection: {}", e);
                    break;
                }
            }
        }
    }

    let _ = tokio::time::timeout(timing.write_wait, sink.close()).await;
}

async fn send_with_deadline<W>(
    sink: &mut W,
    frame: Message,
    deadline: Duration,
) -> Result<(), WriteError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match tokio::time::timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Transport(e.to_string())),
        Err(_) => Err(WriteError::Deadline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryMessagePersister;
    use crate::domain::chat::MessageKind;
    use futures::channel::mpsc as wire;

    fn timing() -> ConnectionTiming {
        ConnectionTiming {
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
        }
    }

    fn test_client(capacity: usize) -> (Arc<Client>, MailboxReceiver) {
        Client::new(UserId::new(), "tester", RoomId::new(), false, capacity)
    }

    fn frame(kind: MessageKind) -> Arc<OutboundMessage> {
        let mut msg = OutboundMessage::typing(RoomId::new(), UserId::new());
        msg.kind = kind;
        Arc::new(msg)
    }

    #[test]
    fn try_deliver_reports_full_mailbox() {
        let (client, _rx) = test_client(1);

        assert!(client.try_deliver(frame(MessageKind::Typing)).is_ok());
        assert_eq!(
            client.try_deliver(frame(MessageKind::Typing)),
            Err(DeliveryError::MailboxFull)
        );
    }

    #[test]
    fn close_mailbox_is_idempotent() {
        let (client, _rx) = test_client(4);

        assert!(client.close_mailbox());
        assert!(!client.close_mailbox());
        assert!(client.is_closed());
        assert_eq!(
            client.try_deliver(frame(MessageKind::Typing)),
            Err(DeliveryError::MailboxClosed)
        );
    }

    #[test]
    fn dropped_receiver_reads_as_closed() {
        let (client, rx) = test_client(4);
        drop(rx);

        assert_eq!(
            client.try_deliver(frame(MessageKind::Typing)),
            Err(DeliveryError::MailboxClosed)
        );
    }

    #[test]
    fn touch_heartbeat_moves_forward() {
        let (client, _rx) = test_client(1);
        let before = client.last_heartbeat();
        std::thread::sleep(Duration::from_millis(5));
        client.touch_heartbeat();
        assert!(before.is_before(&client.last_heartbeat()));
        assert!(!client.connected_at().is_before(&before));
    }

    #[tokio::test]
    async fn write_loop_drains_mailbox_then_sends_close() {
        let (client, rx) = test_client(8);
        let (sink, mut wire_rx) = wire::unbounded::<Message>();

        client.try_deliver(frame(MessageKind::Typing)).unwrap();
        client.try_deliver(frame(MessageKind::StopTyping)).unwrap();
        client.close_mailbox();

        write_loop(client.clone(), rx, sink, timing()).await;

        let first = wire_rx.next().await.unwrap();
        let second = wire_rx.next().await.unwrap();
        let third = wire_rx.next().await.unwrap();

        assert!(matches!(first, Message::Text(ref t) if t.contains(r#""type":"typing""#)));
        assert!(matches!(second, Message::Text(ref t) if t.contains(r#""type":"stop_typing""#)));
        assert!(matches!(third, Message::Close(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn write_loop_pings_when_idle() {
        let (client, rx) = test_client(8);
        let (sink, mut wire_rx) = wire::unbounded::<Message>();

        let task = tokio::spawn(write_loop(client.clone(), rx, sink, timing()));

        let first = wire_rx.next().await.unwrap();
        assert!(matches!(first, Message::Ping(_)));

        client.close_mailbox();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn write_loop_exits_when_transport_is_gone() {
        let (client, rx) = test_client(8);
        let (sink, wire_rx) = wire::unbounded::<Message>();
        drop(wire_rx);

        client.try_deliver(frame(MessageKind::Typing)).unwrap();

        // Returns instead of hanging: the failed write ends the loop.
        write_loop(client.clone(), rx, sink, timing()).await;
    }

    /// Unregister goes through the hub's lifecycle queue.
    async fn wait_closed(client: &Arc<Client>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !client.is_closed() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("client was not unregistered");
    }

    fn running_hub() -> Arc<Hub> {
        let hub = Hub::new(
            HubConfig::default(),
            Arc::new(InMemoryMessagePersister::new()),
        );
        hub.run().unwrap();
        hub
    }

    #[tokio::test]
    async fn read_loop_unregisters_on_malformed_frame() {
        let hub = running_hub();
        let (client, _rx) = test_client(8);
        hub.register(client.clone()).await.unwrap();

        let (wire_tx, stream) = wire::unbounded::<Result<Message, String>>();
        wire_tx
            .unbounded_send(Ok(Message::Text("{not json".to_string())))
            .unwrap();

        read_loop(hub.clone(), client.clone(), stream, Duration::from_secs(60)).await;

        wait_closed(&client).await;
    }

    #[tokio::test]
    async fn read_loop_unregisters_on_peer_close() {
        let hub = running_hub();
        let (client, _rx) = test_client(8);

        let (wire_tx, stream) = wire::unbounded::<Result<Message, String>>();
        wire_tx.unbounded_send(Ok(Message::Close(None))).unwrap();

        read_loop(hub.clone(), client.clone(), stream, Duration::from_secs(60)).await;

        wait_closed(&client).await;
    }

    #[tokio::test(start_paused = true)]
    async fn read_loop_gives_up_without_pong() {
        let hub = running_hub();
        let (client, _rx) = test_client(8);
        let (_wire_tx, stream) = wire::unbounded::<Result<Message, String>>();

        let started = Instant::now();
        read_loop(hub.clone(), client.clone(), stream, Duration::from_secs(60)).await;

        assert!(started.elapsed() >= Duration::from_secs(60));
        wait_closed(&client).await;
    }

    #[tokio::test(start_paused = true)]
    async fn pong_extends_read_deadline() {
        let hub = running_hub();
        let (client, _rx) = test_client(8);
        let (wire_tx, stream) = wire::unbounded::<Result<Message, String>>();

        let started = Instant::now();
        let task = tokio::spawn(read_loop(
            hub.clone(),
            client.clone(),
            stream,
            Duration::from_secs(60),
        ));

        tokio::time::sleep(Duration::from_secs(50)).await;
        wire_tx.unbounded_send(Ok(Message::Pong(Vec::new()))).unwrap();

        task.await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(110));
    }
}
