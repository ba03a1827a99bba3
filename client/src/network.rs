//! Transport links between the client and the authority.
//!
//! A link is a pair of unbounded queues plus the I/O tasks feeding them. The
//! frame loop never awaits on the network: it drains the incoming queue once
//! per frame and pushes outgoing intents without waiting for acknowledgement.

use arcade_shared::{decode, encode, ClientMessage, GameFamily, ServerMessage, MAX_DATAGRAM};
use log::{debug, error, warn};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Message(ServerMessage),
    /// A datagram that failed to decode.
    Malformed { len: usize },
    /// A non-fatal socket error.
    Error(String),
}

/// The link's I/O side has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkClosed;

/// Dropping a link aborts its receiver. The sender task keeps running until
/// everything already queued has been written, then exits on its own.
pub struct Link {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    incoming: mpsc::UnboundedReceiver<LinkEvent>,
    receiver: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl Link {
    /// Binds an ephemeral UDP socket and spawns the receiver and sender tasks on `handle`.
    pub fn udp(handle: &Handle, server_addr: SocketAddr) -> Result<Link, TransportError> {
        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let std_socket = std::net::UdpSocket::bind(bind_addr).map_err(TransportError::Bind)?;
        std_socket
            .set_nonblocking(true)
            .map_err(TransportError::Bind)?;

        let _guard = handle.enter();
        let socket = Arc::new(UdpSocket::from_std(std_socket).map_err(TransportError::Bind)?);

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let receiver = handle.spawn(Self::run_receiver(Arc::clone(&socket), server_addr, in_tx));
        let sender = handle.spawn(Self::run_sender(socket, server_addr, out_rx));

        Ok(Link {
            outgoing: out_tx,
            incoming: in_rx,
            receiver: Some(receiver),
            sender: Some(sender),
        })
    }

    /// A link backed only by queues, with the authority side handed back to the caller.
    pub fn in_memory() -> (Link, AuthorityEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let link = Link {
            outgoing: out_tx,
            incoming: in_rx,
            receiver: None,
            sender: None,
        };
        let end = AuthorityEnd {
            inbox: out_rx,
            outbox: in_tx,
        };
        (link, end)
    }

    async fn run_receiver(
        socket: Arc<UdpSocket>,
        server_addr: SocketAddr,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) {
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        loop {
            let event = match socket.recv_from(&mut buffer).await {
                Ok((len, addr)) if addr == server_addr => {
                    match decode::<ServerMessage>(&buffer[..len]) {
                        Ok(message) => LinkEvent::Message(message),
                        Err(e) => {
                            warn!("Failed to decode {} byte datagram: {}", len, e);
                            LinkEvent::Malformed { len }
                        }
                    }
                }
                Ok((_, addr)) => {
                    debug!("Ignoring datagram from unknown peer {}", addr);
                    continue;
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    LinkEvent::Error(e.to_string())
                }
            };

            if events.send(event).is_err() {
                break;
            }
        }
    }

    async fn run_sender(
        socket: Arc<UdpSocket>,
        server_addr: SocketAddr,
        mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        while let Some(message) = outgoing.recv().await {
            let data = match encode(&message) {
                Ok(data) => data,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", message, e);
                    continue;
                }
            };

            if let Err(e) = socket.send_to(&data, server_addr).await {
                error!("Failed to send packet to {}: {}", server_addr, e);
            }
        }
        debug!("Sender for {} drained", server_addr);
    }

    pub fn send(&self, message: ClientMessage) -> Result<(), LinkClosed> {
        self.outgoing.send(message).map_err(|_| LinkClosed)
    }

    /// Next queued event, `None` when the queue is currently empty.
    pub fn try_next(&mut self) -> Result<Option<LinkEvent>, LinkClosed> {
        match self.incoming.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LinkClosed),
        }
    }

    /// Stops receiving and hands back the sender task, which finishes once the
    /// queued messages are on the wire.
    pub fn close(mut self) -> Option<JoinHandle<()>> {
        self.sender.take()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

/// The authority's side of an in-memory link.
pub struct AuthorityEnd {
    inbox: mpsc::UnboundedReceiver<ClientMessage>,
    outbox: mpsc::UnboundedSender<LinkEvent>,
}

impl AuthorityEnd {
    pub fn push(&self, message: ServerMessage) -> bool {
        self.outbox.send(LinkEvent::Message(message)).is_ok()
    }

    pub fn push_event(&self, event: LinkEvent) -> bool {
        self.outbox.send(event).is_ok()
    }

    /// Everything the client has sent since the last call.
    pub fn received(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Whether the client still holds the link.
    pub fn is_connected(&self) -> bool {
        !self.outbox.is_closed()
    }
}

/// Builds a fresh link for a family on every (re)connect.
pub trait Connector {
    fn link(&mut self, family: GameFamily) -> Result<Link, TransportError>;
}

pub struct UdpConnector {
    handle: Handle,
    server_addr: SocketAddr,
}

impl UdpConnector {
    pub fn new(handle: Handle, server_addr: SocketAddr) -> Self {
        Self {
            handle,
            server_addr,
        }
    }
}

impl Connector for UdpConnector {
    fn link(&mut self, family: GameFamily) -> Result<Link, TransportError> {
        debug!("Opening {} link to {}", family, self.server_addr);
        Link::udp(&self.handle, self.server_addr)
    }
}

/// Connector handing out in-memory links. Clones share the same authority ends.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    ends: Arc<Mutex<Vec<(GameFamily, AuthorityEnd)>>>,
    links_made: Arc<Mutex<Vec<GameFamily>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the most recent authority end created for `family`.
    pub fn take_end(&self, family: GameFamily) -> Option<AuthorityEnd> {
        let mut ends = self.ends.lock().unwrap_or_else(|e| e.into_inner());
        let position = ends.iter().rposition(|(f, _)| *f == family)?;
        Some(ends.remove(position).1)
    }

    pub fn links_made(&self, family: GameFamily) -> usize {
        let made = self.links_made.lock().unwrap_or_else(|e| e.into_inner());
        made.iter().filter(|f| **f == family).count()
    }
}

impl Connector for MemoryConnector {
    fn link(&mut self, family: GameFamily) -> Result<Link, TransportError> {
        let (link, end) = Link::in_memory();
        self.ends
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((family, end));
        self.links_made
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(family);
        Ok(link)
    }
}
