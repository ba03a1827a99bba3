//! Connection management: one channel per game family.
//!
//! The manager owns the handshake, the retry budget and each channel's listener
//! registry. Whenever a channel is about to be reconnected or closed, its
//! listener set is cleared first so stale handlers can never see traffic from
//! the replacement link.

use arcade_shared::{ClientMessage, GameFamily, ServerMessage, PROTOCOL_VERSION};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::RetryPolicy;
use crate::error::{ClientError, LifecycleError, TransportError};
use crate::listeners::{Delivery, ListenerRegistry, Purpose, SubscriptionHandle};
use crate::network::{Connector, Link, LinkEvent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelState {
    Connecting { attempt: u32, since: Instant },
    /// Waiting to make `attempt`.
    Backoff { attempt: u32, until: Instant },
    Open { client_id: u32, last_heard: Instant },
    /// Retry budget exhausted or never opened. Needs an explicit `open`.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened { family: GameFamily, client_id: u32 },
    Delivered { family: GameFamily, delivery: Delivery },
    Retrying { family: GameFamily, attempt: u32 },
    Lost { family: GameFamily, reason: String },
    GaveUp { family: GameFamily, attempts: u32 },
}

pub struct Channel {
    family: GameFamily,
    state: ChannelState,
    link: Option<Link>,
    listeners: ListenerRegistry,
}

impl Channel {
    fn new(family: GameFamily) -> Self {
        Self {
            family,
            state: ChannelState::Closed,
            link: None,
            listeners: ListenerRegistry::new(family),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    channels: BTreeMap<GameFamily, Channel>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            channels: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Opens the family's channel. Does nothing if it is already open or
    /// connecting; a `Closed` channel is reopened with a fresh retry budget.
    pub fn open(&mut self, family: GameFamily, now: Instant) -> Vec<ChannelEvent> {
        let channel = self
            .channels
            .entry(family)
            .or_insert_with(|| Channel::new(family));

        if channel.state != ChannelState::Closed {
            debug!("{} channel already {:?}", family, channel.state);
            return Vec::new();
        }

        info!("Opening {} channel", family);
        let mut events = Vec::new();
        start_attempt(&mut self.connector, &self.policy, channel, 1, now, &mut events);
        events
    }

    /// Clears the channel's listeners, says goodbye and closes the link.
    ///
    /// Anything already queued, the goodbye included, is still written out.
    /// The returned task completes once it is.
    pub fn close(&mut self, family: GameFamily) -> Option<JoinHandle<()>> {
        let mut channel = self.channels.remove(&family)?;
        let removed = channel.listeners.clear();
        info!("Closed {} channel ({} listeners removed)", family, removed);

        let link = channel.link.take()?;
        if matches!(channel.state, ChannelState::Open { .. }) {
            let _ = link.send(ClientMessage::Disconnect);
        }
        link.close()
    }

    /// Closes every channel and returns the sends still draining.
    pub fn close_all(&mut self) -> Vec<JoinHandle<()>> {
        let families: Vec<GameFamily> = self.channels.keys().copied().collect();
        families
            .into_iter()
            .filter_map(|family| self.close(family))
            .collect()
    }

    pub fn send(&mut self, family: GameFamily, message: ClientMessage) -> Result<(), TransportError> {
        let channel = self
            .channels
            .get(&family)
            .ok_or(TransportError::NotOpen(family))?;

        match (&channel.state, &channel.link) {
            (ChannelState::Open { .. }, Some(link)) => link
                .send(message)
                .map_err(|_| TransportError::LinkClosed(family)),
            _ => Err(TransportError::NotOpen(family)),
        }
    }

    pub fn subscribe(
        &mut self,
        family: GameFamily,
        purpose: Purpose,
    ) -> Result<SubscriptionHandle, ClientError> {
        let channel = self
            .channels
            .get_mut(&family)
            .ok_or(TransportError::NotOpen(family))?;
        Ok(channel.listeners.subscribe(purpose)?)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), LifecycleError> {
        let channel = self
            .channels
            .get_mut(&handle.family())
            .ok_or(LifecycleError::UnknownSubscription(handle.id()))?;
        channel.listeners.unsubscribe(handle)
    }

    pub fn is_subscribed(&self, handle: &SubscriptionHandle) -> bool {
        self.channels
            .get(&handle.family())
            .is_some_and(|c| c.listeners.is_subscribed(handle))
    }

    /// Live subscriptions across every channel.
    pub fn listener_count(&self) -> usize {
        self.channels.values().map(|c| c.listeners.len()).sum()
    }

    pub fn channel(&self, family: GameFamily) -> Option<&Channel> {
        self.channels.get(&family)
    }

    pub fn state(&self, family: GameFamily) -> Option<ChannelState> {
        self.channels.get(&family).map(|c| c.state)
    }

    pub fn is_open(&self, family: GameFamily) -> bool {
        matches!(self.state(family), Some(ChannelState::Open { .. }))
    }

    pub fn open_families(&self) -> Vec<GameFamily> {
        self.channels.keys().copied().collect()
    }

    /// Drains every link and advances handshakes, timeouts and backoff.
    pub fn poll(&mut self, now: Instant) -> Vec<ChannelEvent> {
        let mut events = Vec::new();

        for channel in self.channels.values_mut() {
            match channel.state {
                ChannelState::Connecting { attempt, since } => {
                    poll_handshake(
                        &mut self.connector,
                        &self.policy,
                        channel,
                        attempt,
                        since,
                        now,
                        &mut events,
                    );
                }
                ChannelState::Open { .. } => {
                    poll_open(&self.policy, channel, now, &mut events);
                }
                ChannelState::Backoff { attempt, until } if now >= until => {
                    start_attempt(
                        &mut self.connector,
                        &self.policy,
                        channel,
                        attempt,
                        now,
                        &mut events,
                    );
                }
                ChannelState::Backoff { .. } | ChannelState::Closed => {}
            }
        }

        events
    }
}

fn start_attempt<C: Connector>(
    connector: &mut C,
    policy: &RetryPolicy,
    channel: &mut Channel,
    attempt: u32,
    now: Instant,
    events: &mut Vec<ChannelEvent>,
) {
    let family = channel.family;
    let link = match connector.link(family) {
        Ok(link) => link,
        Err(e) => {
            warn!("{} connect attempt {} failed: {}", family, attempt, e);
            fail_attempt(policy, channel, attempt, now, events);
            return;
        }
    };

    let hello = ClientMessage::Connect {
        family,
        client_version: PROTOCOL_VERSION,
    };
    if link.send(hello).is_err() {
        warn!("{} link closed before handshake", family);
        fail_attempt(policy, channel, attempt, now, events);
        return;
    }

    debug!("{} connect attempt {}", family, attempt);
    channel.link = Some(link);
    channel.state = ChannelState::Connecting {
        attempt,
        since: now,
    };
}

fn fail_attempt(
    policy: &RetryPolicy,
    channel: &mut Channel,
    attempt: u32,
    now: Instant,
    events: &mut Vec<ChannelEvent>,
) {
    let family = channel.family;
    channel.listeners.clear();
    channel.link = None;

    if attempt >= policy.max_attempts {
        warn!("{} channel giving up after {} attempts", family, attempt);
        channel.state = ChannelState::Closed;
        events.push(ChannelEvent::GaveUp {
            family,
            attempts: attempt,
        });
    } else {
        channel.state = ChannelState::Backoff {
            attempt: attempt + 1,
            until: now + policy.backoff,
        };
        events.push(ChannelEvent::Retrying {
            family,
            attempt: attempt + 1,
        });
    }
}

fn poll_handshake<C: Connector>(
    connector: &mut C,
    policy: &RetryPolicy,
    channel: &mut Channel,
    attempt: u32,
    since: Instant,
    now: Instant,
    events: &mut Vec<ChannelEvent>,
) {
    let family = channel.family;
    let Some(link) = channel.link.as_mut() else {
        fail_attempt(policy, channel, attempt, now, events);
        return;
    };

    loop {
        match link.try_next() {
            Ok(Some(LinkEvent::Message(ServerMessage::Connected { client_id }))) => {
                info!("{} channel open, client id {}", family, client_id);
                channel.state = ChannelState::Open {
                    client_id,
                    last_heard: now,
                };
                events.push(ChannelEvent::Opened { family, client_id });
                // Anything already queued behind the handshake belongs to the open channel.
                poll_open(policy, channel, now, events);
                return;
            }
            Ok(Some(event)) => debug!("{} ignoring {:?} during handshake", family, event),
            Ok(None) => break,
            Err(_) => {
                warn!("{} link closed during handshake", family);
                fail_attempt(policy, channel, attempt, now, events);
                return;
            }
        }
    }

    if now.duration_since(since) >= policy.handshake_timeout {
        warn!("{} handshake attempt {} timed out", family, attempt);
        fail_attempt(policy, channel, attempt, now, events);
        if let ChannelState::Backoff { attempt, until } = channel.state {
            if until <= now {
                start_attempt(connector, policy, channel, attempt, now, events);
            }
        }
    }
}

fn poll_open(
    policy: &RetryPolicy,
    channel: &mut Channel,
    now: Instant,
    events: &mut Vec<ChannelEvent>,
) {
    let family = channel.family;
    let ChannelState::Open {
        client_id,
        mut last_heard,
    } = channel.state
    else {
        return;
    };
    let Some(link) = channel.link.as_mut() else {
        lose(policy, channel, "link missing".to_string(), now, events);
        return;
    };

    let mut lost = None;
    loop {
        match link.try_next() {
            Ok(Some(LinkEvent::Message(ServerMessage::Disconnected { reason }))) => {
                lost = Some(reason);
                break;
            }
            Ok(Some(LinkEvent::Message(ServerMessage::Connected { .. }))) => {
                last_heard = now;
                debug!("{} duplicate handshake reply ignored", family);
            }
            Ok(Some(LinkEvent::Message(message))) => {
                last_heard = now;
                if let Some(delivery) = channel.listeners.route(message) {
                    events.push(ChannelEvent::Delivered { family, delivery });
                }
            }
            Ok(Some(LinkEvent::Malformed { len })) => {
                last_heard = now;
                warn!("{} discarded malformed message ({} bytes)", family, len);
            }
            Ok(Some(LinkEvent::Error(e))) => warn!("{} transport error: {}", family, e),
            Ok(None) => break,
            Err(_) => {
                lost = Some("link closed".to_string());
                break;
            }
        }
    }

    if lost.is_none() && now.duration_since(last_heard) >= policy.silence_timeout {
        lost = Some("authority went silent".to_string());
    }

    match lost {
        Some(reason) => lose(policy, channel, reason, now, events),
        None => {
            channel.state = ChannelState::Open {
                client_id,
                last_heard,
            }
        }
    }
}

/// Mid-session drop: listeners go first, then the link, then a reconnect is scheduled.
fn lose(
    policy: &RetryPolicy,
    channel: &mut Channel,
    reason: String,
    now: Instant,
    events: &mut Vec<ChannelEvent>,
) {
    let family = channel.family;
    let removed = channel.listeners.clear();
    channel.link = None;
    warn!(
        "{} channel lost: {} ({} listeners removed)",
        family, reason, removed
    );

    channel.state = ChannelState::Backoff {
        attempt: 1,
        until: now + policy.backoff,
    };
    events.push(ChannelEvent::Lost { family, reason });
}
