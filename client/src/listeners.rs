//! Per-channel listener sets with handle-based teardown.
//!
//! Every subscription returns a handle that the owner keeps and hands back to
//! remove it. A channel accepts at most one live subscription per purpose, so a
//! message is never delivered twice no matter how many times a mode is entered.

use arcade_shared::{GameFamily, MessageKind, ServerMessage};
use log::debug;

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Matchmaking,
    Snapshots,
    Lifecycle,
}

impl Purpose {
    pub fn for_kind(kind: MessageKind) -> Option<Purpose> {
        match kind {
            MessageKind::Queued | MessageKind::MatchFound => Some(Purpose::Matchmaking),
            MessageKind::StateUpdate | MessageKind::BallExplode => Some(Purpose::Snapshots),
            MessageKind::Error | MessageKind::OpponentLeft => Some(Purpose::Lifecycle),
            // Handshake traffic belongs to the connection itself.
            MessageKind::Connected | MessageKind::Disconnected => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    family: GameFamily,
    purpose: Purpose,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn family(&self) -> GameFamily {
        self.family
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }
}

/// A message routed to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub handle: SubscriptionHandle,
    pub message: ServerMessage,
}

#[derive(Debug)]
pub struct ListenerRegistry {
    family: GameFamily,
    next_id: u64,
    subscriptions: Vec<SubscriptionHandle>,
}

impl ListenerRegistry {
    pub fn new(family: GameFamily) -> Self {
        Self {
            family,
            next_id: 1,
            subscriptions: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, purpose: Purpose) -> Result<SubscriptionHandle, LifecycleError> {
        if self.subscriptions.iter().any(|s| s.purpose == purpose) {
            return Err(LifecycleError::DuplicateListener {
                family: self.family,
                purpose,
            });
        }

        let handle = SubscriptionHandle {
            id: self.next_id,
            family: self.family,
            purpose,
        };
        self.next_id += 1;
        self.subscriptions.push(handle);
        debug!("{}: subscribed {:?} ({})", self.family, purpose, handle.id);
        Ok(handle)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), LifecycleError> {
        let position = self
            .subscriptions
            .iter()
            .position(|s| *s == handle)
            .ok_or(LifecycleError::UnknownSubscription(handle.id))?;
        self.subscriptions.remove(position);
        debug!("{}: unsubscribed {:?} ({})", self.family, handle.purpose, handle.id);
        Ok(())
    }

    /// Removes every subscription and returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.subscriptions.len();
        self.subscriptions.clear();
        removed
    }

    pub fn is_subscribed(&self, handle: &SubscriptionHandle) -> bool {
        self.subscriptions.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn route(&self, message: ServerMessage) -> Option<Delivery> {
        let purpose = Purpose::for_kind(message.kind())?;
        match self.subscriptions.iter().find(|s| s.purpose == purpose) {
            Some(handle) => Some(Delivery {
                handle: *handle,
                message,
            }),
            None => {
                debug!(
                    "{}: dropping {:?}, no {:?} listener",
                    self.family,
                    message.kind(),
                    purpose
                );
                None
            }
        }
    }
}
