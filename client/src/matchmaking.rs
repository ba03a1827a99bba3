//! Queue, solo and cancel intents plus the match-assignment guard.
//!
//! The client moves from queued to in-match at most once per room id. Any
//! assignment for a room the client is not waiting on (because it was
//! cancelled, quit, already bound, or simply never announced) is rejected.
//!
//! The authority answers every join with one `Queued` ack and every solo start
//! with one `MatchFound`, in order, even when the client has already moved on.
//! Intents replaced before their answer arrived are counted per family, and
//! the next answers of that kind are consumed as stale instead of binding.

use arcade_shared::{ClientMessage, GameFamily, Identity, RoomId, Seat};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

use crate::error::ProtocolError;

/// The bound match: created on assignment, dropped on quit, game over or disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomHandle {
    pub room_id: RoomId,
    pub family: GameFamily,
    pub seat: Seat,
    pub opponent: Option<String>,
    pub solo: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchmakingState {
    Idle,
    Queued {
        family: GameFamily,
        awaiting: Option<RoomId>,
    },
    /// Solo start requested; no queue involved.
    Starting { family: GameFamily },
    InMatch { room: RoomHandle },
}

impl MatchmakingState {
    fn family(&self) -> Option<GameFamily> {
        match self {
            MatchmakingState::Idle => None,
            MatchmakingState::Queued { family, .. } | MatchmakingState::Starting { family } => {
                Some(*family)
            }
            MatchmakingState::InMatch { room } => Some(room.family),
        }
    }
}

/// Answers still owed for intents the client gave up on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outstanding {
    /// Joins whose `Queued` ack has not arrived.
    pub acks: usize,
    /// Solo starts whose `MatchFound` has not arrived.
    pub solos: usize,
}

impl Outstanding {
    fn is_empty(&self) -> bool {
        self.acks == 0 && self.solos == 0
    }
}

#[derive(Debug)]
pub struct MatchmakingClient {
    state: MatchmakingState,
    abandoned: HashSet<RoomId>,
    bound: HashSet<RoomId>,
    outstanding: HashMap<GameFamily, Outstanding>,
}

impl MatchmakingClient {
    pub fn new() -> Self {
        Self {
            state: MatchmakingState::Idle,
            abandoned: HashSet::new(),
            bound: HashSet::new(),
            outstanding: HashMap::new(),
        }
    }

    pub fn state(&self) -> &MatchmakingState {
        &self.state
    }

    pub fn room(&self) -> Option<&RoomHandle> {
        match &self.state {
            MatchmakingState::InMatch { room } => Some(room),
            _ => None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(
            self.state,
            MatchmakingState::Queued { .. } | MatchmakingState::Starting { .. }
        )
    }

    pub fn outstanding(&self, family: GameFamily) -> Outstanding {
        self.outstanding.get(&family).copied().unwrap_or_default()
    }

    /// The family's channel went away, and with it every answer still owed on it.
    pub fn forget(&mut self, family: GameFamily) {
        if let Some(dropped) = self.outstanding.remove(&family) {
            debug!("Forgetting {:?} owed on the {} channel", dropped, family);
        }
    }

    /// Two-sided queue for the paddle or tower family.
    pub fn join_queue(&mut self, family: GameFamily, identity: &Identity) -> ClientMessage {
        self.abandon_pending();
        self.state = MatchmakingState::Queued {
            family,
            awaiting: None,
        };
        info!("{} queue joined as {}", family, identity.username);
        ClientMessage::JoinQueue {
            identity: identity.clone(),
        }
    }

    pub fn join_tri_queue(&mut self, identity: &Identity) -> ClientMessage {
        self.abandon_pending();
        self.state = MatchmakingState::Queued {
            family: GameFamily::Tri,
            awaiting: None,
        };
        info!("tri queue joined as {}", identity.username);
        ClientMessage::JoinTriQueue {
            identity: identity.clone(),
        }
    }

    pub fn start_solo(&mut self, family: GameFamily, identity: &Identity) -> ClientMessage {
        self.abandon_pending();
        self.state = MatchmakingState::Starting { family };
        info!("{} solo start requested", family);
        ClientMessage::StartSolo {
            identity: identity.clone(),
        }
    }

    /// Leaves the queue. Returns the message to send, if there was anything to cancel.
    pub fn cancel(&mut self) -> Option<ClientMessage> {
        if !self.is_waiting() {
            return None;
        }
        self.abandon_pending();
        self.state = MatchmakingState::Idle;
        Some(ClientMessage::CancelQueue)
    }

    /// The authority names the room this client now waits on.
    pub fn on_queued(&mut self, room_id: RoomId) -> Result<(), ProtocolError> {
        if self.abandoned.contains(&room_id) || self.bound.contains(&room_id) {
            return Err(ProtocolError::StaleAssignment(room_id));
        }

        if let Some(family) = self.state.family() {
            let owed = self.outstanding.entry(family).or_default();
            if owed.acks > 0 {
                owed.acks -= 1;
                info!("Ack for room {} answers an abandoned join", room_id);
                self.abandoned.insert(room_id.clone());
                return Err(ProtocolError::StaleAssignment(room_id));
            }
        }

        match &mut self.state {
            MatchmakingState::Queued { awaiting, .. } => {
                if let Some(previous) = awaiting.replace(room_id) {
                    self.abandoned.insert(previous);
                }
                Ok(())
            }
            _ => Err(ProtocolError::StaleAssignment(room_id)),
        }
    }

    pub fn on_match_found(
        &mut self,
        room_id: RoomId,
        seat: Seat,
        opponent: Option<String>,
    ) -> Result<RoomHandle, ProtocolError> {
        if self.abandoned.contains(&room_id) || self.bound.contains(&room_id) {
            warn!("Discarding assignment for stale room {}", room_id);
            return Err(ProtocolError::StaleAssignment(room_id));
        }

        let awaited = matches!(
            &self.state,
            MatchmakingState::Queued { awaiting: Some(awaited), .. } if *awaited == room_id
        );
        if !awaited && self.consume_owed_assignment() {
            warn!("Assignment for room {} answers an abandoned request", room_id);
            self.abandoned.insert(room_id.clone());
            return Err(ProtocolError::StaleAssignment(room_id));
        }

        let (family, solo) = match &self.state {
            MatchmakingState::Queued {
                family,
                awaiting: Some(awaited),
            } if *awaited == room_id => (*family, false),
            MatchmakingState::Queued {
                family,
                awaiting: None,
            } => (*family, false),
            MatchmakingState::Starting { family } => (*family, true),
            _ => {
                warn!("Discarding assignment for room {} not awaited", room_id);
                return Err(ProtocolError::StaleAssignment(room_id));
            }
        };

        let room = RoomHandle {
            room_id: room_id.clone(),
            family,
            seat,
            opponent,
            solo,
        };
        self.bound.insert(room_id);
        info!("Matched into {} room {} as {:?}", family, room.room_id, seat);
        self.state = MatchmakingState::InMatch { room: room.clone() };
        Ok(room)
    }

    /// Drops the bound room. Later assignments for it are stale.
    pub fn leave(&mut self) -> Option<RoomHandle> {
        let previous = std::mem::replace(&mut self.state, MatchmakingState::Idle);
        match previous {
            MatchmakingState::InMatch { room } => {
                self.abandoned.insert(room.room_id.clone());
                Some(room)
            }
            MatchmakingState::Queued { awaiting, .. } => {
                if let Some(room_id) = awaiting {
                    self.abandoned.insert(room_id);
                }
                None
            }
            MatchmakingState::Starting { .. } | MatchmakingState::Idle => None,
        }
    }

    /// Counts one owed answer against an assignment that was not awaited by
    /// name. A late solo room is the likeliest match; an owed ack means the
    /// authority skipped acks and this is the abandoned join's room.
    fn consume_owed_assignment(&mut self) -> bool {
        let Some(family) = self.state.family() else {
            return false;
        };
        let owed = self.outstanding.entry(family).or_default();
        if owed.solos > 0 {
            owed.solos -= 1;
            true
        } else if owed.acks > 0 {
            owed.acks -= 1;
            true
        } else {
            false
        }
    }

    fn abandon_pending(&mut self) {
        match &self.state {
            MatchmakingState::Queued {
                awaiting: Some(room_id),
                ..
            } => {
                self.abandoned.insert(room_id.clone());
            }
            MatchmakingState::Queued {
                family,
                awaiting: None,
            } => {
                self.outstanding.entry(*family).or_default().acks += 1;
            }
            MatchmakingState::Starting { family } => {
                self.outstanding.entry(*family).or_default().solos += 1;
            }
            MatchmakingState::InMatch { room } => {
                self.abandoned.insert(room.room_id.clone());
            }
            MatchmakingState::Idle => {}
        }
        self.outstanding.retain(|_, owed| !owed.is_empty());
    }
}

impl Default for MatchmakingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Identity {
        Identity {
            username: "ada".to_string(),
            user_id: Some(7),
        }
    }

    #[test]
    fn test_join_queue_message() {
        let mut client = MatchmakingClient::new();
        let message = client.join_queue(GameFamily::Pong, &ada());
        assert_eq!(message, ClientMessage::JoinQueue { identity: ada() });
        assert!(client.is_waiting());
    }

    #[test]
    fn test_match_found_binds_once() {
        let mut client = MatchmakingClient::new();
        client.join_queue(GameFamily::Pong, &ada());
        client.on_queued(RoomId::from("R1")).unwrap();

        let room = client
            .on_match_found(RoomId::from("R1"), Seat::Left, Some("bob".to_string()))
            .unwrap();
        assert_eq!(room.seat, Seat::Left);
        assert!(!room.solo);
        assert_eq!(client.room(), Some(&room));

        let again = client.on_match_found(RoomId::from("R1"), Seat::Left, None);
        assert_eq!(again, Err(ProtocolError::StaleAssignment(RoomId::from("R1"))));
        assert_eq!(client.room(), Some(&room));
    }

    #[test]
    fn test_late_assignment_for_abandoned_room_is_ignored() {
        let mut client = MatchmakingClient::new();
        client.join_queue(GameFamily::Pong, &ada());
        client.on_queued(RoomId::from("R1")).unwrap();
        assert_eq!(client.cancel(), Some(ClientMessage::CancelQueue));

        client.join_queue(GameFamily::Pong, &ada());
        client.on_queued(RoomId::from("R2")).unwrap();

        let late = client.on_match_found(RoomId::from("R1"), Seat::Right, None);
        assert_eq!(late, Err(ProtocolError::StaleAssignment(RoomId::from("R1"))));
        assert!(client.is_waiting());

        let room = client
            .on_match_found(RoomId::from("R2"), Seat::Right, None)
            .unwrap();
        assert_eq!(room.room_id, RoomId::from("R2"));
    }

    #[test]
    fn test_assignment_for_other_room_while_awaiting() {
        let mut client = MatchmakingClient::new();
        client.join_tri_queue(&ada());
        client.on_queued(RoomId::from("R2")).unwrap();

        assert!(client
            .on_match_found(RoomId::from("R9"), Seat::Index(1), None)
            .is_err());
        let room = client
            .on_match_found(RoomId::from("R2"), Seat::Index(1), None)
            .unwrap();
        assert_eq!(room.family, GameFamily::Tri);
    }

    #[test]
    fn test_assignment_while_idle_is_rejected() {
        let mut client = MatchmakingClient::new();
        assert!(client
            .on_match_found(RoomId::from("R1"), Seat::Left, None)
            .is_err());
        assert_eq!(client.cancel(), None);
    }

    #[test]
    fn test_solo_bypasses_queue() {
        let mut client = MatchmakingClient::new();
        let message = client.start_solo(GameFamily::Tower, &ada());
        assert_eq!(message, ClientMessage::StartSolo { identity: ada() });

        let room = client
            .on_match_found(RoomId::from("S1"), Seat::Left, None)
            .unwrap();
        assert!(room.solo);
        assert_eq!(room.family, GameFamily::Tower);
    }

    #[test]
    fn test_leave_marks_room_stale() {
        let mut client = MatchmakingClient::new();
        client.join_queue(GameFamily::Pong, &ada());
        client
            .on_match_found(RoomId::from("R3"), Seat::Left, None)
            .unwrap();

        let left = client.leave().unwrap();
        assert_eq!(left.room_id, RoomId::from("R3"));
        assert_eq!(client.state(), &MatchmakingState::Idle);

        client.join_queue(GameFamily::Pong, &ada());
        assert!(client
            .on_match_found(RoomId::from("R3"), Seat::Left, None)
            .is_err());
        assert!(client.on_queued(RoomId::from("R3")).is_err());
    }

    #[test]
    fn test_cancel_before_ack_ignores_late_room() {
        let mut client = MatchmakingClient::new();
        client.join_queue(GameFamily::Pong, &ada());
        client.cancel();
        client.join_queue(GameFamily::Pong, &ada());
        assert_eq!(client.outstanding(GameFamily::Pong).acks, 1);

        let late = client.on_match_found(RoomId::from("R1"), Seat::Left, None);
        assert_eq!(late, Err(ProtocolError::StaleAssignment(RoomId::from("R1"))));
        assert!(client.is_waiting());
        assert_eq!(client.outstanding(GameFamily::Pong), Outstanding::default());

        let room = client
            .on_match_found(RoomId::from("R2"), Seat::Left, None)
            .unwrap();
        assert_eq!(room.room_id, RoomId::from("R2"));
    }

    #[test]
    fn test_late_ack_after_cancel_is_consumed() {
        let mut client = MatchmakingClient::new();
        client.join_queue(GameFamily::Tower, &ada());
        client.cancel();
        client.join_queue(GameFamily::Tower, &ada());

        assert!(client.on_queued(RoomId::from("R1")).is_err());
        assert!(client
            .on_match_found(RoomId::from("R1"), Seat::Right, None)
            .is_err());

        client.on_queued(RoomId::from("R2")).unwrap();
        let room = client
            .on_match_found(RoomId::from("R2"), Seat::Right, None)
            .unwrap();
        assert_eq!(room.room_id, RoomId::from("R2"));
    }

    #[test]
    fn test_cancelled_solo_room_does_not_bind_queue() {
        let mut client = MatchmakingClient::new();
        client.start_solo(GameFamily::Pong, &ada());
        client.cancel();
        client.join_queue(GameFamily::Pong, &ada());

        assert!(client
            .on_match_found(RoomId::from("S1"), Seat::Left, None)
            .is_err());
        assert!(client.is_waiting());

        client.start_solo(GameFamily::Pong, &ada());
        let room = client
            .on_match_found(RoomId::from("S2"), Seat::Left, None)
            .unwrap();
        assert!(room.solo);
    }

    #[test]
    fn test_owed_answers_are_per_family() {
        let mut client = MatchmakingClient::new();
        client.join_queue(GameFamily::Pong, &ada());
        client.join_tri_queue(&ada());
        assert_eq!(client.outstanding(GameFamily::Pong).acks, 1);

        client.on_queued(RoomId::from("T1")).unwrap();
        client.forget(GameFamily::Pong);
        assert_eq!(client.outstanding(GameFamily::Pong), Outstanding::default());
        assert!(client
            .on_match_found(RoomId::from("T1"), Seat::Index(2), None)
            .is_ok());
    }
}
