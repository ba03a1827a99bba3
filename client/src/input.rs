//! Key sampling with edge detection, and the relays that turn key transitions into intents

use arcade_shared::{ClientMessage, Direction, GameFamily, Seat, TowerCommand, TroopType};
use log::debug;
use macroquad::prelude::*;

use crate::matchmaking::RoomHandle;

/// One frame's view of the keyboard. Movement keys are held state; the rest are press edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub w: bool,
    pub s: bool,
    pub up: bool,
    pub down: bool,
    /// Digit key pressed this frame, 1 to 5.
    pub digit: Option<u8>,
    pub escape: bool,
    pub enter: bool,
}

const DIGIT_KEYS: [KeyCode; 5] = [
    KeyCode::Key1,
    KeyCode::Key2,
    KeyCode::Key3,
    KeyCode::Key4,
    KeyCode::Key5,
];

/// Samples macroquad's keyboard once per frame
pub struct InputManager {
    // Previous frame key states for edge detection
    prev_digits: [bool; 5],
    prev_escape: bool,
    prev_enter: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_digits: [false; 5],
            prev_escape: false,
            prev_enter: false,
        }
    }

    pub fn sample(&mut self) -> KeyState {
        let digits = DIGIT_KEYS.map(is_key_down);
        let escape = is_key_down(KeyCode::Escape);
        let enter = is_key_down(KeyCode::Enter) || is_key_down(KeyCode::KpEnter);

        self.edges(
            digits,
            escape,
            enter,
            KeyState {
                w: is_key_down(KeyCode::W),
                s: is_key_down(KeyCode::S),
                up: is_key_down(KeyCode::Up),
                down: is_key_down(KeyCode::Down),
                ..KeyState::default()
            },
        )
    }

    /// Fills in press edges (current && !previous) and remembers this frame.
    fn edges(&mut self, digits: [bool; 5], escape: bool, enter: bool, mut keys: KeyState) -> KeyState {
        keys.digit = digits
            .iter()
            .zip(self.prev_digits.iter())
            .position(|(now, before)| *now && !*before)
            .map(|i| i as u8 + 1);
        keys.escape = escape && !self.prev_escape;
        keys.enter = enter && !self.prev_enter;

        self.prev_digits = digits;
        self.prev_escape = escape;
        self.prev_enter = enter;
        keys
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyPair {
    Wasd,
    Arrows,
    Either,
}

impl KeyPair {
    fn direction(&self, keys: &KeyState) -> Option<Direction> {
        let (up, down) = match self {
            KeyPair::Wasd => (keys.w, keys.s),
            KeyPair::Arrows => (keys.up, keys.down),
            KeyPair::Either => (keys.w || keys.up, keys.s || keys.down),
        };
        match (up, down) {
            (true, false) => Some(Direction::Up),
            (false, true) => Some(Direction::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    seat: Seat,
    keys: KeyPair,
    current: Option<Direction>,
}

/// Paddle relay: one outstanding direction per controlled seat, sent on transitions only.
#[derive(Debug, Clone)]
pub struct InputRelay {
    bindings: Vec<Binding>,
}

impl InputRelay {
    /// With two seats (local solo) the first takes W/S and the second the arrows.
    /// A single seat answers to either pair.
    pub fn for_seats(seats: &[Seat]) -> Self {
        let bindings = match seats {
            [only] => vec![Binding {
                seat: *only,
                keys: KeyPair::Either,
                current: None,
            }],
            _ => seats
                .iter()
                .zip([KeyPair::Wasd, KeyPair::Arrows])
                .map(|(seat, keys)| Binding {
                    seat: *seat,
                    keys,
                    current: None,
                })
                .collect(),
        };
        Self { bindings }
    }

    pub fn direction(&self, seat: Seat) -> Option<Direction> {
        self.bindings
            .iter()
            .find(|b| b.seat == seat)
            .and_then(|b| b.current)
    }

    pub fn relay(&mut self, keys: &KeyState) -> Vec<ClientMessage> {
        let mut intents = Vec::new();
        for binding in &mut self.bindings {
            let next = binding.keys.direction(keys);
            if next != binding.current {
                debug!("{:?} paddle {:?} -> {:?}", binding.seat, binding.current, next);
                binding.current = next;
                intents.push(ClientMessage::MovePaddle {
                    seat: binding.seat,
                    direction: next,
                });
            }
        }
        intents
    }

    /// Stops every moving paddle.
    pub fn release_all(&mut self) -> Vec<ClientMessage> {
        self.bindings
            .iter_mut()
            .filter_map(|binding| {
                binding.current.take().map(|_| ClientMessage::MovePaddle {
                    seat: binding.seat,
                    direction: None,
                })
            })
            .collect()
    }
}

/// Tower relay: digit 1, 2 or 3 spawns a troop.
#[derive(Debug, Clone, Default)]
pub struct TowerRelay;

impl TowerRelay {
    pub fn relay(&mut self, keys: &KeyState) -> Option<ClientMessage> {
        let digit = keys.digit?;
        let troop_type = *TroopType::ALL.get(digit.checked_sub(1)? as usize)?;
        Some(ClientMessage::Command(TowerCommand::Spawn { troop_type }))
    }
}

/// The relay a match uses, chosen by family.
#[derive(Debug, Clone)]
pub enum Relay {
    Paddle(InputRelay),
    Tower(TowerRelay),
}

impl Relay {
    pub fn for_room(room: &RoomHandle) -> Self {
        match room.family {
            GameFamily::Tower => Relay::Tower(TowerRelay),
            GameFamily::Pong if room.solo => {
                Relay::Paddle(InputRelay::for_seats(&[Seat::Left, Seat::Right]))
            }
            GameFamily::Pong | GameFamily::Tri => {
                Relay::Paddle(InputRelay::for_seats(&[room.seat]))
            }
        }
    }

    pub fn relay(&mut self, keys: &KeyState) -> Vec<ClientMessage> {
        match self {
            Relay::Paddle(relay) => relay.relay(keys),
            Relay::Tower(relay) => relay.relay(keys).into_iter().collect(),
        }
    }

    pub fn release_all(&mut self) -> Vec<ClientMessage> {
        match self {
            Relay::Paddle(relay) => relay.release_all(),
            Relay::Tower(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_shared::RoomId;

    fn held(w: bool, s: bool, up: bool, down: bool) -> KeyState {
        KeyState {
            w,
            s,
            up,
            down,
            ..KeyState::default()
        }
    }

    #[test]
    fn test_input_manager_creation() {
        let manager = InputManager::new();
        assert_eq!(manager.prev_digits, [false; 5]);
        assert!(!manager.prev_escape);
    }

    #[test]
    fn test_edges_fire_once_per_press() {
        let mut manager = InputManager::new();
        let digits = [false, true, false, false, false];

        let first = manager.edges(digits, true, false, KeyState::default());
        assert_eq!(first.digit, Some(2));
        assert!(first.escape);

        let held = manager.edges(digits, true, false, KeyState::default());
        assert_eq!(held.digit, None);
        assert!(!held.escape);

        manager.edges([false; 5], false, false, KeyState::default());
        let again = manager.edges(digits, false, true, KeyState::default());
        assert_eq!(again.digit, Some(2));
        assert!(again.enter);
    }

    #[test]
    fn test_relay_sends_on_transition_only() {
        let mut relay = InputRelay::for_seats(&[Seat::Left]);

        assert_eq!(
            relay.relay(&held(true, false, false, false)),
            vec![ClientMessage::MovePaddle {
                seat: Seat::Left,
                direction: Some(Direction::Up)
            }]
        );
        assert!(relay.relay(&held(true, false, false, false)).is_empty());
        assert!(relay.relay(&held(false, false, true, false)).is_empty());

        assert_eq!(
            relay.relay(&held(false, false, false, false)),
            vec![ClientMessage::MovePaddle {
                seat: Seat::Left,
                direction: None
            }]
        );
        assert!(relay.relay(&KeyState::default()).is_empty());
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let mut relay = InputRelay::for_seats(&[Seat::Index(2)]);
        relay.relay(&held(false, true, false, false));
        assert_eq!(relay.direction(Seat::Index(2)), Some(Direction::Down));

        let intents = relay.relay(&held(true, true, false, false));
        assert_eq!(
            intents,
            vec![ClientMessage::MovePaddle {
                seat: Seat::Index(2),
                direction: None
            }]
        );
    }

    #[test]
    fn test_solo_binds_both_seats() {
        let room = RoomHandle {
            room_id: RoomId::from("S1"),
            family: GameFamily::Pong,
            seat: Seat::Left,
            opponent: None,
            solo: true,
        };
        let mut relay = Relay::for_room(&room);

        let intents = relay.relay(&held(false, true, true, false));
        assert_eq!(
            intents,
            vec![
                ClientMessage::MovePaddle {
                    seat: Seat::Left,
                    direction: Some(Direction::Down)
                },
                ClientMessage::MovePaddle {
                    seat: Seat::Right,
                    direction: Some(Direction::Up)
                },
            ]
        );
        assert_eq!(relay.release_all().len(), 2);
        assert!(relay.release_all().is_empty());
    }

    #[test]
    fn test_tower_spawn_keys() {
        let mut relay = TowerRelay;
        let keys = KeyState {
            digit: Some(3),
            ..KeyState::default()
        };
        assert_eq!(
            relay.relay(&keys),
            Some(ClientMessage::Command(TowerCommand::Spawn {
                troop_type: TroopType::Tank
            }))
        );
        assert_eq!(
            relay.relay(&KeyState {
                digit: Some(5),
                ..KeyState::default()
            }),
            None
        );
        assert_eq!(relay.relay(&KeyState::default()), None);
    }
}
