//! Authoritative per-tick state for each game family.
//!
//! A snapshot is produced only by the remote authority and is never mutated by
//! the client. Each family has its own schema; `Snapshot` tags them so the
//! client can run one synchronized-match pipeline over all three.

use crate::protocol::{GameFamily, TroopType};
use crate::{
    lane_y, tri_center, tri_rim_point, Point, PADDLE_HEIGHT, PADDLE_MARGIN, PADDLE_WIDTH,
    PONG_HEIGHT, PONG_WIDTH, TOWER_HEIGHT, TOWER_LANES, TOWER_MARGIN, TOWER_SIZE, TOWER_WIDTH,
    TRI_PADDLE_THICKNESS, TRI_PLAYERS, TRI_RADIUS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedSnapshot {
    #[error("expected {expected} subjects, found {found}")]
    SubjectCount { expected: usize, found: usize },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("winner index {0} out of range")]
    WinnerOutOfRange(u8),
    #[error("unit {id} has invalid owner or lane")]
    UnitOutOfRange { id: u32 },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
}

impl Ball {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PongSnapshot {
    pub tick: u32,
    /// Top edge of each paddle, left then right.
    pub paddle_y: [f32; 2],
    pub ball: Ball,
    pub lives: [u32; 2],
    pub scores: [u32; 2],
    pub game_over: bool,
    pub winner: Option<u8>,
}

impl PongSnapshot {
    pub fn paddle_x(side: usize) -> f32 {
        if side == 0 {
            PADDLE_MARGIN
        } else {
            PONG_WIDTH - PADDLE_MARGIN - PADDLE_WIDTH
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TriPaddle {
    /// Paddle center on the rim, in radians.
    pub angle: f32,
    pub lives: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TriSnapshot {
    pub tick: u32,
    pub players: Vec<TriPaddle>,
    pub ball: Ball,
    pub game_over: bool,
    pub winner: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Tower {
    pub hp: u32,
    pub max_hp: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Unit {
    pub id: u32,
    pub owner: u8,
    pub troop: TroopType,
    pub lane: u8,
    pub x: f32,
    pub hp: u32,
    pub max_hp: u32,
}

impl Unit {
    pub fn position(&self) -> Point {
        Point::new(self.x, lane_y(self.lane))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TowerSnapshot {
    pub tick: u32,
    pub towers: [Tower; 2],
    pub units: Vec<Unit>,
    pub gold: [u32; 2],
    pub game_over: bool,
    pub winner: Option<u8>,
}

impl TowerSnapshot {
    pub fn tower_center(side: usize) -> Point {
        let x = if side == 0 {
            TOWER_MARGIN + TOWER_SIZE / 2.0
        } else {
            TOWER_WIDTH - TOWER_MARGIN - TOWER_SIZE / 2.0
        };
        Point::new(x, TOWER_HEIGHT / 2.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Snapshot {
    Pong(PongSnapshot),
    Tri(TriSnapshot),
    Tower(TowerSnapshot),
}

impl Snapshot {
    pub fn family(&self) -> GameFamily {
        match self {
            Snapshot::Pong(_) => GameFamily::Pong,
            Snapshot::Tri(_) => GameFamily::Tri,
            Snapshot::Tower(_) => GameFamily::Tower,
        }
    }

    pub fn tick(&self) -> u32 {
        match self {
            Snapshot::Pong(s) => s.tick,
            Snapshot::Tri(s) => s.tick,
            Snapshot::Tower(s) => s.tick,
        }
    }

    pub fn game_over(&self) -> bool {
        match self {
            Snapshot::Pong(s) => s.game_over,
            Snapshot::Tri(s) => s.game_over,
            Snapshot::Tower(s) => s.game_over,
        }
    }

    pub fn winner(&self) -> Option<usize> {
        let winner = match self {
            Snapshot::Pong(s) => s.winner,
            Snapshot::Tri(s) => s.winner,
            Snapshot::Tower(s) => s.winner,
        };
        winner.map(usize::from)
    }

    /// Life or health counter per subject. Tower hit points for the tower family.
    pub fn lives(&self) -> Vec<u32> {
        match self {
            Snapshot::Pong(s) => s.lives.to_vec(),
            Snapshot::Tri(s) => s.players.iter().map(|p| p.lives).collect(),
            Snapshot::Tower(s) => s.towers.iter().map(|t| t.hp).collect(),
        }
    }

    /// Score pair reported at the end of a match.
    ///
    /// Tri has three players but results carry a pair, so it is reported from the
    /// winner's side: the winner's lives against the best surviving rival. Without a
    /// winner, player 0 stands in for the winner.
    pub fn scores(&self) -> (u32, u32) {
        match self {
            Snapshot::Pong(s) => (s.scores[0], s.scores[1]),
            Snapshot::Tri(s) => {
                let side = s
                    .winner
                    .map(usize::from)
                    .filter(|&w| w < s.players.len())
                    .unwrap_or(0);
                let own = s.players.get(side).map_or(0, |p| p.lives);
                let rival = s
                    .players
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != side)
                    .map(|(_, p)| p.lives)
                    .max()
                    .unwrap_or(0);
                (own, rival)
            }
            Snapshot::Tower(s) => (s.towers[0].hp, s.towers[1].hp),
        }
    }

    pub fn ball(&self) -> Option<Ball> {
        match self {
            Snapshot::Pong(s) => Some(s.ball),
            Snapshot::Tri(s) => Some(s.ball),
            Snapshot::Tower(_) => None,
        }
    }

    /// Where subject `index` is drawn.
    pub fn anchor(&self, index: usize) -> Option<Point> {
        match self {
            Snapshot::Pong(s) => s.paddle_y.get(index).map(|y| {
                Point::new(
                    PongSnapshot::paddle_x(index) + PADDLE_WIDTH / 2.0,
                    y + PADDLE_HEIGHT / 2.0,
                )
            }),
            Snapshot::Tri(s) => s
                .players
                .get(index)
                .map(|p| tri_rim_point(p.angle, TRI_PADDLE_THICKNESS)),
            Snapshot::Tower(_) if index < 2 => Some(TowerSnapshot::tower_center(index)),
            Snapshot::Tower(_) => None,
        }
    }

    pub fn in_bounds(&self, point: Point) -> bool {
        match self {
            Snapshot::Pong(_) => {
                (0.0..=PONG_WIDTH).contains(&point.x) && (0.0..=PONG_HEIGHT).contains(&point.y)
            }
            Snapshot::Tri(_) => tri_center().distance(&point) <= TRI_RADIUS,
            Snapshot::Tower(_) => {
                (0.0..=TOWER_WIDTH).contains(&point.x) && (0.0..=TOWER_HEIGHT).contains(&point.y)
            }
        }
    }

    /// Nearest point inside the arena.
    pub fn clamp_in_bounds(&self, point: Point) -> Point {
        match self {
            Snapshot::Pong(_) => Point::new(
                point.x.clamp(0.0, PONG_WIDTH),
                point.y.clamp(0.0, PONG_HEIGHT),
            ),
            Snapshot::Tri(_) => {
                let center = tri_center();
                let distance = center.distance(&point);
                if distance <= TRI_RADIUS || distance < f32::EPSILON {
                    return point;
                }
                let scale = TRI_RADIUS / distance;
                Point::new(
                    center.x + (point.x - center.x) * scale,
                    center.y + (point.y - center.y) * scale,
                )
            }
            Snapshot::Tower(_) => Point::new(
                point.x.clamp(0.0, TOWER_WIDTH),
                point.y.clamp(0.0, TOWER_HEIGHT),
            ),
        }
    }

    pub fn validate(&self) -> Result<(), MalformedSnapshot> {
        let subjects = self.family().subjects();
        if let Some(winner) = self.winner() {
            if winner >= subjects {
                return Err(MalformedSnapshot::WinnerOutOfRange(winner as u8));
            }
        }

        match self {
            Snapshot::Pong(s) => {
                if !s.paddle_y.iter().all(|y| y.is_finite()) {
                    return Err(MalformedSnapshot::NonFinite("paddle"));
                }
                if !s.ball.position().is_finite() {
                    return Err(MalformedSnapshot::NonFinite("ball"));
                }
            }
            Snapshot::Tri(s) => {
                if s.players.len() != TRI_PLAYERS {
                    return Err(MalformedSnapshot::SubjectCount {
                        expected: TRI_PLAYERS,
                        found: s.players.len(),
                    });
                }
                if !s.players.iter().all(|p| p.angle.is_finite()) {
                    return Err(MalformedSnapshot::NonFinite("paddle"));
                }
                if !s.ball.position().is_finite() {
                    return Err(MalformedSnapshot::NonFinite("ball"));
                }
            }
            Snapshot::Tower(s) => {
                for unit in &s.units {
                    if unit.owner > 1 || unit.lane >= TOWER_LANES {
                        return Err(MalformedSnapshot::UnitOutOfRange { id: unit.id });
                    }
                    if !unit.x.is_finite() {
                        return Err(MalformedSnapshot::NonFinite("unit"));
                    }
                }
            }
        }

        Ok(())
    }
}
