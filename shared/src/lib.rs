//! Wire types and arena geometry shared by the arcade client and its tests.
//!
//! The remote authority owns the simulation. Everything in this crate describes
//! what the authority sends and what the client may send back, plus the fixed
//! arena layout both sides agree on.

pub mod protocol;
pub mod snapshot;

use serde::{Deserialize, Serialize};

pub use protocol::{
    decode, encode, ClientMessage, Direction, GameFamily, Identity, MessageKind, RoomId, Seat,
    ServerMessage, TowerCommand, TroopType, MAX_DATAGRAM, PROTOCOL_VERSION,
};
pub use snapshot::{
    Ball, MalformedSnapshot, PongSnapshot, Snapshot, Tower, TowerSnapshot, TriPaddle, TriSnapshot,
    Unit,
};

pub const PONG_WIDTH: f32 = 800.0;
pub const PONG_HEIGHT: f32 = 600.0;
pub const PADDLE_WIDTH: f32 = 12.0;
pub const PADDLE_HEIGHT: f32 = 90.0;
pub const PADDLE_MARGIN: f32 = 24.0;
pub const BALL_RADIUS: f32 = 8.0;

pub const TRI_PLAYERS: usize = 3;
pub const TRI_CENTER_X: f32 = 400.0;
pub const TRI_CENTER_Y: f32 = 300.0;
pub const TRI_RADIUS: f32 = 260.0;
/// Angular width of a paddle on the circular arena, in radians.
pub const TRI_PADDLE_ARC: f32 = 0.45;
pub const TRI_PADDLE_THICKNESS: f32 = 10.0;

pub const TOWER_WIDTH: f32 = 900.0;
pub const TOWER_HEIGHT: f32 = 500.0;
pub const TOWER_LANES: u8 = 3;
pub const TOWER_SIZE: f32 = 64.0;
pub const TOWER_MARGIN: f32 = 36.0;
pub const UNIT_SIZE: f32 = 18.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

pub fn tri_center() -> Point {
    Point::new(TRI_CENTER_X, TRI_CENTER_Y)
}

/// Point on the tri arena rim at `angle`, pulled `inset` pixels toward the center.
pub fn tri_rim_point(angle: f32, inset: f32) -> Point {
    let r = TRI_RADIUS - inset;
    Point::new(TRI_CENTER_X + r * angle.cos(), TRI_CENTER_Y + r * angle.sin())
}

/// Vertical center of a tower-defense lane.
pub fn lane_y(lane: u8) -> f32 {
    let lane_height = TOWER_HEIGHT / TOWER_LANES as f32;
    lane_height * (lane as f32 + 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_approx_eq!(a.distance(&b), 5.0, 0.0001);
    }

    #[test]
    fn test_tri_rim_point() {
        let p = tri_rim_point(0.0, 0.0);
        assert_approx_eq!(p.x, TRI_CENTER_X + TRI_RADIUS, 0.001);
        assert_approx_eq!(p.y, TRI_CENTER_Y, 0.001);

        let inset = tri_rim_point(std::f32::consts::FRAC_PI_2, 10.0);
        assert_approx_eq!(inset.x, TRI_CENTER_X, 0.001);
        assert_approx_eq!(inset.y, TRI_CENTER_Y + TRI_RADIUS - 10.0, 0.001);
    }

    #[test]
    fn test_lane_y_is_centered() {
        let lane_height = TOWER_HEIGHT / TOWER_LANES as f32;
        assert_approx_eq!(lane_y(0), lane_height / 2.0, 0.001);
        assert_approx_eq!(lane_y(2), TOWER_HEIGHT - lane_height / 2.0, 0.001);
    }
}
