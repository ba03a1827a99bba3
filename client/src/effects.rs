//! Short-lived visual events derived from consecutive snapshots.
//!
//! Effects are computed from `(previous, current)` pairs and never feed back
//! into authoritative state. Each one carries a frame budget and is pruned once
//! its counter passes that budget.
//!
//! Rules per subject `i` (life counter `prev -> curr`):
//! - `curr < prev` and `curr > 0`: one `LifeLoss(i)`, however many units were lost.
//! - `prev == 1`, `curr == 0`: `Death(i)`.
//! - `prev > 1`, `curr == 0`: one `LifeLoss(i)`; the subject is marked eliminated.
//! - any loss while the ball crosses the arena boundary: one `Explosion` at the
//!   last in-bounds ball position from the previous tick.

use arcade_shared::{GameFamily, Point, Snapshot};
use log::debug;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

pub const LIFE_LOSS_FRAMES: u32 = 36;
pub const DEATH_FRAMES: u32 = 90;
pub const EXPLOSION_FRAMES: u32 = 40;
pub const COUNTDOWN_FRAMES: u32 = 60;

/// A ball moving further than this between two ticks was respawned.
const TELEPORT_DISTANCE: f32 = 120.0;
/// An authority explosion this close to a derived one is the same event.
const EXPLOSION_MERGE_DISTANCE: f32 = 24.0;
const EXPLOSION_MERGE_WINDOW: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectKind {
    LifeLoss,
    Death,
    Explosion,
    Countdown,
}

impl EffectKind {
    pub fn budget(&self) -> u32 {
        match self {
            EffectKind::LifeLoss => LIFE_LOSS_FRAMES,
            EffectKind::Death => DEATH_FRAMES,
            EffectKind::Explosion => EXPLOSION_FRAMES,
            EffectKind::Countdown => COUNTDOWN_FRAMES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectEvent {
    pub kind: EffectKind,
    /// Player, tower or countdown digit the effect belongs to.
    pub subject: usize,
    pub start_time: Instant,
    /// Frame budget.
    pub duration: u32,
    pub frame: u32,
    pub origin: Point,
    /// Units of life lost, for `LifeLoss`.
    pub magnitude: u32,
}

impl EffectEvent {
    pub fn new(kind: EffectKind, subject: usize, origin: Point, start_time: Instant) -> Self {
        Self {
            kind,
            subject,
            start_time,
            duration: kind.budget(),
            frame: 0,
            origin,
            magnitude: 1,
        }
    }

    pub fn countdown(digit: u8, origin: Point, start_time: Instant) -> Self {
        Self::new(EffectKind::Countdown, digit as usize, origin, start_time)
    }

    /// Fraction of the budget used, in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        if self.duration == 0 {
            return 1.0;
        }
        (self.frame as f32 / self.duration as f32).min(1.0)
    }

    /// Ring radius: grows monotonically with progress.
    pub fn radius(&self, base: f32, growth: f32) -> f32 {
        base + growth * self.progress()
    }

    /// Opacity: fades monotonically with progress.
    pub fn alpha(&self) -> f32 {
        1.0 - self.progress()
    }

    pub fn is_expired(&self) -> bool {
        self.frame > self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathRule {
    /// Lives counters: only a step from exactly 1 to 0 is a death.
    FromExactlyOne,
    /// Hit points: reaching 0 from anything is a death.
    AnyToZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectRules {
    pub death: DeathRule,
    pub ball_explosions: bool,
    pub unit_explosions: bool,
}

impl EffectRules {
    pub fn for_family(family: GameFamily) -> Self {
        match family {
            GameFamily::Pong | GameFamily::Tri => Self {
                death: DeathRule::FromExactlyOne,
                ball_explosions: true,
                unit_explosions: false,
            },
            GameFamily::Tower => Self {
                death: DeathRule::AnyToZero,
                ball_explosions: false,
                unit_explosions: true,
            },
        }
    }
}

/// Effects implied by the step from `prev` to `curr`, with only those two
/// ticks as history.
pub fn derive(
    rules: &EffectRules,
    prev: &Snapshot,
    curr: &Snapshot,
    now: Instant,
) -> Vec<EffectEvent> {
    let last_seen = prev
        .ball()
        .map(|ball| ball.position())
        .filter(|&p| prev.in_bounds(p));
    derive_with_history(rules, prev, curr, last_seen, now)
}

/// Like [`derive`], with `last_seen` as the last in-bounds ball position from
/// any earlier tick. Explosions start there; only without one is the previous
/// position clamped onto the boundary.
pub fn derive_with_history(
    rules: &EffectRules,
    prev: &Snapshot,
    curr: &Snapshot,
    last_seen: Option<Point>,
    now: Instant,
) -> Vec<EffectEvent> {
    let mut events = Vec::new();
    if prev.family() != curr.family() {
        return events;
    }

    let before = prev.lives();
    let after = curr.lives();
    let mut any_loss = false;

    for (subject, (&was, &is)) in before.iter().zip(after.iter()).enumerate() {
        if is >= was {
            continue;
        }
        any_loss = true;
        let origin = curr
            .anchor(subject)
            .or_else(|| prev.anchor(subject))
            .unwrap_or_default();

        let died = match rules.death {
            DeathRule::FromExactlyOne => was == 1 && is == 0,
            DeathRule::AnyToZero => is == 0,
        };

        if died {
            events.push(EffectEvent::new(EffectKind::Death, subject, origin, now));
        } else {
            let mut event = EffectEvent::new(EffectKind::LifeLoss, subject, origin, now);
            event.magnitude = was - is;
            events.push(event);
        }
    }

    if rules.ball_explosions && any_loss {
        if let (Some(before), Some(after)) = (prev.ball(), curr.ball()) {
            let crossed = !curr.in_bounds(after.position())
                || before.position().distance(&after.position()) > TELEPORT_DISTANCE;
            if crossed {
                // Never the respawn position: the last place the ball was seen inside.
                let origin =
                    last_seen.unwrap_or_else(|| prev.clamp_in_bounds(before.position()));
                events.push(EffectEvent::new(EffectKind::Explosion, 0, origin, now));
            }
        }
    }

    if rules.unit_explosions {
        if let (Snapshot::Tower(prev), Snapshot::Tower(curr)) = (prev, curr) {
            for unit in &prev.units {
                if !curr.units.iter().any(|u| u.id == unit.id) {
                    events.push(EffectEvent::new(
                        EffectKind::Explosion,
                        unit.owner as usize,
                        unit.position(),
                        now,
                    ));
                }
            }
        }
    }

    events
}

/// Active effects in spawn order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectSet {
    active: Vec<EffectEvent>,
}

impl EffectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EffectEvent) {
        self.active.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = EffectEvent>) {
        self.active.extend(events);
    }

    /// Counts one rendered frame and drops effects past their budget.
    pub fn advance_frame(&mut self) {
        for effect in &mut self.active {
            effect.frame += 1;
        }
        self.active.retain(|e| !e.is_expired());
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectEvent> {
        self.active.iter()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn count(&self, kind: EffectKind) -> usize {
        self.active.iter().filter(|e| e.kind == kind).count()
    }
}

/// Per-match effect state: rules, active effects and who has been knocked out.
#[derive(Debug, Clone)]
pub struct EffectMachine {
    rules: EffectRules,
    effects: EffectSet,
    eliminated: BTreeSet<usize>,
    last_ball: Option<Point>,
}

impl EffectMachine {
    pub fn new(family: GameFamily) -> Self {
        Self {
            rules: EffectRules::for_family(family),
            effects: EffectSet::new(),
            eliminated: BTreeSet::new(),
            last_ball: None,
        }
    }

    pub fn rules(&self) -> &EffectRules {
        &self.rules
    }

    pub fn effects(&self) -> &EffectSet {
        &self.effects
    }

    pub fn eliminated(&self) -> &BTreeSet<usize> {
        &self.eliminated
    }

    pub fn is_eliminated(&self, subject: usize) -> bool {
        self.eliminated.contains(&subject)
    }

    /// Spawns whatever the step implies. Returns how many effects were added.
    pub fn observe(&mut self, prev: &Snapshot, curr: &Snapshot, now: Instant) -> usize {
        self.track_ball(prev);
        let events = derive_with_history(&self.rules, prev, curr, self.last_ball, now);
        self.track_ball(curr);

        let before = prev.lives();
        for (subject, lives) in curr.lives().into_iter().enumerate() {
            if lives == 0 && before.get(subject).is_some_and(|&was| was > 0) {
                debug!("subject {} eliminated at tick {}", subject, curr.tick());
                self.eliminated.insert(subject);
            }
        }

        let added = events.len();
        self.effects.extend(events);
        added
    }

    /// Explosion announced by the authority. Merged with a derived one for the same event.
    pub fn authority_explosion(&mut self, at: Point, now: Instant) -> bool {
        let duplicate = self.effects.iter().any(|e| {
            e.kind == EffectKind::Explosion
                && now.saturating_duration_since(e.start_time) <= EXPLOSION_MERGE_WINDOW
                && e.origin.distance(&at) <= EXPLOSION_MERGE_DISTANCE
        });
        if duplicate {
            return false;
        }
        self.effects
            .push(EffectEvent::new(EffectKind::Explosion, 0, at, now));
        true
    }

    pub fn countdown(&mut self, digit: u8, origin: Point, now: Instant) {
        self.effects.push(EffectEvent::countdown(digit, origin, now));
    }

    pub fn advance_frame(&mut self) {
        self.effects.advance_frame();
    }

    /// Takes in a tick that is not drawn, so the next observed step starts from it
    /// without spawning anything for the hidden one.
    pub fn prime(&mut self, snapshot: &Snapshot) {
        self.track_ball(snapshot);
    }

    /// Last position the ball was seen inside the arena.
    pub fn last_ball(&self) -> Option<Point> {
        self.last_ball
    }

    /// Clears every active effect and elimination marker at once.
    pub fn reset(&mut self) {
        self.effects.clear();
        self.eliminated.clear();
        self.last_ball = None;
    }

    fn track_ball(&mut self, snapshot: &Snapshot) {
        if let Some(ball) = snapshot.ball() {
            if snapshot.in_bounds(ball.position()) {
                self.last_ball = Some(ball.position());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_shared::{
        Ball, PongSnapshot, Tower, TowerSnapshot, TroopType, Unit, PONG_HEIGHT, PONG_WIDTH,
    };
    use assert_approx_eq::assert_approx_eq;

    fn pong(lives: [u32; 2], ball: Ball) -> Snapshot {
        Snapshot::Pong(PongSnapshot {
            tick: 0,
            paddle_y: [255.0, 255.0],
            ball,
            lives,
            scores: [0, 0],
            game_over: false,
            winner: None,
        })
    }

    fn center() -> Ball {
        Ball::at(PONG_WIDTH / 2.0, PONG_HEIGHT / 2.0)
    }

    fn rules() -> EffectRules {
        EffectRules::for_family(GameFamily::Pong)
    }

    #[test]
    fn test_single_life_loss() {
        let now = Instant::now();
        let events = derive(&rules(), &pong([3, 3], center()), &pong([2, 3], center()), now);

        let losses: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EffectKind::LifeLoss)
            .collect();
        assert_eq!(losses.len(), 1);
        assert_eq!(losses[0].subject, 0);
        assert_eq!(losses[0].magnitude, 1);
    }

    #[test]
    fn test_unchanged_lives_spawn_nothing() {
        let now = Instant::now();
        let events = derive(&rules(), &pong([2, 3], center()), &pong([2, 3], center()), now);
        assert!(events.is_empty());
    }

    #[test]
    fn test_multi_unit_loss_is_one_event() {
        let now = Instant::now();
        let events = derive(&rules(), &pong([3, 3], center()), &pong([3, 1], center()), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EffectKind::LifeLoss);
        assert_eq!(events[0].subject, 1);
        assert_eq!(events[0].magnitude, 2);
    }

    #[test]
    fn test_death_only_from_exactly_one() {
        let now = Instant::now();

        let events = derive(&rules(), &pong([1, 3], center()), &pong([0, 3], center()), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EffectKind::Death);
        assert_eq!(events[0].subject, 0);

        let events = derive(&rules(), &pong([2, 3], center()), &pong([0, 3], center()), now);
        assert!(events.iter().all(|e| e.kind != EffectKind::Death));
    }

    #[test]
    fn test_explosion_uses_pre_loss_position() {
        let now = Instant::now();
        let before = Ball::at(5.0, 140.0);
        let events = derive(&rules(), &pong([3, 3], before), &pong([2, 3], center()), now);

        let explosion = events
            .iter()
            .find(|e| e.kind == EffectKind::Explosion)
            .unwrap();
        assert_eq!(explosion.origin, Point::new(5.0, 140.0));
        assert_ne!(explosion.origin, center().position());
    }

    #[test]
    fn test_explosion_origin_is_clamped_inside() {
        let now = Instant::now();
        let events = derive(
            &rules(),
            &pong([3, 3], Ball::at(-6.0, 80.0)),
            &pong([2, 3], Ball::at(-20.0, 80.0)),
            now,
        );

        let explosion = events
            .iter()
            .find(|e| e.kind == EffectKind::Explosion)
            .unwrap();
        assert_eq!(explosion.origin, Point::new(0.0, 80.0));
    }

    #[test]
    fn test_explosion_starts_at_last_in_bounds_position() {
        let now = Instant::now();
        let mut machine = EffectMachine::new(GameFamily::Pong);
        let inside = pong([3, 3], Ball::at(5.0, 140.0));
        let outside = pong([3, 3], Ball::at(-10.0, 150.0));
        let respawned = pong([2, 3], center());

        assert_eq!(machine.observe(&inside, &outside, now), 0);
        assert_eq!(machine.last_ball(), Some(Point::new(5.0, 140.0)));
        machine.observe(&outside, &respawned, now);

        let explosion = machine
            .effects()
            .iter()
            .find(|e| e.kind == EffectKind::Explosion)
            .unwrap();
        assert_eq!(explosion.origin, Point::new(5.0, 140.0));
        assert_eq!(machine.last_ball(), Some(center().position()));

        machine.reset();
        assert_eq!(machine.last_ball(), None);
    }

    #[test]
    fn test_no_explosion_without_loss() {
        let now = Instant::now();
        let events = derive(
            &rules(),
            &pong([3, 3], Ball::at(5.0, 100.0)),
            &pong([3, 3], center()),
            now,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_ring_grows_and_fades() {
        let mut event = EffectEvent::new(EffectKind::LifeLoss, 0, Point::default(), Instant::now());
        let mut last_radius = event.radius(10.0, 30.0);
        let mut last_alpha = event.alpha();
        assert_approx_eq!(last_alpha, 1.0, 0.0001);

        for _ in 0..event.duration {
            event.frame += 1;
            assert!(event.radius(10.0, 30.0) > last_radius);
            assert!(event.alpha() < last_alpha);
            last_radius = event.radius(10.0, 30.0);
            last_alpha = event.alpha();
        }

        assert_approx_eq!(last_radius, 40.0, 0.0001);
        assert_approx_eq!(last_alpha, 0.0, 0.0001);
        assert!(!event.is_expired());
    }

    #[test]
    fn test_effects_expire_after_budget() {
        let now = Instant::now();
        let mut set = EffectSet::new();
        set.push(EffectEvent::new(EffectKind::LifeLoss, 0, Point::default(), now));
        set.push(EffectEvent::new(EffectKind::Death, 0, Point::default(), now));

        for _ in 0..=LIFE_LOSS_FRAMES {
            set.advance_frame();
        }
        assert_eq!(set.count(EffectKind::LifeLoss), 0);
        assert_eq!(set.count(EffectKind::Death), 1);

        for _ in 0..DEATH_FRAMES {
            set.advance_frame();
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_machine_marks_elimination_and_resets() {
        let now = Instant::now();
        let mut machine = EffectMachine::new(GameFamily::Pong);
        machine.observe(&pong([1, 3], center()), &pong([0, 3], center()), now);

        assert!(machine.is_eliminated(0));
        assert_eq!(machine.effects().count(EffectKind::Death), 1);

        machine.countdown(3, Point::default(), now);
        machine.reset();
        assert!(machine.effects().is_empty());
        assert!(machine.eliminated().is_empty());
    }

    #[test]
    fn test_authority_explosion_merges_with_derived() {
        let now = Instant::now();
        let mut machine = EffectMachine::new(GameFamily::Pong);
        machine.observe(
            &pong([3, 3], Ball::at(4.0, 200.0)),
            &pong([2, 3], center()),
            now,
        );
        assert_eq!(machine.effects().count(EffectKind::Explosion), 1);

        assert!(!machine.authority_explosion(Point::new(6.0, 204.0), now));
        assert!(machine.authority_explosion(Point::new(700.0, 200.0), now));
        assert_eq!(machine.effects().count(EffectKind::Explosion), 2);
    }

    #[test]
    fn test_tower_rules() {
        let now = Instant::now();
        let unit = Unit {
            id: 3,
            owner: 1,
            troop: TroopType::Tank,
            lane: 1,
            x: 420.0,
            hp: 4,
            max_hp: 10,
        };
        let prev = Snapshot::Tower(TowerSnapshot {
            tick: 1,
            towers: [Tower { hp: 20, max_hp: 100 }, Tower { hp: 50, max_hp: 100 }],
            units: vec![unit],
            gold: [0, 0],
            game_over: false,
            winner: None,
        });
        let curr = Snapshot::Tower(TowerSnapshot {
            tick: 2,
            towers: [Tower { hp: 0, max_hp: 100 }, Tower { hp: 45, max_hp: 100 }],
            units: Vec::new(),
            gold: [0, 0],
            game_over: true,
            winner: Some(1),
        });

        let events = derive(&EffectRules::for_family(GameFamily::Tower), &prev, &curr, now);
        let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.subject)).collect();
        assert_eq!(
            kinds,
            vec![
                (EffectKind::Death, 0),
                (EffectKind::LifeLoss, 1),
                (EffectKind::Explosion, 1)
            ]
        );
        assert_eq!(events[2].origin, unit.position());
    }
}
