//! Frame composition.
//!
//! A frame is a plain list of draw operations built in a fixed layer order:
//! background, entities, effects, overlay. Building is a pure function of the
//! snapshot view, the active effects and the end-sequence state, so the same
//! inputs always yield the same list. Only [`canvas::MacroquadCanvas`] touches
//! the drawing surface.

pub mod canvas;
pub mod pong;
pub mod screens;
pub mod tower;
pub mod tri;

use arcade_shared::{GameFamily, Snapshot};
use log::{info, warn};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::effects::{EffectEvent, EffectKind, EffectMachine};
use crate::receiver::FrameView;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }
}

/// One drawing instruction. Angles are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rgba),
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgba,
    },
    RectLines {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        thickness: f32,
        color: Rgba,
    },
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        color: Rgba,
    },
    Ring {
        x: f32,
        y: f32,
        radius: f32,
        thickness: f32,
        color: Rgba,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        thickness: f32,
        color: Rgba,
    },
    Arc {
        x: f32,
        y: f32,
        radius: f32,
        rotation: f32,
        sweep: f32,
        thickness: f32,
        color: Rgba,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
        color: Rgba,
    },
    /// Translucent wash over the whole surface.
    Veil(Rgba),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Background,
    Entities,
    Effects,
    Overlay,
}

/// Collects ops per layer and flattens them in layer order.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    layers: [Vec<DrawOp>; 4],
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: Layer, op: DrawOp) {
        self.layers[layer as usize].push(op);
    }

    pub fn layer(&self, layer: Layer) -> &[DrawOp] {
        &self.layers[layer as usize]
    }

    pub fn discard(&mut self, layer: Layer) {
        self.layers[layer as usize].clear();
    }

    pub fn finish(self) -> Vec<DrawOp> {
        self.layers.into_iter().flatten().collect()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("no painter data for subject {0}")]
    MissingSubject(usize),
    #[error("painter for {expected} given a {found} snapshot")]
    FamilyMismatch {
        expected: GameFamily,
        found: GameFamily,
    },
}

/// Colors resolved from a cosmetic identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub name: &'static str,
    pub background: Rgba,
    pub arena: Rgba,
    pub lines: Rgba,
    pub players: [Rgba; 3],
    pub ball: Rgba,
    pub text: Rgba,
    pub eliminated: Rgba,
    pub explosion: Rgba,
    pub veil: Rgba,
}

impl Palette {
    pub fn classic() -> Self {
        Self {
            name: "classic",
            background: Rgba::rgb(26, 26, 26),
            arena: Rgba::rgb(40, 40, 40),
            lines: Rgba::rgb(68, 68, 68),
            players: [
                Rgba::rgb(0, 170, 255),
                Rgba::rgb(255, 68, 68),
                Rgba::rgb(120, 220, 90),
            ],
            ball: Rgba::rgb(255, 255, 255),
            text: Rgba::rgb(235, 235, 235),
            eliminated: Rgba::rgb(90, 90, 90),
            explosion: Rgba::rgb(255, 170, 40),
            veil: Rgba::rgb(10, 10, 10).with_alpha(0.6),
        }
    }

    pub fn neon() -> Self {
        Self {
            name: "neon",
            background: Rgba::rgb(8, 4, 24),
            arena: Rgba::rgb(20, 10, 48),
            lines: Rgba::rgb(255, 0, 200),
            players: [
                Rgba::rgb(0, 255, 240),
                Rgba::rgb(255, 230, 0),
                Rgba::rgb(255, 60, 255),
            ],
            ball: Rgba::rgb(255, 255, 255),
            text: Rgba::rgb(240, 240, 255),
            eliminated: Rgba::rgb(70, 60, 90),
            explosion: Rgba::rgb(255, 80, 160),
            veil: Rgba::rgb(8, 4, 24).with_alpha(0.65),
        }
    }

    pub fn mono() -> Self {
        Self {
            name: "mono",
            background: Rgba::rgb(0, 0, 0),
            arena: Rgba::rgb(16, 16, 16),
            lines: Rgba::rgb(120, 120, 120),
            players: [Rgba::rgb(255, 255, 255); 3],
            ball: Rgba::rgb(255, 255, 255),
            text: Rgba::rgb(255, 255, 255),
            eliminated: Rgba::rgb(60, 60, 60),
            explosion: Rgba::rgb(200, 200, 200),
            veil: Rgba::rgb(0, 0, 0).with_alpha(0.6),
        }
    }

    /// Unknown identifiers fall back to `classic`.
    pub fn lookup(skin: &str) -> Self {
        match skin {
            "neon" => Self::neon(),
            "mono" => Self::mono(),
            "classic" => Self::classic(),
            other => {
                warn!("Unknown skin '{}', using classic", other);
                Self::classic()
            }
        }
    }

    pub fn player(&self, index: usize) -> Rgba {
        self.players[index % self.players.len()]
    }
}

/// What a family painter needs besides the snapshot itself.
pub struct PaintContext<'a> {
    pub palette: &'a Palette,
    pub local_seat: Option<usize>,
    pub eliminated: &'a BTreeSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Lose,
    /// Solo games, draws, or matches cut short.
    Finished { winner: Option<usize> },
    Aborted,
}

impl Outcome {
    pub fn from_winner(winner: Option<usize>, local_seat: Option<usize>) -> Self {
        match (winner, local_seat) {
            (Some(w), Some(seat)) if w == seat => Outcome::Win,
            (Some(_), Some(_)) => Outcome::Lose,
            (winner, _) => Outcome::Finished { winner },
        }
    }

    pub fn headline(&self) -> String {
        match self {
            Outcome::Win => "YOU WIN".to_string(),
            Outcome::Lose => "YOU LOSE".to_string(),
            Outcome::Finished {
                winner: Some(w),
            } => format!("PLAYER {} WINS", w + 1),
            Outcome::Finished { winner: None } => "GAME OVER".to_string(),
            Outcome::Aborted => "MATCH ENDED".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndSequence {
    pub outcome: Outcome,
    pub frame: u32,
    pub budget: u32,
}

impl EndSequence {
    pub fn progress(&self) -> f32 {
        if self.budget == 0 {
            return 1.0;
        }
        (self.frame as f32 / self.budget as f32).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
    Continue,
    /// Sent once, after the end sequence has played.
    Teardown(Outcome),
}

/// Per-match frame driver.
pub struct RenderLoop {
    family: GameFamily,
    palette: Palette,
    local_seat: Option<usize>,
    end_frames: u32,
    end: Option<EndSequence>,
    teardown_sent: bool,
}

impl RenderLoop {
    pub fn new(
        family: GameFamily,
        palette: Palette,
        local_seat: Option<usize>,
        end_frames: u32,
    ) -> Self {
        Self {
            family,
            palette,
            local_seat,
            end_frames,
            end: None,
            teardown_sent: false,
        }
    }

    pub fn end_sequence(&self) -> Option<&EndSequence> {
        self.end.as_ref()
    }

    /// Builds this frame's ops and advances the end sequence.
    pub fn frame(&mut self, view: FrameView<'_>, effects: &EffectMachine) -> (Vec<DrawOp>, FrameSignal) {
        if let FrameView::Live(snapshot) = view {
            if snapshot.game_over() && self.end.is_none() {
                let outcome = Outcome::from_winner(snapshot.winner(), self.local_seat);
                info!("{} game over at tick {}: {:?}", self.family, snapshot.tick(), outcome);
                self.end = Some(EndSequence {
                    outcome,
                    frame: 0,
                    budget: self.end_frames,
                });
            }
        }

        let ops = self.build(view, effects);

        let mut signal = FrameSignal::Continue;
        if let Some(end) = self.end.as_mut() {
            end.frame = end.frame.saturating_add(1);
            if end.frame >= end.budget && !self.teardown_sent {
                self.teardown_sent = true;
                signal = FrameSignal::Teardown(end.outcome);
            }
        }

        (ops, signal)
    }

    /// Pure frame composition.
    pub fn build(&self, view: FrameView<'_>, effects: &EffectMachine) -> Vec<DrawOp> {
        let mut frame = FrameBuilder::new();
        let ctx = PaintContext {
            palette: &self.palette,
            local_seat: self.local_seat,
            eliminated: effects.eliminated(),
        };

        paint_background(self.family, &self.palette, &mut frame);

        let (snapshot, frozen) = match view {
            FrameView::Nothing => return frame.finish(),
            FrameView::Frozen { snapshot, .. } => (snapshot, true),
            FrameView::Live(snapshot) => (snapshot, false),
        };

        if let Err(e) = paint_entities(self.family, snapshot, &ctx, &mut frame) {
            warn!("Dropping {} frame at tick {}: {}", self.family, snapshot.tick(), e);
            frame.discard(Layer::Entities);
            return frame.finish();
        }

        if frozen {
            frame.push(Layer::Entities, DrawOp::Veil(self.palette.veil));
        }

        for effect in effects.effects().iter() {
            paint_effect(effect, &self.palette, &mut frame);
        }

        if let Some(end) = &self.end {
            paint_end_sequence(end, &self.palette, &mut frame);
        } else if snapshot.game_over() {
            paint_end_sequence(
                &EndSequence {
                    outcome: Outcome::from_winner(snapshot.winner(), self.local_seat),
                    frame: 0,
                    budget: self.end_frames,
                },
                &self.palette,
                &mut frame,
            );
        }

        frame.finish()
    }
}

fn paint_background(family: GameFamily, palette: &Palette, frame: &mut FrameBuilder) {
    match family {
        GameFamily::Pong => pong::paint_background(palette, frame),
        GameFamily::Tri => tri::paint_background(palette, frame),
        GameFamily::Tower => tower::paint_background(palette, frame),
    }
}

fn paint_entities(
    family: GameFamily,
    snapshot: &Snapshot,
    ctx: &PaintContext<'_>,
    frame: &mut FrameBuilder,
) -> Result<(), RenderError> {
    match (family, snapshot) {
        (GameFamily::Pong, Snapshot::Pong(s)) => pong::paint_entities(s, ctx, frame),
        (GameFamily::Tri, Snapshot::Tri(s)) => tri::paint_entities(s, ctx, frame),
        (GameFamily::Tower, Snapshot::Tower(s)) => tower::paint_entities(s, ctx, frame),
        (expected, other) => Err(RenderError::FamilyMismatch {
            expected,
            found: other.family(),
        }),
    }
}

fn paint_effect(effect: &EffectEvent, palette: &Palette, frame: &mut FrameBuilder) {
    let alpha = effect.alpha();
    let origin = effect.origin;

    match effect.kind {
        EffectKind::LifeLoss => {
            let growth = 36.0 + 10.0 * effect.magnitude.min(4) as f32;
            frame.push(
                Layer::Effects,
                DrawOp::Ring {
                    x: origin.x,
                    y: origin.y,
                    radius: effect.radius(12.0, growth),
                    thickness: 3.0,
                    color: palette.player(effect.subject).with_alpha(alpha),
                },
            );
        }
        EffectKind::Death => {
            let color = palette.player(effect.subject);
            frame.push(
                Layer::Effects,
                DrawOp::Ring {
                    x: origin.x,
                    y: origin.y,
                    radius: effect.radius(20.0, 110.0),
                    thickness: 5.0,
                    color: color.with_alpha(alpha),
                },
            );
            frame.push(
                Layer::Effects,
                DrawOp::Ring {
                    x: origin.x,
                    y: origin.y,
                    radius: effect.radius(6.0, 60.0),
                    thickness: 2.0,
                    color: palette.text.with_alpha(alpha),
                },
            );
            frame.push(
                Layer::Effects,
                DrawOp::Text {
                    text: "X".to_string(),
                    x: origin.x - 10.0,
                    y: origin.y + 10.0,
                    size: 36.0,
                    color: color.with_alpha(alpha),
                },
            );
        }
        EffectKind::Explosion => {
            frame.push(
                Layer::Effects,
                DrawOp::Circle {
                    x: origin.x,
                    y: origin.y,
                    radius: effect.radius(4.0, 26.0),
                    color: palette.explosion.with_alpha(alpha * 0.6),
                },
            );
            frame.push(
                Layer::Effects,
                DrawOp::Ring {
                    x: origin.x,
                    y: origin.y,
                    radius: effect.radius(8.0, 40.0),
                    thickness: 2.0,
                    color: palette.explosion.with_alpha(alpha),
                },
            );
        }
        EffectKind::Countdown => {
            let size = 120.0 * (1.0 + 0.3 * effect.progress());
            frame.push(
                Layer::Effects,
                DrawOp::Text {
                    text: effect.subject.to_string(),
                    x: origin.x - size * 0.25,
                    y: origin.y + size * 0.35,
                    size,
                    color: palette.text.with_alpha(alpha),
                },
            );
        }
    }
}

fn paint_end_sequence(end: &EndSequence, palette: &Palette, frame: &mut FrameBuilder) {
    let fade_in = (end.progress() * 3.0).min(1.0);
    frame.push(Layer::Overlay, DrawOp::Veil(palette.veil.with_alpha(palette.veil.a * fade_in)));

    let color = match end.outcome {
        Outcome::Win => palette.player(0),
        Outcome::Lose => palette.player(1),
        Outcome::Finished { .. } | Outcome::Aborted => palette.text,
    };
    frame.push(
        Layer::Overlay,
        DrawOp::Text {
            text: end.outcome.headline(),
            x: 260.0,
            y: 300.0,
            size: 64.0,
            color: color.with_alpha(fade_in),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_shared::{Ball, Point, PongSnapshot, TriPaddle, TriSnapshot};
    use std::time::Instant;

    fn pong(lives: [u32; 2], game_over: bool, winner: Option<u8>) -> Snapshot {
        Snapshot::Pong(PongSnapshot {
            tick: 10,
            paddle_y: [100.0, 300.0],
            ball: Ball::at(400.0, 300.0),
            lives,
            scores: [1, 2],
            game_over,
            winner,
        })
    }

    fn render_loop(seat: Option<usize>) -> RenderLoop {
        RenderLoop::new(GameFamily::Pong, Palette::classic(), seat, 3)
    }

    fn layer_of(op: &DrawOp, frame: &FrameBuilder) -> Option<Layer> {
        [Layer::Background, Layer::Entities, Layer::Effects, Layer::Overlay]
            .into_iter()
            .find(|l| frame.layer(*l).contains(op))
    }

    #[test]
    fn test_build_is_deterministic() {
        let snapshot = pong([2, 3], false, None);
        let mut machine = EffectMachine::new(GameFamily::Pong);
        machine.observe(&pong([3, 3], false, None), &snapshot, Instant::now());

        let render = render_loop(Some(0));
        let first = render.build(FrameView::Live(&snapshot), &machine);
        let second = render.build(FrameView::Live(&snapshot), &machine);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_layer_order() {
        let snapshot = pong([2, 3], true, Some(0));
        let mut machine = EffectMachine::new(GameFamily::Pong);
        machine.observe(&pong([3, 3], false, None), &snapshot, Instant::now());

        let render = render_loop(Some(0));
        let ops = render.build(FrameView::Live(&snapshot), &machine);

        assert!(matches!(ops.first(), Some(DrawOp::Clear(_))));
        let ring = ops
            .iter()
            .position(|op| matches!(op, DrawOp::Ring { .. }))
            .unwrap();
        let veil = ops
            .iter()
            .rposition(|op| matches!(op, DrawOp::Veil(_)))
            .unwrap();
        let lives = ops
            .iter()
            .position(|op| matches!(op, DrawOp::Text { text, .. } if text.starts_with("Lives")))
            .unwrap();
        assert!(lives < ring);
        assert!(ring < veil);
    }

    #[test]
    fn test_nothing_view_paints_background_only() {
        let machine = EffectMachine::new(GameFamily::Pong);
        let render = render_loop(None);
        let ops = render.build(FrameView::Nothing, &machine);

        let mut background = FrameBuilder::new();
        pong::paint_background(&Palette::classic(), &mut background);
        assert_eq!(ops, background.finish());
    }

    #[test]
    fn test_frozen_view_is_veiled() {
        let snapshot = pong([3, 3], false, None);
        let machine = EffectMachine::new(GameFamily::Pong);
        let render = render_loop(Some(1));
        let ops = render.build(
            FrameView::Frozen {
                snapshot: &snapshot,
                digit: Some(3),
            },
            &machine,
        );
        assert!(ops.iter().any(|op| matches!(op, DrawOp::Veil(_))));
    }

    #[test]
    fn test_bad_frame_falls_back_to_background() {
        let snapshot = Snapshot::Tri(TriSnapshot {
            tick: 1,
            players: vec![TriPaddle {
                angle: 0.0,
                lives: 3,
            }],
            ball: Ball::default(),
            game_over: false,
            winner: None,
        });
        let machine = EffectMachine::new(GameFamily::Tri);
        let render = RenderLoop::new(GameFamily::Tri, Palette::classic(), Some(0), 3);
        let ops = render.build(FrameView::Live(&snapshot), &machine);

        let mut background = FrameBuilder::new();
        tri::paint_background(&Palette::classic(), &mut background);
        assert_eq!(ops, background.finish());
    }

    #[test]
    fn test_end_sequence_signals_teardown_once() {
        let snapshot = pong([0, 2], true, Some(1));
        let machine = EffectMachine::new(GameFamily::Pong);
        let mut render = render_loop(Some(1));

        let mut teardowns = Vec::new();
        for _ in 0..10 {
            let (_, signal) = render.frame(FrameView::Live(&snapshot), &machine);
            if let FrameSignal::Teardown(outcome) = signal {
                teardowns.push(outcome);
            }
        }
        assert_eq!(teardowns, vec![Outcome::Win]);
    }

    #[test]
    fn test_outcome_from_winner() {
        assert_eq!(Outcome::from_winner(Some(0), Some(0)), Outcome::Win);
        assert_eq!(Outcome::from_winner(Some(2), Some(0)), Outcome::Lose);
        assert_eq!(
            Outcome::from_winner(Some(1), None),
            Outcome::Finished { winner: Some(1) }
        );
    }

    #[test]
    fn test_palette_lookup_falls_back() {
        assert_eq!(Palette::lookup("neon").name, "neon");
        assert_eq!(Palette::lookup("does-not-exist").name, "classic");
    }

    #[test]
    fn test_countdown_effect_draws_digit() {
        let mut machine = EffectMachine::new(GameFamily::Pong);
        machine.countdown(2, Point::new(400.0, 300.0), Instant::now());
        let snapshot = pong([3, 3], false, None);
        let render = render_loop(Some(0));

        let mut frame = FrameBuilder::new();
        paint_effect(machine.effects().iter().next().unwrap(), &Palette::classic(), &mut frame);
        let digit = frame.layer(Layer::Effects)[0].clone();
        assert!(matches!(&digit, DrawOp::Text { text, .. } if text == "2"));
        assert_eq!(layer_of(&digit, &frame), Some(Layer::Effects));

        let ops = render.build(
            FrameView::Frozen {
                snapshot: &snapshot,
                digit: Some(2),
            },
            &machine,
        );
        let veil = ops.iter().position(|op| matches!(op, DrawOp::Veil(_))).unwrap();
        let text = ops.iter().position(|op| *op == digit).unwrap();
        assert!(veil < text);
    }
}
