//! Everything drawn outside a running match.

use arcade_shared::GameFamily;

use super::{DrawOp, Outcome, Palette};
use crate::session::Mode;

/// The screen that currently owns the drawing surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    ModeSelect,
    Queued { mode: Mode, connecting: bool },
    InMatch,
    EndScreen { outcome: Outcome },
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::ModeSelect => "mode-select",
            Screen::Queued { .. } => "queued",
            Screen::InMatch => "in-match",
            Screen::EndScreen { .. } => "end-screen",
        }
    }
}

fn text(palette: &Palette, text: impl Into<String>, x: f32, y: f32, size: f32) -> DrawOp {
    DrawOp::Text {
        text: text.into(),
        x,
        y,
        size,
        color: palette.text,
    }
}

/// Paints a non-match screen. `InMatch` is drawn by the match's render loop.
pub fn paint(screen: &Screen, palette: &Palette, username: &str, notice: Option<&str>) -> Vec<DrawOp> {
    let mut ops = vec![DrawOp::Clear(palette.background)];

    match screen {
        Screen::ModeSelect => {
            ops.push(text(palette, "ARCADE", 60.0, 90.0, 64.0));
            ops.push(text(
                palette,
                format!("Signed in as {}", username),
                60.0,
                130.0,
                22.0,
            ));
            for (i, mode) in Mode::ALL.iter().enumerate() {
                ops.push(DrawOp::Text {
                    text: format!("[{}]  {}", i + 1, mode.label()),
                    x: 80.0,
                    y: 200.0 + i as f32 * 40.0,
                    size: 30.0,
                    color: palette.player(family_color(mode.family())),
                });
            }
        }
        Screen::Queued { mode, connecting } => {
            let status = if *connecting {
                "Connecting..."
            } else if mode.is_solo() {
                "Starting..."
            } else {
                "Waiting for opponents..."
            };
            ops.push(text(palette, mode.label(), 60.0, 120.0, 40.0));
            ops.push(text(palette, status, 60.0, 200.0, 32.0));
            ops.push(text(palette, "[Esc] cancel", 60.0, 260.0, 22.0));
        }
        Screen::InMatch => {}
        Screen::EndScreen { outcome } => {
            ops.push(text(palette, outcome.headline(), 60.0, 200.0, 64.0));
            ops.push(text(palette, "[Enter] back to menu", 60.0, 280.0, 24.0));
        }
    }

    if let Some(notice) = notice {
        ops.push(DrawOp::Rect {
            x: 0.0,
            y: 540.0,
            w: 900.0,
            h: 40.0,
            color: palette.arena,
        });
        ops.push(text(palette, notice, 20.0, 568.0, 22.0));
    }

    ops
}

fn family_color(family: GameFamily) -> usize {
    match family {
        GameFamily::Pong => 0,
        GameFamily::Tri => 2,
        GameFamily::Tower => 1,
    }
}
