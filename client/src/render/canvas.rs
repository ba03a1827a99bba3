use macroquad::prelude::*;

use super::{DrawOp, Rgba};

impl From<Rgba> for Color {
    fn from(c: Rgba) -> Self {
        Color::new(c.r, c.g, c.b, c.a)
    }
}

/// Executes draw ops against the macroquad surface, centering the arena in the window.
pub struct MacroquadCanvas {
    arena_width: f32,
    arena_height: f32,
}

impl MacroquadCanvas {
    pub fn new(arena_width: f32, arena_height: f32) -> Self {
        MacroquadCanvas {
            arena_width,
            arena_height,
        }
    }

    fn offset(&self) -> (f32, f32) {
        (
            ((screen_width() - self.arena_width) / 2.0).max(0.0),
            ((screen_height() - self.arena_height) / 2.0).max(0.0),
        )
    }

    pub fn execute(&mut self, ops: &[DrawOp]) {
        let (ox, oy) = self.offset();

        for op in ops {
            match op {
                DrawOp::Clear(color) => clear_background((*color).into()),
                DrawOp::Rect { x, y, w, h, color } => {
                    draw_rectangle(ox + x, oy + y, *w, *h, (*color).into())
                }
                DrawOp::RectLines {
                    x,
                    y,
                    w,
                    h,
                    thickness,
                    color,
                } => draw_rectangle_lines(ox + x, oy + y, *w, *h, *thickness, (*color).into()),
                DrawOp::Circle {
                    x,
                    y,
                    radius,
                    color,
                } => draw_circle(ox + x, oy + y, *radius, (*color).into()),
                DrawOp::Ring {
                    x,
                    y,
                    radius,
                    thickness,
                    color,
                } => draw_circle_lines(ox + x, oy + y, *radius, *thickness, (*color).into()),
                DrawOp::Line {
                    x1,
                    y1,
                    x2,
                    y2,
                    thickness,
                    color,
                } => draw_line(
                    ox + x1,
                    oy + y1,
                    ox + x2,
                    oy + y2,
                    *thickness,
                    (*color).into(),
                ),
                DrawOp::Arc {
                    x,
                    y,
                    radius,
                    rotation,
                    sweep,
                    thickness,
                    color,
                } => draw_arc(
                    ox + x,
                    oy + y,
                    48,
                    *radius,
                    *rotation,
                    *thickness,
                    *sweep,
                    (*color).into(),
                ),
                DrawOp::Text {
                    text,
                    x,
                    y,
                    size,
                    color,
                } => {
                    draw_text(text, ox + x, oy + y, *size, (*color).into());
                }
                DrawOp::Veil(color) => {
                    draw_rectangle(0.0, 0.0, screen_width(), screen_height(), (*color).into())
                }
            }
        }
    }
}
