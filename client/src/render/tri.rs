//! Circular three-player arena. Each player guards a 120 degree sector of the rim.

use arcade_shared::{
    tri_center, tri_rim_point, TriSnapshot, BALL_RADIUS, TRI_PADDLE_ARC, TRI_PADDLE_THICKNESS,
    TRI_PLAYERS, TRI_RADIUS,
};
use std::f32::consts::{FRAC_PI_2, TAU};

use super::{DrawOp, FrameBuilder, Layer, PaintContext, Palette, RenderError};

const SECTOR: f32 = TAU / TRI_PLAYERS as f32;

/// Center angle of a player's sector, in radians. Player 0 sits at the bottom.
pub fn sector_center(index: usize) -> f32 {
    FRAC_PI_2 + index as f32 * SECTOR
}

pub fn paint_background(palette: &Palette, frame: &mut FrameBuilder) {
    let center = tri_center();
    frame.push(Layer::Background, DrawOp::Clear(palette.background));
    frame.push(
        Layer::Background,
        DrawOp::Circle {
            x: center.x,
            y: center.y,
            radius: TRI_RADIUS,
            color: palette.arena,
        },
    );
    frame.push(
        Layer::Background,
        DrawOp::Ring {
            x: center.x,
            y: center.y,
            radius: TRI_RADIUS,
            thickness: 2.0,
            color: palette.lines,
        },
    );

    for index in 0..TRI_PLAYERS {
        let edge = tri_rim_point(sector_center(index) + SECTOR / 2.0, 0.0);
        frame.push(
            Layer::Background,
            DrawOp::Line {
                x1: center.x,
                y1: center.y,
                x2: edge.x,
                y2: edge.y,
                thickness: 1.0,
                color: palette.lines,
            },
        );
    }
}

pub fn paint_entities(
    snapshot: &TriSnapshot,
    ctx: &PaintContext<'_>,
    frame: &mut FrameBuilder,
) -> Result<(), RenderError> {
    let center = tri_center();

    for index in 0..TRI_PLAYERS {
        let paddle = snapshot
            .players
            .get(index)
            .ok_or(RenderError::MissingSubject(index))?;

        if ctx.eliminated.contains(&index) {
            // The sector is walled off once its player is out.
            let start = sector_center(index) - SECTOR / 2.0;
            frame.push(
                Layer::Entities,
                DrawOp::Arc {
                    x: center.x,
                    y: center.y,
                    radius: TRI_RADIUS - TRI_PADDLE_THICKNESS,
                    rotation: start.to_degrees(),
                    sweep: SECTOR.to_degrees(),
                    thickness: TRI_PADDLE_THICKNESS,
                    color: ctx.palette.eliminated,
                },
            );
        } else {
            let color = ctx.palette.player(index);
            frame.push(
                Layer::Entities,
                DrawOp::Arc {
                    x: center.x,
                    y: center.y,
                    radius: TRI_RADIUS - TRI_PADDLE_THICKNESS,
                    rotation: (paddle.angle - TRI_PADDLE_ARC / 2.0).to_degrees(),
                    sweep: TRI_PADDLE_ARC.to_degrees(),
                    thickness: TRI_PADDLE_THICKNESS,
                    color,
                },
            );
            if ctx.local_seat == Some(index) {
                let marker = tri_rim_point(paddle.angle, TRI_PADDLE_THICKNESS * 2.5);
                frame.push(
                    Layer::Entities,
                    DrawOp::Circle {
                        x: marker.x,
                        y: marker.y,
                        radius: 4.0,
                        color: ctx.palette.text,
                    },
                );
            }
        }

        let label = tri_rim_point(sector_center(index), 60.0);
        frame.push(
            Layer::Entities,
            DrawOp::Text {
                text: format!("P{} {}", index + 1, paddle.lives),
                x: label.x - 24.0,
                y: label.y,
                size: 22.0,
                color: ctx.palette.text,
            },
        );
    }

    if !snapshot.game_over {
        frame.push(
            Layer::Entities,
            DrawOp::Circle {
                x: snapshot.ball.x,
                y: snapshot.ball.y,
                radius: BALL_RADIUS,
                color: ctx.palette.ball,
            },
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::Rgba;
    use super::*;
    use arcade_shared::{Ball, TriPaddle};
    use assert_approx_eq::assert_approx_eq;
    use std::collections::BTreeSet;

    fn snapshot() -> TriSnapshot {
        TriSnapshot {
            tick: 2,
            players: (0..3)
                .map(|i| TriPaddle {
                    angle: sector_center(i),
                    lives: 3,
                })
                .collect(),
            ball: Ball::at(400.0, 300.0),
            game_over: false,
            winner: None,
        }
    }

    fn arcs(frame: &FrameBuilder) -> Vec<(f32, Rgba)> {
        frame
            .layer(Layer::Entities)
            .iter()
            .filter_map(|op| match op {
                DrawOp::Arc { sweep, color, .. } => Some((*sweep, *color)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sectors_cover_the_circle() {
        let total: f32 = (0..3).map(|_| SECTOR).sum();
        assert_approx_eq!(total, TAU, 0.0001);
        assert_approx_eq!(sector_center(1) - sector_center(0), SECTOR, 0.0001);
    }

    #[test]
    fn test_eliminated_sector_is_walled() {
        let palette = Palette::classic();
        let eliminated: BTreeSet<usize> = [2].into_iter().collect();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: Some(0),
            eliminated: &eliminated,
        };
        let mut frame = FrameBuilder::new();
        paint_entities(&snapshot(), &ctx, &mut frame).unwrap();

        let arcs = arcs(&frame);
        assert_eq!(arcs.len(), 3);
        assert_approx_eq!(arcs[2].0, 120.0, 0.001);
        assert_eq!(arcs[2].1, palette.eliminated);
        assert_eq!(arcs[0].1, palette.player(0));
    }

    #[test]
    fn test_missing_player_is_an_error() {
        let palette = Palette::classic();
        let eliminated = BTreeSet::new();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: None,
            eliminated: &eliminated,
        };
        let mut short = snapshot();
        short.players.truncate(2);

        let mut frame = FrameBuilder::new();
        assert_eq!(
            paint_entities(&short, &ctx, &mut frame),
            Err(RenderError::MissingSubject(2))
        );
    }
}
