use arcade_shared::{
    PongSnapshot, BALL_RADIUS, PADDLE_HEIGHT, PADDLE_WIDTH, PONG_HEIGHT, PONG_WIDTH,
};

use super::{DrawOp, FrameBuilder, Layer, PaintContext, Palette, RenderError};

const DASH_HEIGHT: f32 = 18.0;
const DASH_GAP: f32 = 14.0;

pub fn paint_background(palette: &Palette, frame: &mut FrameBuilder) {
    frame.push(Layer::Background, DrawOp::Clear(palette.background));
    frame.push(
        Layer::Background,
        DrawOp::Rect {
            x: 0.0,
            y: 0.0,
            w: PONG_WIDTH,
            h: PONG_HEIGHT,
            color: palette.arena,
        },
    );

    let center = PONG_WIDTH / 2.0;
    let mut y = DASH_GAP / 2.0;
    while y < PONG_HEIGHT {
        frame.push(
            Layer::Background,
            DrawOp::Rect {
                x: center - 2.0,
                y,
                w: 4.0,
                h: DASH_HEIGHT.min(PONG_HEIGHT - y),
                color: palette.lines,
            },
        );
        y += DASH_HEIGHT + DASH_GAP;
    }
}

pub fn paint_entities(
    snapshot: &PongSnapshot,
    ctx: &PaintContext<'_>,
    frame: &mut FrameBuilder,
) -> Result<(), RenderError> {
    for side in 0..2 {
        let x = PongSnapshot::paddle_x(side);
        let y = snapshot.paddle_y[side];
        let color = if ctx.eliminated.contains(&side) {
            ctx.palette.eliminated
        } else {
            ctx.palette.player(side)
        };

        frame.push(
            Layer::Entities,
            DrawOp::Rect {
                x,
                y,
                w: PADDLE_WIDTH,
                h: PADDLE_HEIGHT,
                color,
            },
        );

        if ctx.local_seat == Some(side) {
            frame.push(
                Layer::Entities,
                DrawOp::RectLines {
                    x: x - 2.0,
                    y: y - 2.0,
                    w: PADDLE_WIDTH + 4.0,
                    h: PADDLE_HEIGHT + 4.0,
                    thickness: 2.0,
                    color: ctx.palette.text,
                },
            );
        }

        let label_x = if side == 0 { 40.0 } else { PONG_WIDTH - 160.0 };
        frame.push(
            Layer::Entities,
            DrawOp::Text {
                text: format!("Lives: {}", snapshot.lives[side]),
                x: label_x,
                y: 30.0,
                size: 24.0,
                color,
            },
        );
    }

    frame.push(
        Layer::Entities,
        DrawOp::Text {
            text: format!("{}  -  {}", snapshot.scores[0], snapshot.scores[1]),
            x: PONG_WIDTH / 2.0 - 48.0,
            y: 44.0,
            size: 40.0,
            color: ctx.palette.text,
        },
    );

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
    use super::*;
    use arcade_shared::Ball;
    use std::collections::BTreeSet;

    fn snapshot() -> PongSnapshot {
        PongSnapshot {
            tick: 4,
            paddle_y: [50.0, 250.0],
            ball: Ball::at(120.0, 80.0),
            lives: [3, 1],
            scores: [2, 0],
            game_over: false,
            winner: None,
        }
    }

    #[test]
    fn test_paddles_and_ball() {
        let palette = Palette::classic();
        let eliminated = BTreeSet::new();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: Some(1),
            eliminated: &eliminated,
        };
        let mut frame = FrameBuilder::new();
        paint_entities(&snapshot(), &ctx, &mut frame).unwrap();

        let ops = frame.layer(Layer::Entities);
        let paddles: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Rect { h, .. } if *h == PADDLE_HEIGHT))
            .collect();
        assert_eq!(paddles.len(), 2);
        assert_eq!(
            ops.iter()
                .filter(|op| matches!(op, DrawOp::RectLines { .. }))
                .count(),
            1
        );
        assert!(ops.contains(&DrawOp::Circle {
            x: 120.0,
            y: 80.0,
            radius: BALL_RADIUS,
            color: palette.ball,
        }));
    }

    #[test]
    fn test_eliminated_side_is_greyed() {
        let palette = Palette::classic();
        let eliminated: BTreeSet<usize> = [1].into_iter().collect();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: None,
            eliminated: &eliminated,
        };
        let mut frame = FrameBuilder::new();
        paint_entities(&snapshot(), &ctx, &mut frame).unwrap();

        assert!(frame.layer(Layer::Entities).contains(&DrawOp::Rect {
            x: PongSnapshot::paddle_x(1),
            y: 250.0,
            w: PADDLE_WIDTH,
            h: PADDLE_HEIGHT,
            color: palette.eliminated,
        }));
    }
}
