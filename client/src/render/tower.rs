use arcade_shared::{
    lane_y, TowerSnapshot, TroopType, Unit, TOWER_HEIGHT, TOWER_LANES, TOWER_SIZE, TOWER_WIDTH,
    UNIT_SIZE,
};

use super::{DrawOp, FrameBuilder, Layer, PaintContext, Palette, RenderError, Rgba};

pub fn paint_background(palette: &Palette, frame: &mut FrameBuilder) {
    frame.push(Layer::Background, DrawOp::Clear(palette.background));

    let lane_height = TOWER_HEIGHT / TOWER_LANES as f32;
    for lane in 0..TOWER_LANES {
        let shade = if lane % 2 == 0 {
            palette.arena
        } else {
            palette.background
        };
        frame.push(
            Layer::Background,
            DrawOp::Rect {
                x: 0.0,
                y: lane as f32 * lane_height,
                w: TOWER_WIDTH,
                h: lane_height,
                color: shade,
            },
        );
        frame.push(
            Layer::Background,
            DrawOp::Line {
                x1: 0.0,
                y1: lane_y(lane),
                x2: TOWER_WIDTH,
                y2: lane_y(lane),
                thickness: 1.0,
                color: palette.lines,
            },
        );
    }
}

pub fn paint_entities(
    snapshot: &TowerSnapshot,
    ctx: &PaintContext<'_>,
    frame: &mut FrameBuilder,
) -> Result<(), RenderError> {
    for side in 0..2 {
        let tower = snapshot.towers[side];
        let center = TowerSnapshot::tower_center(side);
        let color = if ctx.eliminated.contains(&side) {
            ctx.palette.eliminated
        } else {
            ctx.palette.player(side)
        };
        let x = center.x - TOWER_SIZE / 2.0;
        let y = center.y - TOWER_SIZE / 2.0;

        frame.push(
            Layer::Entities,
            DrawOp::Rect {
                x,
                y,
                w: TOWER_SIZE,
                h: TOWER_SIZE,
                color,
            },
        );
        if ctx.local_seat == Some(side) {
            frame.push(
                Layer::Entities,
                DrawOp::RectLines {
                    x,
                    y,
                    w: TOWER_SIZE,
                    h: TOWER_SIZE,
                    thickness: 2.0,
                    color: ctx.palette.text,
                },
            );
        }
        health_bar(
            frame,
            x,
            y - 12.0,
            TOWER_SIZE,
            tower.hp,
            tower.max_hp,
            color,
            ctx.palette.lines,
        );

        let gold_x = if side == 0 { 20.0 } else { TOWER_WIDTH - 140.0 };
        frame.push(
            Layer::Entities,
            DrawOp::Text {
                text: format!("Gold: {}", snapshot.gold[side]),
                x: gold_x,
                y: TOWER_HEIGHT + 40.0,
                size: 24.0,
                color: ctx.palette.text,
            },
        );
    }

    for unit in &snapshot.units {
        paint_unit(unit, ctx, frame)?;
    }

    Ok(())
}

fn paint_unit(unit: &Unit, ctx: &PaintContext<'_>, frame: &mut FrameBuilder) -> Result<(), RenderError> {
    if unit.lane >= TOWER_LANES {
        return Err(RenderError::MissingSubject(unit.id as usize));
    }

    let pos = unit.position();
    let color = ctx.palette.player(unit.owner as usize);
    let half = UNIT_SIZE / 2.0;

    match unit.troop {
        TroopType::Soldier => frame.push(
            Layer::Entities,
            DrawOp::Circle {
                x: pos.x,
                y: pos.y,
                radius: half,
                color,
            },
        ),
        TroopType::Archer => {
            frame.push(
                Layer::Entities,
                DrawOp::Line {
                    x1: pos.x - half,
                    y1: pos.y + half,
                    x2: pos.x,
                    y2: pos.y - half,
                    thickness: 3.0,
                    color,
                },
            );
            frame.push(
                Layer::Entities,
                DrawOp::Line {
                    x1: pos.x,
                    y1: pos.y - half,
                    x2: pos.x + half,
                    y2: pos.y + half,
                    thickness: 3.0,
                    color,
                },
            );
        }
        TroopType::Tank => frame.push(
            Layer::Entities,
            DrawOp::Rect {
                x: pos.x - half,
                y: pos.y - half,
                w: UNIT_SIZE,
                h: UNIT_SIZE,
                color,
            },
        ),
    }

    health_bar(
        frame,
        pos.x - half,
        pos.y - half - 6.0,
        UNIT_SIZE,
        unit.hp,
        unit.max_hp,
        color,
        ctx.palette.lines,
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn health_bar(
    frame: &mut FrameBuilder,
    x: f32,
    y: f32,
    width: f32,
    hp: u32,
    max_hp: u32,
    fill: Rgba,
    empty: Rgba,
) {
    let ratio = if max_hp == 0 {
        0.0
    } else {
        (hp as f32 / max_hp as f32).clamp(0.0, 1.0)
    };
    frame.push(
        Layer::Entities,
        DrawOp::Rect {
            x,
            y,
            w: width,
            h: 4.0,
            color: empty,
        },
    );
    frame.push(
        Layer::Entities,
        DrawOp::Rect {
            x,
            y,
            w: width * ratio,
            h: 4.0,
            color: fill,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_shared::Tower;
    use std::collections::BTreeSet;

    fn unit(id: u32, troop: TroopType, lane: u8) -> Unit {
        Unit {
            id,
            owner: 0,
            troop,
            lane,
            x: 300.0,
            hp: 5,
            max_hp: 10,
        }
    }

    fn snapshot(units: Vec<Unit>) -> TowerSnapshot {
        TowerSnapshot {
            tick: 1,
            towers: [
                Tower {
                    hp: 100,
                    max_hp: 100,
                },
                Tower {
                    hp: 25,
                    max_hp: 100,
                },
            ],
            units,
            gold: [10, 20],
            game_over: false,
            winner: None,
        }
    }

    #[test]
    fn test_health_bar_scales_with_hp() {
        let palette = Palette::classic();
        let eliminated = BTreeSet::new();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: Some(0),
            eliminated: &eliminated,
        };
        let mut frame = FrameBuilder::new();
        paint_entities(&snapshot(vec![]), &ctx, &mut frame).unwrap();

        let widths: Vec<f32> = frame
            .layer(Layer::Entities)
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { w, h, color, .. } if *h == 4.0 && *color != palette.lines => {
                    Some(*w)
                }
                _ => None,
            })
            .collect();
        assert_eq!(widths, vec![TOWER_SIZE, TOWER_SIZE * 0.25]);
    }

    #[test]
    fn test_each_troop_has_a_shape() {
        let palette = Palette::classic();
        let eliminated = BTreeSet::new();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: None,
            eliminated: &eliminated,
        };

        for troop in TroopType::ALL {
            let mut frame = FrameBuilder::new();
            paint_unit(&unit(1, troop, 0), &ctx, &mut frame).unwrap();
            assert!(frame.layer(Layer::Entities).len() >= 3);
        }
    }

    #[test]
    fn test_unit_outside_lanes_is_an_error() {
        let palette = Palette::classic();
        let eliminated = BTreeSet::new();
        let ctx = PaintContext {
            palette: &palette,
            local_seat: None,
            eliminated: &eliminated,
        };
        let mut frame = FrameBuilder::new();
        assert_eq!(
            paint_entities(
                &snapshot(vec![unit(9, TroopType::Tank, TOWER_LANES)]),
                &ctx,
                &mut frame
            ),
            Err(RenderError::MissingSubject(9))
        );
    }
}
