//! Village: a paved plaza with a well, a low wall and a raised station deck
//! that tracks leave from.

use guildcraft_domain::layout::station_position;
use guildcraft_domain::{BlockPos, DomainError, GroupPayload, LayoutConfig};

use super::blocks::{fill, setblock, sign_lines, wall_sign, Facing};
use super::{BuildPhase, BuildPlan};

/// Smallest plaza that fits the well and a ring of walkway.
const MIN_PLAZA_RADIUS: i32 = 4;

/// Half-width of the well and of the station deck.
const WELL_RADIUS: i32 = 2;

pub(super) fn plan(group: &GroupPayload, layout: &LayoutConfig) -> Result<BuildPlan, DomainError> {
    let r = plaza_radius(layout)?;
    let y = layout.base_y;
    let c = group.center().at_height(y);
    let station = station_position(group.center(), layout);
    let t = station.y;

    let mut plan = BuildPlan::new();

    let mut foundation = fill(c.offset(-r, -1, -r), c.offset(r, -1, r), "stone_bricks");
    foundation.extend(fill(c.offset(-r, 0, -r), c.offset(r, 4, r), "air"));
    plan.push(BuildPhase::Foundation, foundation)?;

    let w = WELL_RADIUS;
    let mut shell = fill(c.offset(-w, 0, -w), c.offset(w, 1, w), "cobblestone");
    for (from, to) in plaza_edges(c, r) {
        shell.extend(fill(from, to, "cobblestone_wall"));
    }
    for (dx, dz) in [(-w, -w), (w, -w), (-w, w), (w, w)] {
        let column = c.offset(dx, 0, dz);
        shell.extend(fill(column, BlockPos::new(column.x, t - 2, column.z), "stone_bricks"));
    }
    plan.push(BuildPhase::Shell, shell)?;

    let mut hollow = fill(c.offset(-1, 0, -1), c.offset(1, 0, 1), "water");
    hollow.extend(fill(c.offset(-1, 1, -1), c.offset(1, 1, 1), "air"));
    plan.push(BuildPhase::Hollow, hollow)?;

    let deck = station.offset(0, -1, 0);
    plan.push(
        BuildPhase::Floors,
        fill(deck.offset(-w, 0, -w), deck.offset(w, 0, w), "smooth_stone"),
    )?;

    let openings = entrances(c, r)
        .into_iter()
        .flat_map(|(from, to)| fill(from, to, "air"))
        .collect();
    plan.push(BuildPhase::Openings, openings)?;

    let mut fixtures = Vec::new();
    let post = r - 2;
    for (dx, dz) in [(-post, -post), (post, -post), (-post, post), (post, post)] {
        let base = c.offset(dx, 0, dz);
        fixtures.extend(fill(base, base.offset(0, 1, 0), "oak_fence"));
        fixtures.push(setblock(base.offset(0, 2, 0), "lantern"));
    }
    // Climbs the south-east pillar up to the deck.
    let ladder = c.offset(w, 0, w + 1);
    fixtures.extend(fill(
        ladder,
        BlockPos::new(ladder.x, t - 1, ladder.z),
        "ladder[facing=south]",
    ));
    plan.push(BuildPhase::Fixtures, fixtures)?;

    let lines = sign_lines(
        &group.name,
        None,
        &format!("Village #{}", group.ordinal_index),
    );
    plan.push(
        BuildPhase::Signage,
        vec![wall_sign(sign_position(group, layout), Facing::South, &lines)],
    )?;

    Ok(plan)
}

pub(super) fn plaza_radius(layout: &LayoutConfig) -> Result<i32, DomainError> {
    if layout.plaza_radius < MIN_PLAZA_RADIUS {
        return Err(DomainError::validation(format!(
            "plaza radius {} is below the minimum of {MIN_PLAZA_RADIUS}",
            layout.plaza_radius
        )));
    }
    Ok(layout.plaza_radius)
}

/// On the south face of the well.
pub(super) fn sign_position(group: &GroupPayload, layout: &LayoutConfig) -> BlockPos {
    group
        .center()
        .at_height(layout.base_y)
        .offset(0, 1, WELL_RADIUS + 1)
}

/// Three-wide gaps in the middle of each side of the plaza wall.
pub(super) fn entrances(c: BlockPos, r: i32) -> [(BlockPos, BlockPos); 4] {
    [
        (c.offset(-1, 0, -r), c.offset(1, 0, -r)),
        (c.offset(-1, 0, r), c.offset(1, 0, r)),
        (c.offset(-r, 0, -1), c.offset(-r, 0, 1)),
        (c.offset(r, 0, -1), c.offset(r, 0, 1)),
    ]
}

fn plaza_edges(c: BlockPos, r: i32) -> [(BlockPos, BlockPos); 4] {
    [
        (c.offset(-r, 0, -r), c.offset(r, 0, -r)),
        (c.offset(-r, 0, r), c.offset(r, 0, r)),
        (c.offset(-r, 0, -r), c.offset(-r, 0, r)),
        (c.offset(r, 0, -r), c.offset(r, 0, r)),
    ]
}
