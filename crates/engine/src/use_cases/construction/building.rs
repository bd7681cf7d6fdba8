//! Building: a two-storey timber house facing south, one per channel.

use guildcraft_domain::layout::BUILDING_CLEARANCE;
use guildcraft_domain::{BlockPos, DomainError, LayoutConfig, MemberPayload};

use super::blocks::{fill, setblock, sign_lines, wall_sign, Facing};
use super::{BuildPhase, BuildPlan};

/// Smallest footprint with room for a door, a ladder and a window.
const MIN_FOOTPRINT: i32 = 5;

/// Ground floor is `y..y+2`, the upper floor is laid at `y+3`.
const STOREY: i32 = 3;

/// Top of the shell walls, relative to ground.
const WALL_TOP: i32 = 2 * STOREY;

// Roof sits on top of the walls and must stay under the track decks.
const _: () = assert!(WALL_TOP + 1 < BUILDING_CLEARANCE);

pub(super) fn plan(member: &MemberPayload, layout: &LayoutConfig) -> Result<BuildPlan, DomainError> {
    let h = half_width(layout)?;
    let p = member.position().at_height(layout.base_y);

    let mut plan = BuildPlan::new();

    let mut foundation = fill(p.offset(-h, -1, -h), p.offset(h, -1, h), "cobblestone");
    foundation.extend(fill(
        p.offset(-h - 1, 0, -h - 1),
        p.offset(h + 1, BUILDING_CLEARANCE, h + 1),
        "air",
    ));
    plan.push(BuildPhase::Foundation, foundation)?;

    let mut shell = fill(p.offset(-h, 0, -h), p.offset(h, WALL_TOP, h), "oak_planks");
    for (dx, dz) in [(-h, -h), (h, -h), (-h, h), (h, h)] {
        let corner = p.offset(dx, 0, dz);
        shell.extend(fill(corner, corner.offset(0, WALL_TOP, 0), "oak_log"));
    }
    plan.push(BuildPhase::Shell, shell)?;

    plan.push(
        BuildPhase::Hollow,
        fill(
            p.offset(-h + 1, 0, -h + 1),
            p.offset(h - 1, WALL_TOP, h - 1),
            "air",
        ),
    )?;

    plan.push(
        BuildPhase::Floors,
        fill(
            p.offset(-h + 1, STOREY, -h + 1),
            p.offset(h - 1, STOREY, h - 1),
            "spruce_planks",
        ),
    )?;

    let (door_bottom, door_top) = doorway(member, layout)?;
    let mut openings = fill(door_bottom, door_top, "air");
    for dy in [1, STOREY + 2] {
        for (from, to) in [
            (p.offset(-1, dy, -h), p.offset(1, dy, -h)),
            (p.offset(-h, dy, -1), p.offset(-h, dy, 1)),
            (p.offset(h, dy, -1), p.offset(h, dy, 1)),
        ] {
            openings.extend(fill(from, to, "glass_pane"));
        }
    }
    openings.extend(fill(
        p.offset(-1, STOREY + 2, h),
        p.offset(1, STOREY + 2, h),
        "glass_pane",
    ));
    let stairwell = p.offset(h - 1, STOREY, -h + 1);
    openings.push(setblock(stairwell, "air"));
    plan.push(BuildPhase::Openings, openings)?;

    plan.push(
        BuildPhase::Roof,
        fill(
            p.offset(-h - 1, WALL_TOP + 1, -h - 1),
            p.offset(h + 1, WALL_TOP + 1, h + 1),
            "dark_oak_planks",
        ),
    )?;

    let mut fixtures = fill(
        BlockPos::new(stairwell.x, p.y, stairwell.z),
        stairwell,
        "ladder[facing=west]",
    );
    fixtures.push(setblock(p.offset(0, STOREY - 1, 0), "lantern[hanging=true]"));
    fixtures.push(setblock(p.offset(0, WALL_TOP, 0), "lantern[hanging=true]"));
    plan.push(BuildPhase::Fixtures, fixtures)?;

    plan.push(BuildPhase::Signage, vec![sign(member, layout)?])?;

    Ok(plan)
}

/// Rewrite the sign only. Used when a channel is renamed or its topic
/// changes; the rest of the building is left alone.
pub(super) fn plan_signage(
    member: &MemberPayload,
    layout: &LayoutConfig,
) -> Result<BuildPlan, DomainError> {
    let mut plan = BuildPlan::new();
    plan.push(BuildPhase::Signage, vec![sign(member, layout)?])?;
    Ok(plan)
}

fn sign(member: &MemberPayload, layout: &LayoutConfig) -> Result<String, DomainError> {
    let lines = sign_lines(
        &member.name,
        member.topic.as_deref(),
        &format!("#{}", member.member_index),
    );
    Ok(wall_sign(sign_position(member, layout)?, Facing::South, &lines))
}

pub(super) fn half_width(layout: &LayoutConfig) -> Result<i32, DomainError> {
    if layout.building_footprint < MIN_FOOTPRINT {
        return Err(DomainError::validation(format!(
            "building footprint {} is below the minimum of {MIN_FOOTPRINT}",
            layout.building_footprint
        )));
    }
    Ok(layout.building_footprint / 2)
}

/// Two-high gap in the middle of the south wall.
pub(super) fn doorway(
    member: &MemberPayload,
    layout: &LayoutConfig,
) -> Result<(BlockPos, BlockPos), DomainError> {
    let h = half_width(layout)?;
    let bottom = member.position().at_height(layout.base_y).offset(0, 0, h);
    Ok((bottom, bottom.offset(0, 1, 0)))
}

/// Outside the south wall, on the lintel above the door.
pub(super) fn sign_position(
    member: &MemberPayload,
    layout: &LayoutConfig,
) -> Result<BlockPos, DomainError> {
    let h = half_width(layout)?;
    Ok(member
        .position()
        .at_height(layout.base_y)
        .offset(0, 2, h + 1))
}
