//! Track: a raised rail line from one station deck to another.

use guildcraft_domain::layout::{is_boost_step, track_path};
use guildcraft_domain::{DomainError, GroundPos, LayoutConfig, LinkPayload};

use super::blocks::{fill, setblock};
use super::{BuildPhase, BuildPlan};

/// Air kept clear above the rails.
const HEADROOM: i32 = 2;

pub(super) fn plan(link: &LinkPayload, layout: &LayoutConfig) -> Result<BuildPlan, DomainError> {
    let t = layout.track_y();
    let path = track_path(link.from.center(), link.to.center());
    let segments = runs(&path);
    let boosts: Vec<GroundPos> = path
        .iter()
        .enumerate()
        .filter(|(step, _)| is_boost_step(*step, layout.boost_interval))
        .map(|(_, at)| *at)
        .collect();

    let mut plan = BuildPlan::new();

    let mut foundation: Vec<String> = segments
        .iter()
        .flat_map(|(a, b)| fill(a.at_height(t - 1), b.at_height(t - 1), "stone_bricks"))
        .collect();
    foundation.extend(
        boosts
            .iter()
            .map(|at| setblock(at.at_height(t - 1), "redstone_block")),
    );
    plan.push(BuildPhase::Foundation, foundation)?;

    plan.push(
        BuildPhase::Hollow,
        segments
            .iter()
            .flat_map(|(a, b)| fill(a.at_height(t), b.at_height(t + HEADROOM), "air"))
            .collect(),
    )?;

    let mut rails: Vec<String> = segments
        .iter()
        .flat_map(|(a, b)| fill(a.at_height(t), b.at_height(t), "rail"))
        .collect();
    rails.extend(
        boosts
            .iter()
            .map(|at| setblock(at.at_height(t), "powered_rail")),
    );
    plan.push(BuildPhase::Fixtures, rails)?;

    Ok(plan)
}

/// Split a path into maximal straight pieces along one axis, so each piece
/// is a single box. Diagonal stretches come out as one piece per step.
fn runs(path: &[GroundPos]) -> Vec<(GroundPos, GroundPos)> {
    let mut out = Vec::new();
    let mut points = path.iter().copied();
    let Some(first) = points.next() else {
        return out;
    };
    let (mut start, mut end) = (first, first);
    for at in points {
        let along_x = at.z == start.z && end.z == start.z;
        let along_z = at.x == start.x && end.x == start.x;
        if along_x || along_z {
            end = at;
        } else {
            out.push((start, end));
            start = at;
            end = at;
        }
    }
    out.push((start, end));
    out
}
