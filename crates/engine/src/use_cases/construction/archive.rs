//! Archival: seal doorways and re-sign. Nothing is torn down.

use guildcraft_domain::{ArchiveGroupPayload, DomainError, LayoutConfig, MemberPayload};

use super::blocks::{fill, sign_lines, wall_sign, Facing};
use super::{building, village, BuildPhase, BuildPlan};

const ARCHIVED: &str = "[ARCHIVED]";

pub(super) fn plan_member(
    member: &MemberPayload,
    layout: &LayoutConfig,
) -> Result<BuildPlan, DomainError> {
    let mut plan = BuildPlan::new();
    plan.push(BuildPhase::Shell, seal_door(member, layout)?)?;
    plan.push(BuildPhase::Signage, vec![member_sign(member, layout)?])?;
    Ok(plan)
}

/// The village and every building in it, archived together.
pub(super) fn plan_group(
    archive: &ArchiveGroupPayload,
    layout: &LayoutConfig,
) -> Result<BuildPlan, DomainError> {
    let group = &archive.group;
    let r = village::plaza_radius(layout)?;
    let center = group.center().at_height(layout.base_y);

    let mut shell: Vec<String> = village::entrances(center, r)
        .into_iter()
        .flat_map(|(from, to)| fill(from, to, "mossy_cobblestone_wall"))
        .collect();
    for member in &archive.members {
        shell.extend(seal_door(member, layout)?);
    }

    let lines = sign_lines(ARCHIVED, Some(&group.name), "");
    let mut signage = vec![wall_sign(
        village::sign_position(group, layout),
        Facing::South,
        &lines,
    )];
    for member in &archive.members {
        signage.push(member_sign(member, layout)?);
    }

    let mut plan = BuildPlan::new();
    plan.push(BuildPhase::Shell, shell)?;
    plan.push(BuildPhase::Signage, signage)?;
    Ok(plan)
}

fn seal_door(member: &MemberPayload, layout: &LayoutConfig) -> Result<Vec<String>, DomainError> {
    let (bottom, top) = building::doorway(member, layout)?;
    Ok(fill(bottom, top, "mossy_cobblestone"))
}

fn member_sign(member: &MemberPayload, layout: &LayoutConfig) -> Result<String, DomainError> {
    let lines = sign_lines(ARCHIVED, Some(&member.name), &format!("#{}", member.member_index));
    Ok(wall_sign(
        building::sign_position(member, layout)?,
        Facing::South,
        &lines,
    ))
}

#[cfg(test)]
mod tests {
    use guildcraft_domain::{GroupId, GroupPayload, MemberId};

    use super::*;
    use crate::test_fixtures::VoxelWorld;

    fn member(index: u32, x: i32, z: i32) -> MemberPayload {
        MemberPayload {
            group_id: GroupId::from_raw(1),
            member_id: MemberId::from_raw(i64::from(index) + 1),
            external_id: format!("chan-{index}"),
            group_name: "Lounge".into(),
            name: format!("room-{index}"),
            topic: None,
            member_index: index,
            x,
            z,
        }
    }

    fn apply(plan: &BuildPlan, world: &mut VoxelWorld) {
        for command in plan.commands() {
            world.apply(command).expect("apply");
        }
    }

    #[test]
    fn archived_building_is_sealed_but_still_standing() {
        let layout = LayoutConfig::default();
        let y = layout.base_y;
        let m = member(2, 100, 50);

        let mut world = VoxelWorld::new();
        apply(&building::plan(&m, &layout).expect("build"), &mut world);
        apply(&plan_member(&m, &layout).expect("archive"), &mut world);

        assert_eq!(world.block(100, y, 54), Some("mossy_cobblestone"));
        assert_eq!(world.block(100, y + 1, 54), Some("mossy_cobblestone"));
        assert_eq!(world.block(96, y, 50), Some("oak_planks"));
        assert_eq!(world.block(100, y + 3, 50), Some("spruce_planks"));
        let sign = world.block(100, y + 2, 55).expect("sign");
        assert!(sign.contains(ARCHIVED));
        assert!(sign.contains("room-2"));
    }

    #[test]
    fn group_archive_seals_the_plaza_and_every_building() {
        let layout = LayoutConfig::default();
        let y = layout.base_y;
        let r = layout.plaza_radius;
        let payload = ArchiveGroupPayload {
            group: GroupPayload {
                group_id: GroupId::from_raw(1),
                external_id: "cat-1".into(),
                name: "Lounge".into(),
                ordinal_index: 1,
                center_x: 240,
                center_z: 0,
            },
            members: vec![member(0, 226, -14), member(1, 240, -14)],
        };

        let plan = plan_group(&payload, &layout).expect("plan");
        let mut world = VoxelWorld::new();
        apply(&plan, &mut world);

        assert_eq!(world.block(240, y, -r), Some("mossy_cobblestone_wall"));
        assert_eq!(world.block(240 + r, y, 1), Some("mossy_cobblestone_wall"));
        assert_eq!(world.block(226, y, -10), Some("mossy_cobblestone"));
        assert_eq!(world.block(240, y + 1, -10), Some("mossy_cobblestone"));
        assert!(world
            .block(240, y + 1, 3)
            .expect("village sign")
            .contains(ARCHIVED));
        assert!(world
            .block(226, y + 2, -9)
            .expect("building sign")
            .contains("room-0"));
    }
}
