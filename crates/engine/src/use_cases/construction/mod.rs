//! Construction generators.
//!
//! A generator turns a job payload into a [`BuildPlan`]: ordered steps of
//! world commands, each tagged with the [`BuildPhase`] it belongs to.
//! Plans are pure data; [`Generators::execute`] sends them step by step.
//!
//! Every generator is idempotent. It writes absolute block states at
//! absolute positions taken from the payload, so running a plan twice leaves
//! the world exactly as running it once.

mod archive;
pub mod blocks;
mod building;
mod track;
mod village;

use std::fmt;

use guildcraft_domain::{DomainError, JobPayload, LayoutConfig};

use crate::infrastructure::ports::{CommandError, CommandSink};

/// Construction order. A plan may skip phases but never go back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildPhase {
    Foundation,
    Shell,
    Hollow,
    Floors,
    Openings,
    Roof,
    Fixtures,
    Signage,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub phase: BuildPhase,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    steps: Vec<BuildStep>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. Empty steps are dropped.
    pub fn push(&mut self, phase: BuildPhase, commands: Vec<String>) -> Result<(), DomainError> {
        if let Some(last) = self.steps.last() {
            if phase < last.phase {
                return Err(DomainError::invalid_state_transition(format!(
                    "{phase} cannot follow {}",
                    last.phase
                )));
            }
        }
        if !commands.is_empty() {
            self.steps.push(BuildStep { phase, commands });
        }
        Ok(())
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .flat_map(|step| step.commands.iter().map(String::as_str))
    }

    pub fn command_count(&self) -> usize {
        self.steps.iter().map(|step| step.commands.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("Invalid build plan: {0}")]
    Plan(#[from] DomainError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Entry point for every structure the engine knows how to build.
#[derive(Debug, Clone)]
pub struct Generators {
    layout: LayoutConfig,
}

impl Generators {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Plan the construction a job asks for.
    pub fn plan(&self, payload: &JobPayload) -> Result<BuildPlan, ConstructionError> {
        self.layout.validate()?;
        let plan = match payload {
            JobPayload::CreateGroup(group) => village::plan(group, &self.layout)?,
            JobPayload::CreateMember(member) => building::plan(member, &self.layout)?,
            JobPayload::UpdateMember(member) => building::plan_signage(member, &self.layout)?,
            JobPayload::CreateLink(link) => track::plan(link, &self.layout)?,
            JobPayload::ArchiveMember(member) => archive::plan_member(member, &self.layout)?,
            JobPayload::ArchiveGroup(group) => archive::plan_group(group, &self.layout)?,
        };
        Ok(plan)
    }

    /// Send every step in order, one batch per step. The first failure
    /// aborts the rest and is returned as is.
    pub async fn execute(
        &self,
        plan: &BuildPlan,
        sink: &dyn CommandSink,
    ) -> Result<usize, ConstructionError> {
        for step in plan.steps() {
            tracing::trace!(phase = %step.phase, commands = step.commands.len(), "Sending build step");
            sink.send_batch(step.commands.clone()).await?;
        }
        Ok(plan.command_count())
    }

    /// Plan and execute in one go. Returns the number of commands sent.
    pub async fn build(
        &self,
        payload: &JobPayload,
        sink: &dyn CommandSink,
    ) -> Result<usize, ConstructionError> {
        let plan = self.plan(payload)?;
        self.execute(&plan, sink).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use guildcraft_domain::layout::group_center;
    use guildcraft_domain::{
        ArchiveGroupPayload, GroupId, GroupPayload, LinkEndpoint, LinkPayload, MemberId,
        MemberPayload,
    };

    use super::*;
    use crate::infrastructure::ports::MockCommandSink;
    use crate::test_fixtures::{RecordingSink, VoxelWorld};

    fn layout() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn group_payload(id: i64, ordinal: u32) -> GroupPayload {
        let center = group_center(ordinal, &layout());
        GroupPayload {
            group_id: GroupId::from_raw(id),
            external_id: format!("cat-{id}"),
            name: format!("Village {id}"),
            ordinal_index: ordinal,
            center_x: center.x,
            center_z: center.z,
        }
    }

    fn member_payload(index: u32) -> MemberPayload {
        let group = group_payload(1, 1);
        let at = guildcraft_domain::layout::member_position(group.center(), index, &layout());
        MemberPayload {
            group_id: group.group_id,
            member_id: MemberId::from_raw(i64::from(index) + 1),
            external_id: format!("chan-{index}"),
            group_name: group.name.clone(),
            name: format!("channel-{index}"),
            topic: Some("a place to talk".into()),
            member_index: index,
            x: at.x,
            z: at.z,
        }
    }

    fn all_payloads() -> Vec<JobPayload> {
        let member = member_payload(0);
        vec![
            JobPayload::CreateGroup(group_payload(1, 1)),
            JobPayload::CreateMember(member.clone()),
            JobPayload::UpdateMember(member.clone()),
            JobPayload::CreateLink(LinkPayload {
                from: LinkEndpoint {
                    group_id: GroupId::from_raw(1),
                    name: "one".into(),
                    center_x: 240,
                    center_z: 0,
                },
                to: LinkEndpoint {
                    group_id: GroupId::from_raw(2),
                    name: "two".into(),
                    center_x: 480,
                    center_z: 240,
                },
            }),
            JobPayload::ArchiveMember(member.clone()),
            JobPayload::ArchiveGroup(ArchiveGroupPayload {
                group: group_payload(1, 1),
                members: vec![member, member_payload(1)],
            }),
        ]
    }

    #[test]
    fn plans_reject_phases_going_backwards() {
        let mut plan = BuildPlan::new();
        plan.push(BuildPhase::Shell, vec!["a".into()]).expect("shell");
        plan.push(BuildPhase::Shell, vec!["b".into()]).expect("same phase");
        plan.push(BuildPhase::Signage, vec!["c".into()]).expect("later");

        let err = plan
            .push(BuildPhase::Foundation, vec!["d".into()])
            .expect_err("backwards");
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
        assert_eq!(plan.command_count(), 3);
    }

    #[test]
    fn every_plan_is_in_phase_order() {
        let generators = Generators::new(layout());
        for payload in all_payloads() {
            let plan = generators.plan(&payload).expect("plan");
            assert!(!plan.is_empty(), "{:?} planned nothing", payload.job_type());
            let phases: Vec<_> = plan.steps().iter().map(|s| s.phase).collect();
            let mut sorted = phases.clone();
            sorted.sort();
            assert_eq!(phases, sorted);
        }
    }

    #[test]
    fn every_plan_parses_and_respects_the_fill_limit() {
        let generators = Generators::new(layout());
        for payload in all_payloads() {
            let plan = generators.plan(&payload).expect("plan");
            let mut world = VoxelWorld::new();
            for command in plan.commands() {
                world.apply(command).expect("valid command");
            }
        }
    }

    #[test]
    fn rerunning_any_plan_changes_nothing() {
        let generators = Generators::new(layout());
        for payload in all_payloads() {
            let plan = generators.plan(&payload).expect("plan");
            let mut world = VoxelWorld::new();
            for command in plan.commands() {
                world.apply(command).expect("first run");
            }
            let once = world.snapshot();
            for command in plan.commands() {
                world.apply(command).expect("second run");
            }
            assert_eq!(world.snapshot(), once, "{:?} is not idempotent", payload.job_type());
        }
    }

    #[test]
    fn neighbouring_buildings_do_not_overlap() {
        let generators = Generators::new(layout());
        let footprint = |index: u32| -> HashSet<(i32, i32)> {
            let plan = generators
                .plan(&JobPayload::CreateMember(member_payload(index)))
                .expect("plan");
            let mut world = VoxelWorld::new();
            for command in plan.commands() {
                world.apply(command).expect("apply");
            }
            world.solid_columns()
        };

        let columns: Vec<_> = (0..8).map(footprint).collect();
        for (i, a) in columns.iter().enumerate() {
            for b in columns.iter().skip(i + 1) {
                assert!(a.is_disjoint(b));
            }
        }
    }

    fn track_between(from: u32, to: u32) -> JobPayload {
        let endpoint = |ordinal: u32| {
            let center = group_center(ordinal, &layout());
            LinkEndpoint {
                group_id: GroupId::from_raw(i64::from(ordinal)),
                name: format!("Village {ordinal}"),
                center_x: center.x,
                center_z: center.z,
            }
        };
        JobPayload::CreateLink(LinkPayload {
            from: endpoint(from),
            to: endpoint(to),
        })
    }

    fn apply(world: &mut VoxelWorld, generators: &Generators, payload: &JobPayload) {
        for command in generators.plan(payload).expect("plan").commands() {
            world.apply(command).expect("apply");
        }
    }

    #[test]
    fn tracks_and_buildings_on_the_same_line_both_survive() {
        let generators = Generators::new(layout());
        let layout = layout();
        let t = layout.track_y();
        let roof = layout.base_y + 7;
        // Index 3 is due east of village 1, on the line to village 2.
        let building = JobPayload::CreateMember(member_payload(3));
        let track = track_between(2, 1);
        let (x, z) = (254, 0);
        assert_eq!((member_payload(3).x, member_payload(3).z), (x, z));

        let mut track_first = VoxelWorld::new();
        apply(&mut track_first, &generators, &track);
        assert_eq!(track_first.block(x, t, z), Some("rail"));
        apply(&mut track_first, &generators, &building);
        assert_eq!(track_first.block(x, t, z), Some("rail"));
        assert_eq!(track_first.block(x, t - 1, z), Some("stone_bricks"));
        assert_eq!(track_first.block(x, roof, z), Some("dark_oak_planks"));

        let mut building_first = VoxelWorld::new();
        apply(&mut building_first, &generators, &building);
        apply(&mut building_first, &generators, &track);
        assert_eq!(building_first.block(x, roof, z), Some("dark_oak_planks"));
        assert_eq!(building_first.block(x, t, z), Some("rail"));
    }

    #[test]
    fn layouts_with_low_tracks_are_rejected() {
        let generators = Generators::new(LayoutConfig {
            track_height: guildcraft_domain::layout::BUILDING_CLEARANCE,
            ..layout()
        });
        let err = generators
            .plan(&JobPayload::CreateMember(member_payload(0)))
            .expect_err("low track");
        assert!(matches!(err, ConstructionError::Plan(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn execute_sends_one_batch_per_step_in_order() {
        let generators = Generators::new(layout());
        let payload = JobPayload::CreateMember(member_payload(0));
        let plan = generators.plan(&payload).expect("plan");

        let sink = RecordingSink::new();
        let sent = generators.execute(&plan, &sink).await.expect("execute");

        assert_eq!(sent, plan.command_count());
        let batches = sink.batches();
        assert_eq!(batches.len(), plan.steps().len());
        for (batch, step) in batches.iter().zip(plan.steps()) {
            assert_eq!(batch, &step.commands);
        }
    }

    #[tokio::test]
    async fn command_errors_abort_the_build_unmodified() {
        let mut sink = MockCommandSink::new();
        sink.expect_send_batch()
            .times(1)
            .returning(|_| Err(CommandError::Io("connection reset".into())));

        let generators = Generators::new(layout());
        let err = generators
            .build(&JobPayload::CreateGroup(group_payload(1, 1)), &sink)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ConstructionError::Command(CommandError::Io(_))));
    }
}
