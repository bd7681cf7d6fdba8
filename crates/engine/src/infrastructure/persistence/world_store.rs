//! SQLite world store.
//!
//! Groups, members and the durable job log share one database so that an
//! entity change and the job it implies commit together. Writes that span
//! several statements are serialised through `write_lock`; the unique
//! constraints on ordinals, centres and member indices still back that up at
//! the schema level.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, SqliteConnection, SqlitePool, Type};
use tokio::sync::Mutex;
use uuid::Uuid;

use guildcraft_domain::layout::{group_center, member_position, HUB_ORDINAL};
use guildcraft_domain::{
    truncate_error, ArchiveGroupPayload, Group, GroupId, GroupPayload, GroupSummary, Job, JobId,
    JobPayload, JobStatus, JobType, LayoutConfig, Member, MemberId, MemberPayload,
};

use crate::infrastructure::ports::{
    Archived, ClockPort, GroupUpsert, GroupUpserted, GroupWithMembers, MemberMatch, MemberUpdate,
    MemberUpdated, MemberUpsert, MemberUpserted, RepoError, StatusCounts, WorldStore,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        position INTEGER NOT NULL DEFAULT 0,
        ordinal_index INTEGER NOT NULL UNIQUE,
        center_x INTEGER NOT NULL,
        center_z INTEGER NOT NULL,
        is_archived INTEGER NOT NULL DEFAULT 0,
        is_placeholder INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (center_x, center_z)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS members (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL UNIQUE,
        group_id INTEGER NOT NULL REFERENCES groups(id),
        name TEXT NOT NULL,
        topic TEXT,
        position INTEGER NOT NULL DEFAULT 0,
        member_index INTEGER NOT NULL,
        planned_x INTEGER,
        planned_z INTEGER,
        built_x INTEGER,
        built_z INTEGER,
        is_archived INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (group_id, member_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        job_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        error_message TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_members_name ON members(name)",
];

/// SQLite implementation of [`WorldStore`].
pub struct SqliteWorldStore {
    pool: SqlitePool,
    layout: LayoutConfig,
    clock: Arc<dyn ClockPort>,
    write_lock: Mutex<()>,
}

impl SqliteWorldStore {
    /// Wrap `pool`, creating the tables if they do not exist yet.
    pub async fn new(
        pool: SqlitePool,
        layout: LayoutConfig,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, RepoError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(db_err("create_schema"))?;
        }

        Ok(Self {
            pool,
            layout,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    async fn insert_group(
        &self,
        conn: &mut SqliteConnection,
        external_id: &str,
        name: &str,
        position: i64,
        placeholder: bool,
        now: DateTime<Utc>,
    ) -> Result<Group, RepoError> {
        let ordinal: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(ordinal_index), ?) + 1 FROM groups")
            .bind(i64::from(HUB_ORDINAL))
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("next_ordinal"))?;
        let ordinal_index = to_u32(ordinal, "ordinal_index")?;
        let center = group_center(ordinal_index, &self.layout);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO groups
                (external_id, name, position, ordinal_index, center_x, center_z,
                 is_archived, is_placeholder, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(external_id)
        .bind(name)
        .bind(position)
        .bind(ordinal)
        .bind(center.x)
        .bind(center.z)
        .bind(placeholder)
        .bind(ts(now))
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("insert_group"))?;

        tracing::debug!(group_id = id, ordinal_index, x = center.x, z = center.z, "Inserted group");

        Ok(Group {
            id: GroupId::from_raw(id),
            external_id: external_id.to_string(),
            name: name.to_string(),
            position,
            ordinal_index,
            center_x: center.x,
            center_z: center.z,
            is_archived: false,
            is_placeholder: placeholder,
            created_at: now,
        })
    }

    async fn insert_member(
        &self,
        conn: &mut SqliteConnection,
        group: &Group,
        upsert: &MemberUpsert,
        now: DateTime<Utc>,
    ) -> Result<Member, RepoError> {
        // Archived members keep their index, so the max covers every slot
        // ever handed out in this group.
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(member_index), -1) + 1 FROM members WHERE group_id = ?",
        )
        .bind(group.id.as_i64())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("next_member_index"))?;
        let member_index = to_u32(next, "member_index")?;
        let planned = member_position(group.center(), member_index, &self.layout);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO members
                (external_id, group_id, name, topic, position, member_index,
                 planned_x, planned_z, is_archived, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING id
            "#,
        )
        .bind(&upsert.external_id)
        .bind(group.id.as_i64())
        .bind(&upsert.name)
        .bind(&upsert.topic)
        .bind(upsert.position)
        .bind(next)
        .bind(planned.x)
        .bind(planned.z)
        .bind(ts(now))
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("insert_member"))?;

        Ok(Member {
            id: MemberId::from_raw(id),
            external_id: upsert.external_id.clone(),
            group_id: group.id,
            name: upsert.name.clone(),
            topic: upsert.topic.clone(),
            position: upsert.position,
            member_index,
            planned_x: Some(planned.x),
            planned_z: Some(planned.z),
            built_x: None,
            built_z: None,
            is_archived: false,
            created_at: now,
        })
    }

    /// Why a guarded job update touched no row.
    async fn transition_rejected(&self, id: JobId, to: JobStatus) -> RepoError {
        match self.get_job(id).await {
            Ok(Some(job)) => RepoError::constraint(format!(
                "Job {id} cannot move from {} to {to}",
                job.status
            )),
            Ok(None) => RepoError::not_found("Job", id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl WorldStore for SqliteWorldStore {
    async fn upsert_group(&self, upsert: GroupUpsert) -> Result<GroupUpserted, RepoError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_err("upsert_group"))?;

        let outcome = match find_group_by_external_id(&mut tx, &upsert.external_id).await? {
            Some(mut group) => {
                let updated = !group.is_archived
                    && (group.is_placeholder
                        || group.name != upsert.name
                        || group.position != upsert.position);
                if updated {
                    sqlx::query(
                        "UPDATE groups SET name = ?, position = ?, is_placeholder = 0 WHERE id = ?",
                    )
                    .bind(&upsert.name)
                    .bind(upsert.position)
                    .bind(group.id.as_i64())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("upsert_group"))?;
                    group.name = upsert.name;
                    group.position = upsert.position;
                    group.is_placeholder = false;
                }
                GroupUpserted {
                    group,
                    created: false,
                    updated,
                    jobs: Vec::new(),
                }
            }
            None => {
                let group = self
                    .insert_group(
                        &mut tx,
                        &upsert.external_id,
                        &upsert.name,
                        upsert.position,
                        false,
                        now,
                    )
                    .await?;
                let job = Job::new(JobPayload::CreateGroup(GroupPayload::from_group(&group)), now);
                insert_job(&mut tx, &job).await?;
                GroupUpserted {
                    group,
                    created: true,
                    updated: false,
                    jobs: vec![job],
                }
            }
        };

        tx.commit().await.map_err(db_err("upsert_group"))?;
        Ok(outcome)
    }

    async fn upsert_member(&self, upsert: MemberUpsert) -> Result<MemberUpserted, RepoError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_err("upsert_member"))?;

        if let Some(existing) = find_member_by_external_id(&mut tx, &upsert.external_id).await? {
            let group = find_group_by_id(&mut tx, existing.group_id)
                .await?
                .ok_or_else(|| RepoError::not_found("Group", existing.group_id))?;
            let (member, jobs) = if existing.is_archived {
                (existing, Vec::new())
            } else {
                apply_member_changes(
                    &mut tx,
                    existing,
                    &group,
                    Some(upsert.name),
                    Some(upsert.topic),
                    Some(upsert.position),
                    now,
                )
                .await?
            };
            tx.commit().await.map_err(db_err("upsert_member"))?;
            return Ok(MemberUpserted {
                updated: !jobs.is_empty(),
                member,
                group,
                created: false,
                group_created: false,
                jobs,
            });
        }

        let mut jobs = Vec::new();
        let (group, group_created) =
            match find_group_by_external_id(&mut tx, &upsert.group_external_id).await? {
                Some(group) if group.is_archived => {
                    return Err(RepoError::constraint(format!(
                        "Group {} is archived",
                        group.external_id
                    )));
                }
                Some(group) => (group, false),
                None => {
                    let group = self
                        .insert_group(
                            &mut tx,
                            &upsert.group_external_id,
                            &Group::placeholder_name(&upsert.group_external_id),
                            0,
                            true,
                            now,
                        )
                        .await?;
                    jobs.push(Job::new(
                        JobPayload::CreateGroup(GroupPayload::from_group(&group)),
                        now,
                    ));
                    (group, true)
                }
            };

        let member = self.insert_member(&mut tx, &group, &upsert, now).await?;
        jobs.push(Job::new(
            JobPayload::CreateMember(MemberPayload::from_member(&member, &group)),
            now,
        ));
        for job in &jobs {
            insert_job(&mut tx, job).await?;
        }

        tx.commit().await.map_err(db_err("upsert_member"))?;
        Ok(MemberUpserted {
            member,
            group,
            created: true,
            group_created,
            updated: false,
            jobs,
        })
    }

    async fn update_member(
        &self,
        update: MemberUpdate,
    ) -> Result<Option<MemberUpdated>, RepoError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_err("update_member"))?;

        let Some(member) = find_member_by_external_id(&mut tx, &update.external_id).await? else {
            return Ok(None);
        };
        if member.is_archived {
            return Ok(Some(MemberUpdated {
                member,
                changed: false,
                jobs: Vec::new(),
            }));
        }
        let group = find_group_by_id(&mut tx, member.group_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Group", member.group_id))?;

        let (member, jobs) = apply_member_changes(
            &mut tx,
            member,
            &group,
            update.name,
            update.topic.map(|topic| Some(topic).filter(|t| !t.is_empty())),
            update.position,
            now,
        )
        .await?;

        tx.commit().await.map_err(db_err("update_member"))?;
        Ok(Some(MemberUpdated {
            changed: !jobs.is_empty(),
            member,
            jobs,
        }))
    }

    async fn archive_member(
        &self,
        external_id: &str,
    ) -> Result<Option<Archived<Member>>, RepoError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_err("archive_member"))?;

        let Some(mut member) = find_member_by_external_id(&mut tx, external_id).await? else {
            return Ok(None);
        };
        if member.is_archived {
            return Ok(Some(Archived {
                entity: member,
                newly_archived: false,
                jobs: Vec::new(),
            }));
        }
        let group = find_group_by_id(&mut tx, member.group_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Group", member.group_id))?;

        sqlx::query("UPDATE members SET is_archived = 1 WHERE id = ?")
            .bind(member.id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(db_err("archive_member"))?;
        member.is_archived = true;

        let job = Job::new(
            JobPayload::ArchiveMember(MemberPayload::from_member(&member, &group)),
            now,
        );
        insert_job(&mut tx, &job).await?;

        tx.commit().await.map_err(db_err("archive_member"))?;
        Ok(Some(Archived {
            entity: member,
            newly_archived: true,
            jobs: vec![job],
        }))
    }

    async fn archive_group(&self, external_id: &str) -> Result<Option<Archived<Group>>, RepoError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_err("archive_group"))?;

        let Some(mut group) = find_group_by_external_id(&mut tx, external_id).await? else {
            return Ok(None);
        };
        if group.is_archived {
            return Ok(Some(Archived {
                entity: group,
                newly_archived: false,
                jobs: Vec::new(),
            }));
        }

        let members = members_of(&mut tx, group.id, true).await?;
        sqlx::query("UPDATE groups SET is_archived = 1 WHERE id = ?")
            .bind(group.id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(db_err("archive_group"))?;
        sqlx::query("UPDATE members SET is_archived = 1 WHERE group_id = ?")
            .bind(group.id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(db_err("archive_group"))?;
        group.is_archived = true;

        let payload = ArchiveGroupPayload {
            group: GroupPayload::from_group(&group),
            members: members
                .iter()
                .map(|member| MemberPayload::from_member(member, &group))
                .collect(),
        };
        let job = Job::new(JobPayload::ArchiveGroup(payload), now);
        insert_job(&mut tx, &job).await?;

        tx.commit().await.map_err(db_err("archive_group"))?;
        tracing::debug!(
            group_id = %group.id,
            members = members.len(),
            "Archived group and its members"
        );
        Ok(Some(Archived {
            entity: group,
            newly_archived: true,
            jobs: vec![job],
        }))
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err("get_group"))?;
        find_group_by_id(&mut conn, id).await
    }

    async fn get_group_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Group>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_err("get_group_by_external_id"))?;
        find_group_by_external_id(&mut conn, external_id).await
    }

    async fn get_member_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Member>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_err("get_member_by_external_id"))?;
        find_member_by_external_id(&mut conn, external_id).await
    }

    async fn list_active_groups(&self) -> Result<Vec<GroupSummary>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT g.*,
                   (SELECT COUNT(*) FROM members m
                     WHERE m.group_id = g.id AND m.is_archived = 0) AS member_count
            FROM groups g
            WHERE g.is_archived = 0
            ORDER BY g.ordinal_index
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_active_groups"))?;

        rows.iter()
            .map(|row| {
                Ok(GroupSummary {
                    group: row_to_group(row)?,
                    member_count: to_u32(col(row, "member_count")?, "member_count")?,
                })
            })
            .collect()
    }

    async fn get_group_with_members(
        &self,
        id: GroupId,
    ) -> Result<Option<GroupWithMembers>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_err("get_group_with_members"))?;
        let Some(group) = find_group_by_id(&mut conn, id).await? else {
            return Ok(None);
        };
        let members = members_of(&mut conn, id, true).await?;
        Ok(Some(GroupWithMembers { group, members }))
    }

    async fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err("list_members"))?;
        members_of(&mut conn, group_id, false).await
    }

    async fn search_members(&self, needle: &str, limit: u32) -> Result<Vec<MemberMatch>, RepoError> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        // Exact match first, then prefix, then shortest name.
        let rows = sqlx::query(
            r#"
            SELECT m.* FROM members m
            JOIN groups g ON g.id = m.group_id
            WHERE m.is_archived = 0
              AND g.is_archived = 0
              AND instr(lower(m.name), lower(?1)) > 0
            ORDER BY
                CASE
                    WHEN lower(m.name) = lower(?1) THEN 0
                    WHEN instr(lower(m.name), lower(?1)) = 1 THEN 1
                    ELSE 2
                END,
                length(m.name),
                m.id
            LIMIT ?2
            "#,
        )
        .bind(needle)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("search_members"))?;

        let mut conn = self.pool.acquire().await.map_err(db_err("search_members"))?;
        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let member = row_to_member(row)?;
            let group = find_group_by_id(&mut conn, member.group_id)
                .await?
                .ok_or_else(|| RepoError::not_found("Group", member.group_id))?;
            matches.push(MemberMatch { member, group });
        }
        Ok(matches)
    }

    async fn status_counts(&self) -> Result<StatusCounts, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM groups WHERE is_archived = 0) AS active_groups,
                (SELECT COUNT(*) FROM members WHERE is_archived = 0) AS active_members,
                (SELECT COUNT(*) FROM jobs WHERE status = 'pending') AS pending_jobs,
                (SELECT COUNT(*) FROM jobs WHERE status = 'in_progress') AS in_progress_jobs,
                (SELECT COUNT(*) FROM jobs WHERE status = 'failed') AS failed_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("status_counts"))?;

        Ok(StatusCounts {
            active_groups: to_u32(col(&row, "active_groups")?, "active_groups")?,
            active_members: to_u32(col(&row, "active_members")?, "active_members")?,
            pending_jobs: to_u32(col(&row, "pending_jobs")?, "pending_jobs")?,
            in_progress_jobs: to_u32(col(&row, "in_progress_jobs")?, "in_progress_jobs")?,
            failed_jobs: to_u32(col(&row, "failed_jobs")?, "failed_jobs")?,
        })
    }

    async fn mark_member_built(&self, id: MemberId, x: i32, z: i32) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE members SET built_x = ?, built_z = ? WHERE id = ?")
            .bind(x)
            .bind(z)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(db_err("mark_member_built"))?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Member", id));
        }
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, RepoError> {
        sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("get_job"))?
            .as_ref()
            .map(row_to_job)
            .transpose()
    }

    async fn create_jobs(&self, jobs: &[Job]) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err("create_jobs"))?;
        for job in jobs {
            insert_job(&mut tx, job).await?;
        }
        tx.commit().await.map_err(db_err("create_jobs"))
    }

    async fn claim_job(&self, id: JobId, now: DateTime<Utc>) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'in_progress', started_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(ts(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err("claim_job"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_job(&self, id: JobId, now: DateTime<Utc>) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = ? WHERE id = ? AND status = 'in_progress'",
        )
        .bind(ts(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err("complete_job"))?;
        if result.rows_affected() == 0 {
            return Err(self.transition_rejected(id, JobStatus::Completed).await);
        }
        Ok(())
    }

    async fn retry_job(&self, id: JobId, retry_count: u32, error: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', retry_count = ?, error_message = ?, started_at = NULL
            WHERE id = ? AND status = 'in_progress'
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(truncate_error(error))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err("retry_job"))?;
        if result.rows_affected() == 0 {
            return Err(self.transition_rejected(id, JobStatus::Pending).await);
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        id: JobId,
        retry_count: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', retry_count = ?, error_message = ?, completed_at = ?
            WHERE id = ? AND status = 'in_progress'
            "#,
        )
        .bind(i64::from(retry_count))
        .bind(truncate_error(error))
        .bind(ts(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err("fail_job"))?;
        if result.rows_affected() == 0 {
            return Err(self.transition_rejected(id, JobStatus::Failed).await);
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<Job>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list_jobs"))?;

        rows.iter().map(row_to_job).collect()
    }

    async fn list_pending_jobs(&self) -> Result<Vec<Job>, RepoError> {
        let rows =
            sqlx::query("SELECT * FROM jobs WHERE status = 'pending' ORDER BY created_at, rowid")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("list_pending_jobs"))?;

        rows.iter().map(row_to_job).collect()
    }

    async fn reset_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'pending', started_at = NULL
            WHERE status = 'in_progress' AND (started_at IS NULL OR started_at < ?)
            "#,
        )
        .bind(ts(started_before))
        .execute(&self.pool)
        .await
        .map_err(db_err("reset_stale_jobs"))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Statement helpers shared by transactions and plain pool connections
// =============================================================================

async fn find_group_by_id(
    conn: &mut SqliteConnection,
    id: GroupId,
) -> Result<Option<Group>, RepoError> {
    sqlx::query("SELECT * FROM groups WHERE id = ?")
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("find_group_by_id"))?
        .as_ref()
        .map(row_to_group)
        .transpose()
}

async fn find_group_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> Result<Option<Group>, RepoError> {
    sqlx::query("SELECT * FROM groups WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("find_group_by_external_id"))?
        .as_ref()
        .map(row_to_group)
        .transpose()
}

async fn find_member_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> Result<Option<Member>, RepoError> {
    sqlx::query("SELECT * FROM members WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err("find_member_by_external_id"))?
        .as_ref()
        .map(row_to_member)
        .transpose()
}

async fn members_of(
    conn: &mut SqliteConnection,
    group_id: GroupId,
    include_archived: bool,
) -> Result<Vec<Member>, RepoError> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM members
        WHERE group_id = ? AND (? OR is_archived = 0)
        ORDER BY member_index
        "#,
    )
    .bind(group_id.as_i64())
    .bind(include_archived)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err("members_of"))?;

    rows.iter().map(row_to_member).collect()
}

async fn insert_job(conn: &mut SqliteConnection, job: &Job) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO jobs
            (id, job_type, payload, status, error_message, retry_count,
             created_at, started_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.to_string())
    .bind(job.job_type().as_str())
    .bind(job.payload.to_json()?)
    .bind(job.status.as_str())
    .bind(job.error_message.as_deref().map(truncate_error))
    .bind(i64::from(job.retry_count))
    .bind(ts(job.created_at))
    .bind(job.started_at.map(ts))
    .bind(job.completed_at.map(ts))
    .execute(&mut *conn)
    .await
    .map_err(db_err("insert_job"))?;
    Ok(())
}

/// Diff the incoming state against `member` and persist an UpdateMember job
/// when a name, topic or position changed. `None` keeps the stored value;
/// `Some(None)` clears the topic.
async fn apply_member_changes(
    conn: &mut SqliteConnection,
    mut member: Member,
    group: &Group,
    name: Option<String>,
    topic: Option<Option<String>>,
    position: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(Member, Vec<Job>), RepoError> {
    let name = name.unwrap_or_else(|| member.name.clone());
    let topic = topic.unwrap_or_else(|| member.topic.clone());
    let position = position.unwrap_or(member.position);
    if name == member.name && topic == member.topic && position == member.position {
        return Ok((member, Vec::new()));
    }

    sqlx::query("UPDATE members SET name = ?, topic = ?, position = ? WHERE id = ?")
        .bind(&name)
        .bind(&topic)
        .bind(position)
        .bind(member.id.as_i64())
        .execute(&mut *conn)
        .await
        .map_err(db_err("update_member"))?;
    member.name = name;
    member.topic = topic;
    member.position = position;

    let job = Job::new(
        JobPayload::UpdateMember(MemberPayload::from_member(&member, group)),
        now,
    );
    insert_job(conn, &job).await?;
    Ok((member, vec![job]))
}

// =============================================================================
// Row mapping
// =============================================================================

fn row_to_group(row: &SqliteRow) -> Result<Group, RepoError> {
    Ok(Group {
        id: GroupId::from_raw(col(row, "id")?),
        external_id: col(row, "external_id")?,
        name: col(row, "name")?,
        position: col(row, "position")?,
        ordinal_index: to_u32(col(row, "ordinal_index")?, "ordinal_index")?,
        center_x: col(row, "center_x")?,
        center_z: col(row, "center_z")?,
        is_archived: col(row, "is_archived")?,
        is_placeholder: col(row, "is_placeholder")?,
        created_at: parse_ts(&col::<String>(row, "created_at")?)?,
    })
}

fn row_to_member(row: &SqliteRow) -> Result<Member, RepoError> {
    Ok(Member {
        id: MemberId::from_raw(col(row, "id")?),
        external_id: col(row, "external_id")?,
        group_id: GroupId::from_raw(col(row, "group_id")?),
        name: col(row, "name")?,
        topic: col(row, "topic")?,
        position: col(row, "position")?,
        member_index: to_u32(col(row, "member_index")?, "member_index")?,
        planned_x: col(row, "planned_x")?,
        planned_z: col(row, "planned_z")?,
        built_x: col(row, "built_x")?,
        built_z: col(row, "built_z")?,
        is_archived: col(row, "is_archived")?,
        created_at: parse_ts(&col::<String>(row, "created_at")?)?,
    })
}

fn row_to_job(row: &SqliteRow) -> Result<Job, RepoError> {
    let id: String = col(row, "id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| RepoError::serialization(format!("Invalid job id {id}: {e}")))?;
    let job_type: JobType = col::<String>(row, "job_type")?.parse()?;
    let payload: String = col(row, "payload")?;

    Ok(Job {
        id: JobId::from_uuid(id),
        payload: JobPayload::from_json(job_type, &payload)?,
        status: col::<String>(row, "status")?.parse::<JobStatus>()?,
        error_message: col(row, "error_message")?,
        retry_count: to_u32(col(row, "retry_count")?, "retry_count")?,
        created_at: parse_ts(&col::<String>(row, "created_at")?)?,
        started_at: col::<Option<String>>(row, "started_at")?
            .as_deref()
            .map(parse_ts)
            .transpose()?,
        completed_at: col::<Option<String>>(row, "completed_at")?
            .as_deref()
            .map(parse_ts)
            .transpose()?,
    })
}

fn col<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, RepoError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| RepoError::serialization(format!("column {column}: {e}")))
}

fn to_u32(raw: i64, column: &str) -> Result<u32, RepoError> {
    u32::try_from(raw).map_err(|_| RepoError::serialization(format!("{column} out of range: {raw}")))
}

/// Fixed-width UTC timestamps, so text comparison matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("Invalid datetime {raw}: {e}")))
}

/// Map a sqlx error, keeping unique and foreign key failures distinct.
pub(crate) fn db_err(operation: &'static str) -> impl Fn(sqlx::Error) -> RepoError {
    move |e| {
        let constraint = e
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation() || db.is_foreign_key_violation());
        if constraint {
            RepoError::constraint(format!("{operation}: {e}"))
        } else {
            RepoError::database(operation, e)
        }
    }
}
