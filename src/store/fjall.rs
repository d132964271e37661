//! Fjall-backed persistent store for jobs, groups, sprints, and content.
//!
//! Partition layout:
//! - `jobs`: job_id (utf-8) -> MaintenanceJob (JSON)
//! - `groups`: group_id (big-endian i64) -> ContentGroup (JSON)
//! - `sprints`: sprint_id (big-endian i64) -> Sprint (JSON)
//! - `content`: {group_id:016x}:{content_id:016x} -> ContentCandidate (JSON)
//!
//! Queries are full or prefix scans; acceptable for the single-node job
//! volumes this service handles.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::{ContentCatalog, ContentFilter, JobFilter, Result, Store};
use crate::model::{
    AccountId, ContentCandidate, ContentGroup, ContentId, GroupId, MaintenanceJob, Sprint,
};

fn encode_i64_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn encode_content_key(group_id: GroupId, content_id: ContentId) -> Vec<u8> {
    format!("{group_id:016x}:{content_id:016x}").into_bytes()
}

fn encode_content_prefix(group_id: GroupId) -> Vec<u8> {
    format!("{group_id:016x}:").into_bytes()
}

/// Durable [`Store`]/[`ContentCatalog`] on a fjall keyspace.
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    groups: PartitionHandle,
    sprints: PartitionHandle,
    content: PartitionHandle,
}

impl FjallStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening fjall store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let groups = keyspace.open_partition("groups", PartitionCreateOptions::default())?;
        let sprints = keyspace.open_partition("sprints", PartitionCreateOptions::default())?;
        let content = keyspace.open_partition("content", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            groups,
            sprints,
            content,
        })
    }

    /// Persist all pending writes to disk.
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn scan_groups<F>(&self, mut keep: F) -> Result<Vec<ContentGroup>>
    where
        F: FnMut(&ContentGroup) -> bool,
    {
        let mut out = Vec::new();
        for item in self.groups.iter() {
            let (_, value) = item?;
            let group: ContentGroup = serde_json::from_slice(&value)?;
            if keep(&group) {
                out.push(group);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for FjallStore {
    async fn put_job(&self, job: &MaintenanceJob) -> Result<()> {
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(job.id.as_bytes(), value)?;
        debug!(job_id = %job.id, status = ?job.status, "Job persisted");
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<MaintenanceJob>> {
        match self.jobs.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<MaintenanceJob>> {
        let mut out = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            let job: MaintenanceJob = serde_json::from_slice(&value)?;
            if filter.matches(&job) {
                out.push(job);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn put_group(&self, group: &ContentGroup) -> Result<()> {
        let value = serde_json::to_vec(group)?;
        self.groups.insert(encode_i64_key(group.id), value)?;
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<ContentGroup>> {
        match self.groups.get(encode_i64_key(id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<ContentGroup>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(group) = self.get_group(*id).await? {
                out.push(group);
            }
        }
        Ok(out)
    }

    async fn find_groups_at_position(
        &self,
        account_id: AccountId,
        position: u32,
        exclude: GroupId,
    ) -> Result<Vec<ContentGroup>> {
        self.scan_groups(|g| {
            g.account_id == account_id
                && g.current_position == position
                && g.id != exclude
                && g.is_active
        })
    }

    async fn put_sprint(&self, sprint: &Sprint) -> Result<()> {
        let value = serde_json::to_vec(sprint)?;
        self.sprints.insert(encode_i64_key(sprint.id), value)?;
        Ok(())
    }

    async fn find_overlapping_sprints(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sprint>> {
        let mut out = Vec::new();
        for item in self.sprints.iter() {
            let (_, value) = item?;
            let sprint: Sprint = serde_json::from_slice(&value)?;
            if sprint.account_id == account_id
                && sprint.is_active
                && sprint.starts_at <= to
                && sprint.ends_at >= from
            {
                out.push(sprint);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ContentCatalog for FjallStore {
    async fn list_content_for_group(
        &self,
        group_id: GroupId,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentCandidate>> {
        let mut out = Vec::new();
        for item in self.content.prefix(encode_content_prefix(group_id)) {
            let (_, value) = item?;
            let candidate: ContentCandidate = serde_json::from_slice(&value)?;
            if filter.matches(&candidate) {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    async fn put_content(&self, item: &ContentCandidate) -> Result<()> {
        let value = serde_json::to_vec(item)?;
        self.content
            .insert(encode_content_key(item.group_id, item.id), value)?;
        Ok(())
    }
}
