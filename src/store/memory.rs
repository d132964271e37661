//! In-memory store used by tests and embedded deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ContentCatalog, ContentFilter, JobFilter, Result, Store};
use crate::model::{
    AccountId, ContentCandidate, ContentGroup, GroupId, MaintenanceJob, Sprint, SprintId,
};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, MaintenanceJob>,
    groups: HashMap<GroupId, ContentGroup>,
    sprints: HashMap<SprintId, Sprint>,
    content: HashMap<GroupId, Vec<ContentCandidate>>,
}

/// HashMap-backed [`Store`] and [`ContentCatalog`] behind a single `RwLock`.
///
/// Operations are O(n) scans; contention is low because the scheduler is
/// the only writer for jobs.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_job(&self, job: &MaintenanceJob) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<MaintenanceJob>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner.jobs.get(id).cloned())
    }

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<MaintenanceJob>> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut jobs: Vec<MaintenanceJob> = inner
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn put_group(&self, group: &ContentGroup) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<ContentGroup>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner.groups.get(&id).cloned())
    }

    async fn find_groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<ContentGroup>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| inner.groups.get(id).cloned())
            .collect())
    }

    async fn find_groups_at_position(
        &self,
        account_id: AccountId,
        position: u32,
        exclude: GroupId,
    ) -> Result<Vec<ContentGroup>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .groups
            .values()
            .filter(|g| {
                g.account_id == account_id
                    && g.current_position == position
                    && g.id != exclude
                    && g.is_active
            })
            .cloned()
            .collect())
    }

    async fn put_sprint(&self, sprint: &Sprint) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.sprints.insert(sprint.id, sprint.clone());
        Ok(())
    }

    async fn find_overlapping_sprints(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sprint>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .sprints
            .values()
            .filter(|s| {
                s.account_id == account_id && s.is_active && s.starts_at <= to && s.ends_at >= from
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContentCatalog for MemoryStore {
    async fn list_content_for_group(
        &self,
        group_id: GroupId,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentCandidate>> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .content
            .get(&group_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| filter.matches(item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_content(&self, item: &ContentCandidate) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let items = inner.content.entry(item.group_id).or_default();
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }
}
