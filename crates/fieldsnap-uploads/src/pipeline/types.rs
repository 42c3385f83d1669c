//! Item and batch state

use crate::error::TransitionError;
use chrono::{DateTime, Utc};
use fieldsnap_common::types::{Category, SiteKey};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Upload item status
///
/// Forward-only: queued → compressing → uploading → done, and any
/// non-terminal state may fail. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Compressing,
    Uploading,
    Done,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Compressing => "compressing",
            ItemStatus::Uploading => "uploading",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Failed)
    }

    /// Compressing or uploading
    pub fn is_in_flight(self) -> bool {
        matches!(self, ItemStatus::Compressing | ItemStatus::Uploading)
    }

    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        match (self, next) {
            (ItemStatus::Queued, ItemStatus::Compressing)
            | (ItemStatus::Compressing, ItemStatus::Uploading)
            | (ItemStatus::Uploading, ItemStatus::Done) => true,
            (from, ItemStatus::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One file's journey through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    pub id: Uuid,
    pub file_name: String,
    pub source: PathBuf,
    pub site_key: SiteKey,
    pub category: Category,
    pub status: ItemStatus,
    pub error: Option<String>,
    /// Set once the transfer succeeded
    pub public_url: Option<String>,
    /// Transfer attempts used so far
    pub attempts: u32,
}

impl UploadItem {
    pub fn new(source: PathBuf, file_name: String, site_key: SiteKey, category: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            source,
            site_key,
            category,
            status: ItemStatus::Queued,
            error: None,
            public_url: None,
            attempts: 0,
        }
    }

    /// `{site}/{category}/{id}-{file_name}`; the id makes paths collision-free
    pub fn object_key(&self) -> String {
        format!(
            "{}/{}/{}-{}",
            self.site_key, self.category, self.id, self.file_name
        )
    }

    pub fn transition(&mut self, next: ItemStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Fixed group of items for one site and one category
#[derive(Debug, Clone, Serialize)]
pub struct UploadBatch {
    pub id: Uuid,
    pub site_key: SiteKey,
    pub category: Category,
    pub items: Vec<UploadItem>,
    pub total_count: usize,
    pub done_count: usize,
    pub fail_count: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    completed_instant: Option<Instant>,
}

impl UploadBatch {
    pub(crate) fn new(site_key: SiteKey, category: Category, files: Vec<(PathBuf, String)>) -> Self {
        let items: Vec<UploadItem> = files
            .into_iter()
            .map(|(source, name)| UploadItem::new(source, name, site_key.clone(), category.clone()))
            .collect();

        Self {
            id: Uuid::new_v4(),
            total_count: items.len(),
            site_key,
            category,
            items,
            done_count: 0,
            fail_count: 0,
            created_at: Utc::now(),
            completed_at: None,
            completed_instant: None,
        }
    }

    pub fn resolved_count(&self) -> usize {
        self.done_count + self.fail_count
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn has_failures(&self) -> bool {
        self.fail_count > 0
    }

    /// Items currently compressing or uploading
    pub fn in_flight_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_in_flight()).count()
    }

    /// "N/M uploaded", plus ", K failed" when anything failed
    pub fn progress_label(&self) -> String {
        if self.has_failures() {
            format!(
                "{}/{} uploaded, {} failed",
                self.done_count, self.total_count, self.fail_count
            )
        } else {
            format!("{}/{} uploaded", self.done_count, self.total_count)
        }
    }

    /// Whether the batch is still inside its visibility window
    pub(crate) fn visible_at(&self, now: Instant, grace: Duration) -> bool {
        match self.completed_instant {
            None => true,
            Some(done) => now.saturating_duration_since(done) <= grace,
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_completion(&mut self, by: Duration) {
        if let Some(done) = self.completed_instant {
            self.completed_instant = done.checked_sub(by).or(Some(done));
        }
    }

    pub(crate) fn advance(&mut self, index: usize, next: ItemStatus) -> Result<(), TransitionError> {
        match self.items.get_mut(index) {
            Some(item) => item.transition(next),
            None => Ok(()),
        }
    }

    pub(crate) fn note_transfer(&mut self, index: usize, url: &str, attempts: u32) {
        if let Some(item) = self.items.get_mut(index) {
            item.public_url = Some(url.to_string());
            item.attempts = attempts;
        }
    }

    /// Move an item to its terminal state and update the counters
    ///
    /// Returns `true` exactly once: on the call that resolves the last item.
    pub(crate) fn resolve(
        &mut self,
        index: usize,
        error: Option<String>,
        now: Instant,
    ) -> Result<bool, TransitionError> {
        let Some(item) = self.items.get_mut(index) else {
            return Ok(false);
        };

        match error {
            None => {
                item.transition(ItemStatus::Done)?;
                self.done_count += 1;
            },
            Some(message) => {
                item.transition(ItemStatus::Failed)?;
                item.error = Some(if message.trim().is_empty() {
                    "upload failed without an error message".to_string()
                } else {
                    message
                });
                self.fail_count += 1;
            },
        }

        if self.completed_at.is_none() && self.resolved_count() == self.total_count {
            self.completed_at = Some(Utc::now());
            self.completed_instant = Some(now);
            return Ok(true);
        }

        Ok(false)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn batch(n: usize) -> UploadBatch {
        let files = (0..n)
            .map(|i| (PathBuf::from(format!("/photos/{}.jpg", i)), format!("{}.jpg", i)))
            .collect();
        UploadBatch::new(
            SiteKey::parse("S1").unwrap(),
            Category::parse("before").unwrap(),
            files,
        )
    }

    #[test]
    fn test_forward_transitions() {
        use ItemStatus::*;
        assert!(Queued.can_transition_to(Compressing));
        assert!(Compressing.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Done));
        assert!(Queued.can_transition_to(Failed));
        assert!(Compressing.can_transition_to(Failed));
        assert!(Uploading.can_transition_to(Failed));
    }

    #[test]
    fn test_no_backward_or_terminal_exits() {
        use ItemStatus::*;
        let all = [Queued, Compressing, Uploading, Done, Failed];
        for next in all {
            assert!(!Done.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(!Uploading.can_transition_to(Compressing));
        assert!(!Compressing.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Uploading));
        assert!(!Queued.can_transition_to(Done));
    }

    #[test]
    fn test_rejected_transition_leaves_item_unchanged() {
        let mut b = batch(1);
        let err = b.advance(0, ItemStatus::Done).unwrap_err();
        assert_eq!(err.from, ItemStatus::Queued);
        assert_eq!(b.items[0].status, ItemStatus::Queued);
    }

    #[test]
    fn test_object_key_layout() {
        let b = batch(1);
        let item = &b.items[0];
        assert_eq!(item.object_key(), format!("S1/before/{}-0.jpg", item.id));
    }

    #[test]
    fn test_item_ids_are_unique() {
        let b = batch(50);
        let mut ids: Vec<_> = b.items.iter().map(|i| i.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_resolve_counts_and_completes_once() {
        let mut b = batch(2);
        let now = Instant::now();
        for i in 0..2 {
            b.advance(i, ItemStatus::Compressing).unwrap();
            b.advance(i, ItemStatus::Uploading).unwrap();
        }

        assert!(!b.resolve(0, None, now).unwrap());
        assert_eq!((b.done_count, b.fail_count), (1, 0));
        assert!(b.completed_at.is_none());

        assert!(b.resolve(1, Some("boom".to_string()), now).unwrap());
        assert_eq!((b.done_count, b.fail_count), (1, 1));
        assert!(b.is_complete());
        assert!(b.has_failures());
        assert_eq!(b.items[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_resolving_twice_is_rejected() {
        let mut b = batch(1);
        let now = Instant::now();
        b.advance(0, ItemStatus::Compressing).unwrap();
        b.advance(0, ItemStatus::Uploading).unwrap();
        assert!(b.resolve(0, None, now).unwrap());

        assert!(b.resolve(0, Some("late".to_string()), now).is_err());
        assert_eq!((b.done_count, b.fail_count), (1, 0));
    }

    #[test]
    fn test_empty_error_gets_a_message() {
        let mut b = batch(1);
        b.resolve(0, Some("  ".to_string()), Instant::now()).unwrap();
        assert!(!b.items[0].error.as_deref().unwrap().trim().is_empty());
    }

    #[test]
    fn test_progress_label() {
        let mut b = batch(3);
        assert_eq!(b.progress_label(), "0/3 uploaded");
        b.resolve(0, Some("x".to_string()), Instant::now()).unwrap();
        assert_eq!(b.progress_label(), "0/3 uploaded, 1 failed");
    }

    #[test]
    fn test_visibility_window() {
        let mut b = batch(1);
        let start = Instant::now();
        let grace = Duration::from_secs(10);
        assert!(b.visible_at(start + Duration::from_secs(3600), grace));

        b.resolve(0, Some("x".to_string()), start).unwrap();
        assert!(b.visible_at(start + Duration::from_secs(10), grace));
        assert!(!b.visible_at(start + Duration::from_millis(10_001), grace));
    }
}
