//! Outcome reporting and per-entity serialization for mutations.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use shelf_platform::model::FileId;

use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    ToggleStar,
    ToggleTrash,
    DeletePermanent,
    EmptyTrash,
    CreateFolder,
    Upload,
    Download,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ToggleStar => "star",
            Self::ToggleTrash => "trash",
            Self::DeletePermanent => "delete",
            Self::EmptyTrash => "empty trash",
            Self::CreateFolder => "create folder",
            Self::Upload => "upload",
            Self::Download => "download",
        })
    }
}

/// The single result every mutation resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Success {
        action: Action,
        title: String,
        detail: String,
    },
    Failure {
        action: Action,
        kind: FailureKind,
        detail: String,
    },
}

impl Outcome {
    pub fn success(action: Action, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Success {
            action,
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn failure(action: Action, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            action,
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn action(&self) -> Action {
        match self {
            Self::Success { action, .. } | Self::Failure { action, .. } => *action,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Success { title, .. } => title,
            Self::Failure { kind, .. } => kind.title(),
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Success { detail, .. } | Self::Failure { detail, .. } => detail,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.detail())
    }
}

pub fn star_success(name: &str, starred: bool) -> Outcome {
    if starred {
        Outcome::success(
            Action::ToggleStar,
            "Added to Starred",
            format!("\"{}\" has been added to your starred files", name),
        )
    } else {
        Outcome::success(
            Action::ToggleStar,
            "Removed from Starred",
            format!("\"{}\" has been removed from your starred files", name),
        )
    }
}

pub fn trash_success(name: &str, in_trash: bool) -> Outcome {
    if in_trash {
        Outcome::success(
            Action::ToggleTrash,
            "Moved to Trash",
            format!("\"{}\" has been moved to trash", name),
        )
    } else {
        Outcome::success(
            Action::ToggleTrash,
            "Restored from Trash",
            format!("\"{}\" has been restored", name),
        )
    }
}

pub fn delete_success(name: &str) -> Outcome {
    Outcome::success(
        Action::DeletePermanent,
        "File Permanently Deleted",
        format!("\"{}\" has been permanently removed", name),
    )
}

pub fn empty_trash_success(count: u64) -> Outcome {
    Outcome::success(
        Action::EmptyTrash,
        "Trash Emptied",
        format!("All {} items have been permanently deleted", count),
    )
}

/// Per-entity async locks; at most one mutation per id is in flight.
#[derive(Default)]
pub struct IdLocks {
    locks: Mutex<HashMap<FileId, Arc<AsyncMutex<()>>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &FileId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // nobody holds or waits on an entry whose only owner is the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Lock several ids, always in sorted order so two bulk callers cannot deadlock.
    pub async fn acquire_many(&self, ids: &[FileId]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&FileId> = ids.iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.acquire(id).await);
        }
        guards
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn outcome_titles_follow_kind_on_failure() {
        let ok = star_success("a.png", true);
        assert!(ok.is_success());
        assert_eq!(ok.title(), "Added to Starred");
        assert_eq!(ok.to_string(), "Added to Starred: \"a.png\" has been added to your starred files");

        let failed = Outcome::failure(Action::DeletePermanent, FailureKind::DeletionFailed, "boom");
        assert_eq!(failed.title(), "Deletion Failed");
        assert_eq!(failed.failure_kind(), Some(FailureKind::DeletionFailed));
        assert_eq!(failed.action(), Action::DeletePermanent);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(trash_success("a.png", false)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["action"], "toggle-trash");
        assert_eq!(json["title"], "Restored from Trash");
    }

    #[tokio::test(start_paused = true)]
    async fn same_id_is_serialized() {
        let locks = Arc::new(IdLocks::new());
        let id = FileId::from("1");
        let first = locks.acquire(&id).await;

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block_each_other() {
        let locks = IdLocks::new();
        let _a = locks.acquire(&FileId::from("a")).await;
        let _b = locks.acquire(&FileId::from("b")).await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = IdLocks::new();
        drop(locks.acquire(&FileId::from("a")).await);
        let _b = locks.acquire(&FileId::from("b")).await;
        assert_eq!(locks.tracked(), 1);
    }

    #[tokio::test]
    async fn acquire_many_dedups_ids() {
        let locks = IdLocks::new();
        let ids = vec![FileId::from("b"), FileId::from("a"), FileId::from("b")];
        let guards = locks.acquire_many(&ids).await;
        assert_eq!(guards.len(), 2);
    }
}
