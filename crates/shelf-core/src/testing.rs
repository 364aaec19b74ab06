//! Test doubles for the persistence and object-storage collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use shelf_platform::model::{FileEntity, FileId, UserId, FOLDER_CONTENT_TYPE};
use shelf_platform::persistence::{
    CreateFolder, DeleteResult, EmptyTrashResult, Persistence, ProgressFn, StarResult,
    TrashResult, UploadFile,
};
use shelf_platform::storage::ObjectStore;

pub fn entity(id: &str, name: &str) -> FileEntity {
    FileEntity {
        id: FileId::from(id),
        name: name.to_string(),
        content_type: "image/png".to_string(),
        size: 1024,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        is_folder: false,
        is_starred: false,
        is_trash: false,
        parent_id: None,
        path: Some(format!("/user-1/{}", name)),
        file_url: Some(format!("https://cdn.example.com/user-1/{}", name)),
    }
}

pub fn folder(id: &str, name: &str, parent: Option<&str>) -> FileEntity {
    FileEntity {
        content_type: FOLDER_CONTENT_TYPE.to_string(),
        size: 0,
        is_folder: true,
        parent_id: parent.map(FileId::from),
        path: None,
        file_url: None,
        ..entity(id, name)
    }
}

/// In-memory backend. Every call is counted; failure switches make the next calls fail.
#[derive(Default)]
pub struct MockPersistence {
    pub rows: Mutex<Vec<FileEntity>>,
    pub fail_list: Mutex<bool>,
    pub fail_mutations: Mutex<bool>,
    /// `delete_file` answers `success: false` instead of erroring
    pub soft_fail_delete: Mutex<bool>,
    pub calls: AtomicUsize,
    /// When set, mutation calls wait for a notification before answering
    pub gate: Mutex<Option<Arc<Notify>>>,
    next_id: AtomicUsize,
}

impl MockPersistence {
    pub fn with_rows(rows: Vec<FileEntity>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_mutations(&self, fail: bool) {
        *self.fail_mutations.lock().unwrap() = fail;
    }

    pub fn set_fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn hold_mutations(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    async fn mutation_gate(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_mutations.lock().unwrap() {
            bail!("HTTP 500 Internal Server Error");
        }
        Ok(())
    }

    fn update<T>(&self, id: &FileId, f: impl FnOnce(&mut FileEntity) -> T) -> Result<T> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| &r.id == id) {
            Some(row) => Ok(f(row)),
            None => bail!("HTTP 404 Not Found - File not found"),
        }
    }

    fn next_id(&self) -> FileId {
        FileId::new(format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn list_files(&self, _user: &UserId, parent: Option<&FileId>) -> Result<Vec<FileEntity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_list.lock().unwrap() {
            bail!("HTTP 503 Service Unavailable");
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.parent_id.as_ref() == parent)
            .cloned()
            .collect())
    }

    async fn toggle_star(&self, id: &FileId) -> Result<StarResult> {
        self.mutation_gate().await?;
        self.update(id, |row| {
            row.is_starred = !row.is_starred;
            StarResult {
                is_starred: row.is_starred,
            }
        })
    }

    async fn toggle_trash(&self, id: &FileId) -> Result<TrashResult> {
        self.mutation_gate().await?;
        self.update(id, |row| {
            row.is_trash = !row.is_trash;
            TrashResult {
                is_trash: row.is_trash,
            }
        })
    }

    async fn delete_file(&self, id: &FileId) -> Result<DeleteResult> {
        self.mutation_gate().await?;
        if *self.soft_fail_delete.lock().unwrap() {
            return Ok(DeleteResult {
                success: false,
                error: Some("storage backend refused".into()),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| &r.id != id);
        Ok(DeleteResult {
            success: rows.len() < before,
            error: None,
        })
    }

    async fn empty_trash(&self, _user: &UserId) -> Result<EmptyTrashResult> {
        self.mutation_gate().await?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !r.is_trash);
        Ok(EmptyTrashResult {
            deleted_count: (before - rows.len()) as u64,
        })
    }

    async fn create_folder(&self, req: &CreateFolder) -> Result<FileEntity> {
        self.mutation_gate().await?;
        let created = FileEntity {
            id: self.next_id(),
            parent_id: req.parent_id.clone(),
            ..folder("tmp", &req.name, None)
        };
        self.rows.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn upload_file(
        &self,
        file: UploadFile,
        _user: &UserId,
        parent: Option<&FileId>,
        progress: Option<ProgressFn>,
    ) -> Result<FileEntity> {
        self.mutation_gate().await?;
        let size = file.size();
        if let Some(cb) = progress {
            cb(size, size);
        }
        let created = FileEntity {
            id: self.next_id(),
            content_type: file.content_type.clone(),
            size,
            parent_id: parent.cloned(),
            ..entity("tmp", &file.name)
        };
        self.rows.lock().unwrap().push(created.clone());
        Ok(created)
    }
}

/// Serves canned bytes per URL; unknown URLs fail like a 404
#[derive(Default)]
pub struct MockStore {
    pub objects: Mutex<HashMap<String, Bytes>>,
    pub requested: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn with_object(url: &str, data: &'static [u8]) -> Arc<Self> {
        let store = Self::default();
        store
            .objects
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from_static(data));
        Arc::new(store)
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.objects.lock().unwrap().get(url) {
            Some(data) => Ok(data.clone()),
            None => bail!("download failed: HTTP 404 Not Found"),
        }
    }
}
