use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shelf_platform::model::{FileEntity, FileId, UserId};
use shelf_platform::persistence::{CreateFolder, Persistence, ProgressFn, UploadFile};
use shelf_platform::storage::ObjectStore;

use crate::client::{HttpObjectStore, HttpPersistence};
use crate::config::ShelfConfig;
use crate::error::{DriveError, FailureKind};
use crate::files::{self, DownloadedFile};
use crate::mutation::{self, Action, IdLocks, Outcome};
use crate::navigation::{Crumb, NavigationStack, ScopeTag};
use crate::registry::{Authoritative, Mutation, Registry, Resolution, RollbackToken};
use crate::view::{self, Actions, Counts, View, ViewState};

/// Events published by a session for the presentation layer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A scope finished loading
    Loaded { folder: Option<FileId>, count: usize },
    /// A scope load failed; the previous entities are still shown
    LoadFailed { detail: String },
    /// A mutation resolved
    Outcome(Outcome),
}

/// What activating an item leads to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    Folder(FileId),
    Image { url: String },
    /// Plain files have no click action
    Nothing,
}

struct SessionState {
    registry: Registry,
    nav: NavigationStack,
    view: ViewState,
    last_error: Option<String>,
}

/// One user's registry, navigation stack and view state
pub struct Session {
    id: Uuid,
    user: UserId,
    config: ShelfConfig,
    persistence: Arc<dyn Persistence>,
    store: Arc<dyn ObjectStore>,
    state: Mutex<SessionState>,
    locks: IdLocks,
    /// Serializes scope reloads
    load_lock: tokio::sync::Mutex<()>,
    events: mpsc::Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        user: UserId,
        config: ShelfConfig,
        persistence: Arc<dyn Persistence>,
        store: Arc<dyn ObjectStore>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let session = Self {
            id: Uuid::new_v4(),
            user,
            config,
            persistence,
            store,
            state: Mutex::new(SessionState {
                registry: Registry::new(),
                nav: NavigationStack::new(),
                view: ViewState::default(),
                last_error: None,
            }),
            locks: IdLocks::new(),
            load_lock: tokio::sync::Mutex::new(()),
            events,
        };
        info!("session {} opened for user {}", session.id, session.user);
        (session, events_rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Snapshots for the presentation layer ---

    pub fn visible_entities(&self) -> Vec<FileEntity> {
        let state = self.lock_state();
        view::filter(state.registry.entities(), state.view.active)
    }

    pub fn counts(&self) -> Counts {
        self.lock_state().view.counts
    }

    pub fn navigation_path(&self) -> Vec<Crumb> {
        self.lock_state().nav.path().to_vec()
    }

    pub fn current_folder(&self) -> Option<FileId> {
        self.lock_state().nav.current_folder().cloned()
    }

    pub fn active_view(&self) -> View {
        self.lock_state().view.active
    }

    pub fn set_view(&self, view: View) {
        self.lock_state().view.active = view;
    }

    pub fn entity(&self, id: &FileId) -> Option<FileEntity> {
        self.lock_state().registry.get(id).cloned()
    }

    pub fn actions(&self, id: &FileId) -> Option<Actions> {
        self.lock_state().registry.get(id).map(Actions::for_entity)
    }

    /// True while the shown entities do not belong to the navigation target
    pub fn is_stale(&self) -> bool {
        let state = self.lock_state();
        !state.registry.is_loaded() || *state.registry.scope() != state.nav.target()
    }

    /// Message of the last failed load, cleared by the next successful one
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    // --- Scope loading ---

    /// Reload the current navigation target (external refresh trigger).
    pub async fn refresh(&self) -> Result<(), DriveError> {
        let target = self.lock_state().nav.target();
        self.load(target).await
    }

    async fn load(&self, tag: ScopeTag) -> Result<(), DriveError> {
        let _serial = self.load_lock.lock().await;
        if self.lock_state().nav.target() != tag {
            debug!("session {}: skipping load for superseded scope {:?}", self.id, tag);
            return Ok(());
        }

        let rows = match self.persistence.list_files(&self.user, tag.folder.as_ref()).await {
            Ok(rows) => rows,
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!("session {}: loading {:?} failed: {}", self.id, tag.folder, detail);
                self.lock_state().last_error = Some(detail.clone());
                self.emit(SessionEvent::LoadFailed {
                    detail: detail.clone(),
                });
                return Err(DriveError::Fetch(detail));
            }
        };

        let folder = tag.folder.clone();
        let count = {
            let mut state = self.lock_state();
            if state.nav.target() != tag {
                debug!("session {}: discarding listing for superseded scope {:?}", self.id, tag);
                return Ok(());
            }
            let SessionState {
                registry,
                view,
                last_error,
                ..
            } = &mut *state;
            let count = registry.load(tag, rows);
            view.recompute(registry.entities());
            *last_error = None;
            count
        };
        debug!("session {}: loaded {} entities in {:?}", self.id, count, folder);
        self.emit(SessionEvent::Loaded { folder, count });
        Ok(())
    }

    // --- Navigation ---

    pub async fn enter(&self, id: FileId, name: impl Into<String>) -> Result<(), DriveError> {
        let tag = {
            let mut state = self.lock_state();
            if let Some(entity) = state.registry.get(&id) {
                if !entity.is_folder {
                    return Err(DriveError::Invalid(format!("\"{}\" is not a folder", entity.name)));
                }
            }
            state.nav.enter(id, name)
        };
        self.load(tag).await
    }

    /// Go to the parent folder; nothing happens at root.
    pub async fn up(&self) -> Result<(), DriveError> {
        let tag = self.lock_state().nav.up();
        match tag {
            Some(tag) => self.load(tag).await,
            None => Ok(()),
        }
    }

    pub async fn jump_to(&self, index: isize) -> Result<(), DriveError> {
        let tag = self.lock_state().nav.jump_to(index);
        self.load(tag).await
    }

    /// Activate an item: folders are entered, images resolve to a viewer URL.
    pub async fn open(&self, id: &FileId) -> Result<Opened, DriveError> {
        let entity = self
            .entity(id)
            .ok_or_else(|| DriveError::NotFound(id.clone()))?;
        if entity.is_folder {
            self.enter(entity.id.clone(), entity.name).await?;
            return Ok(Opened::Folder(id.clone()));
        }
        if entity.is_image() {
            let url = files::preview_url(&entity, &self.config)?;
            return Ok(Opened::Image { url });
        }
        Ok(Opened::Nothing)
    }

    pub fn preview_url(&self, id: &FileId) -> Result<String, DriveError> {
        let entity = self
            .entity(id)
            .ok_or_else(|| DriveError::NotFound(id.clone()))?;
        files::preview_url(&entity, &self.config)
    }

    // --- Mutations ---

    /// Check preconditions and apply the optimistic change. Single-entity
    /// mutations also get the pre-change entity back for messages.
    fn begin(&self, mutation: &Mutation) -> Result<(RollbackToken, Option<FileEntity>), DriveError> {
        let mut state = self.lock_state();
        let before = match mutation {
            Mutation::ToggleStar(id) | Mutation::ToggleTrash(id) | Mutation::Delete(id) => {
                let entity = state
                    .registry
                    .get(id)
                    .cloned()
                    .ok_or_else(|| DriveError::NotFound(id.clone()))?;
                if matches!(mutation, Mutation::ToggleStar(_)) && entity.is_trash {
                    return Err(DriveError::Invalid(format!(
                        "\"{}\" is in trash and cannot be starred",
                        entity.name
                    )));
                }
                if matches!(mutation, Mutation::Delete(_)) && !entity.is_trash {
                    debug!("permanently deleting {} without trashing it first", id);
                }
                Some(entity)
            }
            Mutation::EmptyTrash(_) => None,
        };
        let token = state.registry.apply_optimistic(mutation)?;
        let SessionState { registry, view, .. } = &mut *state;
        view.recompute(registry.entities());
        Ok((token, before))
    }

    /// Commit (`Some`) or roll back (`None`) a token. The registry drops it
    /// untouched if another scope was loaded since it was issued.
    fn settle(&self, token: RollbackToken, result: Option<Authoritative>) -> Resolution {
        let mut state = self.lock_state();
        let SessionState { registry, view, .. } = &mut *state;
        let resolution = match result {
            Some(result) => registry.commit(token, result),
            None => registry.rollback(token),
        };
        match resolution {
            Resolution::Applied => view.recompute(registry.entities()),
            Resolution::Stale => {
                debug!("session {}: result arrived for a scope no longer loaded", self.id)
            }
        }
        resolution
    }

    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("session {}: event buffer full, dropping event", self.id),
            Err(TrySendError::Closed(_)) => debug!("session {}: no event listener", self.id),
        }
    }

    fn publish(&self, outcome: Outcome) -> Outcome {
        if outcome.is_success() {
            info!("{}", outcome);
        } else {
            warn!("{}", outcome);
        }
        self.emit(SessionEvent::Outcome(outcome.clone()));
        outcome
    }

    fn reject(&self, action: Action, fallback: FailureKind, error: DriveError) -> Outcome {
        self.publish(Outcome::failure(action, error.kind_or(fallback), error.to_string()))
    }

    pub async fn toggle_star(&self, id: &FileId) -> Outcome {
        let action = Action::ToggleStar;
        let _guard = self.locks.acquire(id).await;
        let (token, before) = match self.begin(&Mutation::ToggleStar(id.clone())) {
            Ok(started) => started,
            Err(e) => return self.reject(action, FailureKind::ActionFailed, e),
        };
        let name = before.map(|e| e.name).unwrap_or_default();

        match self.persistence.toggle_star(id).await {
            Ok(result) => {
                self.settle(token, Some(Authoritative::Starred(result.is_starred)));
                self.publish(mutation::star_success(&name, result.is_starred))
            }
            Err(e) => {
                warn!("toggle star failed for {}: {:#}", id, e);
                self.settle(token, None);
                self.publish(Outcome::failure(
                    action,
                    FailureKind::ActionFailed,
                    format!("We couldn't update the star status of \"{}\": {:#}", name, e),
                ))
            }
        }
    }

    pub async fn toggle_trash(&self, id: &FileId) -> Outcome {
        let action = Action::ToggleTrash;
        let _guard = self.locks.acquire(id).await;
        let (token, before) = match self.begin(&Mutation::ToggleTrash(id.clone())) {
            Ok(started) => started,
            Err(e) => return self.reject(action, FailureKind::ActionFailed, e),
        };
        let name = before.map(|e| e.name).unwrap_or_default();

        match self.persistence.toggle_trash(id).await {
            Ok(result) => {
                self.settle(token, Some(Authoritative::Trash(result.is_trash)));
                self.publish(mutation::trash_success(&name, result.is_trash))
            }
            Err(e) => {
                warn!("toggle trash failed for {}: {:#}", id, e);
                self.settle(token, None);
                self.publish(Outcome::failure(
                    action,
                    FailureKind::ActionFailed,
                    format!("We couldn't update the status of \"{}\": {:#}", name, e),
                ))
            }
        }
    }

    pub async fn delete_permanent(&self, id: &FileId) -> Outcome {
        let action = Action::DeletePermanent;
        let _guard = self.locks.acquire(id).await;
        let (token, before) = match self.begin(&Mutation::Delete(id.clone())) {
            Ok(started) => started,
            Err(e) => return self.reject(action, FailureKind::DeletionFailed, e),
        };
        let name = before.map(|e| e.name).unwrap_or_else(|| "File".to_string());

        let failure = match self.persistence.delete_file(id).await {
            Ok(result) if result.success => {
                self.settle(token, Some(Authoritative::Nothing));
                return self.publish(mutation::delete_success(&name));
            }
            Ok(result) => result
                .error
                .unwrap_or_else(|| "Failed to delete file".to_string()),
            Err(e) => format!("{:#}", e),
        };

        warn!("delete failed for {}: {}", id, failure);
        self.settle(token, None);
        self.publish(Outcome::failure(
            action,
            FailureKind::DeletionFailed,
            format!("We couldn't delete \"{}\": {}", name, failure),
        ))
    }

    /// Permanently delete everything in trash. All-or-nothing on the server
    /// is a contract of the persistence service; locally a failure restores
    /// every removed entity.
    pub async fn empty_trash(&self) -> Outcome {
        let action = Action::EmptyTrash;
        let (ids, _guards) = self.lock_trashed().await;
        let (token, _) = match self.begin(&Mutation::EmptyTrash(ids)) {
            Ok(started) => started,
            Err(e) => return self.reject(action, FailureKind::ActionFailed, e),
        };
        let removed = token.removed().len() as u64;

        match self.persistence.empty_trash(&self.user).await {
            Ok(result) => {
                if result.deleted_count < removed {
                    warn!(
                        "server deleted {} items but {} were trashed locally",
                        result.deleted_count, removed
                    );
                }
                self.settle(token, Some(Authoritative::Nothing));
                self.publish(mutation::empty_trash_success(result.deleted_count))
            }
            Err(e) => {
                warn!("empty trash failed: {:#}", e);
                self.settle(token, None);
                self.publish(Outcome::failure(
                    action,
                    FailureKind::ActionFailed,
                    format!("We couldn't empty the trash: {:#}", e),
                ))
            }
        }
    }

    /// Lock every trashed id. Items trashed while waiting are picked up by
    /// retrying until the set no longer changes under the held locks.
    async fn lock_trashed(&self) -> (Vec<FileId>, Vec<OwnedMutexGuard<()>>) {
        let mut ids = self.lock_state().registry.trashed_ids();
        loop {
            let guards = self.locks.acquire_many(&ids).await;
            let current = self.lock_state().registry.trashed_ids();
            if current.iter().all(|id| ids.binary_search(id).is_ok()) {
                return (current, guards);
            }
            debug!("trash changed while waiting for locks, retrying");
            drop(guards);
            ids = current;
        }
    }

    /// Create a folder inside the current navigation target.
    pub async fn create_folder(&self, name: &str) -> Outcome {
        let action = Action::CreateFolder;
        let name = name.trim();
        if name.is_empty() {
            return self.publish(Outcome::failure(
                action,
                FailureKind::CreationFailed,
                "Please enter a valid folder name.",
            ));
        }

        let scope = self.lock_state().nav.target();
        let req = CreateFolder {
            name: name.to_string(),
            user_id: self.user.clone(),
            parent_id: scope.folder.clone(),
        };

        match self.persistence.create_folder(&req).await {
            Ok(created) => {
                {
                    let mut state = self.lock_state();
                    if state.nav.target() == scope && *state.registry.scope() == scope {
                        let SessionState { registry, view, .. } = &mut *state;
                        if registry.upsert(created) {
                            view.recompute(registry.entities());
                        }
                    }
                }
                self.publish(Outcome::success(
                    action,
                    "Folder Created",
                    format!("Folder \"{}\" has been created successfully.", name),
                ))
            }
            Err(e) => {
                warn!("create folder {:?} failed: {:#}", name, e);
                self.publish(Outcome::failure(
                    action,
                    FailureKind::CreationFailed,
                    format!("We couldn't create the folder: {:#}", e),
                ))
            }
        }
    }

    /// Upload into the current navigation target, then reload it to pick up
    /// the server-assigned entity. Oversized files never reach the network.
    pub async fn upload(&self, file: UploadFile, progress: Option<ProgressFn>) -> Outcome {
        let action = Action::Upload;
        if let Err(e) = files::check_upload(&file, self.config.max_upload_bytes) {
            return self.reject(action, FailureKind::UploadFailed, e);
        }

        let parent = self.current_folder();
        let name = file.name.clone();
        match self
            .persistence
            .upload_file(file, &self.user, parent.as_ref(), progress)
            .await
        {
            Ok(created) => {
                debug!("uploaded {} as {}", name, created.id);
                if let Err(e) = self.refresh().await {
                    warn!("reload after upload failed: {}", e);
                }
                self.publish(Outcome::success(
                    action,
                    "Upload Successful",
                    format!("{} has been uploaded successfully.", name),
                ))
            }
            Err(e) => {
                warn!("upload of {} failed: {:#}", name, e);
                self.publish(Outcome::failure(
                    action,
                    FailureKind::UploadFailed,
                    format!("We couldn't upload {}: {:#}", name, e),
                ))
            }
        }
    }

    /// Fetch an entity's bytes for a client-side save. Never touches the registry.
    pub async fn download(&self, id: &FileId) -> (Outcome, Option<DownloadedFile>) {
        let action = Action::Download;
        let entity = match self.entity(id) {
            Some(entity) => entity,
            None => {
                let outcome =
                    self.reject(action, FailureKind::DownloadFailed, DriveError::NotFound(id.clone()));
                return (outcome, None);
            }
        };
        let url = match files::download_url(&entity, &self.config) {
            Ok(url) => url,
            Err(e) => return (self.reject(action, FailureKind::DownloadFailed, e), None),
        };

        debug!("downloading {} from {}", entity.name, url);
        match self.store.fetch(&url).await {
            Ok(data) => {
                let outcome = self.publish(Outcome::success(
                    action,
                    "Download Ready",
                    format!("\"{}\" is ready to download.", entity.name),
                ));
                let file = DownloadedFile {
                    name: entity.name,
                    content_type: entity.content_type,
                    data,
                };
                (outcome, Some(file))
            }
            Err(e) => {
                let outcome = self.publish(Outcome::failure(
                    action,
                    FailureKind::DownloadFailed,
                    format!("We couldn't download \"{}\": {:#}", entity.name, e),
                ));
                (outcome, None)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session {} for user {} closed", self.id, self.user);
    }
}

/// Owns one [`Session`] per signed-in user
pub struct SessionManager {
    config: ShelfConfig,
    persistence: Arc<dyn Persistence>,
    store: Arc<dyn ObjectStore>,
    sessions: HashMap<UserId, Arc<Session>>,
}

impl SessionManager {
    pub fn new(
        config: ShelfConfig,
        persistence: Arc<dyn Persistence>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            persistence,
            store,
            sessions: HashMap::new(),
        }
    }

    /// Wire the HTTP collaborators from config. Fails before any request
    /// when the API base URL is missing.
    pub fn from_config(config: ShelfConfig) -> Result<Self, DriveError> {
        let persistence = Arc::new(HttpPersistence::new(&config)?);
        let store = Arc::new(HttpObjectStore::new(&config)?);
        Ok(Self::new(config, persistence, store))
    }

    /// Open a fresh session for `user`, replacing any existing one.
    pub fn open(&mut self, user: UserId) -> (Arc<Session>, mpsc::Receiver<SessionEvent>) {
        if self.sessions.contains_key(&user) {
            warn!("session already exists for user {}, closing old one", user);
            self.close(&user);
        }
        let (session, events) = Session::new(
            user.clone(),
            self.config.clone(),
            self.persistence.clone(),
            self.store.clone(),
        );
        let session = Arc::new(session);
        self.sessions.insert(user, session.clone());
        (session, events)
    }

    pub fn get(&self, user: &UserId) -> Option<Arc<Session>> {
        self.sessions.get(user).cloned()
    }

    pub fn close(&mut self, user: &UserId) -> bool {
        match self.sessions.remove(user) {
            Some(session) => {
                info!("closing session {} for user {}", session.id(), user);
                true
            }
            None => false,
        }
    }

    pub fn has_active_sessions(&self) -> bool {
        !self.sessions.is_empty()
    }

    pub fn close_all(&mut self) {
        let users: Vec<UserId> = self.sessions.keys().cloned().collect();
        for user in users {
            self.close(&user);
        }
    }
}
