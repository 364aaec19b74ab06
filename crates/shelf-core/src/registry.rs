//! In-memory entity set for the loaded folder scope.
//!
//! Every optimistic change returns a [`RollbackToken`] holding the minimal
//! pre-change state. A token resolves exactly once, through either
//! [`Registry::commit`] or [`Registry::rollback`], and only takes effect if
//! the registry still holds the scope the token was issued against.
//! Unresolved changes are kept as overlays and re-applied when the same
//! scope is reloaded.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use shelf_platform::model::{FileEntity, FileId};

use crate::error::DriveError;
use crate::navigation::ScopeTag;

/// Local change applied ahead of the server call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    ToggleStar(FileId),
    ToggleTrash(FileId),
    Delete(FileId),
    /// Remove the listed entities that are still in trash
    EmptyTrash(Vec<FileId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Starred,
    Trash,
}

impl Flag {
    fn slot(self, entity: &mut FileEntity) -> &mut bool {
        match self {
            Self::Starred => &mut entity.is_starred,
            Self::Trash => &mut entity.is_trash,
        }
    }
}

#[derive(Debug, Clone)]
enum Undo {
    Flag {
        id: FileId,
        flag: Flag,
        previous: bool,
    },
    Reinsert(Vec<FileEntity>),
}

/// Optimistic state an unresolved token keeps imposing on reloads
#[derive(Debug, Clone)]
enum Overlay {
    Flag { id: FileId, flag: Flag, value: bool },
    Removed(Vec<FileId>),
}

impl Overlay {
    fn of(undo: &Undo) -> Self {
        match undo {
            Undo::Flag { id, flag, previous } => Self::Flag {
                id: id.clone(),
                flag: *flag,
                value: !previous,
            },
            Undo::Reinsert(snapshot) => Self::Removed(snapshot.iter().map(|e| e.id.clone()).collect()),
        }
    }

    fn apply(&self, entities: &mut HashMap<FileId, FileEntity>) {
        match self {
            Self::Flag { id, flag, value } => {
                if let Some(entity) = entities.get_mut(id) {
                    *flag.slot(entity) = *value;
                }
            }
            Self::Removed(ids) => {
                for id in ids {
                    entities.remove(id);
                }
            }
        }
    }
}

#[derive(Debug)]
#[must_use = "a rollback token must be committed or rolled back"]
pub struct RollbackToken {
    scope: ScopeTag,
    seq: u64,
    undo: Undo,
}

impl RollbackToken {
    pub fn scope(&self) -> &ScopeTag {
        &self.scope
    }

    /// Entities taken out of the registry by this change
    pub fn removed(&self) -> &[FileEntity] {
        match &self.undo {
            Undo::Reinsert(snapshot) => snapshot,
            Undo::Flag { .. } => &[],
        }
    }
}

/// Field values the server reported after a successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authoritative {
    Starred(bool),
    Trash(bool),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// The registry moved to another scope; the token was dropped untouched
    Stale,
}

#[derive(Debug, Default)]
pub struct Registry {
    scope: ScopeTag,
    loaded: bool,
    entities: HashMap<FileId, FileEntity>,
    /// Unresolved optimistic changes in issue order
    pending: BTreeMap<u64, Overlay>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> &ScopeTag {
        &self.scope
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, id: &FileId) -> Option<&FileEntity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &FileEntity> {
        self.entities.values()
    }

    pub fn trashed_ids(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self
            .entities
            .values()
            .filter(|e| e.is_trash)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of optimistic changes not yet committed or rolled back
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Replace the entity set with a fresh fetch for `scope`.
    ///
    /// Rows that break the entity invariants are dropped; duplicate ids keep
    /// the last row. Reloading the loaded scope keeps unresolved optimistic
    /// changes on top of the fresh rows; any other scope discards them.
    pub fn load(&mut self, scope: ScopeTag, entities: Vec<FileEntity>) -> usize {
        let mut fresh = HashMap::with_capacity(entities.len());
        for entity in entities {
            if let Err(e) = entity.validate() {
                warn!("dropping invalid entity from listing: {}", e);
                continue;
            }
            if let Some(previous) = fresh.insert(entity.id.clone(), entity) {
                warn!("listing contains duplicate id {}, keeping the last row", previous.id);
            }
        }

        if scope == self.scope {
            for overlay in self.pending.values() {
                overlay.apply(&mut fresh);
            }
        } else if !self.pending.is_empty() {
            debug!("scope changed, dropping {} pending overlays", self.pending.len());
            self.pending.clear();
        }

        debug!("registry loaded {} entities for {:?}", fresh.len(), scope);
        self.scope = scope;
        self.entities = fresh;
        self.loaded = true;
        self.entities.len()
    }

    /// Insert or replace a server-returned entity if it belongs to the loaded scope.
    pub fn upsert(&mut self, entity: FileEntity) -> bool {
        if entity.parent_id != self.scope.folder {
            return false;
        }
        if let Err(e) = entity.validate() {
            warn!("ignoring invalid entity from server: {}", e);
            return false;
        }
        self.entities.insert(entity.id.clone(), entity);
        true
    }

    pub fn apply_optimistic(&mut self, mutation: &Mutation) -> Result<RollbackToken, DriveError> {
        let undo = match mutation {
            Mutation::ToggleStar(id) => self.flip(id, Flag::Starred)?,
            Mutation::ToggleTrash(id) => self.flip(id, Flag::Trash)?,
            Mutation::Delete(id) => {
                let entity = self
                    .entities
                    .remove(id)
                    .ok_or_else(|| DriveError::NotFound(id.clone()))?;
                Undo::Reinsert(vec![entity])
            }
            Mutation::EmptyTrash(ids) => {
                let mut removed = Vec::with_capacity(ids.len());
                for id in ids {
                    if !self.entities.get(id).is_some_and(|e| e.is_trash) {
                        continue;
                    }
                    if let Some(entity) = self.entities.remove(id) {
                        removed.push(entity);
                    }
                }
                Undo::Reinsert(removed)
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, Overlay::of(&undo));
        Ok(RollbackToken {
            scope: self.scope.clone(),
            seq,
            undo,
        })
    }

    pub fn commit(&mut self, token: RollbackToken, result: Authoritative) -> Resolution {
        if token.scope != self.scope {
            debug!("dropping commit issued for {:?}", token.scope);
            return Resolution::Stale;
        }
        self.pending.remove(&token.seq);
        match token.undo {
            Undo::Flag { id, flag, .. } => {
                if let Some(entity) = self.entities.get_mut(&id) {
                    match (flag, result) {
                        (Flag::Starred, Authoritative::Starred(value))
                        | (Flag::Trash, Authoritative::Trash(value)) => *flag.slot(entity) = value,
                        _ => {}
                    }
                }
            }
            Undo::Reinsert(snapshot) => {
                // a reload of the same scope may have brought the rows back
                for entity in snapshot {
                    self.entities.remove(&entity.id);
                }
            }
        }
        Resolution::Applied
    }

    pub fn rollback(&mut self, token: RollbackToken) -> Resolution {
        if token.scope != self.scope {
            debug!("dropping rollback issued for {:?}", token.scope);
            return Resolution::Stale;
        }
        self.pending.remove(&token.seq);
        match token.undo {
            Undo::Flag { id, flag, previous } => {
                if let Some(entity) = self.entities.get_mut(&id) {
                    *flag.slot(entity) = previous;
                }
            }
            Undo::Reinsert(snapshot) => {
                for entity in snapshot {
                    self.entities.entry(entity.id.clone()).or_insert(entity);
                }
            }
        }
        Resolution::Applied
    }

    fn flip(&mut self, id: &FileId, flag: Flag) -> Result<Undo, DriveError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| DriveError::NotFound(id.clone()))?;
        let slot = flag.slot(entity);
        let previous = *slot;
        *slot = !previous;
        Ok(Undo::Flag {
            id: id.clone(),
            flag,
            previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::entity;
    use crate::view::{self, View};

    fn root() -> ScopeTag {
        ScopeTag::default()
    }

    fn registry_with(entities: Vec<FileEntity>) -> Registry {
        let mut registry = Registry::new();
        registry.load(root(), entities);
        registry
    }

    fn trashed(id: &str) -> FileEntity {
        let mut e = entity(id, &format!("{}.png", id));
        e.is_trash = true;
        e
    }

    #[test]
    fn toggle_trash_moves_entity_between_views() {
        let mut registry = registry_with(vec![entity("1", "a.png")]);
        let token = registry
            .apply_optimistic(&Mutation::ToggleTrash(FileId::from("1")))
            .unwrap();

        assert!(registry.get(&FileId::from("1")).unwrap().is_trash);
        let trash = view::filter(registry.entities(), View::Trash);
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].id, FileId::from("1"));
        assert!(view::filter(registry.entities(), View::All).is_empty());

        assert_eq!(registry.commit(token, Authoritative::Trash(true)), Resolution::Applied);
        assert!(registry.get(&FileId::from("1")).unwrap().is_trash);
    }

    #[test]
    fn double_star_toggle_restores_original() {
        let mut registry = registry_with(vec![entity("1", "a.png")]);
        let id = FileId::from("1");
        for _ in 0..2 {
            let token = registry.apply_optimistic(&Mutation::ToggleStar(id.clone())).unwrap();
            let value = registry.get(&id).unwrap().is_starred;
            registry.commit(token, Authoritative::Starred(value));
        }
        assert!(!registry.get(&id).unwrap().is_starred);
    }

    #[test]
    fn rollback_restores_flag() {
        let mut registry = registry_with(vec![entity("1", "a.png")]);
        let id = FileId::from("1");
        let token = registry.apply_optimistic(&Mutation::ToggleTrash(id.clone())).unwrap();
        assert_eq!(registry.rollback(token), Resolution::Applied);
        assert!(!registry.get(&id).unwrap().is_trash);
    }

    #[test]
    fn commit_takes_server_value_over_local_flip() {
        let mut registry = registry_with(vec![entity("1", "a.png")]);
        let id = FileId::from("1");
        let token = registry.apply_optimistic(&Mutation::ToggleTrash(id.clone())).unwrap();
        registry.commit(token, Authoritative::Trash(false));
        assert!(!registry.get(&id).unwrap().is_trash);
    }

    #[test]
    fn delete_rollback_reinserts_identical_snapshot() {
        let original = trashed("2");
        let mut registry = registry_with(vec![entity("1", "a.png"), original.clone()]);
        let token = registry
            .apply_optimistic(&Mutation::Delete(FileId::from("2")))
            .unwrap();
        assert!(registry.get(&FileId::from("2")).is_none());

        registry.rollback(token);
        assert_eq!(registry.get(&FileId::from("2")), Some(&original));
    }

    #[test]
    fn delete_unknown_id_is_not_found() {
        let mut registry = registry_with(vec![]);
        assert!(matches!(
            registry.apply_optimistic(&Mutation::Delete(FileId::from("nope"))),
            Err(DriveError::NotFound(_))
        ));
    }

    #[test]
    fn empty_trash_removes_all_trashed_and_zeroes_count() {
        let mut registry =
            registry_with(vec![trashed("1"), trashed("2"), trashed("3"), entity("4", "keep")]);
        let ids = registry.trashed_ids();
        let token = registry.apply_optimistic(&Mutation::EmptyTrash(ids)).unwrap();
        assert_eq!(token.removed().len(), 3);
        registry.commit(token, Authoritative::Nothing);

        assert_eq!(registry.entities().count(), 1);
        assert_eq!(view::counts(registry.entities()).trash, 0);
    }

    #[test]
    fn empty_trash_rollback_restores_whole_set() {
        let mut registry = registry_with(vec![trashed("1"), trashed("2"), entity("3", "keep")]);
        let ids = registry.trashed_ids();
        let token = registry.apply_optimistic(&Mutation::EmptyTrash(ids)).unwrap();
        assert_eq!(registry.entities().count(), 1);
        registry.rollback(token);
        assert_eq!(registry.entities().count(), 3);
        assert_eq!(view::counts(registry.entities()).trash, 2);
    }

    #[test]
    fn empty_trash_skips_ids_restored_meanwhile() {
        let mut registry = registry_with(vec![trashed("1"), trashed("2")]);
        let ids = registry.trashed_ids();
        registry.entities.get_mut(&FileId::from("2")).unwrap().is_trash = false;
        let token = registry.apply_optimistic(&Mutation::EmptyTrash(ids)).unwrap();
        assert_eq!(token.removed().len(), 1);
        assert!(registry.get(&FileId::from("2")).is_some());
    }

    #[test]
    fn tokens_from_an_older_scope_are_discarded() {
        let mut registry = registry_with(vec![entity("1", "a.png")]);
        let id = FileId::from("1");
        let token = registry.apply_optimistic(&Mutation::ToggleStar(id.clone())).unwrap();

        let newer = ScopeTag {
            folder: Some(FileId::from("f1")),
            epoch: 1,
        };
        let mut inner = entity("1", "a.png");
        inner.parent_id = Some(FileId::from("f1"));
        registry.load(newer, vec![inner]);

        assert_eq!(registry.rollback(token), Resolution::Stale);
        assert!(!registry.get(&id).unwrap().is_starred);
    }

    #[test]
    fn load_drops_invalid_rows_and_keeps_last_duplicate() {
        let mut bad_folder = entity("1", "Photos");
        bad_folder.is_folder = true;
        bad_folder.file_url = Some("https://cdn/x".into());
        let first = entity("2", "first.png");
        let second = entity("2", "second.png");

        let mut registry = Registry::new();
        assert_eq!(registry.load(root(), vec![bad_folder, first, second]), 1);
        assert_eq!(registry.get(&FileId::from("2")).unwrap().name, "second.png");
    }

    #[test]
    fn upsert_only_accepts_current_scope() {
        let mut registry = registry_with(vec![]);
        let mut elsewhere = entity("9", "Nested");
        elsewhere.parent_id = Some(FileId::from("f1"));
        assert!(!registry.upsert(elsewhere));
        assert!(registry.upsert(entity("8", "Here")));
        assert_eq!(registry.entities().count(), 1);
    }

    #[test]
    fn reload_of_same_scope_keeps_pending_changes() {
        let mut registry = registry_with(vec![entity("1", "a.png"), trashed("2")]);
        let star = registry
            .apply_optimistic(&Mutation::ToggleStar(FileId::from("1")))
            .unwrap();
        let delete = registry
            .apply_optimistic(&Mutation::Delete(FileId::from("2")))
            .unwrap();
        assert_eq!(registry.pending(), 2);

        registry.load(root(), vec![entity("1", "a.png"), trashed("2")]);
        assert!(registry.get(&FileId::from("1")).unwrap().is_starred);
        assert!(registry.get(&FileId::from("2")).is_none());

        registry.rollback(star);
        registry.commit(delete, Authoritative::Nothing);
        assert_eq!(registry.pending(), 0);

        registry.load(root(), vec![entity("1", "a.png")]);
        assert!(!registry.get(&FileId::from("1")).unwrap().is_starred);
    }

    #[test]
    fn rollback_after_reload_restores_deleted_snapshot() {
        let original = trashed("2");
        let mut registry = registry_with(vec![original.clone()]);
        let token = registry
            .apply_optimistic(&Mutation::Delete(FileId::from("2")))
            .unwrap();
        registry.load(root(), vec![original.clone()]);
        assert!(registry.get(&FileId::from("2")).is_none());

        assert_eq!(registry.rollback(token), Resolution::Applied);
        assert_eq!(registry.get(&FileId::from("2")), Some(&original));
    }

    #[test]
    fn loading_another_scope_drops_pending_changes() {
        let mut registry = registry_with(vec![entity("1", "a.png")]);
        let _token = registry
            .apply_optimistic(&Mutation::ToggleStar(FileId::from("1")))
            .unwrap();
        let newer = ScopeTag {
            folder: None,
            epoch: 2,
        };
        registry.load(newer, vec![entity("1", "a.png")]);
        assert_eq!(registry.pending(), 0);
        assert!(!registry.get(&FileId::from("1")).unwrap().is_starred);
    }
}
