//! Breadcrumb navigation over the folder hierarchy.

use serde::Serialize;

use shelf_platform::model::FileId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub id: FileId,
    pub name: String,
}

/// Folder scope plus the navigation epoch it was reached at.
///
/// Two tags are equal only if they were produced by the same navigation
/// step, so a result tagged before a later `enter`/`up`/`jump_to` never
/// matches again, even if the user came back to the same folder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeTag {
    pub folder: Option<FileId>,
    pub epoch: u64,
}

#[derive(Debug, Clone, Default)]
pub struct NavigationStack {
    path: Vec<Crumb>,
    epoch: u64,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_folder(&self) -> Option<&FileId> {
        self.path.last().map(|c| &c.id)
    }

    pub fn path(&self) -> &[Crumb] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn target(&self) -> ScopeTag {
        ScopeTag {
            folder: self.current_folder().cloned(),
            epoch: self.epoch,
        }
    }

    pub fn enter(&mut self, id: FileId, name: impl Into<String>) -> ScopeTag {
        self.path.push(Crumb {
            id,
            name: name.into(),
        });
        self.bump()
    }

    /// Pop one level. Returns `None` (and keeps the epoch) when already at root.
    pub fn up(&mut self) -> Option<ScopeTag> {
        self.path.pop()?;
        Some(self.bump())
    }

    /// Truncate the path to `index + 1` crumbs; a negative index goes to root.
    pub fn jump_to(&mut self, index: isize) -> ScopeTag {
        let keep = if index < 0 {
            0
        } else {
            (index as usize).saturating_add(1)
        };
        self.path.truncate(keep);
        self.bump()
    }

    fn bump(&mut self) -> ScopeTag {
        self.epoch += 1;
        self.target()
    }
}
