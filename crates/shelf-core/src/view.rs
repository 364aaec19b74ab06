//! View projections (`all` / `starred` / `trash`) over the registry.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use shelf_platform::model::FileEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    All,
    Starred,
    Trash,
}

impl View {
    pub fn includes(self, entity: &FileEntity) -> bool {
        match self {
            Self::All => !entity.is_trash,
            Self::Starred => entity.is_starred && !entity.is_trash,
            Self::Trash => entity.is_trash,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Starred => "starred",
            Self::Trash => "trash",
        })
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "starred" | "star" => Ok(Self::Starred),
            "trash" => Ok(Self::Trash),
            other => Err(format!("unknown view {:?} (expected all, starred or trash)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub all: usize,
    pub starred: usize,
    pub trash: usize,
}

/// Display order: folders first, then case-insensitive name, ties broken by id
pub fn display_order(a: &FileEntity, b: &FileEntity) -> Ordering {
    b.is_folder
        .cmp(&a.is_folder)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn filter<'a, I>(entities: I, view: View) -> Vec<FileEntity>
where
    I: IntoIterator<Item = &'a FileEntity>,
{
    let mut visible: Vec<FileEntity> = entities
        .into_iter()
        .filter(|e| view.includes(e))
        .cloned()
        .collect();
    visible.sort_by(display_order);
    visible
}

pub fn counts<'a, I>(entities: I) -> Counts
where
    I: IntoIterator<Item = &'a FileEntity>,
{
    entities.into_iter().fold(Counts::default(), |mut c, e| {
        if View::All.includes(e) {
            c.all += 1;
        }
        if View::Starred.includes(e) {
            c.starred += 1;
        }
        if View::Trash.includes(e) {
            c.trash += 1;
        }
        c
    })
}

/// Active view plus counts derived from the last registry change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewState {
    pub active: View,
    pub counts: Counts,
}

impl ViewState {
    pub fn recompute<'a, I>(&mut self, entities: I)
    where
        I: IntoIterator<Item = &'a FileEntity>,
    {
        self.counts = counts(entities);
    }
}

/// Actions the presentation layer may offer for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actions {
    pub download: bool,
    pub star: bool,
    pub trash: bool,
    pub restore: bool,
    pub delete_permanent: bool,
}

impl Actions {
    pub fn for_entity(entity: &FileEntity) -> Self {
        Self {
            download: !entity.is_trash && !entity.is_folder,
            star: !entity.is_trash,
            trash: !entity.is_trash,
            restore: entity.is_trash,
            delete_permanent: entity.is_trash,
        }
    }
}
