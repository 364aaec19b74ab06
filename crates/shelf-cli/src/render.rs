//! Plain-text rendering of listings and outcomes for the terminal.

use shelf_core::mutation::Outcome;
use shelf_core::navigation::Crumb;
use shelf_core::view::{Counts, View};
use shelf_platform::model::FileEntity;

pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let units = ["B", "KB", "MB", "GB"];
    let i = (bytes as f64).log(1024.0).floor() as usize;
    let i = i.min(units.len() - 1);
    let val = bytes as f64 / 1024f64.powi(i as i32);
    if i == 0 {
        format!("{} {}", bytes, units[i])
    } else {
        format!("{:.1} {}", val, units[i])
    }
}

/// `My Files / Photos / 2024`, with crumb indexes for `jump`
pub fn breadcrumbs(path: &[Crumb]) -> String {
    let mut line = String::from("[-1] My Files");
    for (i, crumb) in path.iter().enumerate() {
        line.push_str(&format!(" / [{}] {}", i, crumb.name));
    }
    line
}

pub fn view_tabs(active: View, counts: Counts) -> String {
    let tab = |view: View, count: usize| {
        if view == active {
            format!("*{} ({})*", view, count)
        } else {
            format!("{} ({})", view, count)
        }
    };
    format!(
        "{}  {}  {}",
        tab(View::All, counts.all),
        tab(View::Starred, counts.starred),
        tab(View::Trash, counts.trash)
    )
}

fn kind(entity: &FileEntity) -> &str {
    if entity.is_folder {
        "folder"
    } else {
        entity
            .content_type
            .split('/')
            .nth(1)
            .filter(|s| !s.is_empty())
            .unwrap_or(&entity.content_type)
    }
}

pub fn listing(entities: &[FileEntity]) -> String {
    if entities.is_empty() {
        return "  (empty)".to_string();
    }
    let width = entities.iter().map(|e| e.name.len()).max().unwrap_or(0).max(4);
    let mut out = String::new();
    for e in entities {
        let marker = if e.is_starred { '*' } else { ' ' };
        let size = if e.is_folder {
            "-".to_string()
        } else {
            format_size(e.size)
        };
        out.push_str(&format!(
            "{} {:<width$}  {:<8}  {:>9}  {}  {}\n",
            marker,
            e.name,
            kind(e),
            size,
            e.created_at.format("%Y-%m-%d %H:%M"),
            e.id,
            width = width
        ));
    }
    out.pop();
    out
}

pub fn outcome(outcome: &Outcome) -> String {
    if outcome.is_success() {
        format!("ok    {}", outcome)
    } else {
        format!("error {}", outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shelf_platform::model::FileId;

    #[test]
    fn sizes_use_one_decimal_above_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn breadcrumbs_number_each_level() {
        let path = vec![Crumb {
            id: FileId::from("f1"),
            name: "Photos".into(),
        }];
        assert_eq!(breadcrumbs(&path), "[-1] My Files / [0] Photos");
    }

    #[test]
    fn listing_marks_starred_and_folders() {
        let file = FileEntity {
            id: FileId::from("1"),
            name: "a.png".into(),
            content_type: "image/png".into(),
            size: 2048,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            is_folder: false,
            is_starred: true,
            is_trash: false,
            parent_id: None,
            path: None,
            file_url: None,
        };
        let out = listing(&[file]);
        assert!(out.starts_with("* a.png"));
        assert!(out.contains("png"));
        assert!(out.contains("2.0 KB"));
        assert!(out.contains("2024-05-01 10:00"));
        assert_eq!(listing(&[]), "  (empty)");
    }

    #[test]
    fn active_tab_is_highlighted() {
        let counts = Counts {
            all: 3,
            starred: 1,
            trash: 0,
        };
        assert_eq!(view_tabs(View::Starred, counts), "all (3)  *starred (1)*  trash (0)");
    }
}
