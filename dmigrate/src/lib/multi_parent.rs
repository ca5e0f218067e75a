//! Detection of entries with more than one parent folder.
//!
//! Shared drives give every entry a single parent, so an entry filed in several
//! folders of the source can't be migrated faithfully.

use std::collections::HashSet;
use std::fmt;

use crate::{
    drive::id::{Id, IdBuf},
    load::SeenIndex,
    tree::{NodeId, Tree},
};

/// A parent of a multi-parent entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// Parent loaded in the tree, with its display path
    Loaded { id: IdBuf, path: String },
    /// Parent outside the tree, with a best-guess link
    Outside { id: IdBuf, url: String },
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded { id, path } => write!(f, "{path} ({id})"),
            Self::Outside { id, url } => write!(f, "{url} ({id}, outside the tree)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub node: NodeId,
    pub parents: Vec<ParentRef>,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn found_any(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Whether `id` was reported
    pub fn contains(&self, tree: &Tree, id: &Id) -> bool {
        self.findings.iter().any(|f| tree.get(f.node).id() == id)
    }
}

fn folder_url(id: &Id) -> String {
    format!("https://drive.google.com/drive/folders/{id}")
}

/// Walks `tree` and reports every multi-parent entry once
pub fn detect(tree: &Tree, seen: &SeenIndex) -> Report {
    let mut report = Report::default();
    let mut reported = HashSet::new();
    let mut stack = vec![tree.root()];

    while let Some(folder) = stack.pop() {
        for child in tree.children(folder) {
            let entry = tree.get(child);
            if entry.is_multi_parent() && reported.insert(entry.id().to_owned()) {
                let parents: Vec<ParentRef> = entry
                    .parents()
                    .iter()
                    .map(|id| match seen.by_id(id) {
                        Some(node) => ParentRef::Loaded {
                            id: id.clone(),
                            path: tree.display_path(node),
                        },
                        None => ParentRef::Outside {
                            id: id.clone(),
                            url: folder_url(id),
                        },
                    })
                    .collect();

                log::warn!(
                    "{} '{}' ({}) has {} parents:",
                    entry.kind(),
                    tree.display_path(child),
                    entry.web_view_link().unwrap_or(entry.id().as_str()),
                    parents.len()
                );
                for parent in parents.iter() {
                    log::warn!("    {parent}");
                }
                report.findings.push(Finding {
                    node: child,
                    parents,
                });
            }
            if entry.is_folder() && entry.traverse() {
                stack.push(child);
            }
        }
    }

    report
}
