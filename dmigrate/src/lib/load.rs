//! Discovery of a remote folder hierarchy.
//!
//! Folders are listed level by level. Listings of one level may run concurrently,
//! but their results are applied to the [`Tree`] and to the [`SeenIndex`] one at a
//! time, in a deterministic order, so that a folder reachable through several
//! parents is expanded exactly once.

use std::collections::{hash_map, HashMap};

use async_stream::try_stream;
use futures::{stream, Stream, StreamExt, TryStreamExt};

use crate::{
    drive::{
        id::{Id, IdBuf},
        ListChildren, RemoteFile,
    },
    exec::Executor,
    tree::{NodeId, Tree},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub folders: usize,
    pub files: usize,
}

/// Entries seen while loading a tree, across all folders
#[derive(Debug, Default)]
pub struct SeenIndex {
    by_id: HashMap<IdBuf, NodeId>,
    by_path: HashMap<String, Vec<NodeId>>,
}

impl SeenIndex {
    /// First node loaded for `id`
    pub fn by_id(&self, id: &Id) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    /// Nodes loaded at the given path key (see [`Tree::path_key`])
    #[cfg(test)]
    fn by_path(&self, path_key: &str) -> &[NodeId] {
        self.by_path
            .get(path_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Paths that more than one entry resolves to, sorted
    pub fn ambiguous_paths(&self) -> Vec<(&str, &[NodeId])> {
        let mut paths: Vec<_> = self
            .by_path
            .iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .map(|(path, nodes)| (path.as_str(), nodes.as_slice()))
            .collect();
        paths.sort_unstable_by_key(|(path, _)| *path);
        paths
    }

    /// Records `node` as seen.
    /// Returns whether this is the first node seen with this identifier.
    pub(crate) fn insert(&mut self, tree: &Tree, node: NodeId) -> bool {
        self.by_path.entry(tree.path_key(node)).or_default().push(node);
        match self.by_id.entry(tree.get(node).id().to_owned()) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(node);
                true
            }
            hash_map::Entry::Occupied(_) => false,
        }
    }
}

pub struct Loader<'a, D> {
    drive: &'a D,
    exec: &'a Executor,
    sentinel_name: &'a str,
    concurrency: usize,
}

impl<'a, D> Loader<'a, D>
where
    D: ListChildren + Sync,
{
    pub fn new(drive: &'a D, exec: &'a Executor, sentinel_name: &'a str) -> Self {
        Self {
            drive,
            exec,
            sentinel_name,
            concurrency: 1,
        }
    }

    /// Number of folder listings allowed in flight
    pub fn with_concurrency(self, concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..self
        }
    }

    /// Loads every descendant of the tree root.
    /// Any listing that can't be performed aborts the whole load.
    pub async fn load(&self, tree: &mut Tree, seen: &mut SeenIndex) -> dmig::Result<LoadStats> {
        let mut stats = LoadStats::default();
        seen.insert(tree, tree.root());

        let mut pending = vec![tree.root()];
        while !pending.is_empty() {
            let listings: Vec<(NodeId, dmig::Result<Vec<RemoteFile>>)> = {
                let tree = &*tree;
                stream::iter(pending.iter().copied())
                    .map(|folder| {
                        let id = tree.get(folder).id().to_owned();
                        let path = tree.display_path(folder);
                        async move { (folder, self.list_all(id, path).try_collect().await) }
                    })
                    .buffered(self.concurrency)
                    .collect()
                    .await
            };

            let mut next = Vec::new();
            for (folder, files) in listings {
                for file in files? {
                    let is_folder = file.is_folder();
                    let node = tree.attach(folder, file)?;
                    if seen.insert(tree, node) {
                        if is_folder {
                            tree.get_mut(node).set_traverse(true);
                            next.push(node);
                        }
                    } else {
                        log::debug!(
                            "{} already loaded through another folder",
                            tree.display_path(node)
                        );
                    }
                    if is_folder {
                        stats.folders += 1;
                    } else {
                        stats.files += 1;
                    }
                }
            }
            pending = next;
        }

        Ok(stats)
    }

    /// All children of a folder, following page tokens, without the sentinel folder
    fn list_all(
        &self,
        folder_id: IdBuf,
        path: String,
    ) -> impl Stream<Item = dmig::Result<RemoteFile>> + Send + '_ {
        log::info!("listing {path}");
        try_stream! {
            let mut page_token: Option<String> = None;
            loop {
                let what = format!("list {path} ({folder_id})");
                let page = self
                    .exec
                    .execute(&what, false, || {
                        self.drive.list_children(&folder_id, page_token.as_deref())
                    })
                    .await
                    .into_result(&what)?;
                for file in page.files {
                    if file.is_folder() && file.name == self.sentinel_name {
                        log::info!("skipping {path}/{}", file.name);
                        continue;
                    }
                    yield file;
                }
                page_token = page.next_page_token;
                if page_token.is_none() {
                    break;
                }
            }
        }
    }
}
