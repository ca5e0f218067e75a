//! Assignment of a migration state to every source entry.
//!
//! Reconciliation compares the source tree with the destination tree as they
//! currently are, without calling the remote API and without touching the
//! destination tree. Entries are matched structurally: same name, same kind and
//! same mime type. Contents are not compared.

use std::fmt;

use crate::tree::{MigrationState, NodeId, Tree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub files_to_migrate: usize,
    pub files_migrated: usize,
    pub folders_to_create: usize,
    pub folders_created: usize,
}

impl ReconcileStats {
    fn count(&mut self, state: MigrationState) {
        match state {
            MigrationState::FileNeedsMigration => self.files_to_migrate += 1,
            MigrationState::FileAlreadyMigrated => self.files_migrated += 1,
            MigrationState::FolderNeedsCreation => self.folders_to_create += 1,
            MigrationState::FolderAlreadyCreated => self.folders_created += 1,
            MigrationState::Unevaluated => (),
        }
    }

    fn uncount(&mut self, state: MigrationState) {
        let count = match state {
            MigrationState::FileNeedsMigration => &mut self.files_to_migrate,
            MigrationState::FileAlreadyMigrated => &mut self.files_migrated,
            MigrationState::FolderNeedsCreation => &mut self.folders_to_create,
            MigrationState::FolderAlreadyCreated => &mut self.folders_created,
            MigrationState::Unevaluated => return,
        };
        *count = count.saturating_sub(1);
    }

    /// Removes multi-parent entries of `source`, and everything below them, from
    /// the counts. Returns the number of entries removed.
    pub fn leave_out_multi_parent(&mut self, source: &Tree) -> usize {
        let mut removed = 0;
        let mut folders = vec![source.root()];
        let mut left_out = Vec::new();
        while let Some(folder) = folders.pop() {
            for child in source.children(folder) {
                if source.get(child).is_multi_parent() {
                    left_out.push(child);
                } else {
                    folders.push(child);
                }
            }
        }
        while let Some(node) = left_out.pop() {
            self.uncount(source.get(node).state());
            removed += 1;
            left_out.extend(source.children(node));
        }
        removed
    }

    /// Whether nothing is left to do
    pub fn is_complete(&self) -> bool {
        self.files_to_migrate == 0 && self.folders_to_create == 0
    }
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s) to migrate, {} already migrated, {} folder(s) to create, {} already created",
            self.files_to_migrate, self.files_migrated, self.folders_to_create, self.folders_created
        )
    }
}

/// Sets the migration state of every entry of `source` and links matched
/// entries to their counterpart in `dest`.
pub fn reconcile(source: &mut Tree, dest: &Tree) -> dmig::Result<ReconcileStats> {
    let mut stats = ReconcileStats::default();

    let root = source.root();
    source.get_mut(root).link(dest.root())?;

    let mut stack = vec![root];
    while let Some(folder) = stack.pop() {
        let dest_folder = source.get(folder).counterpart().node();
        match dest_folder {
            Some(dest_folder) => {
                reconcile_folder(source, folder, dest, dest_folder, &mut stats)?;
            }
            None => {
                log::trace!(
                    "{} has no counterpart, all its content needs migration",
                    source.display_path(folder)
                );
                mark_all_needed(source, folder, &mut stats)?;
            }
        }

        let sub_folders: Vec<NodeId> = source
            .children(folder)
            .filter(|&c| source.get(c).is_folder())
            .collect();
        stack.extend(sub_folders.into_iter().rev());
    }

    if let Some((node, _)) = source
        .nodes()
        .find(|(node, e)| *node != root && e.state() == MigrationState::Unevaluated)
    {
        dmig::bug_bail!(
            "{} was not evaluated by reconciliation",
            source.display_path(node)
        );
    }

    Ok(stats)
}

fn mark_all_needed(
    source: &mut Tree,
    folder: NodeId,
    stats: &mut ReconcileStats,
) -> dmig::Result<()> {
    let children: Vec<NodeId> = source.children(folder).collect();
    for child in children {
        let entry = source.get_mut(child);
        let state = MigrationState::needs_work(entry.kind());
        entry.set_state(state)?;
        stats.count(state);
    }
    Ok(())
}

fn reconcile_folder(
    source: &mut Tree,
    folder: NodeId,
    dest: &Tree,
    dest_folder: NodeId,
    stats: &mut ReconcileStats,
) -> dmig::Result<()> {
    let groups: Vec<(String, Vec<NodeId>)> = source
        .get(folder)
        .children_by_name()
        .iter()
        .map(|(name, nodes)| (name.clone(), nodes.clone()))
        .collect();

    for (name, members) in groups {
        let mut candidates: Vec<NodeId> = dest.get(dest_folder).children_named(&name).to_vec();
        candidates.sort_by(|a, b| dest.get(*a).id().as_str().cmp(dest.get(*b).id().as_str()));

        for member in members {
            let entry = source.get(member);
            let pos = candidates.iter().position(|&c| {
                let cand = dest.get(c);
                cand.kind() == entry.kind() && cand.mime_type() == entry.mime_type()
            });

            let entry = source.get_mut(member);
            let state = match pos {
                Some(pos) => {
                    let matched = candidates.remove(pos);
                    entry.link(matched)?;
                    MigrationState::already_done(entry.kind())
                }
                None => MigrationState::needs_work(entry.kind()),
            };
            entry.set_state(state)?;
            stats.count(state);
        }
    }
    Ok(())
}
