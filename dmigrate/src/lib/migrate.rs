//! Application of a reconciled source tree to the destination.
//!
//! The walk is depth-first and sequential. In every folder, files are handled
//! before sub-folders. Files are moved when the account may do so, and copied
//! otherwise. Folders are never moved, they are created at the destination.

use std::fmt;

use futures::future::BoxFuture;

use crate::{
    drive::{id::Id, Drive},
    exec::{Executor, Outcome},
    tree::{MigrationState, NodeId, Tree},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateStats {
    pub folders_created: usize,
    pub files_moved: usize,
    pub files_copied: usize,
    /// Entries left alone because they were already at the destination
    pub already_present: usize,
    /// Multi-parent entries skipped, with everything below them
    pub excluded: usize,
}

impl MigrateStats {
    /// Number of mutating remote calls that were performed
    pub fn mutations(&self) -> usize {
        self.folders_created + self.files_moved + self.files_copied
    }
}

impl fmt::Display for MigrateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} folder(s) created, {} file(s) moved, {} file(s) copied, {} already present, {} excluded",
            self.folders_created,
            self.files_moved,
            self.files_copied,
            self.already_present,
            self.excluded
        )
    }
}

pub struct Migrator<'a, D> {
    drive: &'a D,
    exec: &'a Executor,
}

impl<'a, D> Migrator<'a, D>
where
    D: Drive,
{
    pub fn new(drive: &'a D, exec: &'a Executor) -> Self {
        Self { drive, exec }
    }

    /// Migrates every entry of `source` according to its reconciled state.
    /// Created folders are added to `dest` and linked from their source folder.
    pub async fn migrate(&self, source: &mut Tree, dest: &mut Tree) -> dmig::Result<MigrateStats> {
        let mut stats = MigrateStats::default();
        let root = source.root();
        if source.get(root).counterpart().node() != Some(dest.root()) {
            dmig::bug_bail!("source root is not linked to the destination root");
        }
        self.migrate_folder(source, dest, root, &mut stats).await?;
        Ok(stats)
    }

    fn migrate_folder<'s>(
        &'s self,
        source: &'s mut Tree,
        dest: &'s mut Tree,
        folder: NodeId,
        stats: &'s mut MigrateStats,
    ) -> BoxFuture<'s, dmig::Result<()>> {
        Box::pin(async move {
            let Some(dest_folder) = source.get(folder).counterpart().node() else {
                dmig::bug_bail!(
                    "{} has no counterpart at the destination",
                    source.display_path(folder)
                );
            };
            let dest_folder_id = dest.get(dest_folder).id().to_owned();
            let folder_id = source.get(folder).id().to_owned();

            let (files, folders): (Vec<NodeId>, Vec<NodeId>) = source
                .children(folder)
                .partition(|&child| source.get(child).is_file());

            for file in files {
                if self.is_excluded(source, file, stats) {
                    continue;
                }
                self.migrate_file(source, file, &folder_id, &dest_folder_id, stats)
                    .await?;
            }

            for sub in folders {
                if self.is_excluded(source, sub, stats) {
                    continue;
                }
                let entry = source.get(sub);
                match entry.state() {
                    MigrationState::FolderAlreadyCreated => {
                        log::debug!("{} already exists", source.display_path(sub));
                        stats.already_present += 1;
                    }
                    MigrationState::FolderNeedsCreation => {
                        let name = entry.name().to_string();
                        let what = format!("create folder {}", source.display_path(sub));
                        let created = self
                            .exec
                            .execute(&what, false, || {
                                self.drive.create_folder(&dest_folder_id, &name)
                            })
                            .await
                            .into_result(&what)?;
                        log::info!("created {} ({})", source.display_path(sub), created.id);
                        let node = dest.attach(dest_folder, created)?;
                        source.get_mut(sub).link(node)?;
                        stats.folders_created += 1;
                    }
                    state => dmig::bug_bail!(
                        "folder {} has unexpected state '{state}'",
                        source.display_path(sub)
                    ),
                }
                self.migrate_folder(&mut *source, &mut *dest, sub, &mut *stats)
                    .await?;
            }

            Ok(())
        })
    }

    async fn migrate_file(
        &self,
        source: &Tree,
        file: NodeId,
        folder_id: &Id,
        dest_folder_id: &Id,
        stats: &mut MigrateStats,
    ) -> dmig::Result<()> {
        let entry = source.get(file);
        let path = source.display_path(file);
        match entry.state() {
            MigrationState::FileAlreadyMigrated => {
                log::debug!("{path} already migrated");
                stats.already_present += 1;
                return Ok(());
            }
            MigrationState::FileNeedsMigration => (),
            state => dmig::bug_bail!("file {path} has unexpected state '{state}'"),
        }

        let id = entry.id();
        let what = format!("move {path}");
        let moved = self
            .exec
            .execute(&what, true, || {
                self.drive.move_file(id, dest_folder_id, folder_id)
            })
            .await;
        match moved {
            Outcome::Performed(()) => {
                log::info!("moved {path}");
                stats.files_moved += 1;
            }
            Outcome::Denied(err) => {
                log::info!("can't move {path} ({err}), copying it");
                let what = format!("copy {path}");
                let copy = self
                    .exec
                    .execute(&what, false, || {
                        self.drive.copy_file(id, dest_folder_id, entry.name())
                    })
                    .await
                    .into_result(&what)?;
                log::info!("copied {path} ({})", copy.id);
                stats.files_copied += 1;
            }
            failed @ Outcome::Failed(..) => return failed.into_result(&what),
        }
        Ok(())
    }

    fn is_excluded(&self, source: &Tree, node: NodeId, stats: &mut MigrateStats) -> bool {
        let entry = source.get(node);
        if entry.is_multi_parent() {
            log::warn!(
                "excluding {} '{}' from the migration: it has {} parents",
                entry.kind(),
                source.display_path(node),
                entry.parents().len()
            );
            stats.excluded += 1;
            true
        } else {
            false
        }
    }
}
