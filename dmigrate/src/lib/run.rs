//! The migration as a sequence of phases.
//!
//! Source loading, multi-parent detection, destination loading, reconciliation
//! and migration run one after the other. Each phase completes before the next
//! one starts.

use crate::{
    drive::{id::IdBuf, Drive},
    exec::Executor,
    load::{LoadStats, Loader, SeenIndex},
    migrate::{MigrateStats, Migrator},
    multi_parent,
    reconcile::{self, ReconcileStats},
    tree::Tree,
};

#[derive(Debug, Clone)]
pub struct Options {
    pub source: IdBuf,
    pub destination: IdBuf,
    /// Reconcile and report, without mutating anything
    pub dry_run: bool,
    /// Migrate despite multi-parent entries, leaving them out
    pub ignore_multi_parent: bool,
    /// Report multi-parent entries of the source and stop
    pub list_multi_parent: bool,
}

impl Options {
    pub fn new(source: IdBuf, destination: IdBuf) -> Self {
        Self {
            source,
            destination,
            dry_run: false,
            ignore_multi_parent: false,
            list_multi_parent: false,
        }
    }
}

/// What a run went through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub source: LoadStats,
    pub destination: Option<LoadStats>,
    /// Number of multi-parent entries found in the source
    pub multi_parent: usize,
    pub plan: Option<ReconcileStats>,
    pub migrated: Option<MigrateStats>,
}

pub async fn run<D: Drive>(
    drive: &D,
    config: &dmig::Config,
    opts: &Options,
) -> dmig::Result<Summary> {
    let exec = Executor::from_config(config);
    let mut summary = Summary::default();

    let mut source = load_root(drive, &exec, &opts.source, "source").await?;
    let mut seen = SeenIndex::default();
    summary.source = loader(drive, &exec, config)
        .load(&mut source, &mut seen)
        .await?;
    log::info!(
        "loaded {}: {} folder(s), {} file(s)",
        source.display_path(source.root()),
        summary.source.folders,
        summary.source.files
    );
    for (path, nodes) in seen.ambiguous_paths() {
        log::warn!(
            "{} entries share the path {}",
            nodes.len(),
            source.display_path(nodes[0])
        );
        log::trace!("ambiguous path key {path:?}");
    }

    let report = multi_parent::detect(&source, &seen);
    summary.multi_parent = report.len();
    if opts.list_multi_parent {
        log::info!("{} multi-parent entries found", report.len());
        return Ok(summary);
    }
    if report.found_any() {
        if opts.ignore_multi_parent {
            log::warn!(
                "{} multi-parent entries will be left out of the migration",
                report.len()
            );
        } else {
            dmig::policy_bail!(
                "{} entries have several parents. Give each a single parent, or run with --ignore-multi-parent to leave them out",
                report.len()
            );
        }
    }

    let mut dest = load_root(drive, &exec, &opts.destination, "destination").await?;
    let dest_stats = loader(drive, &exec, config)
        .load(&mut dest, &mut SeenIndex::default())
        .await?;
    summary.destination = Some(dest_stats);

    let mut plan = reconcile::reconcile(&mut source, &dest)?;
    if opts.ignore_multi_parent && report.found_any() {
        let left_out = plan.leave_out_multi_parent(&source);
        log::info!("{left_out} entries left out of the plan");
    }
    log::info!("{plan}");
    summary.plan = Some(plan);

    if opts.dry_run {
        log::info!("dry run, nothing was changed");
        return Ok(summary);
    }
    if plan.is_complete() && report.is_empty() {
        log::info!("destination is up to date");
    }

    let migrated = Migrator::new(drive, &exec)
        .migrate(&mut source, &mut dest)
        .await?;
    log::info!("{migrated}");
    summary.migrated = Some(migrated);

    Ok(summary)
}

fn loader<'a, D: Drive>(
    drive: &'a D,
    exec: &'a Executor,
    config: &'a dmig::Config,
) -> Loader<'a, D> {
    Loader::new(drive, exec, &config.sentinel_name).with_concurrency(config.list_concurrency)
}

async fn load_root<D: Drive>(
    drive: &D,
    exec: &Executor,
    id: &IdBuf,
    role: &str,
) -> dmig::Result<Tree> {
    let what = format!("get {role} root {id}");
    let root = exec
        .execute(&what, false, || drive.get_file(id))
        .await
        .into_result(&what)?;
    match root {
        Some(root) => {
            log::info!("{role} root: '{}' ({id})", root.name);
            Tree::new(root)
        }
        None => Err(dmig::Error::NotFound(format!("{role} root {id}"))),
    }
}
