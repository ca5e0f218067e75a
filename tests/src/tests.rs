use std::time::Duration;

use dmigrate::{
    drive::{id::IdBuf, ApiError, FOLDER_MIMETYPE},
    load::{LoadStats, Loader, SeenIndex},
    migrate::{MigrateStats, Migrator},
    reconcile::{reconcile, ReconcileStats},
    tree::{Counterpart, MigrationState, NodeId, Tree},
};

use crate::{
    dataset::{build, Dataset},
    exec, init_log, load, options, run,
    stubs::drive::{Call, Op, TEXT},
};

/// First node found at `path` below the root
fn node(tree: &Tree, path: &[&str]) -> NodeId {
    let mut cur = tree.root();
    for name in path {
        cur = *tree
            .get(cur)
            .children_named(name)
            .first()
            .unwrap_or_else(|| panic!("no {name} in {}", tree.display_path(cur)));
    }
    cur
}

fn unavailable() -> ApiError {
    ApiError::status(503, Some("backendError"), "Backend Error")
}

#[tokio::test]
async fn already_migrated_folder_and_file() {
    let ds = Dataset::already_migrated();
    let mut source = load(&ds.drive, &ds.source).await.unwrap();
    let mut dest = load(&ds.drive, &ds.dest).await.unwrap();

    reconcile(&mut source, &dest).unwrap();

    let a = node(&source, &["A"]);
    let f1 = node(&source, &["A", "f1"]);
    assert_eq!(source.get(a).state(), MigrationState::FolderAlreadyCreated);
    assert_eq!(source.get(f1).state(), MigrationState::FileAlreadyMigrated);
    assert_eq!(
        source.get(a).counterpart(),
        Counterpart::LinkedTo(node(&dest, &["A"]))
    );
    assert_eq!(
        source.get(f1).counterpart(),
        Counterpart::LinkedTo(node(&dest, &["A", "f1"]))
    );

    ds.drive.clear_calls();
    let stats = Migrator::new(&ds.drive, &exec())
        .migrate(&mut source, &mut dest)
        .await
        .unwrap();
    assert_eq!(ds.drive.mutations(), 0);
    assert!(ds.drive.calls().iter().all(|c| !c.is_mutation()));
    assert_eq!(stats.already_present, 2);
}

#[tokio::test]
async fn missing_folder_is_created_and_file_moved_into_it() {
    let ds = Dataset::needs_creation();
    let mut source = load(&ds.drive, &ds.source).await.unwrap();
    let mut dest = load(&ds.drive, &ds.dest).await.unwrap();

    reconcile(&mut source, &dest).unwrap();

    let b = node(&source, &["B"]);
    let f2 = node(&source, &["B", "f2"]);
    assert_eq!(source.get(b).state(), MigrationState::FolderNeedsCreation);
    assert_eq!(source.get(f2).state(), MigrationState::FileNeedsMigration);

    ds.drive.clear_calls();
    Migrator::new(&ds.drive, &exec())
        .migrate(&mut source, &mut dest)
        .await
        .unwrap();

    let new_b = ds.dest_path(&["B"]).unwrap();
    let b_id = source.get(b).id().to_id_buf();
    let f2_id = source.get(f2).id().to_id_buf();
    assert_eq!(
        ds.drive.calls(),
        vec![
            Call::Create {
                parent: ds.dest.clone(),
                name: "B".into()
            },
            Call::Move {
                id: f2_id.clone(),
                new_parent: new_b.clone(),
                old_parent: b_id,
            },
        ]
    );
    assert_eq!(ds.dest_path(&["B", "f2"]), Some(f2_id));

    // the created folder is part of the destination tree
    let linked = source.get(b).counterpart().node().unwrap();
    assert_eq!(dest.get(linked).id(), new_b.as_id());
    assert_eq!(dest.get(linked).owner(), Some(dest.root()));
}

#[tokio::test]
async fn denied_move_falls_back_to_one_copy() {
    let ds = Dataset::needs_creation();
    ds.drive.deny_all_moves();
    let f2 = ds.source_path(&["B", "f2"]).unwrap();

    let summary = run(&ds, &options(&ds)).await.unwrap();

    let new_b = ds.dest_path(&["B"]).unwrap();
    assert_eq!(ds.drive.calls_of(Op::Move).len(), 1);
    assert_eq!(
        ds.drive.calls_of(Op::Copy),
        vec![Call::Copy {
            id: f2.clone(),
            dest_parent: new_b.clone(),
            name: "f2".into()
        }]
    );
    // the original stays where it was
    assert_eq!(ds.source_path(&["B", "f2"]), Some(f2));
    assert_eq!(ds.drive.child_names(&new_b), vec!["f2"]);

    let migrated = summary.migrated.unwrap();
    assert_eq!(migrated.files_copied, 1);
    assert_eq!(migrated.files_moved, 0);
}

#[tokio::test]
async fn full_migration() {
    let ds = Dataset::new(build::SOURCE, build::DEST);

    let summary = run(&ds, &options(&ds)).await.unwrap();

    assert_eq!(summary.source.files, 8);
    assert_eq!(summary.source.folders, 4);
    assert_eq!(
        summary.plan,
        Some(ReconcileStats {
            files_to_migrate: 6,
            files_migrated: 2,
            folders_to_create: 2,
            folders_created: 2,
        })
    );
    assert_eq!(
        summary.migrated,
        Some(MigrateStats {
            folders_created: 2,
            files_moved: 6,
            files_copied: 0,
            already_present: 4,
            excluded: 0,
        })
    );

    assert_eq!(
        ds.drive.child_names(&ds.dest),
        vec!["both", "only-dest.txt", "only-source", "top.txt"]
    );
    assert_eq!(
        ds.drive.child_names(&ds.dest_path(&["both"]).unwrap()),
        vec!["both.txt", "deep", "only-source.txt", "report", "report"]
    );
    assert_eq!(
        ds.drive
            .child_names(&ds.dest_path(&["both", "deep"]).unwrap()),
        vec!["file1.txt", "file2.txt"]
    );
    assert!(ds
        .dest_path(&["only-source", "deep", "file1.txt"])
        .is_some());

    // matched files stay in the source, folders are never moved
    assert_eq!(
        ds.drive.child_names(&ds.source),
        vec!["both", "only-source"]
    );
    assert_eq!(
        ds.drive.child_names(&ds.source_path(&["both"]).unwrap()),
        vec!["both.txt", "deep"]
    );
}

#[tokio::test]
async fn created_folders_nest_under_created_parents() {
    let ds = Dataset::new(build::SOURCE, &[]);

    run(&ds, &options(&ds)).await.unwrap();

    let only = ds.dest_path(&["only-source"]).unwrap();
    let deep = ds.dest_path(&["only-source", "deep"]).unwrap();
    assert_eq!(ds.drive.get(&deep).unwrap().parents, vec![only.clone()]);
    assert!(ds
        .drive
        .calls_of(Op::Create)
        .contains(&Call::Create {
            parent: only,
            name: "deep".into()
        }));
}

#[tokio::test]
async fn second_run_mutates_nothing() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    // one file gets copied, the others moved
    ds.drive
        .deny_move(&ds.source_path(&["top.txt"]).unwrap());

    let first = run(&ds, &options(&ds)).await.unwrap();
    assert_eq!(first.migrated.unwrap().files_copied, 1);

    ds.drive.clear_calls();
    let second = run(&ds, &options(&ds)).await.unwrap();

    let plan = second.plan.unwrap();
    assert!(plan.is_complete());
    assert_eq!(plan.folders_created, 4);
    assert_eq!(second.migrated.unwrap().mutations(), 0);
    assert_eq!(ds.drive.mutations(), 0);
    assert!(ds.drive.calls().iter().all(|c| !c.is_mutation()));
}

#[tokio::test]
async fn dry_run_mutates_nothing() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    let opts = dmigrate::Options {
        dry_run: true,
        ..options(&ds)
    };

    let summary = run(&ds, &opts).await.unwrap();

    assert_eq!(summary.plan.unwrap().files_to_migrate, 6);
    assert!(summary.migrated.is_none());
    assert_eq!(ds.drive.mutations(), 0);
    assert!(ds.drive.calls().iter().all(|c| !c.is_mutation()));
}

#[tokio::test]
async fn destination_entries_match_at_most_once() {
    let ds = Dataset::empty();
    ds.drive.add_file(&ds.source, "dup");
    ds.drive.add_file(&ds.source, "dup");
    ds.drive.add_file(&ds.dest, "dup");

    let summary = run(&ds, &options(&ds)).await.unwrap();

    let migrated = summary.migrated.unwrap();
    assert_eq!(migrated.already_present, 1);
    assert_eq!(migrated.files_moved, 1);
    assert_eq!(ds.drive.child_names(&ds.dest), vec!["dup", "dup"]);
}

#[tokio::test]
async fn content_type_mismatch_is_migrated() {
    let ds = Dataset::empty();
    ds.drive.add_entry(&[&ds.source], "report", build::PDF);
    ds.drive.add_entry(&[&ds.dest], "report", build::DOC);
    // a file named like a folder is not that folder
    let photos = ds.drive.add_folder(&ds.source, "Photos");
    ds.drive.add_file(&photos, "cat.jpg");
    ds.drive.add_file(&ds.dest, "Photos");

    let summary = run(&ds, &options(&ds)).await.unwrap();

    let plan = summary.plan.unwrap();
    assert_eq!(plan.files_to_migrate, 2);
    assert_eq!(plan.folders_to_create, 1);
    assert_eq!(ds.drive.calls_of(Op::Create).len(), 1);
}

#[tokio::test]
async fn lookalikes_outside_the_destination_folder_are_ignored() {
    let ds = Dataset::empty();
    let b = ds.drive.add_folder(&ds.source, "B");
    ds.drive.add_file(&b, "f");
    ds.drive.add_file(&ds.dest, "f");
    let c = ds.drive.add_folder(&ds.dest, "C");
    ds.drive.add_file(&c, "f");

    let summary = run(&ds, &options(&ds)).await.unwrap();

    assert_eq!(summary.plan.unwrap().files_to_migrate, 1);
    assert!(ds.dest_path(&["B", "f"]).is_some());
}

#[tokio::test]
async fn unreconciled_entries_are_fatal() {
    let ds = Dataset::needs_creation();
    ds.drive.add_file(&ds.source, "loose.txt");
    let mut source = load(&ds.drive, &ds.source).await.unwrap();
    let mut dest = load(&ds.drive, &ds.dest).await.unwrap();
    let root = source.root();
    source.get_mut(root).link(dest.root()).unwrap();

    ds.drive.clear_calls();
    let err = Migrator::new(&ds.drive, &exec())
        .migrate(&mut source, &mut dest)
        .await
        .unwrap_err();

    match err {
        dmig::Error::Bug(msg) => assert!(msg.contains("unevaluated"), "{msg}"),
        err => panic!("unexpected error: {err:?}"),
    }
    assert_eq!(ds.drive.mutations(), 0);
    assert!(ds.drive.calls().is_empty());
}

#[tokio::test]
async fn unreconciled_folder_is_fatal() {
    let ds = Dataset::needs_creation();
    let mut source = load(&ds.drive, &ds.source).await.unwrap();
    let mut dest = load(&ds.drive, &ds.dest).await.unwrap();
    let root = source.root();
    source.get_mut(root).link(dest.root()).unwrap();

    ds.drive.clear_calls();
    let err = Migrator::new(&ds.drive, &exec())
        .migrate(&mut source, &mut dest)
        .await
        .unwrap_err();

    match err {
        dmig::Error::Bug(msg) => assert!(msg.contains("folder"), "{msg}"),
        err => panic!("unexpected error: {err:?}"),
    }
    assert_eq!(ds.drive.mutations(), 0);
    assert!(ds.drive.calls_of(Op::Create).is_empty());
}

#[tokio::test]
async fn shared_folder_is_listed_once() {
    init_log();
    let ds = Dataset::empty();
    let a = ds.drive.add_folder(&ds.source, "A");
    let b = ds.drive.add_folder(&ds.source, "B");
    let tangled = ds.drive.add_folder(&a, "tangled");
    ds.drive.add_parent(&tangled, &b);
    ds.drive.add_file(&tangled, "inner.txt");
    // A is also filed inside the folder it contains
    ds.drive.add_parent(&a, &tangled);

    let mut tree = Tree::new(ds.drive.get(&ds.source).unwrap()).unwrap();
    let exec = exec();
    let loader = Loader::new(&ds.drive, &exec, dmig::config::DEFAULT_SENTINEL_NAME);
    let stats = tokio::time::timeout(
        Duration::from_secs(10),
        loader.load(&mut tree, &mut SeenIndex::default()),
    )
    .await
    .expect("load does not terminate")
    .unwrap();

    assert_eq!(stats, LoadStats { folders: 5, files: 1 });
    let listed = |id: &IdBuf| {
        ds.drive
            .calls_of(Op::List)
            .into_iter()
            .filter(|c| *c == Call::List(id.clone()))
            .count()
    };
    assert_eq!(listed(&tangled), 1);
    assert_eq!(listed(&a), 1);
    assert_eq!(listed(&b), 1);
    assert_eq!(ds.drive.calls_of(Op::List).len(), 4);
}

#[tokio::test]
async fn left_out_entries_are_not_planned() {
    let ds = Dataset::empty();
    let a = ds.drive.add_folder(&ds.source, "A");
    let b = ds.drive.add_folder(&ds.source, "B");
    ds.drive.add_entry(&[&a, &b], "shared.txt", TEXT);
    ds.drive.add_file(&a, "a.txt");
    let tangled = ds.drive.add_folder(&a, "tangled");
    ds.drive.add_parent(&tangled, &b);
    ds.drive.add_file(&tangled, "inner.txt");

    let opts = dmigrate::Options {
        ignore_multi_parent: true,
        dry_run: true,
        ..options(&ds)
    };
    let summary = run(&ds, &opts).await.unwrap();

    assert_eq!(
        summary.plan,
        Some(ReconcileStats {
            files_to_migrate: 1,
            files_migrated: 0,
            folders_to_create: 2,
            folders_created: 0,
        })
    );
    assert_eq!(ds.drive.mutations(), 0);
}

#[tokio::test]
async fn multi_parent_blocks_migration() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    let file = ds.source_path(&["both", "both.txt"]).unwrap();
    let other = ds.source_path(&["only-source"]).unwrap();
    ds.drive.add_parent(&file, &other);

    let err = run(&ds, &options(&ds)).await.unwrap_err();

    assert!(matches!(err, dmig::Error::Policy(..)), "{err:?}");
    assert_eq!(ds.drive.mutations(), 0);
    // the destination is not even looked at
    assert!(!ds.drive.calls().contains(&Call::Get(ds.dest.clone())));
}

#[tokio::test]
async fn multi_parent_listing_reports_once() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    let file = ds.source_path(&["both", "both.txt"]).unwrap();
    let other = ds.source_path(&["only-source"]).unwrap();
    ds.drive.add_parent(&file, &other);
    // a folder also filed outside the source
    let elsewhere = ds.drive.add_root("Elsewhere");
    let deep = ds.source_path(&["both", "deep"]).unwrap();
    ds.drive.add_parent(&deep, &elsewhere);

    let opts = dmigrate::Options {
        list_multi_parent: true,
        ..options(&ds)
    };
    let summary = run(&ds, &opts).await.unwrap();

    assert_eq!(summary.multi_parent, 2);
    assert!(summary.destination.is_none());
    assert!(summary.plan.is_none());
    assert_eq!(ds.drive.mutations(), 0);
}

#[tokio::test]
async fn multi_parent_entries_are_left_out_on_request() {
    let ds = Dataset::empty();
    let a = ds.drive.add_folder(&ds.source, "A");
    let b = ds.drive.add_folder(&ds.source, "B");
    let shared = ds.drive.add_entry(&[&a, &b], "shared.txt", TEXT);
    ds.drive.add_file(&a, "a.txt");
    let tangled = ds.drive.add_folder(&b, "tangled");
    ds.drive.add_parent(&tangled, &a);
    let inner = ds.drive.add_file(&tangled, "inner.txt");

    let opts = dmigrate::Options {
        ignore_multi_parent: true,
        ..options(&ds)
    };
    let summary = run(&ds, &opts).await.unwrap();

    assert_eq!(summary.multi_parent, 2);
    let migrated = summary.migrated.unwrap();
    // each entry is left out wherever it was listed
    assert_eq!(migrated.excluded, 4);
    assert_eq!(migrated.files_moved, 1);

    let moved: Vec<IdBuf> = ds
        .drive
        .calls_of(Op::Move)
        .into_iter()
        .map(|c| match c {
            Call::Move { id, .. } => id,
            _ => unreachable!(),
        })
        .collect();
    assert!(!moved.contains(&shared));
    assert!(!moved.contains(&inner));
    assert!(ds.dest_path(&["A", "tangled"]).is_none());
    assert!(ds.dest_path(&["A", "a.txt"]).is_some());
}

#[tokio::test]
async fn duplicate_identifier_in_listing_is_fatal() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    ds.drive
        .list_twice(&ds.source_path(&["both", "deep"]).unwrap());

    let err = run(&ds, &options(&ds)).await.unwrap_err();

    assert!(matches!(err, dmig::Error::Structure(..)), "{err:?}");
    assert_eq!(ds.drive.mutations(), 0);
    assert!(!ds.drive.calls().contains(&Call::Get(ds.dest.clone())));
}

#[tokio::test]
async fn missing_root_is_fatal() {
    let ds = Dataset::needs_creation();
    let opts = dmigrate::Options::new(IdBuf::from("no-such-folder"), ds.dest.clone());

    let err = run(&ds, &opts).await.unwrap_err();
    assert!(matches!(err, dmig::Error::NotFound(..)), "{err:?}");

    let opts = dmigrate::Options::new(ds.source.clone(), IdBuf::from("no-such-drive"));
    let err = run(&ds, &opts).await.unwrap_err();
    assert!(matches!(err, dmig::Error::NotFound(..)), "{err:?}");
    assert_eq!(ds.drive.mutations(), 0);
}

#[tokio::test]
async fn root_must_be_a_folder() {
    let ds = Dataset::needs_creation();
    let file = ds.source_path(&["B", "f2"]).unwrap();
    let opts = dmigrate::Options::new(file, ds.dest.clone());

    let err = run(&ds, &opts).await.unwrap_err();
    assert!(matches!(err, dmig::Error::Structure(..)), "{err:?}");
}

#[tokio::test]
async fn transient_listing_errors_are_retried() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    ds.drive.fail_next(Op::List, unavailable(), 2);

    let summary = run(&ds, &options(&ds)).await.unwrap();
    assert_eq!(summary.migrated.unwrap().files_moved, 6);
}

#[tokio::test]
async fn exhausted_retries_abort_the_run() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    ds.drive.fail_next(Op::List, unavailable(), 3);

    let err = run(&ds, &options(&ds)).await.unwrap_err();

    assert!(matches!(err, dmig::Error::Api(..)), "{err:?}");
    assert!(err.is_remote());
    assert_eq!(ds.drive.calls_of(Op::List).len(), 3);
    assert_eq!(ds.drive.mutations(), 0);
}

#[tokio::test]
async fn rate_limited_move_is_retried() {
    let ds = Dataset::needs_creation();
    ds.drive.fail_next(
        Op::Move,
        ApiError::status(403, Some("userRateLimitExceeded"), "User Rate Limit Exceeded"),
        1,
    );

    let summary = run(&ds, &options(&ds)).await.unwrap();

    assert_eq!(ds.drive.calls_of(Op::Move).len(), 2);
    assert!(ds.drive.calls_of(Op::Copy).is_empty());
    assert_eq!(summary.migrated.unwrap().files_moved, 1);
}

#[tokio::test]
async fn failed_copy_aborts_the_run() {
    let ds = Dataset::needs_creation();
    ds.drive.deny_all_moves();
    ds.drive.fail_next(
        Op::Copy,
        ApiError::status(400, Some("invalid"), "Invalid Value"),
        1,
    );

    let err = run(&ds, &options(&ds)).await.unwrap_err();

    assert!(matches!(err, dmig::Error::Api(..)), "{err:?}");
    assert_eq!(ds.drive.calls_of(Op::Copy).len(), 1);
}

#[tokio::test]
async fn denied_folder_creation_aborts_the_run() {
    let ds = Dataset::needs_creation();
    ds.drive.fail_next(
        Op::Create,
        ApiError::status(403, Some("insufficientFilePermissions"), "Forbidden"),
        1,
    );

    let err = run(&ds, &options(&ds)).await.unwrap_err();

    assert!(matches!(err, dmig::Error::Api(..)), "{err:?}");
    assert_eq!(ds.drive.calls_of(Op::Create).len(), 1);
    assert!(ds.drive.calls_of(Op::Move).is_empty());
}

#[tokio::test]
async fn sentinel_folder_is_not_migrated() {
    let ds = Dataset::needs_creation();
    let keep = ds.drive.add_folder(&ds.source, "Do Not Migrate");
    ds.drive.add_file(&keep, "private.txt");
    // only folders are sentinels
    ds.drive.add_file(&ds.source, "Do Not Migrate");

    let summary = run(&ds, &options(&ds)).await.unwrap();

    assert!(!ds.drive.calls().contains(&Call::List(keep.clone())));
    assert_eq!(summary.source.folders, 1);
    assert_eq!(ds.drive.child_names(&ds.dest), vec!["B", "Do Not Migrate"]);
    let moved = ds.dest_path(&["Do Not Migrate"]).unwrap();
    assert_eq!(ds.drive.get(&moved).unwrap().mime_type, TEXT);
    assert_eq!(ds.drive.child_names(&keep), vec!["private.txt"]);
}

#[tokio::test]
async fn listings_follow_pages() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    ds.drive.set_page_size(2);

    let summary = run(&ds, &options(&ds)).await.unwrap();

    assert_eq!(summary.source.files, 8);
    assert_eq!(summary.destination.unwrap().files, 4);
    assert!(ds.dest_path(&["only-source", "deep", "file1.txt"]).is_some());
}

#[tokio::test]
async fn sequential_and_concurrent_listings_agree() {
    let ds = Dataset::new(build::SOURCE, build::DEST);
    let mut config = crate::config();
    config.list_concurrency = 1;
    let opts = dmigrate::Options {
        dry_run: true,
        ..options(&ds)
    };

    let sequential = dmigrate::run(&ds.drive, &config, &opts).await.unwrap();
    config.list_concurrency = 8;
    let concurrent = dmigrate::run(&ds.drive, &config, &opts).await.unwrap();

    assert_eq!(sequential, concurrent);
}

#[tokio::test]
async fn folder_mime_type_defines_folders() {
    let ds = Dataset::empty();
    let a = ds.drive.add_entry(&[&ds.source], "A", FOLDER_MIMETYPE);
    ds.drive.add_file(&a, "x");

    let tree = load(&ds.drive, &ds.source).await.unwrap();
    assert!(tree.get(node(&tree, &["A"])).is_folder());
    assert!(tree.get(node(&tree, &["A", "x"])).is_file());
}
