use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use proptest::prelude::*;
use tempfile::TempDir;

use sks::core::applier::Applier;
use sks::core::observer::{LinkState, observe};
use sks::core::planner::{PlanOptions, plan};
use sks::core::skill::SourceTree;
use sks::core::target::{SyncMode, Target};
use sks::storage::BackupManager;

const NAMES: [&str; 6] = ["alpha", "beta", "gamma", "delta", "eps", "zeta"];

/// What sits at `<target>/<name>` before reconciliation.
#[derive(Debug, Clone, Copy)]
enum Seed {
    Absent,
    CorrectLink,
    ForeignLink,
    IntoSourceLink,
    LocalDir,
}

fn arb_seed() -> impl Strategy<Value = Seed> {
    prop_oneof![
        Just(Seed::Absent),
        Just(Seed::CorrectLink),
        Just(Seed::ForeignLink),
        Just(Seed::IntoSourceLink),
        Just(Seed::LocalDir),
    ]
}

fn arb_layout() -> impl Strategy<Value = (Vec<bool>, Vec<Seed>)> {
    (
        prop::collection::vec(any::<bool>(), NAMES.len()),
        prop::collection::vec(arb_seed(), NAMES.len()),
    )
}

struct World {
    _temp: TempDir,
    source: SourceTree,
    target: Target,
    backups: BackupManager,
}

fn build(in_source: &[bool], seeds: &[Seed], local_dirs: bool) -> World {
    let temp = TempDir::new().unwrap();
    let base = fs::canonicalize(temp.path()).unwrap();
    let source_root = base.join("skills");
    let target_root = base.join("t1");
    let foreign = base.join("foreign");
    fs::create_dir_all(&source_root).unwrap();
    fs::create_dir_all(&target_root).unwrap();
    fs::create_dir_all(&foreign).unwrap();

    for (name, present) in NAMES.iter().zip(in_source) {
        if *present {
            let dir = source_root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("SKILL.md"), format!("# {name}\n")).unwrap();
        }
    }
    for ((name, present), seed) in NAMES.iter().zip(in_source).zip(seeds) {
        let entry = target_root.join(name);
        match seed {
            Seed::Absent => {}
            Seed::CorrectLink if *present => symlink(source_root.join(name), &entry).unwrap(),
            Seed::CorrectLink | Seed::IntoSourceLink => {
                symlink(source_root.join(format!("{name}-old")), &entry).unwrap();
            }
            Seed::ForeignLink => symlink(&foreign, &entry).unwrap(),
            Seed::LocalDir if local_dirs => {
                fs::create_dir_all(&entry).unwrap();
                fs::write(entry.join("SKILL.md"), "# local\n").unwrap();
            }
            Seed::LocalDir => {}
        }
    }

    let source = SourceTree::scan(&source_root, &BTreeSet::new()).unwrap();
    World {
        source,
        target: Target {
            name: "t1".to_string(),
            path: target_root,
            mode: SyncMode::Merge,
        },
        backups: BackupManager::new(base.join("backups")),
        _temp: temp,
    }
}

fn rescan(world: &World) -> SourceTree {
    SourceTree::scan(&world.source.root, &BTreeSet::new()).unwrap()
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_plan_has_one_action_per_divergent_unit((in_source, seeds) in arb_layout()) {
        let world = build(&in_source, &seeds, true);
        for force in [false, true] {
            let snapshot = observe(&world.source, &world.target).unwrap();
            let actions = plan(&snapshot, PlanOptions { force });
            let divergent = snapshot
                .entries
                .iter()
                .filter(|o| o.state != LinkState::InSync)
                .count();
            prop_assert_eq!(actions.len(), divergent);
            for action in actions.iter() {
                prop_assert!(action.state != LinkState::InSync);
            }
        }
    }

    #[test]
    fn test_second_sync_plans_nothing((in_source, seeds) in arb_layout()) {
        let world = build(&in_source, &seeds, false);
        let first = plan(&observe(&world.source, &world.target).unwrap(), PlanOptions::default());
        let report = Applier::new(&world.backups).apply(&first, false);
        prop_assert_eq!(report.failures().count(), 0);

        let second = plan(&observe(&rescan(&world), &world.target).unwrap(), PlanOptions::default());
        if report.is_clean() {
            prop_assert!(second.is_empty(), "clean sync left {:?}", second.iter().collect::<Vec<_>>());
        }
        // Links pointing outside the source are left for the user.
        prop_assert!(second.iter().all(|a| a.kind.is_conflict()));
        let third = plan(&observe(&rescan(&world), &world.target).unwrap(), PlanOptions::default());
        prop_assert_eq!(second.len(), third.len());
    }

    #[test]
    fn test_sync_without_foreign_content_converges((in_source, seeds) in arb_layout()) {
        let seeds: Vec<Seed> = seeds
            .into_iter()
            .map(|seed| match seed {
                Seed::ForeignLink | Seed::LocalDir => Seed::Absent,
                other => other,
            })
            .collect();
        let world = build(&in_source, &seeds, false);
        let first = plan(&observe(&world.source, &world.target).unwrap(), PlanOptions::default());
        let report = Applier::new(&world.backups).apply(&first, false);
        prop_assert!(report.is_clean());

        let snapshot = observe(&rescan(&world), &world.target).unwrap();
        prop_assert!(plan(&snapshot, PlanOptions::default()).is_empty());
        prop_assert_eq!(
            snapshot.entries.len(),
            in_source.iter().filter(|present| **present).count()
        );
        prop_assert!(snapshot.entries.iter().all(|o| o.state == LinkState::InSync));
    }

    #[test]
    fn test_plain_sync_never_removes_local_directories((in_source, seeds) in arb_layout()) {
        let world = build(&in_source, &seeds, true);
        let planned = plan(&observe(&world.source, &world.target).unwrap(), PlanOptions::default());
        Applier::new(&world.backups).apply(&planned, false);

        for (name, seed) in NAMES.iter().zip(&seeds) {
            if matches!(seed, Seed::LocalDir) {
                prop_assert!(is_real_dir(&world.target.path.join(name)));
            }
        }
    }
}
