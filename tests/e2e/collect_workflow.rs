//! E2E Scenario: collecting target-local skills into the source

use std::fs;

use super::fixture::{E2EFixture, is_symlink};

#[test]
fn test_collect_round_trip_ends_in_sync() {
    let mut fixture = E2EFixture::new("collect_round_trip");
    fixture.create_skill("a", "# A\n");
    let t1 = fixture.add_target("t1", "merge");
    let output = fixture.run_sks(&["sync"]);
    fixture.assert_success(&output, "initial sync");
    fixture.create_local_skill("t1", "c", "# C made in the tool\n");

    fixture.log_step("Status shows the local skill");
    let (_, status) = fixture.run_robot(&["status"]);
    assert_eq!(fixture.total(&status, "local_only"), 1);
    assert_eq!(fixture.total(&status, "in_sync"), 1);

    fixture.log_step("Sync refuses to touch it");
    let output = fixture.run_sks(&["sync"]);
    fixture.assert_exit(&output, 1, "sync with local-only skill");

    fixture.log_step("Collect moves it into the source");
    let (output, report) = fixture.run_robot(&["collect", "t1"]);
    fixture.assert_success(&output, "collect");
    assert_eq!(report["data"]["items"][0]["kind"], "import");
    assert_eq!(report["data"]["items"][0]["status"], "done");
    assert_eq!(
        fs::read_to_string(fixture.skills_root().join("c/SKILL.md")).unwrap(),
        "# C made in the tool\n"
    );
    assert!(!t1.join("c").exists());

    fixture.log_step("Next sync links it back");
    let (output, sync) = fixture.run_robot(&["sync"]);
    fixture.assert_success(&output, "sync after collect");
    assert_eq!(sync["data"]["results"][0]["kind"], "create_link");
    assert!(is_symlink(&t1.join("c")));
    let (_, status) = fixture.run_robot(&["status"]);
    assert_eq!(fixture.total(&status, "in_sync"), 2);
    assert_eq!(fixture.total(&status, "local_only"), 0);
}

#[test]
fn test_collect_dry_run_changes_nothing() {
    let mut fixture = E2EFixture::new("collect_dry_run");
    let t1 = fixture.add_target("t1", "merge");
    fixture.create_local_skill("t1", "c", "# C\n");

    fixture.log_step("Dry run reports a planned import");
    let (output, report) = fixture.run_robot(&["collect", "--all", "--dry-run"]);
    fixture.assert_success(&output, "collect --dry-run");
    assert_eq!(report["data"]["dry_run"], true);
    assert_eq!(report["data"]["items"][0]["status"], "planned");
    assert!(t1.join("c/SKILL.md").is_file());
    assert!(!fixture.skills_root().join("c").exists());
}

#[test]
fn test_collect_conflict_needs_force_and_target_wins() {
    let mut fixture = E2EFixture::new("collect_conflict");
    fixture.create_skill("a", "# source version\n");
    fixture.add_target("t1", "merge");
    fixture.create_local_skill("t1", "a", "# target version\n");

    fixture.log_step("Differing copies are a conflict");
    let (output, report) = fixture.run_robot(&["collect", "t1"]);
    fixture.assert_exit(&output, 1, "collect with conflict");
    assert_eq!(report["data"]["items"][0]["kind"], "conflict");
    assert_eq!(report["data"]["items"][0]["status"], "conflicted");
    assert_eq!(report["data"]["items"][0]["code"], "content_conflict");
    assert_eq!(report["status"]["partial"]["failed"], 1);
    assert_eq!(
        fs::read_to_string(fixture.skills_root().join("a/SKILL.md")).unwrap(),
        "# source version\n"
    );

    fixture.log_step("--force takes the target copy and backs up the source copy");
    let (output, report) = fixture.run_robot(&["collect", "t1", "--force"]);
    fixture.assert_success(&output, "collect --force");
    assert_eq!(report["data"]["items"][0]["kind"], "overwrite");
    assert_eq!(
        fs::read_to_string(fixture.skills_root().join("a/SKILL.md")).unwrap(),
        "# target version\n"
    );
    let (_, backups) = fixture.run_robot(&["backup", "source", "--list"]);
    let reasons: Vec<_> = backups["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["reason"].as_str().unwrap().to_string())
        .collect();
    assert!(reasons.contains(&"collect-overwrite".to_string()));
}

#[test]
fn test_collect_rejects_target_and_all_together() {
    let fixture = E2EFixture::new("collect_args");
    let output = fixture.run_sks(&["collect", "t1", "--all"]);
    assert!(!output.status.success());
}
