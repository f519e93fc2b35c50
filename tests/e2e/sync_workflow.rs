//! E2E Scenario: sync reconciles targets with the source
//!
//! - empty merge target gets one link per skill, second sync is a no-op
//! - drifted and orphan links are repaired
//! - symlink-mode target becomes a single directory link
//! - target-local content blocks sync (exit 1) until --force

use std::fs;

use super::fixture::{E2EFixture, is_symlink};

const SKILL_A: &str = "---\nname: a\ndescription: first skill\n---\n# A\n";
const SKILL_B: &str = "---\nname: b\nversion: 1.0.0\n---\n# B\n";

#[test]
fn test_sync_creates_links_and_second_run_is_empty() {
    let mut fixture = E2EFixture::new("sync_create");
    fixture.create_skill("a", SKILL_A);
    fixture.create_skill("b", SKILL_B);
    let t1 = fixture.add_target("t1", "merge");

    fixture.log_step("Dry run plans two links and touches nothing");
    let (output, plan) = fixture.run_robot(&["sync", "--dry-run"]);
    fixture.assert_success(&output, "sync --dry-run");
    let results = plan["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["kind"] == "create_link" && r["outcome"] == "planned"));
    assert_eq!(results[0]["unit"], "a");
    assert!(!t1.join("a").exists());

    fixture.log_step("Sync applies the plan");
    let (output, report) = fixture.run_robot(&["sync"]);
    fixture.assert_success(&output, "sync");
    assert_eq!(report["data"]["status"], "success");
    for name in ["a", "b"] {
        assert!(is_symlink(&t1.join(name)));
        assert_eq!(
            fs::canonicalize(t1.join(name)).unwrap(),
            fs::canonicalize(fixture.skills_root().join(name)).unwrap()
        );
    }

    fixture.log_step("Status reports everything in sync");
    let (output, status) = fixture.run_robot(&["status"]);
    fixture.assert_success(&output, "status");
    assert_eq!(fixture.total(&status, "in_sync"), 2);
    assert_eq!(fixture.total(&status, "missing"), 0);

    fixture.log_step("Second sync has nothing to do");
    let (output, again) = fixture.run_robot(&["sync"]);
    fixture.assert_success(&output, "second sync");
    assert!(again["data"]["results"].as_array().unwrap().is_empty());
}

#[test]
fn test_drifted_and_orphan_links_are_repaired() {
    let mut fixture = E2EFixture::new("sync_repair");
    fixture.create_skill("a", SKILL_A);
    let t1 = fixture.add_target("t1", "merge");
    let elsewhere = fixture.temp_dir.path().join("elsewhere/a");
    fs::create_dir_all(&elsewhere).unwrap();
    fixture.link(&t1.join("a"), &elsewhere);
    fixture.link(&t1.join("gone"), &fixture.skills_root().join("gone"));

    fixture.log_step("Diff shows both problems");
    let (output, diff) = fixture.run_robot(&["diff"]);
    fixture.assert_success(&output, "diff");
    let states: Vec<_> = diff["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["unit"].as_str().unwrap().to_string(), e["state"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        states,
        vec![
            ("a".to_string(), "drifted".to_string()),
            ("gone".to_string(), "orphan_link".to_string())
        ]
    );

    fixture.log_step("Sync fixes the link and drops the orphan");
    let output = fixture.run_sks(&["sync"]);
    fixture.assert_success(&output, "sync");
    assert_eq!(
        fs::canonicalize(t1.join("a")).unwrap(),
        fs::canonicalize(fixture.skills_root().join("a")).unwrap()
    );
    assert!(!is_symlink(&t1.join("gone")));
    assert!(elsewhere.exists(), "foreign directory must not be touched");
}

#[test]
fn test_symlink_mode_target_links_whole_directory() {
    let mut fixture = E2EFixture::new("sync_symlink_mode");
    fixture.create_skill("a", SKILL_A);
    let t2 = fixture.add_target("t2", "symlink");

    fixture.log_step("Sync creates the directory link");
    let output = fixture.run_sks(&["sync", "t2"]);
    fixture.assert_success(&output, "sync t2");
    assert!(is_symlink(&t2));
    assert!(t2.join("a/SKILL.md").is_file());

    let (_, status) = fixture.run_robot(&["status", "t2"]);
    assert_eq!(fixture.total(&status, "in_sync"), 1);
    assert_eq!(status["data"]["targets"][0]["units"][0]["unit"], "*");
}

#[test]
fn test_local_content_blocks_sync_until_force() {
    let mut fixture = E2EFixture::new("sync_conflict");
    fixture.create_skill("a", SKILL_A);
    let t1 = fixture.add_target("t1", "merge");
    fixture.create_local_skill("t1", "a", "# local edit\n");

    fixture.log_step("Plain sync rejects the conflict with exit 1");
    let (output, report) = fixture.run_robot(&["sync"]);
    fixture.assert_exit(&output, 1, "sync with conflict");
    assert_eq!(report["status"]["partial"]["failed"], 1);
    assert_eq!(report["data"]["results"][0]["kind"], "reject_conflict");
    assert!(!is_symlink(&t1.join("a")));

    fixture.log_step("Forced sync backs up and replaces");
    let (output, report) = fixture.run_robot(&["sync", "--force"]);
    fixture.assert_success(&output, "sync --force");
    assert_eq!(report["data"]["results"][0]["kind"], "replace_link");
    assert_eq!(report["data"]["results"][0]["destructive"], true);
    let backup_id = report["data"]["results"][0]["backup_id"].as_str().unwrap().to_string();
    assert!(is_symlink(&t1.join("a")));

    let (_, backups) = fixture.run_robot(&["backup", "t1", "--list"]);
    let listed = backups["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], backup_id.as_str());
    assert_eq!(listed[0]["reason"], "sync-force");
}
