//! E2E Scenario: backup create, list, cleanup and restore

use std::fs;

use super::fixture::E2EFixture;

#[test]
fn test_cleanup_keeps_newest_even_with_keep_zero() {
    let mut fixture = E2EFixture::new("backup_retention");
    fixture.create_skill("a", "# A\n");

    fixture.log_step("Create three snapshots of the source");
    for _ in 0..3 {
        let output = fixture.run_sks(&["backup", "source"]);
        fixture.assert_success(&output, "backup source");
    }
    let (_, listed) = fixture.run_robot(&["backup", "--list"]);
    let listed = listed["data"].as_array().unwrap().clone();
    assert_eq!(listed.len(), 3);
    let newest = listed[0]["id"].as_str().unwrap().to_string();

    fixture.log_step("Cleanup with keep 0 leaves exactly the newest");
    let (output, report) = fixture.run_robot(&["backup", "--cleanup", "--keep", "0"]);
    fixture.assert_success(&output, "backup --cleanup");
    assert_eq!(report["data"]["removed"].as_array().unwrap().len(), 2);
    let (_, listed) = fixture.run_robot(&["backup", "--list"]);
    let remaining = listed["data"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], newest.as_str());
}

#[test]
fn test_restore_source_from_latest_snapshot() {
    let mut fixture = E2EFixture::new("backup_restore");
    let skill = fixture.create_skill("a", "# original\n");
    let (output, created) = fixture.run_robot(&["backup", "source"]);
    fixture.assert_success(&output, "backup source");
    let snapshot_id = created["data"]["id"].as_str().unwrap().to_string();

    fixture.log_step("Damage the source");
    fs::write(skill.join("SKILL.md"), "# broken\n").unwrap();
    fixture.create_skill("junk", "# junk\n");

    fixture.log_step("Restore brings the snapshot back");
    let (output, report) = fixture.run_robot(&["restore", "source"]);
    fixture.assert_success(&output, "restore source");
    assert_eq!(report["data"]["restored_from"], snapshot_id.as_str());
    assert!(report["data"]["pre_restore_id"].is_string());
    assert_eq!(fs::read_to_string(skill.join("SKILL.md")).unwrap(), "# original\n");
    assert!(!fixture.skills_root().join("junk").exists());

    fixture.log_step("Restored content is writable again");
    fs::write(skill.join("SKILL.md"), "# edited after restore\n").unwrap();
}

#[test]
fn test_restore_unknown_snapshot_is_robot_error() {
    let fixture = E2EFixture::new("backup_restore_missing");
    let (output, json) = fixture.run_robot(&["restore", "source", "--from", "20000101T000000Z"]);
    fixture.assert_exit(&output, 1, "restore missing snapshot");
    assert_eq!(json["error"], true);
    assert_eq!(json["code"], "backup_not_found");
}

#[test]
fn test_backup_requires_a_label() {
    let fixture = E2EFixture::new("backup_no_label");
    let (output, json) = fixture.run_robot(&["backup"]);
    fixture.assert_exit(&output, 1, "backup without label");
    assert_eq!(json["code"], "validation_failed");
}
