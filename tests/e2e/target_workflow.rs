//! E2E Scenario: target registry management and safe removal

use std::fs;

use super::fixture::{E2EFixture, is_symlink};

#[test]
fn test_remove_symlink_target_with_real_directory_is_refused() {
    let mut fixture = E2EFixture::new("target_safe_removal");
    fixture.create_skill("a", "# A\n");
    let t2 = fixture.add_target("t2", "symlink");

    fixture.log_step("Someone replaced the link with a real directory");
    fs::create_dir_all(&t2).unwrap();
    fs::write(t2.join("notes.md"), "keep me").unwrap();

    let (output, json) = fixture.run_robot(&["target", "remove", "t2"]);
    fixture.assert_exit(&output, 1, "target remove");
    assert_eq!(json["code"], "unsafe_removal");
    assert_eq!(fs::read_to_string(t2.join("notes.md")).unwrap(), "keep me");

    let (_, targets) = fixture.run_robot(&["target", "list"]);
    assert_eq!(targets["data"][0]["name"], "t2");
}

#[test]
fn test_remove_merge_target_unlinks_only_source_links() {
    let mut fixture = E2EFixture::new("target_remove_merge");
    fixture.create_skill("a", "# A\n");
    let t1 = fixture.add_target("t1", "merge");
    let output = fixture.run_sks(&["sync"]);
    fixture.assert_success(&output, "sync");
    let foreign = fixture.temp_dir.path().join("foreign");
    fs::create_dir_all(&foreign).unwrap();
    fixture.link(&t1.join("x"), &foreign);

    let (output, report) = fixture.run_robot(&["target", "remove", "t1"]);
    fixture.assert_success(&output, "target remove");
    assert_eq!(report["data"]["unlinked"].as_array().unwrap().len(), 1);
    assert!(!t1.join("a").exists());
    assert!(is_symlink(&t1.join("x")), "foreign link stays");
    assert!(fixture.skills_root().join("a/SKILL.md").is_file());

    let (_, targets) = fixture.run_robot(&["target", "list"]);
    assert!(targets["data"].as_array().unwrap().is_empty());
}

#[test]
fn test_force_remove_backs_up_real_content() {
    let mut fixture = E2EFixture::new("target_force_remove");
    let t1 = fixture.add_target("t1", "merge");
    fixture.create_local_skill("t1", "mine", "# mine\n");

    let output = fixture.run_sks(&["target", "remove", "t1"]);
    fixture.assert_exit(&output, 1, "remove without force");
    assert!(t1.join("mine").is_dir());

    fixture.log_step("Force backs it up, then deletes");
    let (output, report) = fixture.run_robot(&["target", "remove", "t1", "--force"]);
    fixture.assert_success(&output, "remove --force");
    assert!(report["data"]["backup_id"].is_string());
    assert!(!t1.join("mine").exists());
}

#[test]
fn test_duplicate_add_and_mode_switch() {
    let mut fixture = E2EFixture::new("target_modes");
    fixture.create_skill("a", "# A\n");
    let t1 = fixture.add_target("t1", "merge");

    let (output, json) = fixture.run_robot(&["target", "add", "t1", t1.to_str().unwrap()]);
    fixture.assert_exit(&output, 1, "duplicate add");
    assert_eq!(json["code"], "duplicate_target");

    fixture.log_step("Local content blocks merge -> symlink");
    fixture.create_local_skill("t1", "local", "# local\n");
    let (output, json) = fixture.run_robot(&["target", "set-mode", "t1", "symlink"]);
    fixture.assert_exit(&output, 1, "set-mode with local content");
    assert_eq!(json["code"], "conflict_local_content");
    fs::remove_dir_all(t1.join("local")).unwrap();

    fixture.log_step("Clean target switches and syncs as one link");
    fixture.assert_success(&fixture.run_sks(&["sync"]), "sync");
    fixture.assert_success(&fixture.run_sks(&["target", "set-mode", "t1", "symlink"]), "set-mode");
    fixture.assert_success(&fixture.run_sks(&["sync"]), "sync after switch");
    assert!(is_symlink(&t1));

    let (_, targets) = fixture.run_robot(&["target", "list"]);
    assert_eq!(targets["data"][0]["mode"], "symlink");
}

#[test]
fn test_unknown_target_is_reported() {
    let fixture = E2EFixture::new("target_unknown");
    let (output, json) = fixture.run_robot(&["status", "nope"]);
    fixture.assert_exit(&output, 1, "status unknown target");
    assert_eq!(json["code"], "target_not_found");
}

#[test]
fn test_target_overlapping_source_is_refused() {
    let mut fixture = E2EFixture::new("target_overlap");
    fixture.create_skill("a", "# A\n");
    let source = fixture.skills_root();

    for (path, mode) in [
        (source.clone(), "merge"),
        (source.clone(), "symlink"),
        (source.join("nested"), "merge"),
        (fixture.root.clone(), "merge"),
    ] {
        fixture.log_step(&format!("add {} as {mode}", path.display()));
        let (output, json) = fixture.run_robot(&[
            "target",
            "add",
            "t1",
            path.to_str().unwrap(),
            "--mode",
            mode,
        ]);
        fixture.assert_exit(&output, 1, "overlapping target add");
        assert_eq!(json["code"], "invalid_path");
    }

    assert!(!source.join("nested").exists());
    assert_eq!(fs::read_to_string(source.join("a/SKILL.md")).unwrap(), "# A\n");
    let (_, targets) = fixture.run_robot(&["target", "list"]);
    assert!(targets["data"].as_array().unwrap().is_empty());
}

#[test]
fn test_hand_edited_overlap_blocks_collect_and_sync() {
    let mut fixture = E2EFixture::new("target_overlap_config");
    fixture.create_skill("a", "# A\n");
    let source = fixture.skills_root();
    fs::write(
        &fixture.config_path,
        format!(
            "[[targets]]\nname = \"t1\"\npath = \"{}\"\nmode = \"symlink\"\n",
            source.display()
        ),
    )
    .unwrap();

    fixture.log_step("Every command refuses the config before touching disk");
    for args in [&["collect", "--all", "--force"][..], &["sync", "--force"][..]] {
        let (output, json) = fixture.run_robot(args);
        fixture.assert_exit(&output, 1, "command with overlapping target");
        assert_eq!(json["code"], "invalid_path");
    }
    assert_eq!(fs::read_to_string(source.join("a/SKILL.md")).unwrap(), "# A\n");
    assert!(!is_symlink(&source));
}
