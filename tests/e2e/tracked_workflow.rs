//! E2E Scenario: tracking a git repo of skills

use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Repository, Signature};

use super::fixture::E2EFixture;

fn write(repo: &Repository, rel: &str, body: &str) {
    let path = repo.workdir().unwrap().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn commit_all(repo: &Repository, message: &str) {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

fn origin(path: &Path) -> Repository {
    fs::create_dir_all(path).unwrap();
    let repo = Repository::init(path).unwrap();
    write(&repo, "lint/SKILL.md", "# lint v1\n");
    write(&repo, "group/fmt/SKILL.md", "# fmt v1\n");
    commit_all(&repo, "initial skills");
    repo
}

#[test]
fn test_track_update_and_uninstall() {
    let mut fixture = E2EFixture::new("tracked_repo");
    let origin_path = fixture.temp_dir.path().join("origin");
    let repo = origin(&origin_path);

    fixture.log_step("Track materializes prefixed skills");
    let (output, report) = fixture.run_robot(&[
        "track",
        origin_path.to_str().unwrap(),
        "--name",
        "team",
    ]);
    fixture.assert_success(&output, "track");
    let names: Vec<_> = report["data"]["skills"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["_team__group__fmt", "_team__lint"]);
    assert!(fixture.skills_root().join("_team__lint/SKILL.md").is_file());
    assert!(!fixture.skills_root().join("_team__lint/.git").exists());
    assert!(fs::read_to_string(&fixture.config_path).unwrap().contains("repo_id = \"team\""));

    fixture.log_step("Upstream change flows in on update");
    write(&repo, "lint/SKILL.md", "# lint v2\n");
    commit_all(&repo, "lint v2");
    let (output, report) = fixture.run_robot(&["update", "team"]);
    fixture.assert_success(&output, "update");
    let lint = report["data"][0]["skills"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "_team__lint")
        .unwrap()
        .clone();
    assert_eq!(lint["change"], "updated");
    assert_eq!(
        fs::read_to_string(fixture.skills_root().join("_team__lint/SKILL.md")).unwrap(),
        "# lint v2\n"
    );

    fixture.log_step("Local edits are kept without --force");
    fs::write(fixture.skills_root().join("_team__lint/SKILL.md"), "# my tweak\n").unwrap();
    write(&repo, "lint/SKILL.md", "# lint v3\n");
    commit_all(&repo, "lint v3");
    let (output, _) = fixture.run_robot(&["update", "--all"]);
    fixture.assert_exit(&output, 1, "update with local edit");
    assert_eq!(
        fs::read_to_string(fixture.skills_root().join("_team__lint/SKILL.md")).unwrap(),
        "# my tweak\n"
    );

    fixture.log_step("Uninstall excludes the skill from future updates");
    let (output, report) = fixture.run_robot(&["uninstall", "_team__group__fmt"]);
    fixture.assert_success(&output, "uninstall");
    assert_eq!(report["data"]["repo_id"], "team");
    assert!(!fixture.skills_root().join("_team__group__fmt").exists());
    assert!(fs::read_to_string(&fixture.config_path).unwrap().contains("_team__group__fmt"));

    let (output, report) = fixture.run_robot(&["update", "team", "--force"]);
    fixture.assert_success(&output, "forced update");
    assert!(!fixture.skills_root().join("_team__group__fmt").exists());
    let changes: Vec<_> = report["data"][0]["skills"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["name"].as_str().unwrap().to_string(), s["change"].as_str().unwrap().to_string()))
        .collect();
    assert!(changes.contains(&("_team__group__fmt".to_string(), "excluded".to_string())));
    assert!(changes.contains(&("_team__lint".to_string(), "overwritten".to_string())));
}

#[test]
fn test_update_unknown_repo() {
    let fixture = E2EFixture::new("tracked_unknown");
    let (output, json) = fixture.run_robot(&["update", "nobody"]);
    fixture.assert_exit(&output, 1, "update unknown");
    assert_eq!(json["code"], "repo_not_found");
}
