use assert_cmd::prelude::*;
use debtmeter::database::Database;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn has_git() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    assert!(Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap()
        .success());
}

fn init_git_repo(dir: &Path) {
    // init and basic identity
    git(dir, &["init"]);
    git(dir, &["config", "core.autocrlf", "false"]);
    git(dir, &["config", "core.safecrlf", "false"]);
    git(dir, &["config", "user.email", "you@example.com"]);
    git(dir, &["config", "user.name", "Your Name"]);
}

fn commit_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.sync_all().unwrap();
    git(dir, &["add", name]);
    git(dir, &["commit", "-m", &format!("add {name}")]);
}

fn write_config(dir: &Path, extra: &str) {
    fs::write(
        dir.join("generate_config.yaml"),
        format!("database: database.db\nrepo: .\n{extra}"),
    )
    .unwrap();
}

fn generate(dir: &Path) -> String {
    let mut cmd = Command::cargo_bin("debtmeter").unwrap();
    cmd.current_dir(dir).args(["generate", "-j", "2"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).unwrap()
}

#[test]
fn generate_records_history() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    init_git_repo(dir.path());
    commit_file(dir.path(), "app.py", "import os\n# TODO: tidy\n");
    commit_file(dir.path(), "app.py", "import os\nimport sys\n");
    commit_file(dir.path(), "src/lib.rs", "pub fn hi() {}\n");
    write_config(dir.path(), "metric_parsers: [file_count]\n");

    let stdout = generate(dir.path());
    assert!(stdout.contains("Commits processed"));

    let db = Database::open(dir.path().join("database.db")).unwrap();
    let latest = db.latest_sha().unwrap();
    assert!(latest.is_some());

    let values = db.metrics_for_sha(latest.as_deref()).unwrap();
    assert_eq!(values["PythonImportCount"], 2);
    assert_eq!(values["TODOCount"], 0);
    assert_eq!(values["TotalLinesOfCode"], 3);
    assert_eq!(values["TotalLinesOfCode_Rust"], 1);
    assert_eq!(values["TotalFileCount"], 2);
    assert_eq!(db.status().unwrap().commits, 3);
}

#[test]
fn generate_resumes_where_it_left_off() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    init_git_repo(dir.path());
    commit_file(dir.path(), "notes.txt", "TODO one\n");
    write_config(dir.path(), "");

    generate(dir.path());
    let stdout = generate(dir.path());
    assert!(stdout.contains("Commits processed: 0"));

    commit_file(dir.path(), "more.txt", "TODO two\n");
    generate(dir.path());

    let db = Database::open(dir.path().join("database.db")).unwrap();
    let values = db.metrics_for_sha(db.latest_sha().unwrap().as_deref()).unwrap();
    assert_eq!(values["TODOCount"], 2);
    assert_eq!(db.status().unwrap().commits, 2);
}

#[test]
fn generate_without_config_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("debtmeter").unwrap();
    cmd.current_dir(dir.path()).arg("generate");
    let out = cmd.assert().failure().code(1).get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&out).contains("config file not found"));
    assert!(!dir.path().join("database.db").exists());
}

#[test]
fn generate_with_unknown_parser_fails_without_creating_database() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), "metric_parsers: [no_such_parser]\n");
    let mut cmd = Command::cargo_bin("debtmeter").unwrap();
    cmd.current_dir(dir.path()).arg("generate");
    let out = cmd.assert().failure().code(1).get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&out).contains("no_such_parser"));
    assert!(!dir.path().join("database.db").exists());
}

#[test]
fn serve_without_database_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("debtmeter").unwrap();
    cmd.current_dir(dir.path()).args(["serve", "missing.db", "--port", "0"]);
    let out = cmd.assert().failure().code(1).get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&out).contains("database not found"));
}
