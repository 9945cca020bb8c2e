use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn revship_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("revship"));
    cmd.current_dir(root).env("RUST_LOG", "warn");
    cmd
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write fixture");
}

fn project(root: &Path) {
    write(root, "build/images/logo.png", "PNG");
    write(root, "build/css/site.css", "body { background: url(../images/logo.png); }");
    write(root, "build/js/app.js", "app();");
    write(
        root,
        "build/index.html",
        r#"<link href="css/site.css"><script src="js/app.js"></script>"#,
    );
    write(
        root,
        "publish-files.json",
        r#"[
  { "filter": ["**/*.css", "**/*.js", "images/**"], "headers": { "Cache-Control": "max-age=31536000" } },
  { "filter": ["**/*.html"], "headers": { "Cache-Control": "no-cache" } }
]"#,
    );
}

fn publish_args<'a>(root: &'a str, branch: &'a str, bucket: &'a str) -> Vec<&'a str> {
    vec![
        "publish",
        "--root",
        root,
        "--branch",
        branch,
        "--env",
        "production",
        "--store-dir",
        bucket,
    ]
}

#[test]
fn build_then_publish_to_a_branch_prefix() {
    let tmp = TempDir::new().expect("tmp");
    project(tmp.path());
    let root = tmp.path().to_str().expect("utf-8 path");
    let bucket_dir = tmp.path().join("bucket");
    let bucket = bucket_dir.to_str().expect("utf-8 path");

    revship_cmd(tmp.path())
        .args(["build", "--root", root])
        .assert()
        .success()
        .stdout(contains("revreplace-html"));
    let html = fs::read_to_string(tmp.path().join("dist/index.html")).expect("html");
    assert!(!html.contains("css/site.css"), "html not rewritten: {html}");

    revship_cmd(tmp.path())
        .args(publish_args(root, "feature/login", bucket))
        .assert()
        .success()
        .stdout(contains("0 failed"));
    assert!(bucket_dir.join("branch/feature%2Flogin/index.html").exists());
    assert!(!bucket_dir.join("index.html").exists());

    revship_cmd(tmp.path())
        .args(publish_args(root, "feature/login", bucket))
        .assert()
        .success()
        .stdout(contains("0 created, 0 updated, 0 deleted"));
}

#[test]
fn dry_run_and_plan_write_nothing() {
    let tmp = TempDir::new().expect("tmp");
    project(tmp.path());
    let root = tmp.path().to_str().expect("utf-8 path");
    let bucket_dir = tmp.path().join("bucket");
    let bucket = bucket_dir.to_str().expect("utf-8 path");

    revship_cmd(tmp.path())
        .args(["build", "--root", root])
        .assert()
        .success();

    let mut args = publish_args(root, "master", bucket);
    args.push("--dry-run");
    revship_cmd(tmp.path())
        .args(args)
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("create"));

    let output = revship_cmd(tmp.path())
        .args([
            "plan", "--root", root, "--branch", "master", "--env", "production", "--store-dir",
            bucket, "--json",
        ])
        .output()
        .expect("run revship plan");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).expect("plan json");
    assert_eq!(plan["target"]["destination_prefix"], "");
    assert!(plan["plan"]["uploads"].as_array().expect("uploads").len() >= 4);

    assert!(!bucket_dir.exists(), "dry runs must not create the store");
    assert!(!tmp.path().join(".revship").exists(), "dry runs must not write the cache");
}

#[test]
fn failed_objects_exit_non_zero() {
    let tmp = TempDir::new().expect("tmp");
    project(tmp.path());
    let root = tmp.path().to_str().expect("utf-8 path");
    // A regular file where the store directory should be: every upload fails.
    let bucket_file = tmp.path().join("bucket");
    fs::write(&bucket_file, "not a directory").expect("write");
    let bucket = bucket_file.to_str().expect("utf-8 path");

    revship_cmd(tmp.path())
        .args(["build", "--root", root])
        .assert()
        .success();
    revship_cmd(tmp.path())
        .args(publish_args(root, "foo", bucket))
        .assert()
        .failure()
        .stdout(contains("FAILED"))
        .stderr(contains("failed to publish"));
}

#[test]
fn missing_file_groups_is_a_configuration_error() {
    let tmp = TempDir::new().expect("tmp");
    write(tmp.path(), "dist/index.html", "<html>");
    let root = tmp.path().to_str().expect("utf-8 path");

    revship_cmd(tmp.path())
        .args(publish_args(root, "foo", "unused-bucket"))
        .assert()
        .failure()
        .stderr(contains("failed to load file groups"));
}
