//! End-to-end CLI tests for the moodle-dump binary.

mod support;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use support::{
    ACCESS_KEY, mount_contents, mount_file, mount_function, mount_login, single_section,
    webservice_file_url,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command isolated from the caller's environment, config and .env files.
fn isolated_command(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("moodle-dump").unwrap();
    cmd.current_dir(home)
        .env_remove("MOODLE_SITE")
        .env_remove("MOODLE_USERNAME")
        .env_remove("MOODLE_PASSWORD")
        .env_remove("RUST_LOG")
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    isolated_command(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mirror your Moodle courses"))
        .stdout(predicate::str::contains("--dump-all"))
        .stdout(predicate::str::contains("MOODLE_PASSWORD"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    isolated_command(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("moodle-dump"));
}

#[test]
fn test_binary_invalid_flag_is_usage_error() {
    let home = TempDir::new().unwrap();
    isolated_command(home.path())
        .arg("--invalid-flag")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_missing_password_exits_with_failure() {
    let home = TempDir::new().unwrap();
    isolated_command(home.path())
        .args(["--site", "https://moodle.invalid", "--username", "student"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MOODLE_PASSWORD"));
}

#[test]
fn test_binary_missing_site_exits_with_failure() {
    let home = TempDir::new().unwrap();
    isolated_command(home.path())
        .env("MOODLE_PASSWORD", "secret")
        .args(["--username", "student"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MOODLE_SITE"));
}

#[test]
fn test_binary_explicit_config_must_exist() {
    let home = TempDir::new().unwrap();
    isolated_command(home.path())
        .env("MOODLE_PASSWORD", "secret")
        .args(["--config", "nope.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn test_binary_rejects_unknown_config_keys() {
    let home = TempDir::new().unwrap();
    let config_dir = home.path().join("config").join("moodle-dump");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "site = \"https://moodle.invalid\"\npasword = \"typo\"\n",
    )
    .unwrap();

    isolated_command(home.path())
        .env("MOODLE_PASSWORD", "secret")
        .args(["--username", "student"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config.toml"));
}

#[tokio::test]
async fn test_binary_login_rejected_exits_with_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/token.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "Invalid login, please try again",
            "errorcode": "invalidlogin",
        })))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();
    let mut cmd = isolated_command(home.path());
    cmd.env("MOODLE_PASSWORD", "pw-rejected-7781")
        .args(["--site", &server.uri(), "--username", "student"]);

    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();

    assert
        .code(1)
        .stderr(predicate::str::contains("Login failed"))
        .stderr(predicate::str::contains("pw-rejected-7781").not());
}

#[tokio::test]
async fn test_binary_mirrors_course_files() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_function(
        &server,
        "core_webservice_get_site_info",
        serde_json::json!({
            "userid": 42,
            "userprivateaccesskey": ACCESS_KEY,
            "sitename": "Campus",
        }),
    )
    .await;
    mount_function(
        &server,
        "core_enrol_get_users_courses",
        serde_json::json!([
            {"id": 5, "fullname": "CS101: Intro", "shortname": "CS101", "hidden": 0},
            {"id": 6, "fullname": "Old: Archive", "shortname": "OLD", "hidden": 1},
        ]),
    )
    .await;
    let url = webservice_file_url(&server, "/55/mod_resource/content/1/week1.pdf");
    mount_contents(
        &server,
        5,
        single_section("General", "Slides", &[("week1.pdf", url)]),
    )
    .await;
    mount_file(&server, "/55/mod_resource/content/1/week1.pdf", b"pdf").await;

    let home = TempDir::new().unwrap();
    let mut cmd = isolated_command(home.path());
    cmd.env("MOODLE_PASSWORD", "secret")
        .args(["--site", &server.uri(), "--username", "student", "-o", "out"]);

    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();

    assert
        .success()
        .stderr(predicate::str::contains("Mirror complete"))
        .stderr(predicate::str::contains(ACCESS_KEY).not());
    let target = home.path().join("out/Intro/General/Slides/week1.pdf");
    assert_eq!(std::fs::read(target).unwrap(), b"pdf");
    assert!(!home.path().join("out/Archive").exists());
}

#[tokio::test]
async fn test_binary_course_filter_limits_mirror() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_function(
        &server,
        "core_webservice_get_site_info",
        serde_json::json!({"userid": 42, "userprivateaccesskey": ACCESS_KEY}),
    )
    .await;
    mount_function(
        &server,
        "core_enrol_get_users_courses",
        serde_json::json!([
            {"id": 5, "fullname": "CS101: Intro"},
            {"id": 7, "fullname": "MA201: Algebra"},
        ]),
    )
    .await;
    mount_contents(&server, 7, serde_json::json!([])).await;

    let home = TempDir::new().unwrap();
    let mut cmd = isolated_command(home.path());
    cmd.env("MOODLE_PASSWORD", "secret").args([
        "--site",
        &server.uri(),
        "--username",
        "student",
        "-o",
        "out",
        "--course",
        "7",
    ]);

    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();

    assert.success();
    assert!(home.path().join("out/Algebra").is_dir());
    assert!(!home.path().join("out/Intro").exists());
}
