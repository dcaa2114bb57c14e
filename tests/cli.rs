//! 命令行集成测试

use assert_cmd::Command;

fn pagelingo(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("pagelingo").unwrap();
    cmd.current_dir(config_dir)
        .env_remove("RUST_LOG")
        .env("PAGELINGO_STORE_BACKEND", "memory")
        .env("PAGELINGO_OUTPUT_DIR", config_dir);
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let output = pagelingo(dir.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for command in ["translate", "show", "feed", "env"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_env_prints_variable_docs() {
    let dir = tempfile::tempdir().unwrap();
    let output = pagelingo(dir.path()).arg("env").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("PAGELINGO_OUTPUT_DIR"));
}

#[test]
fn test_show_unknown_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = pagelingo(dir.path())
        .args(["show", "42"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("translation 42 not found"));
}

#[test]
fn test_translate_rejects_invalid_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = pagelingo(dir.path())
        .args(["translate", "not a url"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid input"));
}

#[test]
fn test_empty_feed() {
    let dir = tempfile::tempdir().unwrap();
    let output = pagelingo(dir.path()).arg("feed").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("<rss version=\"2.0\">"));
    assert!(!stdout.contains("<item>"));
}
