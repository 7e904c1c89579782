use assert_cmd::Command;
use assert_fs::prelude::*;
use indoc::indoc;
use predicates::prelude::*;

fn banner_interop() -> Command {
    let mut cmd: Command = assert_cmd::cargo_bin_cmd!("banner-interop");
    cmd.env("BANNER_INTEROP_SHORT", "0");
    cmd
}

#[test]
fn help_should_list_scenarios() {
    banner_interop()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("client"))
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("all"));
}

#[test]
fn client_should_skip_when_daemon_is_missing() {
    banner_interop()
        .args([
            "client",
            "--log-level",
            "off",
            "--sshd-bin",
            "/nonexistent/banner-interop/sshd",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("SKIP client: could not find"));
}

#[test]
fn short_mode_should_skip_every_scenario() {
    banner_interop()
        .env("BANNER_INTEROP_SHORT", "1")
        .args(["all", "--log-level", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SKIP client: skipping due to BANNER_INTEROP_SHORT"))
        .stdout(predicate::str::contains("SKIP server: skipping due to BANNER_INTEROP_SHORT"));
}

#[test]
fn unknown_subcommand_should_exit_with_usage_code() {
    banner_interop().arg("bogus").assert().code(64);
}

#[test]
fn missing_config_file_should_exit_with_config_code() {
    banner_interop()
        .args(["--config", "/nonexistent/banner-interop.toml", "client"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn config_file_should_supply_scenario_settings() {
    let config = assert_fs::NamedTempFile::new("config.toml").unwrap();
    config
        .write_str(indoc! {r#"
            [logging]
            log_level = "off"

            [client]
            banner = "configured"
            user = "user"
            sshd_bin = "/nonexistent/from-config/sshd"

            [client.retry]
            attempts = 1
            interval_ms = 1

            [server]
            banner = "configured"
            user = "user"
            accepted_user = "testuser"
            completion_timeout_ms = 100
        "#})
        .unwrap();

    banner_interop()
        .arg("--config")
        .arg(config.path())
        .arg("client")
        .assert()
        .success()
        .stdout(predicate::str::contains("/nonexistent/from-config/sshd"));
}
