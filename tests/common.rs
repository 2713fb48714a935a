use assert_cmd::Command;

/// Get a command for running the program binary, ignoring any user settings file
pub fn rebalance_cmd() -> Command {
    let mut cmd = Command::cargo_bin("rebalance").unwrap();
    cmd.env("REBALANCE_USE_DEFAULT_SETTINGS", "1")
        .env("REBALANCE_LOG_LEVEL", "warn");
    cmd
}

/// Run the program with the given arguments and check that it succeeds
#[allow(dead_code)]
pub fn assert_rebalance_runs(args: &[&str]) {
    rebalance_cmd().args(args).assert().success();
}

/// Run the program with the given arguments and return what it printed to stdout
#[allow(dead_code)]
pub fn get_rebalance_stdout(args: &[&str]) -> String {
    let output = rebalance_cmd().args(args).output().unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap()
}
