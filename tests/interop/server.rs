use banner_harness::env::require_binary;
use banner_harness::skip_if_unsupported;
use ssh_banner_interop::scenario::{Outcome, ServerScenario};
use test_log::test;

#[test(tokio::test(flavor = "multi_thread"))]
async fn server_banner_should_appear_in_ssh_output() {
    let ssh_bin = skip_if_unsupported!(require_binary(None, "ssh"));
    let scenario = ServerScenario {
        ssh_bin: Some(ssh_bin),
        ..Default::default()
    };

    match scenario.run().await {
        Ok(Outcome::Passed { observed }) => assert_eq!(observed, "Hello World"),
        Ok(Outcome::Skipped(reason)) => eprintln!("Skipping test: {reason}"),
        Err(x) => panic!("Server scenario failed: {x}"),
    }
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn server_banner_should_reach_ssh_for_any_user() {
    let ssh_bin = skip_if_unsupported!(require_binary(None, "ssh"));
    let scenario = ServerScenario {
        banner: "Welcome, testuser".to_string(),
        user: "testuser".to_string(),
        ssh_bin: Some(ssh_bin),
        ..Default::default()
    };

    match scenario.run().await {
        Ok(Outcome::Passed { observed }) => assert_eq!(observed, "Welcome, testuser"),
        Ok(Outcome::Skipped(reason)) => eprintln!("Skipping test: {reason}"),
        Err(x) => panic!("Server scenario failed: {x}"),
    }
}
