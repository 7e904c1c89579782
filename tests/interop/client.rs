use banner_harness::env::require_binary;
use banner_harness::skip_if_unsupported;
use rstest::*;
use ssh_banner_interop::scenario::{ClientScenario, Outcome};

#[rstest]
#[case::default_banner("Hello World")]
#[case::multi_line_banner("Authorized use only\nActivity is logged\n")]
#[test_log::test(tokio::test)]
async fn client_should_capture_sshd_banner_exactly(#[case] banner: &str) {
    let sshd_bin = skip_if_unsupported!(require_binary(None, "sshd"));
    let scenario = ClientScenario {
        banner: banner.to_string(),
        sshd_bin: Some(sshd_bin),
        ..Default::default()
    };

    match scenario.run().await {
        Ok(Outcome::Passed { observed }) => assert_eq!(observed, banner),
        Ok(Outcome::Skipped(reason)) => eprintln!("Skipping test: {reason}"),
        Err(x) => panic!("Client scenario failed: {x}"),
    }
}
