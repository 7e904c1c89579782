use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use banner_harness::port::find_free_port;
use banner_harness::retry::RetryPolicy;
use banner_ssh::keys::signing_key_from_seed;
use banner_ssh::{ConnMeta, ServerConfig, ServerConn};
use rstest::*;
use ssh_banner_interop::scenario::{ClientScenario, ScenarioError, ServerScenario, assert_exact};
use tokio::net::TcpListener;

use super::fixtures::*;

#[rstest]
#[case::default_banner("Hello World")]
#[case::multi_line_banner("Authorized use only\nActivity is logged\n")]
#[case::unicode_banner("Grüße aus dem Serverraum ☕")]
#[test_log::test(tokio::test)]
async fn server_scenario_banner_should_reach_our_client_exactly(
    #[case] banner: &str,
    quick_retry: RetryPolicy,
) {
    let scenario = ServerScenario {
        banner: banner.to_string(),
        ..Default::default()
    };

    let observed = scenario.loopback(quick_retry).await.unwrap();
    assert_exact(banner, &observed).unwrap();
}

#[rstest]
#[test_log::test(tokio::test)]
async fn client_exchange_should_succeed_once_server_starts_listening(quick_retry: RetryPolicy) {
    let port = find_free_port().unwrap();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    let config = Arc::new(ServerConfig {
        no_client_auth: true,
        banner_callback: Some(Arc::new(|meta: &ConnMeta| -> Option<String> {
            meta.peer_addr.map(|_| "Hello late listener".to_string())
        })),
        public_key_callback: None,
        host_keys: vec![signing_key_from_seed(&[5; 32])],
    });

    // Listener only appears after the client has started retrying
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let listener = TcpListener::bind(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let conn = ServerConn::handshake(stream, Some(peer), config)
            .await
            .unwrap();
        let _ = conn.close().await;
    });

    let observed = ClientScenario::exchange(addr, "alice", quick_retry)
        .await
        .unwrap();
    assert_eq!(observed, "Hello late listener");
}

#[rstest]
#[test_log::test(tokio::test)]
async fn client_exchange_should_report_transport_error_without_listener(
    single_attempt: RetryPolicy,
) {
    let port = find_free_port().unwrap();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    let err = ClientScenario::exchange(addr, "user", single_attempt)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ScenarioError::Transport(_)),
        "Unexpected error: {err}"
    );
}
