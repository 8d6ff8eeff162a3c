//! Address and credential discovery.

use std::net::{IpAddr, Ipv4Addr};

use rstest::rstest;
use tokio::net::TcpListener;

use super::super::*;
use super::fixtures::{HOST, ctx, harness, harness_with, Harness};
use crate::target::Credential;
use crate::test_support::RecordingMonitor;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

async fn closed_port() -> u16 {
    let listener = TcpListener::bind((LOOPBACK, 0)).await.expect("bind");
    listener.local_addr().expect("local addr").port()
}

fn daemon_harness(port: u16) -> Harness {
    let config = ExecConfig {
        daemon_port: port,
        ..ExecConfig::standard()
    };
    harness_with(RecordingMonitor::new(), config)
}

#[rstest]
#[tokio::test]
async fn known_address_is_returned_without_probing(harness: Harness) {
    let target = Target::shell("host").with_address(HOST);

    let address = harness
        .executor
        .discover_address(&ctx(), &target, &[LOOPBACK])
        .await
        .expect("address known");

    assert_eq!(address, HOST);
}

#[tokio::test]
async fn first_listening_candidate_is_recorded() {
    let listener = TcpListener::bind((LOOPBACK, 0)).await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let harness = daemon_harness(port);
    let target = Target::daemon("guest");

    let address = harness
        .executor
        .discover_address(&ctx(), &target, &[LOOPBACK])
        .await
        .expect("listener accepts");

    assert_eq!(address, LOOPBACK);
    assert_eq!(target.address(), Some(LOOPBACK));
}

#[tokio::test]
async fn unreachable_candidates_leave_target_unchanged() {
    let port = closed_port().await;
    let harness = daemon_harness(port);
    let target = Target::daemon("guest");

    let err = harness
        .executor
        .discover_address(&ctx(), &target, &[LOOPBACK])
        .await
        .expect_err("nothing listens");

    assert_eq!(
        err,
        DiscoveryError::NoReachableAddress {
            target: String::from("guest"),
            port,
            tried: 1,
        }
    );
    assert_eq!(target.address(), None);
}

#[rstest]
#[tokio::test]
async fn daemon_targets_take_no_credential(harness: Harness) {
    let target = Target::daemon("guest").with_address(HOST);

    let err = harness
        .executor
        .discover_credential(&ctx(), &target, &[Credential::agent("root")])
        .await
        .expect_err("daemon targets have no credential");

    assert!(matches!(err, DiscoveryError::Unsupported { .. }), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn credential_discovery_needs_an_address(harness: Harness) {
    let target = Target::shell("host");

    let err = harness
        .executor
        .discover_credential(&ctx(), &target, &[Credential::agent("root")])
        .await
        .expect_err("no address yet");

    assert_eq!(
        err,
        DiscoveryError::NoAddress {
            target: String::from("host"),
        }
    );
    assert!(harness.runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn first_working_credential_is_recorded(harness: Harness) {
    harness.runner.push_output(
        Some(255),
        "",
        "root@192.0.2.10: Permission denied (publickey).\n",
    );
    harness.runner.push_stdout("vigil-probe\n");
    let target = Target::shell("host").with_address(HOST);
    let candidates = [
        Credential::agent("root"),
        Credential::password("admin", "s3cret"),
    ];

    let found = harness
        .executor
        .discover_credential(&ctx(), &target, &candidates)
        .await
        .expect("second candidate works");

    assert_eq!(found.username, "admin");
    assert_eq!(
        target.credential().map(|cred| cred.username),
        Some(String::from("admin"))
    );
    let invocations = harness.runner.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(
        invocations.last().map(|invocation| invocation.program.as_str()),
        Some("sshpass")
    );
}

#[rstest]
#[tokio::test]
async fn exhausted_credentials_are_reported(harness: Harness) {
    harness.runner.push_exit_code(1);
    harness.runner.push_stdout("unexpected banner\n");
    let target = Target::shell("host").with_address(HOST);
    let candidates = [Credential::agent("root"), Credential::agent("admin")];

    let err = harness
        .executor
        .discover_credential(&ctx(), &target, &candidates)
        .await
        .expect_err("no candidate prints the marker");

    assert_eq!(
        err,
        DiscoveryError::NoWorkingCredential {
            target: String::from("host"),
            tried: 2,
        }
    );
    assert!(target.credential().is_none());
}

#[rstest]
#[tokio::test]
async fn known_credential_is_returned_without_probing(harness: Harness) {
    let target = Target::shell("host")
        .with_address(HOST)
        .with_credential(Credential::agent("ops"));

    let found = harness
        .executor
        .discover_credential(&ctx(), &target, &[Credential::agent("root")])
        .await
        .expect("credential known");

    assert_eq!(found.username, "ops");
    assert!(harness.runner.invocations().is_empty());
}
