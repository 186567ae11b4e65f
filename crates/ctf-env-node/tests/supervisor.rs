#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::PathBuf,
    process::Command,
    time::Duration,
};

use ctf_env_core::{ChainBackend, NetworkHandle, NodeError, NodeRole, NodeSpec};
use ctf_env_node::{LocalChain, NodeSupervisor, Simulator};

fn spec(port: u16) -> NodeSpec {
    NodeSpec {
        role: NodeRole::Upstream,
        port,
        mnemonic: "test test test test test test test test test test test junk".to_string(),
        fork_url: None,
        fork_block: None,
        extra_args: String::new(),
        block_delay: false,
    }
}

/// A stand-in simulator that ignores its arguments and stays alive.
fn fake_simulator(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ctf-env-{name}-{}", std::process::id()));
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn is_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .is_ok_and(|s| s.success())
}

#[tokio::test]
async fn test_no_simulator_installed() {
    let supervisor = NodeSupervisor::with_candidates([
        (Simulator::Anvil, "ctf-env-missing-anvil".to_string()),
        (Simulator::Ganache, "ctf-env-missing-ganache".to_string()),
    ]);

    let err = supervisor.launch(&spec(18555)).await.unwrap_err();
    match err {
        NodeError::ExecutableNotFound(tried) => {
            assert!(tried.contains("ctf-env-missing-anvil"));
            assert!(tried.contains("ctf-env-missing-ganache"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_falls_back_and_terminates() {
    let fallback = fake_simulator("ganache");
    let supervisor = NodeSupervisor::with_candidates([
        (Simulator::Anvil, "ctf-env-missing-anvil".to_string()),
        (Simulator::Ganache, fallback.display().to_string()),
    ]);

    let node = supervisor.launch(&spec(18556)).await.unwrap();
    assert_eq!(node.role(), NodeRole::Upstream);
    assert_eq!(node.port(), 18556);
    let pid = node.pid().unwrap();
    assert!(is_alive(pid));

    node.terminate().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!is_alive(pid));

    let _ = std::fs::remove_file(fallback);
}

#[tokio::test]
async fn test_revert_without_snapshot_is_noop() {
    let chain = LocalChain::default();
    let handle = NetworkHandle {
        rpc_url: "http://127.0.0.1:1".to_string(),
        chain_id: None,
        snapshot: None,
    };

    tokio_test::assert_ok!(chain.revert(&handle).await);
}

#[tokio::test]
async fn test_connect_to_dead_endpoint_fails() {
    let chain = LocalChain::default();
    let err = chain.connect("http://127.0.0.1:1", true).await.unwrap_err();
    assert!(matches!(err, NodeError::Rpc(_)));
}
