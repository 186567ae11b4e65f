//! TCP readiness polling.

use std::time::Duration;

use ctf_env_core::PortTimeoutError;
use tokio::{net::TcpStream, time::Instant};

/// Delay between connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Wait until `host:port` accepts TCP connections.
///
/// Each test connection is closed immediately. Gives up once `timeout` has
/// elapsed since the first attempt.
///
/// # Errors
/// Returns `PortTimeoutError` if the port never accepted a connection in time.
pub async fn wait_for_port(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), PortTimeoutError> {
    let started = Instant::now();
    loop {
        let remaining = timeout.saturating_sub(started.elapsed()).max(POLL_INTERVAL);
        match tokio::time::timeout(remaining, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                tracing::debug!(
                    host,
                    port,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Port ready"
                );
                return Ok(());
            }
            Ok(Err(e)) => tracing::trace!(host, port, "Port not ready: {e}"),
            Err(_) => tracing::trace!(host, port, "Connection attempt timed out"),
        }

        if started.elapsed() >= timeout {
            return Err(PortTimeoutError {
                host: host.to_string(),
                port,
                timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
