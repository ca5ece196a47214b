//! TCP bind and connect helpers.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, instrument};

use crate::error::{ProtocolError, Result};

/// Bind a listener on `address` (`host:port`)
///
/// # Errors
/// `Bind` when the address is malformed or already in use.
#[instrument]
pub async fn bind(address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| ProtocolError::Bind(format!("{address}: {e}")))?;
    debug!(local = ?listener.local_addr().ok(), "Listener bound");
    Ok(listener)
}

/// Open a TCP stream to `host:port`, giving up after `timeout`
///
/// # Errors
/// `Connect` when the peer refuses, the name does not resolve, or the timeout
/// elapses.
#[instrument(skip(timeout))]
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let address = format!("{host}:{port}");
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(ProtocolError::Connect(format!("{address}: {e}"))),
        Err(_) => {
            return Err(ProtocolError::Connect(format!(
                "{address}: timed out after {timeout:?}"
            )))
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    Ok(stream)
}
