//! Opaque byte forwarding between two paired transports.
//!
//! Each direction runs as its own task. When one direction sees EOF or an
//! error it shuts down its writer and tells the other direction to stop at
//! its next read. Both tasks are joined before [`forward`] returns, and both
//! transports are dropped exactly once at that point.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;

/// Copy buffer size per direction.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Bytes moved in each direction during one forwarding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Bytes read from the first transport and written to the second.
    pub first_to_second: u64,
    /// Bytes read from the second transport and written to the first.
    pub second_to_first: u64,
}

impl ForwardStats {
    /// Total bytes moved.
    pub fn total(&self) -> u64 {
        self.first_to_second + self.second_to_first
    }
}

/// Forward bytes between `first` and `second` until either side is done.
pub async fn forward<A, B>(first: A, second: B) -> ForwardStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (first_rd, first_wr) = tokio::io::split(first);
    let (second_rd, second_wr) = tokio::io::split(second);
    let (stop_tx, stop_rx) = watch::channel(false);

    let upstream = tokio::spawn(copy_direction(
        first_rd,
        second_wr,
        stop_tx.clone(),
        stop_rx.clone(),
    ));
    let downstream = tokio::spawn(copy_direction(second_rd, first_wr, stop_tx, stop_rx));

    let (up, down) = tokio::join!(upstream, downstream);

    ForwardStats {
        first_to_second: up.unwrap_or_else(|e| {
            tracing::warn!("Forwarding task failed: {}", e);
            0
        }),
        second_to_first: down.unwrap_or_else(|e| {
            tracing::warn!("Forwarding task failed: {}", e);
            0
        }),
    }
}

async fn copy_direction<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    stop_tx: watch::Sender<bool>,
    mut stop_rx: watch::Receiver<bool>,
) -> u64
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("Forwarding read ended: {}", e);
                    break;
                }
            },
            _ = stop_rx.wait_for(|stop| *stop) => break,
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            tracing::debug!("Forwarding write ended: {}", e);
            break;
        }
        total += n as u64;
    }

    let _ = writer.shutdown().await;
    stop_tx.send_replace(true);
    total
}
