//! Raw KISS-over-TCP bridge (spec C11): a transparent pipe between a TCP client and the
//! station's KISS stream. A single client at a time, mirroring the way a real TNC's KISS
//! port is normally a one-consumer socket; a second connection is rejected outright
//! (closed immediately) until the first disconnects.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Runs the bridge forever. `bridge_rx` carries KISS-wrapped bytes the pipeline wants
/// echoed to any listening client (both RX traffic off the radio and, once built, TX
/// traffic the station originates). Bytes read from the client are forwarded to
/// `to_transport`, to be written out as if they had come from a local application.
pub async fn run(port: u16, bridge_tx: broadcast::Sender<Vec<u8>>, to_transport: mpsc::Sender<Vec<u8>>) -> io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(%port, "KISS TCP bridge listening");
    let occupied = Arc::new(AtomicBool::new(false));

    loop {
        let (mut socket, peer_addr) = listener.accept().await?;
        if occupied
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(%peer_addr, "KISS bridge already has a client, rejecting");
            let _ = socket.shutdown().await;
            continue;
        }
        info!(%peer_addr, "KISS bridge client connected");
        let mut rx = bridge_tx.subscribe();
        let to_transport = to_transport.clone();
        let occupied = occupied.clone();
        tokio::spawn(async move {
            let (mut read_half, mut write_half) = socket.into_split();
            let writer = tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(bytes) => {
                            if write_half.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "KISS bridge client fell behind, frames dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            let mut buf = [0u8; 1024];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if to_transport.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            writer.abort();
            occupied.store(false, Ordering::SeqCst);
            debug!(%peer_addr, "KISS bridge client disconnected");
        });
    }
}
