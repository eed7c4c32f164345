//! AGWPE (SV2AGW) protocol server (spec C11, §4.10): the de-facto standard TCP API many
//! APRS/packet clients (UI-View, Xastir, APRSIS32) speak to a TNC. Each message is a
//! 36-byte header followed by a variable-length body; the header layout and the subset
//! of data-kind letters implemented here follow the same one-struct-per-wire-shape
//! approach the codec in `packet-proto::ax25` uses for AX.25 frames: manual byte
//! indexing, no bit-level decode crate.
//!
//! Connected-mode commands (`C`/`v`/`c`/`D`/`d`/`y`/`Y`) do not touch the link layer
//! directly — the one shared `LinkAdapter` lives inside `Pipeline`, owned by the main
//! loop's single-threaded event loop (spec §5: no locks outside the retransmit queue).
//! Instead this handler sends an [`AgwCommand`] over an mpsc channel the main loop
//! drains on its next `select!` iteration, and listens on a broadcast [`AgwEvent`]
//! channel the main loop publishes link-layer state changes to.
use std::io;

use packet_proto::ax25::frame::{decode_frame, encode_frame};
use packet_proto::ax25::Control;
use packet_proto::callsign::Callsign;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const HEADER_LEN: usize = 36;

/// A connected-mode or unproto-send request the AGWPE handler cannot itself act on,
/// forwarded to the main loop for execution against the shared `Pipeline`/`LinkAdapter`.
#[derive(Debug, Clone)]
pub enum AgwCommand {
    Connect { peer: Callsign },
    /// AGWPE `D`: connected-mode application data, built into an I-frame over the
    /// current session by the link layer.
    SendData { info: Vec<u8> },
    Disconnect,
    SendUnproto { to: Callsign, via: Vec<Callsign>, info: Vec<u8> },
    /// AGWPE `K`: a complete, already-framed AX.25 frame to transmit verbatim, bypassing
    /// the connected-mode link layer entirely.
    SendRaw { frame: Vec<u8> },
    QueryOutstanding,
}

/// A link-layer state change published by the main loop, for whichever client owns the
/// current connected-mode session to pick up and relay onward as AGWPE frames.
#[derive(Debug, Clone)]
pub enum AgwEvent {
    Connected { peer: Callsign },
    Disconnected { peer: Callsign },
    Delivered { peer: Callsign, info: Vec<u8> },
    Outstanding { count: usize },
}

struct AgwHeader {
    data_kind: u8,
    call_from: [u8; 10],
    call_to: [u8; 10],
    data_len: u32,
}

impl AgwHeader {
    fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        let mut call_from = [0u8; 10];
        call_from.copy_from_slice(&buf[8..18]);
        let mut call_to = [0u8; 10];
        call_to.copy_from_slice(&buf[18..28]);
        let data_len = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        AgwHeader {
            data_kind: buf[4],
            call_from,
            call_to,
            data_len,
        }
    }

    fn reply(data_kind: u8, call_from: &str, call_to: &str, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[4] = data_kind;
        write_padded_call(&mut out[8..18], call_from);
        write_padded_call(&mut out[18..28], call_to);
        out[28..32].copy_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        out
    }
}

fn write_padded_call(slot: &mut [u8], call: &str) {
    let bytes = call.as_bytes();
    let n = bytes.len().min(slot.len());
    slot[..n].copy_from_slice(&bytes[..n]);
}

fn call_from_field(field: &[u8; 10]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

/// Parses a "TO[,VIA1,VIA2,...]" unproto destination string, the body format AGWPE
/// clients use for `M`/`V` sends.
fn parse_unproto_body(body: &[u8]) -> Option<(Callsign, Vec<Callsign>, Vec<u8>)> {
    let text = std::str::from_utf8(body).ok()?;
    let (header, info) = text.split_once('\r')?;
    let mut parts = header.split(',');
    let to: Callsign = parts.next()?.trim().parse().ok()?;
    let via: Vec<Callsign> = parts.filter_map(|p| p.trim().parse().ok()).collect();
    Some((to, via, info.as_bytes().to_vec()))
}

/// Runs the AGWPE server forever, one task per client connection.
pub async fn run(
    port: u16,
    mycall: Callsign,
    bridge_tx: broadcast::Sender<Vec<u8>>,
    agw_cmd_tx: mpsc::Sender<AgwCommand>,
    agw_event_tx: broadcast::Sender<AgwEvent>,
) -> io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(%port, "AGWPE server listening");

    loop {
        let (socket, peer_addr) = listener.accept().await?;
        info!(%peer_addr, "AGWPE client connected");
        let bridge_rx = bridge_tx.subscribe();
        let event_rx = agw_event_tx.subscribe();
        let agw_cmd_tx = agw_cmd_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, mycall, bridge_rx, event_rx, agw_cmd_tx).await {
                debug!(%peer_addr, error = %e, "AGWPE client session ended");
            }
        });
    }
}

async fn handle_client(
    mut socket: TcpStream,
    mycall: Callsign,
    mut bridge_rx: broadcast::Receiver<Vec<u8>>,
    mut event_rx: broadcast::Receiver<AgwEvent>,
    agw_cmd_tx: mpsc::Sender<AgwCommand>,
) -> io::Result<()> {
    let (mut read_half, mut write_half) = socket.split();
    let mut monitor_enabled = false;
    let mut raw_enabled = false;
    // This client currently owns the one connected-mode session, set on a successful
    // `C`/`v`/`c` and cleared on `Disconnected`; gates whether `D`/`y` apply to it.
    let mut owns_session = false;

    loop {
        tokio::select! {
            header = read_header(&mut read_half) => {
                let Some(header) = header? else { return Ok(()) };
                let mut body = vec![0u8; header.data_len as usize];
                read_half.read_exact(&mut body).await?;

                match header.data_kind {
                    b'R' => {
                        let reply = AgwHeader::reply(b'R', "", "", &[0, 0, 1, 0]);
                        write_half.write_all(&reply).await?;
                    }
                    b'G' => {
                        let reply = AgwHeader::reply(b'G', "", "", b"1;Packet station radio port;");
                        write_half.write_all(&reply).await?;
                    }
                    b'g' => {
                        let reply = AgwHeader::reply(b'g', "", "", &[6]);
                        write_half.write_all(&reply).await?;
                    }
                    b'X' => {
                        let call = call_from_field(&header.call_from);
                        let accepted = call.parse::<Callsign>().is_ok_and(|c| c.same_base(&mycall));
                        let reply = AgwHeader::reply(b'X', &call, "", &[accepted as u8]);
                        write_half.write_all(&reply).await?;
                    }
                    b'x' => {
                        // Unregister: no state is tracked per-callsign registration here
                        // beyond what `X` checked, so this is a no-op acknowledgment.
                        debug!("AGWPE client unregistered a callsign");
                    }
                    b'm' => monitor_enabled = true,
                    b'k' => raw_enabled = true,
                    b'K' => {
                        if decode_frame(&body).is_ok() {
                            let _ = agw_cmd_tx.send(AgwCommand::SendRaw { frame: body }).await;
                        } else {
                            warn!("AGWPE client sent an unparseable raw frame");
                        }
                    }
                    b'M' | b'V' => {
                        if let Some((to, via, info)) = parse_unproto_body(&body) {
                            let _ = agw_cmd_tx
                                .send(AgwCommand::SendUnproto { to, via, info })
                                .await;
                        } else {
                            warn!("AGWPE client sent a malformed unproto send");
                        }
                    }
                    b'C' | b'v' | b'c' => {
                        let peer_str = call_from_field(&header.call_to);
                        match peer_str.parse::<Callsign>() {
                            Ok(peer) => {
                                owns_session = true;
                                let _ = agw_cmd_tx.send(AgwCommand::Connect { peer }).await;
                            }
                            Err(_) => warn!(%peer_str, "AGWPE connect request has an invalid peer callsign"),
                        }
                    }
                    b'D' if owns_session => {
                        let _ = agw_cmd_tx.send(AgwCommand::SendData { info: body }).await;
                    }
                    b'd' if owns_session => {
                        let _ = agw_cmd_tx.send(AgwCommand::Disconnect).await;
                    }
                    b'y' | b'Y' => {
                        let _ = agw_cmd_tx.send(AgwCommand::QueryOutstanding).await;
                    }
                    other => {
                        debug!(data_kind = other, "unhandled AGWPE request, ignoring");
                    }
                }
            }
            frame = bridge_rx.recv(), if monitor_enabled || raw_enabled => {
                match frame {
                    Ok(kiss_bytes) => {
                        if let Some(payload) = packet_proto::kiss::unwrap(&kiss_bytes) {
                            if let Ok(frame) = decode_frame(&payload) {
                                // Spec §4.10: `U` monitor frames to monitoring clients,
                                // `K` raw frames to raw-registered clients.
                                if monitor_enabled && monitor_kind(&frame.control) {
                                    let reply = AgwHeader::reply(
                                        b'U',
                                        &frame.source.to_string(),
                                        &frame.destination.to_string(),
                                        &encode_frame(&frame),
                                    );
                                    write_half.write_all(&reply).await?;
                                }
                                if raw_enabled {
                                    let reply = AgwHeader::reply(
                                        b'K',
                                        &frame.source.to_string(),
                                        &frame.destination.to_string(),
                                        &encode_frame(&frame),
                                    );
                                    write_half.write_all(&reply).await?;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            event = event_rx.recv(), if owns_session => {
                match event {
                    Ok(AgwEvent::Connected { peer }) => {
                        // Confirmation `C` response: call_from/call_to inverted
                        // (from=remote, to=local), per §4.10.
                        let reply = AgwHeader::reply(b'C', &peer.to_string(), &mycall.to_string(), b"*** CONNECTED\r");
                        write_half.write_all(&reply).await?;
                    }
                    Ok(AgwEvent::Disconnected { peer }) => {
                        owns_session = false;
                        let reply = AgwHeader::reply(b'd', &peer.to_string(), &mycall.to_string(), &[]);
                        write_half.write_all(&reply).await?;
                    }
                    Ok(AgwEvent::Delivered { peer, info }) => {
                        let reply = AgwHeader::reply(b'D', &peer.to_string(), &mycall.to_string(), &info);
                        write_half.write_all(&reply).await?;
                    }
                    Ok(AgwEvent::Outstanding { count }) => {
                        let reply = AgwHeader::reply(b'Y', &mycall.to_string(), "", &(count as u32).to_le_bytes());
                        write_half.write_all(&reply).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

fn monitor_kind(control: &Control) -> bool {
    matches!(control, Control::UFrame { .. } | Control::IFrame { .. })
}

/// Reads one 36-byte AGWPE header, or `None` on a clean EOF before any bytes arrive.
async fn read_header<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<AgwHeader>> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated AGWPE header"))
            };
        }
        filled += n;
    }
    Ok(Some(AgwHeader::parse(&buf)))
}
