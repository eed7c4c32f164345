//! Packet-radio station daemon: wires a transport, the RX pipeline, the retransmit/retry
//! scheduling ticks, and the bridge servers together under `tokio`.
mod bridge;
mod config;
mod pipeline;
mod transport;

use std::time::{Duration, Instant};

use bridge::agwpe::{AgwCommand, AgwEvent};
use packet_proto::ax25::frame::encode_frame;
use packet_proto::kiss;
use pipeline::Pipeline;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transport::Transport;

const RETRANSMIT_TICK: Duration = Duration::from_millis(500);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (config, _options) = config::load()?;
    info!(mycall = %config.mycall, "starting packet-station");

    let endpoint = config.transport_endpoint()?;
    let mut transport = Transport::connect(&endpoint).await?;

    let mut pipeline = Pipeline::new(&config)?;

    let snapshot_path = std::path::PathBuf::from(&config.state_dir).join("stations.json.gz");
    match packet_proto::station::StationDb::load(&snapshot_path) {
        Ok(db) => {
            info!(path = %snapshot_path.display(), "restored station database from snapshot");
            pipeline.restore_stations(db);
        }
        Err(e) => warn!(error = %e, "no station database snapshot restored, starting empty"),
    }

    let frames_path = std::path::PathBuf::from(&config.state_dir).join("frames.json.gz");
    match packet_proto::framebuffer::FrameBuffer::load(&frames_path, packet_proto::framebuffer::DEFAULT_CAPACITY) {
        Ok(frames) => {
            info!(path = %frames_path.display(), "restored frame buffer from snapshot");
            pipeline.restore_frames(frames);
        }
        Err(e) => warn!(error = %e, "no frame buffer snapshot restored, starting empty"),
    }

    // Already-KISS-framed bytes a KISS-bridge client wants written to the radio
    // verbatim (spec §6: "whatever the client writes is sent to the transport as-is").
    let (tx_to_transport, mut rx_to_transport) = mpsc::channel::<Vec<u8>>(256);
    // AGWPE connected-mode/unproto/raw-send requests, executed against the one shared
    // `Pipeline`/`LinkAdapter` from this loop (spec §5: no cross-task locking beyond the
    // retransmit queue itself).
    let (agw_cmd_tx, mut agw_cmd_rx) = mpsc::channel::<AgwCommand>(64);
    let (agw_event_tx, _) = broadcast::channel::<AgwEvent>(64);

    if config.kiss_bridge_port != 0 {
        let port = config.kiss_bridge_port;
        let bridge_tx = pipeline.bridge_sender();
        let to_transport = tx_to_transport.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge::kiss_tcp::run(port, bridge_tx, to_transport).await {
                error!(error = %e, "KISS TCP bridge exited");
            }
        });
    }

    if config.agwpe_port != 0 {
        let port = config.agwpe_port;
        let mycall = config.mycall()?;
        let bridge_tx = pipeline.bridge_sender();
        let agw_cmd_tx = agw_cmd_tx.clone();
        let agw_event_tx = agw_event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge::agwpe::run(port, mycall, bridge_tx, agw_cmd_tx, agw_event_tx).await {
                error!(error = %e, "AGWPE server exited");
            }
        });
    }

    let mut retransmit_tick = interval(RETRANSMIT_TICK);
    let mut snapshot_tick = interval(SNAPSHOT_INTERVAL);
    let mut connect_retry_tick = interval(config.link_config().t_connect);
    let mut read_buf = [0u8; 2048];

    let mut beacon_tick = config.beacon.then(|| interval(config.beacon_interval()));

    loop {
        tokio::select! {
            result = transport.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    warn!("transport read returned EOF, reconnecting is not yet automated");
                    continue;
                }
                let result = pipeline.ingest(&read_buf[..n], Instant::now());
                for bytes in result.to_transmit {
                    if let Err(e) = transport.write_all(&bytes).await {
                        error!(error = %e, "failed writing to transport");
                    }
                }
                for event in pipeline.take_link_events() {
                    let _ = agw_event_tx.send(map_link_event(event));
                }
            }
            Some(outbound) = rx_to_transport.recv() => {
                // Already a complete KISS frame from the bridge client; forwarded as-is.
                if let Err(e) = transport.write_all(&outbound).await {
                    error!(error = %e, "failed writing bridge-originated frame to transport");
                }
            }
            Some(cmd) = agw_cmd_rx.recv() => {
                match cmd {
                    AgwCommand::Connect { peer } => {
                        // Spec §4.10: only one AX.25 connection at a time; reject `C`
                        // while one is already active or being established.
                        if !matches!(pipeline.link().state(), packet_proto::link::LinkState::Disconnected) {
                            warn!(%peer, "AGWPE connect rejected, a session is already active");
                        } else {
                            let frame = pipeline.agwpe_connect(peer);
                            let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                            if let Err(e) = transport.write_all(&wrapped).await {
                                error!(error = %e, "failed writing AGWPE connect to transport");
                            }
                        }
                    }
                    AgwCommand::SendData { info } => {
                        if let Some(frame) = pipeline.agwpe_send_data(&info, Instant::now()) {
                            let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                            if let Err(e) = transport.write_all(&wrapped).await {
                                error!(error = %e, "failed writing AGWPE connected data to transport");
                            }
                        }
                    }
                    AgwCommand::Disconnect => {
                        if let Some(frame) = pipeline.agwpe_disconnect() {
                            let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                            if let Err(e) = transport.write_all(&wrapped).await {
                                error!(error = %e, "failed writing AGWPE disconnect to transport");
                            }
                        }
                    }
                    AgwCommand::SendUnproto { to, via, info } => {
                        let frame = pipeline.agwpe_send_unproto(to, &via, &info);
                        let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                        if let Err(e) = transport.write_all(&wrapped).await {
                            error!(error = %e, "failed writing AGWPE unproto send to transport");
                        }
                    }
                    AgwCommand::SendRaw { frame } => {
                        let wrapped = kiss::wrap(&frame, 0);
                        if let Err(e) = transport.write_all(&wrapped).await {
                            error!(error = %e, "failed writing AGWPE raw send to transport");
                        }
                    }
                    AgwCommand::QueryOutstanding => {
                        let _ = agw_event_tx.send(AgwEvent::Outstanding { count: pipeline.link_queue_len() });
                    }
                }
            }
            _ = retransmit_tick.tick() => {
                for frame in pipeline.tick(Instant::now()) {
                    let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                    if let Err(e) = transport.write_all(&wrapped).await {
                        error!(error = %e, "failed writing retransmit to transport");
                    }
                }
            }
            _ = snapshot_tick.tick() => {
                let path = std::path::PathBuf::from(&config.state_dir).join("stations.json.gz");
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = pipeline.station_db().save(&path) {
                    warn!(error = %e, "station database snapshot failed");
                }
                let frames_path = std::path::PathBuf::from(&config.state_dir).join("frames.json.gz");
                if let Err(e) = pipeline.frame_buffer().save(&frames_path) {
                    warn!(error = %e, "frame buffer snapshot failed");
                }
            }
            _ = connect_retry_tick.tick() => {
                if let Some(frame) = pipeline.connect_retry_tick() {
                    transport.kick();
                    let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                    if let Err(e) = transport.write_all(&wrapped).await {
                        error!(error = %e, "failed writing SABM retry to transport");
                    }
                }
                for event in pipeline.take_link_events() {
                    let _ = agw_event_tx.send(map_link_event(event));
                }
            }
            _ = async {
                if let Some(t) = beacon_tick.as_mut() {
                    t.tick().await;
                }
            }, if beacon_tick.is_some() => {
                if let Some(frame) = pipeline.build_beacon() {
                    let wrapped = kiss::wrap(&encode_frame(&frame), 0);
                    if let Err(e) = transport.write_all(&wrapped).await {
                        error!(error = %e, "failed writing beacon to transport");
                    }
                }
            }
        }
    }
}

/// Translates a link-layer event into the AGWPE client-facing event the owning
/// connected-mode client is waiting on. `LinkFailed` (repeated unanswered SABM) is
/// reported the same way as a remote-initiated disconnect: either way the client's `C`
/// never gets its `*** CONNECTED` confirmation and should stop waiting.
fn map_link_event(event: packet_proto::link::InboundEvent) -> AgwEvent {
    use packet_proto::link::InboundEvent;
    match event {
        InboundEvent::LinkEstablished { peer } => AgwEvent::Connected { peer },
        InboundEvent::LinkFailed { peer } => AgwEvent::Disconnected { peer },
        InboundEvent::Disconnected { peer, .. } => AgwEvent::Disconnected { peer },
        InboundEvent::Delivered { peer, info } => AgwEvent::Delivered { peer, info },
    }
}
