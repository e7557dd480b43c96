//! TCP socket receiving captures from `snap_sender`.
//!
use std::sync::Arc;

use anyhow::{Context, Result};
use common::protocol::{ProtoMsg, MAX_FRAME_LENGTH};
use futures::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::{session::Event, state::AppState};

/// Bind the data socket and accept connections on a separate task.
pub async fn spawn_data_socket(
    state: Arc<AppState>,
    addr: &str,
) -> Result<JoinHandle<std::io::Result<()>>> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind data socket to {addr}"))?;
    log::info!("Data socket listening on {}", addr);

    Ok(tokio::spawn(accept_loop(listener, state)))
}

async fn accept_loop(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    loop {
        let (socket, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_incoming(socket, state).await {
                log::warn!("Data socket connection failed: {}", err);
            }
        });
    }
}

pub async fn handle_incoming(stream: TcpStream, state: Arc<AppState>) -> std::io::Result<()> {
    let peer = stream.peer_addr()?;
    log::info!("{}: New connection", peer);

    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    let mut transport = Framed::new(stream, codec);

    while let Some(frame) = transport.next().await {
        let event = match ProtoMsg::deserialize(&frame?[..]) {
            Ok(ProtoMsg::Capture(capture_msg)) => {
                log::info!(
                    "{}: Capture from {} ({} bytes)",
                    peer,
                    capture_msg.source,
                    capture_msg.data.len()
                );
                Event::Capture(capture_msg.data)
            }
            Ok(ProtoMsg::Reset) => Event::Reset,
            Err(err) => {
                log::warn!("{}: Dropping malformed message: {}", peer, err);
                continue;
            }
        };

        match state.dispatch(event).await {
            Ok(phase) => log::debug!("{}: Session now {:?}", peer, phase),
            Err(err) => log::error!("{}: Event handling aborted: {}", peer, err),
        }
    }

    log::info!("{}: Connection closed", peer);
    Ok(())
}
