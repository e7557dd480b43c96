//! Delivery of a captured still to `detect_server`.
//!
use anyhow::{Context, Result};
use common::protocol::{CaptureMsg, ProtoMsg, MAX_FRAME_LENGTH};
use futures::sink::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Send the still as one length-delimited frame over the data socket.
pub async fn send_over_socket(address: &str, source: &str, data: Vec<u8>) -> Result<()> {
    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("failed to connect to data socket {address}"))?;
    log::info!("Client connected to {}", address);

    // Wrap stream in transport handler with length-delimited codec
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    let mut transport = Framed::new(stream, codec);

    let msg = ProtoMsg::Capture(CaptureMsg::new(source.to_owned(), data));
    let data = bytes::Bytes::from(msg.serialize()?);
    transport.send(data).await?;
    SinkExt::<bytes::Bytes>::close(&mut transport).await?;

    Ok(())
}

/// Post the still as request body to the HTTP capture endpoint.
pub async fn post_over_http(address: &str, data: Vec<u8>) -> Result<()> {
    let url = format!("http://{address}/capture");
    reqwest::Client::new()
        .post(&url)
        .body(data)
        .send()
        .await
        .with_context(|| format!("failed to post capture to {url}"))?
        .error_for_status()?;

    Ok(())
}
