//! Newline-delimited JSON framing for byte-stream hosts.
//!
//! Each inbound line names the sender origin, an optional port number and the
//! message payload. The adapter turns the port number into a real
//! [`ReplyPort`](crate::transport::ReplyPort) and writes the reply back as a
//! line tagged with the same port number, in completion order.
//!
//! ```text
//! in:  {"origin":"https://editor.example.com","port":7,"data":{"type":"file:unlink","data":{"path":"a.py"}}}
//! out: {"port":7,"type":"reply"}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::command::Reply;
use crate::transport::{reply_channel, InboundMessage, TransportSender};

const OUTBOUND_CAPACITY: usize = 64;

/// One inbound line.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundFrame {
    /// Origin the host reports for the sender.
    pub origin: String,
    /// Sender-chosen reply port number. Frames without one cannot be replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u64>,
    /// Message payload.
    pub data: serde_json::Value,
}

/// One outbound line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Port number copied from the request frame.
    pub port: u64,
    /// Reply for that request.
    #[serde(flatten)]
    pub reply: Reply,
}

/// Counters for one framed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Lines posted to the transport.
    pub posted: u64,
    /// Lines that were not valid frames.
    pub invalid: u64,
    /// Reply lines written.
    pub replied: u64,
}

/// Pump frames from `reader` into the transport and replies into `writer`.
///
/// Returns once `reader` reaches EOF (or the transport closes) and every
/// posted request has either been replied to or had its port dropped.
///
/// # Errors
///
/// Returns an I/O error if reading or writing the stream fails.
pub async fn run_frames<R, W>(
    reader: R,
    writer: W,
    sender: TransportSender,
) -> std::io::Result<FrameStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);
    let writer_task = tokio::spawn(write_replies(writer, out_rx));

    let mut stats = FrameStats::default();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame: InboundFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "skipping invalid frame");
                stats.invalid = stats.invalid.saturating_add(1);
                continue;
            }
        };

        let mut ports = Vec::new();
        if let Some(port_id) = frame.port {
            let (port, rx) = reply_channel();
            ports.push(port);
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                match rx.recv().await {
                    Some(reply) => {
                        let _ = out_tx
                            .send(OutboundFrame {
                                port: port_id,
                                reply,
                            })
                            .await;
                    }
                    None => debug!(port = port_id, "request dropped without reply"),
                }
            });
        }

        let message = InboundMessage {
            origin: frame.origin,
            data: frame.data,
            ports,
        };
        if sender.post(message).await.is_err() {
            warn!("transport closed, no longer reading frames");
            break;
        }
        stats.posted = stats.posted.saturating_add(1);
    }

    drop(out_tx);
    match writer_task.await {
        Ok(result) => stats.replied = result?,
        Err(e) => return Err(std::io::Error::other(e)),
    }
    Ok(stats)
}

async fn write_replies<W>(
    mut writer: W,
    mut out_rx: mpsc::Receiver<OutboundFrame>,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written: u64 = 0;
    while let Some(frame) = out_rx.recv().await {
        let mut line = serde_json::to_vec(&frame).map_err(std::io::Error::other)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
        written = written.saturating_add(1);
    }
    Ok(written)
}
