//! The edge adapter (C5): translates edge-protocol events into
//! [`SessionController`] calls, and the controller's output callbacks back
//! into edge-protocol events written to the same connection.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::protocol::{self, EdgeEvent};
use crate::home_assistant::HomeAssistantClient;
use crate::session::{OutputCallbacks, SessionController};
use crate::Settings;

/// Capacity of the channel carrying controller output events to the
/// socket-writer task. Generously sized since the only backpressure that
/// matters is the TCP socket itself.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// One controller output event, still in its pre-framing shape.
enum OutputEvent {
    Start(u32),
    Chunk(Vec<u8>, u32),
    Stop,
}

/// [`OutputCallbacks`] implementation that just forwards to a channel; the
/// actual socket write happens on the adapter's writer task so the session
/// controller never touches I/O directly.
struct ChannelOutputSink {
    tx: mpsc::Sender<OutputEvent>,
}

#[async_trait]
impl OutputCallbacks for ChannelOutputSink {
    async fn on_output_start(&self, rate_hz: u32) {
        let _ = self.tx.send(OutputEvent::Start(rate_hz)).await;
    }

    async fn on_output_chunk(&self, pcm16: Vec<u8>, rate_hz: u32) {
        let _ = self.tx.send(OutputEvent::Chunk(pcm16, rate_hz)).await;
    }

    async fn on_output_stop(&self) {
        let _ = self.tx.send(OutputEvent::Stop).await;
    }
}

/// Drives one edge connection end to end: builds a [`SessionController`],
/// reads edge events off `reader` and drives the controller accordingly,
/// and writes the controller's output events to `writer` as edge events.
/// Returns once the edge connection closes, the client sends an event this
/// gateway doesn't understand, or a read/write error occurs.
pub async fn run_connection<R, W>(settings: Settings, ha: Arc<HomeAssistantClient>, reader: R, writer: W)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    let sink = Arc::new(ChannelOutputSink { tx });
    let controller = SessionController::new(settings, ha, sink);

    let writer_task = tokio::spawn(run_writer(writer, rx));

    run_reader(reader, &controller).await;

    controller.stop().await;
    writer_task.abort();
    let _ = writer_task.await;
}

/// Convenience entry point for the standalone server: splits a [`TcpStream`]
/// and drives [`run_connection`] over its halves.
pub async fn handle_tcp_connection(settings: Settings, ha: Arc<HomeAssistantClient>, stream: TcpStream) {
    let (reader, writer) = stream.into_split();
    run_connection(settings, ha, reader, writer).await;
}

async fn run_reader<R>(mut reader: R, controller: &Arc<SessionController>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match protocol::read_event(&mut reader).await {
            Ok(Some(EdgeEvent::Describe)) => {
                // Acknowledged implicitly by continuing to read; no info
                // response is sent (see DESIGN.md).
            }
            Ok(Some(EdgeEvent::AudioStart { rate, .. })) => {
                controller.notify_audio_start(rate);
                controller.ensure_running().await;
            }
            Ok(Some(EdgeEvent::AudioChunk { rate, audio })) => {
                controller.enqueue_audio(audio, rate).await;
            }
            Ok(Some(EdgeEvent::AudioStop)) => {
                controller.end_user_turn().await;
            }
            Ok(None) => break,
            Err(e) => {
                log::debug!("closing edge connection: {e}");
                break;
            }
        }
    }
}

async fn run_writer<W>(mut writer: W, mut rx: mpsc::Receiver<OutputEvent>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let edge_event = match event {
            OutputEvent::Start(rate) => EdgeEvent::AudioStart { rate, width: 2, channels: 1 },
            OutputEvent::Chunk(audio, rate) => EdgeEvent::AudioChunk { rate, audio },
            OutputEvent::Stop => EdgeEvent::AudioStop,
        };
        protocol::write_event(&mut writer, &edge_event).await?;
    }
    Ok(())
}
