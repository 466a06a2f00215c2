//! Wire framing for the edge protocol.
//!
//! Each event is two length-prefixed sections: a 4-byte big-endian header
//! length, a JSON header describing the event type and its non-audio
//! fields, a 4-byte big-endian payload length, and the raw audio payload
//! (zero-length when the event carries no audio). This is the concrete
//! shape behind the "length-prefixed framed events" the edge-protocol
//! library exposes.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One decoded edge-protocol event, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeEvent {
    /// Acknowledged with no info response (see `DESIGN.md` for why).
    Describe,
    /// Announces the start of a PCM16 audio stream at the given rate.
    AudioStart { rate: u32, width: u16, channels: u16 },
    /// One chunk of PCM16 audio at the given rate.
    AudioChunk { rate: u32, audio: Vec<u8> },
    /// Closes the audio stream opened by the most recent `AudioStart`.
    AudioStop,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Header {
    Describe,
    AudioStart { rate: u32, width: u16, channels: u16 },
    AudioChunk { rate: u32 },
    AudioStop,
}

/// Reads one event from `reader`.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary. Returns
/// `Err` for a malformed frame, a truncated frame, or a header whose `type`
/// isn't one of the four recognized values — all three are "anything else"
/// from the adapter's point of view and mean the caller should close the
/// connection.
pub async fn read_event<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<EdgeEvent>> {
    let header_len = match read_u32_or_eof(reader).await? {
        Some(len) => len,
        None => return Ok(None),
    };

    let mut header_buf = vec![0u8; header_len as usize];
    reader.read_exact(&mut header_buf).await?;

    let payload_len = reader.read_u32().await?;
    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }

    let header: Header = serde_json::from_slice(&header_buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(Some(match header {
        Header::Describe => EdgeEvent::Describe,
        Header::AudioStart { rate, width, channels } => {
            EdgeEvent::AudioStart { rate, width, channels }
        }
        Header::AudioChunk { rate } => EdgeEvent::AudioChunk { rate, audio: payload },
        Header::AudioStop => EdgeEvent::AudioStop,
    }))
}

/// Writes one event to `writer` and flushes it.
pub async fn write_event<W: AsyncWrite + Unpin>(
    writer: &mut W,
    event: &EdgeEvent,
) -> io::Result<()> {
    let (header, payload): (Header, &[u8]) = match event {
        EdgeEvent::Describe => (Header::Describe, &[]),
        EdgeEvent::AudioStart { rate, width, channels } => (
            Header::AudioStart { rate: *rate, width: *width, channels: *channels },
            &[],
        ),
        EdgeEvent::AudioChunk { rate, audio } => {
            (Header::AudioChunk { rate: *rate }, audio.as_slice())
        }
        EdgeEvent::AudioStop => (Header::AudioStop, &[]),
    };

    let header_bytes =
        serde_json::to_vec(&header).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    writer.write_u32(header_bytes.len() as u32).await?;
    writer.write_all(&header_bytes).await?;
    writer.write_u32(payload.len() as u32).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await
}

async fn read_u32_or_eof<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(Some(u32::from_be_bytes(buf))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(event: EdgeEvent) -> EdgeEvent {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        write_event(&mut client, &event).await.unwrap();
        drop(client);
        read_event(&mut server).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn roundtrips_describe() {
        assert_eq!(roundtrip(EdgeEvent::Describe).await, EdgeEvent::Describe);
    }

    #[tokio::test]
    async fn roundtrips_audio_start() {
        let event = EdgeEvent::AudioStart { rate: 16_000, width: 2, channels: 1 };
        assert_eq!(roundtrip(event.clone()).await, event);
    }

    #[tokio::test]
    async fn roundtrips_audio_chunk_with_payload() {
        let event = EdgeEvent::AudioChunk { rate: 16_000, audio: vec![1, 2, 3, 4] };
        assert_eq!(roundtrip(event.clone()).await, event);
    }

    #[tokio::test]
    async fn roundtrips_audio_stop() {
        assert_eq!(roundtrip(EdgeEvent::AudioStop).await, EdgeEvent::AudioStop);
    }

    #[tokio::test]
    async fn clean_eof_at_frame_boundary_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_event(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_type_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let header = br#"{"type":"teleport"}"#;
        client.write_u32(header.len() as u32).await.unwrap();
        client.write_all(header).await.unwrap();
        client.write_u32(0).await.unwrap();
        client.flush().await.unwrap();
        drop(client);
        assert!(read_event(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(100).await.unwrap();
        client.write_all(b"short").await.unwrap();
        drop(client);
        assert!(read_event(&mut server).await.is_err());
    }
}
