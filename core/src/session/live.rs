//! WebSocket transport to the remote live-audio model.
//!
//! Speaks the Gemini Live `BidiGenerateContent` protocol directly over
//! `tokio-tungstenite`: a setup frame establishes the session, then audio
//! and tool-response frames flow out while audio/text/tool-call frames flow
//! in. Connect, send, and receive are split across an outbound channel +
//! task and an inbound task, the same shape the teacher's WebSocket
//! connection handling uses for its own duplex traffic.

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::tools::{FunctionCall, FunctionResponse};
use crate::config::Settings;
use crate::error::{GatewayError, GatewayResult};

const LIVE_WS_HOST: &str = "generativelanguage.googleapis.com";

/// One inbound event from the remote model session, already normalized out
/// of the wire protocol's two audio representations and turn bookkeeping.
#[derive(Debug)]
pub enum LiveEvent {
    /// One blob of 24 kHz PCM16 audio belonging to the current turn.
    Audio(Vec<u8>),
    /// Diagnostic-only text content.
    Text(String),
    /// A batch of function calls the model wants executed.
    ToolCall(Vec<FunctionCall>),
    /// The current turn has completed.
    TurnComplete,
    /// The remote side closed the connection without error.
    ClosedGracefully,
    /// The connection failed or the remote side sent something unparseable.
    Error(String),
}

enum OutboundMessage {
    Audio(Vec<u8>),
    ToolResponse(Vec<FunctionResponse>),
    Close,
}

/// A connected live-model session.
pub struct LiveSession {
    outbound_tx: mpsc::Sender<OutboundMessage>,
}

impl LiveSession {
    /// Connects to the remote model, sends the setup frame, and spawns the
    /// outbound/inbound loops. Returns the session handle plus the receiver
    /// end of the inbound event stream.
    pub async fn connect(
        settings: &Settings,
        system_prompt: &str,
        tools: Value,
    ) -> GatewayResult<(Self, mpsc::Receiver<LiveEvent>)> {
        let url = format!(
            "wss://{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent?key={}",
            LIVE_WS_HOST, settings.gemini_api_version, settings.gemini_api_key,
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| GatewayError::SessionOpen(e.to_string()))?;

        let (mut ws_sender, ws_receiver) = ws_stream.split();

        let setup = json!({
            "setup": {
                "model": settings.qualified_model(),
                "generationConfig": { "responseModalities": ["AUDIO"] },
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Zephyr" } },
                },
                "systemInstruction": {
                    "role": "user",
                    "parts": [{ "text": system_prompt }],
                },
                "tools": tools,
            },
        });
        ws_sender
            .send(WsMessage::Text(setup.to_string()))
            .await
            .map_err(|e| GatewayError::SessionOpen(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        tokio::spawn(Self::outbound_loop(ws_sender, outbound_rx));
        tokio::spawn(Self::inbound_loop(ws_receiver, inbound_tx));

        Ok((Self { outbound_tx }, inbound_rx))
    }

    /// Streams one chunk of PCM16 audio as real-time input.
    pub async fn send_audio(&self, pcm16: Vec<u8>) -> GatewayResult<()> {
        self.outbound_tx
            .send(OutboundMessage::Audio(pcm16))
            .await
            .map_err(|_| GatewayError::SessionTransport("outbound channel closed".to_string()))
    }

    /// Submits every response for one tool-call batch in a single reply.
    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> GatewayResult<()> {
        if responses.is_empty() {
            return Ok(());
        }
        self.outbound_tx
            .send(OutboundMessage::ToolResponse(responses))
            .await
            .map_err(|_| GatewayError::SessionTransport("outbound channel closed".to_string()))
    }

    /// Requests a clean close of the underlying connection.
    pub async fn close(&self) {
        let _ = self.outbound_tx.send(OutboundMessage::Close).await;
    }

    async fn outbound_loop(
        mut sender: futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            WsMessage,
        >,
        mut rx: mpsc::Receiver<OutboundMessage>,
    ) {
        while let Some(msg) = rx.recv().await {
            let frame = match msg {
                OutboundMessage::Audio(pcm16) => {
                    let data = base64::engine::general_purpose::STANDARD.encode(&pcm16);
                    json!({
                        "realtimeInput": {
                            "audio": { "data": data, "mimeType": "audio/pcm" },
                        },
                    })
                }
                OutboundMessage::ToolResponse(responses) => {
                    json!({ "toolResponse": { "functionResponses": responses } })
                }
                OutboundMessage::Close => {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }
            };

            if sender.send(WsMessage::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    }

    async fn inbound_loop(
        mut receiver: futures_util::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
        >,
        tx: mpsc::Sender<LiveEvent>,
    ) {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    for event in parse_server_message(&text) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(WsMessage::Close(_)) => {
                    let _ = tx.send(LiveEvent::ClosedGracefully).await;
                    return;
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
                Ok(WsMessage::Binary(_)) => {}
                Err(e) => {
                    let is_clean_close = e.to_string().contains("ConnectionClosedOK")
                        || matches!(
                            e,
                            tokio_tungstenite::tungstenite::Error::ConnectionClosed
                        );
                    if is_clean_close {
                        let _ = tx.send(LiveEvent::ClosedGracefully).await;
                    } else {
                        let _ = tx.send(LiveEvent::Error(e.to_string())).await;
                    }
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    tool_call: Option<ToolCallEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallEnvelope {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

/// Parses one server text frame into zero or more [`LiveEvent`]s, applying
/// the ordered audio-extraction rule: a direct `data` field first, then the
/// first `inlineData.data` found among `serverContent.modelTurn.parts`.
fn parse_server_message(text: &str) -> Vec<LiveEvent> {
    let parsed: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => return vec![LiveEvent::Error(format!("malformed server message: {e}"))],
    };

    let mut events = Vec::new();

    let direct_audio = parsed.data.as_deref().and_then(decode_base64);
    if let Some(audio) = direct_audio {
        events.push(LiveEvent::Audio(audio));
    } else if let Some(content) = &parsed.server_content {
        if let Some(turn) = &content.model_turn {
            for part in &turn.parts {
                if let Some(inline) = &part.inline_data {
                    if let Some(audio) = decode_base64(&inline.data) {
                        events.push(LiveEvent::Audio(audio));
                        break;
                    }
                }
            }
            for part in &turn.parts {
                if let Some(text) = &part.text {
                    events.push(LiveEvent::Text(text.clone()));
                }
            }
        }
    }

    if let Some(tool_call) = parsed.tool_call {
        if !tool_call.function_calls.is_empty() {
            events.push(LiveEvent::ToolCall(tool_call.function_calls));
        }
    }

    if let Some(content) = &parsed.server_content {
        if content.turn_complete {
            events.push(LiveEvent::TurnComplete);
        }
    }

    events
}

fn decode_base64(data: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_data_field() {
        let pcm = vec![1u8, 2, 3, 4];
        let encoded = base64::engine::general_purpose::STANDARD.encode(&pcm);
        let text = json!({ "data": encoded }).to_string();
        let events = parse_server_message(&text);
        assert!(matches!(&events[0], LiveEvent::Audio(bytes) if *bytes == pcm));
    }

    #[test]
    fn prefers_direct_data_over_nested_inline_data() {
        let direct = vec![9u8, 9, 9];
        let nested = vec![1u8, 2, 3];
        let text = json!({
            "data": base64::engine::general_purpose::STANDARD.encode(&direct),
            "serverContent": {
                "modelTurn": {
                    "parts": [{ "inlineData": { "data": base64::engine::general_purpose::STANDARD.encode(&nested) } }],
                },
            },
        })
        .to_string();
        let events = parse_server_message(&text);
        assert!(matches!(&events[0], LiveEvent::Audio(bytes) if *bytes == direct));
    }

    #[test]
    fn parses_nested_inline_data_when_no_direct_field() {
        let nested = vec![5u8, 6, 7];
        let text = json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [{ "inlineData": { "data": base64::engine::general_purpose::STANDARD.encode(&nested) } }],
                },
            },
        })
        .to_string();
        let events = parse_server_message(&text);
        assert!(matches!(&events[0], LiveEvent::Audio(bytes) if *bytes == nested));
    }

    #[test]
    fn parses_turn_complete() {
        let text = json!({ "serverContent": { "turnComplete": true } }).to_string();
        let events = parse_server_message(&text);
        assert!(matches!(events.last(), Some(LiveEvent::TurnComplete)));
    }

    #[test]
    fn parses_tool_call() {
        let text = json!({
            "toolCall": {
                "functionCalls": [{ "id": "t1", "name": "control_home_assistant", "args": {} }],
            },
        })
        .to_string();
        let events = parse_server_message(&text);
        assert!(matches!(&events[0], LiveEvent::ToolCall(calls) if calls.len() == 1 && calls[0].id == "t1"));
    }

    #[test]
    fn parses_text_content() {
        let text = json!({
            "serverContent": {
                "modelTurn": { "parts": [{ "text": "hello" }] },
            },
        })
        .to_string();
        let events = parse_server_message(&text);
        assert!(matches!(&events[0], LiveEvent::Text(s) if s == "hello"));
    }
}
