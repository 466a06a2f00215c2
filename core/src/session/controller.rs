//! The session controller (C4): owns the live-model session for one edge
//! connection and runs its send-loop, receive-loop, and tool-call fan-out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::live::{LiveEvent, LiveSession};
use super::prompt::build_system_prompt;
use super::tools::{self, FunctionCall, FunctionResponse};
use crate::audio;
use crate::config::{Settings, MODEL_OUTPUT_SAMPLE_RATE_HZ};
use crate::home_assistant::{build_context_lines, HomeAssistantClient};

/// Capacity of the bounded input-audio queue. Beyond this, `enqueue_audio`
/// and `end_user_turn` drop the oldest queued chunk rather than wait.
const INPUT_QUEUE_CAPACITY: usize = 50;

/// Callbacks the session controller invokes to deliver resampled model
/// audio to whatever is driving the edge protocol on the other side.
///
/// `on_output_start` is called exactly once per model turn before any
/// `on_output_chunk`, and `on_output_stop` exactly once when that turn's
/// output stream closes (turn-complete, stop, or session error).
#[async_trait]
pub trait OutputCallbacks: Send + Sync {
    /// The first audio byte of a model turn is about to be delivered.
    async fn on_output_start(&self, rate_hz: u32);
    /// One block of resampled model audio, including the first.
    async fn on_output_chunk(&self, pcm16: Vec<u8>, rate_hz: u32);
    /// The model turn's output stream has closed.
    async fn on_output_stop(&self);
}

/// A bounded FIFO with drop-oldest semantics: pushing past capacity pops
/// the front element first. `tokio::sync::mpsc` has no such "force-push",
/// so this is a small `Mutex<VecDeque<_>>` plus a `Notify` to wake waiters,
/// the same shape the teacher reaches for when a channel's built-in
/// backpressure isn't the policy it wants.
struct InputQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl InputQueue {
    fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new() }
    }

    fn push(&self, chunk: Vec<u8>) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(chunk);
        drop(guard);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Vec<u8> {
        loop {
            if let Some(chunk) = self.inner.lock().pop_front() {
                return chunk;
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Owns one edge connection's live-model session: the input queue, the
/// barge-in/output-stream flags, and the background task that runs the
/// send-loop and receive-loop. Exclusively owned by the edge adapter for
/// the lifetime of that connection.
pub struct SessionController {
    settings: Settings,
    ha: Arc<HomeAssistantClient>,
    callbacks: Arc<dyn OutputCallbacks>,
    input_queue: InputQueue,
    barge_in: AtomicBool,
    last_input_ts: Mutex<Instant>,
    input_rate_hz: AtomicU32,
    stop_token: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    /// Builds a controller for one edge connection. Nothing runs until the
    /// first `ensure_running`, `enqueue_audio`, or `end_user_turn` call.
    #[must_use]
    pub fn new(
        settings: Settings,
        ha: Arc<HomeAssistantClient>,
        callbacks: Arc<dyn OutputCallbacks>,
    ) -> Arc<Self> {
        let input_rate_hz = settings.input_sample_rate_hz;
        Arc::new(Self {
            settings,
            ha,
            callbacks,
            input_queue: InputQueue::new(INPUT_QUEUE_CAPACITY),
            barge_in: AtomicBool::new(false),
            last_input_ts: Mutex::new(Instant::now()),
            input_rate_hz: AtomicU32::new(input_rate_hz),
            stop_token: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        })
    }

    /// Whether the background session task is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Idempotently spawns the session task if it isn't already running.
    pub async fn ensure_running(self: &Arc<Self>) {
        {
            let guard = self.task.lock();
            if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
                return;
            }
        }

        let token = CancellationToken::new();
        *self.stop_token.lock() = token.clone();

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_session(token).await });
        *self.task.lock() = Some(handle);
    }

    /// Resamples to the configured input rate if needed, then enqueues
    /// (drop-oldest on overflow). Clears barge-in: new user audio means
    /// the user is actively speaking.
    pub async fn enqueue_audio(self: &Arc<Self>, pcm16: Vec<u8>, src_rate_hz: u32) {
        self.ensure_running().await;
        *self.last_input_ts.lock() = Instant::now();
        self.input_rate_hz.store(src_rate_hz, Ordering::Relaxed);
        self.barge_in.store(false, Ordering::SeqCst);

        let pcm16 = if src_rate_hz == self.settings.input_sample_rate_hz {
            pcm16
        } else {
            audio::resample(&pcm16, src_rate_hz, self.settings.input_sample_rate_hz)
        };
        self.input_queue.push(pcm16);
    }

    /// Appends the silence tail so the remote model's VAD can close the
    /// user's turn.
    pub async fn end_user_turn(self: &Arc<Self>) {
        self.ensure_running().await;
        for chunk in audio::silence_chunks(
            i64::from(self.settings.silence_tail_ms),
            self.settings.input_sample_rate_hz,
            self.settings.audio_chunk_size,
        ) {
            self.input_queue.push(chunk);
        }
    }

    /// Records the edge's declared input rate and sets barge-in: a fresh
    /// audio-start means new user speech may be about to interrupt the
    /// model. The rate is informational here — `enqueue_audio` re-derives
    /// it per chunk — but is recorded up front to match the edge event it
    /// accompanies.
    pub fn notify_audio_start(&self, rate_hz: u32) {
        self.input_rate_hz.store(rate_hz, Ordering::Relaxed);
        self.barge_in.store(true, Ordering::SeqCst);
    }

    /// Signals the session task to stop and awaits its termination.
    pub async fn stop(self: &Arc<Self>) {
        self.stop_token.lock().clone().cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run_session(self: Arc<Self>, token: CancellationToken) {
        if !self.settings.has_api_key() {
            log::error!("gemini_api_key is not set; cannot start live session");
            return;
        }

        let ha = Arc::clone(&self.ha);
        let context_lines = build_context_lines(
            || async move { ha.get_states().await },
            &self.settings.allowed_domains,
            &self.settings.entity_allowlist,
            &self.settings.entity_blocklist,
            self.settings.max_context_entities,
        )
        .await;
        let system_prompt = build_system_prompt(&context_lines);
        let tool_declarations = tools::tool_declarations();

        let (live_session, events) =
            match LiveSession::connect(&self.settings, &system_prompt, tool_declarations).await {
                Ok(pair) => pair,
                Err(e) => {
                    log::error!("failed to open live session: {e}");
                    return;
                }
            };
        let live_session = Arc::new(live_session);

        let send_handle =
            tokio::spawn(Self::send_loop(Arc::clone(&self), Arc::clone(&live_session), token.clone()));
        let mut recv_handle = tokio::spawn(Self::receive_loop(
            Arc::clone(&self),
            Arc::clone(&live_session),
            events,
            token.clone(),
        ));

        // Either an explicit stop() cancels the token, or the receive-loop
        // ends on its own (graceful close / fatal error) — both mean this
        // task should wind down so the next ensure_running() can retry.
        // `recv_handle` must not be awaited again once the `_ = &mut recv_handle`
        // arm below has already polled it to completion.
        tokio::select! {
            () = token.cancelled() => {
                send_handle.abort();
                recv_handle.abort();
                let _ = send_handle.await;
                let _ = recv_handle.await;
            }
            _ = &mut recv_handle => {
                send_handle.abort();
                let _ = send_handle.await;
            }
        }
        live_session.close().await;
    }

    async fn send_loop(self: Arc<Self>, session: Arc<LiveSession>, token: CancellationToken) {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                chunk = self.input_queue.pop() => {
                    if session.send_audio(chunk).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn receive_loop(
        self: Arc<Self>,
        session: Arc<LiveSession>,
        mut events: mpsc::Receiver<LiveEvent>,
        token: CancellationToken,
    ) {
        let mut output_stream_open = false;
        self.barge_in.store(false, Ordering::SeqCst);

        loop {
            let event = tokio::select! {
                () = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                LiveEvent::Audio(bytes) => {
                    if self.barge_in.load(Ordering::SeqCst) {
                        continue;
                    }
                    if !output_stream_open {
                        self.callbacks.on_output_start(self.settings.output_sample_rate_hz).await;
                        output_stream_open = true;
                    }
                    let resampled =
                        audio::resample(&bytes, MODEL_OUTPUT_SAMPLE_RATE_HZ, self.settings.output_sample_rate_hz);
                    self.callbacks.on_output_chunk(resampled, self.settings.output_sample_rate_hz).await;
                }
                LiveEvent::Text(text) => {
                    log::debug!("model text: {text}");
                }
                LiveEvent::ToolCall(calls) => {
                    self.handle_tool_calls(&session, calls).await;
                }
                LiveEvent::TurnComplete => {
                    if output_stream_open {
                        self.callbacks.on_output_stop().await;
                        output_stream_open = false;
                    }
                    self.barge_in.store(false, Ordering::SeqCst);
                }
                LiveEvent::ClosedGracefully => break,
                LiveEvent::Error(e) => {
                    log::error!("live session error: {e}");
                    break;
                }
            }
        }

        if output_stream_open {
            self.callbacks.on_output_stop().await;
        }
    }

    async fn handle_tool_calls(&self, session: &LiveSession, calls: Vec<FunctionCall>) {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            let response = if call.name != tools::CONTROL_HOME_ASSISTANT {
                FunctionResponse::unknown_tool(&call)
            } else {
                self.execute_control_home_assistant(&call).await
            };
            responses.push(response);
        }
        if let Err(e) = session.send_tool_response(responses).await {
            log::error!("failed to send tool response: {e}");
        }
    }

    async fn execute_control_home_assistant(&self, call: &FunctionCall) -> FunctionResponse {
        match parse_control_home_assistant_args(&call.args) {
            ParsedArgs::Invalid => FunctionResponse {
                id: call.id.clone(),
                name: tools::CONTROL_HOME_ASSISTANT.to_string(),
                response: serde_json::json!({
                    "ok": false,
                    "result": "Invalid tool args (expected object)",
                }),
            },
            ParsedArgs::Valid { domain, service, data } => {
                let (ok, result) = self.ha.call_service(&domain, &service, data).await;
                FunctionResponse::control_home_assistant(&call.id, ok, &result)
            }
        }
    }
}

enum ParsedArgs {
    Invalid,
    Valid { domain: String, service: String, data: Value },
}

/// Normalizes one `control_home_assistant` call's arguments: trims
/// `domain`/`service`/`entity_id`, and — if `service_data_json` parses as a
/// JSON object — merges it into the service-call data. A malformed
/// `service_data_json` is silently ignored rather than failing the call.
fn parse_control_home_assistant_args(args: &Value) -> ParsedArgs {
    let Some(obj) = args.as_object() else {
        return ParsedArgs::Invalid;
    };

    let domain = obj.get("domain").and_then(Value::as_str).unwrap_or("").trim().to_string();
    let service = obj.get("service").and_then(Value::as_str).unwrap_or("").trim().to_string();
    let entity_id = obj.get("entity_id").and_then(Value::as_str).unwrap_or("").trim().to_string();

    let mut data = serde_json::Map::new();
    if !entity_id.is_empty() {
        data.insert("entity_id".to_string(), Value::String(entity_id));
    }
    if let Some(extra_json) = obj.get("service_data_json").and_then(Value::as_str) {
        if !extra_json.trim().is_empty() {
            if let Ok(Value::Object(extra)) = serde_json::from_str::<Value>(extra_json) {
                data.extend(extra);
            }
        }
    }

    ParsedArgs::Valid { domain, service, data: Value::Object(data) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;

    struct NoopCallbacks;

    #[async_trait]
    impl OutputCallbacks for NoopCallbacks {
        async fn on_output_start(&self, _rate_hz: u32) {}
        async fn on_output_chunk(&self, _pcm16: Vec<u8>, _rate_hz: u32) {}
        async fn on_output_stop(&self) {}
    }

    fn controller() -> Arc<SessionController> {
        let ha = Arc::new(HomeAssistantClient::new(Client::new(), "", ""));
        SessionController::new(Settings::default(), ha, Arc::new(NoopCallbacks))
    }

    #[test]
    fn input_queue_drops_oldest_past_capacity() {
        let queue = InputQueue::new(2);
        queue.push(vec![1]);
        queue.push(vec![2]);
        queue.push(vec![3]);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn input_queue_pops_fifo_order() {
        let queue = InputQueue::new(4);
        queue.push(vec![1]);
        queue.push(vec![2]);
        assert_eq!(queue.pop().await, vec![1]);
        assert_eq!(queue.pop().await, vec![2]);
    }

    #[tokio::test]
    async fn input_queue_full_drops_head_keeps_capacity() {
        let queue = InputQueue::new(50);
        for i in 0..51u8 {
            queue.push(vec![i]);
        }
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.pop().await, vec![1]);
    }

    #[tokio::test]
    async fn ensure_running_without_api_key_leaves_controller_re_runnable() {
        let controller = controller();
        controller.ensure_running().await;
        controller.ensure_running().await;
        // No api key means run_session logs and returns almost immediately;
        // give the spawned task a chance to finish before asserting.
        for _ in 0..50 {
            if !controller.is_running() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn stop_is_safe_when_never_started() {
        let controller = controller();
        controller.stop().await;
        assert!(!controller.is_running());
    }

    #[test]
    fn parses_valid_args_with_entity_id() {
        let args = json!({ "domain": " light ", "service": " turn_on ", "entity_id": "light.kitchen" });
        match parse_control_home_assistant_args(&args) {
            ParsedArgs::Valid { domain, service, data } => {
                assert_eq!(domain, "light");
                assert_eq!(service, "turn_on");
                assert_eq!(data, json!({ "entity_id": "light.kitchen" }));
            }
            ParsedArgs::Invalid => panic!("expected valid args"),
        }
    }

    #[test]
    fn merges_service_data_json() {
        let args = json!({
            "domain": "light",
            "service": "turn_on",
            "entity_id": "light.k",
            "service_data_json": "{\"brightness\":128}",
        });
        match parse_control_home_assistant_args(&args) {
            ParsedArgs::Valid { data, .. } => {
                assert_eq!(data, json!({ "entity_id": "light.k", "brightness": 128 }));
            }
            ParsedArgs::Invalid => panic!("expected valid args"),
        }
    }

    #[test]
    fn malformed_service_data_json_is_ignored() {
        let args = json!({
            "domain": "light",
            "service": "turn_on",
            "service_data_json": "not json",
        });
        match parse_control_home_assistant_args(&args) {
            ParsedArgs::Valid { data, .. } => assert_eq!(data, json!({})),
            ParsedArgs::Invalid => panic!("expected valid args"),
        }
    }

    #[test]
    fn non_object_args_is_invalid() {
        assert!(matches!(parse_control_home_assistant_args(&Value::Null), ParsedArgs::Invalid));
    }
}
