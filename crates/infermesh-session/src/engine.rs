//! The per-session state machine and its main task.
//!
//! One task owns the WebSocket and the in-memory state. Callers hold a
//! [`SessionHandle`] and talk to the task over a command channel;
//! stream tokens flow back over a bounded per-turn channel, lifecycle
//! events over a broadcast channel. Inbound frames are handled in
//! arrival order; `Draining` drops them silently; a fatal error closes
//! the socket, zeroizes the session key (cipher drop) and attempts
//! settlement opportunistically.

use crate::codec::FrameCodec;
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::frames::{Frame, PromptParameters, VectorRecord, VectorSearchResult};
use crate::payments::PaymentManager;
use futures::{SinkExt, StreamExt};
use infermesh_core::{SessionKey, SessionStatus, Timeouts};
use infermesh_crypto::{Address, KeyPair, SessionCipher};
use parking_lot::RwLock;
use secp256k1::PublicKey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything needed to open one session against one host.
#[derive(Clone)]
pub struct SessionConfig {
    pub key: SessionKey,
    /// On-chain job id backing this session.
    pub job_id: u64,
    pub model_name: String,
    /// Expected signer of host frames.
    pub host_address: Address,
    /// Full WebSocket URL, `{apiURL}/v1/ws`.
    pub host_ws_url: String,
    /// Host's static public key; required when `encryption` is on.
    pub host_public_key: Option<PublicKey>,
    /// Default true. Plaintext framing is for development only.
    pub encryption: bool,
    pub timeouts: Timeouts,
    pub default_parameters: PromptParameters,
}

impl SessionConfig {
    pub fn new(key: SessionKey, host_address: Address, host_ws_url: impl Into<String>) -> Self {
        Self {
            key,
            job_id: key.session_id,
            model_name: String::new(),
            host_address,
            host_ws_url: host_ws_url.into(),
            host_public_key: None,
            encryption: true,
            timeouts: Timeouts::default(),
            default_parameters: PromptParameters::default(),
        }
    }
}

/// One item of a streamed assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Token(String),
    Done { total_tokens: u64 },
    Failed { code: String, message: String },
}

enum Command {
    Prompt {
        content: String,
        context: Option<Vec<String>>,
        parameters: Option<PromptParameters>,
        sink: mpsc::Sender<StreamItem>,
        ack: oneshot::Sender<Result<u64>>,
    },
    UploadVectors {
        vectors: Vec<VectorRecord>,
        replace: bool,
        reply: oneshot::Sender<Result<u32>>,
    },
    SearchVectors {
        query: Vec<f32>,
        k: u32,
        threshold: f32,
        reply: oneshot::Sender<Result<Vec<VectorSearchResult>>>,
    },
    Pause { reply: oneshot::Sender<Result<()>> },
    Resume { reply: oneshot::Sender<Result<()>> },
    Close { reply: oneshot::Sender<Result<()>> },
}

/// Cloneable handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    key: SessionKey,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    status: Arc<RwLock<SessionStatus>>,
    timeouts: Timeouts,
}

impl SessionHandle {
    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current state; readable even after the task exited.
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Submit a prompt. Returns the assigned message index and the
    /// bounded token stream for this turn.
    pub async fn prompt(
        &self,
        content: impl Into<String>,
    ) -> Result<(u64, mpsc::Receiver<StreamItem>)> {
        self.prompt_inner(content.into(), None, None).await
    }

    /// Prompt with retrieval context lines prepended by the host.
    pub async fn prompt_with_context(
        &self,
        content: impl Into<String>,
        context: Vec<String>,
    ) -> Result<(u64, mpsc::Receiver<StreamItem>)> {
        self.prompt_inner(content.into(), Some(context), None).await
    }

    pub async fn prompt_with_parameters(
        &self,
        content: impl Into<String>,
        parameters: PromptParameters,
    ) -> Result<(u64, mpsc::Receiver<StreamItem>)> {
        self.prompt_inner(content.into(), None, Some(parameters)).await
    }

    async fn prompt_inner(
        &self,
        content: String,
        context: Option<Vec<String>>,
        parameters: Option<PromptParameters>,
    ) -> Result<(u64, mpsc::Receiver<StreamItem>)> {
        let (sink, stream) = mpsc::channel(64);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Prompt { content, context, parameters, sink, ack: ack_tx }).await?;
        let index = tokio::time::timeout(self.timeouts.prompt_send(), ack_rx)
            .await
            .map_err(|_| SessionError::Timeout("prompt send"))?
            .map_err(|_| SessionError::Closed)??;
        Ok((index, stream))
    }

    pub async fn upload_vectors(&self, vectors: Vec<VectorRecord>, replace: bool) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::UploadVectors { vectors, replace, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn search_vectors(
        &self,
        query: Vec<f32>,
        k: u32,
        threshold: f32,
    ) -> Result<Vec<VectorSearchResult>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SearchVectors { query, k, threshold, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn pause(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Pause { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn resume(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Resume { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// User-initiated close: drain, close the socket, settle on-chain.
    pub async fn end(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| SessionError::Closed)
    }
}

pub struct Session;

impl Session {
    /// Connect, perform the init handshake asynchronously, and hand
    /// back the handle. The session is `Claimed` until the host's
    /// `session_ready` arrives.
    pub async fn start(
        config: SessionConfig,
        signer: KeyPair,
        payments: Option<Arc<PaymentManager>>,
    ) -> Result<SessionHandle> {
        let codec = if config.encryption {
            let host_pk = config.host_public_key.ok_or_else(|| {
                SessionError::Validation("encrypted session requires the host public key".into())
            })?;
            let cipher = SessionCipher::initiate(&host_pk)?;
            FrameCodec::encrypted(config.key.session_id, cipher, signer, config.host_address)
        } else {
            FrameCodec::plaintext(config.key.session_id, signer, config.host_address)
        };

        let (ws, _) = tokio_tungstenite::connect_async(&config.host_ws_url)
            .await
            .map_err(|e| SessionError::Network(format!("{}: {e}", config.host_ws_url)))?;
        info!("session {} connected to {}", config.key, config.host_ws_url);

        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(256);
        let status = Arc::new(RwLock::new(SessionStatus::Claimed));
        let handle = SessionHandle {
            key: config.key,
            commands: command_tx,
            events: event_tx.clone(),
            status: status.clone(),
            timeouts: config.timeouts.clone(),
        };

        let task = SessionTask {
            config,
            codec,
            ws,
            commands: command_rx,
            events: event_tx,
            payments,
            status,
            next_message_index: 0,
            outstanding: None,
            pending_upload: None,
            pending_search: None,
            init_deadline: None,
            total_tokens: 0,
            chunk_count: 0,
        };
        tokio::spawn(task.run());
        Ok(handle)
    }
}

struct Outstanding {
    message_index: u64,
    sink: mpsc::Sender<StreamItem>,
    last_chunk_at: Instant,
}

struct PendingReply<T> {
    reply: oneshot::Sender<Result<T>>,
    deadline: Instant,
}

struct SessionTask {
    config: SessionConfig,
    codec: FrameCodec,
    ws: WsConn,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    payments: Option<Arc<PaymentManager>>,
    /// Shared with handles; this task is the single writer.
    status: Arc<RwLock<SessionStatus>>,
    next_message_index: u64,
    outstanding: Option<Outstanding>,
    pending_upload: Option<PendingReply<u32>>,
    pending_search: Option<PendingReply<Vec<VectorSearchResult>>>,
    init_deadline: Option<Instant>,
    total_tokens: u64,
    chunk_count: u64,
}

impl SessionTask {
    async fn run(mut self) {
        if let Err(e) = self.send_init().await {
            self.fail(e).await;
            return;
        }
        self.init_deadline = Some(Instant::now() + self.config.timeouts.session_init());

        let mut tick = tokio::time::interval(Duration::from_millis(250));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_command = self.commands.recv() => match maybe_command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            self.fail(e).await;
                            return;
                        }
                    }
                    None => {
                        // Every handle dropped: treat as a user close
                        self.drain("all handles dropped").await;
                        return;
                    }
                },
                maybe_message = self.ws.next() => match maybe_message {
                    Some(Ok(WsMessage::Text(text))) => {
                        if self.current() == SessionStatus::Draining {
                            continue;
                        }
                        let frame = match self.codec.decode(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                self.fail(e).await;
                                return;
                            }
                        };
                        if let Err(e) = self.handle_frame(frame).await {
                            self.fail(e).await;
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        if self.current() == SessionStatus::Draining {
                            self.finish_drain().await;
                        } else {
                            self.fail(SessionError::Network("host closed the socket".into()))
                                .await;
                        }
                        return;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: transport-level
                    Some(Err(e)) => {
                        self.fail(SessionError::Network(e.to_string())).await;
                        return;
                    }
                },
                _ = tick.tick() => {
                    if let Some(e) = self.check_deadlines() {
                        self.fail(e).await;
                        return;
                    }
                }
            }

            if self.current().is_terminal() {
                return;
            }
        }
    }

    async fn send_init(&mut self) -> Result<()> {
        let frame = Frame::SessionInit {
            chain_id: self.config.key.chain_id.as_u64(),
            session_id: self.config.key.session_id,
            job_id: self.config.job_id,
            model_name: self.config.model_name.clone(),
            encryption: self.codec.is_encrypted(),
        };
        self.send_frame(&frame).await
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let wire = self.codec.encode(frame)?;
        self.ws
            .send(WsMessage::Text(wire))
            .await
            .map_err(|e| SessionError::Network(e.to_string()))
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Prompt { content, context, parameters, sink, ack } => {
                if !self.current().accepts_prompts() {
                    let _ = ack.send(Err(SessionError::InvalidState {
                        operation: "prompt",
                        state: self.current(),
                    }));
                    return Ok(());
                }
                if self.outstanding.is_some() {
                    let _ = ack.send(Err(SessionError::InvalidState {
                        operation: "prompt (previous turn still streaming)",
                        state: self.current(),
                    }));
                    return Ok(());
                }
                let message_index = self.next_message_index;
                // Reserve the next index for the assistant's reply
                self.next_message_index += 2;
                let parameters = parameters.unwrap_or(self.config.default_parameters);
                let frame = match context {
                    Some(context) => Frame::PromptWithContext {
                        chain_id: self.config.key.chain_id.as_u64(),
                        session_id: self.config.key.session_id,
                        message_index,
                        content,
                        context,
                        parameters,
                    },
                    None => Frame::Prompt {
                        chain_id: self.config.key.chain_id.as_u64(),
                        session_id: self.config.key.session_id,
                        message_index,
                        content,
                        parameters,
                    },
                };
                self.send_frame(&frame).await?;
                self.outstanding =
                    Some(Outstanding { message_index, sink, last_chunk_at: Instant::now() });
                let _ = ack.send(Ok(message_index));
            }
            Command::UploadVectors { vectors, replace, reply } => {
                if self.current() != SessionStatus::Active {
                    let _ = reply.send(Err(SessionError::InvalidState {
                        operation: "upload_vectors",
                        state: self.current(),
                    }));
                    return Ok(());
                }
                if self.pending_upload.is_some() {
                    let _ = reply.send(Err(SessionError::InvalidState {
                        operation: "upload_vectors (one already in flight)",
                        state: self.current(),
                    }));
                    return Ok(());
                }
                let frame = Frame::UploadVectors {
                    chain_id: self.config.key.chain_id.as_u64(),
                    session_id: self.config.key.session_id,
                    vectors,
                    replace,
                };
                self.send_frame(&frame).await?;
                self.pending_upload = Some(PendingReply {
                    reply,
                    deadline: Instant::now() + self.config.timeouts.vector_upload(),
                });
            }
            Command::SearchVectors { query, k, threshold, reply } => {
                if self.current() != SessionStatus::Active {
                    let _ = reply.send(Err(SessionError::InvalidState {
                        operation: "search_vectors",
                        state: self.current(),
                    }));
                    return Ok(());
                }
                if self.pending_search.is_some() {
                    let _ = reply.send(Err(SessionError::InvalidState {
                        operation: "search_vectors (one already in flight)",
                        state: self.current(),
                    }));
                    return Ok(());
                }
                let frame = Frame::SearchVectors {
                    chain_id: self.config.key.chain_id.as_u64(),
                    session_id: self.config.key.session_id,
                    query_vector: query,
                    k,
                    threshold,
                };
                self.send_frame(&frame).await?;
                self.pending_search = Some(PendingReply {
                    reply,
                    deadline: Instant::now() + self.config.timeouts.vector_search(),
                });
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.transition(SessionStatus::Paused));
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.transition(SessionStatus::Active));
            }
            Command::Close { reply } => {
                self.drain("user close").await;
                let _ = reply.send(Ok(()));
            }
        }
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::SessionReady { server_version, .. } => {
                if self.current() != SessionStatus::Claimed {
                    return Err(SessionError::Protocol(format!(
                        "session_ready in state {}",
                        self.current()
                    )));
                }
                self.init_deadline = None;
                self.transition(SessionStatus::Active)?;
                let _ = self.events.send(SessionEvent::Ready { server_version });
            }
            Frame::StreamChunk { message_index, token, finish_reason, .. } => {
                let Some(outstanding) = self.outstanding.as_mut() else {
                    return Err(SessionError::Protocol(format!(
                        "stream_chunk {message_index} with no outstanding turn"
                    )));
                };
                if outstanding.message_index != message_index {
                    return Err(SessionError::Protocol(format!(
                        "stream_chunk index {message_index}, expected {}",
                        outstanding.message_index
                    )));
                }
                outstanding.last_chunk_at = Instant::now();
                self.chunk_count += 1;
                // A dropped receiver means the caller abandoned the turn
                if outstanding.sink.send(StreamItem::Token(token.clone())).await.is_err() {
                    debug!("turn {} abandoned by caller", message_index);
                }
                let _ = self.events.send(SessionEvent::Chunk { message_index, token });
                if finish_reason.is_some() {
                    debug!("turn {} finish reason received", message_index);
                }
            }
            Frame::StreamEnd { message_index, total_tokens, .. } => {
                let Some(outstanding) = self.outstanding.take() else {
                    return Err(SessionError::Protocol(
                        "stream_end with no outstanding turn".into(),
                    ));
                };
                if outstanding.message_index != message_index {
                    return Err(SessionError::Protocol(format!(
                        "stream_end index {message_index}, expected {}",
                        outstanding.message_index
                    )));
                }
                self.total_tokens = total_tokens;
                let _ = outstanding.sink.send(StreamItem::Done { total_tokens }).await;
                let _ = self.events.send(SessionEvent::StreamEnd { message_index, total_tokens });
            }
            Frame::UploadVectorsAck { uploaded, status, error, .. } => {
                let Some(pending) = self.pending_upload.take() else {
                    return Err(SessionError::Protocol("unexpected upload_vectors_ack".into()));
                };
                let result = if status == "success" {
                    Ok(uploaded)
                } else {
                    Err(SessionError::Host {
                        code: "UPLOAD_FAILED".into(),
                        message: error.unwrap_or_default(),
                        retryable: false,
                    })
                };
                let _ = pending.reply.send(result);
            }
            Frame::SearchVectorsResult { results, .. } => {
                let Some(pending) = self.pending_search.take() else {
                    return Err(SessionError::Protocol("unexpected search_vectors_result".into()));
                };
                let _ = pending.reply.send(Ok(results));
            }
            Frame::CheckpointNotice {
                checkpoint_index, proof_hash_hex, token_range_end, ..
            } => {
                let _ = self.events.send(SessionEvent::CheckpointNotice {
                    checkpoint_index,
                    proof_hash_hex,
                    token_range_end,
                });
            }
            Frame::Error { code, message, retryable, .. } => {
                let _ = self.events.send(SessionEvent::HostError {
                    code: code.clone(),
                    message: message.clone(),
                    retryable,
                });
                if !retryable {
                    return Err(SessionError::Host { code, message, retryable });
                }
                warn!("session {}: retryable host error {}: {}", self.config.key, code, message);
            }
            Frame::SessionClose { .. } => {
                self.drain("host close").await;
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "unexpected `{}` frame from host",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    fn check_deadlines(&mut self) -> Option<SessionError> {
        if let Some(deadline) = self.init_deadline {
            if Instant::now() >= deadline {
                return Some(SessionError::Timeout("session_ready"));
            }
        }
        if let Some(outstanding) = &self.outstanding {
            if outstanding.last_chunk_at.elapsed() >= self.config.timeouts.stream_idle() {
                return Some(SessionError::Stall);
            }
        }
        if self.pending_upload.as_ref().is_some_and(|p| Instant::now() >= p.deadline) {
            if let Some(pending) = self.pending_upload.take() {
                let _ = pending.reply.send(Err(SessionError::Timeout("upload_vectors")));
            }
        }
        if self.pending_search.as_ref().is_some_and(|p| Instant::now() >= p.deadline) {
            if let Some(pending) = self.pending_search.take() {
                let _ = pending.reply.send(Err(SessionError::Timeout("search_vectors")));
            }
        }
        None
    }

    fn current(&self) -> SessionStatus {
        *self.status.read()
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        let current = self.current();
        if !current.can_transition(next) {
            return Err(SessionError::InvalidState { operation: "transition", state: current });
        }
        *self.status.write() = next;
        let _ = self.events.send(SessionEvent::StatusChanged(next));
        Ok(())
    }

    /// `Active -> Draining -> Completed`: best-effort close frame,
    /// socket close, on-chain settlement.
    async fn drain(&mut self, reason: &str) {
        if self.current().is_terminal() {
            return;
        }
        if self.current() != SessionStatus::Active {
            // Only an active session drains cleanly; closing earlier or
            // while paused aborts instead.
            self.fail(SessionError::Closed).await;
            return;
        }
        info!(
            "session {} draining ({reason}); {} chunks, {} tokens streamed",
            self.config.key, self.chunk_count, self.total_tokens
        );
        let _ = self.transition(SessionStatus::Draining);
        let close = Frame::SessionClose {
            chain_id: self.config.key.chain_id.as_u64(),
            session_id: self.config.key.session_id,
        };
        if let Err(e) = self.send_frame(&close).await {
            debug!("close frame not delivered: {e}");
        }
        let _ = self.ws.close(None).await;
        self.finish_drain().await;
    }

    async fn finish_drain(&mut self) {
        if let Some(outstanding) = self.outstanding.take() {
            let _ = outstanding
                .sink
                .send(StreamItem::Failed {
                    code: "SESSION_CLOSED".into(),
                    message: "session drained mid-turn".into(),
                })
                .await;
        }
        let settled = match &self.payments {
            Some(payments) => payments.settle(self.config.key.session_id).await.is_ok(),
            None => true,
        };
        if settled {
            let _ = self.transition(SessionStatus::Completed);
        } else {
            *self.status.write() = SessionStatus::Failed;
            let _ = self.events.send(SessionEvent::StatusChanged(SessionStatus::Failed));
        }
        let _ = self.events.send(SessionEvent::Closed { reason: "drained".into() });
    }

    /// Fatal path: any state may fail; `Failed -> Completed` never
    /// happens, but proven work stays settleable.
    async fn fail(&mut self, error: SessionError) {
        if self.current().is_terminal() {
            return;
        }
        warn!("session {} failed: {} ({})", self.config.key, error, error.code());
        if let Some(outstanding) = self.outstanding.take() {
            let _ = outstanding
                .sink
                .send(StreamItem::Failed {
                    code: error.code().into(),
                    message: error.to_string(),
                })
                .await;
        }
        if let Some(pending) = self.pending_upload.take() {
            let _ = pending.reply.send(Err(SessionError::Closed));
        }
        if let Some(pending) = self.pending_search.take() {
            let _ = pending.reply.send(Err(SessionError::Closed));
        }
        *self.status.write() = SessionStatus::Failed;
        let _ = self.events.send(SessionEvent::StatusChanged(SessionStatus::Failed));
        let _ = self.ws.close(None).await;
        if let Some(payments) = &self.payments {
            // Opportunistic: proven tokens settle correctly even now
            if let Err(e) = payments.settle(self.config.key.session_id).await {
                debug!("opportunistic settlement failed: {e}");
            }
        }
        let _ = self.events.send(SessionEvent::Closed { reason: error.code().into() });
    }
}
