//! Session engine integration tests against a mock host WebSocket.

use futures::{SinkExt, StreamExt};
use infermesh_core::{ChainId, SessionKey, SessionStatus, Timeouts};
use infermesh_crypto::{Address, KeyPair};
use infermesh_session::{
    Frame, FrameCodec, Session, SessionConfig, SessionError, SessionHandle, StreamItem,
    VectorSearchResult,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const CHAIN: u64 = 84532;
const SESSION: u64 = 7;

struct MockHost {
    key: KeyPair,
    chunks: Vec<String>,
    stall: bool,
}

impl MockHost {
    fn new(chunks: Vec<&str>) -> Self {
        Self { key: KeyPair::generate(), chunks: chunks.iter().map(|s| s.to_string()).collect(), stall: false }
    }

    fn stalling() -> Self {
        Self { key: KeyPair::generate(), chunks: Vec::new(), stall: true }
    }

    /// Bind, serve exactly one connection, and answer the protocol.
    async fn serve(self, client_address: Address, encrypted: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/ws", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let mut codec: Option<FrameCodec> = if encrypted {
                None // built from the first envelope's ephemeral key
            } else {
                Some(FrameCodec::plaintext(SESSION, self.key.clone(), client_address))
            };

            while let Some(Ok(message)) = ws.next().await {
                let WsMessage::Text(text) = message else { continue };
                if codec.is_none() {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    let ephemeral_hex = value["ephemeralPublicKeyHex"].as_str().unwrap();
                    let ephemeral = hex::decode(ephemeral_hex).unwrap();
                    let cipher =
                        infermesh_crypto::SessionCipher::respond(&self.key, &ephemeral).unwrap();
                    codec = Some(FrameCodec::encrypted(
                        SESSION,
                        cipher,
                        self.key.clone(),
                        client_address,
                    ));
                }
                let codec = codec.as_mut().unwrap();
                let frame = codec.decode(&text).unwrap();

                match frame {
                    Frame::SessionInit { session_id, .. } => {
                        let ready = Frame::SessionReady {
                            chain_id: CHAIN,
                            session_id,
                            server_version: "0.9.1".into(),
                            protocol_version: "1.0.0".into(),
                        };
                        ws.send(WsMessage::Text(codec.encode(&ready).unwrap())).await.unwrap();
                    }
                    Frame::Prompt { message_index, .. }
                    | Frame::PromptWithContext { message_index, .. } => {
                        if self.stall {
                            continue;
                        }
                        for token in &self.chunks {
                            let chunk = Frame::StreamChunk {
                                chain_id: CHAIN,
                                session_id: SESSION,
                                message_index,
                                token: token.clone(),
                                finish_reason: None,
                            };
                            ws.send(WsMessage::Text(codec.encode(&chunk).unwrap()))
                                .await
                                .unwrap();
                        }
                        let end = Frame::StreamEnd {
                            chain_id: CHAIN,
                            session_id: SESSION,
                            message_index,
                            total_tokens: self.chunks.len() as u64,
                        };
                        ws.send(WsMessage::Text(codec.encode(&end).unwrap())).await.unwrap();
                    }
                    Frame::UploadVectors { vectors, .. } => {
                        let ack = Frame::UploadVectorsAck {
                            chain_id: CHAIN,
                            session_id: SESSION,
                            uploaded: vectors.len() as u32,
                            status: "success".into(),
                            error: None,
                        };
                        ws.send(WsMessage::Text(codec.encode(&ack).unwrap())).await.unwrap();
                    }
                    Frame::SearchVectors { k, .. } => {
                        let results = (0..k.min(2))
                            .map(|i| VectorSearchResult {
                                id: format!("doc-{i}"),
                                score: 0.9 - i as f32 * 0.1,
                                metadata: Default::default(),
                            })
                            .collect();
                        let frame = Frame::SearchVectorsResult {
                            chain_id: CHAIN,
                            session_id: SESSION,
                            results,
                        };
                        ws.send(WsMessage::Text(codec.encode(&frame).unwrap())).await.unwrap();
                    }
                    Frame::SessionClose { .. } => break,
                    _ => {}
                }
            }
        });

        url
    }
}

async fn start_session(
    host: MockHost,
    encrypted: bool,
    timeouts: Timeouts,
) -> (SessionHandle, KeyPair) {
    let client = KeyPair::generate();
    let host_address = host.key.address();
    let host_public = *host.key.public_key();
    let url = host.serve(client.address(), encrypted).await;

    let mut config = SessionConfig::new(
        SessionKey::new(ChainId(CHAIN), SESSION),
        host_address,
        url,
    );
    config.model_name = "llama-3.1-8b".into();
    config.encryption = encrypted;
    config.host_public_key = encrypted.then_some(host_public);
    config.timeouts = timeouts;

    let handle = Session::start(config, client.clone(), None).await.unwrap();
    (handle, client)
}

async fn wait_for_status(handle: &SessionHandle, wanted: SessionStatus) {
    for _ in 0..100 {
        if handle.status() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session never reached {wanted}");
}

async fn collect_turn(stream: &mut tokio::sync::mpsc::Receiver<StreamItem>) -> (String, u64) {
    let mut text = String::new();
    while let Some(item) = stream.recv().await {
        match item {
            StreamItem::Token(token) => text.push_str(&token),
            StreamItem::Done { total_tokens } => return (text, total_tokens),
            StreamItem::Failed { code, message } => panic!("turn failed: {code} {message}"),
        }
    }
    panic!("stream ended without a terminal item");
}

#[tokio::test]
async fn test_plaintext_streaming_turn() {
    let host = MockHost::new(vec!["Hel", "lo ", "wor", "ld"]);
    let (handle, _) = start_session(host, false, Timeouts::default()).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    let (index, mut stream) = handle.prompt("Say hello").await.unwrap();
    assert_eq!(index, 0);
    let (text, total) = collect_turn(&mut stream).await;
    assert_eq!(text, "Hello world");
    assert_eq!(total, 4);

    // Message indexes advance by two per turn (user + assistant)
    let (index, mut stream) = handle.prompt("Again").await.unwrap();
    assert_eq!(index, 2);
    collect_turn(&mut stream).await;
}

#[tokio::test]
async fn test_encrypted_streaming_turn() {
    let host = MockHost::new(vec!["42"]);
    let (handle, _) = start_session(host, true, Timeouts::default()).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    let (_, mut stream) = handle.prompt("answer?").await.unwrap();
    let (text, total) = collect_turn(&mut stream).await;
    assert_eq!(text, "42");
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_vector_upload_and_search() {
    let host = MockHost::new(vec!["ok"]);
    let (handle, _) = start_session(host, false, Timeouts::default()).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    let vectors = vec![infermesh_session::VectorRecord {
        id: "doc-1".into(),
        vector: vec![0.0; 384],
        metadata: Default::default(),
    }];
    let uploaded = handle.upload_vectors(vectors, false).await.unwrap();
    assert_eq!(uploaded, 1);

    let results = handle.search_vectors(vec![0.0; 384], 2, 0.2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "doc-0");
}

#[tokio::test]
async fn test_stall_fails_the_session() {
    let mut timeouts = Timeouts::default();
    timeouts.stream_idle_secs = 1;
    let (handle, _) = start_session(MockHost::stalling(), false, timeouts).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    let (_, mut stream) = handle.prompt("hello?").await.unwrap();
    let item = tokio::time::timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("stall must surface within the idle window")
        .expect("terminal item expected");
    match item {
        StreamItem::Failed { code, .. } => assert_eq!(code, "STALL_ERROR"),
        other => panic!("expected failure, got {other:?}"),
    }
    wait_for_status(&handle, SessionStatus::Failed).await;
}

#[tokio::test]
async fn test_second_prompt_while_streaming_rejected() {
    // A single chunk per turn gives a window where the turn is open
    let host = MockHost::new(vec!["slow"]);
    let (handle, _) = start_session(host, false, Timeouts::default()).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    let (_, mut stream) = handle.prompt("one").await.unwrap();
    // The second prompt races the first turn's stream_end; accept
    // either an explicit rejection or a clean second turn.
    match handle.prompt("two").await {
        Err(SessionError::InvalidState { .. }) => {}
        Ok((_, mut second)) => {
            collect_turn(&mut second).await;
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
    collect_turn(&mut stream).await;
}

#[tokio::test]
async fn test_pause_blocks_prompts() {
    let host = MockHost::new(vec!["x"]);
    let (handle, _) = start_session(host, false, Timeouts::default()).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    handle.pause().await.unwrap();
    assert!(matches!(
        handle.prompt("nope").await,
        Err(SessionError::InvalidState { .. })
    ));
    handle.resume().await.unwrap();
    let (_, mut stream) = handle.prompt("yes").await.unwrap();
    collect_turn(&mut stream).await;
}

#[tokio::test]
async fn test_end_session_completes() {
    let host = MockHost::new(vec!["x"]);
    let (handle, _) = start_session(host, false, Timeouts::default()).await;
    wait_for_status(&handle, SessionStatus::Active).await;

    handle.end().await.unwrap();
    wait_for_status(&handle, SessionStatus::Completed).await;
    // The task has exited; new work is rejected
    assert!(handle.prompt("late").await.is_err());
}
