//! Long-connection transport: receives platform events over a WebSocket.
//!
//! The connection runs on its own OS thread with a current-thread runtime. The
//! only thing it does with a message event is hand it to the consumer queue.

use super::api::LarkClientConfig;
use super::events::{EventEnvelope, EventKind, InboundEvent};
use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const METHOD_CONTROL: i32 = 0;
const METHOD_DATA: i32 = 1;

/// Protobuf header pair (`pbbp2.Header`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct Header {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, required, tag = "2")]
    pub value: String,
}

/// Protobuf frame (`pbbp2.Frame`) carried in every binary WebSocket message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Frame {
    #[prost(uint64, required, tag = "1")]
    pub seq_id: u64,
    #[prost(uint64, required, tag = "2")]
    pub log_id: u64,
    #[prost(int32, required, tag = "3")]
    pub service: i32,
    /// 0 = control, 1 = data.
    #[prost(int32, required, tag = "4")]
    pub method: i32,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<Header>,
    #[prost(string, optional, tag = "6")]
    pub payload_encoding: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub payload_type: Option<String>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub payload: Option<Vec<u8>>,
    #[prost(string, optional, tag = "9")]
    pub log_id_new: Option<String>,
}

impl Frame {
    pub fn ping(service_id: i32) -> Self {
        Self {
            service: service_id,
            method: METHOD_CONTROL,
            headers: vec![Header {
                key: "type".to_string(),
                value: "ping".to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    fn header_num(&self, key: &str) -> usize {
        self.header(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// Echo of this frame carrying the handler's status code and the time spent.
    pub fn ack(&self, code: u16, elapsed_ms: u128) -> Self {
        let mut frame = self.clone();
        frame.payload = Some(
            json!({ "code": code, "headers": {}, "data": null })
                .to_string()
                .into_bytes(),
        );
        frame.headers.push(Header {
            key: "biz_rt".to_string(),
            value: elapsed_ms.to_string(),
        });
        frame
    }
}

/// Server-tunable connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClientConfig {
    pub reconnect_count: i64,
    /// Seconds.
    pub reconnect_interval: u64,
    pub reconnect_nonce: u64,
    /// Seconds.
    pub ping_interval: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_count: -1,
            reconnect_interval: 120,
            reconnect_nonce: 30,
            ping_interval: 120,
        }
    }
}

impl ClientConfig {
    fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_interval.max(1))
    }
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<EndpointData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EndpointData {
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(default)]
    client_config: Option<ClientConfig>,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: url::Url,
    pub service_id: i32,
    pub client_config: ClientConfig,
}

/// Ask the platform for a connection URL.
pub async fn fetch_endpoint(http: &reqwest::Client, config: &LarkClientConfig) -> Result<Endpoint> {
    let url = format!(
        "{}/callback/ws/endpoint",
        config.domain.trim_end_matches('/')
    );
    let resp: EndpointResponse = http
        .post(&url)
        .header("locale", "zh")
        .json(&json!({ "AppID": config.app_id, "AppSecret": config.app_secret }))
        .send()
        .await
        .context("endpoint request failed")?
        .json()
        .await
        .context("malformed endpoint response")?;

    if resp.code != 0 {
        bail!("endpoint request rejected: code={}, msg={}", resp.code, resp.msg);
    }
    let data = resp.data.context("endpoint response missing data")?;
    let url = url::Url::parse(&data.url).context("invalid endpoint URL")?;
    Ok(Endpoint {
        service_id: service_id(&url),
        url,
        client_config: data.client_config.unwrap_or_default(),
    })
}

/// `service_id` query parameter of the connection URL, 0 when absent.
pub fn service_id(url: &url::Url) -> i32 {
    url.query_pairs()
        .find(|(k, _)| k == "service_id")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or_default()
}

/// Upper bound on the part count of one split payload.
const MAX_FRAGMENTS: usize = 64;
/// Incomplete payloads tracked at once; the oldest is dropped beyond this.
const MAX_PENDING: usize = 32;
/// Parts older than this are discarded.
const FRAGMENT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct PendingPayload {
    first_seen: Instant,
    parts: Vec<Option<Vec<u8>>>,
}

/// Reassembles payloads the server split across several frames.
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    pending: HashMap<String, PendingPayload>,
}

impl FragmentBuffer {
    /// Store part `seq` of `sum`; returns the joined payload once every part arrived.
    pub fn combine(
        &mut self,
        message_id: &str,
        sum: usize,
        seq: usize,
        payload: Vec<u8>,
    ) -> Option<Vec<u8>> {
        self.combine_at(Instant::now(), message_id, sum, seq, payload)
    }

    fn combine_at(
        &mut self,
        now: Instant,
        message_id: &str,
        sum: usize,
        seq: usize,
        payload: Vec<u8>,
    ) -> Option<Vec<u8>> {
        if sum > MAX_FRAGMENTS {
            warn!(
                "fragment count {} for {} exceeds {}, dropping",
                sum, message_id, MAX_FRAGMENTS
            );
            return None;
        }
        if seq >= sum {
            warn!("fragment {} out of range for {} (sum {})", seq, message_id, sum);
            return None;
        }

        self.pending
            .retain(|_, p| now.saturating_duration_since(p.first_seen) < FRAGMENT_TTL);
        if !self.pending.contains_key(message_id) {
            while self.pending.len() >= MAX_PENDING {
                let oldest = self
                    .pending
                    .iter()
                    .min_by_key(|(_, p)| p.first_seen)
                    .map(|(id, _)| id.clone());
                let Some(oldest) = oldest else { break };
                debug!("dropping incomplete Feishu payload {}", oldest);
                self.pending.remove(&oldest);
            }
        }

        let entry = self
            .pending
            .entry(message_id.to_string())
            .or_insert_with(|| PendingPayload {
                first_seen: now,
                parts: vec![None; sum],
            });
        if entry.parts.len() != sum {
            entry.parts = vec![None; sum];
        }
        entry.parts[seq] = Some(payload);
        if entry.parts.iter().any(Option::is_none) {
            return None;
        }
        self.pending
            .remove(message_id)
            .map(|p| p.parts.into_iter().flatten().flatten().collect())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Maps event envelopes to handlers. Message events are queued for the consumer.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<InboundEvent>,
}

impl EventDispatcher {
    pub fn new(tx: mpsc::Sender<InboundEvent>) -> Self {
        Self { tx }
    }

    /// Handle one event payload and return the status code acknowledged to the server.
    pub async fn dispatch(&self, payload: &[u8]) -> u16 {
        let envelope = match EventEnvelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping Feishu event: {:#}", e);
                return 500;
            }
        };
        let Some(kind) = envelope.kind() else {
            warn!(
                "processor not found for Feishu event type: {}",
                envelope.header.event_type
            );
            return 500;
        };

        match kind {
            EventKind::MessageReceive => {
                let event = match InboundEvent::from_receive_event(&envelope.event) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("dropping Feishu message event: {:#}", e);
                        return 500;
                    }
                };
                // waits for queue space, never for processing
                if self.tx.send(event).await.is_err() {
                    warn!("Feishu event queue closed, dropping message event");
                }
            }
            EventKind::MessageRead
            | EventKind::ReactionCreated
            | EventKind::ReactionDeleted
            | EventKind::BotP2pChatEntered
            | EventKind::TaskUpdateTenant => {
                debug!("ignoring Feishu event {}", kind.event_type());
            }
        }
        200
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Owns the long connection. Runs until the shutdown signal flips to `true`.
pub struct WsWorker {
    config: LarkClientConfig,
    dispatcher: EventDispatcher,
    shutdown: watch::Receiver<bool>,
    client_config: ClientConfig,
}

impl WsWorker {
    pub fn new(
        config: LarkClientConfig,
        dispatcher: EventDispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            shutdown,
            client_config: ClientConfig::default(),
        }
    }

    /// Start the worker on a dedicated thread hosting its own runtime.
    pub fn spawn(self) -> Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("feishu-ws".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("failed to build Feishu websocket runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(self.run());
            })
            .context("failed to spawn Feishu websocket thread")
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn run(mut self) {
        let http = match reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
        {
            Ok(http) => http,
            Err(e) => {
                error!("failed to build Feishu endpoint client: {}", e);
                return;
            }
        };

        while !self.stopping() {
            match fetch_endpoint(&http, &self.config).await {
                Ok(endpoint) => {
                    self.client_config = endpoint.client_config.clone();
                    match self.session(&endpoint).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Disconnected) => {
                            info!("Feishu websocket disconnected");
                        }
                        Err(e) => error!("Feishu websocket error: {:#}", e),
                    }
                }
                Err(e) => error!("failed to get Feishu websocket endpoint: {:#}", e),
            }

            let delay = Duration::from_secs(self.client_config.reconnect_interval);
            warn!("reconnecting to Feishu in {} seconds", delay.as_secs());
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }
        info!("Feishu websocket worker stopped");
    }

    async fn session(&mut self, endpoint: &Endpoint) -> Result<SessionEnd> {
        let (stream, _) = tokio_tungstenite::connect_async(endpoint.url.as_str())
            .await
            .context("websocket connect failed")?;
        info!("connected to Feishu long connection (service {})", endpoint.service_id);
        let (mut write, mut read) = stream.split();
        let mut fragments = FragmentBuffer::default();
        let mut ping = tokio::time::interval(self.client_config.ping_period());

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("close frame not sent: {}", e);
                        }
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                _ = ping.tick() => {
                    let frame = Frame::ping(endpoint.service_id);
                    write
                        .send(Message::binary(frame.encode_to_vec()))
                        .await
                        .context("ping failed")?;
                }
                msg = read.next() => {
                    let data = match msg {
                        Some(Ok(Message::Binary(data))) => data,
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await.context("pong failed")?;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Disconnected),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("websocket read failed"),
                    };
                    let frame = match Frame::decode(data.as_ref()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("undecodable Feishu frame: {}", e);
                            continue;
                        }
                    };
                    if frame.method == METHOD_CONTROL {
                        if self.handle_control(&frame) {
                            ping = tokio::time::interval(self.client_config.ping_period());
                            ping.reset();
                        }
                    } else if frame.method == METHOD_DATA
                        && let Some(ack) = self.handle_data(frame, &mut fragments).await
                    {
                        write
                            .send(Message::binary(ack.encode_to_vec()))
                            .await
                            .context("ack failed")?;
                    }
                }
            }
        }
    }

    /// Returns true when a pong changed the ping interval.
    fn handle_control(&mut self, frame: &Frame) -> bool {
        if frame.header("type") != Some("pong") {
            return false;
        }
        let Some(payload) = frame.payload.as_deref().filter(|p| !p.is_empty()) else {
            return false;
        };
        match serde_json::from_slice::<ClientConfig>(payload) {
            Ok(config) => {
                let changed = config.ping_interval != self.client_config.ping_interval;
                self.client_config = config;
                changed
            }
            Err(e) => {
                debug!("ignoring pong payload: {}", e);
                false
            }
        }
    }

    async fn handle_data(&self, frame: Frame, fragments: &mut FragmentBuffer) -> Option<Frame> {
        let started = Instant::now();
        let payload = frame.payload.clone().unwrap_or_default();
        let sum = frame.header_num("sum");
        let payload = if sum > 1 {
            let message_id = frame.header("message_id").unwrap_or_default();
            fragments.combine(message_id, sum, frame.header_num("seq"), payload)?
        } else {
            payload
        };

        let code = match frame.header("type") {
            Some("event") => self.dispatcher.dispatch(&payload).await,
            other => {
                debug!("unhandled Feishu data frame type {:?}", other);
                200
            }
        };
        if code != 200 {
            let event_type = serde_json::from_slice::<serde_json::Value>(&payload)
                .map(|v| v["header"]["event_type"].to_string())
                .unwrap_or_default();
            debug!("Feishu event answered with {}: {}", code, event_type);
        }
        Some(frame.ack(code, started.elapsed().as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn receive_payload(message_id: &str) -> Vec<u8> {
        json!({
            "schema": "2.0",
            "header": {"event_id": "ev", "event_type": "im.message.receive_v1"},
            "event": {
                "sender": {"sender_id": {"open_id": "ou_1"}, "sender_type": "user"},
                "message": {
                    "message_id": message_id,
                    "chat_id": "oc_1",
                    "chat_type": "p2p",
                    "message_type": "text",
                    "content": "{\"text\":\"hi\"}"
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn header(key: &str, value: &str) -> Header {
        Header {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn lark_config(domain: &str) -> LarkClientConfig {
        LarkClientConfig {
            app_id: "cli_app".to_string(),
            app_secret: "secret".to_string(),
            domain: domain.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_frame_wire_roundtrip_and_headers() {
        let frame = Frame {
            seq_id: 7,
            log_id: 9,
            service: 3,
            method: METHOD_DATA,
            headers: vec![header("type", "event"), header("sum", "2")],
            payload: Some(b"{}".to_vec()),
            ..Default::default()
        };
        let decoded = Frame::decode(frame.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.header("type"), Some("event"));
        assert_eq!(decoded.header_num("sum"), 2);
        assert_eq!(decoded.header_num("seq"), 0);
    }

    #[test]
    fn test_ping_frame() {
        let ping = Frame::ping(42);
        assert_eq!(ping.method, METHOD_CONTROL);
        assert_eq!(ping.service, 42);
        assert_eq!(ping.header("type"), Some("ping"));
    }

    #[test]
    fn test_ack_frame() {
        let mut frame = Frame::ping(1);
        frame.method = METHOD_DATA;
        let ack = frame.ack(200, 12);
        assert_eq!(ack.header("biz_rt"), Some("12"));
        let body: Value = serde_json::from_slice(ack.payload.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"code": 200, "headers": {}, "data": null}));
    }

    #[test]
    fn test_service_id_from_url() {
        let url = url::Url::parse("wss://msg.example.com/ws/v2?fpid=1&service_id=33").unwrap();
        assert_eq!(service_id(&url), 33);
        let url = url::Url::parse("wss://msg.example.com/ws/v2").unwrap();
        assert_eq!(service_id(&url), 0);
    }

    #[test]
    fn test_fragments_reassembled_in_seq_order() {
        let mut buffer = FragmentBuffer::default();
        assert_eq!(buffer.combine("m1", 3, 2, b"c".to_vec()), None);
        assert_eq!(buffer.combine("m1", 3, 0, b"a".to_vec()), None);
        assert_eq!(buffer.pending(), 1);
        assert_eq!(buffer.combine("m1", 3, 1, b"b".to_vec()), Some(b"abc".to_vec()));
        assert_eq!(buffer.pending(), 0);
        assert_eq!(buffer.combine("m2", 2, 5, b"x".to_vec()), None);
    }

    #[test]
    fn test_oversized_fragment_count_rejected() {
        let mut buffer = FragmentBuffer::default();
        assert_eq!(buffer.combine("m", usize::MAX, 0, b"x".to_vec()), None);
        assert_eq!(buffer.combine("m", MAX_FRAGMENTS + 1, 0, b"x".to_vec()), None);
        assert_eq!(buffer.pending(), 0);
        assert_eq!(buffer.combine("m", 1, 0, b"x".to_vec()), Some(b"x".to_vec()));
    }

    #[test]
    fn test_incomplete_payloads_bounded() {
        let mut buffer = FragmentBuffer::default();
        let start = Instant::now();
        let mut now = start;
        for i in 0..10_000u64 {
            now = start + Duration::from_millis(i);
            buffer.combine_at(now, &format!("m{i}"), 2, 0, b"a".to_vec());
        }
        assert_eq!(buffer.pending(), MAX_PENDING);

        // the newest entries survive eviction
        assert_eq!(
            buffer.combine_at(now, "m9999", 2, 1, b"b".to_vec()),
            Some(b"ab".to_vec())
        );
        assert_eq!(buffer.combine_at(now, "m9000", 2, 1, b"b".to_vec()), None);
    }

    #[test]
    fn test_stale_fragments_expire() {
        let mut buffer = FragmentBuffer::default();
        let start = Instant::now();
        assert_eq!(buffer.combine_at(start, "old", 2, 0, b"a".to_vec()), None);

        let later = start + FRAGMENT_TTL + Duration::from_secs(1);
        assert_eq!(buffer.combine_at(later, "new", 2, 0, b"a".to_vec()), None);
        assert_eq!(buffer.pending(), 1);
        assert_eq!(buffer.combine_at(later, "old", 2, 1, b"b".to_vec()), None);
    }

    #[test]
    fn test_client_config_defaults_and_parse() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"PingInterval": 30, "ReconnectInterval": 5}"#).unwrap();
        assert_eq!(config.ping_interval, 30);
        assert_eq!(config.reconnect_interval, 5);
        assert_eq!(config.reconnect_count, -1);
        assert_eq!(ClientConfig::default().ping_interval, 120);
    }

    #[tokio::test]
    async fn test_dispatch_routes_message_events() {
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = EventDispatcher::new(tx);
        assert_eq!(dispatcher.dispatch(&receive_payload("om_9")).await, 200);
        assert_eq!(rx.recv().await.unwrap().message_id, "om_9");
    }

    #[tokio::test]
    async fn test_dispatch_noop_and_unknown_events() {
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = EventDispatcher::new(tx);
        for kind in EventKind::ALL {
            if kind == EventKind::MessageReceive {
                continue;
            }
            let payload = json!({"header": {"event_type": kind.event_type()}, "event": {}});
            assert_eq!(dispatcher.dispatch(payload.to_string().as_bytes()).await, 200);
        }
        let unknown = json!({"header": {"event_type": "im.chat.disbanded_v1"}, "event": {}});
        assert_eq!(dispatcher.dispatch(unknown.to_string().as_bytes()).await, 500);
        assert_eq!(dispatcher.dispatch(b"garbage").await, 500);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_closed_queue_still_acks() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let dispatcher = EventDispatcher::new(tx);
        assert_eq!(dispatcher.dispatch(&receive_payload("om_1")).await, 200);
    }

    #[tokio::test]
    async fn test_fetch_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callback/ws/endpoint"))
            .and(body_json(json!({"AppID": "cli_app", "AppSecret": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "data": {
                    "URL": "wss://ws.example.com/ws?device_id=1&service_id=77",
                    "ClientConfig": {"PingInterval": 90, "ReconnectInterval": 10}
                }
            })))
            .mount(&server)
            .await;

        let endpoint = fetch_endpoint(&reqwest::Client::new(), &lark_config(&server.uri()))
            .await
            .unwrap();
        assert_eq!(endpoint.service_id, 77);
        assert_eq!(endpoint.client_config.ping_interval, 90);
        assert_eq!(endpoint.client_config.reconnect_interval, 10);
    }

    #[tokio::test]
    async fn test_fetch_endpoint_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callback/ws/endpoint"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 1000040351, "msg": "system busy"})),
            )
            .mount(&server)
            .await;

        let err = fetch_endpoint(&reqwest::Client::new(), &lark_config(&server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1000040351"));
    }

    /// Full round trip against a local WebSocket server: the worker pings, acknowledges a
    /// fragmented event, queues it, then closes when shut down.
    #[tokio::test]
    async fn test_worker_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = listener.local_addr().unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callback/ws/endpoint"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {"URL": format!("ws://{ws_addr}/ws?service_id=5")}
            })))
            .mount(&server)
            .await;

        let (event_tx, mut event_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = WsWorker::new(
            lark_config(&server.uri()),
            EventDispatcher::new(event_tx),
            shutdown_rx,
        );
        let worker_task = tokio::spawn(worker.run());

        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let ping = Frame::decode(first.into_data().as_ref()).unwrap();
        assert_eq!(ping.header("type"), Some("ping"));
        assert_eq!(ping.service, 5);

        let payload = receive_payload("om_ws");
        let (head, tail) = payload.split_at(payload.len() / 2);
        for (seq, part) in [head, tail].into_iter().enumerate() {
            let frame = Frame {
                seq_id: seq as u64,
                service: 5,
                method: METHOD_DATA,
                headers: vec![
                    header("type", "event"),
                    header("message_id", "msg-1"),
                    header("sum", "2"),
                    header("seq", &seq.to_string()),
                ],
                payload: Some(part.to_vec()),
                ..Default::default()
            };
            ws.send(Message::binary(frame.encode_to_vec())).await.unwrap();
        }

        let reply = ws.next().await.unwrap().unwrap();
        let ack = Frame::decode(reply.into_data().as_ref()).unwrap();
        assert_eq!(ack.seq_id, 1);
        assert!(ack.header("biz_rt").is_some());
        let body: Value = serde_json::from_slice(ack.payload.as_deref().unwrap()).unwrap();
        assert_eq!(body["code"], 200);

        assert_eq!(event_rx.recv().await.unwrap().message_id, "om_ws");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), worker_task)
            .await
            .unwrap()
            .unwrap();
    }
}
