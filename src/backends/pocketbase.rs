//! PocketBase backend: REST record API plus the server-sent-events realtime
//! feed.
//!
//! Every request carries the agent token as the `token` query parameter; the
//! collection rules on the server scope records to that token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::base::{AgentBackend, BackendError, BackendResult, Subscription, SubscriptionHandle};
use crate::models::{Computer, ComputerPatch, Execution, ExecutionEvent, ExecutionPatch};

const COMPUTERS: &str = "computers";
const EXECUTIONS: &str = "executions";
const CONNECT_EVENT: &str = "PB_CONNECT";
const EVENT_BUFFER: usize = 256;

#[derive(Clone, Debug)]
pub struct PocketBaseConfig {
    pub base_url: String,
    pub token: String,
    /// Timeout for individual REST calls.
    pub request_timeout: Duration,
    /// How long to wait for the realtime handshake.
    pub connect_timeout: Duration,
}

impl PocketBaseConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Deserialize)]
struct RecordList<T> {
    items: Vec<T>,
}

#[derive(Clone)]
pub struct PocketBaseBackend {
    http: Client,
    // Realtime responses stream indefinitely, so this client has no total
    // request timeout.
    stream_http: Client,
    base_url: Arc<str>,
    token: Arc<str>,
    connect_timeout: Duration,
}

impl PocketBaseBackend {
    pub fn new(config: PocketBaseConfig) -> BackendResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        let stream_http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            stream_http,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            token: Arc::from(config.token.as_str()),
            connect_timeout: config.connect_timeout,
        })
    }

    fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{collection}/records", self.base_url)
    }

    fn record_url(&self, collection: &str, record_id: &str) -> String {
        format!("{}/{record_id}", self.records_url(collection))
    }

    fn realtime_url(&self) -> String {
        format!("{}/api/realtime", self.base_url)
    }

    async fn ensure_success(response: Response) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn update_record<T, P>(
        &self,
        collection: &str,
        record_id: &str,
        patch: &P,
    ) -> BackendResult<T>
    where
        T: DeserializeOwned,
        P: serde::Serialize + ?Sized,
    {
        let response = self
            .http
            .patch(self.record_url(collection, record_id))
            .query(&[("token", &*self.token)])
            .json(patch)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_subscriptions(
        &self,
        client_id: &str,
        subscriptions: &[String],
    ) -> BackendResult<()> {
        let response = self
            .http
            .post(self.realtime_url())
            .query(&[("token", &*self.token)])
            .json(&json!({
                "clientId": client_id,
                "subscriptions": subscriptions,
            }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentBackend for PocketBaseBackend {
    async fn fetch_computer(&self) -> BackendResult<Computer> {
        let response = self
            .http
            .get(self.records_url(COMPUTERS))
            .query(&[
                ("page", "1"),
                ("perPage", "1"),
                ("skipTotal", "1"),
                ("token", &*self.token),
            ])
            .send()
            .await?;
        let list: RecordList<Computer> = Self::decode(response).await?;
        list.items
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("no computer registered for this token".into()))
    }

    async fn update_computer(
        &self,
        computer_id: &str,
        patch: &ComputerPatch,
    ) -> BackendResult<Computer> {
        self.update_record(COMPUTERS, computer_id, patch).await
    }

    async fn update_execution(
        &self,
        execution_id: &str,
        patch: &ExecutionPatch,
    ) -> BackendResult<Execution> {
        self.update_record(EXECUTIONS, execution_id, patch).await
    }

    async fn subscribe_executions(&self, computer_id: &str) -> BackendResult<Subscription> {
        let response = self
            .stream_http
            .get(self.realtime_url())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let mut stream = Box::pin(response.bytes_stream());
        let mut parser = SseParser::default();
        let client_id = tokio::time::timeout(
            self.connect_timeout,
            wait_for_client_id(&mut stream, &mut parser),
        )
        .await
        .map_err(|_| {
            BackendError::Subscription("timed out waiting for realtime handshake".into())
        })??;
        debug!(client_id = %client_id, "realtime connection established");

        let topic = execution_topic(&self.token, computer_id)?;
        self.post_subscriptions(&client_id, std::slice::from_ref(&topic))
            .await?;
        info!(computer_id, "subscribed to execution feed");

        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(forward_events(stream, parser, sender));

        Ok(Subscription {
            events,
            handle: Box::new(PocketBaseSubscription {
                backend: self.clone(),
                client_id,
                reader: Mutex::new(Some(reader)),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

/// Subscription topic for executions owned by `computer_id`, with the token
/// and filter passed as encoded subscription options.
fn execution_topic(token: &str, computer_id: &str) -> BackendResult<String> {
    let options = json!({
        "query": {
            "token": token,
            "filter": format!("computer.id=\"{computer_id}\""),
        },
        "headers": {},
    });
    let mut encoder = Url::parse("http://topic.invalid/")
        .map_err(|err| BackendError::Message(format!("topic encoder: {err}")))?;
    encoder
        .query_pairs_mut()
        .append_pair("options", &serde_json::to_string(&options)?);
    Ok(format!(
        "{EXECUTIONS}/*?{}",
        encoder.query().unwrap_or_default()
    ))
}

async fn wait_for_client_id<S>(stream: &mut S, parser: &mut SseParser) -> BackendResult<String>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    while let Some(chunk) = stream.next().await {
        for message in parser.push(&chunk?) {
            if message.event != CONNECT_EVENT {
                continue;
            }
            let client_id = serde_json::from_str::<Value>(&message.data)
                .ok()
                .and_then(|data| data.get("clientId")?.as_str().map(str::to_string))
                .or(message.id)
                .filter(|id| !id.is_empty());
            if let Some(client_id) = client_id {
                return Ok(client_id);
            }
        }
    }
    Err(BackendError::Subscription(
        "realtime stream closed before handshake".into(),
    ))
}

async fn forward_events<S>(
    mut stream: S,
    mut parser: SseParser,
    sender: mpsc::Sender<ExecutionEvent>,
) where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, "realtime stream failed");
                return;
            }
        };
        for message in parser.push(&chunk) {
            if !message.event.starts_with(EXECUTIONS) {
                continue;
            }
            let event = match serde_json::from_str::<Value>(&message.data)
                .and_then(ExecutionEvent::from_value)
            {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "dropping undecodable execution event");
                    continue;
                }
            };
            if sender.send(event).await.is_err() {
                debug!("execution event receiver dropped");
                return;
            }
        }
    }
    info!("realtime stream ended");
}

struct PocketBaseSubscription {
    backend: PocketBaseBackend,
    client_id: String,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl SubscriptionHandle for PocketBaseSubscription {
    async fn unsubscribe(&self) -> BackendResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.backend.post_subscriptions(&self.client_id, &[]).await;
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        result
    }
}

/// One dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq)]
struct SseMessage {
    event: String,
    data: String,
    id: Option<String>,
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
struct SseParser {
    pending: Vec<u8>,
    current: SseMessage,
    data_lines: Vec<String>,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.pending.extend_from_slice(chunk);
        let mut messages = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(message) = self.dispatch() {
                    messages.push(message);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.current.event = value.to_string(),
                "data" => self.data_lines.push(value.to_string()),
                "id" => self.current.id = Some(value.to_string()),
                _ => {}
            }
        }
        messages
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let mut message = std::mem::take(&mut self.current);
        if self.data_lines.is_empty() && message.event.is_empty() {
            return None;
        }
        message.data = std::mem::take(&mut self.data_lines).join("\n");
        if message.event.is_empty() {
            message.event = "message".to_string();
        }
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"id:abc\nevent: PB_CON").is_empty());
        let messages = parser.push(b"NECT\r\ndata:{\"clientId\":\"abc\"}\r\n\r\n");
        assert_eq!(
            messages,
            vec![SseMessage {
                event: "PB_CONNECT".to_string(),
                data: "{\"clientId\":\"abc\"}".to_string(),
                id: Some("abc".to_string()),
            }]
        );
    }

    #[test]
    fn test_sse_parser_joins_data_lines_and_skips_comments() {
        let mut parser = SseParser::default();
        let messages = parser.push(b": keepalive\n\ndata: one\ndata: two\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "message");
        assert_eq!(messages[0].data, "one\ntwo");
    }

    #[test]
    fn test_execution_topic_encodes_filter() {
        let topic = execution_topic("secret", "c1").expect("topic");
        assert!(topic.starts_with("executions/*?options="));

        let url = Url::parse(&format!("http://x/?{}", topic.split_once('?').unwrap().1))
            .expect("parse topic");
        let (_, options) = url
            .query_pairs()
            .find(|(key, _)| key == "options")
            .expect("options pair");
        let options: Value = serde_json::from_str(&options).expect("options json");
        assert_eq!(options["query"]["token"], "secret");
        assert_eq!(options["query"]["filter"], "computer.id=\"c1\"");
    }

    #[tokio::test]
    async fn test_wait_for_client_id_reads_handshake() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"event:PB_CONNECT\n")),
            Ok(Bytes::from_static(b"data:{\"clientId\":\"xyz\"}\n\n")),
        ];
        let mut stream = futures::stream::iter(chunks);
        let mut parser = SseParser::default();
        let client_id = wait_for_client_id(&mut stream, &mut parser)
            .await
            .expect("client id");
        assert_eq!(client_id, "xyz");
    }

    #[tokio::test]
    async fn test_forward_events_decodes_execution_records() {
        let payload = b"event:executions/*?options=x\ndata:{\"action\":\"create\",\"record\":{\"id\":\"e1\",\"executable\":\"print(1)\",\"completed\":false}}\n\nevent:executions/*\ndata:not json\n\n";
        let chunks: Vec<reqwest::Result<Bytes>> =
            vec![Ok(Bytes::from_static(payload))];
        let (sender, mut receiver) = mpsc::channel(8);

        forward_events(futures::stream::iter(chunks), SseParser::default(), sender).await;

        let event = receiver.recv().await.expect("decoded event");
        assert_eq!(event.record.id, "e1");
        assert!(receiver.recv().await.is_none());
    }
}
