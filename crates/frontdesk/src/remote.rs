//! Remote store adapter.
//!
//! Talks to a Supabase-compatible service: CRUD through PostgREST and a
//! row-level change feed through the Realtime websocket (Phoenix channel
//! protocol). Mutations are fire-and-forget; their effect is observed only
//! through the change feed.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RemoteConfig;
use crate::entry::{Entry, EntryId, Status};
use crate::error::{Error, Result};
use crate::store::{ChangeEvent, ChangeFeed, ChangeSender, Connector, EntryStore};

/// Request timeout for PostgREST calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Phoenix heartbeat period. The server drops sockets silent for 60s.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Channel topic the change subscription joins.
const CHANGES_TOPIC: &str = "realtime:schema-db-changes";

/// Realtime protocol version sent on connect.
const REALTIME_VSN: &str = "1.0.0";

/// Longest error body kept in a request error.
const MAX_ERROR_BODY: usize = 200;

/// Client for one hosted table.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base: Url,
    key: String,
    table: String,
}

/// Row shape for inserts; the server fills in `id` and `created_at`.
#[derive(Debug, Serialize)]
struct NewRow<'a> {
    name: &'a str,
    treatment: &'a str,
    status: Status,
}

#[derive(Debug, Serialize)]
struct StatusPatch {
    status: Status,
}

impl RemoteStore {
    /// Validate connection settings and build a client.
    ///
    /// No network traffic happens here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteConnect`] if the key is empty or the URL does not
    /// parse as an http(s) URL with a host.
    pub fn connect(url: &str, key: &str, table: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::remote_connect("API key is empty"));
        }

        let table = table.trim();
        if table.is_empty() {
            return Err(Error::remote_connect("table name is empty"));
        }

        let base = Url::parse(url.trim())
            .map_err(|e| Error::remote_connect(format!("invalid URL '{url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::remote_connect(format!(
                "unsupported URL scheme '{}'",
                base.scheme()
            )));
        }
        if base.host_str().is_none() {
            return Err(Error::remote_connect(format!("URL has no host: {url}")));
        }

        let headers = auth_headers(key)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::remote_connect(format!("failed to create HTTP client: {e}")))?;

        debug!("Remote store configured for {} ({})", base, table);
        Ok(Self {
            client,
            base,
            key: key.to_string(),
            table: table.to_string(),
        })
    }

    /// The managed table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `{base}/rest/v1/{table}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting URL is invalid.
    pub fn rest_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        url.set_path(&format!(
            "{}/rest/v1/{}",
            self.base.path().trim_end_matches('/'),
            self.table
        ));
        url.set_query(None);
        Ok(url)
    }

    /// `ws(s)://{host}/realtime/v1/websocket?apikey={key}&vsn=1.0.0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme cannot be switched to websocket.
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.base.clone();
        let scheme = if self.base.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::realtime(format!("cannot derive websocket URL from {}", self.base)))?;
        url.set_path(&format!(
            "{}/realtime/v1/websocket",
            self.base.path().trim_end_matches('/')
        ));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", REALTIME_VSN);
        Ok(url)
    }

    fn row_url(&self, id: &EntryId) -> Result<Url> {
        let mut url = self.rest_url()?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id.as_str()));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    async fn send(&self, what: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(MAX_ERROR_BODY).collect();
        Err(Error::remote_request(format!(
            "{what} on {}: {status} {truncated}",
            self.table
        )))
    }
}

fn auth_headers(key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let apikey = HeaderValue::from_str(key)
        .map_err(|e| Error::remote_connect(format!("invalid API key header: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
        .map_err(|e| Error::remote_connect(format!("invalid API key header: {e}")))?;
    headers.insert("apikey", apikey);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[async_trait::async_trait]
impl EntryStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch_all(&self) -> Result<Vec<Entry>> {
        let mut url = self.rest_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "created_at.asc");

        let response = self.send("select", self.request(Method::GET, url)).await?;
        let rows: Vec<Entry> = response.json().await?;
        info!("Fetched {} entries from {}", rows.len(), self.table);
        Ok(rows)
    }

    async fn insert(&self, entry: &Entry) -> Result<()> {
        let body = [NewRow {
            name: &entry.name,
            treatment: &entry.memo,
            status: entry.status,
        }];
        let builder = self
            .request(Method::POST, self.rest_url()?)
            .header("Prefer", "return=minimal")
            .json(&body);
        self.send("insert", builder).await?;
        debug!("Insert request accepted for {}", entry.name);
        Ok(())
    }

    async fn update_status(&self, id: &EntryId, status: Status) -> Result<()> {
        let builder = self
            .request(Method::PATCH, self.row_url(id)?)
            .header("Prefer", "return=minimal")
            .json(&StatusPatch { status });
        self.send("update", builder).await?;
        debug!("Update request accepted for {} -> {}", id.short(), status);
        Ok(())
    }

    async fn remove(&self, id: &EntryId) -> Result<()> {
        self.send("delete", self.request(Method::DELETE, self.row_url(id)?))
            .await?;
        debug!("Delete request accepted for {}", id.short());
        Ok(())
    }

    async fn subscribe(&self) -> Result<Option<ChangeFeed>> {
        let url = self.realtime_url()?;
        debug!("Connecting realtime socket for {}", self.table);

        let (mut socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::realtime(format!("connect failed: {e}")))?;

        let join = join_frame(&self.table, &self.key);
        socket
            .send(Message::Text(join.into()))
            .await
            .map_err(|e| Error::realtime(format!("join failed: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let table = self.table.clone();
        let producer = tokio::spawn(async move {
            match pump(socket, tx).await {
                Ok(()) => info!("Realtime feed for {} ended", table),
                Err(e) => warn!("Realtime feed for {} stopped: {}", table, e),
            }
        });

        info!("Subscribed to changes on {}", self.table);
        Ok(Some(ChangeFeed::with_producer(rx, producer)))
    }
}

/// Read frames until the socket or the receiving side goes away.
async fn pump<S>(socket: S, tx: ChangeSender) -> Result<()>
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = socket.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut seq: u64 = 1;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                seq += 1;
                write
                    .send(Message::Text(heartbeat_frame(seq).into()))
                    .await
                    .map_err(|e| Error::realtime(format!("heartbeat failed: {e}")))?;
            }
            next = read.next() => {
                let message = match next {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(Error::realtime(format!("read failed: {e}"))),
                    Some(Ok(message)) => message,
                };
                match message {
                    Message::Text(text) => match decode_frame(&text) {
                        Frame::Change(event) => {
                            if tx.send(event).is_err() {
                                return Ok(());
                            }
                        }
                        Frame::Failed(reason) => return Err(Error::realtime(reason)),
                        Frame::Other => {}
                    },
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

/// Phoenix message envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// What a single realtime frame means to the feed.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A row change to forward.
    Change(ChangeEvent),
    /// The server rejected or closed the channel.
    Failed(String),
    /// Replies, heartbeats, presence and anything unrecognised.
    Other,
}

/// Decode one text frame from the realtime socket.
#[must_use]
pub fn decode_frame(text: &str) -> Frame {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Ignoring undecodable realtime frame: {}", e);
            return Frame::Other;
        }
    };

    match envelope.event.as_str() {
        "postgres_changes" => decode_change(envelope.payload),
        "phx_reply" => {
            if envelope.payload.get("status").and_then(Value::as_str) == Some("error") {
                Frame::Failed(format!(
                    "join rejected on {}: {}",
                    envelope.topic, envelope.payload["response"]
                ))
            } else {
                Frame::Other
            }
        }
        "phx_error" => Frame::Failed(format!("channel error on {}", envelope.topic)),
        "phx_close" => Frame::Failed(format!("channel closed on {}", envelope.topic)),
        _ => Frame::Other,
    }
}

fn decode_change(payload: Value) -> Frame {
    let data = match serde_json::from_value::<ChangePayload>(payload) {
        Ok(p) => p.data,
        Err(e) => {
            warn!("Malformed change payload: {}", e);
            return Frame::Other;
        }
    };

    let event = match data.kind.as_str() {
        "INSERT" => row(data.record).map(ChangeEvent::Inserted),
        "UPDATE" => row(data.record).map(ChangeEvent::Updated),
        "DELETE" => data
            .old_record
            .as_ref()
            .and_then(|old| old.get("id"))
            .and_then(id_from_value)
            .map(|id| ChangeEvent::Deleted { id }),
        other => {
            debug!("Ignoring change type {}", other);
            None
        }
    };

    event.map_or(Frame::Other, Frame::Change)
}

fn row(record: Option<Value>) -> Option<Entry> {
    let record = record?;
    match serde_json::from_value(record) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Dropping change with unreadable row: {}", e);
            None
        }
    }
}

fn id_from_value(value: &Value) -> Option<EntryId> {
    EntryId::deserialize(value).ok()
}

/// The `phx_join` frame subscribing to every change on `table`.
#[must_use]
pub fn join_frame(table: &str, key: &str) -> String {
    json!({
        "topic": CHANGES_TOPIC,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table }
                ]
            },
            "access_token": key
        },
        "ref": "1"
    })
    .to_string()
}

fn heartbeat_frame(seq: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": seq.to_string()
    })
    .to_string()
}

/// Builds [`RemoteStore`]s from configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct SupabaseConnector;

#[async_trait::async_trait]
impl Connector for SupabaseConnector {
    async fn connect(&self, remote: &RemoteConfig) -> Result<Box<dyn EntryStore>> {
        let store = RemoteStore::connect(&remote.url, &remote.key, &remote.table)?;
        Ok(Box::new(store))
    }
}
