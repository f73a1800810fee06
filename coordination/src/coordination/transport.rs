//! Message transport between the coordinator and participants
//!
//! Two transports share one trait:
//!
//! - [`FsInboxTransport`] exchanges JSON files under a workspace root:
//!   `<root>/<agent>/inbox/<message_type>_<session_id>.json` for messages to
//!   the agent and `<root>/<agent>/outbox/input_response_<session_id>.json`
//!   for the agent's answer.
//! - [`ChannelTransport`] keeps everything in memory and wakes waiters
//!   directly when a response arrives.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::decision::{DecisionResult, RequestId};

use super::state::SessionId;

/// Sender name used on coordinator messages
pub const COORDINATOR_ID: &str = "decision_coordinator";

pub const INPUT_REQUEST: &str = "input_request";
pub const FINAL_DECISION: &str = "final_decision";
pub const SESSION_FAILED: &str = "session_failed";

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid agent id: {0}")]
    InvalidAgent(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// A message from the coordinator to one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMessage {
    pub message_type: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub decision_id: RequestId,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Value,
}

impl CoordinationMessage {
    fn new(message_type: &str, to: &str, session_id: &str, decision_id: &str, action: &str) -> Self {
        Self {
            message_type: message_type.to_string(),
            from: COORDINATOR_ID.to_string(),
            to: to.to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            decision_id: decision_id.to_string(),
            action: action.to_string(),
            deadline: None,
            payload: Value::Null,
        }
    }

    /// Ask a participant for input before `deadline`
    pub fn input_request(
        to: &str,
        session_id: &str,
        decision_id: &str,
        deadline: DateTime<Utc>,
        context: Value,
    ) -> Self {
        Self {
            deadline: Some(deadline),
            payload: context,
            ..Self::new(INPUT_REQUEST, to, session_id, decision_id, "provide_input")
        }
    }

    /// Announce the finalized decision
    pub fn final_decision(to: &str, session_id: &str, decision: &DecisionResult) -> TransportResult<Self> {
        Ok(Self {
            payload: serde_json::to_value(decision)?,
            ..Self::new(
                FINAL_DECISION,
                to,
                session_id,
                &decision.request_id,
                "acknowledge_decision",
            )
        })
    }

    /// Tell a participant the session gave up
    pub fn session_failed(to: &str, session_id: &str, decision_id: &str, reason: &str) -> Self {
        Self {
            payload: serde_json::json!({ "reason": reason }),
            ..Self::new(SESSION_FAILED, to, session_id, decision_id, "none")
        }
    }
}

/// A participant's answer to an input request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub session_id: SessionId,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    pub fn new(agent_id: &str, session_id: &str, payload: Value) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Delivery of coordinator messages and collection of participant answers
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver a message to `message.to`
    async fn deliver(&self, message: &CoordinationMessage) -> TransportResult<()>;

    /// Wait up to `timeout` for the agent's answer in this session.
    ///
    /// `Ok(None)` means the agent did not answer in time.
    async fn await_response(
        &self,
        agent_id: &str,
        session_id: &str,
        timeout: Duration,
    ) -> TransportResult<Option<AgentResponse>>;
}

/// Shared transport handle
pub type SharedTransport = Arc<dyn MessageTransport>;

// ---------------------------------------------------------------------------
// Filesystem inboxes
// ---------------------------------------------------------------------------

/// Transport over per-agent inbox/outbox directories
#[derive(Debug, Clone)]
pub struct FsInboxTransport {
    root: PathBuf,
    poll_interval: Duration,
}

impl FsInboxTransport {
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn agent_dir(&self, agent_id: &str) -> TransportResult<PathBuf> {
        if agent_id.is_empty()
            || agent_id == "."
            || agent_id == ".."
            || agent_id.contains(['/', '\\'])
        {
            return Err(TransportError::InvalidAgent(agent_id.to_string()));
        }
        Ok(self.root.join(agent_id))
    }

    pub fn inbox_dir(&self, agent_id: &str) -> TransportResult<PathBuf> {
        Ok(self.agent_dir(agent_id)?.join("inbox"))
    }

    pub fn outbox_dir(&self, agent_id: &str) -> TransportResult<PathBuf> {
        Ok(self.agent_dir(agent_id)?.join("outbox"))
    }

    pub fn response_path(&self, agent_id: &str, session_id: &str) -> TransportResult<PathBuf> {
        Ok(self
            .outbox_dir(agent_id)?
            .join(format!("input_response_{}.json", session_id)))
    }

    /// Participant side: write an answer for the coordinator to pick up
    pub async fn write_response(
        &self,
        agent_id: &str,
        session_id: &str,
        payload: Value,
    ) -> TransportResult<PathBuf> {
        let path = self.response_path(agent_id, session_id)?;
        let response = AgentResponse::new(agent_id, session_id, payload);
        write_json(&path, &serde_json::to_vec_pretty(&response)?).await?;
        Ok(path)
    }

    /// Participant side: every message currently in the agent's inbox
    pub async fn read_inbox(&self, agent_id: &str) -> TransportResult<Vec<CoordinationMessage>> {
        let dir = self.inbox_dir(agent_id)?;
        let mut messages = Vec::new();
        for path in json_files(&dir).await? {
            let bytes = tokio::fs::read(&path).await.map_err(|source| io(&path, source))?;
            match serde_json::from_slice::<CoordinationMessage>(&bytes) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed inbox file"),
            }
        }
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    /// Delete inbox/outbox files last modified before `cutoff`
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> TransportResult<usize> {
        let mut agents = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(io(&self.root, source)),
        };

        let mut removed = 0;
        while let Some(agent) = agents
            .next_entry()
            .await
            .map_err(|source| io(&self.root, source))?
        {
            for sub in ["inbox", "outbox"] {
                let dir = agent.path().join(sub);
                for path in json_files(&dir).await? {
                    let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                        Ok(t) => DateTime::<Utc>::from(t),
                        Err(_) => continue,
                    };
                    if modified < cutoff {
                        tokio::fs::remove_file(&path)
                            .await
                            .map_err(|source| io(&path, source))?;
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            debug!(removed, root = %self.root.display(), "Pruned inbox files");
        }
        Ok(removed)
    }

    async fn take_response(
        &self,
        agent_id: &str,
        session_id: &str,
    ) -> TransportResult<Option<AgentResponse>> {
        let path = self.response_path(agent_id, session_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io(&path, source)),
        };

        // A file that does not parse yet may still be mid-write; leave it
        // for the next poll.
        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Response not readable yet");
                return Ok(None);
            }
        };

        // Consumed so the next round waits for a fresh answer.
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove consumed response");
            }
        }

        let response = match serde_json::from_value::<AgentResponse>(value.clone()) {
            Ok(r) => r,
            Err(_) => AgentResponse::new(agent_id, session_id, value),
        };
        Ok(Some(response))
    }
}

#[async_trait]
impl MessageTransport for FsInboxTransport {
    async fn deliver(&self, message: &CoordinationMessage) -> TransportResult<()> {
        let path = self
            .inbox_dir(&message.to)?
            .join(format!("{}_{}.json", message.message_type, message.session_id));
        write_json(&path, &serde_json::to_vec_pretty(message)?).await?;
        debug!(to = %message.to, message_type = %message.message_type, "Delivered message");
        Ok(())
    }

    async fn await_response(
        &self,
        agent_id: &str,
        session_id: &str,
        timeout: Duration,
    ) -> TransportResult<Option<AgentResponse>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(response) = self.take_response(agent_id, session_id).await? {
                return Ok(Some(response));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn io(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn write_json(path: &Path, bytes: &[u8]) -> TransportResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io(parent, source))?;
    }
    // Write-then-rename so pollers never see a half-written file.
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|source| io(&tmp, source))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| io(path, source))
}

async fn json_files(dir: &Path) -> TransportResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io(dir, source)),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| io(dir, source))? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// In-memory channels
// ---------------------------------------------------------------------------

/// Scripted participant: maps an input request to an optional answer
pub type AutoResponder = Arc<dyn Fn(&CoordinationMessage) -> Option<Value> + Send + Sync>;

/// In-memory transport with bounded per-agent queues
pub struct ChannelTransport {
    inboxes: Mutex<HashMap<String, VecDeque<CoordinationMessage>>>,
    responses: Mutex<HashMap<(String, SessionId), AgentResponse>>,
    arrived: Notify,
    capacity: usize,
    responder: Option<AutoResponder>,
}

impl ChannelTransport {
    /// Default per-agent queue capacity
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        Self {
            inboxes: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
            arrived: Notify::new(),
            capacity: capacity.max(1),
            responder: None,
        }
    }

    /// Answer input requests automatically
    pub fn with_auto_responder(
        mut self,
        responder: impl Fn(&CoordinationMessage) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Submit an answer on behalf of an agent
    pub async fn respond(&self, agent_id: &str, session_id: &str, payload: Value) {
        let response = AgentResponse::new(agent_id, session_id, payload);
        self.responses
            .lock()
            .await
            .insert((agent_id.to_string(), session_id.to_string()), response);
        self.arrived.notify_waiters();
    }

    /// Messages queued for an agent, oldest first
    pub async fn messages_for(&self, agent_id: &str) -> Vec<CoordinationMessage> {
        self.inboxes
            .lock()
            .await
            .get(agent_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn deliver(&self, message: &CoordinationMessage) -> TransportResult<()> {
        {
            let mut inboxes = self.inboxes.lock().await;
            let queue = inboxes.entry(message.to.clone()).or_default();
            if queue.len() >= self.capacity {
                queue.pop_front();
            }
            queue.push_back(message.clone());
        }

        if message.message_type == INPUT_REQUEST {
            if let Some(payload) = self.responder.as_ref().and_then(|r| r(message)) {
                self.respond(&message.to, &message.session_id, payload).await;
            }
        }
        Ok(())
    }

    async fn await_response(
        &self,
        agent_id: &str,
        session_id: &str,
        timeout: Duration,
    ) -> TransportResult<Option<AgentResponse>> {
        let key = (agent_id.to_string(), session_id.to_string());
        let wait = async {
            loop {
                // Registered before the check so a concurrent respond() is not missed.
                let arrived = self.arrived.notified();
                if let Some(response) = self.responses.lock().await.remove(&key) {
                    return response;
                }
                arrived.await;
            }
        };
        Ok(tokio::time::timeout(timeout, wait).await.ok())
    }
}
