//! Janus HTTP Client
//!
//! Pure control-plane client for the Janus REST API. It keeps no knowledge of
//! application rooms or users; the signaling coordinator builds on top of it.

use std::time::Instant;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webmeet_core::config::JanusConfig;
use webmeet_core::metrics::signaling::SFU_REQUEST_DURATION;

use super::types::{JanusRequest, JanusResponse, Jsep, VideoRoomRequest};
use crate::error::{Result, SfuError};

/// Janus replies "success" to synchronous requests
const STATUS_SUCCESS: &str = "success";
/// Plugin messages that completed with a notification reply "event"
const STATUS_EVENT: &str = "event";
/// Keepalives are acknowledged, not answered
const STATUS_ACK: &str = "ack";

/// An attached plugin handle
///
/// Not `Clone`: a handle has one owner, and [`JanusClient::detach`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct PluginHandle {
    session_id: u64,
    handle_id: u64,
}

impl PluginHandle {
    #[must_use]
    pub const fn session_id(&self) -> u64 {
        self.session_id
    }

    #[must_use]
    pub const fn handle_id(&self) -> u64 {
        self.handle_id
    }
}

/// Janus HTTP Client
///
/// Provides:
/// - Session lifecycle (create, keepalive, destroy), with one lazily created
///   session shared by every handle
/// - Plugin handle lifecycle (attach, detach)
/// - VideoRoom operations (create room, join as publisher, publish, subscribe)
pub struct JanusClient {
    base_url: String,
    api_secret: Option<String>,
    plugin: String,
    session: Mutex<Option<u64>>,
    client: Client,
}

impl JanusClient {
    /// Create a new Janus client from configuration
    pub fn new(config: &JanusConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_secret: config.api_secret.clone().filter(|s| !s.is_empty()),
            plugin: config.plugin.clone(),
            session: Mutex::new(None),
            client,
        })
    }

    /// Get the gateway base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the plugin handles are attached to
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Id of the shared session, if one has been created
    pub async fn current_session(&self) -> Option<u64> {
        *self.session.lock().await
    }

    /// Create a new gateway session
    pub async fn create_session(&self) -> Result<u64> {
        let response = self
            .send("create", &self.base_url, JanusRequest::new("create"), &[STATUS_SUCCESS])
            .await?;
        let session_id = response.data.ok_or(SfuError::MissingData("create"))?.id;

        info!(session_id = session_id, "Janus session created");
        Ok(session_id)
    }

    /// Get the shared session, creating it on first use
    pub async fn session(&self) -> Result<u64> {
        let mut session = self.session.lock().await;
        if let Some(id) = *session {
            return Ok(id);
        }

        let id = self.create_session().await?;
        *session = Some(id);
        Ok(id)
    }

    /// Keep the shared session alive
    ///
    /// Does nothing when no session has been created yet. A session the
    /// gateway no longer knows is forgotten so the next call creates a new one.
    pub async fn keepalive(&self) -> Result<()> {
        let Some(session_id) = self.current_session().await else {
            return Ok(());
        };

        let request = JanusRequest::new("keepalive").with_session(session_id);
        self.send("keepalive", &self.session_url(session_id), request, &[STATUS_ACK, STATUS_SUCCESS])
            .await?;

        debug!(session_id = session_id, "Janus keepalive sent");
        Ok(())
    }

    /// Destroy a gateway session
    pub async fn destroy_session(&self, session_id: u64) -> Result<()> {
        let request = JanusRequest::new("destroy").with_session(session_id);
        self.send("destroy", &self.session_url(session_id), request, &[STATUS_SUCCESS])
            .await?;

        let mut session = self.session.lock().await;
        if *session == Some(session_id) {
            *session = None;
        }

        info!(session_id = session_id, "Janus session destroyed");
        Ok(())
    }

    /// Attach the configured plugin on the shared session
    pub async fn attach(&self) -> Result<PluginHandle> {
        let session_id = self.session().await?;
        self.attach_plugin(session_id, &self.plugin).await
    }

    /// Attach `plugin` on an explicit session
    pub async fn attach_plugin(&self, session_id: u64, plugin: &str) -> Result<PluginHandle> {
        let request = JanusRequest::new("attach")
            .with_session(session_id)
            .with_plugin(plugin);
        let response = self
            .send("attach", &self.session_url(session_id), request, &[STATUS_SUCCESS])
            .await?;
        let handle_id = response.data.ok_or(SfuError::MissingData("attach"))?.id;

        debug!(session_id = session_id, handle_id = handle_id, plugin = %plugin, "Plugin attached");
        Ok(PluginHandle {
            session_id,
            handle_id,
        })
    }

    /// Detach a plugin handle, consuming it
    pub async fn detach(&self, handle: PluginHandle) -> Result<()> {
        let request = JanusRequest::new("detach")
            .with_session(handle.session_id)
            .with_handle(handle.handle_id);
        self.send("detach", &self.handle_url(&handle), request, &[STATUS_SUCCESS])
            .await?;

        debug!(
            session_id = handle.session_id,
            handle_id = handle.handle_id,
            "Plugin detached"
        );
        Ok(())
    }

    /// Create a VideoRoom room
    ///
    /// A room that already exists counts as created.
    pub async fn create_room(&self, handle: &PluginHandle, room: u64, description: &str) -> Result<()> {
        let body = VideoRoomRequest::Create {
            room,
            description: description.to_string(),
            is_private: false,
        };

        match self
            .message("create_room", handle, &body, None, &[STATUS_SUCCESS])
            .await
        {
            Ok(_) => {
                info!(janus_room = room, "VideoRoom created");
                Ok(())
            }
            Err(e) if e.is_room_exists() => {
                debug!(janus_room = room, "VideoRoom already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Join a VideoRoom as a publisher
    pub async fn join_as_publisher(
        &self,
        handle: &PluginHandle,
        room: u64,
        participant_id: u64,
        display: &str,
    ) -> Result<()> {
        let body = VideoRoomRequest::Join {
            room,
            id: participant_id,
            display: display.to_string(),
            ptype: "publisher".to_string(),
        };
        self.message("join", handle, &body, None, &[STATUS_EVENT])
            .await?;
        Ok(())
    }

    /// Publish media described by an SDP offer
    pub async fn publish(&self, handle: &PluginHandle, sdp: &str) -> Result<()> {
        let body = VideoRoomRequest::Publish {
            audio: true,
            video: true,
        };
        self.message("publish", handle, &body, Some(Jsep::offer(sdp)), &[STATUS_EVENT])
            .await?;
        Ok(())
    }

    /// Subscribe to `feed`, sending the subscriber's SDP answer
    pub async fn subscribe(&self, handle: &PluginHandle, room: u64, feed: u64, sdp: &str) -> Result<()> {
        let body = VideoRoomRequest::Subscribe { room, feed };
        self.message("subscribe", handle, &body, Some(Jsep::answer(sdp)), &[STATUS_EVENT])
            .await?;
        Ok(())
    }

    async fn message(
        &self,
        action: &'static str,
        handle: &PluginHandle,
        body: &VideoRoomRequest,
        jsep: Option<Jsep>,
        expected: &[&str],
    ) -> Result<JanusResponse> {
        let mut request = JanusRequest::new("message")
            .with_session(handle.session_id)
            .with_handle(handle.handle_id)
            .with_body(serde_json::to_value(body)?);
        if let Some(jsep) = jsep {
            request = request.with_jsep(jsep);
        }

        self.send(action, &self.handle_url(handle), request, expected)
            .await
    }

    fn session_url(&self, session_id: u64) -> String {
        format!("{}/{}", self.base_url, session_id)
    }

    fn handle_url(&self, handle: &PluginHandle) -> String {
        format!("{}/{}/{}", self.base_url, handle.session_id, handle.handle_id)
    }

    /// Issue one control request and validate the reply
    async fn send(
        &self,
        action: &'static str,
        url: &str,
        mut request: JanusRequest,
        expected: &[&str],
    ) -> Result<JanusResponse> {
        request.apisecret.clone_from(&self.api_secret);
        let session_id = request.session_id;

        let started = Instant::now();
        let result = self.execute(action, url, &request, expected).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        SFU_REQUEST_DURATION
            .with_label_values(&[action, outcome])
            .observe(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            if !e.is_room_exists() {
                warn!(action = action, url = %url, error = %e, "Janus request failed");
            }
            if e.is_session_not_found() {
                let mut session = self.session.lock().await;
                if session.is_some() && *session == session_id {
                    *session = None;
                }
            }
        }

        result
    }

    async fn execute(
        &self,
        action: &'static str,
        url: &str,
        request: &JanusRequest,
        expected: &[&str],
    ) -> Result<JanusResponse> {
        let response = self.client.post(url).json(request).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SfuError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let response: JanusResponse = serde_json::from_str(&text)?;

        if let Some(error) = &response.error {
            return Err(SfuError::Janus {
                code: error.code,
                reason: error.reason.clone(),
            });
        }

        if let Some(transaction) = &response.transaction {
            if transaction != &request.transaction {
                return Err(SfuError::Parse(format!(
                    "transaction mismatch: sent {}, received {transaction}",
                    request.transaction
                )));
            }
        }

        if !expected.contains(&response.janus.as_str()) {
            return Err(SfuError::UnexpectedStatus {
                action,
                expected: expected.join("|"),
                actual: response.janus.clone(),
            });
        }

        if let Some((code, reason)) = response.plugindata.as_ref().and_then(|p| p.error()) {
            return Err(SfuError::Plugin { code, reason });
        }

        Ok(response)
    }
}

impl std::fmt::Debug for JanusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JanusClient")
            .field("base_url", &self.base_url)
            .field("plugin", &self.plugin)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// Build a handle without talking to a gateway
#[cfg(test)]
pub(crate) const fn test_handle(session_id: u64, handle_id: u64) -> PluginHandle {
    PluginHandle {
        session_id,
        handle_id,
    }
}
