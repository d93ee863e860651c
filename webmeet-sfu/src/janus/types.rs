//! Janus REST wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope of every control request
#[derive(Debug, Clone, Serialize)]
pub struct JanusRequest {
    pub janus: &'static str,
    pub transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsep: Option<Jsep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apisecret: Option<String>,
}

impl JanusRequest {
    pub fn new(janus: &'static str) -> Self {
        Self {
            janus,
            transaction: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            handle_id: None,
            plugin: None,
            body: None,
            jsep: None,
            apisecret: None,
        }
    }

    #[must_use]
    pub const fn with_session(mut self, session_id: u64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub const fn with_handle(mut self, handle_id: u64) -> Self {
        self.handle_id = Some(handle_id);
        self
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_jsep(mut self, jsep: Jsep) -> Self {
        self.jsep = Some(jsep);
        self
    }
}

/// Session description attached to plugin messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jsep {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl Jsep {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_string(),
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JanusResponse {
    pub janus: String,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub data: Option<IdData>,
    #[serde(default)]
    pub plugindata: Option<PluginData>,
    #[serde(default)]
    pub error: Option<JanusErrorBody>,
    #[serde(default)]
    pub jsep: Option<Jsep>,
}

/// `data` member of create/attach responses
#[derive(Debug, Clone, Deserialize)]
pub struct IdData {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginData {
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

impl PluginData {
    /// Plugin-level failure reported inside an otherwise successful response
    pub fn error(&self) -> Option<(i64, String)> {
        let code = self.data.get("error_code")?.as_i64()?;
        let reason = self
            .data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown plugin error")
            .to_string();
        Some((code, reason))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JanusErrorBody {
    pub code: i64,
    #[serde(default)]
    pub reason: String,
}

/// VideoRoom plugin requests
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum VideoRoomRequest {
    Create {
        room: u64,
        description: String,
        is_private: bool,
    },
    Join {
        room: u64,
        id: u64,
        display: String,
        ptype: String,
    },
    Publish {
        audio: bool,
        video: bool,
    },
    Subscribe {
        room: u64,
        feed: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_unset_fields() {
        let request = JanusRequest::new("attach")
            .with_session(42)
            .with_plugin("janus.plugin.videoroom");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["janus"], "attach");
        assert_eq!(value["session_id"], 42);
        assert_eq!(value["plugin"], "janus.plugin.videoroom");
        assert!(value.get("handle_id").is_none());
        assert!(value.get("apisecret").is_none());
        assert_eq!(value["transaction"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_videoroom_join_body() {
        let body = serde_json::to_value(VideoRoomRequest::Join {
            room: 1234,
            id: 99,
            display: "Alice".to_string(),
            ptype: "publisher".to_string(),
        })
        .unwrap();

        assert_eq!(
            body,
            json!({"request": "join", "room": 1234, "id": 99, "display": "Alice", "ptype": "publisher"})
        );
    }

    #[test]
    fn test_plugin_error_extraction() {
        let response: JanusResponse = serde_json::from_value(json!({
            "janus": "success",
            "plugindata": {
                "plugin": "janus.plugin.videoroom",
                "data": {"videoroom": "event", "error_code": 427, "error": "Room 1234 already exists"}
            }
        }))
        .unwrap();

        let (code, reason) = response.plugindata.unwrap().error().unwrap();
        assert_eq!(code, 427);
        assert!(reason.contains("already exists"));
    }
}
