//! Request and response shapes of the management API.
//!
//! Only the fields the SDK itself reads are typed; nested media and layout
//! settings are passed through as JSON values.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_in: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_out: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcoding: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifying: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip: Option<Value>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
pub struct CreateRoomRequest {
    #[builder(into)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// Page selection for list endpoints, sent as the query string. Pages start
/// at 1.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Page {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl Page {
    #[must_use]
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    #[must_use]
    pub const fn per_page(per_page: u32) -> Self {
        Self {
            page: None,
            per_page: Some(per_page),
        }
    }
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<Value>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Stream {
    pub id: String,
    /// `forward` or `mixed`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
pub struct StreamingInRequest {
    /// Source URL, e.g. an RTSP camera.
    #[builder(into)]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Value>,
    pub media: Value,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
pub struct StreamingOutRequest {
    /// `rtmp`, `rtsp`, `hls` or `dash`.
    #[builder(into)]
    pub protocol: String,
    #[builder(into)]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    pub media: Value,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct StreamingOut {
    pub id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Value>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
pub struct RecordingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub media: Value,
}

#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Recording {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Value>,
}

/// One JSON-patch style update item.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    #[must_use]
    pub fn replace<P: Into<String>>(path: P, value: Value) -> Self {
        Self {
            op: "replace".to_owned(),
            path: path.into(),
            value,
        }
    }
}

#[non_exhaustive]
#[derive(Clone, Debug, Builder, Serialize)]
pub struct CreateTokenRequest {
    #[builder(into)]
    pub user: String,
    #[builder(into)]
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn room_accepts_underscore_id() {
        let room: Room = serde_json::from_value(json!({
            "_id": "5c8b",
            "name": "standup",
            "participantLimit": -1,
            "views": [{"label": "common"}]
        }))
        .unwrap();

        assert_eq!(room.id, "5c8b");
        assert_eq!(room.participant_limit, Some(-1));
        assert_eq!(room.views.len(), 1);
    }

    #[test]
    fn page_serializes_selected_fields_only() {
        assert_eq!(serde_html_form::to_string(Page::default()).unwrap(), "");
        assert_eq!(
            serde_html_form::to_string(Page::new(2, 10)).unwrap(),
            "page=2&per_page=10"
        );
        assert_eq!(
            serde_html_form::to_string(Page::per_page(5)).unwrap(),
            "per_page=5"
        );
    }

    #[test]
    fn optional_request_fields_are_omitted() {
        let request = CreateRoomRequest::builder().name("standup").build();
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"name": "standup"}));

        let token = CreateTokenRequest::builder()
            .user("alice")
            .role("presenter")
            .build();
        assert_eq!(
            serde_json::to_value(&token).unwrap(),
            json!({"user": "alice", "role": "presenter"})
        );
    }
}
