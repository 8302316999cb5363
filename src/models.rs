//! Data models and structures
//!
//! Defines the typed host events, the upload result handed back to the
//! forum, and the message shape published to the broker.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Post identifier as the forum emits it; either form is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PostId {
    Number(i64),
    Text(String),
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Number(n) => write!(f, "{}", n),
            PostId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub pid: PostId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Payload of the "post created" hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEvent {
    pub post: Post,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostEvent {
    pub fn validate(&self) -> Result<()> {
        if let PostId::Text(pid) = &self.post.pid {
            if pid.trim().is_empty() {
                return Err(Error::InvalidEvent("post.pid is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Partition key for the posts topic.
    pub fn key(&self) -> String {
        self.post.pid.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Local path of the file the forum just wrote.
    pub path: String,
    /// Original file name as uploaded by the user.
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of the "image uploaded" hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEvent {
    pub image: ImageDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UploadEvent {
    /// Check required fields and normalize the optional ones in place.
    pub fn validate(&mut self) -> Result<()> {
        if self.image.path.trim().is_empty() {
            return Err(Error::InvalidEvent("image.path is empty".to_string()));
        }
        if self.image.name.trim().is_empty() {
            return Err(Error::InvalidEvent("image.name is empty".to_string()));
        }
        if self.image.url.is_empty() {
            self.image.url = self.image.path.clone();
        }
        self.folder = self
            .folder
            .take()
            .map(|f| f.trim().trim_matches('/').to_string())
            .filter(|f| !f.is_empty());
        Ok(())
    }

    /// What the forum keeps when relocation does not happen.
    pub fn local_reply(&self) -> ImageReply {
        ImageReply {
            url: self.image.url.clone(),
            path: self.image.path.clone(),
            name: self.image.name.clone(),
        }
    }
}

/// A host event tagged by the hook that fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "lowercase")]
pub enum HostEvent {
    Post(PostEvent),
    Upload(UploadEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub remote_url: String,
    pub storage_key: String,
    pub generated_name: String,
}

/// Result of a relocation attempt; the fallback is an outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Relocated(UploadResult),
    FellBackToLocal { reason: String },
}

impl UploadOutcome {
    pub fn is_relocated(&self) -> bool {
        matches!(self, UploadOutcome::Relocated(_))
    }
}

/// The `{url, path, name}` triple the forum persists for an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageReply {
    pub url: String,
    pub path: String,
    pub name: String,
}

impl From<&UploadResult> for ImageReply {
    fn from(result: &UploadResult) -> Self {
        Self {
            url: result.remote_url.clone(),
            path: result.storage_key.clone(),
            name: result.generated_name.clone(),
        }
    }
}

/// Storage location attached to forwarded upload events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageLocation {
    pub url: String,
    pub path: String,
    pub bucket: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: String,
    pub value: String,
}

impl BrokerMessage {
    pub fn json<T: Serialize>(topic: &str, key: String, payload: &T) -> Result<Self> {
        Ok(Self {
            topic: topic.to_string(),
            key,
            value: serde_json::to_string(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_post_event_keeps_unknown_fields() {
        let event: PostEvent = serde_json::from_value(json!({
            "post": {"pid": 42, "uid": 7, "content": "hello"},
            "caller": {"uid": 7}
        }))
        .unwrap();

        assert_eq!(event.key(), "42");
        assert_eq!(event.post.fields["content"], json!("hello"));

        let round: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            round,
            json!({"post": {"pid": 42, "uid": 7, "content": "hello"}, "caller": {"uid": 7}})
        );
    }

    #[test]
    fn test_post_id_accepts_string() {
        let event: PostEvent =
            serde_json::from_value(json!({"post": {"pid": "p-9"}})).unwrap();
        assert_eq!(event.key(), "p-9");
        assert!(event.validate().is_ok());

        let empty: PostEvent = serde_json::from_value(json!({"post": {"pid": " "}})).unwrap();
        assert!(matches!(empty.validate(), Err(Error::InvalidEvent(_))));
    }

    #[test]
    fn test_post_id_accepts_negative_integer() {
        let event: PostEvent = serde_json::from_value(json!({"post": {"pid": -3}})).unwrap();
        assert_eq!(event.post.pid, PostId::Number(-3));
        assert_eq!(event.key(), "-3");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_post_without_pid_is_rejected() {
        let result: std::result::Result<PostEvent, _> =
            serde_json::from_value(json!({"post": {"content": "x"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_upload_event_normalization() {
        let mut event: UploadEvent = serde_json::from_value(json!({
            "image": {"path": "/tmp/a.png", "name": "a.png"},
            "folder": "/avatars/",
            "uid": 3
        }))
        .unwrap();

        event.validate().unwrap();
        assert_eq!(event.folder.as_deref(), Some("avatars"));
        assert_eq!(event.image.url, "/tmp/a.png");
        assert_eq!(event.extra["uid"], json!(3));

        let mut blank: UploadEvent = serde_json::from_value(json!({
            "image": {"path": "/tmp/a.png", "name": "a.png", "url": "/assets/a.png"},
            "folder": ""
        }))
        .unwrap();
        blank.validate().unwrap();
        assert_eq!(blank.folder, None);
        assert_eq!(blank.image.url, "/assets/a.png");
    }

    #[test]
    fn test_upload_event_requires_path_and_name() {
        let mut event: UploadEvent = serde_json::from_value(json!({
            "image": {"path": "", "name": "a.png"}
        }))
        .unwrap();
        assert!(event.validate().is_err());

        let mut event: UploadEvent = serde_json::from_value(json!({
            "image": {"path": "/tmp/a.png", "name": ""}
        }))
        .unwrap();
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_host_event_tagging() {
        let event: HostEvent = serde_json::from_str(
            r#"{"hook": "upload", "image": {"path": "/tmp/b.jpg", "name": "b.jpg"}}"#,
        )
        .unwrap();
        assert!(matches!(event, HostEvent::Upload(_)));

        let event: HostEvent =
            serde_json::from_str(r#"{"hook": "post", "post": {"pid": 1}}"#).unwrap();
        assert!(matches!(event, HostEvent::Post(_)));

        assert!(serde_json::from_str::<HostEvent>(r#"{"hook": "vote"}"#).is_err());
    }

    #[test]
    fn test_image_reply_from_result() {
        let result = UploadResult {
            remote_url: "http://cdn/b/k.png".to_string(),
            storage_key: "k.png".to_string(),
            generated_name: "k.png".to_string(),
        };
        let reply = ImageReply::from(&result);
        assert_eq!(reply.url, "http://cdn/b/k.png");
        assert_eq!(reply.path, "k.png");
    }
}
