use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Messaging platforms SofIA serves.
///
/// A closed set: extractor, verifier, and delivery dispatch all match on
/// this enum exhaustively, so adding a platform is a compile-time checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Whatsapp,
    Facebook,
    Instagram,
}

impl Platform {
    /// Whether this platform uses the Messenger payload/delivery shape.
    /// Facebook and Instagram share the Messenger API.
    pub fn is_messenger(&self) -> bool {
        matches!(self, Self::Facebook | Self::Instagram)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Self::Whatsapp),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            _ => Err(()),
        }
    }
}

/// A (sender, text) pair pulled out of a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub platform: Platform,
    pub sender_id: String,
    pub text: String,
}

/// One unit of asynchronous work: answer `text` from `sender_id` on
/// `platform`.
///
/// Tasks cross the receiver → queue → worker boundary as JSON; they carry
/// no references into the receiver process. `attempt` is owned by the
/// worker's retry logic and defaults to 0 on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub platform: Platform,
    pub sender_id: String,
    pub text: String,
    #[serde(default)]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(platform: Platform, sender_id: String, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform,
            sender_id,
            text,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_roundtrip() {
        for (s, p) in [
            ("whatsapp", Platform::Whatsapp),
            ("facebook", Platform::Facebook),
            ("instagram", Platform::Instagram),
        ] {
            assert_eq!(s.parse::<Platform>(), Ok(p));
            assert_eq!(p.as_str(), s);
        }
        assert!("telegram".parse::<Platform>().is_err());
    }

    #[test]
    fn test_messenger_shape_shared_by_facebook_and_instagram() {
        assert!(!Platform::Whatsapp.is_messenger());
        assert!(Platform::Facebook.is_messenger());
        assert!(Platform::Instagram.is_messenger());
    }

    #[test]
    fn test_task_wire_format_defaults_attempt() {
        // A broker message carries only what the receiver knew.
        let json = r#"{
            "id": "0d4e8b9a-7c1f-4d3e-9b2a-5f6c7d8e9f00",
            "platform": "whatsapp",
            "sender_id": "5584999990000",
            "text": "qual o horário?",
            "enqueued_at": "2024-06-01T12:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.platform, Platform::Whatsapp);
        assert_eq!(task.attempt, 0);
        assert_eq!(task.text, "qual o horário?");
    }
}
