use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// A single turn in a conversation. Serialized with camelCase keys and an
/// epoch-millisecond `timestamp` so stored records stay readable by other tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, model: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_and_millis() {
        let mut msg = Message::new(Role::Assistant, "hi", Some("m".into()));
        msg.timestamp = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["timestamp"], 1_700_000_000_123i64);
        assert_eq!(json["model"], "m");
    }

    #[test]
    fn model_is_optional_on_read() {
        let raw = r#"{"id":"a","role":"user","content":"x","timestamp":5}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.role, Role::User);
        assert!(msg.model.is_none());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("tool".parse::<Role>().is_err());
    }
}
