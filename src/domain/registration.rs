//! User registration payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user sign-up event, the payload of the registration queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegistration {
    pub name: String,
    pub email: String,
    pub telegram_user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    pub registration_time: DateTime<Utc>,
    pub source: String,
}

impl UserRegistration {
    /// Registration with only the required fields set.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        telegram_user_id: i64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            telegram_user_id,
            telegram_username: None,
            first_name: None,
            last_name: None,
            phone_number: None,
            language_code: None,
            registration_time: Utc::now(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let reg = UserRegistration::new("Ada", "ada@example.com", 42, "signup-form");
        let json = serde_json::to_value(&reg).unwrap();

        assert_eq!(json["telegram_user_id"], 42);
        assert_eq!(json["source"], "signup-form");
        assert!(json.get("telegram_username").is_none());
        assert!(json.get("phone_number").is_none());
    }

    #[test]
    fn test_decode_full_record() {
        let raw = r#"{
            "name": "John Demo User",
            "email": "john.demo@example.com",
            "telegram_user_id": 123456789,
            "telegram_username": "johndemo",
            "language_code": "en",
            "registration_time": "2024-05-01T10:00:00Z",
            "source": "demo"
        }"#;
        let reg: UserRegistration = serde_json::from_str(raw).unwrap();
        assert_eq!(reg.telegram_username.as_deref(), Some("johndemo"));
        assert_eq!(reg.first_name, None);
        assert_eq!(reg.registration_time.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
