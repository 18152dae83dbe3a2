//! Publishing platform accounts.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of the last interactive login for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl LoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStatus::Pending => "pending",
            LoginStatus::Success => "success",
            LoginStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A platform account whose cookie file authorizes uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublishAccount {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Path of the uploader's cookie/credential file
    pub cookie_path: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub login_status: LoginStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl PublishAccount {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
        cookie_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
            cookie_path: cookie_path.into(),
            is_active: true,
            is_default: false,
            login_status: LoginStatus::Pending,
            last_login_at: None,
        }
    }

    /// Record a successful login at `at`.
    pub fn mark_logged_in(&mut self, at: DateTime<Utc>) {
        self.login_status = LoginStatus::Success;
        self.last_login_at = Some(at);
    }

    /// Active accounts are the only ones eligible for publishing.
    pub fn is_usable(&self) -> bool {
        self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_defaults() {
        let account = PublishAccount::new("a1", "u1", "main", "/cookies/a1.json");
        assert!(account.is_usable());
        assert!(!account.is_default);
        assert_eq!(account.login_status, LoginStatus::Pending);
    }

    #[test]
    fn test_mark_logged_in() {
        let mut account = PublishAccount::new("a1", "u1", "main", "/cookies/a1.json");
        let now = Utc::now();
        account.mark_logged_in(now);
        assert_eq!(account.login_status, LoginStatus::Success);
        assert_eq!(account.last_login_at, Some(now));
    }
}
