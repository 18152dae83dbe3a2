//! Account cookie files and login instructions.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::UploaderConfig;

/// True if a parsed cookie document carries a usable token.
///
/// Accepted shapes: `token_info.access_token`, `cookie_info.cookies`,
/// top-level `access_token` or top-level `cookies`.
pub fn cookie_has_token(doc: &Value) -> bool {
    let present = |v: Option<&Value>| match v {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(_)) => true,
    };

    present(doc.pointer("/token_info/access_token"))
        || present(doc.pointer("/cookie_info/cookies"))
        || present(doc.get("access_token"))
        || present(doc.get("cookies"))
}

/// Resolve a relative path against the working directory.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Check that a cookie file exists and contains a token.
pub async fn cookie_file_is_valid(path: &Path) -> bool {
    let path = absolutize(path);
    let raw = match tokio::fs::read(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Cookie file not readable at {}: {}", path.display(), e);
            return false;
        }
    };

    match serde_json::from_slice::<Value>(&raw) {
        Ok(doc) => {
            let valid = cookie_has_token(&doc);
            debug!("Cookie file {} valid: {}", path.display(), valid);
            valid
        }
        Err(e) => {
            warn!("Cookie file {} is not JSON: {}", path.display(), e);
            false
        }
    }
}

/// What an operator runs to log an account in.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginInstructions {
    /// Where the cookie file must end up
    pub cookie_file: PathBuf,
    /// Interactive login command
    pub command: String,
    /// Moves the uploader's output into place
    pub post_command: String,
    pub message: String,
}

impl LoginInstructions {
    pub fn for_account(config: &UploaderConfig, account_id: &str) -> Self {
        let cookie_file = absolutize(&config.cookie_path_for(account_id));
        let binary = absolutize(&config.binary_path);
        let cwd = absolutize(Path::new("."));
        Self {
            command: format!("cd {} && {} login", cwd.display(), binary.display()),
            post_command: format!("mv cookies.json {}", cookie_file.display()),
            message: "1. Run the login command in a server terminal\n\
                      2. Choose QR-code login and scan it\n\
                      3. Run the move command to put the cookie file in place"
                .to_string(),
            cookie_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_cookie_shapes() {
        assert!(cookie_has_token(&json!({"token_info": {"access_token": "abc"}})));
        assert!(cookie_has_token(&json!({"cookie_info": {"cookies": [{"name": "SESSDATA"}]}})));
        assert!(cookie_has_token(&json!({"access_token": "abc"})));
        assert!(cookie_has_token(&json!({"cookies": [1]})));

        assert!(!cookie_has_token(&json!({})));
        assert!(!cookie_has_token(&json!({"token_info": {"access_token": ""}})));
        assert!(!cookie_has_token(&json!({"cookie_info": {"cookies": []}})));
        assert!(!cookie_has_token(&json!({"token_info": {}})));
    }

    #[tokio::test]
    async fn test_cookie_file_checks() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        let garbage = dir.path().join("garbage.json");
        tokio::fs::write(&good, br#"{"token_info":{"access_token":"t"}}"#).await.unwrap();
        tokio::fs::write(&bad, br#"{"token_info":{}}"#).await.unwrap();
        tokio::fs::write(&garbage, b"not json").await.unwrap();

        assert!(cookie_file_is_valid(&good).await);
        assert!(!cookie_file_is_valid(&bad).await);
        assert!(!cookie_file_is_valid(&garbage).await);
        assert!(!cookie_file_is_valid(&dir.path().join("missing.json")).await);
    }

    #[test]
    fn test_login_instructions() {
        let config = UploaderConfig {
            binary_path: PathBuf::from("/opt/bin/biliup"),
            cookie_dir: PathBuf::from("/var/cookies"),
            timeout_secs: 10,
        };
        let info = LoginInstructions::for_account(&config, "acc-7");
        assert_eq!(info.cookie_file, PathBuf::from("/var/cookies/acc-7.json"));
        assert!(info.command.ends_with("/opt/bin/biliup login"));
        assert_eq!(info.post_command, "mv cookies.json /var/cookies/acc-7.json");
    }
}
