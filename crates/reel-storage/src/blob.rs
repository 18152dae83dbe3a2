//! Durable blob storage interface.

use async_trait::async_trait;
use std::path::Path;
use uuid::Uuid;

use crate::error::StorageResult;

/// Object storage consumed by the assembly and publish pipelines.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download an object into memory.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object to a local file, creating parent directories.
    async fn download_to_path(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Store bytes under `key`.
    async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()>;

    /// Store a local file under `key`.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Unique key `{prefix}/{user_id}/{uuid}_{file_name}`.
    fn generate_key(&self, user_id: &str, file_name: &str, prefix: &str) -> String {
        generate_key(user_id, file_name, prefix)
    }
}

/// Unique key `{prefix}/{user_id}/{uuid}_{file_name}`.
pub fn generate_key(user_id: &str, file_name: &str, prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let id = Uuid::new_v4();
    if prefix.is_empty() {
        format!("{user_id}/{id}_{file_name}")
    } else {
        format!("{prefix}/{user_id}/{id}_{file_name}")
    }
}

/// Content type for a file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_layout() {
        let key = generate_key("user-1", "chapter_ch9_movie.mp4", "videos");
        let rest = key.strip_prefix("videos/user-1/").unwrap();
        let (id, name) = rest.split_once('_').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(name, "chapter_ch9_movie.mp4");

        assert_ne!(key, generate_key("user-1", "chapter_ch9_movie.mp4", "videos"));
        assert!(generate_key("u", "f.mp4", "/videos/").starts_with("videos/u/"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/b.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("cover.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
