use std::path::PathBuf;

use super::*;
use crate::config::constants::MAX_ATTACHMENT_BYTES;
use crate::models::{ChatError, chat_error};

/// Creates a file under the temp dir, removed on drop.
struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str, len: u64) -> Self {
        let dir = std::env::temp_dir().join(format!("chatstream-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("failed to create temp dir");
        let path = dir.join(name);
        let file = std::fs::File::create(&path).expect("failed to create temp file");
        file.set_len(len).expect("failed to size temp file");
        Self(path)
    }

    fn path(&self) -> &str {
        self.0.to_str().expect("utf8 path")
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(dir) = self.0.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[tokio::test]
async fn test_load_attachment() {
    let file = TempFile::new("pixel.png", 3);
    let attachment = load_attachment(file.path(), None)
        .await
        .expect("failed to load attachment");

    assert_eq!(attachment.name, "pixel.png");
    assert_eq!(attachment.kind, "image/png");
    assert_eq!(attachment.mime_type.as_deref(), Some("image/png"));
    assert_eq!(attachment.size, 3);
    assert_eq!(attachment.url, "data:image/png;base64,AAAA");

    let renamed = load_attachment(file.path(), Some("logo"))
        .await
        .expect("failed to load attachment");
    assert_eq!(renamed.name, "logo");
}

#[tokio::test]
async fn test_load_attachment_rejects_type_and_size() {
    let text = TempFile::new("notes.txt", 4);
    let err = load_attachment(text.path(), None)
        .await
        .expect_err("text files are not accepted");
    assert!(chat_error(&err).is_some_and(ChatError::is_validation));

    // Sparse file, only the length is checked before reading.
    let big = TempFile::new("scan.pdf", MAX_ATTACHMENT_BYTES + 1);
    let err = load_attachment(big.path(), None)
        .await
        .expect_err("too large");
    assert_eq!(
        chat_error(&err),
        Some(&ChatError::validation(
            "scan.pdf is too large, the maximum size is 20 MB"
        ))
    );
}

#[tokio::test]
async fn test_load_missing_attachment() {
    let err = load_attachment("/nonexistent/chatstream/missing.png", None)
        .await
        .expect_err("file does not exist");
    assert!(chat_error(&err).is_none());
    assert!(err.to_string().contains("missing.png"));
}
