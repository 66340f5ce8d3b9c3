#[cfg(test)]
#[path = "attachment_test.rs"]
mod tests;

use base64::Engine as _;
use eyre::{Context, Result};

use crate::config::{basename, resolve_path};
use crate::models::{Attachment, mime_type_for_path};

/// Reads a local file into an inline attachment with a `data:` URL. Size and
/// type are checked before the file is read.
pub async fn load_attachment(path: &str, name: Option<&str>) -> Result<Attachment> {
    let path = resolve_path(path)?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .wrap_err(format!("reading {}", path))?;
    if !metadata.is_file() {
        eyre::bail!("{} is not a file", path);
    }

    let mime = mime_type_for_path(&path).unwrap_or("application/octet-stream");
    let mut attachment = Attachment {
        name: name.map(String::from).unwrap_or_else(|| basename(&path)),
        kind: mime.to_string(),
        size: metadata.len(),
        url: String::new(),
        mime_type: Some(mime.to_string()),
    };
    attachment.validate()?;

    let bytes = tokio::fs::read(&path)
        .await
        .wrap_err(format!("reading {}", path))?;
    attachment.url = format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    );
    log::debug!("attached {} ({} bytes)", attachment.name, attachment.size);
    Ok(attachment)
}
