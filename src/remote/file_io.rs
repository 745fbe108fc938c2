//! Remote file read/write.
//!
//! Writes are base64-encoded and decoded on the host in the same command.
//! Reads return the bytes of `cat` unchanged.

use super::Workspace;
use super::command::ShellCommand;
use crate::error::{Error, Result};
use base64::Engine as _;
use tracing::debug;

/// Image types a read may return as an image block.
pub const IMAGE_MIME_ALLOW_LIST: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Fail with path-not-found unless `path` is readable.
pub async fn access(ws: &Workspace, path: &str) -> Result<()> {
    let remote = ws.resolve(Some(path));
    if ws.is_readable(&remote).await {
        Ok(())
    } else {
        Err(Error::PathNotFound(remote))
    }
}

/// Fetch the full contents of `path`.
pub async fn read_file(ws: &Workspace, path: &str) -> Result<Vec<u8>> {
    access(ws, path).await?;
    let remote = ws.resolve(Some(path));
    let cat = ShellCommand::new("cat").arg(&remote);
    Ok(ws.channel.run(cat.as_str()).await?.stdout)
}

/// Best-effort image type detection via `file --mime-type -b`.
///
/// Anything outside [`IMAGE_MIME_ALLOW_LIST`], and any failure, is `None`.
pub async fn detect_mime_type(ws: &Workspace, path: &str) -> Option<&'static str> {
    let remote = ws.resolve(Some(path));
    let sniff = ShellCommand::new("file")
        .args(["--mime-type", "-b"])
        .arg(&remote);
    match ws.channel.run(sniff.as_str()).await {
        Ok(result) => allow_listed_mime(result.stdout_lossy().trim()),
        Err(err) => {
            debug!(path = %remote, error = %err, "MIME detection failed");
            None
        }
    }
}

pub(crate) fn allow_listed_mime(mime: &str) -> Option<&'static str> {
    IMAGE_MIME_ALLOW_LIST
        .iter()
        .copied()
        .find(|allowed| *allowed == mime)
}

/// Replace the contents of `path` with `content` in a single invocation.
pub async fn write_file(ws: &Workspace, path: &str, content: &[u8]) -> Result<()> {
    let remote = ws.resolve(Some(path));
    let payload = base64::engine::general_purpose::STANDARD.encode(content);
    let cmd = ShellCommand::base64_write(&remote, &payload);
    ws.channel.run(cmd.as_str()).await?;
    debug!(path = %remote, bytes = content.len(), "Wrote remote file");
    Ok(())
}

/// Create `dir` and its parents; succeeds if it already exists.
pub async fn mkdir(ws: &Workspace, dir: &str) -> Result<()> {
    let remote = ws.resolve(Some(dir));
    let cmd = ShellCommand::new("mkdir").arg("-p").arg(&remote);
    ws.channel.run(cmd.as_str()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_allow_listed_images_are_reported() {
        assert_eq!(allow_listed_mime("image/png"), Some("image/png"));
        assert_eq!(allow_listed_mime("image/webp"), Some("image/webp"));
        assert_eq!(allow_listed_mime("image/svg+xml"), None);
        assert_eq!(allow_listed_mime("text/plain"), None);
        assert_eq!(allow_listed_mime(""), None);
    }
}
