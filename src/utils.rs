//! Utility functions for file operations and path manipulation

use std::path::Path;

/// Whether `name` is a bare filename (no separators, no parent references)
///
/// # Examples
///
/// ```
/// use shelf_dl::utils::is_plain_filename;
///
/// assert!(is_plain_filename("Chapter 01.mp3"));
/// assert!(!is_plain_filename("../Chapter 01.mp3"));
/// assert!(!is_plain_filename(""));
/// ```
#[must_use]
pub fn is_plain_filename(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Turn a remote identifier into a single safe directory name
///
/// # Examples
///
/// ```
/// use shelf_dl::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("li_abc123"), "li_abc123");
/// assert_eq!(sanitize_component("../etc"), "_etc");
/// ```
#[must_use]
pub fn sanitize_component(id: &str) -> String {
    let cleaned: String = id
        .replace("..", "_")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();

    // "_/" collapses into "__"; keep a single underscore for readability
    let collapsed = cleaned.replace("__", "_");
    if collapsed.trim().is_empty() {
        "_".to_string()
    } else {
        collapsed
    }
}

/// Infer a mime type from a filename's extension
///
/// Unknown extensions map to `application/octet-stream`.
#[must_use]
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "m4b" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "webm" | "weba" => "audio/webm",
        "wma" => "audio/x-ms-wma",
        "aif" | "aiff" => "audio/aiff",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Move `source` to `destination`, replacing any stale file already there
///
/// The destination is replaced in a single rename, so it is never missing and a failed move
/// leaves the previous file untouched. When the temp directory lives on another mount, the
/// body is first copied next to the destination and then renamed over it.
pub async fn relocate_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    use tokio::fs;

    match fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                ?source,
                ?destination,
                "rename crosses devices, falling back to copy"
            );
            let staging = staging_path(destination);
            let copied = async {
                fs::copy(source, &staging).await?;
                fs::rename(&staging, destination).await
            }
            .await;
            if let Err(e) = copied {
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
            fs::remove_file(source).await
        }
        Err(e) => Err(e),
    }
}

/// Sibling of `destination` used while copying across filesystems
fn staging_path(destination: &Path) -> std::path::PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".relocating");
    destination.with_file_name(name)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plain_filename_rejects_separators() {
        assert!(is_plain_filename("track.mp3"));
        assert!(!is_plain_filename("a/b.mp3"));
        assert!(!is_plain_filename("a\\b.mp3"));
        assert!(!is_plain_filename(".."));
        assert!(!is_plain_filename("   "));
    }

    #[test]
    fn sanitize_component_never_yields_separator() {
        for input in ["li_1", "a/b", "..", "x\\y", "c:d", ""] {
            let out = sanitize_component(input);
            assert!(!out.contains('/') && !out.contains('\\'), "{input} -> {out}");
            assert!(!out.is_empty());
            assert_ne!(out, "..");
        }
    }

    #[test]
    fn mime_types_for_common_audio() {
        assert_eq!(mime_type_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_type_for(Path::new("a.M4B")), "audio/mp4");
        assert_eq!(mime_type_for(Path::new("cover.jpg")), "image/jpeg");
        assert_eq!(
            mime_type_for(Path::new("noext")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn relocate_moves_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.part");
        let dst = dir.path().join("dst.mp3");
        tokio::fs::write(&src, b"audio").await.unwrap();

        relocate_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"audio");
    }

    #[tokio::test]
    async fn relocate_replaces_stale_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.part");
        let dst = dir.path().join("dst.mp3");
        tokio::fs::write(&src, b"fresh").await.unwrap();
        tokio::fs::write(&dst, b"stale").await.unwrap();

        relocate_file(&src, &dst).await.unwrap();

        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn relocate_fails_for_missing_source() {
        let dir = tempdir().unwrap();
        let result = relocate_file(&dir.path().join("nope"), &dir.path().join("dst")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_relocate_keeps_existing_destination() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("dst.mp3");
        tokio::fs::write(&dst, b"previous").await.unwrap();

        let result = relocate_file(&dir.path().join("missing.part"), &dst).await;

        assert!(result.is_err());
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"previous");
    }

    #[test]
    fn staging_path_is_a_sibling() {
        let dst = Path::new("/books/li_1/Chapter 01.mp3");
        assert_eq!(
            staging_path(dst),
            Path::new("/books/li_1/Chapter 01.mp3.relocating")
        );
    }
}
