//! Static asset resolution for the web UI.
//!
//! Maps request paths onto files under the web root and picks the response
//! headers. Reading the file is left to the platform HTTP layer.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// File served for directory paths and unknown routes.
pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// Path tries to leave the web root.
    #[error("invalid path: {0}")]
    Traversal(String),
}

/// Response headers for a served file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetType {
    pub content_type: &'static str,
    /// The file is stored pre-compressed and must be sent with
    /// `Content-Encoding: gzip`.
    pub gzip: bool,
}

/// Resolve a request path to a file under `web_root`.
///
/// Paths ending in `/` map to that directory's `index.html`.
pub fn resolve(web_root: &Path, uri_path: &str) -> Result<PathBuf, AssetError> {
    let path = uri_path.split(['?', '#']).next().unwrap_or_default();
    if path.contains("..") || path.contains('\\') {
        return Err(AssetError::Traversal(uri_path.to_string()));
    }

    let relative = path.trim_start_matches('/');
    let mut file = web_root.join(relative);
    if relative.is_empty() || path.ends_with('/') {
        file.push(INDEX_FILE);
    }
    Ok(file)
}

/// The single-page-app fallback file.
pub fn index(web_root: &Path) -> PathBuf {
    web_root.join(INDEX_FILE)
}

/// Content type by file extension (case-insensitive).
pub fn asset_type(path: &Path) -> AssetType {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let (content_type, gzip) = match ext.as_str() {
        "html" => ("text/html", true),
        "js" => ("application/javascript", true),
        "css" => ("text/css", true),
        "png" => ("image/png", false),
        "ico" => ("image/x-icon", false),
        "svg" => ("text/xml", false),
        _ => ("text/plain", false),
    };
    AssetType { content_type, gzip }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let root = Path::new("/www");
        assert_eq!(resolve(root, "/").unwrap(), Path::new("/www/index.html"));
        assert_eq!(
            resolve(root, "/js/app.js").unwrap(),
            Path::new("/www/js/app.js")
        );
        assert_eq!(
            resolve(root, "/docs/").unwrap(),
            Path::new("/www/docs/index.html")
        );
        assert_eq!(
            resolve(root, "/favicon.ico?v=2").unwrap(),
            Path::new("/www/favicon.ico")
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/www");
        assert!(resolve(root, "/../etc/passwd").is_err());
        assert!(resolve(root, "/css/../../secret").is_err());
        assert!(resolve(root, "/..").is_err());
        assert!(resolve(root, "/app..min.js").is_err());
        assert!(resolve(root, "/app.min.js").is_ok());
    }

    #[test]
    fn test_asset_types() {
        let html = asset_type(Path::new("index.html"));
        assert_eq!(html.content_type, "text/html");
        assert!(html.gzip);

        assert!(asset_type(Path::new("app.JS")).gzip);
        assert_eq!(asset_type(Path::new("logo.svg")).content_type, "text/xml");
        assert!(!asset_type(Path::new("logo.png")).gzip);
        assert_eq!(asset_type(Path::new("robots.txt")).content_type, "text/plain");
        assert_eq!(asset_type(Path::new("LICENSE")).content_type, "text/plain");
    }
}
