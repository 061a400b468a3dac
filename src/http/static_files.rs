//! Static passthrough files (`try_files $uri @proxy`).
//!
//! A request whose path names a regular file under the document root is
//! served from disk. Any miss falls through to the proxy.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, Method, Request, Response, StatusCode};
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Document root lookup.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path to a file path under the root.
    ///
    /// Returns `None` for the root itself and for any path with `.` or `..`
    /// segments, backslashes, or NUL bytes.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(request_path).ok()?;
        let mut path = self.root.clone();
        let mut segments = 0;

        for segment in decoded.split('/') {
            if segment.is_empty() {
                continue;
            }
            if segment == "." || segment == ".." || segment.contains(['\\', '\0']) {
                return None;
            }
            path.push(segment);
            segments += 1;
        }

        (segments > 0).then_some(path)
    }

    /// Serve the request from disk if it names an existing file.
    pub async fn try_serve(&self, parts: &Parts) -> Option<Response<Body>> {
        if parts.method != Method::GET && parts.method != Method::HEAD {
            return None;
        }

        let path = self.resolve(parts.uri.path())?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return None,
        }

        let mut request = Request::builder()
            .method(parts.method.clone())
            .uri(parts.uri.clone())
            .body(Body::empty())
            .ok()?;
        *request.headers_mut() = parts.headers.clone();
        // Validators are rewritten on every response, so conditional
        // requests must not short-circuit to 304.
        for name in [
            header::IF_MODIFIED_SINCE,
            header::IF_NONE_MATCH,
            header::IF_UNMODIFIED_SINCE,
            header::IF_MATCH,
        ] {
            request.headers_mut().remove(name);
        }

        let response = ServeFile::new(&path)
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        if response.status() == StatusCode::NOT_FOUND {
            return None;
        }

        tracing::debug!(path = %path.display(), status = %response.status(), "Served static file");
        Some(response.map(Body::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(method: Method, uri: &str) -> Parts {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn resolves_paths_under_root() {
        let files = StaticFiles::new("/srv/www");
        assert_eq!(
            files.resolve("/css/site.css"),
            Some(PathBuf::from("/srv/www/css/site.css"))
        );
        assert_eq!(
            files.resolve("/my%20file.txt"),
            Some(PathBuf::from("/srv/www/my file.txt"))
        );
        assert_eq!(files.resolve("/"), None);
        assert_eq!(files.resolve("/../etc/passwd"), None);
        assert_eq!(files.resolve("/%2e%2e/etc/passwd"), None);
        assert_eq!(files.resolve("/a/./b"), None);
    }

    #[tokio::test]
    async fn serves_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("robots.txt"), "User-agent: *\n").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        let files = StaticFiles::new(dir.path());

        let response = files.try_serve(&parts(Method::GET, "/robots.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(files.try_serve(&parts(Method::GET, "/missing.txt")).await.is_none());
        assert!(files.try_serve(&parts(Method::GET, "/assets")).await.is_none());
        assert!(files.try_serve(&parts(Method::POST, "/robots.txt")).await.is_none());
    }
}
