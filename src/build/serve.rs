//! Local file server and browser launching for browser play.

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Local file server error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServeError {
    /// The port could not be bound
    #[error("Failed to bind file server to {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// The browser could not be opened
    #[error("Failed to open browser at {url}: {source}")]
    Browser {
        /// URL that was requested
        url: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
}

/// Handle to the running file server.
///
/// Dropping the handle shuts the server down.
#[derive(Debug)]
pub struct LocalServer {
    addr: SocketAddr,
    root: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
}

impl LocalServer {
    /// Serve `root` on localhost at `port` (0 picks a free port).
    pub async fn start(root: PathBuf, port: u16) -> Result<Self, ServeError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        let addr = listener.local_addr().map_err(|source| ServeError::Bind { addr, source })?;

        let app = Router::new().fallback(serve_file).with_state(Arc::new(root.clone()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("file server shutting down");
                })
                .await
            {
                tracing::error!(error = %e, "file server error");
            }
        });

        tracing::info!(addr = %addr, root = %root.display(), "file server started");
        Ok(Self { addr, root, shutdown: Some(shutdown_tx) })
    }

    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Directory being served.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL of a path relative to the served root.
    pub fn url(&self, path: &str) -> String {
        format!("http://localhost:{}/{}", self.addr.port(), path.trim_start_matches('/'))
    }

    /// Stop serving.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve_file(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let Some(relative) = sanitize(uri.path()) else {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    };

    let mut path = root.join(relative);
    if path.is_dir() {
        path = path.join("index.html");
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Relative path for a request, or `None` when it would leave the root.
fn sanitize(request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("css") => "text/css",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Opens URLs for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`.
    fn open(&self, url: &str) -> Result<(), ServeError>;
}

/// Launcher using the system's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), ServeError> {
        open::that(url).map_err(|source| ServeError::Browser { url: url.to_string(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("/build/debug/html5"), Some(PathBuf::from("build/debug/html5")));
        assert_eq!(sanitize("/./a/b.js"), Some(PathBuf::from("a/b.js")));
        assert_eq!(sanitize("/"), Some(PathBuf::new()));
        assert_eq!(sanitize("/../etc/passwd"), None);
        assert_eq!(sanitize("/a/../../b"), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("kha.js")), "application/javascript");
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("data.arm")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serves_project_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let html5 = temp.path().join("build_game/debug/html5");
        std::fs::create_dir_all(&html5).unwrap();
        std::fs::write(html5.join("index.html"), "<canvas id=\"khanvas\">").unwrap();
        std::fs::write(html5.join("kha.js"), "var kha;").unwrap();

        let server = LocalServer::start(temp.path().to_path_buf(), 0).await.unwrap();
        assert_eq!(server.url("/build_game/debug/html5"), format!("http://localhost:{}/build_game/debug/html5", server.addr().port()));

        let index = get(server.addr(), "/build_game/debug/html5").await;
        assert!(index.starts_with("HTTP/1.1 200"));
        assert!(index.contains("khanvas"));

        let js = get(server.addr(), "/build_game/debug/html5/kha.js").await;
        assert!(js.contains("application/javascript"));

        let missing = get(server.addr(), "/nope.js").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }
}
