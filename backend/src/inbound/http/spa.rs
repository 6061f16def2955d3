//! Fallback for requests no API route matched.
//!
//! Unmatched `/api` paths get a JSON 404. Everything else is served from the
//! static asset directory as a single-page app: the requested file when it
//! exists, `index.html` otherwise. Reads go through `cap_std`, so a request
//! cannot reach outside the directory.

use std::io;
use std::path::Path;
use std::sync::Arc;

use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse, Route, web};
use cap_std::{ambient_authority, fs::Dir};
use tracing::{error, warn};

use super::error::ApiError;

const INDEX: &str = "index.html";

/// Handle to the static asset directory, if one is configured.
#[derive(Clone, Default)]
pub struct SpaAssets {
    dir: Option<Arc<Dir>>,
}

impl std::fmt::Debug for SpaAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaAssets")
            .field("enabled", &self.dir.is_some())
            .finish()
    }
}

impl SpaAssets {
    /// No static assets; every non-API path is a 404.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Serve assets from `path`.
    ///
    /// # Errors
    /// Returns the I/O error when the directory cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        Dir::open_ambient_dir(path, ambient_authority()).map(Self::from_dir)
    }

    pub fn from_dir(dir: Dir) -> Self {
        Self {
            dir: Some(Arc::new(dir)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Route suitable for `App::default_service`.
    pub fn service(self) -> Route {
        web::to(move |req: HttpRequest| {
            let assets = self.clone();
            async move { assets.respond(&req).await }
        })
    }

    async fn respond(&self, req: &HttpRequest) -> HttpResponse {
        let path = req.path();
        if is_api_path(path) {
            return not_found();
        }
        let Some(dir) = self.dir.clone() else {
            return not_found();
        };
        if !matches!(*req.method(), Method::GET | Method::HEAD) {
            return not_found();
        }

        let relative = sanitise(path);
        match web::block(move || read_asset(&dir, relative.as_deref())).await {
            Ok(Ok((name, bytes))) => HttpResponse::Ok()
                .content_type(content_type(&name))
                .body(bytes),
            Ok(Err(err)) => {
                warn!(error = %err, path = %req.path(), "static asset unavailable");
                not_found()
            }
            Err(err) => {
                error!(error = %err, "static asset read was cancelled");
                ApiError::internal_server_error("Internal server error.").write()
            }
        }
    }
}

fn not_found() -> HttpResponse {
    ApiError::not_found("Not found.").write()
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Normalise a request path into a directory-relative file name.
///
/// Returns `None` for the root and for any path with a parent segment.
fn sanitise(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            other => parts.push(other),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn read_asset(dir: &Dir, relative: Option<&str>) -> io::Result<(String, Vec<u8>)> {
    if let Some(relative) = relative {
        if dir.metadata(relative).is_ok_and(|meta| meta.is_file()) {
            return dir.read(relative).map(|bytes| (relative.to_owned(), bytes));
        }
    }
    dir.read(INDEX).map(|bytes| (INDEX.to_owned(), bytes))
}

fn content_type(name: &str) -> String {
    let guess = mime_guess::from_path(name).first_or_octet_stream();
    if guess.type_() == mime_guess::mime::TEXT {
        format!("{guess}; charset=utf-8")
    } else {
        guess.to_string()
    }
}
