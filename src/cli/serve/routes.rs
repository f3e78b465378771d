//! Request routing for the webhook and artifact API.
//!
//! ```text
//! POST /push                        {repo, branch, commit}
//! POST /recompute
//! POST /gc                          {units?: [...]}
//! GET  /units
//! GET  /units/{name}/version
//! GET  /units/{name}/build          metadata + status
//! GET  /units/{name}/bundle.js | style.css | index.html
//! GET  /units/{name}/assets/{path}
//! ```

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tiny_http::{Method, Request};

use super::lifecycle::is_shutdown;
use super::response::{
    respond_error, respond_file, respond_json, respond_not_found, respond_unavailable,
};
use crate::orchestrator::{OrchestratorHandle, PushEvent};
use crate::store::StoredBuild;
use crate::system::BuildSystem;

/// Shared state of the request handlers.
pub struct App {
    pub system: Arc<BuildSystem>,
    pub orchestrator: OrchestratorHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route<'a> {
    Push,
    Recompute,
    Gc,
    Units,
    Version(&'a str),
    Build(&'a str),
    File(&'a str, ArtifactFile),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArtifactFile {
    Bundle,
    Css,
    Html,
    Asset(String),
}

impl ArtifactFile {
    fn path_in(&self, build: &StoredBuild) -> Option<std::path::PathBuf> {
        match self {
            Self::Bundle => Some(build.bundle_path()),
            Self::Css => build.css_path(),
            Self::Html => build.html_path(),
            Self::Asset(name) => build.asset_path(name),
        }
    }
}

fn route<'a>(method: &Method, path: &'a str) -> Route<'a> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (Method::Post, ["push"]) => Route::Push,
        (Method::Post, ["recompute"]) => Route::Recompute,
        (Method::Post, ["gc"]) => Route::Gc,
        (Method::Get | Method::Head, ["units"]) => Route::Units,
        (Method::Get | Method::Head, ["units", name, "version"]) => Route::Version(*name),
        (Method::Get | Method::Head, ["units", name, "build"]) => Route::Build(*name),
        (Method::Get | Method::Head, ["units", name, file]) => match *file {
            "bundle.js" => Route::File(*name, ArtifactFile::Bundle),
            "style.css" => Route::File(*name, ArtifactFile::Css),
            "index.html" => Route::File(*name, ArtifactFile::Html),
            _ => Route::NotFound,
        },
        (Method::Get | Method::Head, ["units", name, "assets", rest @ ..]) if !rest.is_empty() => {
            Route::File(*name, ArtifactFile::Asset(rest.join("/")))
        }
        _ => Route::NotFound,
    }
}

#[derive(Debug, Default, Deserialize)]
struct GcRequest {
    units: Option<Vec<String>>,
}

/// Handle a single HTTP request.
pub fn handle_request(mut request: Request, app: &App) -> Result<()> {
    if is_shutdown() {
        return respond_unavailable(request);
    }

    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or_default();
    crate::debug!("serve"; "{} {}", request.method(), path);

    match route(request.method(), path) {
        Route::Push => {
            let event: PushEvent = match read_json(&mut request) {
                Ok(Some(event)) => event,
                Ok(None) => return respond_error(request, 400, "missing push body"),
                Err(e) => return respond_error(request, 400, &format!("{e:#}")),
            };
            match app.orchestrator.push_blocking(event) {
                Ok(outcome) => respond_json(request, 200, &outcome),
                Err(e) => respond_error(request, 500, &format!("{e:#}")),
            }
        }
        Route::Recompute => match app.orchestrator.recompute_blocking() {
            Ok(outcome) => respond_json(request, 200, &outcome),
            Err(e) => respond_error(request, 500, &format!("{e:#}")),
        },
        Route::Gc => {
            let body: GcRequest = match read_json(&mut request) {
                Ok(body) => body.unwrap_or_default(),
                Err(e) => return respond_error(request, 400, &format!("{e:#}")),
            };
            match app.orchestrator.gc_blocking(body.units) {
                Ok(report) => respond_json(
                    request,
                    200,
                    &json!({ "freed": report.freed, "tempCleared": report.temp_cleared }),
                ),
                Err(e) => respond_error(request, 500, &format!("{e:#}")),
            }
        }
        Route::Units => respond_json(request, 200, &app.system.list_buildables()),
        Route::Version(name) => match app.system.get_effective_version(name) {
            Some(ev) => respond_json(request, 200, &json!({ "unit": name, "ev": ev })),
            None => respond_not_found(request),
        },
        Route::Build(name) => {
            if !app.system.has_unit(name) {
                return respond_not_found(request);
            }
            match app.system.get_build(name) {
                Ok(build) => respond_json(
                    request,
                    200,
                    &json!({
                        "metadata": build.metadata,
                        "status": app.system.build_status(&build.metadata.name),
                    }),
                ),
                Err(e) => respond_error(request, 500, &format!("{e:#}")),
            }
        }
        Route::File(name, file) => {
            if !app.system.has_unit(name) {
                return respond_not_found(request);
            }
            let build = match app.system.get_build(name) {
                Ok(build) => build,
                Err(e) => return respond_error(request, 500, &format!("{e:#}")),
            };
            match file.path_in(&build) {
                Some(path) => respond_file(request, &path),
                None => respond_not_found(request),
            }
        }
        Route::NotFound => respond_not_found(request),
    }
}

/// Parse a JSON body; `None` for an empty body.
fn read_json<T: DeserializeOwned>(request: &mut Request) -> Result<Option<T>> {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .context("failed to read request body")?;
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&body).context("invalid JSON body")?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_routes() {
        assert_eq!(route(&Method::Post, "/push"), Route::Push);
        assert_eq!(route(&Method::Post, "/recompute/"), Route::Recompute);
        assert_eq!(route(&Method::Post, "/gc"), Route::Gc);
        assert_eq!(route(&Method::Get, "/push"), Route::NotFound);
    }

    #[test]
    fn test_unit_routes() {
        assert_eq!(route(&Method::Get, "/units"), Route::Units);
        assert_eq!(
            route(&Method::Get, "/units/chat-widget/version"),
            Route::Version("chat-widget")
        );
        assert_eq!(
            route(&Method::Head, "/units/chat-widget/build"),
            Route::Build("chat-widget")
        );
        assert_eq!(
            route(&Method::Get, "/units/chat-widget/bundle.js"),
            Route::File("chat-widget", ArtifactFile::Bundle)
        );
        assert_eq!(
            route(&Method::Get, "/units/chat-widget/style.css"),
            Route::File("chat-widget", ArtifactFile::Css)
        );
        assert_eq!(
            route(&Method::Get, "/units/chat-widget/assets/img/logo.svg"),
            Route::File("chat-widget", ArtifactFile::Asset("img/logo.svg".into()))
        );
        assert_eq!(route(&Method::Get, "/units/chat-widget/assets"), Route::NotFound);
        assert_eq!(route(&Method::Get, "/units/chat-widget/main.js"), Route::NotFound);
        assert_eq!(route(&Method::Delete, "/units"), Route::NotFound);
    }
}
