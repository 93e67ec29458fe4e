//! Manual upload form: `GET /` lists the catalog, `POST /upload` stores one
//! image, `/assets/...` serves the stored files.

use crate::batch::Placement;
use crate::catalog::{self, Catalog, CatalogStore};
use crate::error::{AssetError, Result};
use crate::normalizer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Component, Path};
use std::thread;
use tiny_http::{Header, Method, Request, Response, Server};

const ASSETS_PREFIX: &str = "/assets/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResponse {
    Success { path: String },
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: Vec<u8>,
    pub asset_type: String,
    pub asset_name: String,
    pub slug: String,
    pub level: Option<String>,
}

/// Normalizes the upload and records it, creating the entry if the name is new.
/// Returns the stored catalog path.
pub fn store_upload(store: &CatalogStore, upload: &UploadRequest) -> Result<String> {
    catalog::validate_segment("asset_type", &upload.asset_type)?;
    catalog::validate_segment("slug", &upload.slug)?;
    if upload.asset_name.trim().is_empty() {
        return Err(AssetError::invalid_field("asset_name", "must not be empty"));
    }

    let normalized = normalizer::normalize_bytes(&upload.file)?;

    store.update(|catalog| {
        let id = catalog.resolve_or_create(&upload.asset_type, &upload.asset_name);
        let entry = catalog
            .entry_mut(&upload.asset_type, &id)
            .ok_or_else(|| AssetError::UnknownType(upload.asset_type.clone()))?;

        let placement = match &upload.level {
            Some(level) => Placement::Level(level.clone()),
            None => Placement::Icon,
        };
        let folder = catalog::folder_for(entry, &upload.asset_type);
        let rel_path = catalog::join_rel(&folder, &placement.file_name(&upload.slug));

        normalized.save(&store.absolute_path(&rel_path))?;
        placement.apply(entry, rel_path.clone());

        log::info!(
            "Stored upload for '{}' ({}) at {}",
            upload.asset_name,
            id,
            rel_path
        );
        Ok(rel_path)
    })
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    asset_type: Option<String>,
    asset_name: Option<String>,
    slug: Option<String>,
    level: Option<String>,
}

impl UploadForm {
    fn into_request(self) -> Result<UploadRequest> {
        fn required<T>(value: Option<T>, field: &'static str) -> Result<T> {
            value.ok_or_else(|| AssetError::invalid_field(field, "missing form field"))
        }

        Ok(UploadRequest {
            file: required(self.file, "file")?,
            asset_type: required(self.asset_type, "asset_type")?,
            asset_name: required(self.asset_name, "asset_name")?,
            slug: required(self.slug, "slug")?,
            level: self
                .level
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
        })
    }
}

async fn read_upload_form(body: Vec<u8>, boundary: String) -> Result<UploadRequest> {
    let stream = futures_util::stream::once(async move { Ok::<Vec<u8>, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(field.bytes().await?.to_vec()),
            "asset_type" => form.asset_type = Some(field.text().await?),
            "asset_name" => form.asset_name = Some(field.text().await?),
            "slug" => form.slug = Some(field.text().await?),
            "level" => form.level = Some(field.text().await?),
            _ => log::debug!("Ignoring form field '{}'", name),
        }
    }

    form.into_request()
}

struct Reply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Reply {
    fn json(status: u16, response: &UploadResponse) -> Self {
        let body = serde_json::to_vec(response).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    fn html(status: u16, html: String) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: html.into_bytes(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain; charset=utf-8",
            body: b"Not Found".to_vec(),
        }
    }

    fn into_response(self) -> Response<io::Cursor<Vec<u8>>> {
        let response = Response::from_data(self.body).with_status_code(self.status);
        match Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes()) {
            Ok(header) => response.with_header(header),
            Err(()) => response,
        }
    }
}

pub struct UploadServer {
    server: Server,
    store: CatalogStore,
    max_upload_bytes: u64,
}

impl UploadServer {
    pub fn bind(addr: &str, store: CatalogStore, max_upload_bytes: u64) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self {
            server,
            store,
            max_upload_bytes,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serves each request on its own thread until the listener shuts down.
    /// Concurrent uploads serialize on the catalog lock.
    pub fn run(self) -> Result<()> {
        // multer is async; request threads share this runtime through block_on
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()?;

        thread::scope(|scope| {
            for mut request in self.server.incoming_requests() {
                let this = &self;
                let runtime = &runtime;
                scope.spawn(move || {
                    let reply = this.handle(runtime, &mut request);
                    log::debug!("{} {} -> {}", request.method(), request.url(), reply.status);
                    if let Err(e) = request.respond(reply.into_response()) {
                        log::warn!("Failed to send response: {}", e);
                    }
                });
            }
        });
        Ok(())
    }

    fn handle(&self, runtime: &tokio::runtime::Runtime, request: &mut Request) -> Reply {
        let url = request.url().to_string();
        let path = url.split('?').next().unwrap_or("/");
        let method = request.method().clone();

        match (&method, path) {
            (Method::Get, "/") => self.index(),
            (Method::Post, "/upload") => self.upload(runtime, request),
            (Method::Get, p) if p.starts_with(ASSETS_PREFIX) => self.static_file(&p[ASSETS_PREFIX.len()..]),
            _ => Reply::not_found(),
        }
    }

    fn index(&self) -> Reply {
        match self.store.load() {
            Ok(catalog) => Reply::html(200, render_index(&catalog)),
            Err(e) => {
                log::error!("Could not load catalog: {}", e);
                Reply::html(
                    500,
                    format!("<h1>Catalog unavailable</h1><p>{}</p>", escape_html(&e.to_string())),
                )
            }
        }
    }

    fn upload(&self, runtime: &tokio::runtime::Runtime, request: &mut Request) -> Reply {
        match self.receive_upload(runtime, request) {
            Ok(path) => Reply::json(200, &UploadResponse::Success { path }),
            Err(e) => {
                log::error!("Upload failed: {}", e);
                Reply::json(
                    400,
                    &UploadResponse::Error {
                        message: e.to_string(),
                    },
                )
            }
        }
    }

    fn receive_upload(&self, runtime: &tokio::runtime::Runtime, request: &mut Request) -> Result<String> {
        let content_type = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Content-Type"))
            .map(|h| h.value.as_str().to_string())
            .ok_or_else(|| AssetError::invalid_field("content type", "expected multipart/form-data"))?;
        let boundary = multer::parse_boundary(&content_type)?;

        let mut body = Vec::new();
        request
            .as_reader()
            .take(self.max_upload_bytes + 1)
            .read_to_end(&mut body)?;
        if body.len() as u64 > self.max_upload_bytes {
            return Err(AssetError::invalid_field(
                "file",
                format!("upload exceeds {} bytes", self.max_upload_bytes),
            ));
        }

        let upload = runtime.block_on(read_upload_form(body, boundary))?;
        store_upload(&self.store, &upload)
    }

    fn static_file(&self, rel: &str) -> Reply {
        let decoded = match urlencoding::decode(rel) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return Reply::not_found(),
        };
        let rel_path = Path::new(&decoded);
        if rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Reply::not_found();
        }

        let full = self.store.assets_dir().join(rel_path);
        match fs::read(&full) {
            Ok(body) => Reply {
                status: 200,
                content_type: content_type_for(&full),
                body,
            },
            Err(_) => Reply::not_found(),
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "css" => "text/css",
        "js" => "text/javascript",
        "html" => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn asset_link(rel_path: &str, label: &str) -> String {
    let href = format!("/assets/{}", rel_path.trim_start_matches('/'));
    format!(
        r#"<a href="{href}"><img src="{href}" alt="{label}" title="{label}" width="48" height="48"></a>"#,
        href = escape_html(&href),
        label = escape_html(label),
    )
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Asset Lab</title>
<style>
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; margin-bottom: 2em; }
td, th { border: 1px solid #ccc; padding: 4px 8px; vertical-align: top; }
form label { display: block; margin: 4px 0; }
</style>
</head>
<body>
<h1>Asset Lab</h1>
<form action="/upload" method="post" enctype="multipart/form-data">
<label>Image <input type="file" name="file" accept="image/png" required></label>
<label>Asset type <input type="text" name="asset_type" placeholder="buildings" required></label>
<label>Asset name <input type="text" name="asset_name" placeholder="Gold Storage" required></label>
<label>Slug <input type="text" name="slug" placeholder="gold-storage-19" required></label>
<label>Level <input type="text" name="level" placeholder="optional"></label>
<button type="submit">Upload</button>
</form>
"#;

fn render_index(catalog: &Catalog) -> String {
    let mut html = String::from(PAGE_HEAD);

    if catalog.is_empty() {
        html.push_str("<p>The catalog is empty.</p>\n");
    }

    for (asset_type, entries) in catalog.types() {
        html.push_str(&format!(
            "<h2>{} ({})</h2>\n<table>\n<tr><th>ID</th><th>Name</th><th>Icon</th><th>Levels</th><th>Poses</th></tr>\n",
            escape_html(asset_type),
            entries.len()
        ));
        for (id, entry) in entries {
            let icon = entry
                .icon
                .as_deref()
                .map(|p| asset_link(p, &entry.name))
                .unwrap_or_default();
            let levels: String = entry
                .levels
                .iter()
                .flatten()
                .map(|(level, path)| asset_link(path, &format!("Level {}", level)))
                .collect();
            let poses: String = entry
                .poses
                .iter()
                .flatten()
                .map(|(index, path)| asset_link(path, &format!("Pose {}", index)))
                .collect();
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(id),
                escape_html(&entry.name),
                icon,
                levels,
                poses
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
