//! Test-case blob store: flat files under `store_dir` plus a JSON metadata
//! index at `db_path`. File-mode submissions reach it through the judge
//! core's `TestDataStore` interface; everything else is HTTP CRUD.

use crate::auth::Authorized;
use crate::config::StorageConfig;

use gavel_judge::TestDataStore;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use actix_web::{delete, error, get, post, put, web, HttpResponse, Responder, Result as WebResult};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_FILENAME_LEN: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct StorageEngine {
    store_dir: PathBuf,
    db_path: PathBuf,
    index: Mutex<BTreeMap<String, FileMetadata>>,
}

impl StorageEngine {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.store_dir).with_context(|| {
            format!("failed to create store directory {:?}", config.store_dir)
        })?;

        let index = if config.db_path.exists() {
            let data = fs::read(&config.db_path)
                .with_context(|| format!("failed to read metadata index {:?}", config.db_path))?;
            serde_json::from_slice(&data)
                .with_context(|| format!("failed to parse metadata index {:?}", config.db_path))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            store_dir: config.store_dir.clone(),
            db_path: config.db_path.clone(),
            index: Mutex::new(index),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, FileMetadata>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, index: &BTreeMap<String, FileMetadata>) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(index)?;
        fs::write(&self.db_path, data)
            .with_context(|| format!("failed to write metadata index {:?}", self.db_path))?;
        Ok(())
    }

    pub fn write_file(&self, filename: &str, content: &[u8]) -> Result<FileMetadata> {
        validate_filename(filename)?;
        if std::str::from_utf8(content).is_err() {
            bail!("only UTF-8 testcase files are allowed");
        }

        fs::write(self.store_dir.join(filename), content)
            .with_context(|| format!("failed to write file {}", filename))?;

        let now = Utc::now();
        let mut index = self.lock();
        let metadata = index
            .entry(filename.to_owned())
            .and_modify(|m| {
                m.size = content.len() as u64;
                m.updated_at = now;
            })
            .or_insert_with(|| FileMetadata {
                filename: filename.to_owned(),
                size: content.len() as u64,
                content_type: content_type_for(filename).to_owned(),
                created_at: now,
                updated_at: now,
            })
            .clone();
        self.persist(&index)?;
        Ok(metadata)
    }

    pub fn read_file(&self, filename: &str) -> Result<Vec<u8>> {
        validate_filename(filename)?;
        if !self.lock().contains_key(filename) {
            bail!("file not found: {}", filename);
        }
        fs::read(self.store_dir.join(filename))
            .with_context(|| format!("failed to open file {}", filename))
    }

    pub fn metadata(&self, filename: &str) -> Option<FileMetadata> {
        self.lock().get(filename).cloned()
    }

    pub fn list(&self) -> Vec<FileMetadata> {
        self.lock().values().cloned().collect()
    }

    /// Returns whether the file existed.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        validate_filename(filename)?;
        let mut index = self.lock();
        let existed = index.remove(filename).is_some();
        if existed {
            self.persist(&index)?;
        }
        match fs::remove_file(self.store_dir.join(filename)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).with_context(|| format!("failed to delete {}", filename)),
        }
        Ok(existed)
    }
}

impl TestDataStore for StorageEngine {
    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        StorageEngine::read_file(self, name)
    }
}

fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        bail!("invalid filename");
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or(' ');
    if !first.is_ascii_alphanumeric() {
        bail!("invalid filename");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        bail!("invalid filename");
    }
    Ok(())
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("json") => "application/json",
        Some("txt") | Some("in") | Some("out") => "text/plain",
        _ => "text/plain",
    }
}

// --- HTTP surface -----------------------------------------------------------

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/storage")
            .service(create_file)
            .service(list_files)
            .service(download_file)
            .service(file_metadata)
            .service(read_file)
            .service(update_file)
            .service(delete_file),
    );
}

#[derive(Debug, Deserialize)]
struct CreateFileRequest {
    filename: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct FileContentResponse {
    filename: String,
    content: String,
}

fn bad_request(err: anyhow::Error) -> actix_web::Error {
    error::ErrorBadRequest(format!("{:#}", err))
}

/// POST /storage/files
#[post("/files")]
async fn create_file(
    _auth: Authorized,
    store: web::Data<StorageEngine>,
    body: web::Json<CreateFileRequest>,
) -> WebResult<impl Responder> {
    let metadata = store
        .write_file(&body.filename, body.content.as_bytes())
        .map_err(bad_request)?;
    Ok(web::Json(metadata))
}

/// GET /storage/files
#[get("/files")]
async fn list_files(store: web::Data<StorageEngine>) -> impl Responder {
    web::Json(store.list())
}

/// GET /storage/files/{name}
#[get("/files/{name}")]
async fn read_file(
    store: web::Data<StorageEngine>,
    path: web::Path<String>,
) -> WebResult<impl Responder> {
    let name = path.into_inner();
    if store.metadata(&name).is_none() {
        return Err(error::ErrorNotFound("file not found"));
    }
    let content = store.read_file(&name).map_err(error::ErrorInternalServerError)?;
    Ok(web::Json(FileContentResponse {
        filename: name,
        content: String::from_utf8_lossy(&content).into_owned(),
    }))
}

/// GET /storage/files/{name}/download
#[get("/files/{name}/download")]
async fn download_file(
    store: web::Data<StorageEngine>,
    path: web::Path<String>,
) -> WebResult<HttpResponse> {
    let name = path.into_inner();
    let metadata = store
        .metadata(&name)
        .ok_or_else(|| error::ErrorNotFound("file not found"))?;
    let content = store.read_file(&name).map_err(error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok()
        .content_type(metadata.content_type)
        .body(content))
}

/// GET /storage/files/{name}/metadata
#[get("/files/{name}/metadata")]
async fn file_metadata(
    store: web::Data<StorageEngine>,
    path: web::Path<String>,
) -> WebResult<impl Responder> {
    match store.metadata(&path.into_inner()) {
        Some(metadata) => Ok(web::Json(metadata)),
        None => Err(error::ErrorNotFound("file not found")),
    }
}

/// PUT /storage/files/{name}
#[put("/files/{name}")]
async fn update_file(
    _auth: Authorized,
    store: web::Data<StorageEngine>,
    path: web::Path<String>,
    body: String,
) -> WebResult<impl Responder> {
    let metadata = store
        .write_file(&path.into_inner(), body.as_bytes())
        .map_err(bad_request)?;
    Ok(web::Json(metadata))
}

/// DELETE /storage/files/{name}
#[delete("/files/{name}")]
async fn delete_file(
    _auth: Authorized,
    store: web::Data<StorageEngine>,
    path: web::Path<String>,
) -> WebResult<impl Responder> {
    let existed = store
        .delete(&path.into_inner())
        .map_err(error::ErrorInternalServerError)?;
    if !existed {
        return Err(error::ErrorNotFound("file not found"));
    }
    Ok(HttpResponse::NoContent())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(root: &TempDir) -> StorageEngine {
        let config = StorageConfig {
            store_dir: root.path().join("files"),
            db_path: root.path().join("metadata.json"),
        };
        StorageEngine::new(&config).unwrap()
    }

    #[test]
    fn write_read_roundtrip() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);

        let metadata = store.write_file("case1.in", b"1 2\n").unwrap();
        assert_eq!(metadata.size, 4);
        assert_eq!(metadata.content_type, "text/plain");

        let content = store.read_file("case1.in").unwrap();
        assert_eq!(content, b"1 2\n");
    }

    #[test]
    fn missing_file_is_an_error_even_if_on_disk() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);
        fs::write(root.path().join("files").join("ghost.txt"), "boo").unwrap();

        let err = store.read_file("ghost.txt").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn overwrite_updates_metadata_but_keeps_created_at() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);

        let first = store.write_file("a.txt", b"one").unwrap();
        let second = store.write_file("a.txt", b"longer content").unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.size, 14);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn index_survives_reload() {
        let root = TempDir::new().unwrap();
        {
            let store = engine(&root);
            store.write_file("persist.txt", b"data").unwrap();
        }
        let store = engine(&root);
        assert!(store.metadata("persist.txt").is_some());
        assert_eq!(store.read_file("persist.txt").unwrap(), b"data");
    }

    #[test]
    fn delete_removes_file_and_metadata() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);

        store.write_file("gone.txt", b"x").unwrap();
        assert!(store.delete("gone.txt").unwrap());
        assert!(store.metadata("gone.txt").is_none());
        assert!(store.read_file("gone.txt").is_err());
        assert!(!store.delete("gone.txt").unwrap());
    }

    #[test]
    fn hostile_filenames_are_rejected() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);

        for name in ["", "../escape", "a/b", ".hidden", "..", "a\0b"] {
            assert!(store.write_file(name, b"x").is_err(), "{:?}", name);
        }
    }

    #[test]
    fn non_utf8_content_is_rejected() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);
        assert!(store.write_file("bin.dat", &[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn testdata_store_interface() {
        let root = TempDir::new().unwrap();
        let store = engine(&root);
        store.write_file("case.in", b"42\n").unwrap();

        let dyn_store: &dyn TestDataStore = &store;
        assert_eq!(dyn_store.read_file("case.in").unwrap(), b"42\n");
    }
}
