#![allow(dead_code)]

use axum::{body::Body, http::Request, response::Response, Router};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Re-export the main app modules for testing
use photo_archive_server::{create_router, utils, AppState};

pub const NOT_FOUND_MESSAGE: &str = "Такого архива нет";

/// A router plus the temporary directories it serves from.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub photos: TempDir,
    pub tools: TempDir,
}

impl TestApp {
    pub fn photos_root(&self) -> &Path {
        self.photos.path()
    }
}

/// Deterministic, poorly compressible bytes.
pub fn photo_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}

/// Photos root with `vacation/a.jpg` (10 KB) and `vacation/b.jpg` (5 KB).
pub fn photos_fixture() -> TempDir {
    let photos = TempDir::new().unwrap();
    let vacation = photos.path().join("vacation");
    std::fs::create_dir(&vacation).unwrap();
    std::fs::write(vacation.join("a.jpg"), photo_bytes(10 * 1024, 1)).unwrap();
    std::fs::write(vacation.join("b.jpg"), photo_bytes(5 * 1024, 2)).unwrap();
    photos
}

/// Test configuration pointing at `photos`, with logging on so the
/// lifecycle code paths are exercised.
pub fn test_config(photos: &Path) -> utils::config::AppConfig {
    utils::config::AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0, // Use random port for testing
        photos_dir: photos.to_path_buf(),
        logging: true,
        ..utils::config::AppConfig::default()
    }
}

/// Setup a test application using the system archiver.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}).await
}

/// Setup a test application, letting the caller adjust the configuration.
pub async fn setup_test_app_with(
    customize: impl FnOnce(&mut utils::config::AppConfig),
) -> TestApp {
    let photos = photos_fixture();
    let tools = TempDir::new().unwrap();

    let mut config = test_config(photos.path());
    config.index_path = tools.path().join("index.html");
    std::fs::write(&config.index_path, "<h1>Фотоархив</h1>").unwrap();
    customize(&mut config);

    let state = AppState::new(config);
    TestApp {
        router: create_router(state.clone()),
        state,
        photos,
        tools,
    }
}

/// Whether the real `zip` binary is installed.
pub fn zip_available() -> bool {
    let available = which::which("zip").is_ok();
    if !available {
        eprintln!("Skipping test: zip binary not found in PATH");
    }
    available
}

/// Write an executable `/bin/sh` script standing in for `zip`.
#[cfg(unix)]
pub fn fake_archiver(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-zip.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Regular files in a ZIP archive, keyed by their stored path.
pub fn unzip(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut files = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        files.insert(entry.name().to_string(), contents);
    }
    files
}

/// Running and not merely a zombie awaiting its reaper.
#[cfg(target_os = "linux")]
pub fn process_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, None | Some('Z') | Some('X'))
}

/// Poll until `pid` is gone or `timeout` elapses.
#[cfg(target_os = "linux")]
pub async fn wait_for_exit(pid: u32, timeout: std::time::Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !process_running(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    !process_running(pid)
}
