// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Artifact fetcher
//!
//! Downloads a remote file to a local path exactly once. The transfer goes to
//! `<dest>.part` and is renamed onto `<dest>` only after every byte has been
//! written, synced and (optionally) verified, so `<dest>` is either absent
//! or complete.

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ExecutionResult, StepBody, StepContext};
use crate::errors::{CrossflowError, CrossflowResult};
use crate::utils::create_download_bar;

/// What a fetch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Destination already existed; nothing was transferred
    AlreadyPresent,
    /// A fresh transfer of `bytes` bytes was completed
    Downloaded { bytes: u64 },
}

/// Downloads artifacts with temp-file + rename semantics
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    progress: bool,
}

impl ArtifactFetcher {
    /// Create a fetcher with a default HTTP client
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crossflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client)
    }

    /// Create a fetcher around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            progress: false,
        }
    }

    /// Show a progress bar while downloading
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Temporary path a transfer to `dest` is written to
    pub fn part_path(dest: &Path) -> PathBuf {
        let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".part");
        dest.with_file_name(name)
    }

    /// Fetch `url` into `dest` unless `dest` already exists.
    ///
    /// Any stale `.part` file is truncated; transfers always restart from
    /// zero. On failure the `.part` file is removed and `dest` stays absent.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        blake3_hex: Option<&str>,
    ) -> CrossflowResult<FetchOutcome> {
        if dest.exists() {
            tracing::debug!(dest = %dest.display(), "artifact already present");
            return Ok(FetchOutcome::AlreadyPresent);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrossflowError::download(url, format!("creating {}: {}", parent.display(), e)))?;
        }

        let part = Self::part_path(dest);
        tracing::info!(url, dest = %dest.display(), "downloading");

        match self.transfer(url, &part, blake3_hex).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| CrossflowError::download(url, format!("finalizing download: {}", e)))?;
                tracing::info!(dest = %dest.display(), bytes, "download complete");
                Ok(FetchOutcome::Downloaded { bytes })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn transfer(&self, url: &str, part: &Path, blake3_hex: Option<&str>) -> CrossflowResult<u64> {
        let parsed = Url::parse(url).map_err(|e| CrossflowError::download(url, e))?;

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| CrossflowError::download(url, format!("creating {}: {}", part.display(), e)))?;
        let mut hasher = blake3::Hasher::new();

        let bytes = match parsed.scheme() {
            "http" | "https" => self.transfer_http(url, &mut file, &mut hasher).await?,
            "file" => {
                let source = parsed
                    .to_file_path()
                    .map_err(|_| CrossflowError::download(url, "not a local file path"))?;
                transfer_local(url, &source, &mut file, &mut hasher).await?
            }
            other => {
                return Err(CrossflowError::download(
                    url,
                    format!("unsupported URL scheme '{}'", other),
                ))
            }
        };

        file.flush().await.map_err(|e| CrossflowError::download(url, e))?;
        file.sync_all().await.map_err(|e| CrossflowError::download(url, e))?;

        if let Some(expected) = blake3_hex {
            let actual = hasher.finalize().to_hex();
            if !actual.as_str().eq_ignore_ascii_case(expected.trim()) {
                return Err(CrossflowError::download(
                    url,
                    format!("blake3 mismatch: expected {}, got {}", expected, actual),
                ));
            }
        }

        Ok(bytes)
    }

    async fn transfer_http(
        &self,
        url: &str,
        file: &mut tokio::fs::File,
        hasher: &mut blake3::Hasher,
    ) -> CrossflowResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrossflowError::download(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrossflowError::download(
                url,
                format!("server responded with {}", status),
            ));
        }

        let total = response.content_length();
        let bar = create_download_bar(total, file_label(url), self.progress);
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CrossflowError::download(url, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| CrossflowError::download(url, e))?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
            bar.set_position(written);
        }
        bar.finish_and_clear();

        if let Some(total) = total {
            if written != total {
                return Err(CrossflowError::download(
                    url,
                    format!("transfer incomplete: {} of {} bytes", written, total),
                ));
            }
        }

        Ok(written)
    }
}

impl Default for ArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn transfer_local(
    url: &str,
    source: &Path,
    file: &mut tokio::fs::File,
    hasher: &mut blake3::Hasher,
) -> CrossflowResult<u64> {
    let mut input = tokio::fs::File::open(source)
        .await
        .map_err(|e| CrossflowError::download(url, format!("{}: {}", source.display(), e)))?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut written: u64 = 0;

    loop {
        let n = input
            .read(&mut buf)
            .await
            .map_err(|e| CrossflowError::download(url, e))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .await
            .map_err(|e| CrossflowError::download(url, e))?;
        hasher.update(&buf[..n]);
        written += n as u64;
    }

    Ok(written)
}

fn file_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// Step body that fetches one artifact
#[derive(Debug, Clone)]
pub struct FetchExecutor {
    fetcher: ArtifactFetcher,
    url: String,
    dest: PathBuf,
    blake3: Option<String>,
}

impl FetchExecutor {
    /// Fetch `url` to `dest`; relative destinations resolve against the
    /// step's working directory
    pub fn new(fetcher: ArtifactFetcher, url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            dest: dest.into(),
            blake3: None,
        }
    }

    /// Require the artifact to match a blake3 hex digest
    pub fn with_blake3(mut self, digest: Option<String>) -> Self {
        self.blake3 = digest;
        self
    }
}

#[async_trait]
impl StepBody for FetchExecutor {
    async fn execute(&self, context: StepContext) -> Result<ExecutionResult, CrossflowError> {
        let start = Instant::now();
        let dest = context.resolve(&self.dest);
        self.fetcher
            .fetch(&self.url, &dest, self.blake3.as_deref())
            .await?;
        Ok(ExecutionResult::success(start.elapsed()))
    }

    fn kind(&self) -> &'static str {
        "fetch"
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Minimal HTTP/1.1 server for exercising the download path.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// How the server answers every request
    #[derive(Debug, Clone)]
    pub enum Reply {
        /// 200 with the full body
        Full(Vec<u8>),
        /// 200 advertising the full length but closing after `n` bytes
        Truncated(Vec<u8>, usize),
        /// Bare status line with an empty body
        Status(u16),
    }

    pub struct TestServer {
        pub base_url: String,
        pub hits: Arc<AtomicUsize>,
    }

    impl TestServer {
        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    pub async fn spawn(reply: Reply) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = reply.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let (head, body) = match &reply {
                        Reply::Full(body) => (ok_head(body.len()), body.clone()),
                        Reply::Truncated(body, n) => (ok_head(body.len()), body[..*n].to_vec()),
                        Reply::Status(code) => (
                            format!(
                                "HTTP/1.1 {} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                                code
                            ),
                            Vec::new(),
                        ),
                    };
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        TestServer {
            base_url: format!("http://{}", addr),
            hits,
        }
    }

    fn ok_head(len: usize) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::{spawn, Reply};
    use super::*;
    use tempfile::TempDir;

    fn fetcher() -> ArtifactFetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        ArtifactFetcher::with_client(client)
    }

    fn payload() -> Vec<u8> {
        (0..50_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            ArtifactFetcher::part_path(Path::new("cache/a.tar.bz2")),
            PathBuf::from("cache/a.tar.bz2.part")
        );
    }

    #[tokio::test]
    async fn test_downloads_and_creates_parents() {
        let server = spawn(Reply::Full(payload())).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("cache/nested/a.tar.bz2");

        let outcome = fetcher()
            .fetch(&format!("{}/a.tar.bz2", server.base_url), &dest, None)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 50_000 });
        assert_eq!(std::fs::read(&dest).unwrap(), payload());
        assert!(!ArtifactFetcher::part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_existing_destination_is_not_refetched() {
        let server = spawn(Reply::Full(payload())).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.tar.bz2");
        std::fs::write(&dest, b"already here").unwrap();

        let outcome = fetcher()
            .fetch(&format!("{}/a.tar.bz2", server.base_url), &dest, None)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::AlreadyPresent);
        assert_eq!(server.hits(), 0);
        assert_eq!(std::fs::read(&dest).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_interrupted_transfer_leaves_destination_absent() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.tar.bz2");

        let broken = spawn(Reply::Truncated(payload(), 1_000)).await;
        let result = fetcher()
            .fetch(&format!("{}/a.tar.bz2", broken.base_url), &dest, None)
            .await;

        assert!(matches!(result, Err(CrossflowError::DownloadFailed { .. })));
        assert!(!dest.exists());

        let healthy = spawn(Reply::Full(payload())).await;
        fetcher()
            .fetch(&format!("{}/a.tar.bz2", healthy.base_url), &dest, None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), payload());
    }

    #[tokio::test]
    async fn test_stale_part_file_is_discarded() {
        let server = spawn(Reply::Full(payload())).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.tar.bz2");
        std::fs::write(ArtifactFetcher::part_path(&dest), vec![0xff; 80_000]).unwrap();

        fetcher()
            .fetch(&format!("{}/a.tar.bz2", server.base_url), &dest, None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), payload());
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let server = spawn(Reply::Status(404)).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing.tar.xz");

        let result = fetcher()
            .fetch(&format!("{}/missing.tar.xz", server.base_url), &dest, None)
            .await;

        match result {
            Err(CrossflowError::DownloadFailed { reason, .. }) => assert!(reason.contains("404")),
            other => panic!("Expected DownloadFailed, got {:?}", other),
        }
        assert!(!dest.exists());
        assert!(!ArtifactFetcher::part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_blake3_mismatch_rejects_file() {
        let server = spawn(Reply::Full(payload())).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.tar.bz2");
        let wrong = blake3::hash(b"something else").to_hex().to_string();

        let result = fetcher()
            .fetch(&format!("{}/a.tar.bz2", server.base_url), &dest, Some(&wrong))
            .await;

        assert!(result.is_err());
        assert!(!dest.exists());

        let right = blake3::hash(&payload()).to_hex().to_string();
        fetcher()
            .fetch(&format!("{}/a.tar.bz2", server.base_url), &dest, Some(&right))
            .await
            .unwrap();
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_file_url_copies() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("mirror/gmp.tar.xz");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"mirror contents").unwrap();
        let url = Url::from_file_path(&source).unwrap().to_string();
        let dest = dir.path().join("archives/gmp.tar.xz");

        let outcome = fetcher().fetch(&url, &dest, None).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 15 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"mirror contents");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let dir = TempDir::new().unwrap();
        let result = fetcher()
            .fetch("ftp://example.org/a.tar", &dir.path().join("a.tar"), None)
            .await;
        assert!(matches!(result, Err(CrossflowError::DownloadFailed { .. })));
    }

    #[tokio::test]
    async fn test_executor_resolves_relative_destination() {
        let server = spawn(Reply::Full(b"abc".to_vec())).await;
        let dir = TempDir::new().unwrap();
        let body = FetchExecutor::new(
            fetcher(),
            format!("{}/a.tar.bz2", server.base_url),
            "cache/a.tar.bz2",
        );

        let result = body.execute(StepContext::new(dir.path())).await.unwrap();

        assert!(result.success);
        assert_eq!(std::fs::read(dir.path().join("cache/a.tar.bz2")).unwrap(), b"abc");
    }
}
