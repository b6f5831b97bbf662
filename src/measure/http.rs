//! HTTP speed test backend against a Cloudflare-style endpoint.
//!
//! `GET {server}/__down?bytes=N` streams N bytes back, `POST {server}/__up`
//! swallows the request body. Latency is the fastest of a few zero-byte
//! downloads made while selecting the server.

use std::io::Read;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::debug;

use super::backend::{BackendError, ServerDescriptor, SpeedTestBackend};

/// Read buffer for streaming downloads (64 KB).
const CHUNK_SIZE: usize = 65536;

/// Connection parameters for [`HttpBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpBackendConfig {
    pub server_url: String,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub upload_chunks: u32,
    pub timeout: Duration,
    pub latency_samples: u32,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            server_url: "https://speed.cloudflare.com/".to_string(),
            download_bytes: 25_000_000,
            upload_bytes: 10_000_000,
            upload_chunks: 10,
            timeout: Duration::from_secs(60),
            latency_samples: 5,
        }
    }
}

pub struct HttpBackend {
    config: HttpBackendConfig,
    client: Client,
    base: Url,
    latency_ms: Option<f64>,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let base = parse_base(&config.server_url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("netgauge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            base,
            latency_ms: None,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::Config(format!("invalid endpoint {path}: {e}")))
    }

    fn download_url(&self, bytes: u64) -> Result<Url, BackendError> {
        let mut url = self.endpoint("__down")?;
        url.query_pairs_mut()
            .append_pair("bytes", &bytes.to_string());
        Ok(url)
    }
}

impl SpeedTestBackend for HttpBackend {
    fn select_best_server(&mut self) -> Result<ServerDescriptor, BackendError> {
        let host = self.base.host_str().unwrap_or_default().to_string();
        let url = self.download_url(0)?;
        debug!(%url, "probing server latency");

        let mut best: Option<f64> = None;
        for _ in 0..self.config.latency_samples.max(1) {
            let start = Instant::now();
            let response = self
                .client
                .get(url.clone())
                .send()
                .map_err(|e| BackendError::Config(format!("{host} is unreachable: {e}")))?;
            if !response.status().is_success() {
                return Err(BackendError::Config(format!(
                    "{host} answered with status {}",
                    response.status()
                )));
            }
            let _ = response.bytes();
            let ms = start.elapsed().as_secs_f64() * 1000.0;
            best = Some(best.map_or(ms, |b| b.min(ms)));
        }

        self.latency_ms = best.map(|ms| (ms * 1000.0).round() / 1000.0);
        Ok(ServerDescriptor {
            id: host.clone(),
            host: host.clone(),
            sponsor: host,
            name: self.base.to_string(),
            latency_ms: self.latency_ms,
        })
    }

    fn measure_download(
        &mut self,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Option<f64>, BackendError> {
        let total = self.config.download_bytes;
        let url = self.download_url(total)?;
        debug!(%url, "starting download");

        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| BackendError::Transport(format!("download request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(BackendError::Transport(format!(
                "download failed with status {}",
                response.status()
            )));
        }

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received: u64 = 0;
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| BackendError::Transport(format!("download stream error: {e}")))?;
            if n == 0 {
                break;
            }
            received += n as u64;
            progress(received.min(total), total);
        }

        Ok(rate_bps(received, start.elapsed()))
    }

    fn measure_upload(
        &mut self,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Option<f64>, BackendError> {
        let chunks = u64::from(self.config.upload_chunks.max(1));
        let chunk_len = (self.config.upload_bytes / chunks).max(1) as usize;
        let payload: Vec<u8> = (0..chunk_len).map(|i| (i % 256) as u8).collect();
        let url = self.endpoint("__up")?;
        debug!(%url, chunks, chunk_len, "starting upload");

        let start = Instant::now();
        let mut sent: u64 = 0;
        for done in 1..=chunks {
            let response = self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(payload.clone())
                .send()
                .map_err(|e| BackendError::Transport(format!("upload request failed: {e}")))?;
            if !response.status().is_success() {
                return Err(BackendError::Transport(format!(
                    "upload failed with status {}",
                    response.status()
                )));
            }
            sent += chunk_len as u64;
            progress(done, chunks);
        }

        Ok(rate_bps(sent, start.elapsed()))
    }

    fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }
}

fn parse_base(server_url: &str) -> Result<Url, BackendError> {
    let mut raw = server_url.trim().to_string();
    if !raw.contains("://") {
        raw = format!("https://{raw}");
    }
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw)
        .map_err(|e| BackendError::Config(format!("invalid server URL '{server_url}': {e}")))?;
    if url.host_str().is_none() {
        return Err(BackendError::Config(format!(
            "server URL '{server_url}' has no host"
        )));
    }
    Ok(url)
}

/// Bits per second for `bytes` moved in `elapsed`; `None` when nothing
/// moved or the clock did not advance.
fn rate_bps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    Some(bytes as f64 * 8.0 / secs)
}
