use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::PrepError;
use crate::progress::{DownloadStats, ProgressEvent, ProgressSink};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
}

/// Fetches a plain HTTP(S) URL to a local file.
pub trait DirectClient: Send + Sync {
    fn fetch(&self, url: &str, destination: &Path, sink: &dyn ProgressSink)
    -> Result<u64, PrepError>;
}

/// Downloads `url` to `destination` unless the destination already exists.
/// An existing file is trusted as is; nothing is sent over the network.
pub fn download_via_direct_link<D: DirectClient + ?Sized>(
    client: &D,
    url: &str,
    destination: &Path,
    sink: &dyn ProgressSink,
) -> Result<DownloadOutcome, PrepError> {
    if destination.exists() {
        tracing::info!(destination = %destination.display(), "already downloaded, skipping");
        return Ok(DownloadOutcome::AlreadyPresent);
    }
    tracing::info!(url, destination = %destination.display(), "downloading");
    let bytes = client.fetch(url, destination, sink)?;
    Ok(DownloadOutcome::Downloaded { bytes })
}

#[derive(Clone)]
pub struct HttpDirectClient {
    client: Client,
}

impl HttpDirectClient {
    pub fn new() -> Result<Self, PrepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("upar-datasets/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PrepError::Http(err.to_string()))?,
        );
        // Dataset archives run to gigabytes; only bound the connect phase.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| PrepError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn handle_status(response: Response) -> Result<Response, PrepError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "download request failed".to_string());
        Err(PrepError::HttpStatus { status, message })
    }
}

impl DirectClient for HttpDirectClient {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, PrepError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PrepError::Http(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let total = response.content_length();
        stream_to_file(response, total, destination, started, sink, PrepError::Http)
    }
}

/// Streams `reader` into a temp file beside `destination` and persists it
/// under the final name once the body is complete. Progress is measured from
/// `started`.
pub(crate) fn stream_to_file<R: Read>(
    mut reader: R,
    total: Option<u64>,
    destination: &Path,
    started: Instant,
    sink: &dyn ProgressSink,
    read_error: fn(String) -> PrepError,
) -> Result<u64, PrepError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|err| PrepError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".upar-download")
        .tempfile_in(parent)
        .map_err(|err| PrepError::Filesystem(err.to_string()))?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut downloaded = 0u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| read_error(err.to_string()))?;
        if read == 0 {
            break;
        }
        temp.write_all(&buffer[..read])
            .map_err(|err| PrepError::Filesystem(err.to_string()))?;
        downloaded += read as u64;
        sink.event(ProgressEvent::Download {
            stats: DownloadStats::new(downloaded, total, started.elapsed()),
        });
    }

    temp.persist(destination)
        .map_err(|err| PrepError::Filesystem(err.error.to_string()))?;
    sink.event(ProgressEvent::Finished {
        message: format!("Saved {}", destination.display()),
        elapsed: Some(started.elapsed()),
    });
    Ok(downloaded)
}

impl<T: DirectClient + ?Sized> DirectClient for &T {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, PrepError> {
        (**self).fetch(url, destination, sink)
    }
}
