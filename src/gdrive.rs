use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::direct::stream_to_file;
use crate::domain::ShareLink;
use crate::error::PrepError;
use crate::progress::ProgressSink;

/// Resolves a cloud share reference to local file(s).
///
/// A file link is written to `destination`. A folder link is mirrored into
/// the directory `destination`, subfolders included. Returns the local paths
/// of every file the link resolved to.
pub trait CloudShareClient: Send + Sync {
    fn resolve(
        &self,
        link: &ShareLink,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, PrepError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: String,
    pub title: String,
    pub is_folder: bool,
}

const DRIVE_BASE: &str = "https://drive.google.com";
const MAX_INTERSTITIALS: usize = 2;

#[derive(Clone)]
pub struct DriveHttpClient {
    client: Client,
    base: String,
}

impl DriveHttpClient {
    pub fn new() -> Result<Self, PrepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("upar-datasets/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PrepError::DriveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| PrepError::DriveHttp(err.to_string()))?;
        Ok(Self::with_base(client, DRIVE_BASE))
    }

    /// Uses `client` against a Drive host other than `drive.google.com`.
    pub fn with_base(client: Client, base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, url: &str) -> Result<Response, PrepError> {
        tracing::debug!(url, "drive request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PrepError::DriveHttp(err.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Google Drive request failed".to_string());
        Err(PrepError::DriveStatus { status, message })
    }

    fn download_file(
        &self,
        id: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, PrepError> {
        if destination.exists() {
            tracing::info!(destination = %destination.display(), "already downloaded, skipping");
            return Ok(destination.to_path_buf());
        }
        let started = Instant::now();
        let mut url = format!("{}/uc?export=download&id={id}", self.base);
        for _ in 0..=MAX_INTERSTITIALS {
            let response = self.get(&url)?;
            if !is_html(&response) {
                let total = response.content_length();
                stream_to_file(
                    response,
                    total,
                    destination,
                    started,
                    sink,
                    PrepError::DriveHttp,
                )?;
                return Ok(destination.to_path_buf());
            }
            let page = response
                .text()
                .map_err(|err| PrepError::DriveHttp(err.to_string()))?;
            url = match confirm_url(&page, &self.base) {
                Some(next) => next,
                None if is_quota_page(&page) => {
                    return Err(PrepError::DriveQuota(format!(
                        "too many downloads of file {id}; retry later"
                    )));
                }
                None => {
                    return Err(PrepError::DriveUnavailable(format!(
                        "no download link for file {id}; is it shared publicly?"
                    )));
                }
            };
        }
        Err(PrepError::DriveHttp(format!(
            "too many confirmation pages for file {id}"
        )))
    }

    fn download_folder(
        &self,
        id: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, PrepError> {
        fs::create_dir_all(destination).map_err(|err| PrepError::Filesystem(err.to_string()))?;
        let page = self
            .get(&format!("{}/embeddedfolderview?id={id}", self.base))?
            .text()
            .map_err(|err| PrepError::DriveHttp(err.to_string()))?;
        let entries = parse_folder_entries(&page);
        tracing::info!(folder = id, entries = entries.len(), "resolved shared folder");

        let mut files = Vec::new();
        for entry in entries {
            let target = destination.join(safe_file_name(&entry.title));
            if entry.is_folder {
                files.extend(self.download_folder(&entry.id, &target, sink)?);
            } else {
                files.push(self.download_file(&entry.id, &target, sink)?);
            }
        }
        Ok(files)
    }
}

impl CloudShareClient for DriveHttpClient {
    fn resolve(
        &self,
        link: &ShareLink,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, PrepError> {
        match link {
            ShareLink::File { id } => Ok(vec![self.download_file(id, destination, sink)?]),
            ShareLink::Folder { id } => self.download_folder(id, destination, sink),
        }
    }
}

impl<T: CloudShareClient + ?Sized> CloudShareClient for &T {
    fn resolve(
        &self,
        link: &ShareLink,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, PrepError> {
        (**self).resolve(link, destination, sink)
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("text/html"))
        .unwrap_or(false)
}

static FORM_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<form[^>]*id="download-form"[^>]*>(.*?)</form>"#).unwrap()
});
static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<form[^>]*action="([^"]+)""#).unwrap());
static HIDDEN_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input[^>]*type="hidden"[^>]*>"#).unwrap());
static NAME_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"name="([^"]*)""#).unwrap());
static VALUE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"value="([^"]*)""#).unwrap());
static LEGACY_CONFIRM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="(/uc\?export=download[^"]+)""#).unwrap());
static FOLDER_ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)id="entry-([A-Za-z0-9_-]+)".*?<a href="([^"]+)".*?class="flip-entry-title">([^<]*)</div>"#,
    )
    .unwrap()
});

/// Finds the follow-up URL on a Drive "can't scan this file for viruses"
/// interstitial. Handles the usercontent form and the older `/uc` link, which
/// is relative to `base`.
pub fn confirm_url(page: &str, base: &str) -> Option<String> {
    if let Some(form) = FORM_TAG_RE.captures(page) {
        let action = ACTION_RE.captures(&form[0])?;
        let action = unescape_html(&action[1]);
        let params: Vec<(String, String)> = HIDDEN_INPUT_RE
            .find_iter(&form[1])
            .filter_map(|input| {
                let name = NAME_ATTR_RE.captures(input.as_str())?;
                let value = VALUE_ATTR_RE
                    .captures(input.as_str())
                    .map(|caps| unescape_html(&caps[1]))
                    .unwrap_or_default();
                Some((unescape_html(&name[1]), value))
            })
            .collect();
        return Url::parse_with_params(&action, &params)
            .ok()
            .map(|url| url.to_string());
    }
    LEGACY_CONFIRM_RE
        .captures(page)
        .map(|caps| format!("{base}{}", unescape_html(&caps[1])))
}

pub fn is_quota_page(page: &str) -> bool {
    page.contains("Too many users have viewed or downloaded this file")
        || page.contains("Quota exceeded")
}

pub fn parse_folder_entries(page: &str) -> Vec<FolderEntry> {
    FOLDER_ENTRY_RE
        .captures_iter(page)
        .map(|caps| FolderEntry {
            id: caps[1].to_string(),
            title: unescape_html(caps[3].trim()),
            is_folder: caps[2].contains("/folders/"),
        })
        .collect()
}

fn safe_file_name(title: &str) -> String {
    let name = title.replace(['/', '\\'], "_");
    if name.is_empty() || name == "." || name == ".." {
        return "_".to_string();
    }
    name
}

fn unescape_html(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
