// src/fetch.rs

//! Source artifact fetching
//!
//! `http://` and `https://` sources are downloaded with retry; `file://`
//! URIs and bare paths are copied. Either way the artifact is written to a
//! sibling `.part` file and renamed into place, so a destination that exists
//! is always complete.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (5 minutes; sources can be large)
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Retrieves a source artifact
pub trait SourceFetcher {
    /// Place the artifact named by `uri` at `dest`
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()>;
}

/// How a source URI is reached
#[derive(Debug, PartialEq, Eq)]
enum Location<'a> {
    Remote(&'a str),
    Local(PathBuf),
}

fn locate(uri: &str) -> Result<Location<'_>> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Ok(Location::Remote(uri))
    } else if let Some(path) = uri.strip_prefix("file://") {
        Ok(Location::Local(PathBuf::from(path)))
    } else if let Some((scheme, _)) = uri.split_once("://") {
        Err(Error::DownloadError(format!("Unsupported URI scheme {}: {}", scheme, uri)))
    } else {
        Ok(Location::Local(PathBuf::from(uri)))
    }
}

/// HTTP client with retry support, falling back to plain copies for local sources
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("mypkg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    write_atomically(dest, |file| {
                        io::copy(&mut response, file).map_err(|e| {
                            Error::DownloadError(format!("Failed to write downloaded data: {}", e))
                        })
                    })?;

                    info!("Successfully downloaded to {}", dest.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        match locate(uri)? {
            Location::Remote(url) => self.download(url, dest),
            Location::Local(path) => copy_local(&path, dest),
        }
    }
}

fn copy_local(source: &Path, dest: &Path) -> Result<()> {
    info!("Copying {} to {}", source.display(), dest.display());

    let mut input = File::open(source).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::NotFoundError(format!("source {}", source.display()))
        } else {
            Error::IoError(format!("Failed to open {}: {}", source.display(), e))
        }
    })?;

    write_atomically(dest, |file| {
        io::copy(&mut input, file)
            .map_err(|e| Error::IoError(format!("Failed to copy {}: {}", source.display(), e)))
    })
}

/// Fill a `.part` sibling of `dest`, then rename it over `dest`
fn write_atomically<F>(dest: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<u64>,
{
    let file_name = dest
        .file_name()
        .ok_or_else(|| Error::IoError(format!("No file name in {}", dest.display())))?;
    let temp_path = dest.with_file_name(format!("{}.part", file_name.to_string_lossy()));

    let mut file = File::create(&temp_path).map_err(|e| {
        Error::IoError(format!("Failed to create file {}: {}", temp_path.display(), e))
    })?;

    let written = match fill(&mut file) {
        Ok(n) => n,
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };
    debug!("Wrote {} bytes to {}", written, temp_path.display());

    fs::rename(&temp_path, dest).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            temp_path.display(),
            dest.display(),
            e
        ))
    })
}
