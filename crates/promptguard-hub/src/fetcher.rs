//! Artifact download through the local cache.
//!
//! A cached file is either complete or absent. Bodies are streamed into a
//! `.incomplete` sibling and renamed over the final path only after the last
//! byte is on disk; any failure removes the sibling.
//!
//! There is no lock across the lookup/download/rename steps. Two callers that
//! miss at the same time both download; each writes its own temp file and the
//! last rename wins with identical bytes.

use crate::cache::{ArtifactCache, ArtifactRef};
use crate::config::HubConfig;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
use promptguard_core::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Redirect hops followed before giving up
pub const MAX_REDIRECTS: usize = 5;

/// Read size while streaming a body to disk
const CHUNK_SIZE: usize = 64 * 1024;

const INCOMPLETE_SUFFIX: &str = "incomplete";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What a miss means to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Missing or unreachable artifacts are errors
    Required,
    /// Missing or unreachable artifacts come back as `None`
    Optional,
}

/// Turns artifact references into complete local files
#[derive(Clone)]
pub struct ArtifactFetcher {
    cache: ArtifactCache,
    transport: Arc<dyn Transport>,
    cache_dir: Option<PathBuf>,
}

impl ArtifactFetcher {
    /// Fetcher backed by the blocking HTTP client
    pub fn new(config: HubConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_transport(config, transport)
    }

    /// Fetcher backed by a custom transport
    pub fn with_transport(config: HubConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache: ArtifactCache::new(config),
            transport,
            cache_dir: None,
        }
    }

    /// Explicit cache root for this fetcher; beats every configured source
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn config(&self) -> &HubConfig {
        self.cache.config()
    }

    /// Cache root as resolved right now
    pub fn cache_root(&self) -> PathBuf {
        self.cache.resolve_root(self.cache_dir.as_deref())
    }

    /// Where the artifact lives (or would live) in the cache
    pub fn cached_path(&self, artifact: &ArtifactRef) -> PathBuf {
        self.cache.path_for(artifact, &self.cache_root())
    }

    pub fn is_cached(&self, artifact: &ArtifactRef) -> bool {
        self.cache.exists(artifact, &self.cache_root())
    }

    /// `{remote_host}/{registry_id}/resolve/{revision}/{relative_path}`
    pub fn remote_url(&self, artifact: &ArtifactRef) -> Result<Url> {
        let raw = format!(
            "{}/{}/resolve/{}/{}",
            self.config().remote_host.trim_end_matches('/'),
            artifact.registry_id(),
            artifact.revision(),
            artifact.relative_path()
        );
        Url::parse(&raw).map_err(|e| Error::config(format!("invalid artifact URL '{}': {}", raw, e)))
    }

    /// Return a local path for the artifact, downloading it on a miss.
    ///
    /// `Required` never yields `Ok(None)`.
    pub fn fetch(&self, artifact: &ArtifactRef, requirement: Requirement) -> Result<Option<PathBuf>> {
        let path = self.cached_path(artifact);
        if path.is_file() {
            debug!("Cache hit for {} at {:?}", artifact, path);
            return Ok(Some(path));
        }

        if self.config().is_offline() {
            metrics::counter!("promptguard_downloads_total", "outcome" => "offline").increment(1);
            return match requirement {
                Requirement::Required => Err(Error::offline(artifact.to_string())),
                Requirement::Optional => {
                    debug!("Offline and {} is not cached, skipping", artifact);
                    Ok(None)
                }
            };
        }

        let result = self
            .remote_url(artifact)
            .and_then(|url| self.download(artifact, &url, &path));

        match result {
            Ok(bytes) => {
                metrics::counter!("promptguard_downloads_total", "outcome" => "success").increment(1);
                metrics::counter!("promptguard_download_bytes_total").increment(bytes);
                Ok(Some(path))
            }
            Err(e) => {
                metrics::counter!("promptguard_downloads_total", "outcome" => "failure").increment(1);
                match requirement {
                    Requirement::Required => Err(e),
                    Requirement::Optional => {
                        warn!("Optional artifact {} unavailable: {}", artifact, e);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Fetch an artifact that must exist
    pub fn fetch_required(&self, artifact: &ArtifactRef) -> Result<PathBuf> {
        self.fetch(artifact, Requirement::Required)?
            .ok_or_else(|| Error::internal(format!("required fetch of {} returned nothing", artifact)))
    }

    /// Fetch and parse a JSON artifact.
    ///
    /// With `Optional`, any failure (missing, unreachable, unparsable) yields an
    /// empty object.
    pub fn fetch_json(&self, artifact: &ArtifactRef, requirement: Requirement) -> Result<serde_json::Value> {
        match requirement {
            Requirement::Required => {
                let path = self.fetch_required(artifact)?;
                read_json(&path)
            }
            Requirement::Optional => {
                let value = match self.fetch(artifact, Requirement::Optional) {
                    Ok(Some(path)) => read_json(&path)
                        .map_err(|e| warn!("Ignoring unreadable {}: {}", artifact, e))
                        .ok(),
                    _ => None,
                };
                Ok(value.unwrap_or_else(|| serde_json::Value::Object(Default::default())))
            }
        }
    }

    fn download(&self, artifact: &ArtifactRef, url: &Url, dest: &Path) -> Result<u64> {
        info!("Downloading {} from {}", artifact, url);

        let mut response = self.open(url)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::download(url.as_str(), format!("could not create {:?}: {}", parent, e))
            })?;
        }

        let mut temp = IncompleteFile::create(dest)
            .map_err(|e| Error::download(url.as_str(), format!("could not create temp file: {}", e)))?;
        let total = response.content_length.filter(|n| *n > 0);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;
        let mut next_decile: u64 = 1;

        loop {
            let n = match response.body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::download(url.as_str(), e.to_string())),
            };
            temp.write_all(&buf[..n])
                .map_err(|e| Error::download(url.as_str(), format!("write failed: {}", e)))?;
            written += n as u64;

            if let Some(total) = total {
                while next_decile <= 10 && written * 10 >= total * next_decile {
                    info!("{}: {}% ({}/{} bytes)", artifact, next_decile * 10, written, total);
                    next_decile += 1;
                }
            }
        }

        if let Some(total) = total {
            if written < total {
                return Err(Error::download(
                    url.as_str(),
                    format!("connection closed after {} of {} bytes", written, total),
                ));
            }
        }

        temp.commit()
            .map_err(|e| Error::download(url.as_str(), format!("could not finalize file: {}", e)))?;

        info!("Downloaded {} ({} bytes)", artifact, written);
        Ok(written)
    }

    /// Issue the request, following up to `MAX_REDIRECTS` hops.
    ///
    /// The bearer token only goes to the origin of the first URL.
    fn open(&self, url: &Url) -> Result<HttpResponse> {
        let origin = url.origin();
        let token = self.config().auth_token();
        let mut current = url.clone();
        let mut redirects = 0;

        loop {
            let bearer_token = if current.origin() == origin {
                token.clone()
            } else {
                None
            };
            let response = self.transport.get(&HttpRequest {
                url: current.clone(),
                bearer_token,
            })?;

            if response.is_redirect() {
                if redirects == MAX_REDIRECTS {
                    return Err(Error::download(
                        url.as_str(),
                        format!("too many redirects (limit {})", MAX_REDIRECTS),
                    ));
                }
                let location = response.location.as_deref().ok_or_else(|| {
                    Error::download(current.as_str(), "redirect without a Location header")
                })?;
                let next = current.join(location).map_err(|e| {
                    Error::download(current.as_str(), format!("bad redirect '{}': {}", location, e))
                })?;
                debug!("Redirect {} -> {}", current, next);
                current = next;
                redirects += 1;
                continue;
            }

            if !response.is_success() {
                return Err(Error::download(
                    current.as_str(),
                    format!("HTTP {}", response.status),
                ));
            }

            return Ok(response);
        }
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Temp sibling of a cache entry, removed on drop unless committed
struct IncompleteFile {
    temp: PathBuf,
    dest: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl IncompleteFile {
    fn create(dest: &Path) -> io::Result<Self> {
        let temp = incomplete_path(dest);
        let file = File::create(&temp)?;
        Ok(Self {
            temp,
            dest: dest.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.write_all(bytes),
            None => Err(io::Error::new(io::ErrorKind::Other, "temp file already closed")),
        }
    }

    /// Flush, sync and rename over the destination
    fn commit(mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&self.temp, &self.dest)
    }
}

impl Drop for IncompleteFile {
    fn drop(&mut self) {
        drop(self.writer.take());
        if self.temp.exists() {
            if let Err(e) = fs::remove_file(&self.temp) {
                warn!("Failed to remove {:?}: {}", self.temp, e);
            }
        }
    }
}

/// `{dest}.{pid}-{n}.incomplete`, unique per writer so racing downloads never
/// share a temp file
fn incomplete_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(
        ".{}-{}.{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        INCOMPLETE_SUFFIX
    ));
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_path_is_a_sibling() {
        let dest = Path::new("/cache/owner/name/onnx/model.onnx");
        let a = incomplete_path(dest);
        let b = incomplete_path(dest);
        assert_eq!(a.parent(), dest.parent());
        assert!(a.to_string_lossy().ends_with(".incomplete"));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("model.onnx."));
        assert_ne!(a, b);
    }

    #[test]
    fn test_uncommitted_temp_is_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("model.onnx");

        let mut temp = IncompleteFile::create(&dest).unwrap();
        temp.write_all(b"partial").unwrap();
        let temp_path = temp.temp.clone();
        assert!(temp_path.exists());
        drop(temp);

        assert!(!temp_path.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_commit_renames_into_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("tokenizer.json");

        let mut temp = IncompleteFile::create(&dest).unwrap();
        temp.write_all(b"{\"ok\":true}").unwrap();
        temp.commit().unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "{\"ok\":true}");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".incomplete"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_remote_url_shape() {
        let config = HubConfig::default().with_remote_host("https://models.example.com/");
        let fetcher = ArtifactFetcher::new(config);
        let artifact = ArtifactRef::new("owner/name", "onnx/model.onnx", "v2").unwrap();
        assert_eq!(
            fetcher.remote_url(&artifact).unwrap().as_str(),
            "https://models.example.com/owner/name/resolve/v2/onnx/model.onnx"
        );
    }
}
