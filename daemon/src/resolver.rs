//! Clip source resolution
//!
//! Turns configured locators into local playable handles. Remote clips are
//! downloaded into named temporary files under the cache directory, local
//! clips are used in place. A batch succeeds only when every locator
//! resolves.

use anyhow::{Context, Result};
use common::SequenceError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;

use crate::config::ResolverSettings;
use crate::controller::{ControllerEvent, EventSender};

/// Identifies one resolver request so late answers can be recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one batch, in locator order
pub type Resolution = std::result::Result<Vec<ClipHandle>, SequenceError>;

/// Local, playable reference to a clip
///
/// Clones share the backing file. When the last clone of a downloaded clip
/// is dropped the temporary file is deleted.
#[derive(Clone)]
pub struct ClipHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    locator: String,
    path: PathBuf,
    backing: Option<TempPath>,
}

impl ClipHandle {
    /// Handle to a file that already exists and is not owned by us
    pub fn local(locator: impl Into<String>, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                locator: locator.into(),
                path,
                backing: None,
            }),
        }
    }

    /// Handle owning a downloaded temporary file
    pub fn materialized(locator: impl Into<String>, backing: TempPath) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                locator: locator.into(),
                path: backing.to_path_buf(),
                backing: Some(backing),
            }),
        }
    }

    pub fn locator(&self) -> &str {
        &self.inner.locator
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_materialized(&self) -> bool {
        self.inner.backing.is_some()
    }

    /// `file://` URI for decoders that take URIs
    pub fn uri(&self) -> String {
        let path = std::path::absolute(self.path()).unwrap_or_else(|_| self.path().to_path_buf());
        format!("file://{}", path.display())
    }
}

impl fmt::Debug for ClipHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipHandle")
            .field("locator", &self.inner.locator)
            .field("path", &self.inner.path)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Asynchronous resolver boundary used by the controller
///
/// `request` must not block. The answer is posted back as
/// [`ControllerEvent::ClipsResolved`] carrying the same request id.
pub trait ClipResolver: Send {
    fn request(&mut self, request: RequestId, locators: Vec<String>, reply: EventSender);
}

/// How a locator is fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Remote(String),
    Local(PathBuf),
}

impl Locator {
    pub fn classify(locator: &str) -> Self {
        let trimmed = locator.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Self::Remote(trimmed.to_string());
        }

        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        Self::Local(PathBuf::from(shellexpand::tilde(path).to_string()))
    }
}

/// Resolver for `http(s)://`, `file://` and plain path locators
pub struct HttpResolver {
    agent: ureq::Agent,
    cache_dir: PathBuf,
    runtime: tokio::runtime::Handle,
}

impl HttpResolver {
    /// Must be called from within a tokio runtime
    pub fn new(settings: &ResolverSettings) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("Clip resolver needs a running tokio runtime")?;

        Ok(Self {
            agent: build_agent(settings.timeout()),
            cache_dir: settings.cache_path(),
            runtime,
        })
    }
}

impl ClipResolver for HttpResolver {
    fn request(&mut self, request: RequestId, locators: Vec<String>, reply: EventSender) {
        let agent = self.agent.clone();
        let cache_dir = self.cache_dir.clone();

        log::info!("Resolving {} clip(s) (request {})", locators.len(), request);

        self.runtime.spawn(async move {
            let result = resolve_all(agent, cache_dir, locators).await;
            if let Err(e) = &result {
                log::warn!("Clip resolution failed (request {}): {}", request, e);
            }
            if !reply.send(ControllerEvent::ClipsResolved { request, result }) {
                log::debug!("Controller gone, dropping resolution {}", request);
            }
        });
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout(timeout)
        .build()
}

/// Resolve every locator concurrently; the first failure fails the batch
///
/// Handles resolved before the failure are dropped with the batch, which
/// removes their temporary files.
pub async fn resolve_all(
    agent: ureq::Agent,
    cache_dir: PathBuf,
    locators: Vec<String>,
) -> Resolution {
    let tasks = locators.into_iter().map(|locator| {
        let agent = agent.clone();
        let cache_dir = cache_dir.clone();
        async move {
            let name = locator.clone();
            tokio::task::spawn_blocking(move || resolve_one(&agent, &cache_dir, &locator))
                .await
                .map_err(|e| SequenceError::Resolution(format!("{}: {}", name, e)))?
                .map_err(|e| SequenceError::Resolution(format!("{}: {:#}", name, e)))
        }
    });

    futures::future::try_join_all(tasks).await
}

fn resolve_one(agent: &ureq::Agent, cache_dir: &Path, locator: &str) -> Result<ClipHandle> {
    match Locator::classify(locator) {
        Locator::Local(path) => {
            if !path.is_file() {
                anyhow::bail!("{} does not exist", path.display());
            }
            log::debug!("Using local clip {}", path.display());
            Ok(ClipHandle::local(locator, path))
        }
        Locator::Remote(url) => download(agent, cache_dir, locator, &url),
    }
}

fn download(agent: &ureq::Agent, cache_dir: &Path, locator: &str, url: &str) -> Result<ClipHandle> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;

    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => anyhow::anyhow!("server answered {}", code),
        ureq::Error::Transport(t) => anyhow::anyhow!("network failure ({})", t),
    })?;

    let mut file = tempfile::Builder::new()
        .prefix("clip-")
        .suffix(&remote_suffix(url))
        .tempfile_in(cache_dir)
        .context("Failed to create cache file")?;

    let bytes = std::io::copy(&mut response.into_reader(), &mut file)
        .context("Failed to download clip")?;

    log::info!("Fetched {} ({} bytes)", url, bytes);
    Ok(ClipHandle::materialized(locator, file.into_temp_path()))
}

/// File extension of the URL path, kept so decoders can sniff by name
fn remote_suffix(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or("");

    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext)
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_classify_locators() {
        assert_eq!(
            Locator::classify("https://cdn.example/a.mp4"),
            Locator::Remote("https://cdn.example/a.mp4".to_string())
        );
        assert_eq!(
            Locator::classify("HTTP://cdn.example/a.mp4"),
            Locator::Remote("HTTP://cdn.example/a.mp4".to_string())
        );
        assert_eq!(
            Locator::classify("file:///srv/clips/b.mp4"),
            Locator::Local(PathBuf::from("/srv/clips/b.mp4"))
        );
        assert_eq!(
            Locator::classify("clips/c.mp4"),
            Locator::Local(PathBuf::from("clips/c.mp4"))
        );
    }

    #[test]
    fn test_classify_expands_tilde() {
        match Locator::classify("~/clips/d.mp4") {
            Locator::Local(path) => assert!(!path.starts_with("~")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_remote_suffix() {
        assert_eq!(remote_suffix("https://cdn.example/unboxing0.mp4"), ".mp4");
        assert_eq!(remote_suffix("https://cdn.example/v.webm?sig=abc"), ".webm");
        assert_eq!(remote_suffix("https://cdn.example/stream"), "");
        assert_eq!(remote_suffix("https://cdn.example/.hidden"), "");
    }

    #[test]
    fn test_materialized_handle_deletes_file_on_last_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        file.write_all(b"clip").unwrap();
        let path = file.path().to_path_buf();

        let handle = ClipHandle::materialized("https://cdn.example/a.mp4", file.into_temp_path());
        let clone = handle.clone();
        assert!(handle.is_materialized());
        assert!(handle.uri().starts_with("file://"));

        drop(handle);
        assert!(path.exists());
        drop(clone);
        assert!(!path.exists());
    }

    #[test]
    fn test_local_handle_keeps_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let handle = ClipHandle::local("a.mp4", file.path().to_path_buf());
        drop(handle);
        assert!(file.path().exists());
    }

    #[tokio::test]
    async fn test_resolve_all_local_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let locators = vec![
            a.display().to_string(),
            format!("file://{}", b.display()),
        ];
        let handles = resolve_all(build_agent(Duration::from_secs(1)), dir.path().to_path_buf(), locators)
            .await
            .unwrap();

        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].path(), a.as_path());
        assert_eq!(handles[1].path(), b.as_path());
        assert!(!handles[1].is_materialized());
    }

    #[tokio::test]
    async fn test_resolve_all_fails_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        std::fs::write(&a, b"a").unwrap();

        let locators = vec![a.display().to_string(), "/nonexistent/clip.mp4".to_string()];
        let err = resolve_all(build_agent(Duration::from_secs(1)), dir.path().to_path_buf(), locators)
            .await
            .unwrap_err();

        assert!(matches!(err, SequenceError::Resolution(_)));
        assert!(err.to_string().contains("/nonexistent/clip.mp4"));
    }
}
