//! Owner authentication.
//!
//! The session asks an [`Authenticator`] exactly once for an [`AccessMode`].
//! [`GalleryAuthenticator`] compares live embeddings from an
//! [`EmbeddingProbe`] against an enrolled gallery of reference embeddings
//! stored as JSON arrays under `auth.gallery_dir`.

pub mod voiceprint;

pub use voiceprint::{MicVoiceprintProbe, compute_voiceprint};

use crate::access::AccessMode;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Decides the session's access mode.
#[async_trait]
pub trait Authenticator: Send {
    /// Try to recognise the owner for up to `timeout`.
    ///
    /// Returns [`AccessMode::Owner`] on the first match closer than
    /// `match_threshold`, otherwise [`AccessMode::Guest`].
    ///
    /// # Errors
    ///
    /// Returns an error only for configuration problems; failed or
    /// inconclusive probes fall back to GUEST.
    async fn authenticate(&mut self, timeout: Duration, match_threshold: f32)
    -> Result<AccessMode>;
}

/// Produces one live embedding per call, or `None` if nothing usable was seen.
#[async_trait]
pub trait EmbeddingProbe: Send {
    /// # Errors
    ///
    /// Returns an error if the capture device fails.
    async fn probe(&mut self) -> Result<Option<Vec<f32>>>;
}

/// Always answers with the same mode. Used for forced-guest sessions.
#[derive(Debug, Clone, Copy)]
pub struct FixedAuthenticator(pub AccessMode);

#[async_trait]
impl Authenticator for FixedAuthenticator {
    async fn authenticate(&mut self, _timeout: Duration, _threshold: f32) -> Result<AccessMode> {
        Ok(self.0)
    }
}

/// Gallery matcher over live probes.
pub struct GalleryAuthenticator<P> {
    gallery: Vec<Vec<f32>>,
    probe: P,
}

impl<P: EmbeddingProbe> GalleryAuthenticator<P> {
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if the gallery is empty.
    pub fn new(gallery: Vec<Vec<f32>>, probe: P) -> Result<Self> {
        if gallery.is_empty() {
            return Err(AssistantError::Config(
                "no valid owner embeddings in gallery".into(),
            ));
        }
        Ok(Self { gallery, probe })
    }

    /// Load the gallery from `dir`.
    ///
    /// # Errors
    ///
    /// See [`load_gallery`].
    pub fn from_dir(dir: &Path, probe: P) -> Result<Self> {
        Self::new(load_gallery(dir)?, probe)
    }

    fn matches(&self, live: &[f32], threshold: f32) -> bool {
        self.gallery.iter().any(|reference| {
            euclidean_distance(live, reference).is_some_and(|d| {
                debug!("gallery distance {d:.3}");
                d < threshold
            })
        })
    }
}

#[async_trait]
impl<P: EmbeddingProbe> Authenticator for GalleryAuthenticator<P> {
    async fn authenticate(&mut self, timeout: Duration, match_threshold: f32) -> Result<AccessMode> {
        let deadline = tokio::time::Instant::now() + timeout;
        info!("authenticating owner (timeout {}s)", timeout.as_secs_f32());

        loop {
            let probed = match tokio::time::timeout_at(deadline, self.probe.probe()).await {
                Ok(result) => result,
                Err(_) => break,
            };
            match probed {
                Ok(Some(live)) => {
                    if self.matches(&live, match_threshold) {
                        info!("owner recognised");
                        return Ok(AccessMode::Owner);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("authentication probe failed: {e}");
                    tokio::time::sleep_until(
                        deadline.min(tokio::time::Instant::now() + Duration::from_millis(100)),
                    )
                    .await;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }

        info!("owner not recognised, continuing as guest");
        Ok(AccessMode::Guest)
    }
}

/// Euclidean distance, `None` when dimensions differ or are empty.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    Some(
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    )
}

/// Load every `*.json` embedding under `dir`.
///
/// Unreadable or malformed files are skipped with a warning.
///
/// # Errors
///
/// Returns [`AssistantError::Config`] if the directory is missing or holds
/// no valid embeddings.
pub fn load_gallery(dir: &Path) -> Result<Vec<Vec<f32>>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AssistantError::Config(format!(
            "owner gallery {} is unavailable: {e} (run `friday enroll` first)",
            dir.display()
        ))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    paths.sort();

    let mut gallery = Vec::new();
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<Vec<f32>>(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(embedding) if !embedding.is_empty() => gallery.push(embedding),
            Ok(_) => warn!("skipping empty embedding {}", path.display()),
            Err(e) => warn!("skipping unreadable embedding {}: {e}", path.display()),
        }
    }

    if gallery.is_empty() {
        return Err(AssistantError::Config(format!(
            "no valid owner embeddings in {} (run `friday enroll` first)",
            dir.display()
        )));
    }
    info!("loaded {} owner embedding(s)", gallery.len());
    Ok(gallery)
}

/// Write one embedding into the gallery, returning the new file's path.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_embedding(dir: &Path, embedding: &[f32]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let path = dir.join(format!("owner_{stamp}.json"));
    let json = serde_json::to_string(embedding)
        .map_err(|e| AssistantError::Auth(format!("cannot serialise embedding: {e}")))?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Capture one probe and add it to the gallery.
///
/// # Errors
///
/// Returns [`AssistantError::Auth`] if the probe produced nothing usable.
pub async fn enroll(probe: &mut dyn EmbeddingProbe, dir: &Path) -> Result<PathBuf> {
    let embedding = probe.probe().await?.ok_or_else(|| {
        AssistantError::Auth("no speech detected during enrollment, please try again".into())
    })?;
    let path = save_embedding(dir, &embedding)?;
    info!("enrolled owner sample at {}", path.display());
    Ok(path)
}
