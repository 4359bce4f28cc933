//! Descriptor lookup with a per-controller cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use sratim_common::{Error, MediaDescriptor, MediaRef, Result};

use crate::endpoint::MediaEndpoint;

/// Resolves media references to descriptors, once per reference.
pub struct MetadataGate {
    endpoint: Arc<dyn MediaEndpoint>,
    cache: RwLock<HashMap<MediaRef, Arc<MediaDescriptor>>>,
}

impl MetadataGate {
    pub fn new(endpoint: Arc<dyn MediaEndpoint>) -> Self {
        Self {
            endpoint,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Descriptor for `media`, fetched from the endpoint on first use.
    ///
    /// Any endpoint failure is reported as [`Error::MetadataUnavailable`];
    /// failures are not cached.
    pub async fn resolve(&self, media: &MediaRef) -> Result<Arc<MediaDescriptor>> {
        if let Some(descriptor) = self.cached(media) {
            tracing::trace!(media = %media, "Descriptor cache hit");
            return Ok(descriptor);
        }

        let descriptor = match self.endpoint.describe(media).await {
            Ok(d) => Arc::new(d),
            Err(e @ Error::MetadataUnavailable(_)) => return Err(e),
            Err(e) => return Err(Error::metadata_unavailable(e.to_string())),
        };

        tracing::debug!(
            media = %media,
            duration = ?descriptor.duration_secs,
            video = %descriptor.video_codec_family,
            audio_tracks = descriptor.audio_tracks.len(),
            subtitle_tracks = descriptor.subtitle_tracks.len(),
            "Resolved media descriptor"
        );

        self.cache.write().insert(media.clone(), descriptor.clone());
        Ok(descriptor)
    }

    pub fn cached(&self, media: &MediaRef) -> Option<Arc<MediaDescriptor>> {
        self.cache.read().get(media).cloned()
    }

    /// Drop the cached descriptor so the next resolve refetches it.
    pub fn invalidate(&self, media: &MediaRef) -> bool {
        self.cache.write().remove(media).is_some()
    }

    pub fn endpoint(&self) -> &Arc<dyn MediaEndpoint> {
        &self.endpoint
    }
}
