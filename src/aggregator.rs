//! Favicon color sampling.
//!
//! One run samples every favicon in a group concurrently and reduces the
//! results through an [`AggregationJob`], which fires its continuation exactly
//! once, after the last source resolves, whatever mix of successes and
//! failures came before.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use image::RgbaImage;

use crate::host::{EntityHost, ImageLoader};
use crate::models::{rounded_mean, EntityId, Namespace, Rgb};
use crate::store::PersistentStore;

/// Pixels at or below this alpha are background.
pub const MIN_ALPHA: u8 = 128;
/// Pixels whose channel sum is at or below this are presumed outline/background.
pub const MIN_BRIGHTNESS: u16 = 30;

/// Fan-in state for one sampling run.
#[derive(Debug)]
pub struct AggregationJob {
    total: usize,
    completed: usize,
    samples: Vec<Rgb>,
    finished: bool,
}

/// Produced once per job, when the last source resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub sources: usize,
    pub samples: usize,
    /// Mean of all samples; `None` when every source failed or was empty.
    pub color: Option<Rgb>,
}

impl AggregationJob {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            samples: Vec::with_capacity(total),
            finished: false,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn samples(&self) -> &[Rgb] {
        &self.samples
    }

    /// Resolve one source. `None` means it failed or had no usable pixels.
    ///
    /// Returns the job result on the call that completes the last source and
    /// `None` on every other call, including calls after completion.
    pub fn record(&mut self, sample: Option<Rgb>) -> Option<JobResult> {
        if self.finished {
            return None;
        }
        self.completed += 1;
        if let Some(rgb) = sample {
            self.samples.push(rgb);
        }
        if self.completed < self.total {
            return None;
        }
        self.finished = true;
        Some(JobResult {
            sources: self.total,
            samples: self.samples.len(),
            color: Rgb::average(&self.samples),
        })
    }
}

/// Representative color of one decoded image.
///
/// Averages every pixel above [`MIN_ALPHA`] whose channel sum exceeds
/// [`MIN_BRIGHTNESS`]. `None` when no pixel qualifies.
pub fn representative_color(image: &RgbaImage) -> Option<Rgb> {
    let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
    for pixel in image.pixels() {
        let [pr, pg, pb, pa] = pixel.0;
        if pa > MIN_ALPHA && pr as u16 + pg as u16 + pb as u16 > MIN_BRIGHTNESS {
            r += pr as u64;
            g += pg as u64;
            b += pb as u64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Rgb::new(
        rounded_mean(r, count),
        rounded_mean(g, count),
        rounded_mean(b, count),
    ))
}

/// Decode image bytes and extract their representative color.
pub fn sample_bytes(bytes: &[u8]) -> Result<Option<Rgb>, image::ImageError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    Ok(representative_color(&image))
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// The group has no favicons; nothing happened.
    NoSources,
    /// Every source failed or was empty; nothing was assigned or saved.
    NoSamples { sources: usize },
    /// The group went away before the color could be assigned.
    EntityGone { color: String },
    Applied { color: String, sources: usize, samples: usize },
}

#[derive(Clone)]
pub struct ColorAggregator {
    host: Arc<dyn EntityHost>,
    images: Arc<dyn ImageLoader>,
    store: PersistentStore,
}

impl ColorAggregator {
    pub fn new(
        host: Arc<dyn EntityHost>,
        images: Arc<dyn ImageLoader>,
        store: PersistentStore,
    ) -> Self {
        Self { host, images, store }
    }

    /// Sample every favicon of `id`, then assign and persist the mean color.
    ///
    /// Each call is an independent job; a later run simply overwrites the
    /// earlier result.
    pub async fn run(&self, id: &EntityId) -> AggregationOutcome {
        let sources: Vec<Option<String>> = self
            .host
            .members(id)
            .into_iter()
            .map(|item| item.favicon)
            .collect();
        if sources.is_empty() {
            tracing::debug!("No favicons to sample for group {}", id);
            return AggregationOutcome::NoSources;
        }

        let mut job = AggregationJob::new(sources.len());
        let mut pending: FuturesUnordered<_> = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| self.sample_source(id, index, source))
            .collect();

        let mut result = None;
        while let Some(sample) = pending.next().await {
            if let Some(done) = job.record(sample) {
                result = Some(done);
            }
        }

        match result {
            Some(result) => self.finish(id, result),
            // total > 0, so the last record always yields a result
            None => AggregationOutcome::NoSamples {
                sources: job.total(),
            },
        }
    }

    /// Run on a background task.
    pub fn spawn(&self, id: EntityId) -> tokio::task::JoinHandle<AggregationOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.run(&id).await })
    }

    async fn sample_source(&self, id: &EntityId, index: usize, source: Option<String>) -> Option<Rgb> {
        let Some(url) = source else {
            tracing::debug!("Favicon {} of group {} has no source", index + 1, id);
            return None;
        };
        let bytes = match self.images.load(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Failed to load favicon {} of group {}: {}", index + 1, id, e);
                return None;
            }
        };
        match sample_bytes(&bytes) {
            Ok(Some(rgb)) => Some(rgb),
            Ok(None) => {
                tracing::debug!("No visible pixels in favicon {} of group {}", index + 1, id);
                None
            }
            Err(e) => {
                tracing::debug!("Failed to decode favicon {} of group {}: {}", index + 1, id, e);
                None
            }
        }
    }

    fn finish(&self, id: &EntityId, result: JobResult) -> AggregationOutcome {
        let Some(rgb) = result.color else {
            tracing::debug!(
                "No colors extracted from {} favicons of group {}",
                result.sources,
                id
            );
            return AggregationOutcome::NoSamples {
                sources: result.sources,
            };
        };

        let color = rgb.to_string();
        if let Err(e) = self.host.set_color(id, Some(&color)) {
            tracing::warn!("Could not assign favicon color to group {}: {}", id, e);
            return AggregationOutcome::EntityGone { color };
        }
        if let Err(e) = self.store.put(Namespace::Colors, id, &color) {
            tracing::warn!("Could not save favicon color for group {}: {}", id, e);
        }
        tracing::info!(
            "Applied favicon color {} to group {} from {} of {} favicons",
            color,
            id,
            result.samples,
            result.sources
        );
        AggregationOutcome::Applied {
            color,
            sources: result.sources,
            samples: result.samples,
        }
    }
}
