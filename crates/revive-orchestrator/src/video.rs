//! Video job orchestration.
//!
//! Starts generation on the selected provider, polls on a fixed
//! interval until a terminal status, and performs at most one provider
//! switch per logical job. Jobs whose subjects include minors are
//! routed to the alternate provider first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{info, warn};

use revive_models::{AnalysisResult, ImageAsset, JobHandle, VideoJob, VideoJobStatus, VideoProviderId};
use revive_providers::{ProviderError, VideoGenerator};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Polling policy for the video wait loop.
#[derive(Debug, Clone, Copy)]
pub struct VideoPollConfig {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Polls per provider before declaring a timeout.
    pub max_attempts: u32,
}

impl Default for VideoPollConfig {
    fn default() -> Self {
        // 5s * 120 = 10 minutes of waiting per provider.
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

/// Drives asynchronous video generation across two providers.
pub struct VideoJobOrchestrator {
    primary: Arc<dyn VideoGenerator>,
    alternate: Option<Arc<dyn VideoGenerator>>,
    config: VideoPollConfig,
    /// Jobs observable through the status endpoint, by handle.
    tracked: RwLock<HashMap<JobHandle, VideoJob>>,
    /// Bumped on session reset; in-flight waits notice and stop.
    epoch: AtomicU64,
}

impl VideoJobOrchestrator {
    pub fn new(primary: Arc<dyn VideoGenerator>) -> Self {
        Self {
            primary,
            alternate: None,
            config: VideoPollConfig::default(),
            tracked: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn with_alternate(mut self, alternate: Arc<dyn VideoGenerator>) -> Self {
        self.alternate = Some(alternate);
        self
    }

    pub fn with_config(mut self, config: VideoPollConfig) -> Self {
        self.config = config;
        self
    }

    /// Pick the first provider to try for this content.
    ///
    /// Images with minors go to the alternate provider first when one is
    /// configured; the primary's safety filters reject such content at a
    /// high rate.
    pub fn select_first_provider(&self, analysis: &AnalysisResult) -> VideoProviderId {
        if analysis.contains_minors && self.alternate.is_some() {
            VideoProviderId::Alternate
        } else {
            VideoProviderId::Primary
        }
    }

    fn generator(&self, id: VideoProviderId) -> Option<&Arc<dyn VideoGenerator>> {
        match id {
            VideoProviderId::Primary => Some(&self.primary),
            VideoProviderId::Alternate => self.alternate.as_ref(),
        }
    }

    /// Start a job on the given provider and begin tracking it.
    pub async fn start(
        &self,
        provider_id: VideoProviderId,
        prompt: &str,
        image: &ImageAsset,
    ) -> OrchestratorResult<VideoJob> {
        let generator = self
            .generator(provider_id)
            .ok_or_else(|| OrchestratorError::missing_state("No alternate video provider configured"))?;

        let handle = generator.start(prompt, image).await?;
        info!(provider = provider_id.as_str(), handle = %handle, "Video job started");
        counter!("revive_video_jobs_total", "provider" => provider_id.as_str()).increment(1);

        let job = VideoJob::started(handle.clone(), provider_id);
        self.tracked.write().await.insert(handle, job.clone());
        Ok(job)
    }

    /// Observe a tracked job once and record the transition.
    ///
    /// A poll transport error leaves the tracked status untouched; the
    /// caller decides whether to keep waiting.
    pub async fn poll_tracked(&self, handle: &JobHandle) -> OrchestratorResult<VideoJob> {
        let provider_id = {
            let tracked = self.tracked.read().await;
            tracked
                .get(handle)
                .map(|job| job.provider)
                .ok_or_else(|| OrchestratorError::UnknownJob(handle.to_string()))?
        };

        let generator = self
            .generator(provider_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(handle.to_string()))?;
        let observed = generator.poll(handle).await?;

        let mut tracked = self.tracked.write().await;
        let job = tracked
            .get_mut(handle)
            .ok_or_else(|| OrchestratorError::UnknownJob(handle.to_string()))?;

        match observed.status {
            VideoJobStatus::Succeeded => match observed.output_ref {
                Some(output_ref) => job.succeed(output_ref),
                None => {
                    job.fail("Provider reported success without an output reference");
                    return Err(OrchestratorError::VideoFailed(
                        "Provider reported success without an output reference".into(),
                    ));
                }
            },
            VideoJobStatus::Failed => {
                job.fail(observed.error_message.unwrap_or_else(|| "unknown".into()));
            }
            status => {
                if !job.observe(status) {
                    warn!(handle = %handle, from = %job.status, to = %status,
                          "Ignoring backwards status transition");
                }
            }
        }
        Ok(job.clone())
    }

    /// Run a job to completion: start, poll until terminal, and switch
    /// providers at most once when the first provider's job fails or is
    /// canceled. A timed-out job is never retried elsewhere.
    pub async fn generate(
        &self,
        analysis: &AnalysisResult,
        prompt: &str,
        image: &ImageAsset,
    ) -> OrchestratorResult<VideoJob> {
        let first = self.select_first_provider(analysis);
        let epoch = self.epoch.load(Ordering::SeqCst);

        match self.run_on_provider(first, prompt, image, epoch).await {
            Ok(job) => Ok(job),
            Err(first_error) => {
                // Refusals, validation errors, timeouts and a reset
                // session are not retried on the other provider.
                if !Self::switch_eligible(&first_error) {
                    return Err(first_error);
                }
                let second = first.other();
                if self.generator(second).is_none() {
                    return Err(first_error);
                }

                warn!(
                    from = first.as_str(),
                    to = second.as_str(),
                    error = %first_error,
                    "Switching video provider"
                );
                counter!("revive_video_provider_switches_total").increment(1);
                self.run_on_provider(second, prompt, image, epoch).await
            }
        }
    }

    /// One full start-and-poll cycle against a single provider.
    async fn run_on_provider(
        &self,
        provider_id: VideoProviderId,
        prompt: &str,
        image: &ImageAsset,
        epoch: u64,
    ) -> OrchestratorResult<VideoJob> {
        let job = self.start(provider_id, prompt, image).await?;
        let handle = job.handle.clone();

        // The attempt budget is per provider: a switch starts over.
        for _ in 0..self.config.max_attempts {
            tokio::time::sleep(self.config.interval).await;

            if self.epoch.load(Ordering::SeqCst) != epoch {
                info!(handle = %handle, "Session reset, abandoning video job");
                return Err(OrchestratorError::VideoFailed("Session was reset".into()));
            }

            let observed = match self.poll_tracked(&handle).await {
                Ok(job) => job,
                // Transient poll failures consume an attempt and the
                // loop keeps waiting.
                Err(OrchestratorError::Provider(e))
                    if e.is_fallback_eligible() || matches!(e, ProviderError::Timeout(_)) =>
                {
                    warn!(handle = %handle, error = %e, "Video poll failed, will retry");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match observed.status {
                VideoJobStatus::Succeeded => return Ok(observed),
                VideoJobStatus::Failed => {
                    return Err(OrchestratorError::VideoFailed(
                        observed.error_message.unwrap_or_else(|| "unknown".into()),
                    ));
                }
                VideoJobStatus::Canceled => {
                    return Err(OrchestratorError::VideoFailed("Job was canceled".into()));
                }
                VideoJobStatus::TimedOut => return Err(OrchestratorError::VideoTimedOut),
                VideoJobStatus::Pending | VideoJobStatus::Processing => {}
            }
        }

        if let Some(job) = self.tracked.write().await.get_mut(&handle) {
            job.time_out();
        }
        counter!("revive_video_timeouts_total", "provider" => provider_id.as_str()).increment(1);
        Err(OrchestratorError::VideoTimedOut)
    }

    /// Whether a first-provider failure permits the single switch.
    ///
    /// Only failed or canceled jobs qualify. Exhausting the poll budget
    /// is terminal: the caller already waited the full window once and
    /// gets the timed-out outcome rather than a second one.
    fn switch_eligible(error: &OrchestratorError) -> bool {
        match error {
            OrchestratorError::VideoFailed(msg) => msg != "Session was reset",
            OrchestratorError::Provider(e) => e.is_fallback_eligible(),
            _ => false,
        }
    }

    /// Snapshot of a tracked job for the status endpoint.
    pub async fn status(&self, handle: &JobHandle) -> OrchestratorResult<VideoJob> {
        self.tracked
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownJob(handle.to_string()))
    }

    /// Abandon all in-flight waits and forget tracked jobs.
    pub async fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.tracked.write().await.clear();
    }
}
