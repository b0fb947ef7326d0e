//! Application state.

use std::sync::Arc;

use revive_cache::{QuotaConfig, QuotaStore, ResultCache};
use revive_orchestrator::{PipelineControllerConfig, RestorationOrchestrator, VideoJobOrchestrator};
use revive_providers::{GeminiClient, ImageAnalyzer, ReplicateClient, Translator};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub analyzer: Arc<dyn ImageAnalyzer>,
    pub translator: Arc<dyn Translator>,
    pub restoration: Arc<RestorationOrchestrator>,
    pub video: Arc<VideoJobOrchestrator>,
    pub quota: Arc<QuotaStore>,
    pub analysis_config: PipelineControllerConfig,
}

impl AppState {
    /// Wire the provider clients and orchestrators from configuration.
    ///
    /// The Replicate-backed structural restorer, fallback editor, and
    /// alternate video provider are only attached when a token is
    /// configured; without one the Gemini client runs alone.
    pub fn new(config: ApiConfig) -> Self {
        let gemini = Arc::new(GeminiClient::new(config.gemini_api_key.clone()));
        let cache = Arc::new(ResultCache::default());

        let mut restoration = RestorationOrchestrator::new(gemini.clone(), cache);
        let mut video = VideoJobOrchestrator::new(gemini.clone());
        if !config.replicate_api_token.is_empty() {
            restoration = restoration
                .with_structural_editor(Arc::new(ReplicateClient::structural_restorer(
                    config.replicate_api_token.clone(),
                )))
                .with_fallback_editor(Arc::new(ReplicateClient::prompt_editor(
                    config.replicate_api_token.clone(),
                )));
            video = video.with_alternate(Arc::new(ReplicateClient::video_generator(
                config.replicate_api_token.clone(),
            )));
        }

        let quota = Arc::new(QuotaStore::new(QuotaConfig {
            limit: config.quota_limit,
            window: config.quota_window,
        }));

        Self {
            config,
            analyzer: gemini.clone(),
            translator: gemini,
            restoration: Arc::new(restoration),
            video: Arc::new(video),
            quota,
            analysis_config: PipelineControllerConfig::default(),
        }
    }
}
