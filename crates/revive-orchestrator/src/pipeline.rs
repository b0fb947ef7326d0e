//! Per-session pipeline controller.
//!
//! Owns the session's state machine and the data flowing between
//! stages: the uploaded image, the analysis document, and the restored
//! output. Each public method fires one trigger, runs the stage, and
//! settles the machine; any unrecovered failure drops the session back
//! to `Idle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Mutex;
use tracing::{info, warn};

use revive_cache::QuotaStore;
use revive_models::{
    AnalysisResult, ImageAsset, JobHandle, PipelineState, PipelineTrigger, RestorationStrategy,
    VideoJob, VideoJobStatus,
};
use revive_providers::{ImageAnalyzer, ImageEditor, ProviderError, Translator};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::restoration::{RestorationOrchestrator, RestorationOutcome};
use crate::video::VideoJobOrchestrator;

/// Instruction used for the perspective-correction edit.
const CORRECTION_INSTRUCTION: &str =
    "Correct the perspective of this photographed photo: straighten the \
     edges, remove keystone distortion, and crop to the photo itself. Do \
     not alter the photo's content.";

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct PipelineControllerConfig {
    /// Analysis attempts before giving up.
    pub analysis_max_attempts: u32,
    /// Base delay between analysis attempts (grows linearly).
    pub analysis_retry_delay: Duration,
}

impl Default for PipelineControllerConfig {
    fn default() -> Self {
        Self {
            analysis_max_attempts: 3,
            analysis_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Caller options for the restore stage.
#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    /// Opt into the double-pass strategy when the analysis qualifies.
    pub enhanced_mode: bool,
    /// Replace the analysis-derived instruction entirely.
    pub instruction_override: Option<String>,
    /// Translate the instruction for display, best-effort.
    pub translate_to: Option<String>,
}

/// Result of the restore stage.
#[derive(Debug)]
pub struct RestoreResponse {
    pub outcome: RestorationOutcome,
    /// The instruction actually used, possibly translated for display.
    pub display_instruction: String,
}

/// Data accumulated over one session.
#[derive(Default)]
struct SessionState {
    state: PipelineState,
    original: Option<ImageAsset>,
    analysis: Option<AnalysisResult>,
    restored: Option<ImageAsset>,
    /// Whether this session already used its single video provider switch.
    video_switched: bool,
}

/// Drives one user session through the full restoration journey.
pub struct PipelineController {
    analyzer: Arc<dyn ImageAnalyzer>,
    corrector: Arc<dyn ImageEditor>,
    translator: Arc<dyn Translator>,
    restoration: Arc<RestorationOrchestrator>,
    video: Arc<VideoJobOrchestrator>,
    quota: Arc<QuotaStore>,
    config: PipelineControllerConfig,
    session: Mutex<SessionState>,
    /// Guards against concurrent eye-color generations for one session.
    eye_color_in_flight: AtomicBool,
}

impl PipelineController {
    pub fn new(
        analyzer: Arc<dyn ImageAnalyzer>,
        corrector: Arc<dyn ImageEditor>,
        translator: Arc<dyn Translator>,
        restoration: Arc<RestorationOrchestrator>,
        video: Arc<VideoJobOrchestrator>,
        quota: Arc<QuotaStore>,
    ) -> Self {
        Self {
            analyzer,
            corrector,
            translator,
            restoration,
            video,
            quota,
            config: PipelineControllerConfig::default(),
            session: Mutex::new(SessionState::default()),
            eye_color_in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_config(mut self, config: PipelineControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Current pipeline state.
    pub async fn state(&self) -> PipelineState {
        self.session.lock().await.state
    }

    /// Fire a trigger, or fail with the current state in the error.
    async fn fire(&self, trigger: PipelineTrigger) -> OrchestratorResult<()> {
        let mut session = self.session.lock().await;
        match session.state.on_trigger(trigger) {
            Some(next) => {
                session.state = next;
                Ok(())
            }
            None => Err(OrchestratorError::InvalidTransition {
                state: session.state,
                trigger,
            }),
        }
    }

    async fn settle_success(&self) {
        let mut session = self.session.lock().await;
        session.state = session.state.on_success();
    }

    async fn settle_failure(&self) {
        let mut session = self.session.lock().await;
        session.state = session.state.on_failure();
        counter!("revive_pipeline_failures_total").increment(1);
    }

    /// Analyze an uploaded image and store the result in the session.
    ///
    /// Validation failures and incomplete documents are retried with a
    /// linearly growing delay; transport errors and refusals are not.
    pub async fn analyze(
        &self,
        image: ImageAsset,
        language: &str,
    ) -> OrchestratorResult<AnalysisResult> {
        self.fire(PipelineTrigger::Analyze).await?;

        let result = analyze_with_retry(
            self.analyzer.as_ref(),
            &image,
            language,
            None,
            &self.config,
        )
        .await;
        match result {
            Ok(analysis) => {
                let mut session = self.session.lock().await;
                session.original = Some(image);
                session.analysis = Some(analysis.clone());
                // The machine stays in Analyzing until restore fires.
                Ok(analysis)
            }
            Err(e) => {
                self.settle_failure().await;
                Err(e)
            }
        }
    }

    /// Run the restore stage, including optional perspective correction
    /// and best-effort instruction translation.
    pub async fn restore(
        &self,
        identity: &str,
        country: Option<&str>,
        request: RestoreRequest,
    ) -> OrchestratorResult<RestoreResponse> {
        let decision = self.quota.check(identity, country).await;
        if !decision.allowed {
            return Err(OrchestratorError::RateLimited(decision));
        }

        let (mut input, analysis) = {
            let session = self.session.lock().await;
            let input = session
                .original
                .clone()
                .ok_or_else(|| OrchestratorError::missing_state("No image uploaded"))?;
            let analysis = session
                .analysis
                .clone()
                .ok_or_else(|| OrchestratorError::missing_state("Image not analyzed"))?;
            (input, analysis)
        };

        if analysis.needs_perspective_correction {
            self.fire(PipelineTrigger::Correct).await?;
            match self.corrector.edit(&input, CORRECTION_INSTRUCTION, None).await {
                Ok(corrected) => input = corrected,
                Err(e) => {
                    self.settle_failure().await;
                    return Err(e.into());
                }
            }
        }

        self.fire(PipelineTrigger::Restore).await?;

        let instruction = request
            .instruction_override
            .clone()
            .unwrap_or_else(|| analysis.restoration_instruction.clone());
        let strategy = RestorationStrategy::select(
            analysis.qualifies_for_double_pass(),
            request.enhanced_mode,
        );

        let outcome = match self.restoration.restore(&input, &instruction, strategy).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.settle_failure().await;
                return Err(e);
            }
        };

        {
            let mut session = self.session.lock().await;
            session.restored = Some(outcome.asset.clone());
        }

        // Translation is cosmetic: a failure keeps the English text and
        // never undoes a finished restoration.
        let display_instruction = match &request.translate_to {
            Some(lang) if lang != "en" => {
                self.fire(PipelineTrigger::Translate).await?;
                match self.translator.translate(&instruction, lang).await {
                    Ok(translated) => translated,
                    Err(e) => {
                        warn!(error = %e, "Instruction translation failed, keeping English");
                        instruction.clone()
                    }
                }
            }
            _ => instruction.clone(),
        };

        self.settle_success().await;
        info!(strategy = strategy.as_str(), "Restoration stage complete");
        Ok(RestoreResponse {
            outcome,
            display_instruction,
        })
    }

    /// Generate an eye-color variant of the restored image.
    ///
    /// Only one variant generation may be in flight per session; a
    /// second request is rejected rather than queued.
    pub async fn eye_color(&self, color: &str) -> OrchestratorResult<ImageAsset> {
        let (restored, analysis) = {
            let session = self.session.lock().await;
            if session.state.is_busy() {
                return Err(OrchestratorError::InvalidTransition {
                    state: session.state,
                    trigger: PipelineTrigger::Restore,
                });
            }
            let restored = session
                .restored
                .clone()
                .ok_or_else(|| OrchestratorError::missing_state("No restored image"))?;
            let analysis = session
                .analysis
                .clone()
                .ok_or_else(|| OrchestratorError::missing_state("Image not analyzed"))?;
            (restored, analysis)
        };

        if self
            .eye_color_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrchestratorError::VariantInFlight);
        }

        let result = self
            .restoration
            .eye_color_variant(&restored, &analysis.restoration_instruction, color)
            .await;
        self.eye_color_in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Run video generation to completion, including the poll loop and
    /// the single provider switch.
    pub async fn generate_video(&self) -> OrchestratorResult<VideoJob> {
        self.fire(PipelineTrigger::GenerateVideo).await?;

        let (restored, analysis) = match self.video_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => {
                self.settle_failure().await;
                return Err(e);
            }
        };

        match self
            .video
            .generate(&analysis, &analysis.animation_instruction, &restored)
            .await
        {
            Ok(job) => {
                self.settle_success().await;
                Ok(job)
            }
            Err(e) => {
                self.settle_failure().await;
                Err(e)
            }
        }
    }

    /// Start video generation without waiting; pair with `video_status`.
    pub async fn start_video(&self) -> OrchestratorResult<VideoJob> {
        self.fire(PipelineTrigger::GenerateVideo).await?;

        let (restored, analysis) = match self.video_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => {
                self.settle_failure().await;
                return Err(e);
            }
        };

        let provider = self.video.select_first_provider(&analysis);
        match self
            .video
            .start(provider, &analysis.animation_instruction, &restored)
            .await
        {
            Ok(job) => Ok(job),
            Err(e) => {
                self.settle_failure().await;
                Err(e)
            }
        }
    }

    /// Observe a started job once and settle the pipeline on terminal
    /// statuses.
    ///
    /// On a provider-side failure the session's single switch is spent
    /// here: a fresh job starts on the other provider and its pending
    /// status is returned for the caller to keep polling.
    pub async fn video_status(&self, handle: &JobHandle) -> OrchestratorResult<VideoJob> {
        let job = match self.video.poll_tracked(handle).await {
            Ok(job) => job,
            Err(OrchestratorError::Provider(e)) if e.is_fallback_eligible() => {
                // Transient poll failure: report the last known status.
                return self.video.status(handle).await;
            }
            Err(e) => return Err(e),
        };

        match job.status {
            VideoJobStatus::Succeeded => {
                self.settle_success().await;
                Ok(job)
            }
            // Exhausting the poll budget is terminal; the single switch
            // is reserved for failed or canceled jobs.
            VideoJobStatus::TimedOut => {
                self.settle_failure().await;
                Err(OrchestratorError::VideoTimedOut)
            }
            VideoJobStatus::Failed | VideoJobStatus::Canceled => {
                let switched = {
                    let mut session = self.session.lock().await;
                    if session.video_switched {
                        true
                    } else {
                        session.video_switched = true;
                        false
                    }
                };
                if switched {
                    self.settle_failure().await;
                    return Err(OrchestratorError::VideoFailed(
                        job.error_message.unwrap_or_else(|| "unknown".into()),
                    ));
                }

                let (restored, analysis) = self.video_inputs().await?;
                let next = job.provider.other();
                warn!(
                    from = job.provider.as_str(),
                    to = next.as_str(),
                    "Video job failed, switching provider"
                );
                match self
                    .video
                    .start(next, &analysis.animation_instruction, &restored)
                    .await
                {
                    Ok(job) => Ok(job),
                    Err(e) => {
                        self.settle_failure().await;
                        Err(e)
                    }
                }
            }
            _ => Ok(job),
        }
    }

    async fn video_inputs(&self) -> OrchestratorResult<(ImageAsset, AnalysisResult)> {
        let session = self.session.lock().await;
        let restored = session
            .restored
            .clone()
            .ok_or_else(|| OrchestratorError::missing_state("No restored image"))?;
        let analysis = session
            .analysis
            .clone()
            .ok_or_else(|| OrchestratorError::missing_state("Image not analyzed"))?;
        Ok((restored, analysis))
    }

    /// Drop all session data and abandon in-flight video waits.
    pub async fn reset(&self) {
        self.video.reset().await;
        self.restoration.clear_cache().await;
        let mut session = self.session.lock().await;
        *session = SessionState::default();
        self.eye_color_in_flight.store(false, Ordering::SeqCst);
        info!("Session reset");
    }
}

/// Analyze with retries on structurally bad responses.
///
/// Validation failures and incomplete documents are retried with a
/// linearly growing delay up to the configured attempt bound; transport
/// errors and refusals surface immediately.
pub async fn analyze_with_retry(
    analyzer: &dyn ImageAnalyzer,
    image: &ImageAsset,
    language: &str,
    hint: Option<&str>,
    config: &PipelineControllerConfig,
) -> OrchestratorResult<AnalysisResult> {
    let mut last_error: Option<ProviderError> = None;
    for attempt in 1..=config.analysis_max_attempts {
        if attempt > 1 {
            tokio::time::sleep(config.analysis_retry_delay * (attempt - 1)).await;
        }
        match analyzer.analyze(image, language, hint).await {
            Ok(analysis) if analysis.is_complete() => return Ok(analysis),
            Ok(_) => {
                warn!(attempt, "Analysis returned an incomplete document");
                last_error = Some(ProviderError::validation("Incomplete analysis document"));
            }
            Err(e) if e.is_validation() => {
                warn!(attempt, error = %e, "Analysis validation failure");
                last_error = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_error
        .map(OrchestratorError::from)
        .unwrap_or_else(|| OrchestratorError::missing_state("Analysis produced nothing")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use revive_cache::{QuotaConfig, ResultCache};
    use revive_models::{Lighting, VideoProviderId};
    use revive_providers::adapter::{
        MockImageAnalyzer, MockImageEditor, MockTranslator, MockVideoGenerator,
    };
    use revive_providers::NormalizeLimits;

    fn analysis_doc(needs_correction: bool) -> AnalysisResult {
        AnalysisResult {
            contains_minors: false,
            needs_perspective_correction: needs_correction,
            has_many_subjects: false,
            is_monochrome: true,
            is_very_old: true,
            has_eye_color_potential: true,
            subject_count: 1,
            lighting: Lighting {
                direction: "front".into(),
                quality: "soft".into(),
                light_type: "natural".into(),
                shadow_strength: "weak".into(),
                description: "Window light".into(),
            },
            restoration_instruction: "Restore and colorize.".into(),
            animation_instruction: "Subtle smile.".into(),
            suggested_name: "portrait".into(),
        }
    }

    fn real_image(tag: u8) -> ImageAsset {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            16,
            16,
            image::Rgb([tag, tag, tag]),
        ));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        ImageAsset::new(bytes, "image/jpeg")
    }

    struct Mocks {
        analyzer: MockImageAnalyzer,
        corrector: MockImageEditor,
        translator: MockTranslator,
        editor: MockImageEditor,
        quota_limit: u32,
    }

    impl Default for Mocks {
        fn default() -> Self {
            let mut corrector = Mocks::editor_mock();
            corrector.expect_edit().times(0);
            Self {
                analyzer: MockImageAnalyzer::new(),
                corrector,
                translator: MockTranslator::new(),
                editor: Mocks::editor_mock(),
                quota_limit: 10,
            }
        }
    }

    impl Mocks {
        fn editor_mock() -> MockImageEditor {
            let mut mock = MockImageEditor::new();
            mock.expect_id().return_const("gemini-edit");
            mock
        }

        fn build(self) -> PipelineController {
            let mut video_gen = MockVideoGenerator::new();
            video_gen.expect_id().return_const("veo");
            let video = Arc::new(VideoJobOrchestrator::new(Arc::new(video_gen)));
            self.build_with_video(video)
        }

        fn build_with_video(self, video: Arc<VideoJobOrchestrator>) -> PipelineController {
            let cache = Arc::new(ResultCache::default());
            let restoration = Arc::new(
                RestorationOrchestrator::new(Arc::new(self.editor), cache)
                    .with_limits(NormalizeLimits::default()),
            );
            PipelineController::new(
                Arc::new(self.analyzer),
                Arc::new(self.corrector),
                Arc::new(self.translator),
                restoration,
                video,
                Arc::new(QuotaStore::new(QuotaConfig {
                    limit: self.quota_limit,
                    window: Duration::from_secs(3600),
                })),
            )
            .with_config(PipelineControllerConfig {
                analysis_max_attempts: 3,
                analysis_retry_delay: Duration::from_millis(1),
            })
        }
    }

    #[tokio::test]
    async fn test_analyze_then_restore_happy_path() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .times(1)
            .returning(|_, _, _| Ok(analysis_doc(false)));
        mocks
            .editor
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Ok(real_image(5)));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        assert_eq!(controller.state().await, PipelineState::Analyzing);

        let response = controller
            .restore("user-1", None, RestoreRequest::default())
            .await
            .unwrap();
        assert_eq!(response.display_instruction, "Restore and colorize.");
        assert_eq!(controller.state().await, PipelineState::ReadyForVideo);
    }

    #[tokio::test]
    async fn test_restore_before_analyze_is_rejected() {
        let controller = Mocks::default().build();
        let err = controller
            .restore("user-1", None, RestoreRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingState(_)));
    }

    #[tokio::test]
    async fn test_analysis_validation_failures_are_retried() {
        let mut mocks = Mocks::default();
        let mut calls = 0u32;
        mocks.analyzer.expect_analyze().times(3).returning(move |_, _, _| {
            calls += 1;
            if calls < 3 {
                Err(ProviderError::validation("bad json"))
            } else {
                Ok(analysis_doc(false))
            }
        });

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
    }

    #[tokio::test]
    async fn test_analysis_transport_failure_is_not_retried() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::transport("503")));

        let controller = mocks.build();
        let err = controller.analyze(real_image(1), "en").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Provider(_)));
        assert_eq!(controller.state().await, PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_correction_runs_when_flagged() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .returning(|_, _, _| Ok(analysis_doc(true)));
        mocks.corrector = Mocks::editor_mock();
        mocks
            .corrector
            .expect_edit()
            .times(1)
            .withf(|_, instruction, _| instruction.contains("perspective"))
            .returning(|_, _, _| Ok(real_image(9)));
        mocks
            .editor
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Ok(real_image(5)));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        controller
            .restore("user-1", None, RestoreRequest::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restore_over_quota_returns_structured_denial() {
        let mut mocks = Mocks::default();
        mocks.quota_limit = 1;
        mocks
            .analyzer
            .expect_analyze()
            .returning(|_, _, _| Ok(analysis_doc(false)));
        mocks
            .editor
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Ok(real_image(5)));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        controller
            .restore("user-1", Some("DE"), RestoreRequest::default())
            .await
            .unwrap();

        // Second restore exceeds the limit before any state change.
        let err = controller
            .restore("user-1", Some("DE"), RestoreRequest::default())
            .await
            .unwrap_err();
        match err {
            OrchestratorError::RateLimited(decision) => {
                assert_eq!(decision.limit, 1);
                assert_eq!(decision.remaining, 0);
                assert_eq!(decision.country.as_deref(), Some("DE"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_restoration_failure_resets_to_idle() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .returning(|_, _, _| Ok(analysis_doc(false)));
        mocks
            .editor
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::refusal("policy")));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        let err = controller
            .restore("user-1", None, RestoreRequest::default())
            .await
            .unwrap_err();
        assert!(err.is_refusal());
        assert_eq!(controller.state().await, PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_english_text() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .returning(|_, _, _| Ok(analysis_doc(false)));
        mocks
            .editor
            .expect_edit()
            .returning(|_, _, _| Ok(real_image(5)));
        mocks
            .translator
            .expect_translate()
            .times(1)
            .returning(|_, _| Err(ProviderError::transport("503")));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        let response = controller
            .restore(
                "user-1",
                None,
                RestoreRequest {
                    translate_to: Some("de".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.display_instruction, "Restore and colorize.");
        assert_eq!(controller.state().await, PipelineState::ReadyForVideo);
    }

    #[tokio::test]
    async fn test_translation_success_returns_translated_text() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .returning(|_, _, _| Ok(analysis_doc(false)));
        mocks
            .editor
            .expect_edit()
            .returning(|_, _, _| Ok(real_image(5)));
        mocks
            .translator
            .expect_translate()
            .withf(|text, lang| text == "Restore and colorize." && lang == "de")
            .returning(|_, _| Ok("Restaurieren und kolorieren.".into()));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        let response = controller
            .restore(
                "user-1",
                None,
                RestoreRequest {
                    translate_to: Some("de".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.display_instruction, "Restaurieren und kolorieren.");
    }

    #[tokio::test]
    async fn test_eye_color_requires_restored_image() {
        let controller = Mocks::default().build();
        let err = controller.eye_color("blue").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingState(_)));
    }

    #[tokio::test]
    async fn test_video_before_restore_is_rejected() {
        let controller = Mocks::default().build();
        let err = controller.generate_video().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_video_timeout_is_terminal_for_the_session() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .times(1)
            .returning(|_, _, _| Ok(analysis_doc(false)));
        mocks
            .editor
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Ok(real_image(5)));

        let mut primary = MockVideoGenerator::new();
        primary.expect_id().return_const("veo");
        primary
            .expect_start()
            .times(1)
            .returning(|_, _| Ok(JobHandle::new("op-9")));
        primary.expect_poll().returning(|_| {
            let mut job = VideoJob::started(JobHandle::new("op-9"), VideoProviderId::Primary);
            job.time_out();
            Ok(job)
        });
        // The timed-out job must not spend the session's single switch.
        let mut alternate = MockVideoGenerator::new();
        alternate.expect_id().return_const("kling");
        alternate.expect_start().times(0);
        let video = Arc::new(
            VideoJobOrchestrator::new(Arc::new(primary)).with_alternate(Arc::new(alternate)),
        );

        let controller = mocks.build_with_video(video);
        controller.analyze(real_image(1), "en").await.unwrap();
        controller
            .restore("user-1", None, RestoreRequest::default())
            .await
            .unwrap();

        let job = controller.start_video().await.unwrap();
        let err = controller.video_status(&job.handle).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::VideoTimedOut));
        assert_eq!(controller.state().await, PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let mut mocks = Mocks::default();
        mocks
            .analyzer
            .expect_analyze()
            .returning(|_, _, _| Ok(analysis_doc(false)));

        let controller = mocks.build();
        controller.analyze(real_image(1), "en").await.unwrap();
        assert_eq!(controller.state().await, PipelineState::Analyzing);

        controller.reset().await;
        assert_eq!(controller.state().await, PipelineState::Idle);

        let err = controller
            .restore("user-1", None, RestoreRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingState(_)));
    }
}
