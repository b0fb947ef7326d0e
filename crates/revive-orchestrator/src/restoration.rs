//! Restoration orchestration.
//!
//! Normalizes the upload at the input stage, decides single-pass vs
//! double-pass, drives the editor providers in order with fallback,
//! absorbs pass-2 failures, and re-encodes every result to the
//! canonical delivery format before returning it.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use revive_cache::ResultCache;
use revive_models::{ImageAsset, ProviderAttempt, RestorationJob, RestorationStrategy};
use revive_providers::{normalize_image, ImageEditor, NormalizeLimits};

use crate::error::OrchestratorResult;
use crate::fallback::attempt_with_fallback;

/// Result of one restoration run.
#[derive(Debug)]
pub struct RestorationOutcome {
    /// The delivered asset, already in the canonical format
    pub asset: ImageAsset,
    /// Attempt record for logging and diagnostics
    pub job: RestorationJob,
}

/// Orchestrates the restoration provider chain.
pub struct RestorationOrchestrator {
    /// Prompt-driven editor (primary)
    prompt_editor: Arc<dyn ImageEditor>,
    /// Blind structural restorer used as pass 1 of the double-pass
    structural_editor: Option<Arc<dyn ImageEditor>>,
    /// Alternate prompt-driven editor for single-pass fallback
    fallback_editor: Option<Arc<dyn ImageEditor>>,
    cache: Arc<ResultCache>,
    limits: NormalizeLimits,
}

impl RestorationOrchestrator {
    pub fn new(prompt_editor: Arc<dyn ImageEditor>, cache: Arc<ResultCache>) -> Self {
        Self {
            prompt_editor,
            structural_editor: None,
            fallback_editor: None,
            cache,
            limits: NormalizeLimits::default(),
        }
    }

    pub fn with_structural_editor(mut self, editor: Arc<dyn ImageEditor>) -> Self {
        self.structural_editor = Some(editor);
        self
    }

    pub fn with_fallback_editor(mut self, editor: Arc<dyn ImageEditor>) -> Self {
        self.fallback_editor = Some(editor);
        self
    }

    pub fn with_limits(mut self, limits: NormalizeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run one restoration with the given strategy.
    pub async fn restore(
        &self,
        input: &ImageAsset,
        instruction: &str,
        strategy: RestorationStrategy,
    ) -> OrchestratorResult<RestorationOutcome> {
        // Size and format are constrained before any provider sees the
        // upload.
        let input = normalize_image(input, self.limits)?;
        let mut job = RestorationJob::new(input.fingerprint(), instruction, strategy);

        let raw = match strategy {
            RestorationStrategy::SinglePass => {
                self.single_pass(&input, instruction, &mut job).await?
            }
            RestorationStrategy::DoublePass => {
                self.double_pass(&input, instruction, &mut job).await?
            }
        };

        // Canonical delivery format, on the fallback path too.
        let asset = normalize_image(&raw, self.limits)?;
        Ok(RestorationOutcome { asset, job })
    }

    /// One prompt-driven edit, with at most one fallback hop.
    async fn single_pass(
        &self,
        input: &ImageAsset,
        instruction: &str,
        job: &mut RestorationJob,
    ) -> OrchestratorResult<ImageAsset> {
        counter!("revive_restorations_total", "strategy" => "single_pass").increment(1);

        let outcome = attempt_with_fallback(
            "restore",
            || self.prompt_editor.edit(input, instruction, None),
            self.fallback_editor
                .as_ref()
                .map(|editor| move || editor.edit(input, instruction, None)),
        )
        .await;

        match outcome {
            Ok(result) => {
                if let Some(primary_error) = result.primary_error {
                    job.record(ProviderAttempt::failure(
                        self.prompt_editor.id(),
                        1,
                        primary_error,
                    ));
                    // used_fallback implies the fallback editor exists
                    if let Some(fb) = &self.fallback_editor {
                        job.record(ProviderAttempt::success(fb.id(), 1));
                    }
                } else {
                    job.record(ProviderAttempt::success(self.prompt_editor.id(), 1));
                }
                Ok(result.value)
            }
            Err(e) => {
                job.record(ProviderAttempt::failure(
                    self.prompt_editor.id(),
                    1,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Structural pass, then prompt-driven refinement.
    ///
    /// Pass 1 falls back to the prompt-driven editor (full instruction)
    /// on transport failure. Pass 2 always runs against pass 1's output
    /// and its failure is absorbed: pass 1 already improved the image.
    async fn double_pass(
        &self,
        input: &ImageAsset,
        instruction: &str,
        job: &mut RestorationJob,
    ) -> OrchestratorResult<ImageAsset> {
        counter!("revive_restorations_total", "strategy" => "double_pass").increment(1);

        let pass_one = match &self.structural_editor {
            Some(structural) => {
                let outcome = attempt_with_fallback(
                    "restore-pass1",
                    // The structural restorer is blind: no instruction.
                    || structural.edit(input, "", None),
                    Some(|| self.prompt_editor.edit(input, instruction, None)),
                )
                .await;

                match outcome {
                    Ok(result) => {
                        if let Some(primary_error) = result.primary_error {
                            job.record(ProviderAttempt::failure(
                                structural.id(),
                                1,
                                primary_error,
                            ));
                            job.record(ProviderAttempt::success(self.prompt_editor.id(), 1));
                        } else {
                            job.record(ProviderAttempt::success(structural.id(), 1));
                        }
                        result.value
                    }
                    Err(e) => {
                        job.record(ProviderAttempt::failure(
                            structural.id(),
                            1,
                            e.to_string(),
                        ));
                        return Err(e);
                    }
                }
            }
            // No structural restorer configured: pass 1 is the prompt
            // editor itself.
            None => {
                let asset = self.prompt_editor.edit(input, instruction, None).await?;
                job.record(ProviderAttempt::success(self.prompt_editor.id(), 1));
                asset
            }
        };

        match self.prompt_editor.edit(&pass_one, instruction, None).await {
            Ok(refined) => {
                job.record(ProviderAttempt::success(self.prompt_editor.id(), 2));
                Ok(refined)
            }
            Err(e) => {
                // Partial success: deliver pass 1's output as the result.
                warn!(error = %e, "Refinement pass failed, returning pass-1 output");
                counter!("revive_restoration_partial_total").increment(1);
                job.record(ProviderAttempt::failure(
                    self.prompt_editor.id(),
                    2,
                    e.to_string(),
                ));
                Ok(pass_one)
            }
        }
    }

    /// Build the eye-color variant of a restoration instruction.
    ///
    /// Swaps only the iris guidance; everything else in the base
    /// instruction is preserved.
    pub fn eye_color_instruction(base_instruction: &str, color: &str) -> String {
        format!(
            "{} Change the iris color of every subject to {}. Alter nothing else: \
             keep the face, skin, hair, clothing and background exactly as they are.",
            base_instruction.trim_end(),
            color
        )
    }

    /// Generate (or fetch) an eye-color variant of a restored image.
    ///
    /// Keyed by the restored image's fingerprint, not the original
    /// upload: the edit operates on the already-restored output.
    pub async fn eye_color_variant(
        &self,
        restored: &ImageAsset,
        base_instruction: &str,
        color: &str,
    ) -> OrchestratorResult<ImageAsset> {
        // The edit path accepts caller-supplied images too, so the input
        // stage applies here as well.
        let restored = normalize_image(restored, self.limits)?;
        let fingerprint = restored.fingerprint();
        let instruction = Self::eye_color_instruction(base_instruction, color);

        self.cache
            .get_or_generate(&fingerprint, color, || async {
                info!(color, fingerprint = %fingerprint, "Generating eye-color variant");
                let mut job = RestorationJob::new(
                    fingerprint.clone(),
                    instruction.as_str(),
                    RestorationStrategy::SinglePass,
                );
                let raw = self.single_pass(&restored, &instruction, &mut job).await?;
                Ok(normalize_image(&raw, self.limits)?)
            })
            .await
    }

    /// Clear all cached variants (session reset).
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use revive_providers::adapter::MockImageEditor;
    use revive_providers::ProviderError;

    /// A decodable JPEG so the normalize step succeeds.
    fn real_image(tag: u8) -> ImageAsset {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            32,
            32,
            image::Rgb([tag, tag, tag]),
        ));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        ImageAsset::new(bytes, "image/jpeg")
    }

    fn editor(id: &'static str) -> MockImageEditor {
        let mut mock = MockImageEditor::new();
        mock.expect_id().return_const(id);
        mock
    }

    fn orchestrator(prompt: MockImageEditor) -> RestorationOrchestrator {
        RestorationOrchestrator::new(Arc::new(prompt), Arc::new(ResultCache::default()))
    }

    #[tokio::test]
    async fn test_single_pass_invokes_exactly_once() {
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Ok(real_image(10)));

        let outcome = orchestrator(prompt)
            .restore(&real_image(1), "colorize", RestorationStrategy::SinglePass)
            .await
            .unwrap();
        assert_eq!(outcome.job.attempt_count(), 1);
        assert!(outcome.job.attempts[0].succeeded());
    }

    #[tokio::test]
    async fn test_single_pass_transport_failure_uses_fallback_once() {
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::transport("503")));

        let mut fallback = editor("replicate-edit");
        fallback
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Ok(real_image(20)));

        let orch = orchestrator(prompt).with_fallback_editor(Arc::new(fallback));
        let outcome = orch
            .restore(&real_image(1), "colorize", RestorationStrategy::SinglePass)
            .await
            .unwrap();

        // Total attempts bounded by 2: one primary, one fallback.
        assert_eq!(outcome.job.attempt_count(), 2);
        assert!(!outcome.job.attempts[0].succeeded());
        assert!(outcome.job.attempts[1].succeeded());
        assert_eq!(outcome.job.attempts[1].provider, "replicate-edit");
    }

    #[tokio::test]
    async fn test_single_pass_refusal_skips_fallback() {
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::refusal("content policy")));

        let mut fallback = editor("replicate-edit");
        fallback.expect_edit().times(0);

        let orch = orchestrator(prompt).with_fallback_editor(Arc::new(fallback));
        let err = orch
            .restore(&real_image(1), "colorize", RestorationStrategy::SinglePass)
            .await
            .unwrap_err();
        assert!(err.is_refusal());
    }

    #[tokio::test]
    async fn test_single_pass_both_failing_aggregates_errors() {
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::transport("gemini down")));

        let mut fallback = editor("replicate-edit");
        fallback
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::transport("replicate down")));

        let orch = orchestrator(prompt).with_fallback_editor(Arc::new(fallback));
        let err = orch
            .restore(&real_image(1), "colorize", RestorationStrategy::SinglePass)
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("gemini down"));
        assert!(text.contains("replicate down"));
    }

    #[tokio::test]
    async fn test_double_pass_runs_structural_then_refinement() {
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .withf(|_, instruction, _| instruction == "colorize")
            .returning(|_, _, _| Ok(real_image(30)));

        let mut structural = editor("replicate-restore");
        structural
            .expect_edit()
            .times(1)
            .withf(|_, instruction, _| instruction.is_empty())
            .returning(|_, _, _| Ok(real_image(25)));

        let orch = orchestrator(prompt).with_structural_editor(Arc::new(structural));
        let outcome = orch
            .restore(&real_image(1), "colorize", RestorationStrategy::DoublePass)
            .await
            .unwrap();
        assert_eq!(outcome.job.attempt_count(), 2);
        assert_eq!(outcome.job.attempts[0].provider, "replicate-restore");
        assert_eq!(outcome.job.attempts[1].pass, 2);
    }

    #[tokio::test]
    async fn test_double_pass_structural_failure_substitutes_full_instruction() {
        let mut structural = editor("replicate-restore");
        structural
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::transport("503")));

        // Prompt editor runs twice: the substituted pass 1 (full
        // instruction) and the refinement pass 2.
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(2)
            .withf(|_, instruction, _| instruction == "colorize")
            .returning(|_, _, _| Ok(real_image(40)));

        let orch = orchestrator(prompt).with_structural_editor(Arc::new(structural));
        let outcome = orch
            .restore(&real_image(1), "colorize", RestorationStrategy::DoublePass)
            .await
            .unwrap();
        assert_eq!(outcome.job.attempt_count(), 3);
        assert!(!outcome.job.attempts[0].succeeded());
    }

    #[tokio::test]
    async fn test_double_pass_refinement_failure_returns_pass_one_output() {
        let pass_one_output = real_image(50);
        let expected = pass_one_output.clone();

        let mut structural = editor("replicate-restore");
        structural
            .expect_edit()
            .times(1)
            .returning(move |_, _, _| Ok(pass_one_output.clone()));

        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::refusal("policy")));

        let orch = orchestrator(prompt).with_structural_editor(Arc::new(structural));
        let outcome = orch
            .restore(&real_image(1), "colorize", RestorationStrategy::DoublePass)
            .await
            .unwrap();

        // Delivered bytes decode to the same pixels as pass 1's output.
        let delivered = image::load_from_memory(outcome.asset.bytes()).unwrap();
        let pass_one = image::load_from_memory(expected.bytes()).unwrap();
        assert_eq!(delivered.to_rgb8().get_pixel(0, 0), pass_one.to_rgb8().get_pixel(0, 0));
        assert!(outcome.job.any_success());
    }

    #[tokio::test]
    async fn test_input_is_normalized_before_provider_call() {
        let mut prompt = editor("gemini-edit");
        prompt
            .expect_edit()
            .times(1)
            .withf(|image, _, _| {
                let decoded = match image::load_from_memory(image.bytes()) {
                    Ok(img) => img,
                    Err(_) => return false,
                };
                image.mime_type() == "image/jpeg"
                    && decoded.width() <= 64
                    && decoded.height() <= 64
            })
            .returning(|_, _, _| Ok(real_image(10)));

        // Oversized PNG upload; the provider must see a downscaled JPEG.
        let upload = {
            let img = image::DynamicImage::new_rgb8(256, 128);
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .unwrap();
            ImageAsset::new(bytes, "image/png")
        };

        let orch = orchestrator(prompt).with_limits(NormalizeLimits {
            max_dimension: 64,
            ..Default::default()
        });
        orch.restore(&upload, "colorize", RestorationStrategy::SinglePass)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_output_is_normalized_to_jpeg() {
        let mut prompt = editor("gemini-edit");
        prompt.expect_edit().returning(|_, _, _| {
            let img = image::DynamicImage::new_rgb8(16, 16);
            let mut bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .unwrap();
            Ok(ImageAsset::new(bytes, "image/png"))
        });

        let outcome = orchestrator(prompt)
            .restore(&real_image(1), "colorize", RestorationStrategy::SinglePass)
            .await
            .unwrap();
        assert_eq!(outcome.asset.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_eye_color_variants_are_cached_independently() {
        let mut prompt = editor("gemini-edit");
        // Exactly two generations: blue and green; the repeated blue
        // request is served from cache.
        prompt
            .expect_edit()
            .times(2)
            .returning(|_, _, _| Ok(real_image(60)));

        let orch = orchestrator(prompt);
        let restored = real_image(2);

        let blue = orch
            .eye_color_variant(&restored, "colorize", "blue")
            .await
            .unwrap();
        let _green = orch
            .eye_color_variant(&restored, "colorize", "green")
            .await
            .unwrap();
        let blue_again = orch
            .eye_color_variant(&restored, "colorize", "blue")
            .await
            .unwrap();
        assert_eq!(blue, blue_again);
    }

    #[test]
    fn test_eye_color_instruction_preserves_base() {
        let variant =
            RestorationOrchestrator::eye_color_instruction("Restore and colorize.", "green");
        assert!(variant.starts_with("Restore and colorize."));
        assert!(variant.contains("green"));
    }
}
