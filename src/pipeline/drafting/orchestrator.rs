//! Generation orchestrator.
//!
//! Drives one request through
//! `Validating → Prompting → Invoking → Decoding → Extracting → {Applying | Repairing}
//! → Refining → Auditing → Done`, with `Failed(kind)` reachable from any state.
//!
//! Recovery paths:
//! - image-token mismatch on the first call: one retry with the image token
//!   prefixed manually, a second failure is terminal;
//! - no usable JSON in the model output: one repair call, then the all-empty
//!   fallback skeleton, which always renders;
//! - JSON with the wrong shape is never repaired.
//!
//! The inference session guard is dropped before rendering, releasing backend
//! resources on every exit. Every failure writes the error-context artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::apply::apply_edits;
use super::banner::with_banner;
use super::completeness::check_completeness;
use super::extract::{clean_generated_text, extract_json_block};
use super::prompt::{build_prompt, build_repair_prompt, PromptContext, DRAFTING_SYSTEM_PROMPT};
use super::schema::parse_edit_set;
use super::types::{
    DraftRequest, EditSet, EditSetOrigin, FailureKind, GenerationState, TemplateSource,
};
use super::uncertainty::analyze_uncertainty;
use super::validation::{validate_request, Modality, ValidationError};
use super::{DraftingError, EditSetError};
use crate::config::DraftingConfig;
use crate::good_examples::{GoodExample, GoodExampleStore};
use crate::pipeline::audit::audit_report;
use crate::pipeline::diagnostic::{text_sample, write_error_context, ErrorContext};
use crate::pipeline::image_gate::{ImageQualityGate, LuminanceGate};
use crate::pipeline::image_prep::downscale_for_model;
use crate::pipeline::inference::{
    InferenceError, InferenceRequest, InferenceSession, PromptMode, ResourceUsage, SessionGuard,
};
use crate::templates::Template;

/// A rendered report and how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    pub request_id: String,
    pub report: String,
    pub origin: EditSetOrigin,
    /// The edit set after uncertainty scoring, as rendered.
    pub edit_set: EditSet,
    pub trace: Vec<GenerationState>,
}

/// A terminal failure.
#[derive(Debug, Clone, Serialize)]
pub struct DraftFailure {
    pub request_id: String,
    pub kind: FailureKind,
    /// User-facing message.
    pub message: String,
    /// Where the error-context artifact was written, if it could be.
    pub error_context_path: Option<PathBuf>,
    pub trace: Vec<GenerationState>,
}

impl DraftFailure {
    /// Short status line with a pointer to the error-context artifact.
    pub fn status_message(&self) -> String {
        match &self.error_context_path {
            Some(path) => format!("{} (Ver {} para detalles)", self.message, path.display()),
            None => self.message.clone(),
        }
    }
}

/// What one run has seen so far. Survives an early `?` exit so the failure
/// path can report it.
#[derive(Default)]
struct RunState {
    trace: Vec<GenerationState>,
    usage: Option<ResourceUsage>,
    modality: Option<Modality>,
    prompt_len: Option<usize>,
    decoded: Option<String>,
    /// The session guard was taken; dropping it already released resources.
    session_held: bool,
}

impl RunState {
    fn enter(&mut self, state: GenerationState) {
        tracing::debug!(state = ?state, "Generation state");
        self.trace.push(state);
    }

    fn stage(&self) -> Option<GenerationState> {
        self.trace.last().copied()
    }
}

/// Result of the inference phase, produced while the session is held.
struct Inferred {
    decoded: String,
    edits: EditSet,
    origin: EditSetOrigin,
}

pub struct ReportDrafter {
    config: DraftingConfig,
    session: Arc<InferenceSession>,
    gate: Box<dyn ImageQualityGate>,
    examples: GoodExampleStore,
}

impl ReportDrafter {
    pub fn new(config: DraftingConfig, session: Arc<InferenceSession>) -> Self {
        let examples = GoodExampleStore::new(config.good_examples_path());
        Self {
            config,
            session,
            gate: Box::new(LuminanceGate),
            examples,
        }
    }

    pub fn with_gate(mut self, gate: Box<dyn ImageQualityGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_example_store(mut self, store: GoodExampleStore) -> Self {
        self.examples = store;
        self
    }

    pub fn config(&self) -> &DraftingConfig {
        &self.config
    }

    /// Run one request to a report or a terminal failure.
    pub fn generate(&self, request: &DraftRequest) -> Result<DraftOutcome, DraftFailure> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("generate_report", request_id = %request_id);
        let _enter = span.enter();

        tracing::info!(
            modality = %request.modality,
            template = %request.template.display_name(),
            max_new_tokens = request.max_new_tokens,
            "Generation started"
        );

        let mut state = RunState::default();
        match self.run(request, &request_id, &mut state) {
            Ok((report, origin, edit_set)) => {
                state.enter(GenerationState::Done);
                tracing::info!(
                    origin = ?origin,
                    report_len = report.len(),
                    "Generation completed"
                );
                Ok(DraftOutcome {
                    request_id,
                    report,
                    origin,
                    edit_set,
                    trace: state.trace,
                })
            }
            Err(e) => Err(self.fail(request, request_id, e, state)),
        }
    }

    /// Report text on success, status line on failure. Never empty.
    pub fn generate_text(&self, request: &DraftRequest) -> String {
        match self.generate(request) {
            Ok(outcome) => outcome.report,
            Err(failure) => failure.status_message(),
        }
    }

    // ═══════════════════════════════════════════
    // State machine
    // ═══════════════════════════════════════════

    fn run(
        &self,
        request: &DraftRequest,
        request_id: &str,
        state: &mut RunState,
    ) -> Result<(String, EditSetOrigin, EditSet), DraftingError> {
        state.enter(GenerationState::Validating);
        let modality = validate_request(request, &self.config)?;
        state.modality = Some(modality);
        let template = self.load_template(&request.template)?;
        if template.template_text.trim().is_empty() {
            return Err(ValidationError::EmptyTemplate.into());
        }
        let image = request
            .image
            .as_ref()
            .ok_or(ValidationError::MissingImage)?;
        self.gate
            .check(image)
            .map_err(ValidationError::ImageQuality)?;

        state.enter(GenerationState::Prompting);
        let model_image = downscale_for_model(
            &image.bytes,
            self.config.max_image_width,
            self.config.max_image_height,
        );
        let examples = self.examples.load_or_builtin();
        let ctx = PromptContext {
            modality,
            region: &request.region,
            indication: &request.indication,
            extras: &request.extras,
        };
        let prompt = build_prompt(&ctx, &template.template_text, &examples, None);
        state.prompt_len = Some(prompt.len());
        tracing::debug!(
            prompt_len = prompt.len(),
            examples = examples.len(),
            "Prompt built"
        );

        let guard = self.session.acquire(request_id)?;
        state.session_held = true;
        let inferred = self.infer(
            &guard,
            request,
            &model_image,
            &ctx,
            &template,
            &examples,
            &prompt,
            state,
        );
        state.usage = Some(guard.resource_usage());
        drop(guard);
        let Inferred {
            decoded,
            edits,
            origin,
        } = inferred?;

        state.enter(GenerationState::Applying);
        let edits = analyze_uncertainty(&decoded, edits);
        let had_additions = !edits.add_findings.is_empty();
        let report = with_banner(origin, apply_edits(&template.template_text, &edits));

        state.enter(GenerationState::Refining);
        let report = check_completeness(report, &edits);

        state.enter(GenerationState::Auditing);
        let report = audit_report(report, &template.template_text, had_additions);

        Ok((report, origin, edits))
    }

    /// Invoking through Extracting (and Repairing), under the session guard.
    #[allow(clippy::too_many_arguments)]
    fn infer(
        &self,
        guard: &SessionGuard<'_>,
        request: &DraftRequest,
        image: &[u8],
        ctx: &PromptContext<'_>,
        template: &Template,
        examples: &[GoodExample],
        prompt: &str,
        state: &mut RunState,
    ) -> Result<Inferred, DraftingError> {
        let max_time = Duration::from_secs(self.config.max_time_seconds);
        let base = InferenceRequest {
            prompt,
            system: DRAFTING_SYSTEM_PROMPT,
            image: Some(image),
            max_new_tokens: request.max_new_tokens,
            max_time,
            mode: PromptMode::Native,
        };

        state.enter(GenerationState::Invoking);
        let (raw, used_prompt) = match guard.generate(&base) {
            Ok(raw) => (raw, prompt.to_string()),
            Err(InferenceError::ImageTokenMismatch(detail)) => {
                tracing::warn!(
                    detail_len = detail.len(),
                    image_token = %self.config.image_token,
                    "Image token mismatch, retrying with manual image prefix"
                );
                let manual = build_prompt(
                    ctx,
                    &template.template_text,
                    examples,
                    Some(&self.config.image_token),
                );
                state.enter(GenerationState::Invoking);
                let retry = InferenceRequest {
                    prompt: &manual,
                    mode: PromptMode::ManualImagePrefix,
                    ..base.clone()
                };
                let raw = guard.generate(&retry)?;
                (raw, manual)
            }
            Err(e) => return Err(e.into()),
        };

        state.enter(GenerationState::Decoding);
        let decoded = clean_generated_text(&raw, &used_prompt);
        tracing::debug!(raw_len = raw.len(), decoded_len = decoded.len(), "Output decoded");
        state.decoded = Some(decoded.clone());

        state.enter(GenerationState::Extracting);
        let (edits, origin) = match extract_edit_set(&decoded) {
            Ok(edits) => (edits, EditSetOrigin::ModelDirect),
            Err(e @ DraftingError::EditSet(EditSetError::Malformed(_))) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "No usable JSON in model output, attempting repair");
                state.enter(GenerationState::Repairing);
                self.repair(guard, request, &decoded, &template.template_text, max_time)?
            }
        };

        Ok(Inferred {
            decoded,
            edits,
            origin,
        })
    }

    /// One text-only call converting the draft into edit JSON. Anything short
    /// of a usable answer falls back to the skeleton, except a malformed one.
    fn repair(
        &self,
        guard: &SessionGuard<'_>,
        request: &DraftRequest,
        draft: &str,
        template_text: &str,
        max_time: Duration,
    ) -> Result<(EditSet, EditSetOrigin), DraftingError> {
        let repair_prompt = build_repair_prompt(draft, template_text);
        let repair_request = InferenceRequest {
            prompt: &repair_prompt,
            system: DRAFTING_SYSTEM_PROMPT,
            image: None,
            max_new_tokens: request.max_new_tokens,
            max_time,
            mode: PromptMode::Native,
        };

        let attempt = guard
            .generate(&repair_request)
            .map_err(DraftingError::from)
            .and_then(|raw| extract_edit_set(&clean_generated_text(&raw, &repair_prompt)));

        match attempt {
            Ok(edits) => {
                tracing::info!("Edit set recovered by repair pass");
                Ok((edits, EditSetOrigin::Repaired))
            }
            Err(e @ DraftingError::EditSet(EditSetError::Malformed(_))) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Repair failed, using fallback skeleton");
                Ok((EditSet::fallback_skeleton(), EditSetOrigin::FallbackSkeleton))
            }
        }
    }

    // ═══════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════

    /// Relative file names that do not exist as given are looked up in the
    /// templates directory.
    fn load_template(&self, source: &TemplateSource) -> Result<Template, DraftingError> {
        match source {
            TemplateSource::Inline(template) => Ok(template.clone()),
            TemplateSource::File(path) => {
                let resolved = resolve_template_path(path, &self.config.templates_dir());
                Ok(Template::from_json_file(&resolved)?)
            }
        }
    }

    fn fail(
        &self,
        request: &DraftRequest,
        request_id: String,
        error: DraftingError,
        mut state: RunState,
    ) -> DraftFailure {
        let kind = error.kind();
        let stage = state.stage();
        tracing::error!(kind = %kind, stage = ?stage, error = %error, "Generation failed");
        state.enter(GenerationState::Failed(kind));
        if !state.session_held {
            self.session.release();
        }

        let mut ctx = ErrorContext::new(request_id.as_str(), kind, error.to_string());
        if let Some(usage) = state.usage.take() {
            ctx = ctx.with_usage(usage);
        }
        ctx.insert(
            "modality",
            state
                .modality
                .map(|m| m.code().to_string())
                .unwrap_or_else(|| request.modality.clone()),
        );
        ctx.insert("template", request.template.display_name());
        ctx.insert("max_new_tokens", request.max_new_tokens);
        if let Some(stage) = stage {
            ctx.insert("stage", serde_json::to_value(stage).unwrap_or_default());
        }
        if let Some(len) = state.prompt_len {
            ctx.insert("prompt_length", len);
        }
        if let Some(decoded) = &state.decoded {
            ctx.insert("generated_text_sample", text_sample(decoded));
        }

        let error_context_path = write_error_context(&self.config.error_context_path(), &ctx);

        DraftFailure {
            request_id,
            kind,
            message: error.user_message(),
            error_context_path,
            trace: state.trace,
        }
    }
}

fn resolve_template_path(path: &Path, templates_dir: &Path) -> PathBuf {
    if path.is_relative() && !path.exists() {
        templates_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Extracting: locate the JSON object and validate it into an edit set.
fn extract_edit_set(text: &str) -> Result<EditSet, DraftingError> {
    let json = extract_json_block(text)?;
    Ok(parse_edit_set(json)?)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
