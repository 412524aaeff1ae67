// carecheck/src/generator.rs
//!
//! Report generation: optional summarization pre-pass, one schema-constrained
//! analysis request, and validation of the answer.
//!
//! A run either returns a complete [`ReportData`] or an error; there is no
//! partial result and nothing is retried.

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::Settings;
use crate::model_adapters::{GenerationRequest, ModelAdapter};
use crate::report::{self, ReportData};
use crate::{prompts, Error, UploadedFile};

// Not Gemini's tokenizer; close enough to warn about oversized prompts.
static ESTIMATOR: Lazy<Option<Mutex<CoreBPE>>> = Lazy::new(|| cl100k_base().ok().map(Mutex::new));

pub fn estimate_tokens(text: &str) -> Option<usize> {
    let bpe = ESTIMATOR.as_ref()?.lock().ok()?;
    Some(bpe.encode_with_special_tokens(text).len())
}

/// Progress callback: `(percentage, message)`.
pub type ProgressFn<'a> = dyn FnMut(u8, &str) + 'a;

/// Clamps reported percentages so they never go backwards or past 100.
struct Progress<'a, 'b> {
    last: u8,
    sink: &'a mut ProgressFn<'b>,
}

impl<'a, 'b> Progress<'a, 'b> {
    fn new(sink: &'a mut ProgressFn<'b>) -> Self {
        Self { last: 0, sink }
    }

    fn report(&mut self, percentage: u8, message: &str) {
        self.last = percentage.min(100).max(self.last);
        let last = self.last;
        (self.sink)(last, message);
    }
}

pub struct ReportGenerator {
    adapter: Arc<dyn ModelAdapter>,
    settings: Settings,
}

impl ReportGenerator {
    pub fn new(adapter: Arc<dyn ModelAdapter>, settings: Settings) -> Self {
        Self { adapter, settings }
    }

    pub fn model_name(&self) -> &str {
        self.adapter.model_name()
    }

    /// Runs one analysis over `guidelines` and `evaluations`.
    pub fn generate(
        &self,
        guidelines: &[UploadedFile],
        evaluations: &[UploadedFile],
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<ReportData, Error> {
        let mut progress = Progress::new(on_progress);
        progress.report(5, "분석 준비 중");
        info!(
            guidelines = guidelines.len(),
            evaluations = evaluations.len(),
            model = self.adapter.model_name(),
            "starting report generation"
        );

        let condensed;
        let evaluations = if self.settings.summarization.enabled {
            condensed = self.condense(guidelines, evaluations, &mut progress)?;
            condensed.as_slice()
        } else {
            evaluations
        };

        let prompt = prompts::build_analysis_prompt(guidelines, evaluations);
        match estimate_tokens(&prompt) {
            Some(tokens) => debug!(chars = prompt.chars().count(), tokens, "analysis prompt built"),
            None => debug!(chars = prompt.chars().count(), "analysis prompt built"),
        }

        progress.report(50, "AI 분석 요청 중");
        let request = GenerationRequest::prompt(prompt)
            .with_schema(report::response_schema())
            .with_temperature(self.settings.model.temperature);
        let generation = self.adapter.generate(&request)?;
        debug!(
            prompt_tokens = generation.usage.prompt_tokens,
            completion_tokens = generation.usage.completion_tokens,
            "analysis response received"
        );

        progress.report(85, "응답 해석 중");
        let report = report::parse_report(&generation.response).map_err(|err| {
            warn!(error = %err, "model response failed validation");
            err
        })?;

        progress.report(100, "완료");
        info!(items = report.evaluation_items.len(), "report generated");
        Ok(report)
    }

    /// Replaces each evaluation file's text with the concatenated summaries
    /// of its chunks, in document and chunk order.
    fn condense(
        &self,
        guidelines: &[UploadedFile],
        evaluations: &[UploadedFile],
        progress: &mut Progress<'_, '_>,
    ) -> Result<Vec<UploadedFile>, Error> {
        let summarization = &self.settings.summarization;

        let mut chunked = Vec::with_capacity(evaluations.len());
        for file in evaluations {
            let chunks = chunk_text(&file.content, summarization.chunk_size)
                .map_err(|err| Error::Config(err.to_string()))?;
            chunked.push((file, chunks));
        }
        let total: usize = chunked.iter().map(|(_, chunks)| chunks.len()).sum();
        info!(files = chunked.len(), chunks = total, "summarizing evaluation documents");

        let mut done = 0usize;
        let mut condensed = Vec::with_capacity(chunked.len());
        for (file, chunks) in chunked {
            let mut summaries = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                progress.report(
                    10 + (35 * done / total.max(1)) as u8,
                    &format!("자료 요약 중: {} ({}/{})", file.name, index + 1, chunks.len()),
                );
                let prompt = prompts::build_summary_prompt(
                    &summarization.instruction,
                    guidelines,
                    &file.name,
                    index,
                    chunks.len(),
                    chunk,
                );
                let request = GenerationRequest::prompt(prompt)
                    .with_temperature(self.settings.model.temperature);
                let generation = self.adapter.generate(&request)?;
                summaries.push(generation.response.trim().to_string());
                done += 1;
            }
            condensed.push(UploadedFile::new(file.name.clone(), summaries.join("\n\n")));
        }

        progress.report(45, "자료 요약 완료");
        Ok(condensed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_goes_backwards() {
        let mut seen = Vec::new();
        {
            let mut sink = |pct: u8, _: &str| seen.push(pct);
            let mut progress = Progress::new(&mut sink);
            progress.report(10, "a");
            progress.report(5, "b");
            progress.report(150, "c");
        }
        assert_eq!(seen, vec![10, 10, 100]);
    }

    #[test]
    fn token_estimate_grows_with_text() {
        let long_text = "요양 ".repeat(50);
        if let (Some(short), Some(long)) = (estimate_tokens("요양"), estimate_tokens(&long_text)) {
            assert!(long > short);
        }
    }
}
