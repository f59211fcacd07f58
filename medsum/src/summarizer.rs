use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{LlmConfig, ProcessingConfig};
use crate::error::{MedsumError, Result};
use crate::llm::prompts::{chunk_summary_prompt, DEFAULT_SUMMARY_PROMPT};
use crate::llm::{CompletionOptions, LlmProvider};
use crate::models::SummaryReport;
use crate::processing::chunker::chunk_text;

/// Rough character-per-token factor used to reserve output headroom in
/// the context budget.
const CHARS_PER_TOKEN: usize = 4;

/// Per-call overrides; unset fields use the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub instruction: Option<String>,
    pub max_chunk_chars: Option<usize>,
    pub max_tokens: Option<u32>,
}

/// Drives chunked summarization: split the body, generate one summary
/// per chunk in order, and stitch the results.
///
/// Chunks are processed strictly sequentially. The reference deployment
/// serves one generation at a time and holds the model in memory, so
/// parallel chunk requests would contend rather than speed anything up.
pub struct Summarizer {
    llm: LlmProvider,
    max_chunk_chars: usize,
    max_tokens: u32,
    context_budget_chars: usize,
}

impl Summarizer {
    pub fn new(
        llm: LlmProvider,
        llm_config: Option<&LlmConfig>,
        processing: &ProcessingConfig,
    ) -> Self {
        let (max_tokens, context_budget_chars) = llm_config
            .map(|c| (c.max_tokens, c.context_budget_chars))
            .unwrap_or((512, 32768));

        Self {
            llm,
            max_chunk_chars: processing.max_chunk_chars,
            max_tokens,
            context_budget_chars,
        }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_available()
    }

    /// Summarize `body`, returning the stitched summary plus which
    /// chunks (1-indexed) were omitted. A chunk-level generation failure
    /// is recorded and skipped; cancellation stops before the next
    /// unstarted chunk and keeps everything already generated.
    pub async fn summarize(
        &self,
        body: &str,
        options: &SummaryOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<SummaryReport> {
        if !self.llm.is_available() {
            return Err(MedsumError::LlmUnavailable(
                "No text-generation backend configured".to_string(),
            ));
        }

        let instruction = options
            .instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUMMARY_PROMPT);
        let max_chunk_chars = options.max_chunk_chars.unwrap_or(self.max_chunk_chars);
        let max_tokens = options.max_tokens.unwrap_or(self.max_tokens);

        self.check_context_budget(instruction, max_chunk_chars, max_tokens)?;

        let chunks = chunk_text(body, max_chunk_chars);
        let total = chunks.len();

        if total == 0 {
            return Ok(SummaryReport {
                summary: String::new(),
                chunk_count: 0,
                partial: false,
                omitted_chunks: Vec::new(),
                cancelled: false,
            });
        }

        let completion_options = CompletionOptions {
            max_tokens: Some(max_tokens),
            ..Default::default()
        };

        let instruction_chars = instruction.chars().count();
        let output_headroom = max_tokens as usize * CHARS_PER_TOKEN;

        let mut summaries: Vec<String> = Vec::with_capacity(total);
        let mut omitted_chunks: Vec<usize> = Vec::new();
        let mut cancelled = false;

        for (i, chunk) in chunks.iter().enumerate() {
            let part = i + 1;

            if cancel.is_some_and(|token| token.is_cancelled()) {
                info!(part, total, "summarization cancelled, keeping completed chunks");
                cancelled = true;
                omitted_chunks.extend(part..=total);
                break;
            }

            // An oversized atomic unit can exceed the chunk budget. It
            // would blow the context window at the generation boundary,
            // so it is omitted (and recorded) instead of truncated.
            let chunk_chars = chunk.chars().count();
            if instruction_chars + chunk_chars + output_headroom > self.context_budget_chars {
                warn!(
                    part,
                    chunk_chars,
                    budget = self.context_budget_chars,
                    "chunk exceeds context budget, omitting"
                );
                omitted_chunks.push(part);
                continue;
            }

            let prompt = chunk_summary_prompt(instruction, part, total, chunk);

            match self.llm.complete(&prompt, Some(&completion_options)).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    info!(part, total, summary_chars = text.chars().count(), "chunk summarized");
                    summaries.push(text);
                }
                Err(e) => {
                    warn!(part, total, error = %e, "chunk summarization failed, omitting");
                    omitted_chunks.push(part);
                }
            }
        }

        Ok(SummaryReport {
            summary: summaries.join("\n\n"),
            chunk_count: total,
            partial: !omitted_chunks.is_empty(),
            omitted_chunks,
            cancelled,
        })
    }

    /// Prompt + chunk + expected output must fit the context window.
    /// A configuration that cannot satisfy this is rejected up front
    /// rather than discovered as truncation at the generation boundary.
    fn check_context_budget(
        &self,
        instruction: &str,
        max_chunk_chars: usize,
        max_tokens: u32,
    ) -> Result<()> {
        let instruction_chars = instruction.chars().count();
        let output_headroom = max_tokens as usize * CHARS_PER_TOKEN;
        let required = instruction_chars + max_chunk_chars + output_headroom;

        if required > self.context_budget_chars {
            return Err(MedsumError::ContextBudget(format!(
                "prompt ({instruction_chars}) + chunk ({max_chunk_chars}) + expected output \
                 ({output_headroom}) = {required} chars exceeds the context budget of {} chars; \
                 lower MAX_CHUNK_CHARS or SUMMARY_MAX_TOKENS",
                self.context_budget_chars
            )));
        }

        Ok(())
    }
}
