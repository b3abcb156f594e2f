//! Answer generation: retrieved chunks in, grounded answer with citations out.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::retriever::Retriever;
use super::types::ScoredChunk;
use crate::core::errors::RagError;
use crate::llm::LlmProvider;

/// Fixed answer when retrieval finds nothing.
pub const NOT_FOUND_ANSWER: &str =
    "I could not find any relevant information in the available technical manuals.";

/// Instruction template; `{context}` and `{question}` are substituted.
pub const PROMPT_TEMPLATE: &str = "You are an assistant for biomedical laboratory equipment.
Use ONLY the information in the context below to answer the question.
If the answer is not in the context, say: \"I cannot find this information in the available manuals.\"

Context:
{context}

Question: {question}

Detailed answer:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The backend produced the answer.
    Generated,
    /// Nothing was retrieved; the backend was not called.
    NoContext,
    /// No backend configured; the answer quotes the context.
    RetrievalOnly,
    /// The backend failed or timed out; the answer quotes the context.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub context: String,
    pub retrieved_chunks: Vec<ScoredChunk>,
    pub status: AnswerStatus,
}

#[derive(Clone)]
pub struct AnswerGenerator {
    retriever: Retriever,
    llm: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(
        retriever: Retriever,
        llm: Option<Arc<dyn LlmProvider>>,
        timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            llm,
            timeout,
        }
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.llm.as_ref().map(|llm| llm.name())
    }

    /// Retrieves up to `top_k` chunks and answers from them.
    ///
    /// Backend failures never surface as errors; only retrieval errors
    /// (missing collection, embedding failure) do.
    pub async fn generate(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<GeneratedAnswer, RagError> {
        let retrieved = self.retriever.retrieve(question, top_k).await?;

        if retrieved.is_empty() {
            info!("No context retrieved for question; skipping generation");
            return Ok(GeneratedAnswer {
                answer: NOT_FOUND_ANSWER.to_string(),
                sources: Vec::new(),
                context: String::new(),
                retrieved_chunks: Vec::new(),
                status: AnswerStatus::NoContext,
            });
        }

        let context = build_context(&retrieved);
        let sources = extract_sources(&retrieved);

        let (answer, status) = match &self.llm {
            None => (retrieval_only_answer(&context, sources.len()), AnswerStatus::RetrievalOnly),
            Some(llm) => {
                let prompt = render_prompt(&context, question);
                match tokio::time::timeout(self.timeout, llm.complete(&prompt)).await {
                    Ok(Ok(answer)) => (answer, AnswerStatus::Generated),
                    Ok(Err(err)) => {
                        warn!("Generation with {} failed: {}", llm.name(), err);
                        (failure_answer(&err.to_string(), &context), AnswerStatus::Failed)
                    }
                    Err(_) => {
                        warn!(
                            "Generation with {} timed out after {:?}",
                            llm.name(),
                            self.timeout
                        );
                        let reason = format!("no response within {} s", self.timeout.as_secs());
                        (failure_answer(&reason, &context), AnswerStatus::Failed)
                    }
                }
            }
        };

        Ok(GeneratedAnswer {
            answer,
            sources,
            context,
            retrieved_chunks: retrieved,
            status,
        })
    }
}

/// `[Source: <source> - Page <page>]` blocks separated by a blank line.
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[Source: {} - Page {}]\n{}", c.chunk.source, c.chunk.page, c.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Citations in first-seen rank order, without duplicates.
pub fn extract_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        let citation = chunk.chunk.citation();
        if !sources.contains(&citation) {
            sources.push(citation);
        }
    }
    sources
}

pub fn render_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

fn retrieval_only_answer(context: &str, source_count: usize) -> String {
    format!(
        "**Information found in the technical manuals:**\n\n{}\n\n---\n*{} source(s) consulted*",
        context, source_count
    )
}

fn failure_answer(reason: &str, context: &str) -> String {
    format!(
        "Answer generation failed ({}). Relevant excerpts from the manuals:\n\n{}",
        reason, context
    )
}
