use super::settings::{GenerationBackendKind, Settings};
use crate::core::errors::RagError;
use crate::rag::store::Distance;

pub const MAX_TOP_K: usize = 50;

pub fn validate_settings(settings: &Settings) -> Result<(), RagError> {
    let chunking = &settings.chunking;
    validate_usize_field("chunking.chunk_size", chunking.chunk_size, 1, 1_000_000)?;
    if chunking.chunk_overlap >= chunking.chunk_size {
        return Err(RagError::Config(format!(
            "Invalid config at 'chunking.chunk_overlap': {} must be smaller than chunk_size {}",
            chunking.chunk_overlap, chunking.chunk_size
        )));
    }
    if chunking.separators.is_empty() {
        return Err(RagError::Config(
            "Invalid config at 'chunking.separators': at least one separator is required"
                .to_string(),
        ));
    }

    validate_usize_field(
        "documents.parallel_files",
        settings.documents.parallel_files,
        1,
        64,
    )?;

    let embedding = &settings.embedding;
    validate_usize_field("embedding.dimension", embedding.dimension, 1, 65_536)?;
    validate_usize_field("embedding.batch_size", embedding.batch_size, 1, 4_096)?;
    validate_non_empty("embedding.model", &embedding.model)?;

    validate_non_empty("index.collection_name", &settings.index.collection_name)?;
    if settings
        .index
        .collection_name
        .contains(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
    {
        return Err(RagError::Config(format!(
            "Invalid config at 'index.collection_name': '{}' may only contain letters, digits, '_' and '-'",
            settings.index.collection_name
        )));
    }
    settings.index.distance.parse::<Distance>()?;

    validate_usize_field("retrieval.top_k", settings.retrieval.top_k, 1, MAX_TOP_K)?;
    if let Some(min_score) = settings.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min_score) {
            return Err(RagError::Config(format!(
                "Invalid config at 'retrieval.min_score': {} must be between -1 and 1",
                min_score
            )));
        }
    }

    let generation = &settings.generation;
    if generation.timeout_secs == 0 {
        return Err(RagError::Config(
            "Invalid config at 'generation.timeout_secs': must be at least 1".to_string(),
        ));
    }
    match generation.backend {
        GenerationBackendKind::Ollama => {
            validate_non_empty("generation.ollama_base_url", &generation.ollama_base_url)?;
            validate_non_empty("generation.ollama_model", &generation.ollama_model)?;
        }
        GenerationBackendKind::Openai => {
            let has_key = generation
                .openai_api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty());
            if !has_key {
                return Err(RagError::Config(
                    "Invalid config at 'generation.openai_api_key': required when backend is 'openai'"
                        .to_string(),
                ));
            }
            validate_non_empty("generation.openai_model", &generation.openai_model)?;
        }
        GenerationBackendKind::None => {}
    }

    Ok(())
}

fn validate_usize_field(path: &str, value: usize, min: usize, max: usize) -> Result<(), RagError> {
    if value < min || value > max {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_non_empty(path: &str, value: &str) -> Result<(), RagError> {
    if value.trim().is_empty() {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}
