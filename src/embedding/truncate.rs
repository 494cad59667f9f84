//! Token truncation using tiktoken

use std::borrow::Cow;

use tiktoken_rs::cl100k_base;
use tracing::warn;

/// Token limits for backend models; `None` means no client-side truncation
pub fn get_token_limit(model_name: &str) -> Option<usize> {
    let base_name = model_name
        .rsplit('/')
        .next()
        .unwrap_or(model_name)
        .split(':')
        .next()
        .unwrap_or(model_name);

    match base_name {
        "text-embedding-3-small" | "text-embedding-3-large" | "text-embedding-ada-002" => Some(8191),
        "text-embedding-004" | "embedding-001" => Some(2048),
        "gemini-embedding-001" => Some(2048),
        "nomic-embed-text" => Some(2048),
        "jina-embeddings-v3" | "bge-m3" => Some(8192),
        "mxbai-embed-large" | "all-minilm" | "UAE-Large-V1" => Some(512),
        _ => None,
    }
}

/// Truncate texts to fit within a token limit
///
/// Token counts come from cl100k, which only approximates the backend's own
/// tokenizer; it keeps oversized benchmark documents from failing whole batches.
pub fn truncate_to_token_limit(texts: &[String], token_limit: usize) -> anyhow::Result<Vec<Cow<'_, str>>> {
    let bpe = cl100k_base()?;

    let mut truncated = Vec::with_capacity(texts.len());
    let mut truncation_count = 0;

    for text in texts {
        // Cheap bound: a token is never shorter than one byte
        if text.len() <= token_limit {
            truncated.push(Cow::Borrowed(text.as_str()));
            continue;
        }

        let tokens = bpe.encode_with_special_tokens(text);
        if tokens.len() <= token_limit {
            truncated.push(Cow::Borrowed(text.as_str()));
            continue;
        }

        let kept: Vec<_> = tokens.into_iter().take(token_limit).collect();
        let text = match bpe.decode(kept) {
            Ok(decoded) => decoded,
            Err(_) => text.chars().take(token_limit * 4).collect(),
        };
        truncated.push(Cow::Owned(text));
        truncation_count += 1;
    }

    if truncation_count > 0 {
        warn!(
            "{}/{} texts truncated to {} tokens",
            truncation_count,
            texts.len(),
            token_limit
        );
    }

    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_limit_lookup() {
        assert_eq!(get_token_limit("text-embedding-3-small"), Some(8191));
        assert_eq!(get_token_limit("nomic-embed-text:latest"), Some(2048));
        assert_eq!(get_token_limit("jinaai/jina-embeddings-v3"), Some(8192));
        assert_eq!(get_token_limit("unknown-model"), None);
    }

    #[test]
    fn test_short_text_untouched() {
        let texts = vec!["Hello world".to_string()];
        let result = truncate_to_token_limit(&texts, 100).unwrap();
        assert!(matches!(result[0], Cow::Borrowed("Hello world")));
    }

    #[test]
    fn test_long_text_truncated() {
        let texts = vec!["word ".repeat(500)];
        let result = truncate_to_token_limit(&texts, 10).unwrap();
        assert!(result[0].len() < texts[0].len());
    }
}
