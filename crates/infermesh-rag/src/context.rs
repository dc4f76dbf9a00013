//! Context-augmented prompting.

use crate::error::{RagError, Result};
use crate::host_api::HostApiClient;
use crate::vectors::{VectorAttachment, DEFAULT_THRESHOLD, MAX_K};
use infermesh_session::StreamItem;
use tokio::sync::mpsc;
use tracing::debug;

/// Embed the question on the host, search the session's vectors, and
/// send the augmented prompt through the normal prompt path. Returns
/// the message index and the token stream for the turn.
pub async fn ask_with_context(
    attachment: &VectorAttachment,
    host_api: &HostApiClient,
    question: &str,
    top_k: u32,
) -> Result<(u64, mpsc::Receiver<StreamItem>)> {
    if question.trim().is_empty() {
        return Err(RagError::Validation("question must not be empty".into()));
    }
    if top_k == 0 || top_k > MAX_K {
        return Err(RagError::Validation(format!("topK must be in 1..={MAX_K}, got {top_k}")));
    }

    let embeddings = host_api.embed(&[question.to_string()]).await?;
    let query = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| RagError::Http("embed returned no vectors".into()))?;

    let results = attachment.search(query, top_k, DEFAULT_THRESHOLD).await?;
    debug!("ask_with_context: {} documents above threshold", results.len());

    let prompt = compose_prompt(
        question,
        results
            .iter()
            .filter_map(|r| r.metadata.get("text").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .as_slice(),
    );
    Ok(attachment.session().prompt(prompt).await?)
}

/// `"Context:\n[Document i] {text}\n\nQuestion: {q}"`; a bare question
/// when nothing was retrieved.
pub(crate) fn compose_prompt(question: &str, documents: &[&str]) -> String {
    if documents.is_empty() {
        return question.to_string();
    }
    let mut prompt = String::from("Context:\n");
    for (i, doc) in documents.iter().enumerate() {
        prompt.push_str(&format!("[Document {}] {doc}\n", i + 1));
    }
    prompt.push_str(&format!("\nQuestion: {question}"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_with_documents() {
        let prompt = compose_prompt("What is escrow?", &["Escrow holds funds.", "Fees are 10%."]);
        assert!(prompt.starts_with("Context:\n[Document 1] Escrow holds funds.\n"));
        assert!(prompt.contains("[Document 2] Fees are 10%.\n"));
        assert!(prompt.ends_with("\nQuestion: What is escrow?"));
    }

    #[test]
    fn test_compose_without_documents_is_bare() {
        assert_eq!(compose_prompt("Hi?", &[]), "Hi?");
    }
}
