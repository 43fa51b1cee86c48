//! Question-answering prompt template.
//!
//! Retrieved passages are "stuffed" into a single `{context}` block,
//! separated by blank lines, and the raw user question fills `{question}`.

use anyhow::{bail, Result};

use crate::models::ScoredDocument;

/// Placeholder for the joined retrieved passages.
pub const CONTEXT_VAR: &str = "{context}";
/// Placeholder for the user's question.
pub const QUESTION_VAR: &str = "{question}";

/// Default prompt: answer from context only, admit ignorance otherwise.
pub const DEFAULT_QA_TEMPLATE: &str = "\
Use the pieces of information provided in the context to answer user's question.
If you don't know the answer, just say that you don't know.
Don't provide anything out of the given context.

Context: {context}
Question: {question}

Start the answer directly. No small talk please.
";

/// Separator placed between retrieved passages.
const DOCUMENT_SEPARATOR: &str = "\n\n";

/// A prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Create a template, checking that both placeholders are present.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for var in [CONTEXT_VAR, QUESTION_VAR] {
            if !template.contains(var) {
                bail!("prompt template is missing the {} placeholder", var);
            }
        }
        Ok(Self { template })
    }

    /// Fill both placeholders in a single left-to-right pass.
    ///
    /// Placeholder-like text inside `context` or `question` is copied
    /// verbatim and never substituted.
    pub fn format(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_VAR) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_VAR) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_QA_TEMPLATE.to_string(),
        }
    }
}

/// Join retrieved passages into one context block, in rank order.
pub fn stuff_documents(docs: &[ScoredDocument]) -> String {
    docs.iter()
        .map(|d| d.document.content.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}
