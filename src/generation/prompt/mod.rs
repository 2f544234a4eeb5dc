//! Prompt templates for answer generation


use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::retrieval::RetrievedChunk;

const QUESTION_PLACEHOLDER: &str = "{question}";
const CONTEXT_PLACEHOLDER: &str = "{context}";

const ENGLISH_TEMPLATE: &str = "<s> [INST] You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise. [/INST] </s>
[INST] Question: {question}
Context: {context}
Answer: [/INST]";

const GERMAN_TEMPLATE: &str = "<s> [INST] Sie sind ein Assistent für die Beantwortung von Fragen. \
Nutzen Sie die folgenden Kontextinformationen, um die Frage zu beantworten. \
Wenn Sie die Antwort nicht kennen, sagen Sie einfach, dass Sie es nicht wissen. \
Verwenden Sie maximal drei Sätze und fassen Sie sich kurz. [/INST] </s>
[INST] Question: {question}
Context: {context}
Answer: [/INST]";

/// Built-in template languages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLocale {
    #[default]
    En,
    De,
}

impl fmt::Display for PromptLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::En => f.write_str("en"),
            Self::De => f.write_str("de"),
        }
    }
}

/// `[prompt]` configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub locale: PromptLocale,
    /// Custom template overriding the locale; must contain `{question}` and `{context}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl PromptConfig {
    #[inline]
    pub fn template(&self) -> Result<PromptTemplate, ConfigError> {
        match &self.template {
            Some(custom) => PromptTemplate::new(custom.clone()),
            None => Ok(PromptTemplate::for_locale(self.locale)),
        }
    }
}

/// A validated template with one `{question}` and one `{context}` slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    #[inline]
    pub fn new(template: String) -> Result<Self, ConfigError> {
        if !template.contains(QUESTION_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(QUESTION_PLACEHOLDER));
        }
        if !template.contains(CONTEXT_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(CONTEXT_PLACEHOLDER));
        }
        Ok(Self { template })
    }

    #[inline]
    pub fn for_locale(locale: PromptLocale) -> Self {
        let template = match locale {
            PromptLocale::En => ENGLISH_TEMPLATE,
            PromptLocale::De => GERMAN_TEMPLATE,
        };
        Self {
            template: template.to_string(),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill both slots in a single pass, so placeholder text appearing in
    /// the question or context is copied through literally.
    #[inline]
    pub fn render(&self, question: &str, context: &str) -> String {
        let mut output = String::with_capacity(self.template.len() + question.len() + context.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            let (before, from_brace) = rest.split_at(start);
            output.push_str(before);

            if let Some(after) = from_brace.strip_prefix(QUESTION_PLACEHOLDER) {
                output.push_str(question);
                rest = after;
            } else if let Some(after) = from_brace.strip_prefix(CONTEXT_PLACEHOLDER) {
                output.push_str(context);
                rest = after;
            } else {
                output.push('{');
                rest = from_brace.split_at(1).1;
            }
        }

        output.push_str(rest);
        output
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_locale(PromptLocale::default())
    }
}

/// Turns a question and its retrieved passages into a model-ready prompt
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    template: PromptTemplate,
}

impl PromptAssembler {
    #[inline]
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    /// Context block: chunk texts in retrieval order separated by a blank
    /// line; empty when nothing was retrieved
    #[inline]
    pub fn build_context(chunks: &[RetrievedChunk]) -> String {
        chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[inline]
    pub fn assemble(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        self.template.render(question, &Self::build_context(chunks))
    }
}
