// src/topic.rs
//! Topic inputs and audience descriptors.
//!
//! Callers may hand over bare titles or rich objects; both are normalised into
//! [`Topic`] exactly once, at the pipeline boundary.

use serde::{Deserialize, Serialize};

/// Topic as supplied by a caller: a bare title or a title with context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TopicInput {
    TitleOnly(String),
    WithContext(Topic),
}

impl TopicInput {
    pub fn normalize(self) -> Topic {
        match self {
            TopicInput::TitleOnly(title) => Topic::new(title),
            TopicInput::WithContext(topic) => topic,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            TopicInput::TitleOnly(t) => t,
            TopicInput::WithContext(t) => &t.title,
        }
    }
}

impl From<&str> for TopicInput {
    fn from(s: &str) -> Self {
        TopicInput::TitleOnly(s.to_string())
    }
}

impl From<String> for TopicInput {
    fn from(s: String) -> Self {
        TopicInput::TitleOnly(s)
    }
}

impl From<Topic> for TopicInput {
    fn from(t: Topic) -> Self {
        TopicInput::WithContext(t)
    }
}

/// Normalised topic. Never mutated by the pipeline; only filtered and re-tagged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub title: String,
    /// Audience this topic is destined for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_id: Option<String>,
    /// Pre-verified primary source URL; bypasses validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_it_is: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_it_matters: Option<String>,
}

impl Topic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn for_audience(mut self, audience_id: impl Into<String>) -> Self {
        self.audience_id = Some(audience_id.into());
        self
    }

    pub fn with_resource(mut self, url: impl Into<String>) -> Self {
        self.resource = Some(url.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// True when the topic arrives pre-bound to a non-empty resource URL.
    pub fn is_pre_sourced(&self) -> bool {
        self.resource
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }

    /// Best available free-text description (summary, then "what it is").
    pub fn description(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .or(self.what_it_is.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// One target audience and the fetch hints it contributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AudienceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl AudienceConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Normalise a batch of caller inputs, preserving order.
pub fn normalize_topics(inputs: Vec<TopicInput>) -> Vec<Topic> {
    inputs.into_iter().map(TopicInput::normalize).collect()
}
