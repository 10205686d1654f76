//! AI-assisted writing through an OpenAI-compatible chat completions API

use std::fmt;
use std::str::FromStr;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::richtext::MAX_POST_GRAPHEMES;

/// Upper bound for a caller-supplied completion budget
pub const MAX_TOKENS_CAP: u32 = 2048;

/// What the assistant should do with the prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistMode {
    /// Polish wording and grammar
    Improve,
    /// Make it shorter
    Shorten,
    /// Elaborate
    Expand,
    /// Suggest hashtags
    Hashtags,
    /// Draft a reply to the context post
    Reply,
    /// Anything goes
    #[default]
    Freeform,
}

impl AssistMode {
    /// All modes in menu order
    pub const fn all() -> &'static [Self] {
        &[
            Self::Improve,
            Self::Shorten,
            Self::Expand,
            Self::Hashtags,
            Self::Reply,
            Self::Freeform,
        ]
    }

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Improve => "improve",
            Self::Shorten => "shorten",
            Self::Expand => "expand",
            Self::Hashtags => "hashtags",
            Self::Reply => "reply",
            Self::Freeform => "freeform",
        }
    }

    /// Next mode, wrapping around
    pub fn next(self) -> Self {
        let all = Self::all();
        let idx = all.iter().position(|m| *m == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }

    /// System prompt for this mode
    pub fn system_prompt(self) -> String {
        let limit = format!(
            "Keep the result under {MAX_POST_GRAPHEMES} characters. Reply with the post text only, no quotes or commentary."
        );
        let task = match self {
            Self::Improve => "You edit social media posts. Fix grammar and make the wording clearer while keeping the author's voice and meaning.",
            Self::Shorten => "You edit social media posts. Make the post more concise without losing its point.",
            Self::Expand => "You edit social media posts. Develop the idea with one or two more sentences of substance.",
            Self::Hashtags => {
                return "Suggest up to five relevant hashtags for the post. Reply with the hashtags only, separated by spaces.".to_string();
            }
            Self::Reply => "You help write replies on Bluesky. Write a thoughtful, friendly reply to the post given as context, following the author's instructions.",
            Self::Freeform => "You help write posts for Bluesky, a microblogging network.",
        };
        format!("{task} {limit}")
    }
}

impl fmt::Display for AssistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown assist mode: {s}"))
    }
}

/// A generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// The author's text or instruction
    pub prompt: String,
    /// What to do with it
    #[serde(default)]
    pub mode: AssistMode,
    /// Post being replied to, for `reply`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Completion budget override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    /// User message sent alongside the system prompt
    pub fn user_message(&self) -> String {
        match self.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("Post being replied to:\n{context}\n\nInstructions:\n{}", self.prompt.trim()),
            None => self.prompt.trim().to_string(),
        }
    }
}

/// Errors from the LLM provider
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider answered with an error
    #[error("LLM provider returned {status}: {message}")]
    Upstream {
        /// HTTP status
        status: u16,
        /// Error text
        message: String,
    },
    /// Transport failure
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered without any text
    #[error("LLM returned no text")]
    Empty,
}

/// Chat completions client
pub struct LlmClient {
    http: Client,
    base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("base", &self.base)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Client for the configured provider
    pub fn new(config: &LlmConfig, api_key: &str) -> Self {
        Self {
            http: Client::new(),
            base: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Run one completion
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        #[derive(Deserialize)]
        struct Completion {
            #[serde(default)]
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            #[serde(default)]
            content: Option<String>,
        }

        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens).clamp(1, MAX_TOKENS_CAP);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.mode.system_prompt()},
                {"role": "user", "content": request.user_message()},
            ],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
        });

        tracing::debug!(mode = %request.mode, model = %self.model, "llm request");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let completion: Completion = response.json().await?;
        completion
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|text| clean_output(&text))
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::Empty)
    }
}

/// Strip wrapping quotes models like to add
fn clean_output(text: &str) -> String {
    let trimmed = text.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
