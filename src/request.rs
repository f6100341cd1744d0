//! Generation requests as submitted by callers.
//!
//! A [`GenerationRequest`] is immutable once submitted. Its kind is derived
//! from the [`Payload`] variant, so a request can never claim to be one kind
//! while carrying another kind's parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GenrelayError, Result};

/// The three families of content a provider can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Text,
    Video,
    Audio,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 3] = [Self::Text, Self::Video, Self::Audio];
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationKind::Text => write!(f, "text"),
            GenerationKind::Video => write!(f, "video"),
            GenerationKind::Audio => write!(f, "audio"),
        }
    }
}

/// Rewriting style applied to a text optimization request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeMode {
    #[default]
    Creative,
    Professional,
    Concise,
    Seo,
    Social,
}

impl OptimizeMode {
    /// Instruction block sent ahead of the original text.
    pub fn instructions(&self) -> &'static str {
        match self {
            OptimizeMode::Creative => {
                "Rewrite the text below to be more vivid and engaging for content creation. \
                 Keep the original meaning, use livelier wording, keep it suitable for social \
                 media and close to the original length."
            }
            OptimizeMode::Professional => {
                "Rewrite the text below to be precise and professional. Use accurate domain \
                 terminology, keep a clear logical structure and a neutral, objective tone."
            }
            OptimizeMode::Concise => {
                "Condense the text below. Remove redundancy, keep the core message, use plain \
                 language and stay within 70% of the original length."
            }
            OptimizeMode::Seo => {
                "Optimize the text below for search engines. Work in relevant keywords \
                 naturally, improve title and description, avoid keyword stuffing."
            }
            OptimizeMode::Social => {
                "Adapt the text below for social media. Make it lively and shareable, add \
                 interaction hooks and topic hashtags."
            }
        }
    }

    /// Builds the full user prompt for `text`.
    ///
    /// A custom prompt replaces the mode template; `{original_text}` inside it
    /// is substituted, otherwise the text is appended.
    pub fn render(&self, text: &str, custom_prompt: Option<&str>) -> String {
        match custom_prompt {
            Some(custom) if custom.contains("{original_text}") => {
                custom.replace("{original_text}", text)
            }
            Some(custom) => format!("{custom}\n\nOriginal text:\n{text}"),
            None => format!(
                "{}\n\nOriginal text:\n{text}\n\nOptimized text:",
                self.instructions()
            ),
        }
    }
}

impl FromStr for OptimizeMode {
    type Err = GenrelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "creative" => Ok(OptimizeMode::Creative),
            "professional" => Ok(OptimizeMode::Professional),
            "concise" => Ok(OptimizeMode::Concise),
            "seo" => Ok(OptimizeMode::Seo),
            "social" => Ok(OptimizeMode::Social),
            other => Err(GenrelayError::InvalidRequest(format!(
                "unsupported optimization mode: {other}"
            ))),
        }
    }
}

/// Rendering quality requested for a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Standard,
    #[default]
    High,
    Ultra,
}

/// Kind-specific request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Text {
        text: String,
        #[serde(default)]
        mode: OptimizeMode,
        #[serde(default)]
        custom_prompt: Option<String>,
    },
    Video {
        prompt: String,
        duration_secs: u32,
        width: u32,
        height: u32,
        fps: u32,
        #[serde(default)]
        quality: Quality,
        #[serde(default)]
        seed: Option<i64>,
    },
    Audio {
        text: String,
        #[serde(default)]
        voice: Option<String>,
        speed: f32,
        format: String,
        language: String,
    },
}

/// A caller's request for generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub payload: Payload,
    /// Preferred provider id; moved to the front of its kind's fallback chain.
    #[serde(default)]
    pub provider_hint: Option<String>,
}

const MAX_PROMPT_CHARS: usize = 1000;

impl GenerationRequest {
    pub fn text(text: impl Into<String>, mode: OptimizeMode) -> Self {
        Self {
            payload: Payload::Text {
                text: text.into(),
                mode,
                custom_prompt: None,
            },
            provider_hint: None,
        }
    }

    /// Video request with the platform defaults: 5s, 1024x576 at 30fps.
    pub fn video(prompt: impl Into<String>) -> Self {
        Self {
            payload: Payload::Video {
                prompt: prompt.into(),
                duration_secs: 5,
                width: 1024,
                height: 576,
                fps: 30,
                quality: Quality::High,
                seed: None,
            },
            provider_hint: None,
        }
    }

    /// Speech synthesis request: mp3, zh-CN, normal speed.
    pub fn audio(text: impl Into<String>) -> Self {
        Self {
            payload: Payload::Audio {
                text: text.into(),
                voice: None,
                speed: 1.0,
                format: "mp3".into(),
                language: "zh-CN".into(),
            },
            provider_hint: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_hint = Some(provider.into());
        self
    }

    pub fn kind(&self) -> GenerationKind {
        match self.payload {
            Payload::Text { .. } => GenerationKind::Text,
            Payload::Video { .. } => GenerationKind::Video,
            Payload::Audio { .. } => GenerationKind::Audio,
        }
    }

    /// Rejects requests no provider could serve.
    pub fn validate(&self) -> Result<()> {
        match &self.payload {
            Payload::Text { text, .. } => {
                if text.trim().is_empty() {
                    return Err(invalid("text must not be empty"));
                }
            }
            Payload::Video {
                prompt,
                duration_secs,
                width,
                height,
                fps,
                ..
            } => {
                if prompt.trim().is_empty() {
                    return Err(invalid("prompt must not be empty"));
                }
                if prompt.chars().count() > MAX_PROMPT_CHARS {
                    return Err(invalid("prompt must be at most 1000 characters"));
                }
                if !(1..=30).contains(duration_secs) {
                    return Err(invalid("duration must be between 1 and 30 seconds"));
                }
                if !(8..=60).contains(fps) {
                    return Err(invalid("fps must be between 8 and 60"));
                }
                if !(256..=2048).contains(width) || !(256..=2048).contains(height) {
                    return Err(invalid("resolution must be between 256 and 2048 pixels"));
                }
            }
            Payload::Audio { text, speed, .. } => {
                if text.trim().is_empty() {
                    return Err(invalid("text must not be empty"));
                }
                if !(0.5..=2.0).contains(speed) {
                    return Err(invalid("speed must be between 0.5 and 2.0"));
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> GenrelayError {
    GenrelayError::InvalidRequest(msg.to_string())
}
