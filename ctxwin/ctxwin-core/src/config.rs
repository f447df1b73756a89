//! Token budget configuration for the context window.
//!
//! All values are heuristics rather than calibrated figures, so every one of
//! them can be overridden in code, from JSON, or from the environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 80_000;
pub const DEFAULT_MAX_IMAGE_TOKENS: usize = 5_000;
pub const DEFAULT_SAFETY_BUFFER: usize = 20_000;
/// 4 characters per token, i.e. 0.25 tokens per character.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;
pub const DEFAULT_FALLBACK_TAIL: usize = 5;

pub const ENV_MAX_CONTEXT_TOKENS: &str = "CTXWIN_MAX_CONTEXT_TOKENS";
pub const ENV_MAX_IMAGE_TOKENS: &str = "CTXWIN_MAX_IMAGE_TOKENS";
pub const ENV_SAFETY_BUFFER: &str = "CTXWIN_SAFETY_BUFFER";
pub const ENV_CHARS_PER_TOKEN: &str = "CTXWIN_CHARS_PER_TOKEN";
pub const ENV_FALLBACK_TAIL: &str = "CTXWIN_FALLBACK_TAIL";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BudgetError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("max_context_tokens must be greater than zero")]
    ZeroCeiling,
    #[error("chars_per_token must be a positive finite number, got {0}")]
    InvalidCharsPerToken(f64),
    #[error("safety_buffer ({safety_buffer}) exceeds max_context_tokens ({max_context_tokens})")]
    BufferExceedsCeiling {
        safety_buffer: usize,
        max_context_tokens: usize,
    },
}

/// Token budget for a single model call.
///
/// # Example
/// ```ignore
/// use ctxwin::ContextBudget;
///
/// let budget = ContextBudget::default()
///     .with_max_context_tokens(128_000)
///     .with_safety_buffer(8_000);
/// budget.validate()?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudget {
    /// Hard ceiling on estimated tokens per call.
    pub max_context_tokens: usize,
    /// Flat estimated cost of one image, whatever its size or detail.
    pub max_image_tokens: usize,
    /// Headroom below the ceiling that trimming aims for, left for the
    /// model's reply and protocol overhead.
    pub safety_buffer: usize,
    /// Characters of text per estimated token.
    pub chars_per_token: f64,
    /// Number of recent non-system messages kept by the emergency fallback.
    pub fallback_tail: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_image_tokens: DEFAULT_MAX_IMAGE_TOKENS,
            safety_buffer: DEFAULT_SAFETY_BUFFER,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            fallback_tail: DEFAULT_FALLBACK_TAIL,
        }
    }
}

impl ContextBudget {
    pub fn new(max_context_tokens: usize) -> Self {
        Self {
            max_context_tokens,
            ..Self::default()
        }
    }

    /// Read the budget from `CTXWIN_*` environment variables. Unset
    /// variables keep their default.
    pub fn from_env() -> Result<Self, BudgetError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a budget from any key lookup, e.g. a parsed `.env` file.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BudgetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let budget = Self {
            max_context_tokens: parse_var(&lookup, ENV_MAX_CONTEXT_TOKENS)?
                .unwrap_or(defaults.max_context_tokens),
            max_image_tokens: parse_var(&lookup, ENV_MAX_IMAGE_TOKENS)?
                .unwrap_or(defaults.max_image_tokens),
            safety_buffer: parse_var(&lookup, ENV_SAFETY_BUFFER)?
                .unwrap_or(defaults.safety_buffer),
            chars_per_token: parse_var(&lookup, ENV_CHARS_PER_TOKEN)?
                .unwrap_or(defaults.chars_per_token),
            fallback_tail: parse_var(&lookup, ENV_FALLBACK_TAIL)?
                .unwrap_or(defaults.fallback_tail),
        };
        budget.validate()?;
        Ok(budget)
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_max_image_tokens(mut self, tokens: usize) -> Self {
        self.max_image_tokens = tokens;
        self
    }

    pub fn with_safety_buffer(mut self, tokens: usize) -> Self {
        self.safety_buffer = tokens;
        self
    }

    pub fn with_chars_per_token(mut self, chars: f64) -> Self {
        self.chars_per_token = chars;
        self
    }

    pub fn with_fallback_tail(mut self, count: usize) -> Self {
        self.fallback_tail = count;
        self
    }

    /// Working budget for trimming: the ceiling minus the safety buffer.
    pub fn allowed_tokens(&self) -> usize {
        self.max_context_tokens.saturating_sub(self.safety_buffer)
    }

    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.max_context_tokens == 0 {
            return Err(BudgetError::ZeroCeiling);
        }
        if !(self.chars_per_token.is_finite() && self.chars_per_token > 0.0) {
            return Err(BudgetError::InvalidCharsPerToken(self.chars_per_token));
        }
        if self.safety_buffer > self.max_context_tokens {
            return Err(BudgetError::BufferExceedsCeiling {
                safety_buffer: self.safety_buffer,
                max_context_tokens: self.max_context_tokens,
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, BudgetError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BudgetError::InvalidValue { key, value: raw }),
    }
}
