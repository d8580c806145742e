use thiserror::Error;

/// Engine-level failure classes. Chunk retry/backoff and the split
/// controller branch on these as plain values; nothing in the engine
/// unwinds across a request boundary.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// A single unit cannot fit a request even alone. Raised by the
    /// planner before any network call is made.
    #[error("unit {key:?} needs ~{estimated} tokens but the chunk budget is {budget}")]
    BudgetExceeded {
        key: String,
        estimated: usize,
        budget: usize,
    },

    /// Reply keys do not satisfy the configured key-match policy.
    #[error("key mismatch: missing={missing:?} extra={extra:?}")]
    KeyMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Structured-output mode was rejected and the plain-JSON fallback
    /// failed as well. A successful fallback never surfaces this.
    #[error("structured output unsupported: {0}")]
    SchemaUnsupported(String),

    /// Timeout, rate limit, 5xx. Retried with backoff, then escalated
    /// to the split controller.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Provider rejected the request outright (auth, bad request).
    /// Not retried.
    #[error("provider error: {0}")]
    Provider(String),

    /// Reply is not a JSON object. Treated like a transient failure.
    #[error("reply parse failed: {0}")]
    Parse(String),
}

impl TranslationError {
    /// Whether another attempt on the same chunk can reasonably change
    /// the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranslationError::KeyMismatch { .. }
                | TranslationError::Transient(_)
                | TranslationError::Parse(_)
        )
    }
}
