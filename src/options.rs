/// Knobs for one translation run. Every field has an explicit default;
/// callers override any subset (the config file and CLI both layer on
/// top of `TranslationOptions::default()`).
#[derive(Clone, Debug)]
pub struct TranslationOptions {
    /// Model name sent to the provider.
    pub model: String,
    /// API key. Resolved by the caller (flag, env, config); the engine
    /// never looks at the environment itself.
    pub api_key: String,
    /// OpenAI-compatible endpoint base, without the trailing
    /// `/chat/completions`.
    pub base_url: String,

    /// Model context window in tokens. The API does not expose this
    /// reliably, so it is maintained here.
    pub context_limit: usize,
    /// Fraction of the context window the request payload may occupy.
    pub input_budget_ratio: f64,
    /// Fixed headroom for message framing and token-count drift.
    pub overhead_tokens: usize,
    /// Upper bound on keys per chunk regardless of token budget.
    pub max_chunk_items: usize,

    /// Per-request timeout in seconds. A timeout counts as transient.
    pub timeout_secs: u64,
    /// Retries per chunk after the first attempt, before the chunk is
    /// handed to the split controller.
    pub retries: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Backoff sleep is `backoff_base^attempt` seconds plus up to
    /// `backoff_jitter` seconds of jitter. A non-positive base disables
    /// sleeping.
    pub backoff_base: f64,
    pub backoff_jitter: f64,

    /// Strict: reply keys must equal the chunk keys exactly. Non-strict:
    /// extra keys are dropped, missing keys still fail.
    pub strict_key_match: bool,
    /// Ask for schema-guided JSON first, falling back to a free-form
    /// reply when the model rejects it.
    pub prefer_json_schema: bool,
    /// Run the placeholder guard over every translated value.
    pub placeholder_guard: bool,
    /// Diff policy: treat a target value byte-identical to its source as
    /// untranslated. Misfires on strings legitimately equal across
    /// languages (brand names, bare numbers), hence configurable.
    pub retranslate_equal_to_source: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            context_limit: 16_000,
            input_budget_ratio: 0.70,
            overhead_tokens: 64,
            max_chunk_items: 60,
            timeout_secs: 30,
            retries: 2,
            temperature: 0.0,
            top_p: 1.0,
            backoff_base: 1.6,
            backoff_jitter: 0.25,
            strict_key_match: true,
            prefer_json_schema: true,
            placeholder_guard: true,
            retranslate_equal_to_source: true,
        }
    }
}

impl TranslationOptions {
    /// Token budget available to one chunk's serialized payload, after
    /// reserving the system prompt and fixed overhead.
    pub fn chunk_budget(&self, system_prompt_tokens: usize) -> usize {
        let input = (self.context_limit as f64 * self.input_budget_ratio) as usize;
        input
            .saturating_sub(self.overhead_tokens)
            .saturating_sub(system_prompt_tokens)
    }
}
