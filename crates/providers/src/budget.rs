//! Token budget enforcement.
//!
//! Runs once per request, before the first dispatch attempt. The policy
//! is deliberately explicit and deterministic:
//!
//! - Tokens are estimated at 1 token ≈ 4 bytes of UTF-8, rounded up.
//!   This approximation is accurate within ~10% for BPE tokenizers on
//!   English text.
//! - Each level of `context_depth` reserves 256 tokens out of
//!   `max_tokens`; the remaining prompt budget never drops below a
//!   256-token floor.
//! - A prompt at or under budget is returned unchanged. An over-budget
//!   prompt is cut to a trailing window of `budget * 4` bytes, snapped
//!   forward to the next char boundary so the cut never splits a code
//!   point.

/// Tokens reserved per level of context depth.
const RESERVE_PER_DEPTH: u64 = 256;

/// The prompt budget never shrinks below this many tokens.
const MIN_WINDOW_TOKENS: u64 = 256;

/// Bytes assumed per token.
const BYTES_PER_TOKEN: usize = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + BYTES_PER_TOKEN - 1) / BYTES_PER_TOKEN
}

/// The prompt token budget for a given context depth.
pub fn prompt_budget(context_depth: u32, max_tokens: u32) -> usize {
    let reserve = u64::from(context_depth) * RESERVE_PER_DEPTH;
    u64::from(max_tokens)
        .saturating_sub(reserve)
        .max(MIN_WINDOW_TOKENS) as usize
}

/// Fit a prompt into the configured budget.
///
/// Returns the input untouched when it already fits, otherwise the
/// trailing window that does. The result is always a suffix of the
/// input, so identical inputs produce identical outputs.
pub fn ensure_within_budget(prompt: &str, context_depth: u32, max_tokens: u32) -> &str {
    let budget = prompt_budget(context_depth, max_tokens);
    if estimate_tokens(prompt) <= budget {
        return prompt;
    }

    let window_bytes = budget * BYTES_PER_TOKEN;
    let mut start = prompt.len().saturating_sub(window_bytes);
    while !prompt.is_char_boundary(start) {
        start += 1;
    }
    &prompt[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_bytes_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_bytes_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn budget_shrinks_with_depth() {
        assert_eq!(prompt_budget(0, 4000), 4000);
        assert_eq!(prompt_budget(2, 4000), 3488);
    }

    #[test]
    fn budget_never_drops_below_floor() {
        assert_eq!(prompt_budget(100, 4000), 256);
        assert_eq!(prompt_budget(0, 10), 256);
    }

    #[test]
    fn under_budget_prompt_is_unchanged() {
        let prompt = "short prompt";
        assert_eq!(ensure_within_budget(prompt, 0, 4000), prompt);
    }

    #[test]
    fn over_budget_prompt_keeps_trailing_window() {
        let prompt = "a".repeat(5000);
        let adjusted = ensure_within_budget(&prompt, 0, 1000);
        assert_eq!(adjusted.len(), 4000);
        assert!(prompt.ends_with(adjusted));
    }

    #[test]
    fn adjusted_prompt_respects_budget() {
        let prompt = "x".repeat(100_000);
        for depth in [0, 1, 5, 50] {
            let adjusted = ensure_within_budget(&prompt, depth, 4000);
            assert!(estimate_tokens(adjusted) <= prompt_budget(depth, 4000));
        }
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let prompt = "word ".repeat(3000);
        let a = ensure_within_budget(&prompt, 3, 2000);
        let b = ensure_within_budget(&prompt, 3, 2000);
        assert_eq!(a, b);
    }

    #[test]
    fn cut_never_splits_a_code_point() {
        // multi-byte chars force the cut point off a byte boundary
        let prompt = "é".repeat(3000); // 2 bytes each
        let adjusted = ensure_within_budget(&prompt, 0, 1000);
        assert!(adjusted.len() <= 4000);
        assert!(adjusted.chars().all(|c| c == 'é'));
    }

    #[test]
    fn result_is_always_a_suffix() {
        let prompt = format!("{}{}", "header ", "body ".repeat(2000));
        let adjusted = ensure_within_budget(&prompt, 1, 1000);
        assert!(prompt.ends_with(adjusted));
    }
}
