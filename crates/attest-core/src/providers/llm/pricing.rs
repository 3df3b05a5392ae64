//! Published per-model token prices, USD per million tokens.
//!
//! Lookup is by longest matching prefix so dated snapshots
//! (`claude-3-5-haiku-20241022`) resolve to their family row. Unknown models
//! cost zero rather than failing the calling assertion.

const PRICES: &[(&str, f64, f64)] = &[
    // (model prefix, input $/1M, output $/1M)
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("o3-mini", 1.10, 4.40),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("claude-3-5-sonnet", 3.00, 15.00),
    ("claude-3-7-sonnet", 3.00, 15.00),
    ("claude-3-opus", 15.00, 75.00),
    ("gemini-1.5-flash", 0.075, 0.30),
    ("gemini-1.5-pro", 1.25, 5.00),
    ("gemini-2.0-flash", 0.10, 0.40),
    ("text-embedding-3-small", 0.02, 0.0),
    ("text-embedding-3-large", 0.13, 0.0),
];

/// USD cost of a call; zero for locally-served or unknown models.
pub fn cost_for(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let row = PRICES
        .iter()
        .filter(|(prefix, _, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len());
    match row {
        Some((_, input_price, output_price)) => {
            (input_tokens as f64 * input_price + output_tokens as f64 * output_price) / 1_000_000.0
        }
        None => 0.0,
    }
}
