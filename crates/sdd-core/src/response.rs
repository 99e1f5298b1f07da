//! Shared response-shaping utilities used by every tool handler: verbosity
//! levels, token estimation, and the footers appended to read-heavy tool
//! output (navigation hints, budget notices, token counts).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Summary,
    Standard,
    Full,
}

impl DetailLevel {
    /// Parsing is total: any string that isn't a recognized variant falls
    /// back to `Standard` rather than erroring.
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("summary") => DetailLevel::Summary,
            Some("full") => DetailLevel::Full,
            _ => DetailLevel::Standard,
        }
    }
}

impl Default for DetailLevel {
    fn default() -> Self {
        DetailLevel::Standard
    }
}

/// Rough token estimate: ~4 characters per token, with a floor of 1 for any
/// non-empty string so a single-character response never estimates to 0.
pub fn estimate_tokens(s: &str) -> usize {
    if s.is_empty() {
        0
    } else {
        (s.len() / 4).max(1)
    }
}

pub fn token_footer(n: usize) -> String {
    format!("\n\u{1F4CF} ~{} tokens", group_thousands(n))
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn navigation_hint(shown: usize, total: usize, hint: &str) -> String {
    if shown >= total {
        String::new()
    } else {
        format!("\n\u{1F4CA} Showing {shown} of {total}. {hint}")
    }
}

pub fn budget_footer(used: usize, budget: usize, shown: usize, total: usize) -> String {
    format!(
        "\n\u{26A0}\u{FE0F} Response capped at ~{budget} tokens (used ~{used}); showed {shown} of {total} items."
    )
}

pub fn summary_footer() -> &'static str {
    "\n\u{2139}\u{FE0F} Use detail_level=\"full\" for complete output."
}

/// Incrementally accumulates chunks of text, stopping before the first chunk
/// that would push the estimated token count past `max_tokens`. Always
/// terminates with `token_footer`; prepends `budget_footer` only if a chunk
/// was actually dropped.
pub struct BudgetBuilder {
    body: String,
    max_tokens: Option<usize>,
    shown: usize,
    total: usize,
    truncated: bool,
}

impl BudgetBuilder {
    pub fn new(max_tokens: Option<usize>, total: usize) -> Self {
        BudgetBuilder {
            body: String::new(),
            max_tokens,
            shown: 0,
            total,
            truncated: false,
        }
    }

    /// Attempts to append `chunk`. Returns `false` (and records truncation)
    /// if the budget has already been exhausted.
    pub fn push(&mut self, chunk: &str) -> bool {
        if self.truncated {
            return false;
        }
        if let Some(max) = self.max_tokens {
            let projected = estimate_tokens(&self.body) + estimate_tokens(chunk);
            if projected > max {
                self.truncated = true;
                return false;
            }
        }
        self.body.push_str(chunk);
        self.shown += 1;
        true
    }

    pub fn finish(mut self, detail_level: DetailLevel) -> String {
        if self.truncated {
            if let Some(max) = self.max_tokens {
                let used = estimate_tokens(&self.body);
                self.body.push_str(&budget_footer(used, max, self.shown, self.total));
            }
        } else if detail_level == DetailLevel::Summary {
            self.body.push_str(summary_footer());
        }
        let n = estimate_tokens(&self.body);
        self.body.push_str(&token_footer(n));
        self.body
    }
}
