//! Context shrinking and structure-aware truncation.
//!
//! [`shrink`] is a line-preserving whitespace normalizer. [`truncate`] cuts
//! an oversized context on line boundaries. It tracks whether the cursor is
//! inside a type block so that a cut prefers to end on a closing line.
//!
//! Block tracking is a heuristic, not a parser. A line that has a type
//! keyword (`class`, `interface`, `enum`, `record`) and a `{` enters a
//! block. The next line with a `}` and no `{` leaves it. Nested method
//! bodies close the tracked block early. That trade-off is accepted.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::core::budgeter::{CHARS_PER_TOKEN, estimate_tokens};

static HSPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C]+").expect("valid regex"));
static OPEN_PAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{ ").expect("valid regex"));
static CLOSE_PAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" \}").expect("valid regex"));
static SEMI_PAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"; ").expect("valid regex"));
static NEWLINE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static BLOCK_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:class|interface|enum|record)\b").expect("valid regex"));

/// Outcome of [`optimize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized
{
    pub text: String,

    /// Estimated tokens of `text`
    pub tokens: usize,

    /// Whether truncation dropped content
    pub truncated: bool,
}

/// Shrink, then truncate to `max_tokens` when still oversized
pub fn optimize(
    context: &str,
    max_tokens: usize,
) -> Optimized
{
    let shrunk = shrink(context);
    let before = estimate_tokens(&shrunk);

    let (text, truncated) = if before > max_tokens
    {
        let cut = truncate(&shrunk, max_tokens);
        debug!(before, after = estimate_tokens(&cut), max_tokens, "context truncated");
        (cut, true)
    }
    else
    {
        (shrunk, false)
    };

    Optimized {
        tokens: estimate_tokens(&text),
        text,
        truncated,
    }
}

/// Whitespace normalization that keeps line structure.
///
/// - Drops blank lines.
/// - Collapses horizontal whitespace runs to a single space.
/// - Strips indentation and trailing spaces.
/// - Removes padding just inside `{`/`}` and after `;`.
///
/// Idempotent: `shrink(shrink(x)) == shrink(x)`.
pub fn shrink(context: &str) -> String
{
    let mut lines: Vec<String> = Vec::new();

    for raw in context.lines()
    {
        let collapsed = HSPACE.replace_all(raw, " ");
        let line = collapsed.trim();
        if line.is_empty()
        {
            continue;
        }

        let line = OPEN_PAD.replace_all(line, "{");
        let line = CLOSE_PAD.replace_all(&line, "}");
        let line = SEMI_PAD.replace_all(&line, ";");
        lines.push(line.into_owned());
    }

    let joined = lines.join("\n");
    NEWLINE_RUN
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Two-state block tracker for truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block
{
    Outside,
    Inside,
}

impl Block
{
    fn next(
        self,
        line: &str,
    ) -> Block
    {
        if opens_block(line)
        {
            Block::Inside
        }
        else if is_bare_close(line)
        {
            Block::Outside
        }
        else
        {
            self
        }
    }
}

fn opens_block(line: &str) -> bool
{
    line.contains('{') && BLOCK_KEYWORD.is_match(line)
}

/// A line with a `}` and no `{`
pub fn is_bare_close(line: &str) -> bool
{
    line.contains('}') && !line.contains('{')
}

/// Cut `context` to at most `max_tokens`, preferring block boundaries.
///
/// Lines accumulate until the next one would overflow. Then:
/// - outside a block, stop;
/// - inside a block with a bare closing next line, take it and stop;
/// - otherwise roll back to the last point the cursor was outside a block,
///   if one exists.
///
/// The closing-line allowance may overshoot the ceiling by that one line.
pub fn truncate(
    context: &str,
    max_tokens: usize,
) -> String
{
    if estimate_tokens(context) <= max_tokens
    {
        return context.to_string();
    }

    let mut out: Vec<&str> = Vec::new();
    // Characters of `out` joined with '\n', so the estimate matches the result
    let mut chars = 0usize;
    let mut block = Block::Outside;
    // Output length at the last line that left the cursor outside a block
    let mut last_outside: Option<usize> = None;

    for line in context.lines()
    {
        let sep = usize::from(!out.is_empty());
        let next = chars + sep + line.chars().count();

        if next / CHARS_PER_TOKEN > max_tokens
        {
            match block
            {
                Block::Outside =>
                {}
                Block::Inside if is_bare_close(line) => out.push(line),
                Block::Inside =>
                {
                    if let Some(keep) = last_outside
                    {
                        out.truncate(keep);
                    }
                }
            }
            break;
        }

        out.push(line);
        chars = next;
        block = block.next(line);
        if block == Block::Outside && is_bare_close(line)
        {
            last_outside = Some(out.len());
        }
    }

    out.join("\n")
        .trim()
        .to_string()
}
