//! Method slicing out of rendered class text.
//!
//! Finds a method declaration by name and returns its text. The slice
//! starts at the comment/annotation lines right above the declaration and
//! ends at the matching closing brace (or `;` for bodiless declarations).
//! Braces inside literals and comments do not count.

use regex::Regex;

/// Leading words that make a `name(` line a statement, not a declaration
const STATEMENT_WORDS: &[&str] = &["return", "new", "throw", "else", "case", "yield", "await"];

/// Slice the first declaration of `method` out of `source`
pub fn extract_method(
    source: &str,
    method: &str,
) -> Option<String>
{
    let decl = find_declaration(source, method)?;
    let start = comment_start(source, decl.line_start);
    let end = body_end(source, decl.after_paren);

    Some(source[start..end].to_string())
}

struct Declaration
{
    /// Byte offset of the start of the declaring line
    line_start: usize,

    /// Byte offset just past the opening parenthesis
    after_paren: usize,
}

fn find_declaration(
    source: &str,
    method: &str,
) -> Option<Declaration>
{
    // One or more type/modifier words, then the name, then `(`
    let pattern = format!(
        r"(?m)^[ \t]*((?:[\w$<>\[\],.?@]+[ \t]+)+){}[ \t]*\(",
        regex::escape(method)
    );
    let re = Regex::new(&pattern).ok()?;

    re.captures_iter(source)
        .find(|caps| {
            let first_word = caps
                .get(1)
                .and_then(|m| {
                    m.as_str()
                        .split_whitespace()
                        .next()
                })
                .unwrap_or("");
            !STATEMENT_WORDS.contains(&first_word)
        })
        .and_then(|caps| {
            let whole = caps.get(0)?;
            Some(Declaration {
                line_start: whole.start(),
                after_paren: whole.end(),
            })
        })
}

/// Walk upward over directly attached comment and annotation lines
fn comment_start(
    source: &str,
    line_start: usize,
) -> usize
{
    let mut start = line_start;

    while start > 0
    {
        // `start - 1` is the newline terminating the previous line
        let prev_end = start - 1;
        let prev_start = source[..prev_end]
            .rfind('\n')
            .map_or(0, |i| i + 1);
        let prev = source[prev_start..prev_end].trim();

        let attached = prev.starts_with("//")
            || prev.starts_with("/*")
            || prev.starts_with('*')
            || prev.starts_with('@');
        if !attached
        {
            break;
        }
        start = prev_start;
    }

    start
}

/// Lexer state while scanning for the end of a body
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan
{
    Code,
    Str,
    Char,
    LineComment,
    BlockComment,
}

fn body_end(
    source: &str,
    from: usize,
) -> usize
{
    let bytes = source.as_bytes();
    let mut state = Scan::Code;
    let mut depth = 0usize;
    let mut i = from;

    while i < bytes.len()
    {
        let b = bytes[i];
        let next = bytes
            .get(i + 1)
            .copied();

        match state
        {
            Scan::Code => match b
            {
                b'"' => state = Scan::Str,
                b'\'' => state = Scan::Char,
                b'/' if next == Some(b'/') =>
                {
                    state = Scan::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') =>
                {
                    state = Scan::BlockComment;
                    i += 1;
                }
                b';' if depth == 0 => return i + 1,
                b'{' => depth += 1,
                b'}' if depth > 0 =>
                {
                    depth -= 1;
                    if depth == 0
                    {
                        return i + 1;
                    }
                }
                _ =>
                {}
            },
            Scan::Str | Scan::Char =>
            {
                let quote = if state == Scan::Str { b'"' } else { b'\'' };
                if b == b'\\'
                {
                    i += 1;
                }
                else if b == quote
                {
                    state = Scan::Code;
                }
            }
            Scan::LineComment =>
            {
                if b == b'\n'
                {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment =>
            {
                if b == b'*' && next == Some(b'/')
                {
                    state = Scan::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    bytes.len()
}
