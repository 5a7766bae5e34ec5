use tracing::debug;

/// Characters per token in the budgeting approximation
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token cost of `text`: `chars / 4`, integer division.
///
/// Deliberately crude but deterministic; every ceiling in the crate is
/// measured with this function so results stay reproducible.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// A budget-respecting contiguous slice of context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Text of the chunk
    pub text: String,

    /// Estimated tokens of `text`
    pub tokens: usize,
}

impl Chunk {
    fn new(text: String) -> Self {
        let tokens = estimate_tokens(&text);
        Self { text, tokens }
    }
}

/// Partitions context into chunks that each fit under a token ceiling.
///
/// The last chunk is the "open" one: small contexts are merged into it
/// until merging would overflow, then a new chunk is started.
#[derive(Debug, Clone)]
pub struct ContextManager {
    /// Per-chunk token ceiling
    max_tokens: usize,

    /// Closed chunks followed by the open one
    chunks: Vec<Chunk>,
}

impl ContextManager {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            chunks: Vec::new(),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Add a piece of context.
    ///
    /// - Text over the ceiling is split on line boundaries first, closing a
    ///   piece whenever the next line would overflow it.
    /// - Each piece (or the whole text) is merged into the open chunk, or
    ///   starts a new chunk when merging would exceed the ceiling.
    pub fn add_context(&mut self, text: &str) {
        if estimate_tokens(text) > self.max_tokens {
            let pieces = split_lines(text, self.max_tokens);
            debug!(
                pieces = pieces.len(),
                max_tokens = self.max_tokens,
                "context over ceiling, split on lines"
            );
            for piece in pieces {
                self.push_piece(piece);
            }
        } else {
            self.push_piece(text.to_string());
        }
    }

    /// Chunks in order (the last one may still be open)
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Consume the manager, yielding its chunks
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    /// Estimated tokens of the open chunk
    pub fn current_token_count(&self) -> usize {
        self.chunks.last().map_or(0, |c| c.tokens)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    fn push_piece(&mut self, piece: String) {
        if let Some(open) = self.chunks.last_mut() {
            // Keep line structure when joining onto an unterminated chunk
            let sep = if open.text.ends_with('\n') || open.text.is_empty() {
                ""
            } else {
                "\n"
            };
            let merged_chars =
                open.text.chars().count() + sep.len() + piece.chars().count();

            if merged_chars / CHARS_PER_TOKEN <= self.max_tokens {
                open.text.push_str(sep);
                open.text.push_str(&piece);
                open.tokens = estimate_tokens(&open.text);
                return;
            }
            debug!("chunk would exceed token ceiling, starting a new one");
        }
        self.chunks.push(Chunk::new(piece));
    }
}

/// Split `text` into line-aligned pieces that each stay within `max_tokens`.
///
/// Lines keep their terminators, so concatenating the pieces yields `text`
/// exactly. A single line over the ceiling becomes its own piece.
pub fn split_lines(text: &str, max_tokens: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();

        if !current.is_empty() && (current_chars + line_chars) / CHARS_PER_TOKEN > max_tokens {
            pieces.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}
