use anyhow::{bail, Result};

/// Keeps each summarization request comfortably inside the model's input
/// window. Measured in characters, not tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 15_000;

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Paragraph boundaries (runs of newlines) are preferred split points; a
/// paragraph that is longer than `max_chars` on its own is cut at fixed
/// character offsets. Concatenating the result always yields `text`.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<String>> {
    if max_chars == 0 {
        bail!("chunk size must be greater than zero");
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut greedy: Vec<Span> = Vec::new();
    let mut current: Option<Span> = None;

    for unit in paragraph_units(text) {
        current = match current {
            Some(open) if open.chars + unit.chars > max_chars => {
                greedy.push(open);
                Some(unit)
            }
            Some(open) => Some(open.join(unit)),
            None => Some(unit),
        };
    }
    greedy.extend(current);

    let mut chunks = Vec::with_capacity(greedy.len());
    for span in greedy {
        let slice = &text[span.start..span.end];
        if span.chars <= max_chars {
            chunks.push(slice.to_string());
        } else {
            chunks.extend(hard_split(slice, max_chars));
        }
    }

    Ok(chunks)
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    chars: usize,
}

impl Span {
    fn join(self, next: Span) -> Span {
        Span {
            start: self.start,
            end: next.end,
            chars: self.chars + next.chars,
        }
    }
}

fn is_newline(ch: char) -> bool {
    ch == '\n' || ch == '\r'
}

/// Paragraph units: each newline run starts a unit and stays attached to the
/// text after it. Whitespace-only units are folded into a neighbour.
fn paragraph_units(text: &str) -> Vec<Span> {
    let mut raw = Vec::new();
    let mut start = 0;
    let mut chars = 0;
    let mut prev_newline = false;

    for (idx, ch) in text.char_indices() {
        let newline = is_newline(ch);
        if newline && !prev_newline && idx > start {
            raw.push(Span { start, end: idx, chars });
            start = idx;
            chars = 0;
        }
        chars += 1;
        prev_newline = newline;
    }
    raw.push(Span {
        start,
        end: text.len(),
        chars,
    });

    let mut units: Vec<Span> = Vec::with_capacity(raw.len());
    let mut leading_blank: Option<Span> = None;

    for span in raw {
        let blank = text[span.start..span.end].trim().is_empty();
        if blank {
            match units.last_mut() {
                Some(last) => *last = last.join(span),
                None => {
                    leading_blank = Some(match leading_blank {
                        Some(pending) => pending.join(span),
                        None => span,
                    })
                }
            }
            continue;
        }
        match leading_blank.take() {
            Some(pending) => units.push(pending.join(span)),
            None => units.push(span),
        }
    }

    // Whitespace-only input: keep it as a single unit.
    if let Some(pending) = leading_blank {
        units.push(pending);
    }

    units
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}
