// file: src/frameworks/telegram/markdown.rs
// description: telegram legacy markdown escaping plus caption truncation and message splitting
// reference: https://core.telegram.org/bots/api#markdown-style

/// Room kept free in every split part for the "Continued (i/n)" header.
pub const CONTINUATION_RESERVE: usize = 32;

const ELLIPSIS: &str = "...";

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn take_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Makes free text safe for legacy Markdown. Underscores become dashes.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' => escaped.push('-'),
            '*' | '`' | '[' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Shortens `text` to at most `max` chars, preferring to stop after a sentence or line
/// end in the last fifth. Returns the shortened text and how many chars of the
/// original it covers.
pub fn truncate_text(text: &str, max: usize) -> (String, usize) {
    let total = char_len(text);
    if total <= max {
        return (text.to_string(), total);
    }

    let keep = max.saturating_sub(ELLIPSIS.len());
    let prefix = take_chars(text, keep);
    let last_break = prefix
        .chars()
        .enumerate()
        .filter(|(_, c)| *c == '.' || *c == '\n')
        .map(|(i, _)| i)
        .last();

    let cut = match last_break {
        Some(index) if index as f64 > max as f64 * 0.8 => index + 1,
        _ => keep,
    };

    (format!("{}{}", take_chars(text, cut), ELLIPSIS), cut)
}

/// Splits `text` into parts of at most `limit` chars: paragraphs first, then
/// sentences, then hard cuts for anything still too long.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }
        if char_len(paragraph) > limit {
            flush(&mut parts, &mut current);
            split_sentences(paragraph, limit, &mut parts);
            continue;
        }
        append_piece(&mut parts, &mut current, paragraph, "\n\n", limit);
    }

    flush(&mut parts, &mut current);
    parts
}

fn split_sentences(paragraph: &str, limit: usize, parts: &mut Vec<String>) {
    let sentences: Vec<&str> = paragraph.split(". ").collect();
    let last = sentences.len().saturating_sub(1);
    let mut current = String::new();

    for (i, sentence) in sentences.into_iter().enumerate() {
        let sentence = if i < last {
            format!("{}.", sentence)
        } else {
            sentence.to_string()
        };

        if char_len(&sentence) > limit {
            flush(parts, &mut current);
            parts.extend(hard_split(&sentence, limit));
            continue;
        }
        append_piece(parts, &mut current, &sentence, " ", limit);
    }

    flush(parts, &mut current);
}

fn append_piece(
    parts: &mut Vec<String>,
    current: &mut String,
    piece: &str,
    separator: &str,
    limit: usize,
) {
    if current.is_empty() {
        current.push_str(piece);
    } else if char_len(current) + char_len(separator) + char_len(piece) <= limit {
        current.push_str(separator);
        current.push_str(piece);
    } else {
        parts.push(std::mem::take(current));
        current.push_str(piece);
    }
}

fn flush(parts: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        parts.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

fn hard_split(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|chunk| chunk.iter().collect::<String>())
        .filter(|part| !part.trim().is_empty())
        .collect()
}
