//! Outbound text shaping for Telegram: chunking and Markdown → HTML.
//!
//! Telegram rejects messages over 4096 characters and only understands a
//! small HTML subset, so replies are split into chunks and the common
//! Markdown constructs are rewritten. Code and links are stashed behind
//! placeholders before escaping so their contents are escaped exactly once.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Longest chunk sent in one `sendMessage` call, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\w+-]*\n?([\s\S]*?)```").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("valid regex"));
static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^>\s*(.*)$").expect("valid regex"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+").expect("valid regex"));
static BOLD_STARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.+?)__").expect("valid regex"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").expect("valid regex"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_([^_]+)_").expect("valid regex"));

/// Split `content` into chunks of at most `max_chars` characters.
///
/// Each cut lands on the last newline inside the window, else the last
/// space, else exactly at the limit. Whitespace at the start of the next
/// chunk is dropped.
pub fn split_message(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if content.chars().count() <= max_chars {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = content;
    while !remaining.is_empty() {
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let cut = match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(cut) if cut > 0 => cut,
            _ => limit,
        };
        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].trim_start();
    }
    chunks
}

/// Escape `&`, `<` and `>`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape for use inside a double-quoted attribute.
fn escape_attribute(text: &str) -> String {
    escape_html(text)
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Rewrite the common Markdown dialect into Telegram's HTML subset.
pub fn markdown_to_telegram_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut code_blocks: Vec<String> = Vec::new();
    let mut inline_codes: Vec<String> = Vec::new();
    let mut links: Vec<(String, String)> = Vec::new();

    let out = CODE_BLOCK.replace_all(text, |caps: &Captures| {
        code_blocks.push(caps[1].to_string());
        format!("\0CB{}\0", code_blocks.len() - 1)
    });
    let out = INLINE_CODE.replace_all(&out, |caps: &Captures| {
        inline_codes.push(caps[1].to_string());
        format!("\0IC{}\0", inline_codes.len() - 1)
    });
    let out = LINK.replace_all(&out, |caps: &Captures| {
        links.push((caps[1].to_string(), caps[2].to_string()));
        format!("\0LK{}\0", links.len() - 1)
    });

    let out = HEADER.replace_all(&out, "${1}");
    let out = QUOTE.replace_all(&out, "${1}");
    let out = BULLET.replace_all(&out, "• ");

    let out = escape_html(&out);

    let out = BOLD_STARS.replace_all(&out, "<b>${1}</b>");
    let out = BOLD_UNDERSCORES.replace_all(&out, "<b>${1}</b>");
    let out = STRIKE.replace_all(&out, "<s>${1}</s>");
    let mut out = replace_italics(&out);

    for (idx, (label, url)) in links.iter().enumerate() {
        out = out.replace(
            &format!("\0LK{idx}\0"),
            &format!("<a href=\"{}\">{}</a>", escape_attribute(url), escape_html(label)),
        );
    }
    for (idx, code) in inline_codes.iter().enumerate() {
        out = out.replace(
            &format!("\0IC{idx}\0"),
            &format!("<code>{}</code>", escape_html(code)),
        );
    }
    for (idx, code) in code_blocks.iter().enumerate() {
        out = out.replace(
            &format!("\0CB{idx}\0"),
            &format!("<pre><code>{}</code></pre>", escape_html(code)),
        );
    }
    out
}

/// `_text_` → `<i>text</i>`, but only when neither underscore touches an
/// ASCII letter or digit, so `snake_case_names` survive.
fn replace_italics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search = 0;

    while let Some(caps) = ITALIC.captures_at(text, search) {
        let Some(whole) = caps.get(0) else { break };
        let (start, end) = (whole.start(), whole.end());

        let clear_before = text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        let clear_after = text[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric());

        if clear_before && clear_after {
            out.push_str(&text[copied..start]);
            out.push_str("<i>");
            out.push_str(&caps[1]);
            out.push_str("</i>");
            copied = end;
            search = end;
        } else {
            // The match starts on an ASCII '_', so one byte on is a char boundary.
            search = start + 1;
        }
    }
    out.push_str(&text[copied..]);
    out
}
