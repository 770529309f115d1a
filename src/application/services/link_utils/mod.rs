use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::domain::links::occurrence::LinkOccurrence;

/// Characters of surrounding text kept on each side of a link for previews.
pub const CONTEXT_RADIUS: usize = 50;
pub const BLOCK_ID_MIN_LEN: usize = 8;

const ELLIPSIS: &str = "...";
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static BLOCK_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn format_page_link(page_name: &str, display_text: Option<&str>) -> String {
    let name = page_name.trim();
    match display_text.map(str::trim).filter(|d| !d.is_empty()) {
        Some(display) if display != name => format!("[[{name}|{display}]]"),
        _ => format!("[[{name}]]"),
    }
}

pub fn format_block_link(block_id: &str) -> String {
    format!("(({}))", block_id.trim())
}

/// Renders an occurrence back to link syntax. Broken links keep their text.
pub fn format_link(occurrence: &LinkOccurrence) -> String {
    match occurrence {
        LinkOccurrence::PageReference(p) => format_page_link(&p.page_name, p.alias.as_deref()),
        LinkOccurrence::BlockReference(b) => format_block_link(&b.block_id),
        LinkOccurrence::BrokenLink(b) => b.original_text.clone(),
    }
}

/// Name part of a single `[[name]]` / `[[name|alias]]` literal.
pub fn extract_page_name(link_text: &str) -> Option<String> {
    let inner = link_text
        .trim()
        .strip_prefix("[[")
        .and_then(|t| t.strip_suffix("]]"))?;
    let name = inner.split('|').next().unwrap_or_default().trim();
    if name.is_empty() || name.contains(['[', ']']) {
        return None;
    }
    Some(name.to_string())
}

/// Id part of a single `((id))` literal, if the id is well formed.
pub fn extract_block_id(link_text: &str) -> Option<String> {
    let inner = link_text
        .trim()
        .strip_prefix("((")
        .and_then(|t| t.strip_suffix("))"))?
        .trim();
    is_valid_block_id(inner).then(|| inner.to_string())
}

pub fn escape_regex(text: &str) -> String {
    regex::escape(text)
}

pub fn is_valid_page_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(['[', ']', '|', '\n', '\r'])
}

pub fn is_valid_block_id(id: &str) -> bool {
    id.len() >= BLOCK_ID_MIN_LEN && BLOCK_ID_RE.is_match(id)
}

/// Strips link delimiters and folds whitespace so the result is a usable page name.
pub fn sanitize_page_name(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '|'))
        .collect();
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Key used to compare page names regardless of case and spacing.
pub fn normalize_page_name(name: &str) -> String {
    sanitize_page_name(name).to_lowercase()
}

/// Largest char boundary not after `index`, clamped to the text length.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Text around `[position, position + length)` with `radius` characters on each
/// side. `...` marks a side that was cut before the true start or end.
pub fn preview_window(content: &str, position: usize, length: usize, radius: usize) -> String {
    let start = floor_char_boundary(content, position);
    let end = floor_char_boundary(content, position.saturating_add(length)).max(start);

    let window_start = if radius == 0 {
        start
    } else {
        content[..start]
            .char_indices()
            .rev()
            .nth(radius - 1)
            .map(|(i, _)| i)
            .unwrap_or(0)
    };
    let window_end = content[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(content.len());

    let mut out = String::with_capacity(window_end - window_start + 2 * ELLIPSIS.len());
    if window_start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(&content[window_start..window_end]);
    if window_end < content.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

pub fn extract_context(content: &str, position: usize, length: usize) -> String {
    preview_window(content, position, length, CONTEXT_RADIUS)
}

pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

pub fn timestamp_base36() -> String {
    to_base36(Utc::now().timestamp_millis().max(0) as u64)
}

/// `link_<base36 millis>_<9 random base36 chars>`
pub fn generate_link_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("link_{}_{}", timestamp_base36(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_page_links_with_and_without_alias() {
        assert_eq!(format_page_link("首页", None), "[[首页]]");
        assert_eq!(format_page_link("首页", Some("首页")), "[[首页]]");
        assert_eq!(format_page_link(" 技术文档 ", Some(" 文档 ")), "[[技术文档|文档]]");
        assert_eq!(format_block_link("abc12345XY"), "((abc12345XY))");
    }

    #[test]
    fn extracts_names_and_ids_from_literals() {
        assert_eq!(extract_page_name("[[Rust|book]]").as_deref(), Some("Rust"));
        assert_eq!(extract_page_name("[[ ]]"), None);
        assert_eq!(extract_page_name("Rust"), None);
        assert_eq!(extract_block_id("(( abc12345 ))").as_deref(), Some("abc12345"));
        assert_eq!(extract_block_id("((short))"), None);
    }

    #[test]
    fn validates_shapes() {
        assert!(is_valid_block_id("abc-123_XY"));
        assert!(!is_valid_block_id("abc 12345"));
        assert!(!is_valid_block_id("abc1234"));
        assert!(is_valid_page_name("Daily notes"));
        assert!(!is_valid_page_name("a|b"));
        assert!(!is_valid_page_name("   "));
    }

    #[test]
    fn sanitizes_page_names() {
        assert_eq!(sanitize_page_name("  [[My]]   page|\nname "), "My page name");
        assert_eq!(normalize_page_name("Rust  Book"), "rust book");
    }

    #[test]
    fn escape_regex_quotes_metacharacters() {
        let escaped = escape_regex("a.b[c]");
        let re = Regex::new(&escaped).unwrap();
        assert!(re.is_match("a.b[c]"));
        assert!(!re.is_match("axb[c]"));
    }

    #[test]
    fn preview_window_marks_only_truncated_sides() {
        assert_eq!(preview_window("see [[x]] now", 4, 5, 50), "see [[x]] now");

        let text = format!("{}[[x]]{}", "a".repeat(60), "b".repeat(60));
        let ctx = extract_context(&text, 60, 5);
        assert_eq!(ctx, format!("...{}[[x]]{}...", "a".repeat(50), "b".repeat(50)));
    }

    #[test]
    fn preview_window_counts_characters_not_bytes() {
        let text = format!("{}[[页]]", "字".repeat(55));
        let pos = text.find("[[").unwrap();
        let ctx = extract_context(&text, pos, "[[页]]".len());
        assert_eq!(ctx, format!("...{}[[页]]", "字".repeat(50)));
    }

    #[test]
    fn preview_window_clamps_out_of_range_input() {
        assert_eq!(preview_window("abc", 10, 5, 2), "...bc");
        assert_eq!(preview_window("", 0, 0, 50), "");
    }

    #[test]
    fn link_ids_follow_prefix_shape() {
        let id = generate_link_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "link");
        assert_eq!(parts[2].len(), 9);
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
