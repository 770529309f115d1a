use crate::application::services::link_utils::floor_char_boundary;
use crate::domain::links::occurrence::{IncompleteKind, IncompleteLink};

/// An opening/closing delimiter pair such as `[[` / `]]`.
#[derive(Debug, Clone, Copy)]
pub struct Delimiters {
    pub open: &'static str,
    pub close: &'static str,
}

pub const PAGE: Delimiters = Delimiters {
    open: "[[",
    close: "]]",
};

pub const BLOCK: Delimiters = Delimiters {
    open: "((",
    close: "))",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Open(usize),
    Close(usize),
    LineBreak(usize),
}

/// Splits `content` into delimiter tokens, left to right, without overlap.
pub fn tokenize(content: &str, delims: Delimiters) -> Vec<Token> {
    let bytes = content.as_bytes();
    let open = delims.open.as_bytes();
    let close = delims.close.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            tokens.push(Token::LineBreak(i));
            i += 1;
        } else if bytes[i..].starts_with(open) {
            tokens.push(Token::Open(i));
            i += open.len();
        } else if bytes[i..].starts_with(close) {
            tokens.push(Token::Close(i));
            i += close.len();
        } else {
            i += 1;
        }
    }
    tokens
}

/// Byte offset of the end of the line holding `from`, excluding `\r\n`.
pub fn line_end(content: &str, from: usize) -> usize {
    let rest = &content[from..];
    let end = rest.find('\n').map(|i| from + i).unwrap_or(content.len());
    if end > from && content.as_bytes()[end - 1] == b'\r' {
        end - 1
    } else {
        end
    }
}

/// Finds the link being typed at `cursor`: the nearest opener before the cursor
/// that is not closed yet. A closer later on the same line, before any new
/// opener, means the link is already complete, and so does a cursor sitting
/// inside a closer.
pub fn incomplete_link(
    content: &str,
    cursor: usize,
    delims: Delimiters,
    kind: IncompleteKind,
) -> Option<IncompleteLink> {
    let cursor = floor_char_boundary(content, cursor);
    let before = &content[..cursor];
    let start = before.rfind(delims.open)?;
    let typed = &before[start + delims.open.len()..];
    if typed.contains(delims.close) || typed.contains(['\n', '\r']) {
        return None;
    }

    let after = &content[cursor..];
    let inside_closer = (1..delims.close.len()).any(|k| {
        before.ends_with(&delims.close[..k]) && after.starts_with(&delims.close[k..])
    });
    if inside_closer {
        return None;
    }
    let rest = &after[..line_end(after, 0)];
    if let Some(close_at) = rest.find(delims.close) {
        let reopened = rest.find(delims.open).is_some_and(|o| o < close_at);
        if !reopened {
            return None;
        }
    }

    Some(IncompleteLink {
        link_type: kind,
        start,
        query: typed.to_string(),
    })
}
