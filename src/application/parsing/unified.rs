//! Both link families at once, plus diagnostics for malformed syntax.

use serde::Serialize;

use crate::application::parsing::delimiters::{self, BLOCK, Delimiters, PAGE, Token};
use crate::application::parsing::{block_links, page_links};
use crate::application::services::link_utils;
use crate::domain::links::occurrence::{
    BrokenLink, BrokenReason, IncompleteLink, LinkOccurrence, LinkStatistics,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokenLinkReport {
    pub broken_links: Vec<BrokenLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxError {
    pub position: usize,
    pub length: usize,
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxValidation {
    pub is_valid: bool,
    pub errors: Vec<SyntaxError>,
}

/// Page and block references merged into document order.
pub fn parse_all_links(content: &str) -> Vec<LinkOccurrence> {
    let mut links: Vec<LinkOccurrence> = page_links::scan(content)
        .into_iter()
        .map(LinkOccurrence::PageReference)
        .chain(
            block_links::scan(content)
                .into_iter()
                .map(LinkOccurrence::BlockReference),
        )
        .collect();
    links.sort_by_key(LinkOccurrence::position);
    links
}

pub fn detect_and_fix_broken_links(content: &str) -> BrokenLinkReport {
    let mut broken_links = Vec::new();
    broken_links.extend(detect_unbalanced(content, PAGE, BrokenReason::IncompletePage));
    broken_links.extend(detect_unbalanced(content, BLOCK, BrokenReason::IncompleteBlock));
    broken_links.extend(detect_nested(content, PAGE, BrokenReason::NestedPage));
    broken_links.extend(detect_nested(content, BLOCK, BrokenReason::NestedBlock));
    broken_links.sort_by_key(|b| b.position);
    BrokenLinkReport { broken_links }
}

/// Openers without a closer on the same line, and closers without an opener.
fn detect_unbalanced(content: &str, delims: Delimiters, reason: BrokenReason) -> Vec<BrokenLink> {
    let mut out = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let flush = |open: &mut Vec<usize>, out: &mut Vec<BrokenLink>| {
        for start in open.drain(..) {
            let end = delimiters::line_end(content, start);
            out.push(broken(content, start, end, reason));
        }
    };
    for token in delimiters::tokenize(content, delims) {
        match token {
            Token::Open(at) => open.push(at),
            Token::Close(at) => {
                if open.pop().is_none() {
                    out.push(broken(content, at, at + delims.close.len(), reason));
                }
            }
            Token::LineBreak(_) => flush(&mut open, &mut out),
        }
    }
    flush(&mut open, &mut out);
    out
}

/// Outermost pairs that enclose another complete pair of the same family.
fn detect_nested(content: &str, delims: Delimiters, reason: BrokenReason) -> Vec<BrokenLink> {
    let mut out = Vec::new();
    // (opener offset, encloses a closed pair)
    let mut stack: Vec<(usize, bool)> = Vec::new();
    for token in delimiters::tokenize(content, delims) {
        match token {
            Token::Open(at) => stack.push((at, false)),
            Token::Close(at) => {
                let Some((start, has_child)) = stack.pop() else {
                    continue;
                };
                if let Some(parent) = stack.last_mut() {
                    parent.1 = true;
                } else if has_child {
                    out.push(broken(content, start, at + delims.close.len(), reason));
                }
            }
            Token::LineBreak(_) => stack.clear(),
        }
    }
    out
}

fn broken(content: &str, start: usize, end: usize, reason: BrokenReason) -> BrokenLink {
    BrokenLink {
        original_text: content[start..end].to_string(),
        reason: reason.message().to_string(),
        category: reason,
        position: start,
        length: end - start,
        context: link_utils::extract_context(content, start, end - start),
    }
}

pub fn get_link_at_position(content: &str, cursor: usize) -> Option<LinkOccurrence> {
    page_links::get_link_at_position(content, cursor)
        .map(LinkOccurrence::PageReference)
        .or_else(|| {
            block_links::get_link_at_position(content, cursor).map(LinkOccurrence::BlockReference)
        })
}

pub fn get_incomplete_link(content: &str, cursor: usize) -> Option<IncompleteLink> {
    page_links::get_incomplete_link(content, cursor)
        .or_else(|| block_links::get_incomplete_link(content, cursor))
}

pub fn get_link_statistics(content: &str) -> LinkStatistics {
    let pages = page_links::count_page_links(content);
    let blocks = block_links::count_block_links(content);
    LinkStatistics {
        pages,
        blocks,
        broken: detect_and_fix_broken_links(content).broken_links.len(),
        total: pages.total + blocks.total,
    }
}

pub fn validate_link_syntax(content: &str) -> SyntaxValidation {
    let errors: Vec<SyntaxError> = detect_and_fix_broken_links(content)
        .broken_links
        .into_iter()
        .map(|b| SyntaxError {
            position: b.position,
            length: b.length,
            message: b.reason,
            error_type: "syntax",
        })
        .collect();
    SyntaxValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}
