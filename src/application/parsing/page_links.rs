//! `[[Page]]` and `[[Page|Display]]` references.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::application::parsing::delimiters::{self, PAGE};
use crate::application::services::link_utils;
use crate::domain::links::occurrence::{IncompleteKind, IncompleteLink, PageLinkStats, PageOccurrence};

static PAGE_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^\[\]\r\n]+)\]\]").unwrap());

/// All page references in document order. References whose name is blank are skipped.
pub fn scan(content: &str) -> Vec<PageOccurrence> {
    PAGE_LINK_RE
        .captures_iter(content)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let inner = cap.get(1)?.as_str();
            let (name_part, display_part) = match inner.split_once('|') {
                Some((name, display)) => (name, Some(display)),
                None => (inner, None),
            };
            let page_name = name_part.trim();
            if page_name.is_empty() {
                return None;
            }
            let display_text = display_part
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or(page_name);
            let alias = (display_text != page_name).then(|| display_text.to_string());
            Some(PageOccurrence {
                page_name: page_name.to_string(),
                display_text: display_text.to_string(),
                alias,
                position: whole.start(),
                length: whole.len(),
                context: extract_context(content, whole.start(), whole.len()),
            })
        })
        .collect()
}

pub fn extract_context(content: &str, position: usize, length: usize) -> String {
    link_utils::extract_context(content, position, length)
}

/// True for exactly one well-formed `[[...]]` literal.
pub fn is_valid_page_link(text: &str) -> bool {
    let Some(inner) = text.strip_prefix("[[").and_then(|t| t.strip_suffix("]]")) else {
        return false;
    };
    !inner.trim().is_empty() && !inner.contains(['[', ']', '\n', '\r'])
}

pub fn get_link_at_position(content: &str, cursor: usize) -> Option<PageOccurrence> {
    scan(content)
        .into_iter()
        .find(|o| o.position <= cursor && cursor <= o.position + o.length)
}

pub fn get_incomplete_link(content: &str, cursor: usize) -> Option<IncompleteLink> {
    delimiters::incomplete_link(content, cursor, PAGE, IncompleteKind::Page)
}

/// Renames linked pages. The display part of aliased links is kept as written.
pub fn replace_page_links(content: &str, renames: &HashMap<String, String>) -> String {
    let mut out = content.to_string();
    // back to front so earlier offsets stay valid
    for occ in scan(content).into_iter().rev() {
        let Some(new_name) = renames.get(&occ.page_name) else {
            continue;
        };
        let replacement = match &occ.alias {
            Some(alias) => format!("[[{new_name}|{alias}]]"),
            None => format!("[[{new_name}]]"),
        };
        out.replace_range(occ.position..occ.position + occ.length, &replacement);
    }
    out
}

pub fn count_page_links(content: &str) -> PageLinkStats {
    let links = scan(content);
    let unique: HashSet<&str> = links.iter().map(|l| l.page_name.as_str()).collect();
    PageLinkStats {
        total: links.len(),
        unique_pages: unique.len(),
        with_alias: links.iter().filter(|l| l.alias.is_some()).count(),
    }
}

/// Distinct page names in first-seen order.
pub fn extract_page_names(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    scan(content)
        .into_iter()
        .filter_map(|l| seen.insert(l.page_name.clone()).then_some(l.page_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_plain_and_aliased_links() {
        let links = scan("见 [[首页]] 与 [[技术文档|文档]]");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].page_name, "首页");
        assert_eq!(links[0].display_text, "首页");
        assert_eq!(links[0].alias, None);
        assert_eq!(links[1].page_name, "技术文档");
        assert_eq!(links[1].display_text, "文档");
        assert_eq!(links[1].alias.as_deref(), Some("文档"));
    }

    #[test]
    fn positions_slice_back_to_the_match() {
        let text = "前言 [[ Alpha ]] mid [[Beta|b]]";
        for link in scan(text) {
            let raw = &text[link.position..link.position + link.length];
            assert!(raw.starts_with("[[") && raw.ends_with("]]"));
            assert!(raw.contains(link.page_name.as_str()));
        }
    }

    #[test]
    fn trims_name_and_display_independently() {
        let links = scan("[[  Rust  |  Rust  ]] [[Go| ]]");
        assert_eq!(links[0].page_name, "Rust");
        assert_eq!(links[0].alias, None);
        assert_eq!(links[1].display_text, "Go");
        assert_eq!(links[1].alias, None);
    }

    #[test]
    fn skips_blank_and_multiline_links() {
        assert!(scan("[[ ]] [[a\nb]] [[]]").is_empty());
    }

    #[test]
    fn scanning_twice_is_stable() {
        let text = "[[a]] [[b|c]] [[a]]";
        assert_eq!(scan(text), scan(text));
    }

    #[test]
    fn validates_single_link_literals() {
        assert!(is_valid_page_link("[[Page]]"));
        assert!(is_valid_page_link("[[Page|Alias]]"));
        assert!(!is_valid_page_link("[[ ]]"));
        assert!(!is_valid_page_link("[[a]] [[b]]"));
        assert!(!is_valid_page_link("[[a\nb]]"));
        assert!(!is_valid_page_link("[Page]"));
    }

    #[test]
    fn finds_link_under_cursor_inclusive() {
        let text = "xx [[Page]] yy";
        assert_eq!(get_link_at_position(text, 3).unwrap().page_name, "Page");
        assert_eq!(get_link_at_position(text, 11).unwrap().page_name, "Page");
        assert!(get_link_at_position(text, 1).is_none());
        assert!(get_link_at_position(text, 12).is_none());
    }

    #[test]
    fn detects_link_being_typed() {
        let link = get_incomplete_link("note [[Dai", 10).unwrap();
        assert_eq!(link.query, "Dai");
        assert_eq!(link.link_type, IncompleteKind::Page);
        assert!(get_incomplete_link("note [[Daily]]", 10).is_none());
    }

    #[test]
    fn renames_preserving_aliases() {
        let mut renames = HashMap::new();
        renames.insert("Old".to_string(), "新名字".to_string());
        let out = replace_page_links("[[Old]] and [[Old|shown]] and [[Other]]", &renames);
        assert_eq!(out, "[[新名字]] and [[新名字|shown]] and [[Other]]");
    }

    #[test]
    fn counts_links() {
        let stats = count_page_links("[[a]] [[a|x]] [[b]]");
        assert_eq!(
            stats,
            PageLinkStats {
                total: 3,
                unique_pages: 2,
                with_alias: 1
            }
        );
        assert_eq!(extract_page_names("[[b]] [[a]] [[b]]"), vec!["b", "a"]);
    }
}
