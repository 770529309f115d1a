//! `((block-id))` references.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;

use crate::application::parsing::delimiters::{self, BLOCK};
use crate::application::services::link_utils;
use crate::domain::links::occurrence::{BlockLinkStats, BlockOccurrence, IncompleteKind, IncompleteLink};

static BLOCK_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\(([^()\r\n]+)\)\)").unwrap());

const BLOCK_ID_RANDOM_LEN: usize = 12;

/// All block references with a well-formed id, in document order.
pub fn scan(content: &str) -> Vec<BlockOccurrence> {
    BLOCK_LINK_RE
        .captures_iter(content)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let block_id = cap.get(1)?.as_str().trim();
            if !is_valid_block_id(block_id) {
                return None;
            }
            Some(BlockOccurrence {
                block_id: block_id.to_string(),
                position: whole.start(),
                length: whole.len(),
                context: extract_context(content, whole.start(), whole.len()),
            })
        })
        .collect()
}

pub fn is_valid_block_id(id: &str) -> bool {
    link_utils::is_valid_block_id(id)
}

/// 12 random alphanumerics followed by the base-36 millisecond clock.
pub fn generate_block_id() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BLOCK_ID_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{random}{}", link_utils::timestamp_base36())
}

pub fn extract_context(content: &str, position: usize, length: usize) -> String {
    link_utils::extract_context(content, position, length)
}

pub fn get_link_at_position(content: &str, cursor: usize) -> Option<BlockOccurrence> {
    scan(content)
        .into_iter()
        .find(|o| o.position <= cursor && cursor <= o.position + o.length)
}

pub fn get_incomplete_link(content: &str, cursor: usize) -> Option<IncompleteLink> {
    delimiters::incomplete_link(content, cursor, BLOCK, IncompleteKind::Block)
}

pub fn replace_block_links(content: &str, renames: &HashMap<String, String>) -> String {
    let mut out = content.to_string();
    for occ in scan(content).into_iter().rev() {
        if let Some(new_id) = renames.get(&occ.block_id) {
            out.replace_range(
                occ.position..occ.position + occ.length,
                &link_utils::format_block_link(new_id),
            );
        }
    }
    out
}

pub fn count_block_links(content: &str) -> BlockLinkStats {
    let links = scan(content);
    let unique: HashSet<&str> = links.iter().map(|l| l.block_id.as_str()).collect();
    BlockLinkStats {
        total: links.len(),
        unique_blocks: unique.len(),
    }
}

/// Distinct referenced block ids in first-seen order.
pub fn extract_block_ids(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    scan(content)
        .into_iter()
        .filter_map(|l| seen.insert(l.block_id.clone()).then_some(l.block_id))
        .collect()
}

pub fn has_block_id(content: &str, block_id: &str) -> bool {
    scan(content).iter().any(|l| l.block_id == block_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_block_reference() {
        let links = scan("参考 ((abc12345XY))");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].block_id, "abc12345XY");
        let text = "参考 ((abc12345XY))";
        assert_eq!(
            &text[links[0].position..links[0].position + links[0].length],
            "((abc12345XY))"
        );
    }

    #[test]
    fn skips_ids_that_fail_the_format() {
        assert!(scan("((short)) ((has space1)) ((bad!chars1))").is_empty());
        let links = scan("(( padded_id-01 ))");
        assert_eq!(links[0].block_id, "padded_id-01");
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = generate_block_id();
        let b = generate_block_id();
        assert!(is_valid_block_id(&a));
        assert!(a.len() > 12);
        assert_ne!(a, b);
    }

    #[test]
    fn cursor_helpers_use_parenthesis_delimiters() {
        let text = "x ((abcdefgh)) y";
        assert_eq!(get_link_at_position(text, 5).unwrap().block_id, "abcdefgh");
        assert!(get_link_at_position(text, 0).is_none());

        let typing = get_incomplete_link("see ((abc", 9).unwrap();
        assert_eq!(typing.query, "abc");
        assert_eq!(typing.link_type, IncompleteKind::Block);
        assert!(get_incomplete_link("see ((abcdefgh))", 8).is_none());
    }

    #[test]
    fn replaces_counts_and_extracts() {
        let text = "((aaaaaaaa)) ((bbbbbbbb)) ((aaaaaaaa))";
        let mut renames = HashMap::new();
        renames.insert("aaaaaaaa".to_string(), "cccccccc".to_string());
        assert_eq!(
            replace_block_links(text, &renames),
            "((cccccccc)) ((bbbbbbbb)) ((cccccccc))"
        );
        assert_eq!(
            count_block_links(text),
            BlockLinkStats {
                total: 3,
                unique_blocks: 2
            }
        );
        assert_eq!(extract_block_ids(text), vec!["aaaaaaaa", "bbbbbbbb"]);
        assert!(has_block_id(text, "bbbbbbbb"));
        assert!(!has_block_id(text, "cccccccc"));
    }
}
