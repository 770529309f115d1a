use serde::Serialize;

/// `[[page]]` or `[[page|display]]` found in a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageOccurrence {
    pub page_name: String,
    pub display_text: String,
    pub alias: Option<String>,
    pub position: usize,
    pub length: usize,
    pub context: String,
}

/// `((block-id))` found in a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockOccurrence {
    pub block_id: String,
    pub position: usize,
    pub length: usize,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrokenReason {
    IncompletePage,
    IncompleteBlock,
    NestedPage,
    NestedBlock,
}

impl BrokenReason {
    pub fn message(&self) -> &'static str {
        match self {
            BrokenReason::IncompletePage => "不完整的页面链接语法",
            BrokenReason::IncompleteBlock => "不完整的块引用语法",
            BrokenReason::NestedPage => "嵌套的页面链接",
            BrokenReason::NestedBlock => "嵌套的块引用",
        }
    }
}

/// Link-like text that fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub original_text: String,
    pub reason: String,
    #[serde(skip)]
    pub category: BrokenReason,
    pub position: usize,
    pub length: usize,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LinkOccurrence {
    PageReference(PageOccurrence),
    BlockReference(BlockOccurrence),
    BrokenLink(BrokenLink),
}

impl LinkOccurrence {
    pub fn position(&self) -> usize {
        match self {
            LinkOccurrence::PageReference(p) => p.position,
            LinkOccurrence::BlockReference(b) => b.position,
            LinkOccurrence::BrokenLink(b) => b.position,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            LinkOccurrence::PageReference(p) => p.length,
            LinkOccurrence::BlockReference(b) => b.length,
            LinkOccurrence::BrokenLink(b) => b.length,
        }
    }

    pub fn end(&self) -> usize {
        self.position() + self.length()
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            LinkOccurrence::PageReference(_) => "page-reference",
            LinkOccurrence::BlockReference(_) => "block-reference",
            LinkOccurrence::BrokenLink(_) => "broken-link",
        }
    }
}

/// Which delimiter family an in-progress link uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncompleteKind {
    Page,
    Block,
}

/// A link being typed: the opener exists but no closer follows yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteLink {
    #[serde(rename = "type")]
    pub link_type: IncompleteKind,
    pub start: usize,
    pub query: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageLinkStats {
    pub total: usize,
    pub unique_pages: usize,
    pub with_alias: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockLinkStats {
    pub total: usize,
    pub unique_blocks: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatistics {
    pub pages: PageLinkStats,
    pub blocks: BlockLinkStats,
    pub broken: usize,
    pub total: usize,
}
