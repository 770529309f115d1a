// Link syntax scanners. Everything here is a pure function over `&str`;
// compiled patterns are shared statics with no per-call cursor state.
pub mod block_links;
pub mod delimiters;
pub mod page_links;
pub mod unified;
