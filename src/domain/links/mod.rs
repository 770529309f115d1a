pub mod link;
pub mod occurrence;
