pub mod link_event_publisher;
pub mod link_repository;
