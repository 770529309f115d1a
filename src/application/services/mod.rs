pub mod link_utils;
