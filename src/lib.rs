pub mod api;
pub mod config;
pub mod location;
pub mod models;
pub mod redirect;
pub mod resolver;
pub mod shortcode;
pub mod shortener;
pub mod storage;
