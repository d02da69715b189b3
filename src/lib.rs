//! Catalog product search over a full-text engine / 商品目录搜索

pub mod backend;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod search;

pub use error::{ErrorKind, Result, SearchError};
