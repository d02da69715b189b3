//! Search orchestration core / 搜索编排核心
//!
//! Architecture principles / 架构原则：
//! - Only talks to the engine through [`crate::backend::SearchBackend`]
//! - Builders produce immutable requests; the race, the cursor and the
//!   registry decide what runs and what is remembered
//! - Call direction: catalog → search → backend (unidirectional) / 调用方向

pub mod cursor;
pub mod query;
pub mod race;
pub mod registry;
pub mod serialize;
pub mod suggest;

pub use cursor::{CursorHandle, CursorStatus, ScrollCursor, DEFAULT_SCROLL_TTL};
pub use query::{Filter, FilterValue, QueryBuilder, SearchRequest};
pub use race::quick_exit;
pub use registry::LastSearchRegistry;
pub use serialize::{HitMeta, Record, ResponseShape};
pub use suggest::{SuggestionEngine, MAX_SUGGEST_ERRORS};
