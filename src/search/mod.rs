//! 相关性检索引擎
//!
//! 纯函数库：分词、按字段权重打分、排序、命中归因。无状态、无 I/O。

mod filters;
mod interests;
mod query;

pub use filters::{filter_by_date, filter_by_track};
pub use interests::{search_by_interests, InterestSearch};
pub use query::{score_item, search_by_query, tokenize};
