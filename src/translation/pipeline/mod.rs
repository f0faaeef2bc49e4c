//! 翻译管道模块
//!
//! 提供提交前的文本处理：翻译单元、长文本分段和批次规划

pub mod batch;
pub mod segmenter;
pub mod unit;

// 重新导出主要类型
pub use batch::{plan_batches, Batch, BatchItem, BatchPlan, UnitLayout};
pub use segmenter::{rejoin_segments, split_into_segments, split_with_boundaries, Boundary, Segment};
pub use unit::{SubmissionReport, TranslationUnit, UnitFailure};
