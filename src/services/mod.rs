//! 能力层（Services）
//!
//! 单一职责的能力模块，不关心批处理流程：
//! - `sorter` - 图片排序能力
//! - `prompt_store` - 提示词加载与缓存能力
//! - `report` - 报告渲染与写出能力

pub mod prompt_store;
pub mod report;
pub mod sorter;

pub use prompt_store::{PromptStore, DEFAULT_PROMPT_NAME, DEFAULT_PROMPT_TEXT};
pub use report::{ArtifactWriter, FsArtifactWriter, ReportFormatter};
pub use sorter::{ImageSorter, SortRecommendation};
