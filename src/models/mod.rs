pub mod options;
pub mod outcome;

pub use options::{
    BatchOptions, CancelToken, OcrMode, OfflineOptions, OnlineOptions, ReportFormat, SortStrategy,
};
pub use outcome::{
    display_name, BatchOutcome, FailureKind, OcrFailure, OcrOutcome, ProgressEvent, ProgressSink,
};
