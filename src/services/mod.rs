pub mod checkpoint_store;
pub mod export_correlator;
pub mod position_finder;
pub mod retry;

pub use checkpoint_store::{CheckpointStorage, CheckpointStore, FsCheckpointStorage};
pub use export_correlator::{
    evaluate_entry, CorrelationQuery, ExportCorrelator, FeedEntry, FeedLayout, MatchVerdict,
};
pub use position_finder::{LabelParser, PositionFinder};
pub use retry::with_retry;
