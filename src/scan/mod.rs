pub mod pipeline;
pub mod types;

pub use pipeline::ScanPipeline;
pub use types::{
    MaskStats, ModelInfo, Prediction, ScanOptions, ScanResult, ScanStage, ScanStatus, TumorClass,
};
