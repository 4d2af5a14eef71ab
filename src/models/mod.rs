pub mod classifier;
pub mod manager;
pub mod segmenter;

pub use classifier::TumorClassifier;
pub use manager::{ModelManager, ModelStats};
pub use segmenter::TumorSegmenter;
