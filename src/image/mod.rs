pub mod encoder;
pub mod loader;
pub mod overlay;
pub mod preprocessing;
pub mod transforms;

pub use encoder::ImageEncoder;
pub use loader::ImageLoader;
pub use overlay::OverlayRenderer;
pub use preprocessing::ImagePreprocessor;
pub use transforms::ImageTransforms;
