//! Core scrambling engine: extraction, segmentation, shuffling and
//! reconstruction stages plus the progress convention they share.

pub mod extractor;
pub mod progress;
pub mod reconstructor;
pub mod segmenter;
pub mod shuffler;
pub mod timing;

pub use extractor::{ExtractedFrames, ExtractionOptions, FrameExtractor};
pub use progress::{ProgressCallback, ProgressPhase, ProgressReporter, ProgressUpdate, TracingProgress};
pub use reconstructor::{Reconstruction, ReconstructionOptions, Reconstructor};
pub use segmenter::ChunkSegmenter;
pub use shuffler::Shuffler;
pub use timing::build_timing_metadata;
