// Adapters - External system implementations

pub mod decode_libav;
pub mod encode_libav;
pub mod memory;
pub mod toml_config;
pub mod upload_mux;

// Re-export adapters
pub use decode_libav::LibavFrameSource;
pub use encode_libav::LibavEncoderBackend;
pub use memory::{MemoryEncoderBackend, MemoryFrameSource, MemoryUploadPort};
pub use toml_config::TomlConfigAdapter;
pub use upload_mux::{MuxCredentials, MuxUploadAdapter};
