//! Streaming: chunk records, the segment engine, and stream variants.
//!
//! The engine is the heart of the gateway. Each HLS variant owns one
//! [`ChunkEngine`] that drives a transcoder subprocess over a sliding window
//! of segments; progressive formats bypass the engine entirely and stream a
//! single pipe.

pub mod chunk;
pub mod engine;
pub mod stream;

pub use chunk::{ChunkFault, ChunkReader, ChunkRecord};
pub use engine::{ChunkEngine, ChunkProducer, EngineConfig, EngineStatus};
pub use stream::{Content, Stream};
