//! Sample storage
//!
//! - `ring_buffer`: overwrite-oldest fixed-capacity buffer
//! - `sample_store`: the per-shard store (ring or aggregate mode)

pub mod ring_buffer;
pub mod sample_store;

pub use ring_buffer::RingBuffer;
pub use sample_store::{SampleStore, StoreSnapshot};
