//! Caches owned by the reader: open raster handles and decoded blocks.

mod block_cache;
mod handle_pool;

pub use block_cache::{hash_path, BlockCache, BlockKey, BlockSamples, DecodedBlock};
pub use handle_pool::HandlePool;
