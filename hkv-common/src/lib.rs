// hkv-common - shared wire protocol constants and error types for HybridKV

pub mod error;
pub mod protocol;

pub use error::{HkvError, HkvResult};
pub use protocol::{Status, MAX_ARGV_COUNT, MAX_FRAME_SIZE};
