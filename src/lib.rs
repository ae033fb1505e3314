//! segwal: a segmented, append-only, crash-safe write-ahead log mapping
//! monotonically increasing record indices to key-value payloads.

pub mod codec;
pub mod error;
pub mod recover;
pub(crate) mod segment;
pub mod types;
pub mod wal;

pub use codec::DecodeOutcome;
pub use error::Error;
pub use recover::unsafe_recover;
pub use types::{Config, Record, TOMBSTONE};
pub use wal::{Iter, Wal};
