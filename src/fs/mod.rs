//! Filesystem side of static file serving
//!
//! Path normalization, resource resolution, directory listings and the
//! pooled readers that stream resolved resources.

pub mod errors;
pub mod listing;
pub mod path;
pub mod reader;
pub mod resolve;

pub use errors::FsError;
pub use listing::LISTING_CONTENT_TYPE;
pub use path::{normalize, validate};
pub use reader::{PooledReader, ReaderCursor, ReaderPool, DEFAULT_MAX_IDLE_READERS};
pub use resolve::{ResourceResolver, INDEX_FILE};
