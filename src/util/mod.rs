//! General utility code that didn't fit anywhere else
// (c) 2024 Ross Younger

mod byte_count;
pub use byte_count::ByteCount;

mod dns;
pub use dns::{lookup_host_by_family, AddressFamily};

mod keylog;
pub use keylog::SecretLog;

pub mod socket;
pub mod stats;
pub mod time;

mod tracing;
pub use tracing::setup as setup_tracing;
