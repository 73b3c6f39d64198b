//! Database initialization, introspection and schema version bookkeeping

pub mod init;
pub mod introspect;
pub mod versions;

pub use init::*;
pub use introspect::*;
pub use versions::*;
