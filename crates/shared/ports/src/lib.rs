//! netchan Ports
//!
//! Port definitions (traits) for named network channels.
//! These define the boundaries between the channel core and its collaborators.

mod codec;
mod directory;
mod error;

pub use codec::Codec;
pub use directory::Directory;
pub use error::{CodecError, CodecResult, DirectoryError, DirectoryResult};
