mod name;
mod state;
mod status;

pub use name::{ChannelName, Direction, Endpoint, NameError};
pub use state::{ChannelState, StateCell};
pub use status::{ChannelStatus, StatusSnapshot};
