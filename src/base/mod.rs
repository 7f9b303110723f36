mod channel;
mod error;

pub use self::channel::Channel;
pub use self::error::{Error, Result};
