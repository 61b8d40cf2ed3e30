//! Reading client: requests speech for a transcript and plays it back with
//! word highlighting.

mod connection;
mod queue;
mod reader;
mod timing;

pub use connection::run;
pub use reader::AudioOutput;
