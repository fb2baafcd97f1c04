//! Seams between the retry engine and the outside world.

mod clock;
mod reply;

pub use clock::{Clock, ManualClock, SystemClock};
pub use reply::HttpReply;
