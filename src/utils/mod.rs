pub mod time;

pub use time::{FixedTimestep, Timer};
