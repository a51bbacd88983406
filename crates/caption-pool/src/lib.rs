mod config;
mod notification;
mod payload;
mod scheduler;

pub use config::BatchConfig;
pub use notification::{CaptionStatus, StatusSink};
pub use scheduler::BatchScheduler;
