pub mod schedule;
pub mod source;
pub mod sync;
pub mod task;
