pub mod attendance;
pub mod credential;
pub mod justification;
pub mod report;
pub mod schedule;
