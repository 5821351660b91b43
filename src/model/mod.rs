pub mod attendance;
pub mod credential;
pub mod employee;
pub mod justification;
pub mod report;
pub mod role;
pub mod schedule;
