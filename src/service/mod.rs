pub mod credentials;
pub mod duplicates;
pub mod engine;
pub mod events;
pub mod justifications;
pub mod locator;
pub mod reports;
pub mod retention;
pub mod schedule;
pub mod sheets;
