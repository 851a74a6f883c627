pub mod clock;
pub mod models;
pub mod profile;
pub mod schedule;
