pub mod bootstrap;
pub mod commands;
pub mod optimistic;
pub mod schedule_watch;
