pub mod config;
pub mod error;
pub mod profile_repository;
pub mod storage;
pub mod task_feed;
pub mod task_mapper;
pub mod task_repository;
