pub mod ai_gateway;
pub mod config;
pub mod error;
pub mod storage;
pub mod task_repository;
