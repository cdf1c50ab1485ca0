pub mod converter;
pub mod publisher;
pub mod storage;
pub mod workspace;
