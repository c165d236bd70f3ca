pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod reader;
pub mod report_registry;
pub mod reports;
pub mod sqlite_storage;
pub mod storage;
pub mod summarizer;
pub mod valuator;
