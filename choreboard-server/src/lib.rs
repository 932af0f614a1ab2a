pub mod domain;
pub mod server;
pub mod storage;
