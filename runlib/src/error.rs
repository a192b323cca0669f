use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("sandbox runtime error: {0}")]
    Sandbox(String),
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("job store error: {0}")]
    Store(String),
    #[error("event bus error: {0}")]
    Bus(String),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("queue error: {0}")]
    Queue(#[from] lapin::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = result::Result<T, Error>;
