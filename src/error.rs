// Copyright 2025 TiKV Project Authors. Licensed under Apache-2.0.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
    #[error("failed to create operator: {0}")]
    CreateOperator(String),
    #[error("region {0} not found")]
    RegionNotFound(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
