pub mod init;
pub mod storage;
pub mod web;

use anyhow::Error as AnyhowError;
use config::ConfigError;
use init::InitContextError;
use sea_orm::DbErr;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use storage::StorageError;
use thiserror::Error;
use web::WebError;

pub type OVResult<T, E = OVError> = anyhow::Result<T, E>;
pub type WebResult<T, E = WebError> = anyhow::Result<T, E>;
pub type StorageResult<T, E = StorageError> = Result<T, E>;

#[derive(Error, Debug)]
pub enum OVError {
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    StorageError(#[from] StorageError),
    #[error("{0}")]
    InitContextError(#[from] InitContextError),
    #[error("{0}")]
    WebError(#[from] WebError),
}

impl From<String> for OVError {
    #[inline]
    fn from(e: String) -> Self {
        OVError::Msg(e)
    }
}

impl From<&str> for OVError {
    #[inline]
    fn from(e: &str) -> Self {
        OVError::Msg(e.to_string())
    }
}

impl From<DbErr> for OVError {
    #[inline]
    fn from(e: DbErr) -> Self {
        OVError::StorageError(StorageError::DBError(e))
    }
}
