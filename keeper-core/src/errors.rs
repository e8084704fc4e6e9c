use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported data type: {0}")]
    UnknownDataType(String),
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}
