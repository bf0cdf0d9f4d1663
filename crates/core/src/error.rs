use crate::model::JobStatus;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("No domain set on job; cannot stamp {0} references")]
    MissingDomain(&'static str),

    #[error("Index {index} out of range for {len} dimensions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}
