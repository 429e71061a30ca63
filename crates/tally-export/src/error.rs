//! Error types for the tally-export renderers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("XML writer error: {0}")]
  Xml(String),

  #[error("workbook container error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
