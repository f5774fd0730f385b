use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}
