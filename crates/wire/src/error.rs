use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed payload: {len} bytes")]
    MalformedPayload { len: usize },
    #[error("bad unit flag: {flag}")]
    BadUnitFlag { flag: u8 },
    #[error("unparsed line: {line:?}")]
    UnparsedLine { line: String },
}
