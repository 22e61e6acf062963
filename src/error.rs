use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not start: {_0}")]
    Startup(#[error(not(source))] &'static str),
    /// A library operation failed; the cause is the child frame.
    #[display("{_0}")]
    Operation(#[error(not(source))] &'static str),
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
    /// The share exists but was not opened.
    #[display("share refused: {_0}")]
    Refused(#[error(not(source))] &'static str),
    #[display("unhealthy: {_0}")]
    Unhealthy(#[error(not(source))] String),
}
