/// Represents errors that can occur in the indexing substrate
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// A background merge was aborted while it was being throttled
    MergeAborted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Substrate error: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Substrate result
pub type Result<T> = std::result::Result<T, Error>;
