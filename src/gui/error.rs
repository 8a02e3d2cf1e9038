use std::{error::Error, fmt::Display, sync::mpsc};

/// Failures of the terminal front end.
#[derive(Debug)]
pub enum GuiError {
    /// Drawing to or reading from the terminal failed
    IOError(std::io::Error),
    /// The frame channel closed while the view was still waiting on it
    MPSCRecvError(mpsc::RecvError),
    /// There was nothing to choose from
    NothingToSelect,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(error) => write!(f, "terminal error: {}", error),
            Self::MPSCRecvError(error) => write!(f, "frame channel closed: {}", error),
            Self::NothingToSelect => write!(f, "no devices to select from"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<mpsc::RecvError> for GuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}
