use std::fmt;

/// Stable category of a rejected operation.
///
/// Collaborators branch on the kind; the `Display` text of the error that
/// carries it is the human-readable reason and is kept verbatim across
/// releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotOwner,
    InvalidOwner,
    InsufficientBalance,
    InvalidRecipient,
    InvalidSender,
    Overflow,
    CorruptState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotOwner => "not_owner",
            ErrorKind::InvalidOwner => "invalid_owner",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::InvalidRecipient => "invalid_recipient",
            ErrorKind::InvalidSender => "invalid_sender",
            ErrorKind::Overflow => "overflow",
            ErrorKind::CorruptState => "corrupt_state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
