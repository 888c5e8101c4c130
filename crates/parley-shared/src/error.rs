use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid hex encoding: {0}")]
    InvalidEncoding(#[from] hex::FromHexError),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Failure to turn one inbound line into a [`crate::protocol::Request`].
#[derive(Error, Debug)]
pub enum FrameError {
    /// The line is not a JSON object carrying an action name. Skipped.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Well-formed frame naming an action the server does not know.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// Known action whose payload is missing or has ill-typed fields.
    #[error("Invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },
}

impl FrameError {
    /// Action name the frame carried, if it got far enough to have one.
    pub fn action(&self) -> Option<&str> {
        match self {
            FrameError::Malformed(_) => None,
            FrameError::UnsupportedAction(action) | FrameError::InvalidPayload { action, .. } => {
                Some(action)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_only_for_recognisable_frames() {
        assert_eq!(FrameError::Malformed("eof".into()).action(), None);
        assert_eq!(
            FrameError::UnsupportedAction("dance".into()).action(),
            Some("dance")
        );
        let invalid = FrameError::InvalidPayload {
            action: "login".into(),
            reason: "missing field `password`".into(),
        };
        assert_eq!(invalid.action(), Some("login"));
    }
}
