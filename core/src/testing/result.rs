use crate::digest::FileFacts;
use crate::process;

/// Why a test failed. The display text is what lands in the result store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    #[error("The test timed out!")]
    TimedOut,

    #[error("Cannot spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("{0}")]
    BuildFailed(String),

    #[error("{0}")]
    StructuralViolation(String),

    #[error("The file has been corrupted: sent {sent}, received {received}")]
    TransferCorrupted { sent: FileFacts, received: FileFacts },

    #[error("The program did not respect the advertized window ({0})")]
    WindowViolation(usize),

    #[error("The receiver does not echo timestamp but corrupts them!!!")]
    TimestampCorruption,

    #[error("{0}")]
    Internal(String),
}

impl From<process::Error> for Failure {
    fn from(e: process::Error) -> Self {
        use process::Error::*;
        match e {
            TimedOut { .. } => Failure::TimedOut,
            Spawn { program, source } => Failure::SpawnFailed {
                program: program.to_string_lossy().into_owned(),
                reason: source.to_string(),
            },
            e @ (LogFile { .. } | Wait { .. }) => Failure::Internal(e.to_string()),
        }
    }
}

impl From<fsutil::Error> for Failure {
    fn from(e: fsutil::Error) -> Self {
        Failure::Internal(e.to_string())
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Failure::Internal(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::digest::Digest;
    use std::{io, path::PathBuf, time::Duration};

    #[test]
    fn process_errors_map_to_failures() {
        let timed_out = process::Error::TimedOut {
            program: "make".into(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(Failure::from(timed_out), Failure::TimedOut);
        assert_eq!(Failure::TimedOut.to_string(), "The test timed out!");

        let spawn = process::Error::Spawn {
            program: PathBuf::from("./sender"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(matches!(
            Failure::from(spawn),
            Failure::SpawnFailed { program, .. } if program == "./sender"
        ));
    }

    #[test]
    fn corruption_message_reports_both_sides() {
        let f = Failure::TransferCorrupted {
            sent: FileFacts {
                digest: Digest::Sha256("aa".into()),
                size: Some(536),
            },
            received: FileFacts {
                digest: Digest::Missing,
                size: None,
            },
        };
        assert_eq!(
            f.to_string(),
            "The file has been corrupted: sent sha256:aa (536 bytes), received no output file"
        );
    }
}
