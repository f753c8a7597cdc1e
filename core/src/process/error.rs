use std::{io, path::PathBuf, time::Duration};

pub type Result<T> = std::result::Result<T, self::Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot spawn '{}': {}", .program.to_string_lossy(), .source)]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create log file '{}': {}", .path.to_string_lossy(), .source)]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' did not finish within {}s", .timeout.as_secs_f64())]
    TimedOut { program: String, timeout: Duration },

    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}
