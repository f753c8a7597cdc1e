use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use anyhow::Context as _;
use chrono::Local;
use env_logger::{Builder, Env, Target};

pub const SESSION_LOG: &str = "log.log";

/// Writes every record to stderr and to the session log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// `info` unless `RUST_LOG` says otherwise. Truncates `<log_dir>/log.log`.
pub fn init(log_dir: &Path) -> anyhow::Result<()> {
    fsutil::mkdir_all(log_dir)?;
    let path = log_dir.join(SESSION_LOG);
    let file = File::create(&path).with_context(|| format!("Cannot create {:?}", path))?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .context("Logger already initialized")
}
