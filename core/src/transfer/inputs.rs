use std::{
    collections::HashMap,
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

use rand::{seq::SliceRandom, Rng, RngCore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum InputKind {
    /// Uniformly random bytes.
    Random,
    /// Null bytes only.
    Zero,
    /// Printable words, lines of at most [`TEXT_WIDTH`] columns.
    Text,
}

pub const TEXT_WIDTH: usize = 90;

const WORDS: &[&str] = &[
    "the", "shell", "command", "line", "is", "read", "and", "expanded", "before", "execution",
    "pipeline", "of", "one", "or", "more", "commands", "separated", "by", "control", "operators",
    "each", "word", "undergoes", "parameter", "expansion", "quote", "removal", "redirection",
    "file", "descriptor", "standard", "input", "output", "error", "variable", "function",
    "builtin", "exit", "status", "signal", "trap", "job", "background", "foreground", "history",
    "alias", "prompt", "interactive", "login", "environment", "path", "directory", "stack",
];

/// Generated source files, cached by (kind, size) for the whole session.
///
/// A cached path whose file has vanished is regenerated.
#[derive(Debug)]
pub struct InputFiles {
    dir: PathBuf,
    cache: HashMap<(InputKind, u64), PathBuf>,
}

impl InputFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, kind: InputKind, size: u64) -> io::Result<PathBuf> {
        if let Some(path) = self.cache.get(&(kind, size)) {
            if path.is_file() {
                return Ok(path.clone());
            }
            log::debug!("Cached input {} vanished, regenerating", path.to_string_lossy());
        }
        let path = self.generate(kind, size)?;
        self.cache.insert((kind, size), path.clone());
        Ok(path)
    }

    fn generate(&self, kind: InputKind, size: u64) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let (mut file, path) = tempfile::Builder::new()
            .prefix(&format!("{}_{}_", kind, size))
            .tempfile_in(&self.dir)?
            .keep()
            .map_err(|e| e.error)?;

        let len = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "input too large"))?;
        let content = match kind {
            InputKind::Random => random_bytes(len),
            InputKind::Zero => vec![0u8; len],
            InputKind::Text => text_bytes(len),
        };
        write_all(&mut file, &content)?;
        log::debug!("Generated {} input of {}b at {}", kind, size, path.to_string_lossy());
        Ok(path)
    }
}

fn write_all(file: &mut File, content: &[u8]) -> io::Result<()> {
    file.write_all(content)?;
    file.sync_all()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

fn text_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(len + TEXT_WIDTH);
    let mut col = 0;
    while out.len() < len {
        let mut word = WORDS.choose(&mut rng).copied().unwrap_or("word").to_owned();
        if rng.gen_ratio(1, 40) {
            word.push('.');
        }
        if col > 0 && col + 1 + word.len() > TEXT_WIDTH {
            out.push('\n');
            col = 0;
        } else if col > 0 {
            out.push(' ');
            col += 1;
        }
        out.push_str(&word);
        col += word.len();
    }
    let mut bytes = out.into_bytes();
    bytes.truncate(len);
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn files_have_the_requested_size_and_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = InputFiles::new(dir.path());

        let a = inputs.get(InputKind::Random, 536).unwrap();
        assert_eq!(fsutil::file_size(&a).unwrap(), 536);
        assert_eq!(inputs.get(InputKind::Random, 536).unwrap(), a);

        let empty = inputs.get(InputKind::Random, 0).unwrap();
        assert_eq!(fsutil::file_size(&empty).unwrap(), 0);
        assert_ne!(empty, a);
    }

    #[test]
    fn vanished_files_are_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = InputFiles::new(dir.path());

        let a = inputs.get(InputKind::Zero, 528).unwrap();
        std::fs::remove_file(&a).unwrap();
        let b = inputs.get(InputKind::Zero, 528).unwrap();
        assert!(b.is_file());
        assert!(std::fs::read(&b).unwrap().iter().all(|&x| x == 0));
    }

    #[test]
    fn text_lines_fit_the_width() {
        let text = text_bytes(8 * 528);
        assert_eq!(text.len(), 8 * 528);
        let text = String::from_utf8(text).unwrap();
        assert!(text.lines().all(|l| l.len() <= TEXT_WIDTH));
        assert!(text.bytes().all(|b| b == b'\n' || (0x20..0x7f).contains(&b)));
    }
}
