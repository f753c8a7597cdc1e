use std::{fmt, io, path::Path};

use sha2::{Digest as _, Sha256};
use tokio::{fs::File, io::AsyncReadExt};

/// SHA-256 of a file, or the marker for a file that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Digest {
    Sha256(String),
    Missing,
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Digest::Sha256(hex) => write!(f, "sha256:{}", hex),
            Digest::Missing => write!(f, "no output file"),
        }
    }
}

/// Digest and size of one side of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFacts {
    pub digest: Digest,
    pub size: Option<u64>,
}

impl FileFacts {
    pub fn is_missing(&self) -> bool {
        self.digest == Digest::Missing
    }
}

impl fmt::Display for FileFacts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "{} ({} bytes)", self.digest, size),
            None => write!(f, "{}", self.digest),
        }
    }
}

const CHUNK: usize = 65536;

pub async fn sha256_file(path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A missing file maps to [`Digest::Missing`]; other I/O errors propagate.
pub async fn inspect(path: impl AsRef<Path>) -> io::Result<FileFacts> {
    let path = path.as_ref();
    match sha256_file(path).await {
        Ok(hex) => {
            let size = tokio::fs::metadata(path).await?.len();
            Ok(FileFacts {
                digest: Digest::Sha256(hex),
                size: Some(size),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileFacts {
            digest: Digest::Missing,
            size: None,
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn digest_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc");
        fsutil::write(&path, "abc").unwrap();

        let facts = inspect(&path).await.unwrap();
        assert_eq!(
            facts.digest,
            Digest::Sha256(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into()
            )
        );
        assert_eq!(facts.size, Some(3));
    }

    #[tokio::test]
    async fn missing_file_is_a_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let facts = inspect(dir.path().join("nope")).await.unwrap();
        assert!(facts.is_missing());
        assert_eq!(facts.to_string(), "no output file");
    }

    #[tokio::test]
    async fn empty_file_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fsutil::touch(&path).unwrap();
        let facts = inspect(&path).await.unwrap();
        assert!(!facts.is_missing());
        assert_eq!(facts.size, Some(0));
    }
}
