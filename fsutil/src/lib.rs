use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File, OpenOptions, ReadDir},
    io::{self, BufReader},
    path::{Path, PathBuf},
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("Not a regular file: '{0}'")]
        NotARegularFile(PathBuf),

        #[error("Cannot serialize to JSON (dest='{0}'): {1}")]
        SerializeToJson(PathBuf, #[source] serde_json::Error),

        #[error("Cannot deserialize from JSON (src='{0}'): {1}")]
        DeserializeFromJson(PathBuf, #[source] serde_json::Error),
    }
}
pub use error::{Error, Result};

#[must_use]
pub fn mkdir_all(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::SingleIO("Cannot create dir", dir.to_owned(), e))
}

#[must_use]
pub fn write<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    fs::write(&filepath, contents)
        .map_err(|e| Error::SingleIO("Cannot write file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_with_mkdir<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if let Some(dir) = filepath.as_ref().parent() {
        self::mkdir_all(dir)?;
    }
    self::write(filepath, contents)
}

#[must_use]
pub fn read_to_string(filepath: impl AsRef<Path>) -> Result<String> {
    fs::read_to_string(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn remove_file(filepath: impl AsRef<Path>) -> Result<()> {
    fs::remove_file(&filepath)
        .map_err(|e| Error::SingleIO("Cannot remove file", filepath.as_ref().to_owned(), e))
}

/// Removes `filepath` if it exists. Returns whether something was removed.
///
/// Refuses to touch anything that is not a regular file (or a symlink to one).
pub fn remove_file_if_exists(filepath: impl AsRef<Path>) -> Result<bool> {
    let filepath = filepath.as_ref();
    match fs::metadata(filepath) {
        Ok(meta) if meta.is_file() => self::remove_file(filepath).map(|_| true),
        Ok(_) => Err(Error::NotARegularFile(filepath.to_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::SingleIO("Cannot stat file", filepath.to_owned(), e)),
    }
}

/// Creates an empty file, or leaves an existing one untouched.
#[must_use]
pub fn touch(filepath: impl AsRef<Path>) -> Result<()> {
    let filepath = filepath.as_ref();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(filepath)
        .map(|_| ())
        .map_err(|e| Error::SingleIO("Cannot touch file", filepath.to_owned(), e))
}

#[must_use]
pub fn file_size(filepath: impl AsRef<Path>) -> Result<u64> {
    fs::metadata(&filepath)
        .map(|meta| meta.len())
        .map_err(|e| Error::SingleIO("Cannot stat file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_json_with_mkdir<P, T>(filepath: P, data: &T) -> Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let s = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SerializeToJson(filepath.as_ref().to_owned(), e))?;
    write_with_mkdir(filepath, &s)
}

#[must_use]
pub fn read_json_with_deserialize<P, T>(filepath: P) -> Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let filepath = filepath.as_ref();
    let f = File::open(filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.to_owned(), e))?;
    serde_json::from_reader(BufReader::new(f))
        .map_err(|e| Error::DeserializeFromJson(filepath.to_owned(), e))
}

#[must_use]
pub fn read_dir(dir: impl AsRef<Path>) -> Result<ReadDir> {
    fs::read_dir(&dir).map_err(|e| Error::SingleIO("Cannot read dir", dir.as_ref().to_owned(), e))
}

/// Lists the entries of `dir` sorted by file name.
pub fn sorted_entries(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = self::read_dir(&dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    Ok(entries)
}

/// Walks `root` top-down (the root itself first, then each subdirectory in
/// name order) and returns the first directory holding a file named `filename`.
///
/// Symlinked directories are not followed. Unreadable directories are skipped.
pub fn find_dir_containing(root: impl AsRef<Path>, filename: &str) -> Option<PathBuf> {
    let root = root.as_ref();
    if root.join(filename).is_file() {
        return Some(root.to_owned());
    }
    let entries = match self::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("{}", e);
            return None;
        }
    };
    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    subdirs.sort();
    subdirs
        .into_iter()
        .find_map(|dir| self::find_dir_containing(dir, filename))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remove_file_if_exists_reports_what_happened() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sender");

        assert!(!remove_file_if_exists(&file).unwrap());

        touch(&file).unwrap();
        assert!(file.is_file());
        assert!(remove_file_if_exists(&file).unwrap());
        assert!(!file.exists());

        mkdir_all(&file).unwrap();
        assert!(matches!(
            remove_file_if_exists(&file),
            Err(Error::NotARegularFile(_))
        ));
    }

    #[test]
    fn touch_keeps_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data");
        write(&file, "hello").unwrap();
        touch(&file).unwrap();
        assert_eq!(file_size(&file).unwrap(), 5);
    }

    #[test]
    fn find_dir_containing_prefers_shallow_then_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_with_mkdir(root.join("b/Makefile"), "").unwrap();
        write_with_mkdir(root.join("a/deep/Makefile"), "").unwrap();

        assert_eq!(
            find_dir_containing(root, "Makefile"),
            Some(root.join("a/deep"))
        );

        write_with_mkdir(root.join("Makefile"), "").unwrap();
        assert_eq!(find_dir_containing(root, "Makefile"), Some(root.to_owned()));
        assert_eq!(find_dir_containing(root, "rapport.pdf"), None);
    }

    #[test]
    fn find_dir_containing_does_not_follow_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        write_with_mkdir(outside.path().join("elsewhere/Makefile"), "").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_with_mkdir(root.join("project/Makefile"), "").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("a_link")).unwrap();

        assert_eq!(
            find_dir_containing(root, "Makefile"),
            Some(root.join("project"))
        );
    }

    #[test]
    fn json_roundtrip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/results.json");
        write_json_with_mkdir(&file, &vec![1, 2, 3]).unwrap();
        let v: Vec<i32> = read_json_with_deserialize(&file).unwrap();
        assert_eq!(v, [1, 2, 3]);
    }
}
