use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::error::{SubtokenError, SubtokenResult};

/// One token line of a CoNLL-U file.
#[derive(Clone, Debug)]
pub struct ConlluLine {
    /// One-based line number in the source file.
    pub number: usize,
    pub text: String,
}

impl ConlluLine {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.text.split('\t')
    }

    pub fn column(&self, idx: usize) -> Option<&str> {
        self.columns().nth(idx)
    }

    /// Column `idx`, or a [`SubtokenError::MissingColumn`] naming `path`.
    pub fn required_column(&self, path: &Path, idx: usize) -> SubtokenResult<&str> {
        self.column(idx).ok_or_else(|| SubtokenError::MissingColumn {
            path: path.to_owned(),
            line: self.number,
            column: idx,
        })
    }
}

/// Lazily yields the non-blank, non-comment lines of a CoNLL-U file.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub struct ConlluReader {
    path: PathBuf,
    file: BufReader<File>,
    number: usize,
}

impl ConlluReader {
    pub fn open(path: impl AsRef<Path>) -> SubtokenResult<Self> {
        let path = path.as_ref();
        Ok(Self {
            path: path.to_owned(),
            file: BufReader::new(File::open(path)?),
            number: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buffer = Vec::new();
        if self.file.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(None);
        }
        self.number += 1;
        Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
    }
}

impl Iterator for ConlluReader {
    type Item = SubtokenResult<ConlluLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_line() {
                Ok(Some(text)) => {
                    let text = text.trim();
                    if text.is_empty() || text.starts_with('#') {
                        continue;
                    }
                    return Some(Ok(ConlluLine {
                        number: self.number,
                        text: text.to_owned(),
                    }));
                }
                Ok(None) => return None,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}
