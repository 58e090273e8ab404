//! Durable pool of pre-generated short codes
//!
//! Instead of generating a random code per request and probing the link
//! table for collisions, the full code space is shuffled once and written
//! to a flat file. Allocation then pops the next code off the front,
//! which is amortized O(1) and cannot collide with any other pooled code
//! even across restarts.
//!
//! The file holds the remaining codes as concatenated fixed-width
//! strings in allocation order. Memory and disk are kept consistent by
//! rewriting the file inside the same critical section that removes the
//! head entry; a crash can at worst leave a code on disk that was never
//! handed out, which is re-offered harmlessly on the next start.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::seq::SliceRandom;

use crate::error::ServiceError;

/// Code length of the deployed pool: 3 uppercase letters, 26^3 codes.
pub const CODE_LENGTH: usize = 3;

/// A fixed alphabet and length defining the set of generatable codes.
///
/// Codes map bijectively to integer indices in `[0, alphabet^length)`
/// via mixed-radix digit expansion, most significant digit first.
#[derive(Clone, Debug)]
pub struct CodeSpace {
    alphabet: Vec<u8>,
    length: usize,
}

impl CodeSpace {
    /// Builds a code space over an ASCII alphabet. The alphabet must be
    /// non-empty and free of duplicates for the mapping to be bijective.
    pub fn new(alphabet: &[u8], length: usize) -> Self {
        debug_assert!(!alphabet.is_empty());
        debug_assert!(length > 0);
        CodeSpace {
            alphabet: alphabet.to_vec(),
            length,
        }
    }

    /// The production alphabet: uppercase A-Z.
    pub fn uppercase_alpha(length: usize) -> Self {
        let alphabet: Vec<u8> = (b'A'..=b'Z').collect();
        CodeSpace::new(&alphabet, length)
    }

    /// Total number of codes in this space.
    pub fn capacity(&self) -> usize {
        self.alphabet.len().pow(self.length as u32)
    }

    /// Byte width of one code in the pool file.
    pub fn code_width(&self) -> usize {
        self.length
    }

    /// Converts an index to its code string.
    pub fn index_to_code(&self, index: usize) -> String {
        let radix = self.alphabet.len();
        let mut code = String::with_capacity(self.length);
        for position in (0..self.length).rev() {
            let digit = (index / radix.pow(position as u32)) % radix;
            code.push(self.alphabet[digit] as char);
        }
        code
    }

    /// Converts a code string back to its index. Returns `None` for
    /// strings of the wrong length or with bytes outside the alphabet.
    pub fn code_to_index(&self, code: &str) -> Option<usize> {
        if code.len() != self.length {
            return None;
        }
        let radix = self.alphabet.len();
        let mut index = 0usize;
        for byte in code.bytes() {
            let digit = self.alphabet.iter().position(|&c| c == byte)?;
            index = index * radix + digit;
        }
        Some(index)
    }
}

/// The durable, pre-shuffled sequence of not-yet-issued short codes.
pub struct CodePool {
    space: CodeSpace,
    path: PathBuf,
    entries: Mutex<VecDeque<usize>>,
}

impl CodePool {
    /// Opens the pool at `path`, generating and persisting a freshly
    /// shuffled permutation of the whole code space if no file exists
    /// yet. An existing file is parsed back preserving its on-disk
    /// order, which is the allocation order.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Persistence`] if the file exists but its length
    /// is not a multiple of the code width or it contains a byte outside
    /// the alphabet. The process must not serve with an unloadable pool.
    pub fn open(space: CodeSpace, path: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let path = path.into();
        let entries = if path.exists() {
            Self::load(&space, &path)?
        } else {
            Self::generate(&space, &path)?
        };
        Ok(CodePool {
            space,
            path,
            entries: Mutex::new(entries),
        })
    }

    fn generate(space: &CodeSpace, path: &Path) -> Result<VecDeque<usize>, ServiceError> {
        let mut indices: Vec<usize> = (0..space.capacity()).collect();
        indices.shuffle(&mut rand::rng());
        write_codes(space, path, indices.iter().copied())?;
        tracing::info!(
            codes = indices.len(),
            path = %path.display(),
            "generated new code pool"
        );
        Ok(indices.into())
    }

    fn load(space: &CodeSpace, path: &Path) -> Result<VecDeque<usize>, ServiceError> {
        let bytes = fs::read(path)?;
        let width = space.code_width();
        if bytes.len() % width != 0 {
            return Err(ServiceError::Persistence(format!(
                "{}: length {} is not a multiple of code width {}",
                path.display(),
                bytes.len(),
                width
            )));
        }

        let mut entries = VecDeque::with_capacity(bytes.len() / width);
        for chunk in bytes.chunks_exact(width) {
            let code = std::str::from_utf8(chunk).map_err(|_| {
                ServiceError::Persistence(format!("{}: non-UTF8 code entry", path.display()))
            })?;
            let index = space.code_to_index(code).ok_or_else(|| {
                ServiceError::Persistence(format!(
                    "{}: entry {:?} is outside the code alphabet",
                    path.display(),
                    code
                ))
            })?;
            entries.push_back(index);
        }
        Ok(entries)
    }

    /// Removes and returns the next unallocated code, or `Ok(None)` once
    /// the pool is drained.
    ///
    /// The in-memory removal and the durable truncation happen under one
    /// lock, and the truncation is confirmed durable before the code is
    /// released. If persisting fails the entry is put back, so a failed
    /// allocation never consumes a code.
    pub fn take(&self) -> Result<Option<String>, ServiceError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ServiceError::Internal("code pool lock poisoned".to_string()))?;

        let Some(index) = entries.pop_front() else {
            return Ok(None);
        };

        if let Err(err) = write_codes(&self.space, &self.path, entries.iter().copied()) {
            entries.push_front(index);
            return Err(err);
        }

        Ok(Some(self.space.index_to_code(index)))
    }

    /// Number of codes still available.
    pub fn remaining(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

/// Writes the given entries as concatenated code strings, fsyncs, and
/// atomically renames over the pool file so readers never observe a
/// partially written pool.
fn write_codes(
    space: &CodeSpace,
    path: &Path,
    entries: impl Iterator<Item = usize>,
) -> Result<(), ServiceError> {
    let mut buf = Vec::new();
    for index in entries {
        buf.extend_from_slice(space.index_to_code(index).as_bytes());
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_to_code_is_most_significant_first() {
        let space = CodeSpace::uppercase_alpha(3);
        assert_eq!(space.index_to_code(0), "AAA");
        assert_eq!(space.index_to_code(1), "AAB");
        assert_eq!(space.index_to_code(26), "ABA");
        assert_eq!(space.index_to_code(26 * 26), "BAA");
        assert_eq!(space.index_to_code(space.capacity() - 1), "ZZZ");
    }

    #[test]
    fn code_to_index_round_trips_over_the_full_space() {
        let space = CodeSpace::new(b"AB", 3);
        for index in 0..space.capacity() {
            let code = space.index_to_code(index);
            assert_eq!(space.code_to_index(&code), Some(index));
        }
    }

    #[test]
    fn code_to_index_rejects_foreign_input() {
        let space = CodeSpace::uppercase_alpha(3);
        assert_eq!(space.code_to_index("AA"), None);
        assert_eq!(space.code_to_index("AAAA"), None);
        assert_eq!(space.code_to_index("aaa"), None);
        assert_eq!(space.code_to_index("A1A"), None);
    }
}
