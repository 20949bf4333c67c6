//! Bearer token handling.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to read token file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Token file {path} is empty")]
    Empty { path: PathBuf },

    #[error("GitHub token is empty")]
    EmptyValue,
}

/// A GitHub bearer token.
///
/// `Debug` never prints the secret, so the token can sit inside structs that
/// are logged.
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubToken(String);

impl GitHubToken {
    /// Wrap a token string, trimming surrounding whitespace.
    pub fn new(token: impl AsRef<str>) -> Result<Self, TokenError> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            return Err(TokenError::EmptyValue);
        }
        Ok(Self(token.to_string()))
    }

    /// Read a token from a file. Only the first line is used.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TokenError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let first = content.lines().next().unwrap_or_default();
        Self::new(first).map_err(|_| TokenError::Empty {
            path: path.to_path_buf(),
        })
    }

    /// The secret itself, for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GitHubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GitHubToken(***)")
    }
}
