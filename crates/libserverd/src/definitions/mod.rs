//! The declarative server definitions.
//!
//! ```text
//! # comment
//! [survival]
//! user=minecraft
//! group=minecraft
//! path=/srv/minecraft/survival
//! run=/usr/bin/java -Xmx2G -jar server.jar nogui
//! before=/usr/local/bin/sync-world pull
//! notify=/usr/local/bin/discord-say
//! backup=/srv/backups/survival
//! default=yes
//! ```
//!
//! Parsing happens in two steps: `parser` turns the text into blocks of
//! line-numbered entries, `loading` validates those and resolves accounts.
//! Any error aborts the whole load.

mod loading;
mod parser;

pub use loading::*;
pub use parser::*;

use crate::platform::IdentityError;
use std::path::PathBuf;

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ConfigErrorReason {
    Io(String),
    MissingBracket(String),
    EmptyName,
    ReservedName(String),
    DuplicateBlock {
        name: String,
        first_line: usize,
    },
    NoBlock,
    NoEquals,
    UnknownKey(String),
    DuplicateKey {
        key: String,
        value: String,
        first_line: usize,
        first_value: String,
    },
    BadBool(String),
    EmptyValue(String),
    MissingKey {
        block: String,
        key: String,
    },
    Identity(IdentityError),
    BadCommandline(String),
}

impl std::fmt::Display for ConfigErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "could not read file: {e}"),
            Self::MissingBracket(line) => write!(f, "expected ']' at the end of \"{line}\""),
            Self::EmptyName => write!(f, "server name cannot be empty"),
            Self::ReservedName(name) => {
                write!(f, "server name \"{name}\" cannot start with '-'")
            }
            Self::DuplicateBlock { name, first_line } => write!(
                f,
                "a server named [{name}] was already defined on line {first_line}"
            ),
            Self::NoBlock => write!(f, "no [server] block was defined yet"),
            Self::NoEquals => write!(f, "no '=' found"),
            Self::UnknownKey(key) => write!(f, "unknown key \"{key}\""),
            Self::DuplicateKey {
                key,
                value,
                first_line,
                first_value,
            } => write!(
                f,
                "redefinition of \"{key}\" as \"{value}\", originally defined on line {first_line} as \"{first_value}\""
            ),
            Self::BadBool(value) => write!(f, "expected \"yes\" or \"no\", got \"{value}\""),
            Self::EmptyValue(key) => write!(f, "\"{key}\" cannot be empty"),
            Self::MissingKey { block, key } => write!(f, "no {key} defined in [{block}]"),
            Self::Identity(e) => write!(f, "{e}"),
            Self::BadCommandline(value) => write!(f, "could not split command line \"{value}\""),
        }
    }
}

/// A definitions error with the file and, where it makes sense, the line it was found on.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ConfigError {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub reason: ConfigErrorReason,
}

impl ConfigError {
    pub fn new(path: &std::path::Path, line: Option<usize>, reason: ConfigErrorReason) -> Self {
        Self {
            path: path.to_path_buf(),
            line,
            reason,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "Error reading {}: on line {line} - {}",
                self.path.display(),
                self.reason
            ),
            None => write!(f, "Error reading {}: {}", self.path.display(), self.reason),
        }
    }
}

impl std::error::Error for ConfigError {}
