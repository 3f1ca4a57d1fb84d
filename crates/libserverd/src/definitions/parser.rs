//! Split the definitions file into `[name]` blocks of `key=value` entries,
//! remembering the line every entry came from for error messages.

use super::{ConfigError, ConfigErrorReason};

use log::trace;
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Key {
    Default,
    User,
    Group,
    Path,
    Log,
    Before,
    Run,
    After,
    Notify,
    Backup,
}

impl Key {
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name {
            "default" => Self::Default,
            "user" => Self::User,
            "group" => Self::Group,
            "path" => Self::Path,
            "log" => Self::Log,
            "before" => Self::Before,
            "run" => Self::Run,
            "after" => Self::After,
            "notify" => Self::Notify,
            "backup" => Self::Backup,
            _ => return None,
        };
        Some(key)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::User => "user",
            Self::Group => "group",
            Self::Path => "path",
            Self::Log => "log",
            Self::Before => "before",
            Self::Run => "run",
            Self::After => "after",
            Self::Notify => "notify",
            Self::Backup => "backup",
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Entry {
    pub line: usize,
    pub value: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParsedBlock {
    pub name: String,
    pub line: usize,
    pub entries: HashMap<Key, Entry>,
}

impl ParsedBlock {
    pub fn get(&self, key: Key) -> Option<&Entry> {
        self.entries.get(&key)
    }
}

pub fn parse_definitions(content: &str, path: &Path) -> Result<Vec<ParsedBlock>, ConfigError> {
    let mut blocks: Vec<ParsedBlock> = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line_nr = idx + 1;
        let line = raw_line.trim();
        let err = |reason| ConfigError::new(path, Some(line_nr), reason);

        // Ignore empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let Some(name) = rest.strip_suffix(']') else {
                return Err(err(ConfigErrorReason::MissingBracket(line.to_owned())));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(err(ConfigErrorReason::EmptyName));
            }
            if name.starts_with('-') {
                return Err(err(ConfigErrorReason::ReservedName(name.to_owned())));
            }
            if let Some(first_line) = first_seen.get(name) {
                return Err(err(ConfigErrorReason::DuplicateBlock {
                    name: name.to_owned(),
                    first_line: *first_line,
                }));
            }
            trace!("Found block [{name}] on line {line_nr}");
            first_seen.insert(name.to_owned(), line_nr);
            blocks.push(ParsedBlock {
                name: name.to_owned(),
                line: line_nr,
                entries: HashMap::new(),
            });
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            return Err(err(ConfigErrorReason::NoBlock));
        };
        let Some((key, value)) = line.split_once('=') else {
            return Err(err(ConfigErrorReason::NoEquals));
        };
        let (key_name, value) = (key.trim(), value.trim());
        let Some(key) = Key::from_name(key_name) else {
            return Err(err(ConfigErrorReason::UnknownKey(key_name.to_owned())));
        };
        if let Some(original) = block.entries.get(&key) {
            return Err(err(ConfigErrorReason::DuplicateKey {
                key: key_name.to_owned(),
                value: value.to_owned(),
                first_line: original.line,
                first_value: original.value.clone(),
            }));
        }
        if key == Key::Default && value != "yes" && value != "no" {
            return Err(err(ConfigErrorReason::BadBool(value.to_owned())));
        }
        block.entries.insert(
            key,
            Entry {
                line: line_nr,
                value: value.to_owned(),
            },
        );
    }

    Ok(blocks)
}
