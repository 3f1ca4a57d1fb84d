use super::{ConfigError, ConfigErrorReason, Key, ParsedBlock, parse_definitions};
use crate::platform::{resolve_gid, resolve_uid};
use crate::services::{Commandline, ServiceDescriptor};

use log::{debug, trace};
use std::path::{Path, PathBuf};

/// Read, parse and validate the definitions file. Either every block is valid
/// or nothing is returned.
pub fn load_definitions(path: &Path) -> Result<Vec<ServiceDescriptor>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::new(path, None, ConfigErrorReason::Io(e.to_string())))?;
    load_definitions_from_str(&content, path)
}

/// Like `load_definitions` but for content that was already read. `path` is only
/// used for error messages.
pub fn load_definitions_from_str(
    content: &str,
    path: &Path,
) -> Result<Vec<ServiceDescriptor>, ConfigError> {
    let blocks = parse_definitions(content, path)?;
    let descriptors = blocks
        .iter()
        .map(|block| build_descriptor(block, path))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "Loaded {} server definitions from {path:?}",
        descriptors.len()
    );
    Ok(descriptors)
}

fn required<'a>(block: &'a ParsedBlock, key: Key, path: &Path) -> Result<&'a str, ConfigError> {
    let Some(entry) = block.get(key) else {
        return Err(ConfigError::new(
            path,
            Some(block.line),
            ConfigErrorReason::MissingKey {
                block: block.name.clone(),
                key: key.as_str().to_owned(),
            },
        ));
    };
    if entry.value.is_empty() {
        return Err(ConfigError::new(
            path,
            Some(entry.line),
            ConfigErrorReason::EmptyValue(key.as_str().to_owned()),
        ));
    }
    Ok(&entry.value)
}

fn optional_path(block: &ParsedBlock, key: Key) -> Option<PathBuf> {
    block
        .get(key)
        .filter(|entry| !entry.value.is_empty())
        .map(|entry| PathBuf::from(&entry.value))
}

/// `before=`, `after=` and `notify=` are plain space separated words
fn hook_commandline(block: &ParsedBlock, key: Key) -> Option<Commandline> {
    let entry = block.get(key)?;
    let words = entry
        .value
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect();
    Commandline::from_words(words)
}

fn build_descriptor(block: &ParsedBlock, path: &Path) -> Result<ServiceDescriptor, ConfigError> {
    trace!("Validate block [{}]", block.name);

    let user_name = required(block, Key::User, path)?;
    let user = resolve_uid(user_name).map_err(|e| {
        let line = block.get(Key::User).map(|entry| entry.line);
        ConfigError::new(path, line, ConfigErrorReason::Identity(e))
    })?;

    let group_name = required(block, Key::Group, path)?;
    let group = resolve_gid(group_name).map_err(|e| {
        let line = block.get(Key::Group).map(|entry| entry.line);
        ConfigError::new(path, line, ConfigErrorReason::Identity(e))
    })?;

    let working_directory = PathBuf::from(required(block, Key::Path, path)?);

    let run_value = required(block, Key::Run, path)?;
    let run_line = block.get(Key::Run).map(|entry| entry.line);
    let words = shlex::split(run_value).ok_or_else(|| {
        ConfigError::new(
            path,
            run_line,
            ConfigErrorReason::BadCommandline(run_value.to_owned()),
        )
    })?;
    let run = Commandline::from_words(words).ok_or_else(|| {
        ConfigError::new(
            path,
            run_line,
            ConfigErrorReason::EmptyValue(Key::Run.as_str().to_owned()),
        )
    })?;

    let start_on_boot = block
        .get(Key::Default)
        .is_some_and(|entry| entry.value == "yes");

    Ok(ServiceDescriptor {
        name: block.name.clone(),
        user,
        group,
        working_directory,
        log_directory: optional_path(block, Key::Log),
        run,
        before: hook_commandline(block, Key::Before),
        after: hook_commandline(block, Key::After),
        notify: hook_commandline(block, Key::Notify),
        backup_directory: optional_path(block, Key::Backup),
        start_on_boot,
    })
}
