//! Hot backups of a running server: pause saving, archive the working
//! directory, resume saving. Runs on the worker so it cannot overlap with a
//! stop or restart of the same server.

use super::descriptor::{Commandline, ServiceDescriptor};
use super::launcher::{HookError, RunningProcess, run_helper};
use crate::config::SupervisorSettings;

use chrono::{DateTime, Local};
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum BackupError {
    NoBackupDirectory,
    CreateDirectory(PathBuf, std::io::Error),
    Console(std::io::Error),
    Archiver(HookError),
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NoBackupDirectory => write!(f, "no backup directory configured"),
            Self::CreateDirectory(dir, e) => write!(f, "could not create {dir:?}: {e}"),
            Self::Console(e) => write!(f, "could not write to the server console: {e}"),
            Self::Archiver(e) => write!(f, "archiver failed: {e}"),
        }
    }
}

impl std::error::Error for BackupError {}

/// `<name>-YYYY-MM-DD_HH-MM-SS.tar.gz`
pub fn archive_name(name: &str, now: &DateTime<Local>) -> String {
    format!("{name}-{}.tar.gz", now.format("%Y-%m-%d_%H-%M-%S"))
}

pub fn archiver_commandline(archiver: &str, archive: &Path, source: &Path) -> Commandline {
    Commandline {
        cmd: archiver.to_owned(),
        args: vec![
            "-czf".to_owned(),
            archive.to_string_lossy().into_owned(),
            "-C".to_owned(),
            source.to_string_lossy().into_owned(),
            ".".to_owned(),
        ],
    }
}

fn archive(desc: &ServiceDescriptor, settings: &SupervisorSettings) -> Result<PathBuf, BackupError> {
    let backup_dir = desc
        .backup_directory
        .as_ref()
        .ok_or(BackupError::NoBackupDirectory)?;
    std::fs::create_dir_all(backup_dir)
        .map_err(|e| BackupError::CreateDirectory(backup_dir.clone(), e))?;

    let target = backup_dir.join(archive_name(&desc.name, &Local::now()));
    let cmdline = archiver_commandline(&settings.archiver, &target, &desc.working_directory);
    run_helper(&cmdline, &desc.working_directory, None).map_err(BackupError::Archiver)?;
    Ok(target)
}

/// Take one backup of `desc` while `process` keeps running. Saving is resumed
/// even if archiving failed, and the outcome is announced on the console.
pub fn run_backup(
    desc: &ServiceDescriptor,
    process: &mut RunningProcess,
    settings: &SupervisorSettings,
) -> Result<PathBuf, BackupError> {
    let console = &settings.console;
    if desc.backup_directory.is_none() {
        return Err(BackupError::NoBackupDirectory);
    }

    process
        .send_line(&console.save_off)
        .and_then(|()| process.send_line(&console.save_all))
        .map_err(BackupError::Console)?;
    std::thread::sleep(settings.backup_flush);

    let result = archive(desc, settings);

    if let Err(e) = process.send_line(&console.save_on) {
        warn!("[{}] Could not resume saving after backup: {e}", desc.name);
    }
    let announcement = match &result {
        Ok(target) => {
            info!("[{}] Backup written to {target:?}", desc.name);
            console.announce("Backup complete.")
        }
        Err(e) => {
            warn!("[{}] Backup failed: {e}", desc.name);
            console.announce("Backup failed!")
        }
    };
    if let Err(e) = process.send_line(&announcement) {
        warn!("[{}] Could not announce backup result: {e}", desc.name);
    }
    result
}
