use nix::unistd::{Gid, Uid};
use std::path::PathBuf;

/// An executable plus its arguments, as written in the definitions file.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Commandline {
    pub cmd: String,
    pub args: Vec<String>,
}

impl Commandline {
    /// First word is the executable, the rest are arguments. `None` for an empty list.
    pub fn from_words(mut words: Vec<String>) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        let cmd = words.remove(0);
        Some(Self { cmd, args: words })
    }

    /// Same command line with one more argument at the end. Used to hand a
    /// message to the notify hook.
    #[must_use]
    pub fn with_arg(&self, arg: &str) -> Self {
        let mut args = self.args.clone();
        args.push(arg.to_owned());
        Self {
            cmd: self.cmd.clone(),
            args,
        }
    }

    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.cmd);
        cmd.args(&self.args);
        cmd
    }
}

impl std::fmt::Display for Commandline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.cmd)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Static configuration of one server, as loaded from its `[name]` block.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ServiceDescriptor {
    pub name: String,
    pub user: Uid,
    pub group: Gid,
    pub working_directory: PathBuf,
    /// Directory for `<name>.log`. The working directory is used if unset
    pub log_directory: Option<PathBuf>,
    pub run: Commandline,
    pub before: Option<Commandline>,
    pub after: Option<Commandline>,
    pub notify: Option<Commandline>,
    pub backup_directory: Option<PathBuf>,
    pub start_on_boot: bool,
}

impl ServiceDescriptor {
    pub fn log_file(&self) -> PathBuf {
        self.log_directory
            .as_ref()
            .unwrap_or(&self.working_directory)
            .join(format!("{}.log", self.name))
    }

    /// True if `other` would run the process differently: another identity,
    /// directory, command or log destination. Such a change needs a stop first.
    pub fn identity_differs(&self, other: &Self) -> bool {
        self.user != other.user
            || self.group != other.group
            || self.working_directory != other.working_directory
            || self.run != other.run
            || self.log_directory != other.log_directory
    }
}
