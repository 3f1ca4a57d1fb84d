//! Resolve `user=` / `group=` values against the system account databases.

use nix::unistd::{Gid, Group, Uid, User};

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum IdentityError {
    NoSuchUser(String),
    NoSuchGroup(String),
    /// The lookup itself failed (EIO, ENOMEM, ...), as opposed to "no entry"
    Lookup(String, nix::Error),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NoSuchUser(name) => write!(f, "no such user \"{name}\""),
            Self::NoSuchGroup(name) => write!(f, "no such group \"{name}\""),
            Self::Lookup(name, e) => write!(f, "looking up \"{name}\" failed: {e}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Resolve a user name or numeric uid to a `Uid`. Either way the account has
/// to exist.
pub fn resolve_uid(user: &str) -> Result<Uid, IdentityError> {
    let entry = match user.parse::<u32>() {
        Ok(uid) => User::from_uid(Uid::from_raw(uid)),
        Err(_) => User::from_name(user),
    };
    match entry {
        Ok(Some(entry)) => Ok(entry.uid),
        Ok(None) => Err(IdentityError::NoSuchUser(user.to_owned())),
        Err(e) => Err(IdentityError::Lookup(user.to_owned(), e)),
    }
}

/// Resolve a group name or numeric gid to a `Gid`. Either way the group has
/// to exist.
pub fn resolve_gid(group: &str) -> Result<Gid, IdentityError> {
    let entry = match group.parse::<u32>() {
        Ok(gid) => Group::from_gid(Gid::from_raw(gid)),
        Err(_) => Group::from_name(group),
    };
    match entry {
        Ok(Some(entry)) => Ok(entry.gid),
        Ok(None) => Err(IdentityError::NoSuchGroup(group.to_owned())),
        Err(e) => Err(IdentityError::Lookup(group.to_owned(), e)),
    }
}
