//! The line based control protocol.
//!
//! Every request is one line, a command word optionally followed by a space
//! and a server name. `user <name>` is the only two line request: the second
//! line is sent to the server's console as it is.

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Request {
    Start(Option<String>),
    Stop(Option<String>),
    Restart(Option<String>),
    Backup(Option<String>),
    Status(Option<String>),
    Dump,
    Reload,
    Quit,
    User { name: String, line: String },
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ProtocolError {
    UnknownCommand(String),
    MissingName(String),
    MissingInput(String),
    InvalidUtf8,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::UnknownCommand(cmd) => write!(f, "Unknown command \"{cmd}\"!"),
            Self::MissingName(cmd) => write!(f, "Missing server name for \"{cmd}\"!"),
            Self::MissingInput(name) => write!(f, "No input line for [{name}]!"),
            Self::InvalidUtf8 => write!(f, "Invalid UTF-8 in request!"),
        }
    }
}

impl std::error::Error for ProtocolError {}

fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Parse one request. `next_line` is only called for `user`, to fetch the
/// line that is forwarded to the server.
pub fn parse_request(
    line: &str,
    next_line: impl FnOnce() -> Option<String>,
) -> Result<Request, ProtocolError> {
    let line = trim_line_end(line).trim_start();
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let target = Some(rest.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_owned);

    let request = match cmd {
        "start" => Request::Start(target),
        "stop" => Request::Stop(target),
        "restart" => Request::Restart(target),
        "backup" => Request::Backup(target),
        "status" => Request::Status(target),
        "dump" => Request::Dump,
        "reload" => Request::Reload,
        "quit" => Request::Quit,
        "user" => {
            let name = target.ok_or_else(|| ProtocolError::MissingName(cmd.to_owned()))?;
            let line = next_line().ok_or_else(|| ProtocolError::MissingInput(name.clone()))?;
            Request::User {
                name,
                line: trim_line_end(&line).to_owned(),
            }
        }
        _ => return Err(ProtocolError::UnknownCommand(line.to_owned())),
    };
    Ok(request)
}
