use super::protocol::{ProtocolError, Request, parse_request};
use crate::reconcile::reload;
use crate::runtime_info::{ArcRuntimeInfo, RuntimeInfo};
use crate::services::{Service, ServiceError};

use log::{debug, error, info, trace, warn};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;

/// The lines sent back for one request, and whether the daemon should exit
/// after sending them.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Response {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Response {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            quit: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Action {
    Start,
    Stop,
    Restart,
    Backup,
}

impl Action {
    /// Whether the action makes sense for `service` when no name was given
    fn applies_to(self, service: &mut Service) -> bool {
        match self {
            Self::Start => !service.is_running(),
            Self::Stop | Self::Restart => service.is_running(),
            Self::Backup => {
                service.descriptor.backup_directory.is_some() && service.is_running()
            }
        }
    }

    fn apply(self, service: &mut Service, run_info: &RuntimeInfo) -> String {
        let name = service.name().to_owned();
        let result = match self {
            Self::Start => service.start(&run_info.settings).map(|()| format!("Started [{name}].")),
            Self::Stop => service.stop().map(|()| format!("Stopped [{name}].")),
            Self::Restart => service.restart().map(|()| format!("Restarting [{name}].")),
            Self::Backup => service.backup().map(|()| format!("Backing up [{name}].")),
        };
        result.unwrap_or_else(|e: ServiceError| e.to_string())
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Backup => "back up",
        }
    }
}

fn no_such_server(name: &str) -> String {
    format!("No server named [{name}]!")
}

fn run_action(action: Action, target: Option<String>, run_info: &RuntimeInfo) -> Response {
    let mut table = run_info.registry.lock();
    match target {
        Some(name) => match table.get_mut(&name) {
            Some(service) => Response::line(action.apply(service, run_info)),
            None => Response::line(no_such_server(&name)),
        },
        None => {
            let lines: Vec<String> = table
                .values_mut()
                .filter_map(|service| {
                    action
                        .applies_to(service)
                        .then(|| action.apply(service, run_info))
                })
                .collect();
            if lines.is_empty() {
                Response::line(format!("No server to {}.", action.verb()))
            } else {
                Response {
                    lines,
                    quit: false,
                }
            }
        }
    }
}

fn status(target: Option<String>, run_info: &RuntimeInfo) -> Response {
    let mut table = run_info.registry.lock();
    match target {
        Some(name) => match table.get_mut(&name) {
            Some(service) => Response::line(service.snapshot().to_string()),
            None => Response::line(no_such_server(&name)),
        },
        None if table.is_empty() => Response::line("No servers configured."),
        None => Response {
            lines: table
                .values_mut()
                .map(|service| service.snapshot().to_string())
                .collect(),
            quit: false,
        },
    }
}

fn dump(run_info: &RuntimeInfo) -> Response {
    let mut table = run_info.registry.lock();
    let lines = table
        .values_mut()
        .map(|service| {
            serde_json::to_string(&service.snapshot())
                .unwrap_or_else(|e| format!("Could not serialize [{}]: {e}", service.name()))
        })
        .collect();
    Response { lines, quit: false }
}

pub fn execute_request(request: Request, run_info: &RuntimeInfo) -> Response {
    trace!("Execute request: {request:?}");
    match request {
        Request::Start(target) => run_action(Action::Start, target, run_info),
        Request::Stop(target) => run_action(Action::Stop, target, run_info),
        Request::Restart(target) => run_action(Action::Restart, target, run_info),
        Request::Backup(target) => run_action(Action::Backup, target, run_info),
        Request::Status(target) => status(target, run_info),
        Request::Dump => dump(run_info),
        Request::Reload => match reload(run_info) {
            Ok(report) => Response::line(format!("Reloaded configuration: {report}.")),
            Err(e) => {
                warn!("Reload failed: {e}");
                Response::line(format!("Reload failed: {e}"))
            }
        },
        Request::User { name, line } => {
            let sent = run_info
                .registry
                .with_service(&name, |service| service.send_input(line));
            match sent {
                Some(Ok(())) => Response::line(format!("Sent to [{name}].")),
                Some(Err(e)) => Response::line(e.to_string()),
                None => Response::line(no_such_server(&name)),
            }
        }
        Request::Quit => Response {
            lines: vec!["Daemon shutting down.".to_owned()],
            quit: true,
        },
    }
}

/// Read one line without its terminator. A line that is not UTF-8 is still
/// consumed, so the connection can carry on after it.
fn read_request_line(
    reader: &mut impl BufRead,
) -> std::io::Result<Option<Result<String, std::string::FromUtf8Error>>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(Some(String::from_utf8(buf)))
}

/// Answer requests from `reader` until EOF or `quit`. Returns true if `quit`
/// was received; the caller is in charge of actually shutting down.
pub fn serve_connection(
    mut reader: impl BufRead,
    mut writer: impl Write,
    run_info: &RuntimeInfo,
) -> std::io::Result<bool> {
    while let Some(line) = read_request_line(&mut reader)? {
        let parsed = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => parse_request(&line, || {
                read_request_line(&mut reader).ok().flatten().and_then(Result::ok)
            }),
            Err(e) => {
                trace!("Control request is not UTF-8: {e}");
                Err(ProtocolError::InvalidUtf8)
            }
        };
        let response = match parsed {
            Ok(request) => execute_request(request, run_info),
            Err(e) => {
                debug!("Bad control request: {e}");
                Response::line(e.to_string())
            }
        };
        for line in &response.lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        if response.quit {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn listen_on_commands(stream: std::os::unix::net::UnixStream, run_info: ArcRuntimeInfo) {
    std::thread::spawn(move || {
        let reader = match stream.try_clone() {
            Ok(read_half) => BufReader::new(read_half),
            Err(e) => {
                error!("Could not clone control connection: {e}");
                return;
            }
        };
        match serve_connection(reader, &stream, &run_info) {
            Ok(true) => {
                info!("Quit requested over the control socket");
                // let the client see EOF, stopping the servers can take a while
                drop(stream);
                crate::shutdown::shutdown_sequence(&run_info);
            }
            Ok(false) => {}
            Err(e) => debug!("Control connection closed: {e}"),
        }
    });
}

pub fn accept_control_connections_unix_socket(run_info: ArcRuntimeInfo, source: UnixListener) {
    std::thread::spawn(move || {
        for stream in source.incoming() {
            match stream {
                Ok(stream) => listen_on_commands(stream, run_info.clone()),
                Err(e) => error!("Could not accept control connection: {e}"),
            }
        }
    });
}

/// Bind the control socket, replacing a stale one from an earlier run.
pub fn open_control_socket(path: &Path) -> Result<UnixListener, String> {
    if path.exists() {
        std::fs::remove_file(path)
            .map_err(|e| format!("Could not remove stale control socket {path:?}: {e}"))?;
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Could not create directory {dir:?}: {e}"))?;
    }
    UnixListener::bind(path).map_err(|e| format!("Could not bind control socket {path:?}: {e}"))
}
