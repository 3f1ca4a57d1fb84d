use super::{
    echo_service, pid_alive, read_file, sh_commandline, test_settings, wait_for,
    with_timeout,
};
use crate::config::SupervisorSettings;
use crate::services::{Commandline, Service, ServiceError, ServiceState, archive_name};

use std::sync::Arc;
use std::time::Duration;

fn wait_until_running(service: &mut Service) -> u32 {
    wait_for("server to reach running", || {
        service.status().state == ServiceState::Running
    });
    service.pid().unwrap()
}

#[test]
fn test_start_input_stop() {
    with_timeout("test_start_input_stop", || {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let mut service = Service::new(echo_service("alpha", dir.path()));
        let log = service.descriptor.log_file();

        assert!(!service.is_running());
        service.start(&settings).unwrap();
        let pid = wait_until_running(&mut service);
        assert!(pid_alive(pid));

        // a second start must not spawn another process
        assert!(matches!(
            service.start(&settings),
            Err(ServiceError::AlreadyRunning(_))
        ));
        assert_eq!(service.pid(), Some(pid));

        service.send_input("list".into()).unwrap();
        service.send_input("say hello".into()).unwrap();
        wait_for("console lines in the log", || {
            read_file(&log).contains("list\nsay hello\n")
        });

        service.stop().unwrap();
        assert!(!service.is_running());
        assert_eq!(service.status().state, ServiceState::Stopped);
        assert!(!pid_alive(pid), "stop returned before the child was reaped");
        assert!(read_file(&log).ends_with("stop\n"));
    });
}

#[test]
fn test_commands_on_stopped_server() {
    let dir = tempfile::tempdir().unwrap();
    let mut desc = echo_service("alpha", dir.path());
    desc.backup_directory = Some(dir.path().join("backups"));
    let mut service = Service::new(desc);

    assert!(matches!(service.stop(), Err(ServiceError::NotRunning(_))));
    assert!(matches!(service.restart(), Err(ServiceError::NotRunning(_))));
    assert!(matches!(service.backup(), Err(ServiceError::NotRunning(_))));
    assert!(matches!(
        service.send_input("say hi".into()),
        Err(ServiceError::NotRunning(_))
    ));
    assert_eq!(service.status().state, ServiceState::Stopped);
    assert_eq!(service.snapshot().pid, None);
    // nothing was launched, so nothing was logged
    assert!(!service.descriptor.log_file().exists());
}

#[test]
fn test_backup_without_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = Service::new(echo_service("alpha", dir.path()));
    assert!(matches!(
        service.backup(),
        Err(ServiceError::NoBackupDirectory(_))
    ));
}

#[test]
fn test_hooks_run_in_order() {
    with_timeout("test_hooks_run_in_order", || {
        let dir = tempfile::tempdir().unwrap();
        let hooks = dir.path().join("hooks.txt");
        let record = |what: &str| {
            sh_commandline(&format!("echo \"{what}\" >> {}", hooks.display()))
        };

        let mut desc = echo_service("alpha", dir.path());
        desc.before = Some(record("before"));
        desc.after = Some(record("after"));
        // the message is appended as an argument and ends up in $0
        desc.notify = Some(sh_commandline(&format!(
            "echo \"notify $0\" >> {}",
            hooks.display()
        )));
        let mut service = Service::new(desc);

        service.start(&test_settings()).unwrap();
        wait_until_running(&mut service);
        service.stop().unwrap();

        assert_eq!(
            read_file(&hooks),
            "before\n\
             notify Server alpha is starting.\n\
             notify Server alpha is stopping.\n\
             notify Server alpha has stopped.\n\
             after\n"
        );
    });
}

#[test]
fn test_failing_hooks_do_not_abort_start() {
    with_timeout("test_failing_hooks_do_not_abort_start", || {
        let dir = tempfile::tempdir().unwrap();
        let mut desc = echo_service("alpha", dir.path());
        desc.before = Some(sh_commandline("exit 1"));
        desc.notify = Some(Commandline {
            cmd: "/nonexistent/notify".into(),
            args: vec![],
        });
        let mut service = Service::new(desc);

        service.start(&test_settings()).unwrap();
        let pid = wait_until_running(&mut service);
        assert!(pid_alive(pid));
        service.stop().unwrap();
    });
}

#[test]
fn test_launch_failure_unwinds() {
    with_timeout("test_launch_failure_unwinds", || {
        let dir = tempfile::tempdir().unwrap();
        let after = dir.path().join("after.txt");
        let mut desc = echo_service("alpha", dir.path());
        desc.run = Commandline {
            cmd: "/nonexistent/server".into(),
            args: vec![],
        };
        desc.after = Some(sh_commandline(&format!("echo after > {}", after.display())));
        let log = desc.log_file();
        let mut service = Service::new(desc);

        service.start(&test_settings()).unwrap();
        wait_for("worker to unwind", || !service.is_running());
        assert!(read_file(&log).contains("could not launch"));
        assert_eq!(read_file(&after), "after\n");

        // the server can be started again, and fails the same way
        service.start(&test_settings()).unwrap();
        wait_for("worker to unwind again", || !service.is_running());
    });
}

#[test]
fn test_crashed_child_ends_the_worker() {
    with_timeout("test_crashed_child_ends_the_worker", || {
        let dir = tempfile::tempdir().unwrap();
        let after = dir.path().join("after.txt");
        let mut desc = echo_service("alpha", dir.path());
        desc.after = Some(sh_commandline(&format!("echo after > {}", after.display())));
        let mut service = Service::new(desc);

        service.start(&test_settings()).unwrap();
        let pid = wait_until_running(&mut service);
        service.send_input("crash".into()).unwrap();

        wait_for("worker to notice the crash", || !service.is_running());
        assert!(!pid_alive(pid));
        assert_eq!(read_file(&after), "after\n");
        assert!(matches!(service.stop(), Err(ServiceError::NotRunning(_))));
    });
}

#[test]
fn test_restart_keeps_running() {
    with_timeout("test_restart_keeps_running", || {
        let dir = tempfile::tempdir().unwrap();
        let hooks = dir.path().join("hooks.txt");
        let mut desc = echo_service("alpha", dir.path());
        desc.before = Some(sh_commandline(&format!("echo before >> {}", hooks.display())));
        desc.after = Some(sh_commandline(&format!("echo after >> {}", hooks.display())));
        let log = desc.log_file();
        let mut service = Service::new(desc);

        service.start(&test_settings()).unwrap();
        let old_pid = wait_until_running(&mut service);

        service.restart().unwrap();
        wait_for("a new process", || {
            service.pid().is_some_and(|pid| pid != old_pid)
        });
        assert!(service.is_running());
        assert!(!pid_alive(old_pid));
        assert!(read_file(&log).contains("say Server restarting in 0 seconds!\nstop\n"));

        // the exit of the old process must not take the new one down
        std::thread::sleep(Duration::from_millis(200));
        let new_pid = service.pid().unwrap();
        assert!(service.is_running());
        assert!(pid_alive(new_pid));
        service.send_input("after restart".into()).unwrap();
        wait_for("input reaching the new process", || {
            read_file(&log).contains("after restart\n")
        });

        service.stop().unwrap();
        // no hooks around the restart itself
        assert_eq!(read_file(&hooks), "before\nafter\n");
    });
}

#[test]
fn test_stop_then_start_does_not_overlap() {
    with_timeout("test_stop_then_start_does_not_overlap", || {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let mut service = Service::new(echo_service("alpha", dir.path()));

        service.start(&settings).unwrap();
        let first = wait_until_running(&mut service);

        service.stop().unwrap();
        assert!(!pid_alive(first));
        service.start(&settings).unwrap();
        let second = wait_until_running(&mut service);
        assert_ne!(first, second);
        service.stop().unwrap();
    });
}

#[test]
fn test_backup_archives_working_directory() {
    with_timeout("test_backup_archives_working_directory", || {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir(&world).unwrap();
        std::fs::write(world.join("level.dat"), "blocks").unwrap();
        let backups = dir.path().join("backups");

        let mut desc = echo_service("alpha", &world);
        desc.log_directory = Some(dir.path().join("logs"));
        desc.backup_directory = Some(backups.clone());
        let log = desc.log_file();
        let mut service = Service::new(desc);

        service.start(&test_settings()).unwrap();
        wait_until_running(&mut service);
        service.backup().unwrap();

        wait_for("the backup to be announced", || {
            read_file(&log).contains("say Backup complete.\n")
        });
        assert!(
            read_file(&log).contains("save-off\nsave-all\nsave-on\nsay Backup complete.\n")
        );

        let archives: Vec<_> = std::fs::read_dir(&backups)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].starts_with("alpha-"));
        assert!(archives[0].ends_with(".tar.gz"));

        service.stop().unwrap();
    });
}

#[test]
fn test_archive_name() {
    use chrono::TimeZone;
    let when = chrono::Local
        .with_ymd_and_hms(2024, 3, 7, 9, 5, 1)
        .single()
        .unwrap();
    assert_eq!(archive_name("alpha", &when), "alpha-2024-03-07_09-05-01.tar.gz");
}

#[test]
fn test_stop_timeout_escalates() {
    with_timeout("test_stop_timeout_escalates", || {
        let dir = tempfile::tempdir().unwrap();
        let mut desc = echo_service("stubborn", dir.path());
        // ignores its console and SIGTERM, only SIGKILL gets rid of it
        desc.run = sh_commandline("trap '' TERM; while true; do sleep 0.1; done");
        let settings = Arc::new(SupervisorSettings {
            stop_timeout: Some(Duration::from_millis(300)),
            ..(*test_settings()).clone()
        });
        let mut service = Service::new(desc);

        service.start(&settings).unwrap();
        let pid = wait_until_running(&mut service);
        service.stop().unwrap();
        assert!(!pid_alive(pid));
        assert!(!service.is_running());
    });
}

#[test]
fn test_stop_timeout_kills_the_whole_process_group() {
    with_timeout("test_stop_timeout_kills_the_whole_process_group", || {
        let dir = tempfile::tempdir().unwrap();
        let child_pid_file = dir.path().join("child.pid");
        let mut desc = echo_service("wrapped", dir.path());
        // a wrapper script whose real server runs in the background
        desc.run = sh_commandline(&format!(
            "trap '' TERM; sleep 1000 & echo $! > {}; wait",
            child_pid_file.display()
        ));
        let settings = Arc::new(SupervisorSettings {
            stop_timeout: Some(Duration::from_millis(300)),
            ..(*test_settings()).clone()
        });
        let mut service = Service::new(desc);

        service.start(&settings).unwrap();
        let pid = wait_until_running(&mut service);
        wait_for("the background child to record its pid", || {
            read_file(&child_pid_file).ends_with('\n')
        });
        let grandchild: u32 = read_file(&child_pid_file).trim().parse().unwrap();
        assert!(pid_alive(grandchild));

        service.stop().unwrap();
        assert!(!pid_alive(pid));
        wait_for("the background child to die", || !pid_alive(grandchild));
    });
}

#[test]
fn test_snapshot_serializes() {
    with_timeout("test_snapshot_serializes", || {
        let dir = tempfile::tempdir().unwrap();
        let mut service = Service::new(echo_service("alpha", dir.path()));
        service.start(&test_settings()).unwrap();
        let pid = wait_until_running(&mut service);

        let snapshot = service.snapshot();
        assert_eq!(snapshot.state, ServiceState::Running);
        assert!(snapshot.to_string().starts_with(&format!("[alpha] running (pid {pid})")));

        let json: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["name"], "alpha");
        assert_eq!(json["state"], "running");
        assert_eq!(json["pid"], pid);
        assert_eq!(json["queued_commands"], 0);

        service.stop().unwrap();
        assert_eq!(service.snapshot().state, ServiceState::Stopped);
    });
}
