use super::{
    echo_block, echo_service, pid_alive, sh_commandline, test_runtime_info, test_settings,
    wait_for, with_timeout,
};
use crate::reconcile::{ReconcileReport, reconcile, reload};
use crate::registry::Registry;
use crate::services::ServiceState;

fn pid_of(registry: &Registry, name: &str) -> Option<u32> {
    registry.with_service(name, |service| service.pid()).flatten()
}

fn wait_running(registry: &Registry, name: &str) -> u32 {
    wait_for(name, || {
        registry
            .with_service(name, |service| service.status().state == ServiceState::Running)
            .unwrap_or(false)
    });
    pid_of(registry, name).unwrap()
}

fn is_running(registry: &Registry, name: &str) -> bool {
    registry
        .with_service(name, |service| service.is_running())
        .unwrap_or(false)
}

#[test]
fn test_initial_reconcile_starts_boot_servers() {
    with_timeout("test_initial_reconcile_starts_boot_servers", || {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let registry = Registry::new();

        let mut alpha = echo_service("alpha", dir.path());
        alpha.start_on_boot = true;
        let beta = echo_service("beta", dir.path());

        let report = reconcile(&registry, vec![alpha, beta], &settings);
        assert_eq!(report.added, vec!["alpha".to_owned(), "beta".to_owned()]);
        assert_eq!(registry.names(), vec!["alpha".to_owned(), "beta".to_owned()]);

        wait_running(&registry, "alpha");
        assert!(!is_running(&registry, "beta"));

        registry.stop_all();
    });
}

#[test]
fn test_unchanged_and_hook_only_changes_leave_process_alone() {
    with_timeout("test_unchanged_and_hook_only_changes_leave_process_alone", || {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let registry = Registry::new();

        let mut alpha = echo_service("alpha", dir.path());
        alpha.start_on_boot = true;
        reconcile(&registry, vec![alpha.clone()], &settings);
        let pid = wait_running(&registry, "alpha");

        let report = reconcile(&registry, vec![alpha.clone()], &settings);
        assert_eq!(
            report,
            ReconcileReport {
                unchanged: vec!["alpha".into()],
                ..ReconcileReport::default()
            }
        );
        assert_eq!(pid_of(&registry, "alpha"), Some(pid));

        alpha.after = Some(sh_commandline("true"));
        alpha.backup_directory = Some(dir.path().join("backups"));
        alpha.start_on_boot = false;
        let report = reconcile(&registry, vec![alpha.clone()], &settings);
        assert_eq!(report.updated, vec!["alpha".to_owned()]);
        assert_eq!(pid_of(&registry, "alpha"), Some(pid));
        assert_eq!(
            registry.with_service("alpha", |service| service.descriptor.clone()),
            Some(alpha)
        );

        registry.stop_all();
    });
}

#[test]
fn test_identity_change_restarts_running_server() {
    with_timeout("test_identity_change_restarts_running_server", || {
        let dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let registry = Registry::new();

        let mut alpha = echo_service("alpha", dir.path());
        alpha.start_on_boot = true;
        let beta = echo_service("beta", dir.path());
        reconcile(&registry, vec![alpha.clone(), beta.clone()], &settings);
        let old_pid = wait_running(&registry, "alpha");

        // a running server is restarted, a stopped one only updated
        let mut moved_alpha = alpha.clone();
        moved_alpha.working_directory = other_dir.path().to_path_buf();
        let mut moved_beta = beta.clone();
        moved_beta.working_directory = other_dir.path().to_path_buf();
        let report = reconcile(&registry, vec![moved_alpha, moved_beta], &settings);
        assert_eq!(report.restarted, vec!["alpha".to_owned()]);
        assert_eq!(report.updated, vec!["beta".to_owned()]);

        assert!(!pid_alive(old_pid));
        let new_pid = wait_running(&registry, "alpha");
        assert_ne!(new_pid, old_pid);
        assert!(other_dir.path().join("alpha.log").exists());
        assert!(!is_running(&registry, "beta"));

        registry.stop_all();
    });
}

#[test]
fn test_start_on_boot_change_does_not_start() {
    with_timeout("test_start_on_boot_change_does_not_start", || {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let registry = Registry::new();

        let mut alpha = echo_service("alpha", dir.path());
        reconcile(&registry, vec![alpha.clone()], &settings);
        alpha.start_on_boot = true;
        let report = reconcile(&registry, vec![alpha], &settings);

        assert_eq!(report.updated, vec!["alpha".to_owned()]);
        assert!(!is_running(&registry, "alpha"));
    });
}

#[test]
fn test_removed_server_is_stopped_and_gone() {
    with_timeout("test_removed_server_is_stopped_and_gone", || {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings();
        let registry = Registry::new();

        let mut alpha = echo_service("alpha", dir.path());
        alpha.start_on_boot = true;
        let mut beta = echo_service("beta", dir.path());
        beta.start_on_boot = true;
        reconcile(&registry, vec![alpha.clone(), beta], &settings);
        let alpha_pid = wait_running(&registry, "alpha");
        let beta_pid = wait_running(&registry, "beta");

        let report = reconcile(&registry, vec![alpha], &settings);
        assert_eq!(report.removed, vec!["beta".to_owned()]);
        assert_eq!(report.unchanged, vec!["alpha".to_owned()]);
        assert!(!registry.contains("beta"));
        assert!(!pid_alive(beta_pid));
        assert_eq!(pid_of(&registry, "alpha"), Some(alpha_pid));

        registry.stop_all();
    });
}

#[test]
fn test_invalid_reload_changes_nothing() {
    with_timeout("test_invalid_reload_changes_nothing", || {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("serverd.conf");
        std::fs::write(
            &conf,
            echo_block("alpha", dir.path(), "default=yes") + &echo_block("beta", dir.path(), ""),
        )
        .unwrap();
        let run_info = test_runtime_info(conf.clone(), dir.path());

        let report = reload(&run_info).unwrap();
        assert_eq!(report.added.len(), 2);
        let pid = wait_running(&run_info.registry, "alpha");

        // beta is dropped and gamma has an unknown user: nothing may happen
        std::fs::write(
            &conf,
            echo_block("alpha", dir.path(), "default=yes")
                + "[gamma]\nuser=no-such-user-for-serverd\ngroup=0\npath=/srv\nrun=/bin/true\n",
        )
        .unwrap();
        let e = reload(&run_info).unwrap_err();
        assert!(e.to_string().contains("no-such-user-for-serverd"));

        assert_eq!(
            run_info.registry.names(),
            vec!["alpha".to_owned(), "beta".to_owned()]
        );
        assert_eq!(pid_of(&run_info.registry, "alpha"), Some(pid));
        assert!(pid_alive(pid));

        run_info.registry.stop_all();
    });
}
