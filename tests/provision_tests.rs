//! Build root provisioning, mount lifecycle and in-root configuration.

mod helpers;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use helpers::{assert_file_contains, assert_file_exists, write, FakeRunner, TestEnv};
use livecd_builder::chroot::{configure_system, install_packages, provision, standard_mounts};
use livecd_builder::error::BuildError;
use livecd_builder::process::Cmd;

fn expected_targets(env: &TestEnv) -> Vec<PathBuf> {
    let layout = env.layout();
    standard_mounts(&layout.build_root(), &layout.snapshot())
        .into_iter()
        .map(|spec| spec.target)
        .collect()
}

// =============================================================================
// Provisioning and teardown
// =============================================================================

#[test]
fn test_mounts_are_released_in_reverse_order() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new();
    let ctx = env.context(&runner);

    let root = provision(&ctx).unwrap();
    let expected = expected_targets(&env);
    assert_eq!(root.mounts(), expected.as_slice());
    assert_file_exists(&env.layout().extraction_marker());
    assert_file_contains(&root.path().join("etc/resolv.conf"), "192.0.2.53");
    assert_eq!(root.teardown(), 0);

    assert_eq!(runner.targets_of("mount"), expected);
    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(runner.targets_of("umount"), reversed);
}

#[test]
fn test_tar_preserves_ownership_and_xattrs() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new();
    let ctx = env.context(&runner);
    provision(&ctx).unwrap().teardown();

    let tar = runner
        .calls()
        .into_iter()
        .find(|c| c.program() == "tar")
        .expect("tar should run");
    let args = tar.get_args();
    assert!(args.iter().any(|a| a == "--numeric-owner"));
    assert!(args.iter().any(|a| a.starts_with("--xattrs-include")));
    assert_eq!(tar.arg_after("-C"), env.layout().build_root().to_str());
}

#[test]
fn test_dropping_the_root_releases_every_mount() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new();
    let ctx = env.context(&runner);

    {
        let _root = provision(&ctx).unwrap();
    }
    assert_eq!(runner.count("umount"), expected_targets(&env).len());
}

#[test]
fn test_failed_mount_releases_only_what_was_established() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new().fail_on("mount -t proc", 32);
    let ctx = env.context(&runner);

    let Err(err) = provision(&ctx) else {
        panic!("provision should fail when proc cannot be mounted");
    };
    assert_eq!(err.kind(), "mount");

    let expected = expected_targets(&env);
    assert_eq!(runner.targets_of("mount"), expected[..4].to_vec());
    let released: Vec<PathBuf> = expected[..3].iter().rev().cloned().collect();
    assert_eq!(runner.targets_of("umount"), released);
}

#[test]
fn test_missing_inputs_fail_before_any_command() {
    let env = TestEnv::new();
    let runner = FakeRunner::new();
    let ctx = env.context(&runner);

    match provision(&ctx) {
        Err(BuildError::Precondition { remedy, .. }) => assert_eq!(remedy, "livecd fetch-seed"),
        Err(other) => panic!("expected Precondition, got {other:?}"),
        Ok(_) => panic!("provision should fail without a seed"),
    }
    assert!(runner.calls().is_empty());
}

#[test]
fn test_extracted_root_is_reused() {
    let env = TestEnv::new();
    env.seed_inputs();

    let first = FakeRunner::new();
    let ctx = env.context(&first);
    provision(&ctx).unwrap().teardown();
    assert_eq!(first.count("tar"), 1);

    let second = FakeRunner::new();
    let ctx = env.context(&second);
    provision(&ctx).unwrap().teardown();
    assert_eq!(second.count("tar"), 0);
    assert_eq!(second.count("mount"), 7);
}

#[test]
fn test_partial_extraction_is_wiped() {
    let env = TestEnv::new();
    env.seed_inputs();
    let leftover = env.layout().build_root().join("usr/half-written");
    write(&leftover, b"partial");

    let runner = FakeRunner::new();
    let ctx = env.context(&runner);
    provision(&ctx).unwrap().teardown();

    assert!(!leftover.exists());
    assert_eq!(runner.count("tar"), 1);
    assert_file_exists(&env.layout().extraction_marker());
}

#[test]
fn test_interrupt_during_mounting_tears_down() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new().interrupt_after("mount -t proc");
    let ctx = env.context(&runner);

    let Err(err) = provision(&ctx) else {
        panic!("provision should stop on interrupt");
    };
    assert!(matches!(err, BuildError::Interrupted), "got {err:?}");

    // proc was mounted before the signal was seen, so it is released too.
    let expected = expected_targets(&env);
    assert_eq!(runner.targets_of("mount"), expected[..4].to_vec());
    let released: Vec<PathBuf> = expected[..4].iter().rev().cloned().collect();
    assert_eq!(runner.targets_of("umount"), released);
}

// =============================================================================
// Command policy
// =============================================================================

#[test]
fn test_advisory_failure_continues_and_mandatory_aborts() {
    let env = TestEnv::new();
    let runner = FakeRunner::new().fail_on("flaky-tool", 3);
    let ctx = env.context(&runner);

    let result = ctx.run(Cmd::new("flaky-tool").advisory()).unwrap();
    assert_eq!(result.code(), 3);

    match ctx.run(Cmd::new("flaky-tool")).unwrap_err() {
        BuildError::CommandFailed { code, .. } => assert_eq!(code, 3),
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[test]
fn test_accepted_exit_code_is_not_a_warning() {
    let env = TestEnv::new();
    let runner = FakeRunner::new().fail_on("flaky-tool", 1);
    let ctx = env.context(&runner);
    ctx.begin_stage("Policy");
    let log = ctx.log().path_for("policy");

    let result = ctx.run(Cmd::new("flaky-tool").accept_exit(1)).unwrap();
    assert_eq!(result.code(), 1);
    assert!(!fs::read_to_string(&log).unwrap().contains("advisory step failed"));

    ctx.run(Cmd::new("flaky-tool").advisory()).unwrap();
    assert_file_contains(&log, "! advisory step failed (exit code 1), continuing");
}

#[test]
fn test_commands_are_logged_per_stage() {
    let env = TestEnv::new();
    let runner = FakeRunner::new();
    let ctx = env.context(&runner);

    ctx.begin_stage("Provision");
    ctx.run(Cmd::new("mount").args(["--bind", "/dev", "/r/dev"])).unwrap();
    let log = ctx.log().path_for("provision");
    assert_file_contains(&log, "$ mount --bind /dev /r/dev");
}

// =============================================================================
// Configuration and packages
// =============================================================================

#[test]
fn test_configuration_writes_identity_and_hides_passwords() {
    let mut env = TestEnv::new();
    env.seed_inputs();
    env.config.password = "s3cret-user".into();
    env.config.root_password = "s3cret-root".into();
    let runner = FakeRunner::new();
    let ctx = env.context(&runner);

    let root = provision(&ctx).unwrap();
    configure_system(&ctx, root.path()).unwrap();

    let path = root.path().to_path_buf();
    assert_file_contains(&path.join("etc/hostname"), "livecd");
    assert_file_contains(&path.join("etc/hosts"), "127.0.1.1");
    let sudoers = path.join("etc/sudoers.d/livecd");
    assert_file_contains(&sudoers, "%wheel ALL=(ALL:ALL) NOPASSWD: ALL");
    let mode = fs::metadata(&sudoers).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o440);

    assert!(!path.join("tmp/.livecd-credentials").exists());
    assert!(runner.ran("locale-gen"));
    assert!(runner.ran("useradd"));
    assert!(runner.ran("chpasswd"));
    assert!(runner.ran("rc-update add sshd default"));
    assert!(
        !runner.lines().iter().any(|l| l.contains("s3cret")),
        "passwords must not reach a command line"
    );
    assert_eq!(root.teardown(), 0);
}

#[test]
fn test_service_failure_is_advisory() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new().fail_on("rc-update add sshd", 1);
    let ctx = env.context(&runner);

    let root = provision(&ctx).unwrap();
    assert!(configure_system(&ctx, root.path()).is_ok());
}

#[test]
fn test_locale_failure_aborts_and_still_unmounts() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new().fail_on("locale-gen", 1);
    let ctx = env.context(&runner);

    let result = {
        let root = provision(&ctx).unwrap();
        configure_system(&ctx, root.path())
    };
    assert_eq!(result.unwrap_err().kind(), "command");
    assert_eq!(runner.count("umount"), 7);
}

#[test]
fn test_failed_package_does_not_stop_the_rest() {
    let env = TestEnv::new();
    env.seed_inputs();
    let runner = FakeRunner::new().fail_on("app-editors/nano", 1);
    let ctx = env.context(&runner);

    let root = provision(&ctx).unwrap();
    let report = install_packages(&ctx, root.path()).unwrap();
    assert_eq!(report.failed, vec!["app-editors/nano"]);
    assert_eq!(report.installed, vec!["app-admin/sudo"]);
    assert!(!report.all_installed());
}
