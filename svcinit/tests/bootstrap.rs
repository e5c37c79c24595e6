//! End-to-end bootstrap runs against a scripted managed service.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::*;
use svcinit::{
    BootstrapPath, BootstrapPhase, ErrorKind, InitError, Method, ProvisionOutcome, VolumeLock,
};
use svcinit_test_utils::Scripted;

use BootstrapPhase::*;

#[tokio::test]
async fn scenario_fresh_install() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(
            STATUS,
            [
                Scripted::network_error(),
                Scripted::status(503),
                Scripted::status(200),
            ],
        )
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(ENDPOINTS, [Scripted::body(200, "[]")])
        .on_post(ENDPOINTS, [Scripted::status(201)]);

    let mut sequencer = harness.sequencer();
    let report = sequencer.run().await.unwrap();

    assert_eq!(sequencer.phase(), Done);
    assert_eq!(
        sequencer.state().phases(),
        vec![
            Fresh,
            WaitingForService,
            CheckingInitialized,
            CreatingAdmin,
            PersistingCredential,
            Authenticating,
            EnsuringResource,
            Done,
        ]
    );
    assert_eq!(report.path, BootstrapPath::Provisioned);
    assert_eq!(report.admin, Some(ProvisionOutcome::Created));
    assert_eq!(report.resource, Some(ProvisionOutcome::Created));
    assert!(report.credential_created);

    // The persisted secret is the one the service accepted and authenticated with
    let init = harness.transport.calls_to(Method::Post, INIT);
    let auth = harness.transport.calls_to(Method::Post, AUTH);
    let secret = harness.read_credential();
    assert_eq!(secret.len(), 16);
    assert_eq!(password_of(&init[0].body_text()), secret);
    assert_eq!(password_of(&auth[0].body_text()), secret);
    assert!(!harness.pending_path().exists());

    // Exactly one endpoint creation, authenticated, form encoded
    let created = harness.transport.calls_to(Method::Post, ENDPOINTS);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].header("Authorization"), Some("Bearer abc"));
    assert_eq!(created[0].body_text(), "Name=local&EndpointCreationType=1");

    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(2); 2]);
    assert!(harness.options.sentinel_path.as_ref().unwrap().exists());
}

#[tokio::test]
async fn scenario_already_initialized() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(204)]);

    let mut sequencer = harness.sequencer();
    let report = sequencer.run().await.unwrap();

    assert_eq!(
        sequencer.state().phases(),
        vec![Fresh, WaitingForService, CheckingInitialized, Done]
    );
    assert_eq!(report.path, BootstrapPath::AlreadyInitialized);
    assert!(!report.credential_created);

    assert_eq!(harness.transport.count(Method::Post, INIT), 0);
    assert_eq!(harness.transport.count(Method::Post, AUTH), 0);
    assert!(!harness.credential_path().exists());
}

#[tokio::test]
async fn scenario_endpoint_conflict_is_success() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(ENDPOINTS, [Scripted::body(200, "null")])
        .on_post(ENDPOINTS, [Scripted::body(409, "endpoint exists")]);

    let mut sequencer = harness.sequencer();
    let report = sequencer.run().await.unwrap();

    assert_eq!(sequencer.phase(), Done);
    assert_eq!(report.resource, Some(ProvisionOutcome::AlreadyExists));
    assert!(sequencer.state().failure.is_none());
    assert_eq!(harness.transport.count(Method::Post, ENDPOINTS), 1);
}

#[tokio::test]
async fn admin_conflict_is_success() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::body(409, "admin exists")])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(ENDPOINTS, [Scripted::body(200, "[]")])
        .on_post(ENDPOINTS, [Scripted::status(200)]);

    let mut sequencer = harness.sequencer();
    let report = sequencer.run().await.unwrap();

    assert_eq!(report.admin, Some(ProvisionOutcome::AlreadyExists));
    assert!(sequencer.state().visited(PersistingCredential));
    assert!(harness.credential_path().exists());
}

#[tokio::test]
async fn existing_credential_and_initialized_service_skips_init() {
    let harness = Harness::new();
    harness.write_credential("Existing-Secret.42");
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(204)]);

    let modified = std::fs::metadata(harness.credential_path())
        .unwrap()
        .modified()
        .unwrap();

    let mut sequencer = harness.sequencer();
    sequencer.run().await.unwrap();

    assert_eq!(harness.transport.count(Method::Post, INIT), 0);
    assert_eq!(harness.read_credential(), "Existing-Secret.42");
    let modified_after = std::fs::metadata(harness.credential_path())
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(modified, modified_after);
}

#[tokio::test]
async fn existing_credential_is_reused_for_uninitialized_service() {
    let harness = Harness::fresh_service();
    harness.write_credential("Existing-Secret.42\n");

    let mut sequencer = harness.sequencer();
    let report = sequencer.run().await.unwrap();

    assert!(!report.credential_created);
    let init = harness.transport.calls_to(Method::Post, INIT);
    assert_eq!(password_of(&init[0].body_text()), "Existing-Secret.42");
    assert_eq!(harness.read_credential(), "Existing-Secret.42\n");
    assert!(!harness.pending_path().exists());
}

#[tokio::test]
async fn readiness_timeout_fails_without_init() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::network_error()])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)]);

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert!(matches!(err, InitError::ReadinessTimeout { .. }));
    assert_eq!(sequencer.phase(), Failed);
    let failure = sequencer.state().failure.clone().unwrap();
    assert_eq!(failure.phase, WaitingForService);
    assert_eq!(sequencer.state().failure_kind(), Some(ErrorKind::ReadinessTimeout));

    assert_eq!(harness.transport.count(Method::Get, CHECK), 0);
    assert_eq!(harness.transport.count(Method::Post, INIT), 0);
    assert!(!harness.credential_path().exists());
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(60));
}

#[tokio::test]
async fn retry_exhaustion_fails_the_run() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::network_error()]);

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert!(matches!(err, InitError::RetriesExhausted { attempts: 5, .. }));
    assert_eq!(sequencer.phase(), Failed);
    assert_eq!(harness.transport.count(Method::Get, CHECK), 5);
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(5); 4]);
}

#[tokio::test]
async fn persistence_happens_before_authentication() {
    let harness = Harness::fresh_service();

    let persisted_at_auth = Arc::new(AtomicBool::new(false));
    let flag = persisted_at_auth.clone();
    let credential_path = harness.credential_path().to_path_buf();
    harness.transport.before(Method::Post, AUTH, move || {
        flag.store(credential_path.exists(), Ordering::SeqCst);
    });

    let mut sequencer = harness.sequencer();
    sequencer.run().await.unwrap();

    assert!(persisted_at_auth.load(Ordering::SeqCst));
}

#[tokio::test]
async fn secret_is_staged_before_admin_init() {
    let harness = Harness::fresh_service();

    let staged_at_init = Arc::new(AtomicBool::new(false));
    let flag = staged_at_init.clone();
    let pending = harness.pending_path();
    let credential_path = harness.credential_path().to_path_buf();
    harness.transport.before(Method::Post, INIT, move || {
        flag.store(pending.exists() && !credential_path.exists(), Ordering::SeqCst);
    });

    harness.sequencer().run().await.unwrap();
    assert!(staged_at_init.load(Ordering::SeqCst));
}

#[tokio::test]
async fn rejected_init_discards_staged_secret() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::body(500, "database locked"), Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(ENDPOINTS, [Scripted::body(200, "[]")])
        .on_post(ENDPOINTS, [Scripted::status(201)]);

    let mut first = harness.sequencer();
    let err = first.run().await.unwrap_err();
    match &err {
        InitError::UnexpectedStatus { step, status, body } => {
            assert_eq!(*step, "admin init");
            assert_eq!(*status, 500);
            assert_eq!(body, "database locked");
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
    assert_eq!(first.state().failure.as_ref().unwrap().phase, CreatingAdmin);
    assert!(!harness.credential_path().exists());
    assert!(!harness.pending_path().exists());

    // A restart offers a new secret and persists the accepted one
    let mut second = harness.sequencer();
    second.run().await.unwrap();

    let init = harness.transport.calls_to(Method::Post, INIT);
    assert_eq!(init.len(), 2);
    assert_ne!(
        password_of(&init[0].body_text()),
        password_of(&init[1].body_text())
    );
    assert_eq!(harness.read_credential(), password_of(&init[1].body_text()));
}

#[tokio::test]
async fn refused_secret_is_never_promoted_on_fast_path() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404), Scripted::status(204)])
        .on_post(INIT, [Scripted::body(400, "password too weak")]);

    let mut first = harness.sequencer();
    let err = first.run().await.unwrap_err();
    assert_eq!(err.exit_code(), 76);
    let refused = password_of(&harness.transport.calls_to(Method::Post, INIT)[0].body_text());

    // The admin account was set up some other way in between
    let mut second = harness.sequencer();
    let report = second.run().await.unwrap();

    assert_eq!(report.path, BootstrapPath::AlreadyInitialized);
    assert!(!report.credential_created);
    assert!(!harness.pending_path().exists());
    match std::fs::read_to_string(harness.credential_path()) {
        Ok(persisted) => assert_ne!(persisted.trim_end(), refused),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
    }
}

#[tokio::test]
async fn unanswered_init_keeps_staged_secret_for_next_run() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::network_error()]);

    let mut first = harness.sequencer();
    let err = first.run().await.unwrap_err();
    assert!(matches!(err, InitError::RetriesExhausted { .. }));
    // The service may have taken it; keep it for the next run
    assert!(harness.pending_path().exists());
    assert!(!harness.credential_path().exists());
}

#[tokio::test]
async fn rejected_auth_fails_after_persisting() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(422, "invalid credentials")]);

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnexpectedStatus);
    assert_eq!(sequencer.state().failure.as_ref().unwrap().phase, Authenticating);
    assert!(harness.credential_path().exists());
    assert_eq!(harness.transport.count(Method::Get, ENDPOINTS), 0);
}

#[tokio::test]
async fn auth_without_jwt_is_invalid_response() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, "{}")]);

    let err = harness.sequencer().run().await.unwrap_err();
    assert!(matches!(err, InitError::InvalidResponse { step: "authenticate", .. }));
}

#[tokio::test]
async fn listed_endpoint_is_not_recreated() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(
            ENDPOINTS,
            [Scripted::body(
                200,
                r#"[{"Id": 2, "Name": "edge-agent", "URL": null, "Type": 4},
                    {"Id": 3, "Name": "local", "URL": "unix:///var/run/docker.sock", "Type": 1}]"#,
            )],
        )
        .on_post(ENDPOINTS, [Scripted::status(201)]);

    let report = harness.sequencer().run().await.unwrap();

    assert_eq!(report.resource, Some(ProvisionOutcome::AlreadyExists));
    assert_eq!(harness.transport.count(Method::Post, ENDPOINTS), 0);
    let listed = harness.transport.calls_to(Method::Get, ENDPOINTS);
    assert_eq!(listed[0].header("authorization"), Some("Bearer abc"));
}

#[tokio::test]
async fn endpoint_creation_failure_fails_the_run() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(ENDPOINTS, [Scripted::body(200, "[]")])
        .on_post(ENDPOINTS, [Scripted::body(500, "docker socket unavailable")]);

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert_eq!(err.exit_code(), 76);
    assert_eq!(
        sequencer.state().failure.as_ref().unwrap().phase,
        EnsuringResource
    );
}

#[tokio::test]
async fn inconclusive_check_uses_sentinel() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(500)]);

    // Without the sentinel the check result is fatal
    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();
    assert!(matches!(
        err,
        InitError::UnexpectedStatus {
            step: "admin check",
            status: 500,
            ..
        }
    ));

    let sentinel = harness.options.sentinel_path.clone().unwrap();
    std::fs::create_dir_all(sentinel.parent().unwrap()).unwrap();
    std::fs::write(&sentinel, "").unwrap();

    let report = harness.sequencer().run().await.unwrap();
    assert_eq!(report.path, BootstrapPath::AlreadyInitialized);
    assert_eq!(harness.transport.count(Method::Post, INIT), 0);
}

#[tokio::test]
async fn sentinel_does_not_override_live_check() {
    let harness = Harness::fresh_service();
    let sentinel = harness.options.sentinel_path.clone().unwrap();
    std::fs::create_dir_all(sentinel.parent().unwrap()).unwrap();
    std::fs::write(&sentinel, "").unwrap();

    let report = harness.sequencer().run().await.unwrap();

    assert_eq!(report.path, BootstrapPath::Provisioned);
    assert_eq!(harness.transport.count(Method::Post, INIT), 1);
}

#[tokio::test]
async fn fast_path_promotes_pending_secret() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(204)]);

    std::fs::create_dir_all(harness.credential_path().parent().unwrap()).unwrap();
    std::fs::write(harness.pending_path(), "Accepted-Before.Crash1").unwrap();

    let report = harness.sequencer().run().await.unwrap();

    assert!(report.credential_created);
    assert_eq!(harness.read_credential(), "Accepted-Before.Crash1");
    assert!(!harness.pending_path().exists());
}

#[tokio::test]
async fn persist_failure_stops_before_auth() {
    let harness = Harness::fresh_service();

    // Something else occupies the credential path once the admin exists
    let credential_path = harness.credential_path().to_path_buf();
    harness.transport.before(Method::Post, INIT, move || {
        let _ = std::fs::create_dir(&credential_path);
    });

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert!(matches!(
        err.kind(),
        ErrorKind::Credential | ErrorKind::CredentialPersist
    ));
    assert_eq!(
        sequencer.state().failure.as_ref().unwrap().phase,
        PersistingCredential
    );
    assert_eq!(harness.transport.count(Method::Post, AUTH), 0);
}

#[tokio::test]
async fn unwritable_volume_aborts_before_network() {
    let mut harness = Harness::fresh_service();
    let blocker = harness.volume.path().join("not-a-directory");
    std::fs::write(&blocker, "").unwrap();
    harness.options.credential_path = blocker.join("credential");

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialPersist);
    assert_eq!(sequencer.phase(), Failed);
    assert!(harness.transport.calls().is_empty());
}

#[tokio::test]
async fn second_instance_is_locked_out() {
    let harness = Harness::fresh_service();
    let _held = VolumeLock::acquire(harness.credential_path().parent().unwrap()).unwrap();

    let err = harness.sequencer().run().await.unwrap_err();

    assert!(matches!(err, InitError::Locked(_)));
    assert_eq!(err.exit_code(), 75);
    assert!(harness.transport.calls().is_empty());
}

#[tokio::test]
async fn overall_deadline_is_enforced() {
    let mut harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::Hang]);
    harness.options.bootstrap_timeout = Some(Duration::from_millis(50));

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert!(matches!(err, InitError::DeadlineExceeded(_)));
    assert_eq!(sequencer.phase(), Failed);
}

#[tokio::test]
async fn cancelled_run_fails_with_cancelled() {
    let harness = Harness::fresh_service();
    harness.cancel.cancel();

    let mut sequencer = harness.sequencer();
    let err = sequencer.run().await.unwrap_err();

    assert!(matches!(err, InitError::Cancelled));
    assert_eq!(sequencer.phase(), Failed);
    assert!(harness.transport.calls().is_empty());
}

#[tokio::test]
async fn sequencer_runs_once() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(204)]);

    let mut sequencer = harness.sequencer();
    sequencer.run().await.unwrap();

    let err = sequencer.run().await.unwrap_err();
    assert!(matches!(err, InitError::InvalidState(_)));
    assert_eq!(sequencer.phase(), Done);
}

#[tokio::test]
async fn restart_after_success_is_a_no_op() {
    let harness = Harness::new();
    harness
        .transport
        .on_get(STATUS, [Scripted::status(200)])
        .on_get(CHECK, [Scripted::status(404), Scripted::status(204)])
        .on_post(INIT, [Scripted::status(200)])
        .on_post(AUTH, [Scripted::body(200, r#"{"jwt":"abc"}"#)])
        .on_get(ENDPOINTS, [Scripted::body(200, "[]")])
        .on_post(ENDPOINTS, [Scripted::status(201)]);

    harness.sequencer().run().await.unwrap();
    let secret = harness.read_credential();

    let report = harness.sequencer().run().await.unwrap();
    assert_eq!(report.path, BootstrapPath::AlreadyInitialized);
    assert_eq!(harness.read_credential(), secret);
    assert_eq!(harness.transport.count(Method::Post, INIT), 1);
    assert_eq!(harness.transport.count(Method::Post, ENDPOINTS), 1);
}
