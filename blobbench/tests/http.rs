//! Blackbox tests for the HTTP transports against an in-process blob server.

use std::sync::Arc;

use anyhow::Result;
use blobbench::case::{CaseKind, SharedCase};
use blobbench::fixture::Fixtures;
use blobbench::orchestrator::{Orchestrator, Pacing, matrix};
use blobbench::payload::{blob_name, random_payload};
use blobbench::report::TrialRecord;
use blobbench::transport::{AsyncHttpTransport, BlockingHttpTransport, SharedTransport};
use blobbench::{TransferConfig, TransferError};
use blobbench_test::server::TestServer;

const CONTAINER: &str = "bench";

fn transports(server: &TestServer) -> Vec<SharedTransport> {
    vec![
        Arc::new(BlockingHttpTransport::new(
            "http-blocking",
            &server.url(),
            CONTAINER,
        )) as SharedTransport,
        Arc::new(AsyncHttpTransport::new(
            "http-async",
            &server.url(),
            CONTAINER,
        )),
    ]
}

fn no_pacing() -> Pacing {
    Pacing {
        exception_sleep: Default::default(),
        delay_between_tasks: Default::default(),
    }
}

#[test]
fn test_upload_and_download() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::new();

    for transport in transports(&server) {
        transport.reset(4)?;

        let name = format!("{}-blob", transport.name());
        let payload = random_payload(64 * 1024)?;
        transport.upload(&name, &payload)?;
        assert_eq!(server.blob(CONTAINER, &name).as_deref(), Some(&payload[..]));

        let mut buffer = vec![0; payload.len()];
        transport.download(&name, &mut buffer)?;
        assert_eq!(buffer, payload);
    }

    Ok(())
}

#[test]
fn test_download_errors() -> Result<()> {
    let server = TestServer::new();

    for transport in transports(&server) {
        transport.reset(1)?;

        let mut buffer = vec![0; 16];
        let err = transport.download("missing", &mut buffer).unwrap_err();
        assert!(matches!(err, TransferError::NotFound { .. }), "{err}");
        assert_eq!(err.status(), Some(404));

        transport.upload("short", b"abc")?;
        let err = transport.download("short", &mut buffer).unwrap_err();
        assert!(
            matches!(
                err,
                TransferError::SizeMismatch {
                    expected: 16,
                    actual: 3,
                    ..
                }
            ),
            "{err}"
        );

        server.fail_next(1);
        let err = transport.upload("unavailable", b"abc").unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(server.blob(CONTAINER, "unavailable").is_none());
    }

    Ok(())
}

#[test]
fn test_requires_reset() {
    let server = TestServer::new();

    for transport in transports(&server) {
        let err = transport.upload("blob", b"abc").unwrap_err();
        assert!(matches!(err, TransferError::Setup(_)), "{err}");
    }
    assert_eq!(server.requests(), 0);
}

#[test]
fn test_reset_is_idempotent() -> Result<()> {
    let server = TestServer::new();

    for transport in transports(&server) {
        transport.reset(2)?;
        transport.reset(2)?;
        transport.upload("blob", b"abc")?;

        transport.reset(8)?;
        let mut buffer = [0; 3];
        transport.download("blob", &mut buffer)?;
        assert_eq!(&buffer, b"abc");
    }

    Ok(())
}

#[test]
fn test_cases_over_http() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::new();
    let fixtures = Arc::new(Fixtures::new(4));
    let config = TransferConfig::new(1024, 20, 4);

    for transport in transports(&server) {
        let before = server.requests();
        let result = CaseKind::Download
            .build(&fixtures)
            .run(transport.as_ref(), &config);
        assert!(!result.failure_observed);
        // one fixture upload plus one request per claimed item
        assert_eq!(server.requests() - before, 21);

        let result = CaseKind::Upload
            .build(&fixtures)
            .run(transport.as_ref(), &config);
        assert!(!result.failure_observed);
    }

    // both transports write the same fixture and the same 20 uploaded names
    assert_eq!(server.blob_count(), 21);
    assert!(server.blob(CONTAINER, &blob_name(1024, 0)).is_some());
    for index in 1..=20 {
        let blob = server.blob(CONTAINER, &blob_name(1024, index)).unwrap();
        assert_eq!(blob.len(), 1024);
    }

    Ok(())
}

#[test]
fn test_failed_attempts_are_retried() {
    blobbench_test::tracing::init();
    let server = TestServer::new();
    let fixtures = Arc::new(Fixtures::default());

    let cases: Vec<SharedCase> = vec![CaseKind::Upload.build(&fixtures)];
    let entries = matrix(
        &[TransferConfig::new(256, 10, 2)],
        &transports(&server)[..1],
        &cases,
    );
    let orchestrator = Orchestrator::new(entries, 1).pacing(no_pacing());

    server.fail_next(2);
    let mut records: Vec<TrialRecord> = Vec::new();
    let stats = orchestrator.run(&mut records);

    assert_eq!(stats.trials, 1);
    assert!(stats.failed_attempts >= 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transport, "http-blocking");
    assert_eq!(records[0].case, "upload");
    assert_eq!(server.blob_count(), 10);
}
