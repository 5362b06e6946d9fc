mod common;

use std::sync::Arc;

use codegen_jobs::dto::TOPIC_PROGRESS;
use codegen_jobs::{ErrorKind, JobStatus, ServiceError};

use common::{
    service, wait_for_status, BrokenSink, FailingMapper, ForgetfulGenerator, GatedParser,
    PanickingMapper, PanickingSink, Workspace,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_operation_spec_completes() {
    let ws = Workspace::new();
    let (service, _bus) = service(ws.collaborators());

    let started = service.start("proj-1").unwrap();
    assert_eq!(started.status, JobStatus::Started);
    assert_eq!(started.progress, 0.0);
    assert!(started.end_time.is_none());

    let job = service.wait(&started.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "errors: {:?}", job.errors);
    assert_eq!(job.progress, 1.0);
    assert!(job.end_time.is_some());
    assert!(job.errors.is_empty());

    let results = job.results.expect("results");
    assert_eq!(results.statistics.total_endpoints, 1);
    assert_eq!(results.statistics.generated_tools, 1);
    assert_eq!(results.statistics.template_version, "test-templates");
    assert_eq!(results.tools[0].name, "ping");
    assert!(results.server_path.is_file());
    assert!(results
        .generated_files
        .iter()
        .any(|f| f.file_type == "server" && f.size > 0 && f.lines_of_code > 0));

    let activity = ws.store.activity("proj-1").unwrap();
    assert_eq!(activity.generation_count, 1);
    assert_eq!(activity.last_status.as_deref(), Some("completed"));
    assert!(service.active("proj-1").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_specification_fails_without_progress() {
    let ws = Workspace::new();
    let (service, _bus) = service(ws.collaborators());

    let started = service.start("proj-2").unwrap();
    let job = service.wait(&started.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 0.0);
    assert!(job.end_time.is_some());
    assert!(job.results.is_none());
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].kind, ErrorKind::StageError);
    assert!(job.errors[0].message.contains("no specification supplied"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mapping_failure_freezes_progress() {
    let ws = Workspace::new();
    let mut collaborators = ws.collaborators();
    collaborators.mapper = Arc::new(FailingMapper);
    let (service, _bus) = service(collaborators);

    let started = service.start("proj-1").unwrap();
    let job = service.wait(&started.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 0.3);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].kind, ErrorKind::StageError);
    assert!(job.errors[0].message.starts_with("mapping stage failed"));
    assert!(job.errors[0].message.contains("unsupported parameter style"));

    // retry is a new start, allowed once the previous job is terminal
    let retry = service.start("proj-1").unwrap();
    assert_ne!(retry.id, job.id);
    service.wait(&retry.id).await.unwrap();
    let ids: Vec<String> = service.list("proj-1").into_iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![job.id, retry.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_validation_failure_at_validating_stage() {
    let ws = Workspace::new();
    let mut collaborators = ws.collaborators();
    collaborators.generator = Arc::new(ForgetfulGenerator);
    let (service, _bus) = service(collaborators);

    let started = service.start("proj-1").unwrap();
    let job = service.wait(&started.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 0.8);
    assert!(job.errors[0].message.starts_with("validating stage failed"));
    assert!(job.errors[0].message.contains("tools.json"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panic_becomes_internal_error() {
    let ws = Workspace::new();
    let mut collaborators = ws.collaborators();
    collaborators.mapper = Arc::new(PanickingMapper);
    let (service, _bus) = service(collaborators);

    let started = service.start("proj-1").unwrap();
    let job = service.wait(&started.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 0.3);
    assert!(job.end_time.is_some());
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].kind, ErrorKind::InternalError);
    assert!(job.errors[0].message.contains("mapper invariant violated"));
    assert!(job.errors[0].detail.is_some());

    // the service keeps working
    assert!(service.start("proj-3").is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_sink_failures_do_not_fail_job() {
    let ws = Workspace::new();
    let mut collaborators = ws.collaborators();
    collaborators.status_sink = Arc::new(BrokenSink);
    let (service, _bus) = service(collaborators);

    let started = service.start("proj-1").unwrap();
    let job = service.wait(&started.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_sink_panics_do_not_strand_job() {
    let ws = Workspace::new();
    let mut collaborators = ws.collaborators();
    collaborators.status_sink = Arc::new(PanickingSink);
    let (service, _bus) = service(collaborators);

    let first = service.start("proj-1").unwrap();
    let job = service.wait(&first.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.end_time.is_some());
    assert!(service.active("proj-1").is_none());

    // failure path reports through the same sink
    let failed = service.start("proj-2").unwrap();
    let job = service.wait(&failed.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.end_time.is_some());

    let second = service.start("proj-1").unwrap();
    assert_eq!(
        service.wait(&second.id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_events_follow_checkpoints() {
    let ws = Workspace::new();
    let (service, bus) = service(ws.collaborators());
    let mut rx = bus.subscribe();

    let started = service.start("proj-1").unwrap();
    service.wait(&started.id).await.unwrap();

    let mut progress = Vec::new();
    let mut topics = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if msg.payload["job_id"] == started.id.as_str() || msg.payload["job"]["id"] == started.id.as_str() {
            topics.push(msg.topic.clone());
        }
        if msg.topic == TOPIC_PROGRESS && msg.payload["job_id"] == started.id.as_str() {
            progress.push(msg.payload["progress"].as_f64().unwrap());
        }
    }

    assert_eq!(progress, vec![0.0, 0.1, 0.3, 0.5, 0.8, 1.0]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(topics.iter().filter(|t| *t == "job.started").count(), 1);
    assert_eq!(topics.last().map(String::as_str), Some("job.completed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_single_job() {
    let ws = Workspace::new();
    let gated = Arc::new(GatedParser::new(ws.parser()));
    let mut collaborators = ws.collaborators();
    collaborators.parser = gated.clone();
    let (service, _bus) = service(collaborators);

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.start("proj-3") })
        })
        .collect();

    let mut created = Vec::new();
    let mut conflicts = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(job) => created.push(job),
            Err(ServiceError::Conflict { project_id, .. }) => {
                assert_eq!(project_id, "proj-3");
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(created.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(service.list("proj-3").len(), 1);

    gated.gate.add_permits(1);
    let job = service.wait(&created[0].id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_rejects_blank_project_id() {
    let ws = Workspace::new();
    let (service, _bus) = service(ws.collaborators());

    for id in ["", "   "] {
        assert!(matches!(service.start(id), Err(ServiceError::Validation(_))));
    }
    assert!(matches!(service.get("job_missing"), Err(ServiceError::NotFound(_))));
    assert!(service.list("proj-1").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_project_fails_job() {
    let ws = Workspace::new();
    let (service, _bus) = service(ws.collaborators());

    let started = service.start("ghost").unwrap();
    let job = service.wait(&started.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.errors[0].message.contains("project ghost not found"));
    assert_eq!(job.progress, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_status_sees_committed_stage() {
    let ws = Workspace::new();
    let gated = Arc::new(GatedParser::new(ws.parser()));
    let mut collaborators = ws.collaborators();
    collaborators.parser = gated.clone();
    let (service, _bus) = service(collaborators);

    let started = service.start("proj-1").unwrap();
    let parsing = wait_for_status(&service, &started.id, JobStatus::Parsing).await;
    assert_eq!(parsing.progress, 0.1);
    assert_eq!(parsing.current_step, "Parsing API specification");
    assert!(matches!(
        service.start("proj-1"),
        Err(ServiceError::Conflict { .. })
    ));

    gated.gate.add_permits(1);
    assert_eq!(
        service.wait(&started.id).await.unwrap().status,
        JobStatus::Completed
    );
}
