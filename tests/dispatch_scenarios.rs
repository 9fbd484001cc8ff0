//! End-to-end dispatch scenarios over in-memory adapters.
//!
//! Each test drives the public entry points: triggers enumerate render jobs, the
//! render-job consumer runs phase 2, and tasks are read back off the worker queues.

mod support;

use fleet_dispatch::infra::DeadLetterQueue;
use fleet_dispatch::core::{AuditAction, DispatchError, RenderJob, TimedFrequency, Trigger};
use fleet_dispatch::runtime::{handle_store_event, handle_timed_event, Disposition, RenderJobConsumer};
use serde_json::json;
use support::*;

const TAG_TEMPLATE: &str = r#"
TemplateName: prod-owner-tags
TemplateDescription: Tag production accounts with their owner
TagKey: owner
IncludeAccounts:
  ByTags:
    - Name: env
      Value: prod
"#;

const BASELINE_TEMPLATE: &str = r#"
TemplateName: baseline
TemplateDescription: Baseline in every member account
IncludeAccounts:
  AllAccounts: true
IncludeRegions: [us-east-1, us-west-2]
DefaultConfiguration:
  Level: 1
  Owner: "{{ account_name }}-team"
AccountOverrideConfigurations:
  - IncludeAccounts:
      ByIds: ["222222222222"]
    IncludeRegions: [us-east-1]
    Level: 5
"#;

async fn drain(consumer: &RenderJobConsumer) -> Vec<Disposition> {
    let mut out = Vec::new();
    while let Some(disposition) = consumer.poll_once().await.expect("queue reachable") {
        out.push(disposition);
    }
    out
}

#[tokio::test]
async fn tag_filter_fans_out_to_the_matching_account() {
    let harness = Harness::new();
    harness.put_template("Tagger/prod.yaml", TAG_TEMPLATE);

    let summary = handle_timed_event(&harness.dispatcher, "HOURLY").await.unwrap();
    assert_eq!(summary.jobs, vec![RenderJob::new(TAGGER, "Tagger/prod.yaml")]);

    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(drain(&consumer).await, vec![Disposition::Acked]);

    let tasks = harness.tasks(TAGGER_QUEUE);
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.account_id.as_deref(), Some(ALPHA));
    assert_eq!(task.region, None);
    assert_eq!(task.rendered_payload["AssignedAccount"], ALPHA);
    assert_eq!(task.rendered_payload["AssignedAccountName"], "alpha");
    assert_eq!(task.rendered_payload["TagKey"], "owner");
    assert!(task.rendered_payload.get("IncludeAccounts").is_some());
    assert!(harness.queue(FAN_OUT).is_empty());
}

#[tokio::test]
async fn override_block_applies_only_to_its_targets() {
    let harness = Harness::new();
    harness.put_template("Baseline/main.yaml", BASELINE_TEMPLATE);

    let tasks = harness
        .dispatcher
        .render(&RenderJob::new(BASELINE, "Baseline/main.yaml"))
        .await
        .unwrap();
    let targets = by_target(&tasks);

    // The org root is left out without OperateInOrgRoot.
    assert_eq!(targets.len(), 4);
    assert!(!targets.keys().any(|(account, _)| account == ROOT));

    let level = |account: &str, region: &str| {
        targets[&(account.to_string(), region.to_string())].rendered_payload["Configuration"]["Level"]
            .clone()
    };
    assert_eq!(level(BRAVO, EAST), json!(5));
    assert_eq!(level(BRAVO, WEST), json!(1));
    assert_eq!(level(ALPHA, EAST), json!(1));
    assert_eq!(level(ALPHA, WEST), json!(1));

    let alpha_east = &targets[&(ALPHA.to_string(), EAST.to_string())].rendered_payload;
    assert_eq!(alpha_east["Configuration"]["Owner"], "alpha-team");
    assert_eq!(alpha_east["AssignedRegion"], EAST);
    assert!(alpha_east.get("DefaultConfiguration").is_none());
    assert!(alpha_east.get("AccountOverrideConfigurations").is_none());

    let bravo_east = &targets[&(BRAVO.to_string(), EAST.to_string())].rendered_payload;
    assert!(bravo_east["Configuration"].get("Owner").is_none());
}

#[tokio::test]
async fn overlapping_overrides_are_dead_lettered_without_tasks() {
    let harness = Harness::new();
    harness.put_template(
        "Baseline/overlap.yaml",
        r#"
TemplateName: overlap
TemplateDescription: Two overrides hit bravo in us-east-1
IncludeAccounts: { AllAccounts: true }
IncludeRegions: [ALL]
DefaultConfiguration: { Level: 1 }
AccountOverrideConfigurations:
  - IncludeAccounts: { ByNames: [bravo] }
    IncludeRegions: [ALL]
    Level: 2
  - IncludeAccounts: { ByTags: [{ Name: env, Value: dev }] }
    IncludeRegions: [us-east-1]
    Level: 3
"#,
    );

    let err = harness
        .dispatcher
        .render(&RenderJob::new(BASELINE, "Baseline/overlap.yaml"))
        .await
        .unwrap_err();
    match &err {
        DispatchError::Overlap(report) => {
            assert_eq!(report.entries.len(), 1);
            assert_eq!((report.entries[0].first, report.entries[0].second), (0, 1));
        }
        other => panic!("expected overlap, got {other:?}"),
    }

    handle_store_event(&harness.dispatcher, "Baseline/overlap.yaml")
        .await
        .unwrap();
    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(drain(&consumer).await, vec![Disposition::DeadLettered]);
    assert!(harness.tasks(BASELINE_QUEUE).is_empty());

    let dead = harness.dead_letters.fetch(FAN_OUT, None);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].receive_count, 1);
    assert!(dead[0].reason.contains("overlapping"));
    assert_eq!(
        RenderJob::from_body(&dead[0].body).unwrap().template_key,
        "Baseline/overlap.yaml"
    );
    assert_eq!(harness.audit.events_with(AuditAction::DeadLettered).len(), 1);
}

#[tokio::test]
async fn schema_errors_dead_letter_on_first_delivery() {
    let harness = Harness::new();
    harness.put_template(
        "Tagger/broken.yaml",
        "TemplateName: broken\nTagKey: owner\nIncludeAccounts: { AllAccounts: true }\n",
    );
    handle_timed_event(&harness.dispatcher, "HOURLY").await.unwrap();

    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(drain(&consumer).await, vec![Disposition::DeadLettered]);

    let dead = harness.dead_letters.list();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("TemplateDescription"), "{}", dead[0].reason);
}

#[tokio::test]
async fn org_root_needs_both_inclusion_and_opt_in() {
    let harness = Harness::new();
    let template = |opt_in: bool| {
        format!(
            "TemplateName: root\nTemplateDescription: root only\nTagKey: k\n\
             IncludeAccounts: {{ ByIds: [\"{ROOT}\"] }}\nOperateInOrgRoot: {opt_in}\n"
        )
    };

    harness.put_template("Tagger/root.yaml", &template(false));
    let job = RenderJob::new(TAGGER, "Tagger/root.yaml");
    assert!(harness.dispatcher.render(&job).await.unwrap().is_empty());

    harness.put_template("Tagger/root.yaml", &template(true));
    let tasks = harness.dispatcher.render(&job).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].account_id.as_deref(), Some(ROOT));
}

#[tokio::test]
async fn exclusion_wins_over_inclusion() {
    let harness = Harness::new();
    harness.put_template(
        "Tagger/all.yaml",
        &format!(
            "TemplateName: all\nTemplateDescription: all but alpha\nTagKey: k\n\
             IncludeAccounts: {{ AllAccounts: true }}\n\
             ExcludeAccounts: {{ ByIds: [\"{ALPHA}\"], ByOrgUnits: [Production] }}\n"
        ),
    );
    let tasks = harness
        .dispatcher
        .render(&RenderJob::new(TAGGER, "Tagger/all.yaml"))
        .await
        .unwrap();
    let accounts: Vec<_> = tasks.iter().filter_map(|t| t.account_id.as_deref()).collect();
    assert_eq!(accounts, vec![BRAVO]);
}

#[tokio::test]
async fn all_accounts_in_exclude_is_malformed() {
    let harness = Harness::new();
    harness.put_template(
        "Tagger/bad.yaml",
        "TemplateName: bad\nTemplateDescription: d\nTagKey: k\n\
         IncludeAccounts: { AllAccounts: true }\nExcludeAccounts: { AllAccounts: true }\n",
    );
    let err = harness
        .dispatcher
        .render(&RenderJob::new(TAGGER, "Tagger/bad.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::MalformedFilter(_)), "{err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn region_none_yields_no_tasks() {
    let harness = Harness::new();
    harness.put_template(
        "Baseline/none.yaml",
        "TemplateName: none\nTemplateDescription: d\nIncludeAccounts: { AllAccounts: true }\n\
         IncludeRegions: [NONE]\nDefaultConfiguration: { Level: 1 }\n",
    );
    let tasks = harness
        .dispatcher
        .render(&RenderJob::new(BASELINE, "Baseline/none.yaml"))
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn scope_to_regions_narrows_every_template() {
    let mut cfg = config();
    cfg.scope_to_regions.insert(WEST.to_string());
    let harness = Harness::with_config(cfg);
    harness.put_template("Baseline/main.yaml", BASELINE_TEMPLATE);

    let tasks = harness
        .dispatcher
        .render(&RenderJob::new(BASELINE, "Baseline/main.yaml"))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.region.as_deref() == Some(WEST)));
}

#[tokio::test]
async fn single_worker_runs_from_store_events_without_account_context() {
    let harness = Harness::new();
    harness.put_template(
        "Mirror/my repo.yaml",
        "TemplateName: mirror\nTemplateDescription: d\nRepository: infra\n",
    );

    let summary = handle_store_event(&harness.dispatcher, "Mirror/my+repo.yaml")
        .await
        .unwrap();
    assert_eq!(summary.jobs, vec![RenderJob::new(MIRROR, "Mirror/my repo.yaml")]);

    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(drain(&consumer).await, vec![Disposition::Acked]);

    let tasks = harness.tasks(MIRROR_QUEUE);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].account_id, None);
    assert_eq!(tasks[0].region, None);
    assert_eq!(tasks[0].rendered_payload["Repository"], "infra");
    assert!(tasks[0].rendered_payload.get("AssignedAccount").is_none());
}

#[tokio::test]
async fn store_events_are_filtered_before_emission() {
    let harness = Harness::new();
    let dispatcher = &harness.dispatcher;

    // Not a template.
    let summary = handle_store_event(dispatcher, "Mirror/readme.md").await.unwrap();
    assert!(summary.jobs.is_empty());
    // No worker owns the prefix.
    let summary = handle_store_event(dispatcher, "Unknown/a.yaml").await.unwrap();
    assert!(summary.jobs.is_empty());
    // The owning worker is timed only.
    let summary = handle_store_event(dispatcher, "Tagger/a.yaml").await.unwrap();
    assert!(summary.jobs.is_empty());

    assert!(harness.queue(FAN_OUT).is_empty());
}

#[tokio::test]
async fn timed_trigger_only_selects_matching_frequency() {
    let harness = Harness::new();
    harness.put_template("Tagger/prod.yaml", TAG_TEMPLATE);
    harness.put_template("Baseline/main.yaml", BASELINE_TEMPLATE);
    harness.put_template("Mirror/repo.yaml", "TemplateName: m\nTemplateDescription: d\nRepository: r\n");

    let summary = harness
        .dispatcher
        .enumerate(&Trigger::Timed(TimedFrequency::Daily))
        .await
        .unwrap();
    assert_eq!(summary.workers, 0);
    assert!(summary.jobs.is_empty());

    let summary = handle_timed_event(&harness.dispatcher, "HOURLY").await.unwrap();
    assert_eq!(summary.workers, 2);
    let mut keys: Vec<_> = harness.render_jobs().into_iter().map(|j| j.template_key).collect();
    keys.sort();
    assert_eq!(keys, vec!["Baseline/main.yaml", "Tagger/prod.yaml"]);
}

#[tokio::test]
async fn unknown_frequency_label_is_rejected() {
    let harness = Harness::new();
    let err = handle_timed_event(&harness.dispatcher, "FORTNIGHTLY").await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidMessage(_)));
}

#[tokio::test]
async fn render_jobs_are_emitted_in_batches_of_ten() {
    let harness = Harness::new();
    for i in 0..25 {
        harness.put_template(&format!("Tagger/t{i:02}.yaml"), TAG_TEMPLATE);
    }
    let summary = handle_timed_event(&harness.dispatcher, "HOURLY").await.unwrap();
    assert_eq!(summary.jobs.len(), 25);
    assert_eq!(harness.queue(FAN_OUT).len(), 25);
    assert_eq!(harness.audit.events_with(AuditAction::Enumerated).len(), 25);
}

/// Splits the queue's bodies into the two deliveries and compares them as multisets.
fn assert_two_identical_deliveries(harness: &Harness, queue: &str, per_delivery: usize) {
    let bodies = harness.queue(queue).bodies();
    assert_eq!(bodies.len(), per_delivery * 2);
    let (first, second) = bodies.split_at(per_delivery);
    let mut first = first.to_vec();
    let mut second = second.to_vec();
    first.sort_unstable();
    second.sort_unstable();
    assert_eq!(first, second);
}

#[tokio::test]
async fn redelivered_account_region_job_enqueues_the_same_tasks() {
    let harness = Harness::new();
    harness.put_template("Baseline/main.yaml", BASELINE_TEMPLATE);
    for _ in 0..2 {
        handle_store_event(&harness.dispatcher, "Baseline/main.yaml")
            .await
            .unwrap();
    }
    assert_eq!(harness.render_jobs().len(), 2);

    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(consumer.poll_once().await.unwrap(), Some(Disposition::Acked));
    assert_eq!(harness.queue(BASELINE_QUEUE).len(), 4);
    assert_eq!(consumer.poll_once().await.unwrap(), Some(Disposition::Acked));
    assert_eq!(consumer.poll_once().await.unwrap(), None);

    assert_two_identical_deliveries(&harness, BASELINE_QUEUE, 4);
}

#[tokio::test]
async fn redelivered_account_job_enqueues_the_same_tasks() {
    let harness = Harness::new();
    harness.put_template(
        "Tagger/all.yaml",
        "TemplateName: t\nTemplateDescription: d\nTagKey: owner\n\
         IncludeAccounts: { AllAccounts: true }\n",
    );
    for _ in 0..2 {
        handle_timed_event(&harness.dispatcher, "HOURLY").await.unwrap();
    }

    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(drain(&consumer).await, vec![Disposition::Acked; 2]);

    assert_two_identical_deliveries(&harness, TAGGER_QUEUE, 2);
    let tasks = harness.tasks(TAGGER_QUEUE);
    assert!(tasks.iter().all(|t| t.region.is_none()));
}

#[tokio::test]
async fn override_without_include_regions_is_a_schema_error() {
    let harness = Harness::new();
    harness.put_template(
        "Baseline/no-regions.yaml",
        r#"
TemplateName: no-regions
TemplateDescription: Override that names no regions
IncludeAccounts: { AllAccounts: true }
IncludeRegions: [ALL]
DefaultConfiguration: { Level: 1 }
AccountOverrideConfigurations:
  - IncludeAccounts: { ByNames: [bravo] }
    Level: 2
"#,
    );

    handle_store_event(&harness.dispatcher, "Baseline/no-regions.yaml")
        .await
        .unwrap();
    let consumer = RenderJobConsumer::new(harness.dispatcher.clone()).unwrap();
    assert_eq!(drain(&consumer).await, vec![Disposition::DeadLettered]);
    assert!(harness.tasks(BASELINE_QUEUE).is_empty());

    let dead = harness.dead_letters.fetch(FAN_OUT, None);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].receive_count, 1);
    assert!(dead[0].reason.contains("AccountOverrideConfigurations[0].IncludeRegions"));
}

#[tokio::test]
async fn jobs_for_unregistered_workers_are_rejected() {
    let harness = Harness::new();
    let err = harness
        .dispatcher
        .render(&RenderJob::new("GhostWorker", "Ghost/a.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownWorker(_)));

    let err = harness
        .dispatcher
        .render(&RenderJob::new(TAGGER, "Baseline/main.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidMessage(_)));
}

#[tokio::test]
async fn process_records_audit_trail() {
    let harness = Harness::new();
    harness.put_template("Tagger/prod.yaml", TAG_TEMPLATE);
    let count = harness
        .dispatcher
        .process(&RenderJob::new(TAGGER, "Tagger/prod.yaml"))
        .await
        .unwrap();
    assert_eq!(count, 1);

    let rendered = harness.audit.events_with(AuditAction::Rendered);
    let enqueued = harness.audit.events_with(AuditAction::Enqueued);
    assert_eq!(rendered.len(), 1);
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].template_key.as_deref(), Some("Tagger/prod.yaml"));
    assert_eq!(enqueued[0].worker, TAGGER);
}
