//! End-to-end tests for the ingestion pipeline.
//!
//! Each test builds a fresh in-memory database, seeds monitorees and
//! threshold definitions, and feeds raw JSON through `AssessmentProcessor`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use assessment_intake::config::IntakeConfig;
use assessment_intake::error::DatabaseError;
use assessment_intake::model::{
    HistoryEntry, HistoryKind, Monitoree, Report, SymptomValue, ThresholdDefinition,
    ThresholdOperator, ThresholdSymptom, WhoReported,
};
use assessment_intake::pipeline::{AssessmentProcessor, IntakeOutcome, spawn_consumer};
use assessment_intake::store::{Database, LibSqlBackend};

const JURISDICTION: &str = "usa.state1";

fn schema(fever_at: f64) -> Vec<ThresholdSymptom> {
    vec![
        ThresholdSymptom::new("cough", "Cough", SymptomValue::Bool(Some(true))),
        ThresholdSymptom::new("loss_of_smell", "Loss of smell", SymptomValue::Bool(Some(true))),
        ThresholdSymptom::new("temperature", "Temperature", SymptomValue::Float(Some(fever_at))),
        ThresholdSymptom::new("spo2", "Oxygen saturation", SymptomValue::Integer(Some(92)))
            .with_operator(ThresholdOperator::LessThan),
    ]
}

async fn setup() -> (Arc<dyn Database>, AssessmentProcessor, ThresholdDefinition) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let threshold = ThresholdDefinition::new(JURISDICTION, schema(100.4));
    assert!(db.insert_threshold_definition(&threshold).await.unwrap());
    let processor = AssessmentProcessor::new(Arc::clone(&db), &IntakeConfig::default());
    (db, processor, threshold)
}

async fn seed(db: &Arc<dyn Database>, monitoree: Monitoree) -> Monitoree {
    db.insert_monitoree(&monitoree).await.unwrap();
    monitoree
}

#[tokio::test]
async fn replay_inside_window_yields_one_report() {
    let (db, processor, threshold) = setup().await;
    let m = seed(&db, Monitoree::new(JURISDICTION, "abc123")).await;

    let raw = json!({
        "patient_submission_token": "abc123",
        "threshold_condition_hash": threshold.hash,
        "reported_symptoms_array": [
            {"name": "cough", "type": "bool", "value": false},
            {"name": "temperature", "type": "float", "value": 98.7},
        ],
    })
    .to_string();

    assert_eq!(processor.consume(&raw).await.report_count(), 1);
    assert!(matches!(processor.consume(&raw).await, IntakeOutcome::Duplicate { .. }));
    assert_eq!(db.list_reports(m.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn replay_after_window_is_accepted() {
    let (db, _, threshold) = setup().await;
    let config = IntakeConfig {
        reporting_cooldown: Duration::ZERO,
        ..IntakeConfig::default()
    };
    let processor = AssessmentProcessor::new(Arc::clone(&db), &config);
    let m = seed(&db, Monitoree::new(JURISDICTION, "abc123")).await;

    let raw = json!({
        "patient_submission_token": "abc123",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": false,
    })
    .to_string();

    assert_eq!(processor.consume(&raw).await.report_count(), 1);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(processor.consume(&raw).await.report_count(), 1);
    assert_eq!(db.list_reports(m.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn report_is_pinned_to_referenced_threshold() {
    let (db, processor, h1) = setup().await;
    let m = seed(&db, Monitoree::new(JURISDICTION, "abc123")).await;

    // The jurisdiction lowers its fever threshold after the reminder went out.
    let h2 = ThresholdDefinition::new(JURISDICTION, schema(99.0));
    assert_ne!(h1.hash, h2.hash);
    db.insert_threshold_definition(&h2).await.unwrap();
    assert_eq!(
        db.latest_threshold_for_jurisdiction(JURISDICTION)
            .await
            .unwrap()
            .unwrap()
            .hash,
        h2.hash
    );

    let raw = json!({
        "patient_submission_token": "abc123",
        "threshold_condition_hash": h1.hash,
        "reported_symptoms_array": [{"name": "temperature", "type": "float", "value": 99.5}],
    });
    assert_eq!(processor.consume(&raw.to_string()).await.report_count(), 1);

    let reports = db.list_reports(m.id).await.unwrap();
    assert_eq!(reports[0].condition.threshold_hash, h1.hash);
    // 99.5 is below H1's 100.4 even though it would trip H2.
    assert!(!reports[0].symptomatic);
}

#[tokio::test]
async fn inferred_no_negates_booleans_and_unsets_numbers() {
    let (db, processor, threshold) = setup().await;
    let m = seed(&db, Monitoree::new(JURISDICTION, "abc123")).await;

    let raw = json!({
        "patient_submission_token": "abc123",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": false,
    });
    processor.consume(&raw.to_string()).await;

    let report = &db.list_reports(m.id).await.unwrap()[0];
    assert!(!report.symptomatic);
    for symptom in &report.condition.symptoms {
        let schema = threshold.symptom(&symptom.name).unwrap();
        match (schema.value, symptom.value) {
            (SymptomValue::Bool(Some(t)), SymptomValue::Bool(Some(r))) => assert_eq!(r, !t),
            (SymptomValue::Bool(_), other) => panic!("boolean {} not negated: {other:?}", symptom.name),
            (_, other) => assert!(!other.is_set(), "numeric {} should be unset", symptom.name),
        }
    }
}

#[tokio::test]
async fn inferred_yes_blanks_every_symptom() {
    let (db, processor, threshold) = setup().await;
    let m = seed(&db, Monitoree::new(JURISDICTION, "abc123")).await;

    let raw = json!({
        "patient_submission_token": "abc123",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": true,
    });
    processor.consume(&raw.to_string()).await;

    let report = &db.list_reports(m.id).await.unwrap()[0];
    assert!(report.symptomatic);
    assert_eq!(report.condition.symptoms.len(), threshold.symptoms.len());
    assert!(report.condition.symptoms.iter().all(|s| !s.value.is_set()));
}

#[tokio::test]
async fn household_fan_out_attributes_each_member() {
    let (db, processor, threshold) = setup().await;
    let head = seed(&db, Monitoree::new(JURISDICTION, "head").with_phone("+15555550100")).await;
    let mut members = vec![head.clone()];
    for i in 0..3 {
        members.push(seed(&db, Monitoree::dependent_of(&head, format!("dep-{i}"))).await);
    }
    let closed = seed(&db, Monitoree::dependent_of(&head, "closed").closed()).await;

    let raw = json!({
        "patient_submission_token": "head",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": false,
    });
    let outcome = processor.consume(&raw.to_string()).await;
    assert_eq!(outcome.report_count(), members.len());

    for member in &members {
        let reports = db.list_reports(member.id).await.unwrap();
        assert_eq!(reports.len(), 1, "member {} should have one report", member.id);
        let expected = if member.id == head.id {
            WhoReported::Monitoree
        } else {
            WhoReported::Proxy
        };
        assert_eq!(reports[0].who_reported, expected);
        assert_eq!(reports[0].condition.threshold_hash, threshold.hash);

        let reloaded = db.get_monitoree(member.id).await.unwrap().unwrap();
        assert!(reloaded.latest_assessment.is_some());
    }
    assert!(db.list_reports(closed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn explicit_report_from_head_covers_only_head() {
    let (db, processor, threshold) = setup().await;
    let head = seed(&db, Monitoree::new(JURISDICTION, "head")).await;
    let dep = seed(&db, Monitoree::dependent_of(&head, "dep")).await;

    let raw = json!({
        "patient_submission_token": "head",
        "threshold_condition_hash": threshold.hash,
        "reported_symptoms_array": [{"name": "spo2", "type": "integer", "value": 89}],
    });
    assert_eq!(processor.consume(&raw.to_string()).await.report_count(), 1);

    let reports = db.list_reports(head.id).await.unwrap();
    assert!(reports[0].symptomatic);
    assert!(db.list_reports(dep.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn retired_token_still_resolves() {
    let (db, processor, threshold) = setup().await;
    let m = seed(&db, Monitoree::new(JURISDICTION, "old-token")).await;
    db.rotate_submission_token(m.id, "new-token").await.unwrap();

    let raw = json!({
        "patient_submission_token": "old-token",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": false,
    });
    assert_eq!(processor.consume(&raw.to_string()).await.report_count(), 1);
    // The message's token no longer belongs to anyone, so it is a proxy report.
    assert_eq!(
        db.list_reports(m.id).await.unwrap()[0].who_reported,
        WhoReported::Proxy
    );
}

#[tokio::test]
async fn retired_head_token_fans_out_to_household() {
    let (db, processor, threshold) = setup().await;
    let head = seed(&db, Monitoree::new(JURISDICTION, "old-head")).await;
    let deps = [
        seed(&db, Monitoree::dependent_of(&head, "dep-a")).await,
        seed(&db, Monitoree::dependent_of(&head, "dep-b")).await,
    ];
    db.rotate_submission_token(head.id, "new-head").await.unwrap();

    let raw = json!({
        "patient_submission_token": "old-head",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": true,
    });
    let outcome = processor.consume(&raw.to_string()).await;
    assert!(matches!(outcome, IntakeOutcome::Reported { monitoree_id, .. } if monitoree_id == head.id));
    assert_eq!(outcome.report_count(), 3);

    for id in std::iter::once(head.id).chain(deps.iter().map(|d| d.id)) {
        let reports = db.list_reports(id).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].who_reported, WhoReported::Proxy);
        assert!(reports[0].symptomatic);
    }
}

#[tokio::test]
async fn dependent_token_fans_out_to_household() {
    let (db, processor, threshold) = setup().await;
    let head = seed(&db, Monitoree::new(JURISDICTION, "head")).await;
    let dep = seed(&db, Monitoree::dependent_of(&head, "dep")).await;
    let sibling = seed(&db, Monitoree::dependent_of(&head, "sibling")).await;

    let raw = json!({
        "patient_submission_token": "dep",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": false,
    });
    assert_eq!(processor.consume(&raw.to_string()).await.report_count(), 3);

    for (member, expected) in [
        (&dep, WhoReported::Monitoree),
        (&head, WhoReported::Proxy),
        (&sibling, WhoReported::Proxy),
    ] {
        let reports = db.list_reports(member.id).await.unwrap();
        assert_eq!(reports.len(), 1, "token {} should have one report", member.submission_token);
        assert_eq!(reports[0].who_reported, expected);
    }
}

/// Backend whose first report batch trips a primary-key clash on its last row.
struct ClashingFirstBatch {
    inner: LibSqlBackend,
    tripped: AtomicBool,
}

#[async_trait]
impl Database for ClashingFirstBatch {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }
    async fn insert_monitoree(&self, monitoree: &Monitoree) -> Result<(), DatabaseError> {
        self.inner.insert_monitoree(monitoree).await
    }
    async fn get_monitoree(&self, id: Uuid) -> Result<Option<Monitoree>, DatabaseError> {
        self.inner.get_monitoree(id).await
    }
    async fn get_active_monitoree_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Monitoree>, DatabaseError> {
        self.inner.get_active_monitoree_by_token(token).await
    }
    async fn list_active_household(
        &self,
        responder_id: Uuid,
    ) -> Result<Vec<Monitoree>, DatabaseError> {
        self.inner.list_active_household(responder_id).await
    }
    async fn clear_last_reminder_sent(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.inner.clear_last_reminder_sent(id).await
    }
    async fn mark_reminder_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.inner.mark_reminder_sent(id, at).await
    }
    async fn rotate_submission_token(&self, id: Uuid, new_token: &str) -> Result<(), DatabaseError> {
        self.inner.rotate_submission_token(id, new_token).await
    }
    async fn insert_token_mapping(&self, old_token: &str, new_token: &str) -> Result<(), DatabaseError> {
        self.inner.insert_token_mapping(old_token, new_token).await
    }
    async fn lookup_current_token(&self, old_token: &str) -> Result<Option<String>, DatabaseError> {
        self.inner.lookup_current_token(old_token).await
    }
    async fn insert_threshold_definition(
        &self,
        definition: &ThresholdDefinition,
    ) -> Result<bool, DatabaseError> {
        self.inner.insert_threshold_definition(definition).await
    }
    async fn get_threshold_definition(
        &self,
        hash: &str,
    ) -> Result<Option<ThresholdDefinition>, DatabaseError> {
        self.inner.get_threshold_definition(hash).await
    }
    async fn latest_threshold_for_jurisdiction(
        &self,
        jurisdiction_id: &str,
    ) -> Result<Option<ThresholdDefinition>, DatabaseError> {
        self.inner.latest_threshold_for_jurisdiction(jurisdiction_id).await
    }
    async fn insert_reports(&self, reports: &[Report]) -> Result<(), DatabaseError> {
        if reports.len() > 1 && !self.tripped.swap(true, Ordering::SeqCst) {
            let mut batch = reports.to_vec();
            let first = batch[0].id;
            if let Some(last) = batch.last_mut() {
                last.id = first;
            }
            return self.inner.insert_reports(&batch).await;
        }
        self.inner.insert_reports(reports).await
    }
    async fn latest_report_at(
        &self,
        monitoree_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.inner.latest_report_at(monitoree_id).await
    }
    async fn list_reports(&self, monitoree_id: Uuid) -> Result<Vec<Report>, DatabaseError> {
        self.inner.list_reports(monitoree_id).await
    }
    async fn insert_history(&self, entry: &HistoryEntry) -> Result<(), DatabaseError> {
        self.inner.insert_history(entry).await
    }
    async fn insert_histories(&self, entries: &[HistoryEntry]) -> Result<(), DatabaseError> {
        self.inner.insert_histories(entries).await
    }
    async fn list_history(&self, monitoree_id: Uuid) -> Result<Vec<HistoryEntry>, DatabaseError> {
        self.inner.list_history(monitoree_id).await
    }
    async fn is_number_blocked(&self, phone_number: &str) -> Result<bool, DatabaseError> {
        self.inner.is_number_blocked(phone_number).await
    }
    async fn block_number(&self, phone_number: &str) -> Result<bool, DatabaseError> {
        self.inner.block_number(phone_number).await
    }
    async fn count_blocked(&self, phone_number: &str) -> Result<usize, DatabaseError> {
        self.inner.count_blocked(phone_number).await
    }
}

#[tokio::test]
async fn failed_household_write_leaves_nothing_for_redelivery_to_trip_on() {
    let db: Arc<dyn Database> = Arc::new(ClashingFirstBatch {
        inner: LibSqlBackend::new_memory().await.unwrap(),
        tripped: AtomicBool::new(false),
    });
    let threshold = ThresholdDefinition::new(JURISDICTION, schema(100.4));
    db.insert_threshold_definition(&threshold).await.unwrap();
    let processor = AssessmentProcessor::new(Arc::clone(&db), &IntakeConfig::default());

    let head = seed(&db, Monitoree::new(JURISDICTION, "head")).await;
    let members = [
        head.clone(),
        seed(&db, Monitoree::dependent_of(&head, "dep-a")).await,
        seed(&db, Monitoree::dependent_of(&head, "dep-b")).await,
    ];

    let raw = json!({
        "patient_submission_token": "head",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": false,
    })
    .to_string();

    assert_eq!(processor.consume(&raw).await, IntakeOutcome::Failed);
    for member in &members {
        assert!(db.list_reports(member.id).await.unwrap().is_empty());
        let reloaded = db.get_monitoree(member.id).await.unwrap().unwrap();
        assert!(reloaded.latest_assessment.is_none());
    }

    // At-least-once redelivery of the same message completes the household.
    assert_eq!(processor.consume(&raw).await.report_count(), members.len());
    for member in &members {
        assert_eq!(db.list_reports(member.id).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn no_answer_voice_records_contact_attempt() {
    let (db, processor, _) = setup().await;
    let mut m = Monitoree::new(JURISDICTION, "abc123").with_phone("+15555550100");
    m.last_assessment_reminder_sent = Some(chrono::Utc::now());
    let m = seed(&db, m).await;

    let raw = json!({"patient_submission_token": "abc123", "response_status": "no_answer_voice"});
    let outcome = processor.consume(&raw.to_string()).await;
    assert!(matches!(outcome, IntakeOutcome::ContactAttemptRecorded { dependents: 0, .. }));

    let reloaded = db.get_monitoree(m.id).await.unwrap().unwrap();
    assert!(reloaded.last_assessment_reminder_sent.is_none());

    let history = db.list_history(m.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, HistoryKind::ContactAttempt);
    assert!(history[0].comment.contains("+15555550100"));
    assert!(db.list_reports(m.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn response_status_short_circuits_household() {
    let (db, processor, threshold) = setup().await;
    let head = seed(&db, Monitoree::new(JURISDICTION, "head").with_phone("+15555550100")).await;
    let deps = [
        seed(&db, Monitoree::dependent_of(&head, "dep-a")).await,
        seed(&db, Monitoree::dependent_of(&head, "dep-b")).await,
    ];

    // Symptom fields are ignored once a response status is present.
    let raw = json!({
        "patient_submission_token": "head",
        "threshold_condition_hash": threshold.hash,
        "experiencing_symptoms": true,
        "response_status": "error_sms",
    });
    let outcome = processor.consume(&raw.to_string()).await;
    assert!(matches!(outcome, IntakeOutcome::ContactAttemptRecorded { dependents: 2, .. }));

    assert_eq!(db.list_history(head.id).await.unwrap().len(), 1);
    for dep in &deps {
        let history = db.list_history(dep.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, HistoryKind::ContactAttempt);
        assert!(db.list_reports(dep.id).await.unwrap().is_empty());
    }
    assert!(db.list_reports(head.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_threshold_hash_is_dropped() {
    let (db, processor, _) = setup().await;
    let m = seed(&db, Monitoree::new(JURISDICTION, "abc123")).await;

    let outcome = processor
        .consume(r#"{"threshold_condition_hash":"deadbeef","patient_submission_token":"abc123"}"#)
        .await;
    assert!(matches!(outcome, IntakeOutcome::UnknownThreshold { .. }));
    assert!(db.list_reports(m.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn purged_monitoree_is_never_resolved() {
    let (db, processor, threshold) = setup().await;
    let mut m = Monitoree::new(JURISDICTION, "abc123");
    m.purged = true;
    let m = seed(&db, m).await;

    let raw = json!({"patient_submission_token": "abc123", "threshold_condition_hash": threshold.hash});
    assert_eq!(
        processor.consume(&raw.to_string()).await,
        IntakeOutcome::UnknownMonitoree
    );
    assert!(db.list_reports(m.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn on_disk_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("intake.db");
    let threshold = ThresholdDefinition::new(JURISDICTION, schema(100.4));
    let m = Monitoree::new(JURISDICTION, "abc123");

    {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        db.insert_threshold_definition(&threshold).await.unwrap();
        db.insert_monitoree(&m).await.unwrap();

        let processor = Arc::new(AssessmentProcessor::new(Arc::clone(&db), &IntakeConfig::default()));
        let (queue, consumer) = spawn_consumer(processor, 2, 4);
        let raw = json!({
            "patient_submission_token": "abc123",
            "threshold_condition_hash": threshold.hash,
            "experiencing_symptoms": true,
        });
        queue.send(raw.to_string()).await.unwrap();
        drop(queue);
        assert_eq!(consumer.await.unwrap().reports_created, 1);
    }

    let reopened = LibSqlBackend::new_local(&path).await.unwrap();
    let reports = reopened.list_reports(m.id).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].symptomatic);
}
