//! Integration tests for the Convivencia backend.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::errors::AppError;
use crate::models::{SchoolYear, Student, Trimester};
use crate::phidias::{AnswerValue, ExternalRecord, PollAnswer, PollClient};
use crate::sync::SyncService;
use crate::{create_router, AppState};

/// Scripted Phidias double: canned records per (student code, poll id),
/// plus injectable per-student outages.
#[derive(Default)]
struct MockPhidias {
    records: Mutex<HashMap<(String, i64), Vec<ExternalRecord>>>,
    failing: Mutex<HashSet<String>>,
    delay_ms: Mutex<u64>,
}

impl MockPhidias {
    fn set_records(&self, code: &str, poll_id: i64, records: Vec<ExternalRecord>) {
        self.records
            .lock()
            .unwrap()
            .insert((code.to_string(), poll_id), records);
    }

    fn fail_for(&self, code: &str) {
        self.failing.lock().unwrap().insert(code.to_string());
    }

    fn set_delay_ms(&self, delay_ms: u64) {
        *self.delay_ms.lock().unwrap() = delay_ms;
    }
}

#[async_trait]
impl PollClient for MockPhidias {
    async fn fetch_records(
        &self,
        student_external_code: &str,
        poll_id: i64,
    ) -> Result<Vec<ExternalRecord>, AppError> {
        let delay_ms = *self.delay_ms.lock().unwrap();
        if delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        }
        if self.failing.lock().unwrap().contains(student_external_code) {
            return Err(AppError::External(format!(
                "simulated outage for {}",
                student_external_code
            )));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(student_external_code.to_string(), poll_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    phidias: Arc<MockPhidias>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        let phidias = Arc::new(MockPhidias::default());
        let sync = Arc::new(SyncService::new(repo.clone(), phidias.clone(), 2));

        // Create config
        let config = Config {
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            phidias_base_url: "http://phidias.invalid".to_string(),
            phidias_token: None,
            phidias_timeout_secs: 5,
            sync_batch_size: 2,
        };

        let state = AppState {
            repo: repo.clone(),
            sync,
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            repo,
            phidias,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn seed_school_year(&self) -> String {
        let year = SchoolYear {
            id: "year-2026".to_string(),
            name: "2026".to_string(),
            active: true,
        };
        self.repo.insert_school_year(&year).await.unwrap();

        let trimester = Trimester {
            id: "tri-1".to_string(),
            school_year_id: year.id.clone(),
            name: "Primer Trimestre".to_string(),
            starts_on: "2026-01-15".parse().unwrap(),
            ends_on: "2026-04-30".parse().unwrap(),
        };
        self.repo.insert_trimester(&trimester).await.unwrap();

        year.id
    }

    async fn seed_student(&self, id: &str, code: &str, grade: &str) {
        let student = Student {
            id: id.to_string(),
            school_year_id: "year-2026".to_string(),
            external_code: code.to_string(),
            display_name: format!("Student {}", id),
            grade: grade.to_string(),
            section: format!("{} A", grade),
        };
        self.repo.insert_student(&student).await.unwrap();
    }

    async fn seed_config(&self, poll_id: i64, level: &str) -> Value {
        let resp = self
            .client
            .post(self.url("/api/configs"))
            .json(&json!({
                "pollId": poll_id,
                "name": format!("Faltas moderadas {}", level),
                "infractionType": "moderada",
                "level": level,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn trigger_sync(&self, body: Value) -> (reqwest::StatusCode, Value) {
        let resp = self
            .client
            .post(self.url("/api/sync"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

/// Build a poll record with the answer names the mapper expects.
fn poll_record(id: i64, fecha_epoch: i64, edited: i64, manual: &str) -> ExternalRecord {
    ExternalRecord {
        id,
        firstname: "Carlos".to_string(),
        lastname: "Ruiz".to_string(),
        added: fecha_epoch,
        edited,
        answers: vec![
            PollAnswer {
                name: "Fecha de la falta".to_string(),
                value: AnswerValue::Number(fecha_epoch as f64),
            },
            PollAnswer {
                name: "Falta según manual de convivencia".to_string(),
                value: AnswerValue::Text(manual.to_string()),
            },
            PollAnswer {
                name: "Descripción de los hechos".to_string(),
                value: AnswerValue::Text("Interrumpió la clase".to_string()),
            },
        ],
    }
}

// 2026-02-10 12:00:00 UTC, inside the seeded trimester.
const IN_TERM_EPOCH: i64 = 1_770_724_800;

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_sync_without_active_school_year_is_fatal() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "NO_ACTIVE_SCHOOL_YEAR");

    // The run is still audited, finalized as error.
    let runs: Value = fixture
        .client
        .get(fixture.url("/api/sync/runs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(runs["data"].as_array().unwrap().len(), 1);
    assert_eq!(runs["data"][0]["status"], "error");
    assert_eq!(runs["data"][0]["studentsProcessed"], 0);
}

#[tokio::test]
async fn test_sync_without_configs_is_fatal() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;

    let (status, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let runs: Value = fixture
        .client
        .get(fixture.url("/api/sync/runs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(runs["data"][0]["status"], "error");
}

#[tokio::test]
async fn test_sync_unknown_student_id_is_fatal() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;

    let (status, body) = fixture.trigger_sync(json!({ "studentId": "ghost" })).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_sync_creates_faltas_and_is_idempotent() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    fixture.seed_student("s1", "1001", "Décimo").await;
    fixture.seed_student("s2", "1002", "Undécimo").await;

    fixture
        .phidias
        .set_records("1001", 42, vec![poll_record(9001, IN_TERM_EPOCH, 100, "Numeral 14")]);
    fixture
        .phidias
        .set_records("1002", 42, vec![poll_record(9002, IN_TERM_EPOCH, 100, "Numeral 3")]);

    let (status, body) = fixture.trigger_sync(json!({ "triggeredBy": "tester" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["createdCount"], 2);
    assert_eq!(body["data"]["updatedCount"], 0);
    assert_eq!(body["data"]["studentsProcessed"], 2);
    assert_eq!(body["data"]["triggeredBy"], "tester");

    // The trimester resolved from the record date.
    let falta = fixture
        .repo
        .find_falta_by_hash(&crate::sync::mapper::falta_hash(9001))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(falta.numeral, Some(14));
    assert_eq!(falta.trimester.unwrap().id, "tri-1");
    assert_eq!(falta.level.as_str(), "media");

    // Second run with identical records: no writes at all.
    let (_, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["createdCount"], 0);
    assert_eq!(body["data"]["updatedCount"], 0);
}

#[tokio::test]
async fn test_sync_updates_only_on_newer_edit() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    fixture.seed_student("s1", "1001", "Décimo").await;

    fixture
        .phidias
        .set_records("1001", 42, vec![poll_record(9001, IN_TERM_EPOCH, 100, "Numeral 14")]);
    fixture.trigger_sync(json!({})).await;

    // Same record, newer edit timestamp.
    fixture
        .phidias
        .set_records("1001", 42, vec![poll_record(9001, IN_TERM_EPOCH, 200, "Numeral 15")]);
    let (_, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(body["data"]["createdCount"], 0);
    assert_eq!(body["data"]["updatedCount"], 1);

    let falta = fixture
        .repo
        .find_falta_by_hash(&crate::sync::mapper::falta_hash(9001))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(falta.numeral, Some(15));

    // Stale edit is a no-op.
    fixture
        .phidias
        .set_records("1001", 42, vec![poll_record(9001, IN_TERM_EPOCH, 150, "Numeral 99")]);
    let (_, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(body["data"]["updatedCount"], 0);
}

#[tokio::test]
async fn test_sync_partial_on_fetch_failures() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    for i in 0..5 {
        fixture
            .seed_student(&format!("s{}", i), &format!("100{}", i), "Décimo")
            .await;
        fixture.phidias.set_records(
            &format!("100{}", i),
            42,
            vec![poll_record(9100 + i, IN_TERM_EPOCH, 100, "Numeral 2")],
        );
    }
    fixture.phidias.fail_for("1003");

    let (status, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "partial");
    assert_eq!(body["data"]["studentsProcessed"], 4);
    assert_eq!(body["data"]["createdCount"], 4);

    let errors = body["data"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["studentId"], "s3");
    assert_eq!(errors[0]["pollId"], 42);
}

#[tokio::test]
async fn test_sync_skips_configs_without_matching_students() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "primaria").await;
    fixture.seed_student("s1", "1001", "Décimo").await;

    // No primaria students: the config is skipped, not an error.
    let (status, body) = fixture.trigger_sync(json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["studentsProcessed"], 0);
    assert_eq!(body["data"]["createdCount"], 0);
}

#[tokio::test]
async fn test_sync_rejects_concurrent_runs() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    for i in 0..4 {
        fixture
            .seed_student(&format!("s{}", i), &format!("20{:02}", i), "Décimo")
            .await;
    }
    // Keep the first run in flight long enough for the second to collide.
    fixture.phidias.set_delay_ms(200);

    let first = fixture
        .client
        .post(fixture.url("/api/sync"))
        .json(&json!({}))
        .send();
    let second = fixture
        .client
        .post(fixture.url("/api/sync"))
        .json(&json!({}))
        .send();

    let (first, second) = tokio::join!(first, second);
    let statuses = [first.unwrap().status(), second.unwrap().status()];
    assert!(statuses.contains(&reqwest::StatusCode::OK));
    assert!(statuses.contains(&reqwest::StatusCode::CONFLICT));
}

#[tokio::test]
async fn test_config_duplicate_active_poll_rejected() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;

    let resp = fixture
        .client
        .post(fixture.url("/api/configs"))
        .json(&json!({
            "pollId": 42,
            "name": "Duplicada",
            "infractionType": "moderada",
            "level": "primaria",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let listed: Value = fixture
        .client
        .get(fixture.url("/api/configs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_caso_lifecycle_over_api() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    fixture.seed_student("s1", "1001", "Décimo").await;
    fixture
        .phidias
        .set_records("1001", 42, vec![poll_record(9001, IN_TERM_EPOCH, 100, "Numeral 14")]);
    fixture.trigger_sync(json!({})).await;

    let hash = crate::sync::mapper::falta_hash(9001);

    // Record follow-ups 1 and 2.
    for number in [1, 2] {
        let resp = fixture
            .client
            .post(fixture.url(&format!("/api/casos/{}/seguimientos", hash)))
            .json(&json!({
                "number": number,
                "date": "2026-03-12",
                "details": "Reunión con acudientes",
                "author": "Orientadora",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    // Duplicate number is a conflict; out-of-range number is a validation error.
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/casos/{}/seguimientos", hash)))
        .json(&json!({ "number": 2, "date": "2026-03-20", "author": "Orientadora" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/casos/{}/seguimientos", hash)))
        .json(&json!({ "number": 4, "date": "2026-03-20", "author": "Orientadora" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let casos: Value = fixture
        .client
        .get(fixture.url("/api/casos"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let caso = &casos["data"][0];
    assert_eq!(caso["faltaHash"], hash.as_str());
    assert_eq!(caso["completedCount"], 2);
    assert_eq!(caso["pendingCount"], 1);
    assert_eq!(caso["nextNumber"], 3);
    assert_eq!(caso["closed"], false);

    // Third follow-up closes the case.
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/casos/{}/seguimientos", hash)))
        .json(&json!({ "number": 3, "date": "2026-04-02", "author": "Orientadora" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let casos: Value = fixture
        .client
        .get(fixture.url("/api/casos"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(casos["data"][0]["closed"], true);
    assert!(casos["data"][0].get("nextNumber").is_none());
}

#[tokio::test]
async fn test_casos_level_filter() {
    let fixture = TestFixture::new().await;
    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    fixture.seed_config(43, "primaria").await;
    fixture.seed_student("s1", "1001", "Décimo").await;
    fixture.seed_student("s2", "1002", "Tercero").await;
    fixture
        .phidias
        .set_records("1001", 42, vec![poll_record(9001, IN_TERM_EPOCH, 100, "Numeral 14")]);
    fixture
        .phidias
        .set_records("1002", 43, vec![poll_record(9002, IN_TERM_EPOCH, 100, "Numeral 8")]);
    fixture.trigger_sync(json!({})).await;

    let casos: Value = fixture
        .client
        .get(fixture.url("/api/casos?level=primaria"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let data = casos["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["studentId"], "s2");
}

#[tokio::test]
async fn test_sync_status_reports_last_run() {
    let fixture = TestFixture::new().await;

    let idle: Value = fixture
        .client
        .get(fixture.url("/api/sync/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(idle["data"]["idle"], true);

    fixture.seed_school_year().await;
    fixture.seed_config(42, "media").await;
    fixture.seed_student("s1", "1001", "Décimo").await;
    fixture.trigger_sync(json!({})).await;

    let status: Value = fixture
        .client
        .get(fixture.url("/api/sync/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["data"]["idle"], false);
    assert_eq!(status["data"]["progress"]["phase"], "completed");
}
