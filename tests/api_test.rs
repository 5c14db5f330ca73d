use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use student_predictor::api;
use student_predictor::model::PredictionEngine;
use student_predictor::profiles::ProfileStore;
use student_predictor::store::PredictionStore;

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(PredictionEngine::heuristic()))
                .app_data(web::Data::new(PredictionStore::new()))
                .app_data(web::Data::new(ProfileStore::new()))
                .configure(api::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_and_model_info() {
    let app = app!();

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());

    let info: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/model/info").to_request(),
    )
    .await;
    assert_eq!(info["strategy"], "heuristic");
}

#[actix_web::test]
async fn predict_then_generate_recommendations() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(json!({
            "student_id": "STU0001",
            "attendance": 95,
            "hours_studied": 30,
            "previous_scores": 88
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let score = body["predicted_score"].as_f64().unwrap();
    let confidence = body["category_confidence"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&score));
    assert!((0.75..=0.95).contains(&confidence));
    assert_eq!(body["student_id"], "STU0001");
    assert_eq!(body["strategy"], "heuristic");

    let stored: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/students/STU0001/prediction").to_request(),
    )
    .await;
    assert_eq!(stored["predicted_score"].as_f64().unwrap(), score);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/students/STU0001/recommendations")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let saved: Vec<Value> = test::read_body_json(resp).await;
    assert!(saved.len() >= 3);
    let first_id = saved[0]["id"].as_u64().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/recommendations/{}/complete", first_id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let progress: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/students/STU0001/recommendations/progress")
            .to_request(),
    )
    .await;
    assert_eq!(progress["completed"], 1);
    assert_eq!(progress["total"].as_u64().unwrap() as usize, saved.len());
}

#[actix_web::test]
async fn invalid_input_is_bad_request() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(json!({ "attendance": -5 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("attendance"));
}

#[actix_web::test]
async fn unknown_student_is_not_found() {
    let app = app!();

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/students/STU9999/prediction").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/recommendations/42/complete").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn recommendations_follow_rule_table() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/recommendations")
        .set_json(json!({ "performance_category": "at_risk", "predicted_score": 65.0 }))
        .to_request();
    let recs: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    let kinds: Vec<&str> = recs.iter().map(|r| r["type"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        vec!["academic_support", "study_habits", "attendance", "resources", "foundation"]
    );
}

#[actix_web::test]
async fn batch_reports_invalid_rows_and_summarizes() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/predict/batch")
        .set_json(json!([
            { "student_id": "STU0001", "attendance": 90, "previous_scores": 80 },
            { "student_id": "STU0002", "attendance": 140 },
            { "student_id": "STU0003" }
        ]))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total_students"], 2);
    assert_eq!(body["summary"]["total_students"], 2);
    assert_eq!(body["errors"][0]["student_id"], "STU0002");

    let analytics: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/analytics").to_request(),
    )
    .await;
    assert_eq!(analytics["total_students"], 2);
}

#[actix_web::test]
async fn csv_batch_round_trip() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/predict/batch/csv")
        .insert_header(("Content-Type", "text/csv"))
        .set_payload("student_id,attendance,hours_studied,previous_scores\nSTU0001,92,25,88\nSTU0002,,,\n")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "student_id,predicted_score,performance_category,category_confidence"
    );
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("STU0001,"));
}

#[actix_web::test]
async fn csv_batch_reports_skipped_rows() {
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/predict/batch/csv")
        .insert_header(("Content-Type", "text/csv"))
        .set_payload("student_id,attendance\nSTU0001,92\nSTU0002,140\n")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get(api::SKIPPED_ROWS_HEADER).unwrap().to_str().unwrap(),
        "1"
    );
    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(!text.contains("STU0002"));
}

fn ada() -> Value {
    json!({
        "student_id": "STU0001",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "gender": "Female",
        "age": 16,
        "attendance": 91,
        "hours_studied": 24,
        "previous_scores": 84,
        "school_type": "Public"
    })
}

#[actix_web::test]
async fn student_profile_lifecycle() {
    let app = app!();

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/students").set_json(ada()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/students").set_json(ada()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let updated: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::put()
            .uri("/students/STU0001")
            .set_json(json!({ "attendance": 95 }))
            .to_request(),
    )
    .await;
    assert_eq!(updated["attendance"].as_f64().unwrap(), 95.0);
    assert_eq!(updated["previous_scores"].as_f64().unwrap(), 84.0);

    let page: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/students?search=love").to_request(),
    )
    .await;
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["students"][0]["first_name"], "Ada");

    let prediction: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/predictions/STU0001").to_request(),
    )
    .await;
    assert_eq!(prediction["student_id"], "STU0001");
    let stored: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/students/STU0001/prediction").to_request(),
    )
    .await;
    assert_eq!(stored["predicted_score"], prediction["predicted_score"]);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete().uri("/students/STU0001").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    for uri in ["/students/STU0001", "/predictions/STU0001", "/students/STU0001/prediction"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[actix_web::test]
async fn invalid_profile_is_bad_request() {
    let app = app!();

    let mut student = ada();
    student["first_name"] = json!("");
    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/students").set_json(student).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn performance_and_attendance_records() {
    let app = app!();
    test::call_service(
        &app,
        test::TestRequest::post().uri("/students").set_json(ada()).to_request(),
    )
    .await;

    for (subject, score, date) in [("Math", 70, "2024-01-10"), ("Math", 90, "2024-02-10")] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/students/STU0001/performance")
                .set_json(json!({
                    "subject": subject,
                    "exam_type": "quiz",
                    "score": score,
                    "date_taken": date
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let records: Vec<Value> = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/students/STU0001/performance?limit=1")
            .to_request(),
    )
    .await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["date_taken"], "2024-02-10");
    assert_eq!(records[0]["max_score"].as_f64().unwrap(), 100.0);

    let summary: Vec<Value> = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/students/STU0001/performance/summary")
            .to_request(),
    )
    .await;
    assert_eq!(summary[0]["avg_score"].as_f64().unwrap(), 80.0);
    assert_eq!(summary[0]["total_exams"], 2);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/students/STU0001/attendance")
            .set_json(json!({ "date": "2024-01-08", "status": "late" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let attendance: Vec<Value> = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/students/STU0001/attendance?from=2024-01-01&to=2024-01-31")
            .to_request(),
    )
    .await;
    assert_eq!(attendance.len(), 1);
    assert_eq!(attendance[0]["status"], "late");

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/students/STU9999/performance").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn import_export_and_group_analytics() {
    let app = app!();

    let csv = "student_id,first_name,last_name,gender,age,previous_scores,school_type\n\
               STU0001,Ada,Lovelace,Female,16,92,Public\n\
               STU0002,Alan,Turing,Male,17,64,Private\n\
               STU0001,Ada,Again,Female,16,50,Public\n";
    let report: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/data/import")
            .insert_header(("Content-Type", "text/csv"))
            .set_payload(csv)
            .to_request(),
    )
    .await;
    assert_eq!(report["imported_count"], 2);
    assert_eq!(report["errors"][0], "Row 3: Student ID STU0001 already exists");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/data/import")
            .insert_header(("Content-Type", "text/csv"))
            .set_payload("student_id,first_name\nSTU0003,Grace\n")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/data/export").to_request()).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    let text = std::str::from_utf8(&body).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("STU0002,Alan,Turing,Male,"));

    let overview: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/analytics/overview").to_request(),
    )
    .await;
    assert_eq!(overview["total_students"], 2);
    assert_eq!(overview["gender_distribution"]["Female"], 1);
    assert_eq!(overview["averages"]["previous_scores"].as_f64().unwrap(), 78.0);

    let trends: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/analytics/performance-trends").to_request(),
    )
    .await;
    assert_eq!(trends["school_performance"][0]["group"], "Private");
    assert_eq!(trends["age_performance"].as_array().unwrap().len(), 2);

    let batch: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/predictions/batch")
            .set_json(json!({ "student_ids": ["STU0001", "STU0002", "STU0404"] }))
            .to_request(),
    )
    .await;
    assert_eq!(batch["total_students"], 2);
    assert_eq!(batch["errors"][0]["student_id"], "STU0404");
}
