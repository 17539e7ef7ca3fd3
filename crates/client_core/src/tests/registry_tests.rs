use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method as HttpMethod, StatusCode, Uri},
    Json, Router,
};
use serde_json::json;
use shared::domain::{BranchAddress, OrganizationId};
use tokio::{net::TcpListener, sync::Mutex};

use crate::error::ClientError;

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct CannedState {
    responses: Arc<HashMap<String, (StatusCode, Value)>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn canned(
    State(state): State<CannedState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let key = format!("{method} {}", uri.path());
    state.requests.lock().await.push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    match state.responses.get(&key) {
        Some((status, body)) => (*status, Json(body.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))),
    }
}

async fn spawn_canned_server(
    responses: Vec<(&str, StatusCode, Value)>,
) -> (RegistryClient, Arc<Mutex<Vec<RecordedRequest>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = CannedState {
        responses: Arc::new(
            responses
                .into_iter()
                .map(|(key, status, body)| (key.to_string(), (status, body)))
                .collect(),
        ),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let requests = state.requests.clone();
    let app = Router::new().fallback(canned).with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = RegistryClient::new(
        ApiTransport::new(format!("http://{addr}/")).with_access_token("test-token"),
    );
    (client, requests)
}

#[tokio::test]
async fn lists_institution_units_with_filter_and_bearer_token() {
    let (client, requests) = spawn_canned_server(vec![(
        "GET /api/institutions/faculties/",
        StatusCode::OK,
        json!([
            { "id": 1, "name": "Arts", "faculty_code": "ART", "institution": 4 },
            { "id": 2, "name": "Law", "faculty_code": "LAW", "institution": 4 }
        ]),
    )])
    .await;

    let units = client
        .list_units(ParentRef::Institution(InstitutionId(4)), "faculty")
        .await
        .expect("list");

    assert_eq!(units.len(), 2);
    assert_eq!(units[1].code.as_deref(), Some("LAW"));
    assert_eq!(units[0].approval_status, ApprovalStatus::Approved);

    let requests = requests.lock().await;
    assert_eq!(requests[0].query.as_deref(), Some("institution=4"));
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Bearer test-token")
    );
}

#[tokio::test]
async fn lists_organization_units_from_results_envelope() {
    let (client, requests) = spawn_canned_server(vec![(
        "GET /api/organizations/teams/",
        StatusCode::OK,
        json!({ "count": 1, "next": null, "results": [{ "id": 7, "name": "Infra", "code": "INF" }] }),
    )])
    .await;

    let units = client
        .list_units(ParentRef::Organization(OrganizationId(2)), "team")
        .await
        .expect("list");

    assert_eq!(units.len(), 1);
    assert_eq!(units[0].code.as_deref(), Some("INF"));
    assert_eq!(units[0].parent, ParentRef::Organization(OrganizationId(2)));
    assert_eq!(
        requests.lock().await[0].query.as_deref(),
        Some("organisation=2")
    );
}

#[tokio::test]
async fn unknown_unit_type_falls_back_to_first_catalog_entry() {
    let (client, requests) = spawn_canned_server(vec![(
        "GET /api/organizations/branches/",
        StatusCode::OK,
        json!([]),
    )])
    .await;

    let units = client
        .list_units(ParentRef::Organization(OrganizationId(2)), "faculty")
        .await
        .expect("fallback list");

    assert!(units.is_empty());
    assert_eq!(
        requests.lock().await[0].path,
        "/api/organizations/branches/"
    );
}

#[tokio::test]
async fn unexpected_list_shape_yields_no_units() {
    let (client, _) = spawn_canned_server(vec![(
        "GET /api/institutions/offices/",
        StatusCode::OK,
        json!({ "detail": "paginated elsewhere" }),
    )])
    .await;

    let units = client
        .list_units(ParentRef::Institution(InstitutionId(1)), "office")
        .await
        .expect("list");
    assert!(units.is_empty());
}

#[tokio::test]
async fn pending_units_default_to_pending_status() {
    let (client, requests) = spawn_canned_server(vec![(
        "GET /api/institutions/programmes/pending_units/",
        StatusCode::OK,
        json!([{ "id": 11, "name": "MSc Data", "programme_code": "MSD", "created_by_email": "a@b.c" }]),
    )])
    .await;

    let units = client
        .list_pending_units(InstitutionId(3), "programme")
        .await
        .expect("pending");

    assert_eq!(units[0].approval_status, ApprovalStatus::Pending);
    assert_eq!(units[0].created_by_email.as_deref(), Some("a@b.c"));
    assert_eq!(
        requests.lock().await[0].query.as_deref(),
        Some("institution=3")
    );
}

#[tokio::test]
async fn pending_units_failure_propagates_without_retry() {
    let (client, requests) = spawn_canned_server(Vec::new()).await;

    let err = client
        .list_pending_units(InstitutionId(3), "centre")
        .await
        .expect_err("no pending endpoint");

    assert_eq!(err.status(), Some(404));
    assert_eq!(requests.lock().await.len(), 1);
}

#[tokio::test]
async fn create_branch_pending_reports_submitted_for_approval() {
    let (client, requests) = spawn_canned_server(vec![(
        "POST /api/institutions/branches/",
        StatusCode::CREATED,
        json!({
            "id": 30,
            "name": "Harbour",
            "branch_code": "HB",
            "city": "Cork",
            "approval_status": "pending",
            "institution": 4
        }),
    )])
    .await;

    let outcome = client
        .create_unit(
            ParentRef::Institution(InstitutionId(4)),
            "branch",
            &NewUnit {
                name: "Harbour".into(),
                code: "HB".into(),
                description: None,
                address: Some(BranchAddress {
                    city: Some("Cork".into()),
                    ..BranchAddress::default()
                }),
            },
        )
        .await
        .expect("create");

    assert!(outcome.requires_moderation());
    assert!(outcome.message().contains("submitted for approval"));
    assert_eq!(outcome.unit().id, UnitId(30));

    let requests = requests.lock().await;
    assert_eq!(
        requests[0].body,
        json!({ "name": "Harbour", "branch_code": "HB", "city": "Cork", "institution": 4 })
    );
}

#[tokio::test]
async fn create_without_status_is_immediately_created() {
    let (client, _) = spawn_canned_server(vec![(
        "POST /api/organizations/committees/",
        StatusCode::CREATED,
        json!({ "id": 5, "name": "Ethics", "code": "ETH" }),
    )])
    .await;

    let outcome = client
        .create_unit(
            ParentRef::Organization(OrganizationId(8)),
            "committee",
            &NewUnit {
                name: "Ethics".into(),
                code: "ETH".into(),
                ..NewUnit::default()
            },
        )
        .await
        .expect("create");

    assert!(matches!(outcome, CreateOutcome::Created(_)));
    assert_eq!(outcome.message(), "Ethics created successfully.");
}

#[tokio::test]
async fn create_validation_failure_surfaces_one_message() {
    let (client, _) = spawn_canned_server(vec![(
        "POST /api/institutions/departments/",
        StatusCode::BAD_REQUEST,
        json!({
            "department_code": ["department with this code already exists."],
            "name": ["This field may not be blank."]
        }),
    )])
    .await;

    let err = client
        .create_unit(
            ParentRef::Institution(InstitutionId(4)),
            "department",
            &NewUnit {
                name: String::new(),
                code: "PHY".into(),
                ..NewUnit::default()
            },
        )
        .await
        .expect_err("validation");

    assert!(matches!(err, ClientError::Api { status: 400, .. }));
    assert_eq!(
        err.user_message(),
        "Department Code: department with this code already exists."
    );
}

#[tokio::test]
async fn approve_and_reject_hit_member_action_routes() {
    let (client, requests) = spawn_canned_server(vec![
        ("POST /api/institutions/faculties/2/approve/", StatusCode::OK, json!({})),
        ("POST /api/institutions/faculties/3/reject/", StatusCode::OK, json!({})),
    ])
    .await;

    client.approve_unit(UnitId(2), "faculty").await.expect("approve");
    client
        .reject_unit(UnitId(3), "faculty", "")
        .await
        .expect("reject");

    let requests = requests.lock().await;
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[1].body, json!({ "reason": "" }));
}

#[tokio::test]
async fn approving_twice_is_an_upstream_error() {
    let (client, _) = spawn_canned_server(vec![(
        "POST /api/institutions/divisions/9/approve/",
        StatusCode::BAD_REQUEST,
        json!({ "detail": "Unit is not pending." }),
    )])
    .await;

    let err = client
        .approve_unit(UnitId(9), "division")
        .await
        .expect_err("already approved");
    assert_eq!(err.user_message(), "Unit is not pending.");
}

#[tokio::test]
async fn get_update_and_delete_institution_unit() {
    let (client, requests) = spawn_canned_server(vec![
        (
            "GET /api/institutions/centres/6/",
            StatusCode::OK,
            json!({ "id": 6, "name": "Research Centre", "code": "RC", "institution": 4 }),
        ),
        (
            "PATCH /api/institutions/centres/6/",
            StatusCode::OK,
            json!({ "id": 6, "name": "Innovation Centre", "code": "RC", "institution": 4 }),
        ),
        ("DELETE /api/institutions/centres/6/", StatusCode::NO_CONTENT, Value::Null),
    ])
    .await;

    let unit = client
        .get_unit(InstitutionId(4), "centre", UnitId(6))
        .await
        .expect("get");
    assert_eq!(unit.code.as_deref(), Some("RC"));

    let updated = client
        .update_unit(
            InstitutionId(4),
            "centre",
            UnitId(6),
            &UnitPatch {
                name: Some("Innovation Centre".into()),
                ..UnitPatch::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.name, "Innovation Centre");

    client.delete_unit("centre", UnitId(6)).await.expect("delete");

    let requests = requests.lock().await;
    assert_eq!(requests[1].body, json!({ "name": "Innovation Centre" }));
    assert_eq!(requests[2].method, "DELETE");
}

#[tokio::test]
async fn unit_actions_refuse_unknown_types_before_any_request() {
    let (client, requests) = spawn_canned_server(vec![
        ("POST /api/institutions/branches/5/approve/", StatusCode::OK, json!({})),
        ("POST /api/institutions/branches/5/reject/", StatusCode::OK, json!({})),
        ("DELETE /api/institutions/branches/5/", StatusCode::NO_CONTENT, Value::Null),
    ])
    .await;

    let approve = client.approve_unit(UnitId(5), "facuIty").await;
    let reject = client.reject_unit(UnitId(5), "Faculty", "").await;
    let delete = client.delete_unit("Faculty", UnitId(5)).await;
    let get = client.get_unit(InstitutionId(1), "faculties", UnitId(5)).await;
    let update = client
        .update_unit(
            InstitutionId(1),
            "team",
            UnitId(5),
            &UnitPatch {
                name: Some("Renamed".into()),
                ..UnitPatch::default()
            },
        )
        .await;

    assert!(matches!(
        approve,
        Err(ClientError::UnknownUnitType { kind: ParentKind::Institution, ref unit_type }) if unit_type == "facuIty"
    ));
    assert!(matches!(reject, Err(ClientError::UnknownUnitType { .. })));
    assert!(matches!(delete, Err(ClientError::UnknownUnitType { .. })));
    assert!(matches!(get, Err(ClientError::UnknownUnitType { .. })));
    assert!(matches!(update, Err(ClientError::UnknownUnitType { .. })));
    assert!(requests.lock().await.is_empty());
}

#[tokio::test]
async fn malformed_records_are_skipped_not_fatal() {
    let (client, _) = spawn_canned_server(vec![(
        "GET /api/institutions/departments/",
        StatusCode::OK,
        json!([
            { "id": 1, "name": "Physics", "department_code": "PHY" },
            { "id": 2, "name": "Drafts", "department_code": "DRF", "approval_status": "draft" },
            { "name": "No id" },
            { "id": 4, "name": "History", "department_code": "HIS" }
        ]),
    )])
    .await;

    let units = client
        .list_units(ParentRef::Institution(InstitutionId(1)), "department")
        .await
        .expect("list");

    let ids: Vec<UnitId> = units.iter().map(|unit| unit.id).collect();
    assert_eq!(ids, vec![UnitId(1), UnitId(4)]);
}
