use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sitebook_api::app::build_app;
use sitebook_api::config::ApiConfig;
use sitebook_auth::{JwtClaims, PrincipalId, Role};
use sitebook_core::TenantId;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let app = build_app(ApiConfig::new(SECRET)).await.expect("app should build");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    let text = res.text().await.unwrap();
    let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text).unwrap() };
    (status, body)
}

fn mint_jwt(tenant_id: TenantId, sub: PrincipalId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        tenant_id,
        roles,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token(tenant_id: TenantId) -> String {
    mint_jwt(tenant_id, PrincipalId::new(), vec![Role::admin()])
}

/// A manager who has registered their profile. Returns (token, user id).
async fn registered_manager(srv: &TestServer, tenant_id: TenantId, name: &str) -> (String, String) {
    let principal = PrincipalId::new();
    let token = mint_jwt(tenant_id, principal, vec![Role::manager()]);
    let (status, body) = srv
        .post(
            &token,
            "/users/me",
            json!({ "name": name, "email": format!("{}@site.test", name.to_lowercase()) }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["role"], "manager");
    (token, principal.to_string())
}

async fn create_project(srv: &TestServer, admin: &str, manager_id: &str, budget: i64) -> String {
    let (status, body) = srv
        .post(
            admin,
            "/projects",
            json!({
                "name": "Riverside Villa",
                "location": "Nashik",
                "budget_limit": budget,
                "order_value": budget * 2,
                "manager_id": manager_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["project_id"].as_str().unwrap().to_string()
}

async fn register_worker(srv: &TestServer, admin: &str, name: &str, payment_type: &str, base_rate: i64) -> String {
    let (status, body) = srv
        .post(
            admin,
            "/workers",
            json!({
                "name": name,
                "skill": "Mason",
                "phone": "+91 98000 00000",
                "payment_type": payment_type,
                "base_rate": base_rate,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["current_balance"], 0);
    body["worker_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(format!("{}/projects", srv.base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();

    let (status, body) = srv.get(&admin_token(tenant_id), "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn unknown_roles_grant_nothing() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), PrincipalId::new(), vec![Role::new("viewer")]);

    let (status, _) = srv.get(&token, "/projects").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn approved_expenses_drive_utilised_budget() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = admin_token(tenant_id);
    let (manager, manager_id) = registered_manager(&srv, tenant_id, "Asha").await;
    let project_id = create_project(&srv, &admin, &manager_id, 100_000).await;

    let (status, expense) = srv
        .post(
            &manager,
            &format!("/projects/{project_id}/expenses"),
            json!({ "amount": 30_000, "category": "Cement", "description": "60 bags" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{expense}");
    assert_eq!(expense["status"], "unapproved");
    assert_eq!(expense["type"], "expense");
    let expense_id = expense["id"].as_str().unwrap().to_string();

    // Pending until approved.
    let (_, fin) = srv.get(&admin, &format!("/projects/{project_id}/financials")).await;
    assert_eq!(fin["utilised_budget"], 0);
    assert_eq!(fin["pending_expenses"], 30_000);

    // Managers cannot moderate.
    let (status, _) = srv.post(&manager, &format!("/transactions/{expense_id}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = srv.post(&admin, &format!("/transactions/{expense_id}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["status"], "approved");

    let (_, fin) = srv.get(&manager, &format!("/projects/{project_id}/financials")).await;
    assert_eq!(fin["utilised_budget"], 30_000);
    assert_eq!(fin["pending_expenses"], 0);
    assert_eq!(fin["remaining_budget"], 70_000);
    assert_eq!(fin["utilisation_percent"], 30);

    // A second moderation of the same expense is refused.
    let (status, _) = srv.post(&admin, &format!("/transactions/{expense_id}/reject"), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Deleting the approved expense releases the budget.
    let res = srv
        .client
        .delete(format!("{}/transactions/{expense_id}", srv.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let (_, fin) = srv.get(&admin, &format!("/projects/{project_id}/financials")).await;
    assert_eq!(fin["utilised_budget"], 0);
}

#[tokio::test]
async fn managers_only_reach_assigned_projects() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = admin_token(tenant_id);
    let (asha, asha_id) = registered_manager(&srv, tenant_id, "Asha").await;
    let (ravi, _) = registered_manager(&srv, tenant_id, "Ravi").await;
    let project_id = create_project(&srv, &admin, &asha_id, 50_000).await;

    let (status, _) = srv.get(&ravi, &format!("/projects/{project_id}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .post(
            &ravi,
            &format!("/projects/{project_id}/expenses"),
            json!({ "amount": 500, "category": "Sand", "description": "1 truck" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = srv.get(&ravi, "/projects").await;
    assert!(listed["items"].as_array().unwrap().is_empty());

    let (_, listed) = srv.get(&asha, "/projects").await;
    assert_eq!(listed["items"].as_array().unwrap().len(), 1);

    // Managers never create projects.
    let (status, _) = srv
        .post(
            &asha,
            "/projects",
            json!({
                "name": "Side job",
                "location": "Pune",
                "budget_limit": 1_000,
                "order_value": 2_000,
                "manager_id": asha_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn payroll_advances_and_settlements_move_the_balance() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = admin_token(tenant_id);
    let worker_id = register_worker(&srv, &admin, "Ramesh", "monthly", 20_000).await;

    let (status, accrued) = srv.post(&admin, "/payroll/accrue", json!({})).await;
    assert_eq!(status, StatusCode::OK, "{accrued}");
    assert_eq!(accrued["items"][0]["current_balance"], 20_000);

    let (status, after_advance) = srv
        .post(&admin, &format!("/workers/{worker_id}/advance"), json!({ "amount": 5_000 }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{after_advance}");
    assert_eq!(after_advance["current_balance"], 15_000);

    let (status, err) = srv
        .post(&admin, &format!("/workers/{worker_id}/settle"), json!({ "amount": 16_000 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "invariant_violation");

    let (status, settled) = srv
        .post(&admin, &format!("/workers/{worker_id}/settle"), json!({ "amount": 10_000 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(settled["current_balance"], 5_000);

    let (_, payroll) = srv.get(&admin, &format!("/workers/{worker_id}/payroll")).await;
    assert_eq!(payroll["balance"], 5_000);
    assert_eq!(payroll["entries"].as_array().unwrap().len(), 3);

    // A worker who is still owed money stays on the roster.
    let res = srv
        .client
        .delete(format!("{}/workers/{worker_id}", srv.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let (status, payout) = srv.post(&admin, "/payroll/salaries", json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{payout}");
    assert_eq!(payout["total_amount_paid"], 5_000);

    let (_, worker) = srv.get(&admin, &format!("/workers/{worker_id}")).await;
    assert_eq!(worker["current_balance"], 0);

    // Payroll records show up in the list but cannot be moderated.
    let (_, listed) = srv.get(&admin, "/transactions?type=payout_advance").await;
    let advance_id = listed["items"][0]["id"].as_str().unwrap().to_string();
    let (status, _) = srv.post(&admin, &format!("/transactions/{advance_id}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn attendance_is_recorded_once_per_project_and_day() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = admin_token(tenant_id);
    let (manager, manager_id) = registered_manager(&srv, tenant_id, "Asha").await;
    let project_id = create_project(&srv, &admin, &manager_id, 10_000).await;
    let worker_id = register_worker(&srv, &admin, "Sunil", "daily", 800).await;

    let date = (Utc::now() - ChronoDuration::days(1)).date_naive().to_string();
    let sheet = json!({
        "date": date,
        "entries": [{ "worker_id": worker_id, "status": "present", "units_worked": 1 }],
    });

    let (status, day) = srv.post(&manager, &format!("/projects/{project_id}/attendance"), sheet.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{day}");
    assert_eq!(day["present"], 1);
    assert_eq!(day["records"][0]["worker_name"], "Sunil");

    let (status, err) = srv.post(&manager, &format!("/projects/{project_id}/attendance"), sheet).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "conflict");

    // Attendance does not touch balances.
    let (_, worker) = srv.get(&admin, &format!("/workers/{worker_id}")).await;
    assert_eq!(worker["current_balance"], 0);
}

#[tokio::test]
async fn tenants_cannot_see_each_other() {
    let srv = TestServer::spawn().await;
    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();
    let (_, manager_id) = registered_manager(&srv, tenant_a, "Asha").await;
    let project_id = create_project(&srv, &admin_token(tenant_a), &manager_id, 10_000).await;

    let admin_b = admin_token(tenant_b);
    let (status, _) = srv.get(&admin_b, &format!("/projects/{project_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = srv.get(&admin_b, "/projects").await;
    assert!(listed["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn insights_fall_back_to_the_local_summary() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = admin_token(tenant_id);
    let (manager, manager_id) = registered_manager(&srv, tenant_id, "Asha").await;
    let project_id = create_project(&srv, &admin, &manager_id, 100_000).await;

    let (_, expense) = srv
        .post(
            &manager,
            &format!("/projects/{project_id}/expenses"),
            json!({ "amount": 90_000, "category": "Steel", "description": "TMT bars" }),
        )
        .await;
    let expense_id = expense["id"].as_str().unwrap().to_string();
    srv.post(&admin, &format!("/transactions/{expense_id}/approve"), json!({})).await;

    let (status, report) = srv.post(&manager, &format!("/projects/{project_id}/insights"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["source"], "heuristic");
    assert!(!report["summary"].as_str().unwrap().is_empty());
    assert_eq!(report["figures"]["approved_expenses"], 90_000);
}

#[tokio::test]
async fn tasks_follow_project_scope() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = admin_token(tenant_id);
    let (manager, manager_id) = registered_manager(&srv, tenant_id, "Asha").await;
    let project_id = create_project(&srv, &admin, &manager_id, 10_000).await;

    let (status, task) = srv
        .post(&admin, "/tasks", json!({ "project_id": project_id, "title": "Pour slab" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    assert_eq!(task["status"], "todo");
    let task_id = task["task_id"].as_str().unwrap().to_string();

    let (status, moved) = srv
        .post(&manager, &format!("/tasks/{task_id}/status"), json!({ "status": "inprogress" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{moved}");
    assert_eq!(moved["status"], "inprogress");

    let (_, listed) = srv.get(&manager, &format!("/projects/{project_id}/tasks")).await;
    assert_eq!(listed["items"].as_array().unwrap().len(), 1);
}
