use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use crm_api::app::{build_app, services::AppServices};
use crm_applications::{
    Application, ApplicationStatus, Course, CourseFormat, CourseType, NewApplication,
};
use crm_auth::{
    Hs256TokenService, JwtClaims, PasswordHasher, Role, TokenKind, TokenPair, TokenSecrets, TokenTtls,
};
use crm_core::UserId;
use crm_infra::{InMemoryOutbox, Repositories, StoredTokenPair};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const ADMIN_EMAIL: &str = "admin@school.io";
const ADMIN_PASSWORD: &str = "Adm1n!pass";
const ACCESS_SECRET: &str = "test-access-secret";

struct TestServer {
    base_url: String,
    repos: Repositories,
    outbox: Arc<InMemoryOutbox>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let secrets = TokenSecrets {
            access: ACCESS_SECRET.as_bytes().to_vec(),
            refresh: b"test-refresh-secret".to_vec(),
            activate: b"test-activate-secret".to_vec(),
            recovery: b"test-recovery-secret".to_vec(),
        };
        let repos = Repositories::in_memory();
        let outbox = Arc::new(InMemoryOutbox::new());
        let services = Arc::new(AppServices::new(
            repos.clone(),
            Hs256TokenService::new(&secrets, TokenTtls::default()),
            // Cheap hashing keeps the suite fast.
            PasswordHasher::new(1_000),
            outbox.clone(),
            "http://localhost:3000",
        ));
        services
            .seed_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("failed to seed admin");

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            repos,
            outbox,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn sign_in(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/sign-in"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Sign in and return `(access, refresh)`.
    async fn tokens(&self, email: &str, password: &str) -> (String, String) {
        let res = self.sign_in(email, password).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        (
            body["tokens"]["accessToken"].as_str().unwrap().to_string(),
            body["tokens"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    async fn admin_token(&self) -> String {
        self.tokens(ADMIN_EMAIL, ADMIN_PASSWORD).await.0
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn create_manager(&self, admin: &str, email: &str, first_name: &str) -> String {
        let res = self
            .client
            .post(self.url("/api/manager/create"))
            .bearer_auth(admin)
            .json(&json!({ "email": email, "firstName": first_name, "lastName": "Tester" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["_id"].as_str().unwrap().to_string()
    }

    /// Request an activation link and return the token from the mailed URL.
    async fn activation_token(&self, admin: &str, manager_id: &str, email: &str) -> String {
        let res = self
            .client
            .post(self.url(&format!("/api/manager/activate-request/{manager_id}")))
            .bearer_auth(admin)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "Check manager's email");

        let mail = self.outbox.last_to(email).expect("activation mail was not sent");
        assert_eq!(body["url"], mail.url.as_str());
        mail.url.rsplit('/').next().unwrap().to_string()
    }

    /// Create, activate and sign in a manager; returns `(id, access token)`.
    async fn active_manager(&self, admin: &str, email: &str, first_name: &str) -> (String, String) {
        let id = self.create_manager(admin, email, first_name).await;
        let token = self.activation_token(admin, &id, email).await;
        let res = self
            .client
            .patch(self.url(&format!("/api/manager/activate/{token}")))
            .json(&json!({ "firstPassword": "Mngr!pass1", "secondPassword": "Mngr!pass1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let access = self.tokens(email, "Mngr!pass1").await.0;
        (id, access)
    }

    async fn insert_application(&self, name: &str, course: Course, status: Option<ApplicationStatus>) -> Application {
        let app = Application::new(
            NewApplication {
                name: name.to_string(),
                surname: "Shevchenko".to_string(),
                email: format!("{}@mail.com", name.to_lowercase()),
                phone: "380501234567".to_string(),
                age: 25,
                course,
                course_type: CourseType::Pro,
                course_format: CourseFormat::Online,
                status,
                sum: None,
                already_paid: None,
                utm: "google".to_string(),
                msg: None,
            },
            Utc::now(),
        );
        self.repos.applications.insert(&app).await.unwrap();
        app
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn forge_access_token(sub: UserId, kind: TokenKind) -> String {
    let claims = JwtClaims::new(sub, Role::Admin, kind, Utc::now(), ChronoDuration::minutes(10));
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(ACCESS_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let server = TestServer::spawn().await;

    for path in ["/api/auth/me", "/api/applications", "/api/manager/admins"] {
        let res = server.client.get(server.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
    }

    let res = server.get("/api/auth/me", "not-a-jwt").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_in_returns_user_and_tokens_without_password() {
    let server = TestServer::spawn().await;

    let res = server.sign_in("ADMIN@school.io", ADMIN_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password").is_none());
    assert!(!body.to_string().contains("pbkdf2"));

    let access = body["tokens"]["accessToken"].as_str().unwrap();
    let res = server.get("/api/auth/me", access).await;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn sign_in_failures_are_ordered() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    let res = server.sign_in("nobody@school.io", ADMIN_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server.sign_in(ADMIN_EMAIL, "Wrong!pass1").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Inactive accounts are refused before the password is even checked.
    server.create_manager(&admin, "inactive@school.io", "Ira").await;
    let res = server.sign_in("inactive@school.io", "whatever").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn manager_onboarding_flow() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    let id = server.create_manager(&admin, "olena@school.io", "Olena").await;

    // Duplicate email.
    let res = server
        .client
        .post(server.url("/api/manager/create"))
        .bearer_auth(&admin)
        .json(&json!({ "email": "olena@school.io", "firstName": "Olena", "lastName": "Koval" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let token = server.activation_token(&admin, &id, "olena@school.io").await;

    let res = server
        .client
        .patch(server.url(&format!("/api/manager/activate/{token}")))
        .json(&json!({ "firstPassword": "Olena!pass1", "secondPassword": "Other!pass1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .client
        .patch(server.url(&format!("/api/manager/activate/{token}")))
        .json(&json!({ "firstPassword": "Olena!pass1", "secondPassword": "Olena!pass1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["isActive"], true);

    // Action tokens are single-use.
    let res = server
        .client
        .patch(server.url(&format!("/api/manager/activate/{token}")))
        .json(&json!({ "firstPassword": "Olena!pass2", "secondPassword": "Olena!pass2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    server.tokens("olena@school.io", "Olena!pass1").await;

    let res = server.get("/api/manager/admins", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 1);
    assert_eq!(page["data"][0]["_id"], id.as_str());
}

#[tokio::test]
async fn recovery_replaces_password_and_revokes_sessions() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    let (id, access) = server.active_manager(&admin, "petro@school.io", "Petro").await;

    let res = server
        .client
        .post(server.url(&format!("/api/manager/recovery-request/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let mail = server.outbox.last_to("petro@school.io").unwrap();
    assert!(mail.url.starts_with("http://localhost:3000/recovery/"));
    let token = mail.url.rsplit('/').next().unwrap();

    let res = server
        .client
        .post(server.url(&format!("/api/manager/recovery/{token}")))
        .json(&json!({ "firstPassword": "Petro!new1", "secondPassword": "Petro!new1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.get("/api/auth/me", &access).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server.sign_in("petro@school.io", "Mngr!pass1").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    server.tokens("petro@school.io", "Petro!new1").await;
}

#[tokio::test]
async fn refresh_rotates_the_pair() {
    let server = TestServer::spawn().await;
    let (access, refresh) = server.tokens(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let res = server
        .client
        .post(server.url("/api/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let pair: Value = res.json().await.unwrap();
    let new_access = pair["accessToken"].as_str().unwrap();
    assert_ne!(new_access, access);

    // The rotated pair is gone.
    let res = server.get("/api/auth/me", &access).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = server
        .client
        .post(server.url("/api/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server.get("/api/auth/me", new_access).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tokens_of_the_wrong_kind_are_rejected() {
    let server = TestServer::spawn().await;
    let (_, refresh) = server.tokens(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let res = server.get("/api/auth/me", &refresh).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let admin_id = server.repos.users.get_by_email(ADMIN_EMAIL).await.unwrap().unwrap().id;
    let forged = forge_access_token(admin_id, TokenKind::Refresh);
    let res = server.get("/api/auth/me", &forged).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Correctly signed but never issued.
    let unissued = forge_access_token(admin_id, TokenKind::Access);
    let res = server.get("/api/auth/me", &unissued).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_out_revokes_the_session() {
    let server = TestServer::spawn().await;
    let access = server.admin_token().await;

    let res = server
        .client
        .post(server.url("/api/auth/sign-out"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = server.get("/api/auth/me", &access).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ban_revokes_tokens_and_unban_restores_sign_in() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    let (id, access) = server.active_manager(&admin, "bohdan@school.io", "Bohdan").await;

    let res = server
        .client
        .patch(server.url(&format!("/api/manager/ban/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["Manager banned"], "true");

    let res = server.get("/api/auth/me", &access).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = server.sign_in("bohdan@school.io", "Mngr!pass1").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .patch(server.url(&format!("/api/manager/unban/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    server.tokens("bohdan@school.io", "Mngr!pass1").await;

    let res = server
        .client
        .patch(server.url("/api/manager/ban/not-a-uuid"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn managers_cannot_reach_admin_routes() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    let (_, manager) = server.active_manager(&admin, "maria@school.io", "Maria").await;

    let res = server.get("/api/manager/admins", &manager).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = server.get("/api/applications/stats", &manager).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.get("/api/applications", &manager).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn application_list_filters_and_paginates() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    for i in 0..30 {
        server.insert_application(&format!("Student{i:02}"), Course::Fs, None).await;
    }
    server.insert_application("Taras", Course::Qacx, Some(ApplicationStatus::New)).await;

    let res = server.get("/api/applications", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 31);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["prevPage"], false);
    assert_eq!(page["nextPage"], true);
    assert_eq!(page["data"].as_array().unwrap().len(), 25);

    let res = server.get("/api/applications?page=2", &admin).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["data"].as_array().unwrap().len(), 6);
    assert_eq!(page["prevPage"], true);

    let res = server.get("/api/applications?course=QACX&name=tar", &admin).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 1);
    assert_eq!(page["data"][0]["name"], "Taras");
    assert_eq!(page["data"][0]["status"], "New");

    let res = server.get("/api/applications?sort=name&order=asc&pageSize=2", &admin).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["data"][0]["name"], "Student00");
    assert_eq!(page["totalPages"], 16);

    let res = server.get("/api/applications?course=COBOL", &admin).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = server.get("/api/applications?page=0", &admin).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn working_a_lead_assigns_it_and_locks_out_other_managers() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    let (first_id, first) = server.active_manager(&admin, "anna@school.io", "Anna").await;
    let (_, second) = server.active_manager(&admin, "ivan@school.io", "Ivan").await;
    let app = server.insert_application("Taras", Course::Fe, None).await;

    let res = server
        .client
        .patch(server.url(&format!("/api/applications/addcomm/{}", app.id)))
        .bearer_auth(&first)
        .json(&json!({ "text": "Called, interested in evening groups" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "In work");
    assert_eq!(body["manager"]["_id"], first_id.as_str());
    assert_eq!(body["comments"][0]["author"]["firstName"], "Anna");

    let res = server
        .client
        .patch(server.url(&format!("/api/applications/update/{}", app.id)))
        .bearer_auth(&second)
        .json(&json!({ "status": "Aggre" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .patch(server.url(&format!("/api/applications/update/{}", app.id)))
        .bearer_auth(&first)
        .json(&json!({ "status": "Aggre", "sum": 1200, "group": "FE-2026" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "Aggre");
    assert_eq!(body["sum"], 1200);

    let res = server.get("/api/applications/my-applications", &first).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 1);
    let res = server.get("/api/applications/my-applications", &second).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 0);

    let res = server.get("/api/applications?manager=ann", &admin).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 1);

    let res = server.get(&format!("/api/applications/{}", app.id), &second).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.get(&format!("/api/applications/{}", crm_core::ApplicationId::new()), &second).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn statistics_count_by_status() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    server.insert_application("A", Course::Fs, Some(ApplicationStatus::New)).await;
    server.insert_application("B", Course::Fs, Some(ApplicationStatus::New)).await;
    server.insert_application("C", Course::Fs, Some(ApplicationStatus::Agree)).await;
    server.insert_application("D", Course::Fs, None).await;

    let res = server.get("/api/applications/stats", &admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let stats: Value = res.json().await.unwrap();
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["new"], 2);
    assert_eq!(stats["agree"], 1);
    assert_eq!(stats["inWork"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_comments_are_all_kept() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    let (_, manager) = server.active_manager(&admin, "anna@school.io", "Anna").await;
    let app = server.insert_application("Taras", Course::Fe, None).await;
    let url = server.url(&format!("/api/applications/addcomm/{}", app.id));

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..40 {
        let client = server.client.clone();
        let (url, manager) = (url.clone(), manager.clone());
        tasks.spawn(async move {
            client
                .patch(url)
                .bearer_auth(manager)
                .json(&json!({ "text": format!("call #{i}") }))
                .send()
                .await
                .unwrap()
                .status()
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    let res = server.get(&format!("/api/applications/{}", app.id), &admin).await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["comments"].as_array().unwrap().len(), 40);
    let stored = server.repos.applications.get(app.id).await.unwrap().unwrap();
    assert_eq!(stored.comments.len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_manager_wins_an_unassigned_lead() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    let (_, anna) = server.active_manager(&admin, "anna@school.io", "Anna").await;
    let (_, ivan) = server.active_manager(&admin, "ivan@school.io", "Ivan").await;
    let app = server.insert_application("Taras", Course::Fe, None).await;
    let url = server.url(&format!("/api/applications/addcomm/{}", app.id));

    let mut tasks = tokio::task::JoinSet::new();
    for token in [anna, ivan] {
        let (client, url) = (server.client.clone(), url.clone());
        tasks.spawn(async move {
            client
                .patch(url)
                .bearer_auth(token)
                .json(&json!({ "text": "mine" }))
                .send()
                .await
                .unwrap()
                .status()
        });
    }
    let mut statuses = Vec::new();
    while let Some(status) = tasks.join_next().await {
        statuses.push(status.unwrap());
    }
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::FORBIDDEN]);

    let stored = server.repos.applications.get(app.id).await.unwrap().unwrap();
    assert_eq!(stored.comments.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrently_created_managers_are_all_listed() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20 {
        let (client, url, admin) = (server.client.clone(), server.url("/api/manager/create"), admin.clone());
        tasks.spawn(async move {
            client
                .post(url)
                .bearer_auth(admin)
                .json(&json!({ "email": format!("m{i}@school.io"), "firstName": "Mngr", "lastName": "Tester" }))
                .send()
                .await
                .unwrap()
                .status()
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::CREATED);
    }

    let res = server.get("/api/manager/admins", &admin).await;
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["totalItems"], 20);
}

#[tokio::test]
async fn signing_in_prunes_expired_sessions() {
    let server = TestServer::spawn().await;
    let long_ago = Utc::now() - ChronoDuration::days(90);
    let stale = TokenPair { access_token: "stale-access".into(), refresh_token: "stale-refresh".into() };
    server
        .repos
        .tokens
        .save_pair(StoredTokenPair::new(UserId::new(), &stale, long_ago, long_ago + ChronoDuration::days(30)))
        .await
        .unwrap();
    assert!(server.repos.tokens.find_by_access("stale-access").await.unwrap().is_some());

    let (access, _) = server.tokens(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    assert!(server.repos.tokens.find_by_access("stale-access").await.unwrap().is_none());
    let fresh = server.repos.tokens.find_by_access(&access).await.unwrap().unwrap();
    assert_eq!(fresh.expires_at - fresh.created_at, TokenTtls::default().refresh);
}

#[tokio::test]
async fn openapi_document_and_swagger_ui_are_public() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/api/docs/openapi.json")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let doc: Value = res.json().await.unwrap();
    assert!(doc["openapi"].as_str().unwrap().starts_with("3."));
    assert!(doc["paths"]["/api/applications/addcomm/{id}"]["patch"].is_object());
    assert!(doc["paths"]["/api/auth/sign-in"]["post"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer"].is_object());

    let res = server.client.get(server.url("/api/docs/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let html = res.text().await.unwrap();
    assert!(html.contains("swagger"), "swagger ui page expected");
}
