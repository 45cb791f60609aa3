//! End-to-end tests through the full router

use super::*;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use regex::Regex;
use tower::ServiceExt;

use crate::db::pool::sqlite;
use crate::db::{create_test_pool, migrations, DatabasePool, DynDatabasePool};

/// Drives the router like a browser with a one-cookie jar.
struct TestClient {
    app: Router,
    pool: DynDatabasePool,
    cookie: Option<String>,
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: String,
}

impl TestClient {
    async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let mut config = Config::default();
        config.security.csrf_secret = Some("test-secret".to_string());
        let templates = TemplateCache::from_embedded().expect("Failed to build templates");
        let state = AppState::new(&config, pool.clone(), templates).expect("Failed to build state");

        Self {
            app: build_router(state),
            pool,
            cookie: None,
        }
    }

    async fn snippet_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM snippets")
            .fetch_one(sqlite(&self.pool).unwrap())
            .await
            .unwrap()
    }

    async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }
        let response = self.app.clone().oneshot(request).await.unwrap();

        if let Some(set) = response.headers().get(header::SET_COOKIE) {
            let pair = set.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_form(&mut self, uri: &str, body: String) -> TestResponse {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Fetch `page` and pull the CSRF token out of its first form.
    async fn csrf_token(&mut self, page: &str) -> String {
        let response = self.get(page).await;
        assert_eq!(response.status, StatusCode::OK);
        let rx = Regex::new(r#"name="csrf_token" value="([^"]+)""#).unwrap();
        rx.captures(&response.body)
            .map(|c| c[1].to_string())
            .expect("no CSRF token in page")
    }

    async fn signup(&mut self, name: &str, email: &str, password: &str) -> TestResponse {
        let token = self.csrf_token("/user/signup").await;
        self.post_form(
            "/user/signup",
            format!(
                "name={}&email={}&password={}&csrf_token={}",
                name, email, password, token
            ),
        )
        .await
    }

    async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        let token = self.csrf_token("/user/login").await;
        self.post_form(
            "/user/login",
            format!("email={}&password={}&csrf_token={}", email, password, token),
        )
        .await
    }
}

fn location(response: &TestResponse) -> &str {
    response.headers[header::LOCATION].to_str().unwrap()
}

#[tokio::test]
async fn test_ping() {
    let mut client = TestClient::new().await;
    let response = client.get("/ping").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "OK");
    // outside the dynamic chain
    assert!(response.headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_security_headers_on_pages_and_errors() {
    let mut client = TestClient::new().await;
    for uri in ["/", "/ping", "/missing"] {
        let response = client.get(uri).await;
        assert_eq!(response.headers[header::X_FRAME_OPTIONS], "deny", "{}", uri);
        assert_eq!(response.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }
}

#[tokio::test]
async fn test_home_sets_session_cookie() {
    let mut client = TestClient::new().await;
    let response = client.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("nothing to see here"));

    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert_eq!(response.headers[header::VARY], "Cookie");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let mut client = TestClient::new().await;
    let response = client.get("/no/such/page").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, "Not Found");
}

#[tokio::test]
async fn test_view_rejects_bad_ids() {
    let mut client = TestClient::new().await;
    for uri in ["/snippet/view/0", "/snippet/view/-1", "/snippet/view/abc", "/snippet/view/1.5", "/snippet/view/99"] {
        let response = client.get(uri).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let mut client = TestClient::new().await;
    let response = client
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_static_assets() {
    let mut client = TestClient::new().await;
    let response = client.get("/static/css/main.css").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/css"));

    assert_eq!(client.get("/static/").await.status, StatusCode::NOT_FOUND);
    assert_eq!(client.get("/static/css/").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_requires_login() {
    let mut client = TestClient::new().await;
    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");
}

#[tokio::test]
async fn test_anonymous_create_post_is_redirected_without_insert() {
    let mut client = TestClient::new().await;
    let token = client.csrf_token("/user/login").await;

    let response = client
        .post_form(
            "/snippet/create",
            format!("title=Sneaky&content=nope&expires=7&csrf_token={}", token),
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");
    assert_eq!(client.snippet_count().await, 0);
}

#[tokio::test]
async fn test_create_post_without_csrf_token_is_forbidden() {
    let mut client = TestClient::new().await;
    client.signup("Alice", "alice%40example.com", "pa55word1").await;
    client.login("alice%40example.com", "pa55word1").await;
    assert_eq!(client.get("/snippet/create").await.status, StatusCode::OK);

    let response = client
        .post_form(
            "/snippet/create",
            "title=O+snail&content=Climb&expires=7".to_string(),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(client.snippet_count().await, 0);
}

#[tokio::test]
async fn test_deleted_user_is_treated_as_anonymous() {
    let mut client = TestClient::new().await;
    client.signup("Alice", "alice%40example.com", "pa55word1").await;
    let response = client.login("alice%40example.com", "pa55word1").await;
    assert_eq!(location(&response), "/snippet/create");
    assert_eq!(client.get("/snippet/create").await.status, StatusCode::OK);

    client.pool.execute("DELETE FROM users").await.unwrap();

    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");

    let home = client.get("/").await;
    assert_eq!(home.status, StatusCode::OK);
    assert!(home.body.contains("href=\"/user/login\""));
}

#[tokio::test]
async fn test_slow_request_times_out_with_408() {
    let app = Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "done"
            }),
        )
        .layer(request_timeout(Duration::from_millis(50)));

    let response = app
        .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_post_without_csrf_token_is_forbidden() {
    let mut client = TestClient::new().await;
    client.get("/").await;

    let response = client
        .post_form(
            "/user/signup",
            "name=Eve&email=eve%40example.com&password=pa55word1".to_string(),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // nothing was created, so logging in fails
    let response = client.login("eve%40example.com", "pa55word1").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_csrf_token_from_other_session_is_forbidden() {
    let mut alice = TestClient::new().await;
    let token = alice.csrf_token("/user/signup").await;

    let mut mallory = TestClient {
        app: alice.app.clone(),
        pool: alice.pool.clone(),
        cookie: None,
    };
    mallory.get("/").await;
    let response = mallory
        .post_form(
            "/user/signup",
            format!(
                "name=M&email=m%40example.com&password=pa55word1&csrf_token={}",
                token
            ),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_signup_login_create_view_logout() {
    let mut client = TestClient::new().await;

    let response = client.signup("Alice", "alice%40example.com", "pa55word1").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");

    let page = client.get("/user/login").await;
    assert!(page.body.contains("Your signup was successful. Please log in."));
    // flash is shown once
    let page = client.get("/user/login").await;
    assert!(!page.body.contains("Your signup was successful."));

    let before = client.cookie.clone();
    let response = client.login("alice%40example.com", "pa55word1").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/snippet/create");
    assert_ne!(client.cookie, before, "login must renew the session token");

    let page = client.get("/snippet/create").await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.headers[header::CACHE_CONTROL], "no-store");

    let token = client.csrf_token("/snippet/create").await;
    let response = client
        .post_form(
            "/snippet/create",
            format!(
                "title=O+snail&content=Climb+Mount+Fuji%2C%0ABut+slowly&expires=7&csrf_token={}",
                token
            ),
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    let view = location(&response).to_string();
    assert_eq!(view, "/snippet/view/1");

    let page = client.get(&view).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Snippet successfully created!"));
    assert!(page.body.contains("O snail"));
    assert!(page.body.contains("Climb Mount Fuji,\nBut slowly"));

    let home = client.get("/").await;
    assert!(home.body.contains("O snail"));

    let token = client.csrf_token("/").await;
    let response = client
        .post_form("/user/logout", format!("csrf_token={}", token))
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let mut client = TestClient::new().await;
    client.signup("Alice", "alice%40example.com", "pa55word1").await;

    let response = client.signup("Other", "alice%40example.com", "pa55word2").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Email address is already in use"));
    // submitted values are kept, the password is not
    assert!(response.body.contains("value=\"Other\""));
    assert!(!response.body.contains("pa55word2"));
}

#[tokio::test]
async fn test_login_wrong_password() {
    let mut client = TestClient::new().await;
    client.signup("Alice", "alice%40example.com", "pa55word1").await;

    let response = client.login("alice%40example.com", "wrong-password").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Email or password is incorrect"));

    let response = client.get("/snippet/create").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_invalid_snippet_is_re_rendered() {
    let mut client = TestClient::new().await;
    client.signup("Alice", "alice%40example.com", "pa55word1").await;
    client.login("alice%40example.com", "pa55word1").await;

    let token = client.csrf_token("/snippet/create").await;
    let response = client
        .post_form(
            "/snippet/create",
            format!("title=&content=kept&expires=30&csrf_token={}", token),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field cannot be blank"));
    assert!(response.body.contains("This field must equal 1, 7 or 365"));
    assert!(response.body.contains("kept"));

    assert_eq!(client.get("/snippet/view/1").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_form_body_is_400() {
    let mut client = TestClient::new().await;
    client.signup("Alice", "alice%40example.com", "pa55word1").await;
    client.login("alice%40example.com", "pa55word1").await;

    let token = client.csrf_token("/snippet/create").await;
    let response = client
        .post_form(
            "/snippet/create",
            format!("title=a&content=b&expires=soon&csrf_token={}", token),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
