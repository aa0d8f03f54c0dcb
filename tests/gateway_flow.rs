//! Login flow and admin API tests.

use authgate::mapping::{Rule, RuleSource};
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{client, spawn_gateway, start_echo_backend, test_config, API_KEY, COOKIE};

fn session_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{COOKIE}=")))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn login_grants_access_and_logout_revokes_it() {
    let backend = start_echo_backend().await;
    let gateway = spawn_gateway(
        test_config(),
        vec![Rule::new("", "app", format!("http://{backend}"))],
    )
    .await;
    let http = client();

    let res = http
        .post(gateway.url("/login"))
        .form(&[("username", "alice"), ("password", "secret"), ("next", "/app/home")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/app/home");
    let cookie = session_cookie(&res).expect("session cookie");
    let set_cookie = res.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/"));

    let res = http
        .get(gateway.url("/app/home"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http
        .get(gateway.url("/logout"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/login");
    assert!(res.headers()["set-cookie"].to_str().unwrap().contains("Max-Age=0"));

    let res = http
        .get(gateway.url("/app/home"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let gateway = spawn_gateway(test_config(), Vec::new()).await;

    let res = client()
        .post(gateway.url("/login"))
        .form(&[("username", "alice"), ("password", "nope"), ("next", "/")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&res).is_none());
    assert!(res.text().await.unwrap().contains("Invalid username or password"));
}

#[tokio::test]
async fn open_redirects_are_neutralised() {
    let gateway = spawn_gateway(test_config(), Vec::new()).await;

    let res = client()
        .post(gateway.url("/login"))
        .form(&[
            ("username", "alice"),
            ("password", "secret"),
            ("next", "//evil.test/"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/");
}

#[tokio::test]
async fn login_form_carries_next() {
    let gateway = spawn_gateway(test_config(), Vec::new()).await;

    let res = client()
        .get(gateway.url("/login?next=%2Fapp%2Fx"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page = res.text().await.unwrap();
    assert!(page.contains("name=\"next\" value=\"/app/x\""), "{page}");
}

#[tokio::test]
async fn admin_api_requires_admin() {
    let gateway = spawn_gateway(test_config(), Vec::new()).await;
    let http = client();
    let url = gateway.url("/_authgate/api/mappings");

    let res = http.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = http.get(&url).bearer_auth("wrong-key").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = http
        .get(&url)
        .header("Cookie", gateway.login_cookie("bob"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = http
        .get(&url)
        .header("Cookie", gateway.login_cookie("alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http.get(&url).bearer_auth(API_KEY).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_api_edits_the_table() {
    let gateway = spawn_gateway(test_config(), Vec::new()).await;
    let http = client();
    let api = gateway.url("/_authgate/api");

    for (match_url, dest) in [
        ("a.test", "http://10.0.0.1:8080"),
        ("/api", "http://10.0.0.2:8080"),
        ("/", "http://10.0.0.3:8080"),
    ] {
        let res = http
            .post(format!("{api}/mappings"))
            .bearer_auth(API_KEY)
            .json(&json!({ "match_url": match_url, "http_dest": dest, "flags": [] }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let list: Value = http
        .get(format!("{api}/mappings"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 3);
    assert_eq!(list[1]["index"], 1);
    assert_eq!(list[1]["match_url"], "/api");

    let moved: Value = http
        .post(format!("{api}/mappings/2/move"))
        .bearer_auth(API_KEY)
        .json(&json!({ "direction": -2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(moved[0]["http_dest"], "http://10.0.0.3:8080");
    assert_eq!(moved[2]["http_dest"], "http://10.0.0.1:8080");

    let res = http
        .put(format!("{api}/mappings/1"))
        .bearer_auth(API_KEY)
        .json(&json!({ "match_url": "/api", "http_dest": "http://10.0.0.9:8080", "flags": ["strip_path", "custom"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http
        .delete(format!("{api}/mappings/0"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let rules = gateway.source.load().await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].destination, "http://10.0.0.9:8080");
    assert!(rules[0].flags.strip_path);
    assert_eq!(rules[0].flags.other, vec!["custom".to_string()]);
    assert_eq!(rules[1].match_host, "a.test");

    let status: Value = http
        .get(format!("{api}/status"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["rules"], 2);
}

#[tokio::test]
async fn admin_api_rejects_bad_input() {
    let gateway = spawn_gateway(
        test_config(),
        vec![Rule::new("a.test", "", "http://10.0.0.1")],
    )
    .await;
    let http = client();
    let api = gateway.url("/_authgate/api");

    let res = http
        .delete(format!("{api}/mappings/5"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = http
        .post(format!("{api}/mappings"))
        .bearer_auth(API_KEY)
        .json(&json!({ "match_url": "b.test", "http_dest": "", "flags": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = http
        .post(format!("{api}/mappings/0/move"))
        .bearer_auth(API_KEY)
        .json(&json!({ "direction": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(gateway.source.load().await.unwrap().len(), 1);
}
