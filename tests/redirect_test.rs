mod common;

use browsernet::{HttpClient, NetError, Request};
use common::{ok, spawn_server};
use http::Method;
use url::Url;

fn redirect(status: u16, location: &str) -> String {
    format!("HTTP/1.1 {status} Moved\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n")
}

fn get(url: &str) -> Request {
    Request::get(&Url::parse(url).unwrap()).unwrap()
}

#[tokio::test]
async fn test_follows_relative_redirect() {
    let server = spawn_server(|request, _| {
        if request.starts_with("GET /old ") {
            redirect(301, "/new")
        } else {
            ok("moved here")
        }
    })
    .await;
    let client = HttpClient::new();

    let response = client.fetch(get(&format!("{}/old", server.base)), None).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "moved here");
    assert!(response.redirected);
    assert_eq!(response.url, format!("{}/new", server.base));
    assert!(server.log.request_lower(1).starts_with("get /new http/1.1"));
}

#[tokio::test]
async fn test_redirect_limit() {
    let server = spawn_server(|_, i| redirect(302, &format!("/hop{i}"))).await;
    let client = HttpClient::builder().max_redirects(3).build();

    let err = client.fetch(get(&server.base), None).await.unwrap_err();
    assert_eq!(err, NetError::TooManyRedirects);
    // The first request plus three followed redirects.
    assert_eq!(server.log.requests().len(), 4);
}

#[tokio::test]
async fn test_redirect_without_location_is_returned() {
    let server = spawn_server(|_, _| "HTTP/1.1 302 Found\r\nContent-Length: 0\r\n\r\n".to_string()).await;
    let client = HttpClient::new();

    let response = client.fetch(get(&server.base), None).await.unwrap();
    assert_eq!(response.status, 302);
    assert!(!response.redirected);
}

#[tokio::test]
async fn test_redirect_to_unsupported_scheme() {
    let server = spawn_server(|_, _| redirect(302, "ftp://files.example/x")).await;
    let client = HttpClient::new();

    let err = client.fetch(get(&server.base), None).await.unwrap_err();
    assert_eq!(err, NetError::InvalidRedirect);
}

#[tokio::test]
async fn test_303_turns_post_into_get() {
    let server = spawn_server(|request, _| {
        if request.starts_with("POST ") {
            redirect(303, "/result")
        } else {
            ok("result")
        }
    })
    .await;
    let client = HttpClient::new();
    let url = Url::parse(&format!("{}/form", server.base)).unwrap();
    let request = Request::new(Method::POST, &url)
        .unwrap()
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("q=1");

    let response = client.fetch(request, None).await.unwrap();
    assert_eq!(response.text(), "result");

    let follow = server.log.request_lower(1);
    assert!(follow.starts_with("get /result http/1.1"));
    assert!(!follow.contains("content-type:"));
    assert!(!follow.contains("content-length:"));
    assert!(follow.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_307_preserves_method_and_body() {
    let server = spawn_server(|request, _| {
        if request.starts_with("PUT /a ") {
            redirect(307, "/b")
        } else {
            ok("stored")
        }
    })
    .await;
    let client = HttpClient::new();
    let url = Url::parse(&format!("{}/a", server.base)).unwrap();
    let request = Request::new(Method::PUT, &url).unwrap().with_body("payload");

    client.fetch(request, None).await.unwrap();
    let follow = server.log.request_lower(1);
    assert!(follow.starts_with("put /b http/1.1"));
    assert!(follow.ends_with("payload"));
}

#[tokio::test]
async fn test_same_origin_redirect_keeps_authorization() {
    let server = spawn_server(|request, _| {
        if request.starts_with("GET /start ") {
            redirect(302, "/end")
        } else {
            ok("end")
        }
    })
    .await;
    let client = HttpClient::new();

    let request = get(&format!("{}/start", server.base)).with_header("Authorization", "Basic abc");
    client.fetch(request, None).await.unwrap();
    assert!(server.log.request_lower(1).contains("authorization: basic abc"));
}

#[tokio::test]
async fn test_cross_origin_redirect_strips_authorization() {
    let target = spawn_server(|_, _| ok("elsewhere")).await;
    let target_base = target.base.clone();
    let origin = spawn_server(move |_, _| redirect(302, &format!("{target_base}/landing"))).await;
    let client = HttpClient::new();

    let request = get(&origin.base).with_header("Authorization", "Basic abc");
    let response = client.fetch(request, None).await.unwrap();
    assert_eq!(response.text(), "elsewhere");
    assert!(origin.log.request_lower(0).contains("authorization: basic abc"));
    assert!(!target.log.request_lower(0).contains("authorization:"));
    assert!(target
        .log
        .request_lower(0)
        .contains(&format!("host: 127.0.0.1:{}", target.port)));
}

#[tokio::test]
async fn test_cors_checked_on_redirect_hops() {
    // The redirect response itself carries no CORS headers.
    let server = spawn_server(|request, _| {
        if request.starts_with("GET /r ") {
            redirect(302, "/data")
        } else {
            ok_cors("data")
        }
    })
    .await;
    let client = HttpClient::new();

    let err = client
        .fetch(get(&format!("{}/r", server.base)), Some("https://app.example"))
        .await
        .unwrap_err();
    assert_eq!(err, NetError::Failed);
    assert_eq!(server.log.requests().len(), 1);
}

fn ok_cors(body: &str) -> String {
    common::ok_with("Access-Control-Allow-Origin: *\r\n", body)
}
