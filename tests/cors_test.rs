use browsernet::cors::{has_enforceable_document_origin, is_cors_eligible_request_url, CorsConfig, CorsPolicy};
use browsernet::{HeaderMap, Origin};
use http::Method;
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn response(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.append(name, *value);
    }
    headers
}

#[test]
fn test_origin_from_url() {
    let origin = Origin::from_url(&url("HTTPS://App.Example:443/path?q"));
    assert_eq!(origin.ascii_serialization(), "https://app.example");
    assert_eq!(Origin::from_url(&url("http://a.example:8080/")).to_string(), "http://a.example:8080");
    assert!(Origin::from_url(&url("data:text/plain,hi")).is_opaque());
}

#[test]
fn test_origin_parse() {
    assert!(Origin::parse("null").unwrap().is_opaque());
    assert!(Origin::parse("https://app.example").is_ok());
    assert!(Origin::parse("https://app.example/").is_err());
    assert!(Origin::parse("https://app.example:443").is_err());
    assert!(Origin::parse("").is_err());
    assert!(Origin::parse("app.example").is_err());
}

#[test]
fn test_opaque_origins_are_never_same_origin() {
    let a = Origin::parse("null").unwrap();
    let b = Origin::parse("null").unwrap();
    assert!(!a.is_same_origin(&b));
}

#[test]
fn test_enforceable_document_origin() {
    assert!(has_enforceable_document_origin("https://app.example"));
    assert!(!has_enforceable_document_origin("null"));
    assert!(!has_enforceable_document_origin("not an origin"));
}

#[test]
fn test_eligible_request_urls() {
    assert!(is_cors_eligible_request_url(&url("https://api.example/v1")));
    assert!(!is_cors_eligible_request_url(&url("ftp://api.example/")));
    assert!(!is_cors_eligible_request_url(&url("https://user:pw@api.example/")));
    assert!(!is_cors_eligible_request_url(&url("https://api.example/#frag")));
    assert!(!is_cors_eligible_request_url(&url("https://api.example/a%00b")));
}

#[test]
fn test_decide() {
    let policy = CorsPolicy::default();
    let same = policy.decide("https://app.example", &url("https://app.example/x"), &Method::GET);
    assert!(!same.cross_origin);
    assert!(!same.attach_origin_header);

    let same_post = policy.decide("https://app.example", &url("https://app.example/x"), &Method::POST);
    assert!(same_post.attach_origin_header);

    let cross = policy.decide("https://app.example", &url("https://api.example/x"), &Method::GET);
    assert!(cross.cross_origin);
    assert!(cross.attach_origin_header);

    let policy = CorsPolicy::new(CorsConfig { origin_on_same_origin_unsafe_methods: false });
    let same_post = policy.decide("https://app.example", &url("https://app.example/x"), &Method::POST);
    assert!(!same_post.attach_origin_header);
}

#[test]
fn test_outgoing_origin_header_is_replaced() {
    let policy = CorsPolicy::default();
    let mut headers = response(&[("Origin", "https://evil.example")]);
    policy.normalize_outgoing_origin_header(&mut headers, "https://app.example", &url("https://api.example/"), &Method::GET);
    assert_eq!(headers.get_all("origin"), ["https://app.example"]);

    let mut headers = response(&[("Origin", "https://evil.example")]);
    policy.normalize_outgoing_origin_header(&mut headers, "https://app.example", &url("https://app.example/"), &Method::GET);
    assert!(!headers.has("origin"));
}

#[test]
fn test_response_exposure() {
    let policy = CorsPolicy::default();
    let doc = "https://app.example";
    let api = url("https://api.example/data");

    assert!(policy.cors_allows_response(doc, &url("https://app.example/"), &HeaderMap::new(), true));
    assert!(!policy.cors_allows_response(doc, &api, &HeaderMap::new(), false));
    assert!(policy.cors_allows_response(doc, &api, &response(&[("Access-Control-Allow-Origin", "*")]), false));
    for spelling in ["HTTPS://APP.EXAMPLE", "https://app.example:443", "https://app.example/"] {
        let acao = response(&[("Access-Control-Allow-Origin", spelling)]);
        assert!(!policy.cors_allows_response(doc, &api, &acao, false), "{spelling}");
        let with_credentials =
            response(&[("Access-Control-Allow-Origin", spelling), ("Access-Control-Allow-Credentials", "true")]);
        assert!(!policy.cors_allows_response(doc, &api, &with_credentials, true), "{spelling}");
    }
    assert!(!policy.cors_allows_response(
        doc,
        &api,
        &response(&[("Access-Control-Allow-Origin", "https://app.example"), ("Access-Control-Allow-Origin", "*")]),
        false
    ));
}

#[test]
fn test_credentialed_response_exposure() {
    let policy = CorsPolicy::default();
    let doc = "https://app.example";
    let api = url("https://api.example/data");

    let wildcard = response(&[("Access-Control-Allow-Origin", "*"), ("Access-Control-Allow-Credentials", "true")]);
    assert!(!policy.cors_allows_response(doc, &api, &wildcard, true));

    let exact = response(&[
        ("Access-Control-Allow-Origin", "https://app.example"),
        ("Access-Control-Allow-Credentials", "true"),
    ]);
    assert!(policy.cors_allows_response(doc, &api, &exact, true));

    let wrong_case = response(&[
        ("Access-Control-Allow-Origin", "https://app.example"),
        ("Access-Control-Allow-Credentials", "TRUE"),
    ]);
    assert!(!policy.cors_allows_response(doc, &api, &wrong_case, true));
}

#[test]
fn test_null_document_origin() {
    let policy = CorsPolicy::default();
    let api = url("https://api.example/");
    assert!(policy.is_cross_origin("null", &api));
    assert!(policy.cors_allows_response("null", &api, &response(&[("Access-Control-Allow-Origin", "null")]), false));
    assert!(policy.cors_allows_response("null", &api, &response(&[("Access-Control-Allow-Origin", "*")]), false));
}

#[test]
fn test_malformed_document_origin_fails_closed() {
    let policy = CorsPolicy::default();
    let api = url("https://api.example/");
    let wildcard = response(&[("Access-Control-Allow-Origin", "*")]);
    assert!(!policy.cors_allows_response("", &api, &wildcard, false));
    assert!(!policy.cors_allows_response("https://app.example/", &api, &wildcard, false));
    assert!(!policy.should_attach_origin_header("garbage", &api, &Method::POST));
}
