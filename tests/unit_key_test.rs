use cachegate::core::key::{AUTH_PREFIX_LEN, BODY_PREFIX_LEN, KeyBuilder, normalize_path};
use url::Url;

fn builder() -> KeyBuilder {
    KeyBuilder::new(Url::parse("http://localhost").unwrap())
}

#[test]
fn test_key_is_deterministic() {
    let keys = builder();
    let a = keys.build("GET", "/api/members?page=2", None, Some("Bearer abc"));
    let b = keys.build("GET", "/api/members?page=2", None, Some("Bearer abc"));
    assert_eq!(a, b);
}

#[test]
fn test_distinct_resource_ids_get_distinct_keys() {
    let keys = builder();
    let a = keys.build("GET", "/api/members/42", None, Some("Bearer abc"));
    let b = keys.build("GET", "/api/members/43", None, Some("Bearer abc"));
    assert_ne!(a, b);
}

#[test]
fn test_query_string_participates_in_key() {
    let keys = builder();
    let a = keys.build("GET", "/api/members?page=1", None, None);
    let b = keys.build("GET", "/api/members?page=2", None, None);
    assert_ne!(a, b);
}

#[test]
fn test_different_auth_prefixes_get_distinct_keys() {
    let keys = builder();
    let a = keys.build("GET", "/api/members", None, Some("Bearer alice-token"));
    let b = keys.build("GET", "/api/members", None, Some("Bearer bob-token"));
    assert_ne!(a, b);
}

#[test]
fn test_only_auth_prefix_participates() {
    // Two credentials sharing the bounded prefix map to the same key.
    let keys = builder();
    let shared_prefix: String = "x".repeat(AUTH_PREFIX_LEN);
    let a = keys.build("GET", "/api/members", None, Some(&format!("{shared_prefix}AAAA")));
    let b = keys.build("GET", "/api/members", None, Some(&format!("{shared_prefix}BBBB")));
    assert_eq!(a, b);
}

#[test]
fn test_body_prefix_is_bounded() {
    let keys = builder();
    let shared_prefix: String = "b".repeat(BODY_PREFIX_LEN);
    let a = keys.build("GET", "/api/report", Some(&format!("{shared_prefix}-tail-one")), None);
    let b = keys.build("GET", "/api/report", Some(&format!("{shared_prefix}-tail-two")), None);
    assert_eq!(a, b);

    let c = keys.build("GET", "/api/report", Some("{\"week\":1}"), None);
    let d = keys.build("GET", "/api/report", Some("{\"week\":2}"), None);
    assert_ne!(c, d);
}

#[test]
fn test_delimiter_in_components_cannot_shift_boundaries() {
    // A literal `|` inside the body or credential must not let one component
    // masquerade as part of its neighbor.
    let keys = builder();
    let a = keys.build("GET", "/api/report", Some("x|tok"), Some("A"));
    let b = keys.build("GET", "/api/report", Some("x"), Some("tok|A"));
    assert_ne!(a, b);

    // Escaping does not disturb delimiter-free inputs.
    let c = keys.build("GET", "/api/report", Some("x|tok"), Some("A"));
    assert_eq!(a, c);
}

#[test]
fn test_absolute_and_relative_urls_resolve_to_same_key() {
    let keys = builder();
    let a = keys.build("GET", "http://localhost/api/members", None, None);
    let b = keys.build("GET", "/api/members", None, None);
    assert_eq!(a, b);
}

#[test]
fn test_fallback_keys_never_collide() {
    // "http://[" fails to parse even relative to the base origin.
    let keys = builder();
    let a = keys.build("GET", "http://[broken", None, None);
    let b = keys.build("GET", "http://[broken", None, None);
    assert_ne!(a, b);
    assert!(a.as_str().contains("fallback:"));
}

#[test]
fn test_normalize_path_replaces_numeric_segments() {
    assert_eq!(
        normalize_path("/api/members/42/sessions/7"),
        "/api/members/:id/sessions/:id"
    );
    assert_eq!(normalize_path("/api/members"), "/api/members");
    // Mixed segments stay literal.
    assert_eq!(normalize_path("/api/plans/7b"), "/api/plans/7b");
}

#[test]
fn test_key_keeps_literal_ids() {
    // Normalization is for policy lookup only; the key itself keeps the id.
    let keys = builder();
    let key = keys.build("GET", "/api/members/42", None, None);
    assert!(key.as_str().contains("/api/members/42"));

    assert_eq!(
        keys.normalized_path("/api/members/42").as_deref(),
        Some("/api/members/:id")
    );
}
