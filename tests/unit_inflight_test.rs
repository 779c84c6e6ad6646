use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cachegate::GatewayError;
use cachegate::core::fetch::ResponsePayload;
use cachegate::core::inflight::{Flight, InFlightRegistry};
use cachegate::core::key::CacheKey;
use futures::FutureExt;

fn payload(body: &str) -> ResponsePayload {
    ResponsePayload::new(200, body.as_bytes().to_vec())
}

#[tokio::test]
async fn test_concurrent_callers_share_one_invocation() {
    let registry = Arc::new(InFlightRegistry::new());
    let invocations = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::new("GET|/api/members|||");

    let counter = invocations.clone();
    let first = registry.begin(&key, move || {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(payload("{\"count\":5}"))
        }
        .boxed()
    });
    assert!(matches!(first, Flight::Leader(_)));
    assert!(registry.contains(&key));

    // Arrives while the first is in transit; its factory must not run.
    let counter = invocations.clone();
    let second = registry.begin(&key, move || {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(payload("{\"count\":999}"))
        }
        .boxed()
    });
    assert!(matches!(second, Flight::Follower(_)));

    let (a, b) = tokio::join!(first.shared(), second.shared());
    assert_eq!(a, b);
    assert_eq!(a.unwrap(), payload("{\"count\":5}"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // Settling removed the key.
    assert!(!registry.contains(&key));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_failure_settles_all_callers_and_frees_the_key() {
    let registry = Arc::new(InFlightRegistry::new());
    let key = CacheKey::new("GET|/api/members|||");

    let first = registry.begin(&key, || {
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(GatewayError::Network("connection refused".into()))
        }
        .boxed()
    });
    let follower = registry.get(&key).expect("flight should be pending");

    let (a, b) = tokio::join!(first.shared(), follower);
    assert_eq!(a, b);
    assert_eq!(
        a.unwrap_err(),
        GatewayError::Network("connection refused".into())
    );

    // A failed request must not leave a stuck key: the next call retries.
    assert!(!registry.contains(&key));
    let retry = registry.begin(&key, || async move { Ok(payload("{}")) }.boxed());
    assert!(matches!(retry, Flight::Leader(_)));
}

#[tokio::test]
async fn test_distinct_keys_fly_independently() {
    let registry = Arc::new(InFlightRegistry::new());
    let a = CacheKey::new("GET|/api/members/42|||");
    let b = CacheKey::new("GET|/api/members/43|||");

    let flight_a = registry.begin(&a, || {
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(payload("{\"id\":42}"))
        }
        .boxed()
    });
    let flight_b = registry.begin(&b, || {
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(payload("{\"id\":43}"))
        }
        .boxed()
    });
    assert!(matches!(flight_a, Flight::Leader(_)));
    assert!(matches!(flight_b, Flight::Leader(_)));
    assert_eq!(registry.len(), 2);

    let (ra, rb) = tokio::join!(flight_a.shared(), flight_b.shared());
    assert_ne!(ra.unwrap(), rb.unwrap());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_clear_drops_pending_flights() {
    let registry = Arc::new(InFlightRegistry::new());
    let key = CacheKey::new("GET|/api/members|||");
    let _flight = registry.begin(&key, || {
        async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(payload("{}"))
        }
        .boxed()
    });
    assert_eq!(registry.len(), 1);
    registry.clear();
    assert!(registry.is_empty());
}
