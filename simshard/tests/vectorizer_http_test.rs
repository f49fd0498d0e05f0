//! Wire-level tests for the TF-Serving vectorizer client against a local
//! stub endpoint.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum::Router;
use simshard::vectorizer::tf_serving::TfServingVectorizer;
use simshard::vectorizer::Vectorizer;
use simshard::Error;
use std::net::SocketAddr;

async fn spawn_stub(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_vectorize_parses_nested_outputs() {
    // The model path contains a ':' verb, so the stub answers on any route.
    let router = Router::new().fallback(|body: String| async move {
        // The request body carries a one-element batch.
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["inputs"]["text"].as_array().unwrap().len(), 1);
        Json(serde_json::json!({"outputs": [[0.1, 0.2, 0.3, 0.4]]}))
    });
    let addr = spawn_stub(router).await;

    let vectorizer = TfServingVectorizer::new(&format!("http://{addr}"), "USE-lite-v2", 4);
    let vector = vectorizer.vectorize("hello world").await.unwrap();
    assert_eq!(vector.len(), 4);
    assert!((vector[1] - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn test_non_2xx_is_a_vectorizer_error() {
    let router = Router::new()
        .fallback(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model exploded").into_response() });
    let addr = spawn_stub(router).await;

    let vectorizer = TfServingVectorizer::new(&format!("http://{addr}"), "USE-lite-v2", 4);
    let err = vectorizer.vectorize("hello").await.unwrap_err();
    match err {
        Error::Vectorizer(msg) => assert!(msg.contains("500"), "unexpected message: {msg}"),
        other => panic!("expected a vectorizer error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dimension_mismatch_is_rejected() {
    let router = Router::new()
        .fallback(|| async { Json(serde_json::json!({"outputs": [[0.5, 0.5]]})) });
    let addr = spawn_stub(router).await;

    let vectorizer = TfServingVectorizer::new(&format!("http://{addr}"), "USE-lite-v2", 512);
    let err = vectorizer.vectorize("hello").await.unwrap_err();
    assert!(matches!(err, Error::Vectorizer(_)));
}
