use serde_json::json;

use super::*;
use crate::handler::Methods;
use crate::message::Request;
use crate::service::ServiceExt;

async fn spawn_http(max_content_length: usize) -> String {
	let server = Server::new();
	server
		.register(
			"vipnode_",
			Methods::new()
				.method("ping", || async { "pong" })
				.method("echo", |value: Value| async move { value })
				.try_method_with_context("whitelist", |ctx: Context, _id: String| async move {
					ctx.service().map(|_| ())
				}),
		)
		.unwrap();

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let http = HttpServer::new(Arc::new(server)).with_max_content_length(max_content_length);
	tokio::spawn(http.serve(listener));
	format!("http://{addr}/")
}

#[tokio::test]
async fn test_http_call() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;
	let service = HttpService::new(endpoint);

	let pong: String = service.call("vipnode_ping", ()).await.unwrap();
	assert_eq!(pong, "pong");

	let echoed: Value = service.call("vipnode_echo", (json!({"a": [1, 2]}),)).await.unwrap();
	assert_eq!(echoed, json!({"a": [1, 2]}));
}

async fn post_message(client: &reqwest::Client, endpoint: &str, message: &Message) -> Message {
	let response = client
		.post(endpoint)
		.body(message.encode().unwrap())
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::OK);
	Message::decode(&response.bytes().await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_http_response_envelope() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;
	let client = reqwest::Client::new();

	let params = json!({"peers": ["a", "b"], "block": 7});
	let request = Message::request(
		Id::from("req-1"),
		Request::new("vipnode_echo", vec![params.clone()]),
	);
	assert_eq!(
		post_message(&client, &endpoint, &request).await,
		Message::response(Some(Id::from("req-1")), Response::Result(params))
	);

	let request = Message::request(Id::from(8), Request::new("vipnode_missing", vec![]));
	assert_eq!(
		post_message(&client, &endpoint, &request).await,
		Message::response(
			Some(Id::from(8)),
			Response::Error(ErrResponse::method_not_found("vipnode_missing"))
		)
	);
}

#[tokio::test]
async fn test_http_method_not_found() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;
	let service = HttpService::new(endpoint);

	let err = service.call_value("foo_doesNotExist", vec![]).await.unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::MethodNotFound));
}

#[tokio::test]
async fn test_http_has_no_reverse_service() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;
	let service = HttpService::new(endpoint);

	let err = service
		.call_value("vipnode_whitelist", vec![json!("node")])
		.await
		.unwrap_err();
	let Error::Rpc(err) = err else {
		panic!("expected rpc error");
	};
	assert_eq!(err.code, ErrorCode::Internal);
	assert!(err.message.contains("No service"));
}

#[tokio::test]
async fn test_http_notification_is_no_content() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;

	let response = reqwest::Client::new()
		.post(&endpoint)
		.body(r#"{"jsonrpc":"2.0","method":"vipnode_ping"}"#)
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

	HttpService::new(endpoint)
		.notify("vipnode_ping", ())
		.await
		.unwrap();
}

#[tokio::test]
async fn test_http_rejects_other_methods() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;

	let response = reqwest::Client::new().get(&endpoint).send().await.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_http_rejects_large_bodies() {
	let endpoint = spawn_http(64).await;

	let big = json!({"jsonrpc": "2.0", "id": 1, "method": "vipnode_echo", "params": ["x".repeat(1024)]});
	let response = reqwest::Client::new()
		.post(&endpoint)
		.body(big.to_string())
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_http_malformed_body() {
	let endpoint = spawn_http(DEFAULT_MAX_CONTENT_LENGTH).await;
	let client = reqwest::Client::new();

	let response = client.post(&endpoint).body("{oops").send().await.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
	let body: Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
	assert_eq!(body["error"]["code"], json!(-32700));
	assert_eq!(body["id"], Value::Null);

	let response = client
		.post(&endpoint)
		.body(r#"{"jsonrpc":"2.0","id":4,"result":1}"#)
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
	let body: Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
	assert_eq!(body["error"]["code"], json!(-32600));
	assert_eq!(body["id"], json!(4));
}

#[tokio::test]
async fn test_http_status_without_body() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let app = Router::new().route(
		"/",
		post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
	);
	tokio::spawn(async move { axum::serve(listener, app).await });

	let err = HttpService::new(format!("http://{addr}/"))
		.call_value("vipnode_ping", vec![])
		.await
		.unwrap_err();
	assert!(matches!(err, Error::Http { status: 503 }), "got {err:?}");
}
