//! End-to-end tests against the real axum server over WebSocket.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tabrelay::{Gateway, GatewayConfig, MemoryStore};
use tabrelay_cli::server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

struct TestGateway {
	addr: String,
	store: Arc<MemoryStore>,
}

impl TestGateway {
	async fn start(command_timeout: Duration) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		let config = GatewayConfig {
			command_timeout,
			..GatewayConfig::default()
		};
		let store = Arc::new(MemoryStore::new());
		let gateway = Gateway::new(&config, store.clone()).unwrap();
		tokio::spawn(server::serve(listener, gateway, std::future::pending()));
		Self { addr, store }
	}

	async fn connect(&self) -> Socket {
		let (ws, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
		ws
	}

	async fn agent(&self, access_code: &str) -> Socket {
		let mut ws = self.connect().await;
		send_json(
			&mut ws,
			json!({"type": "register", "data": {"accessCode": access_code, "userAgent": "Firefox/130"}}),
		)
		.await;
		assert_eq!(next_json(&mut ws).await["type"], "success");
		ws
	}
}

async fn send_text(ws: &mut Socket, text: &str) {
	ws.send(Message::Text(text.to_string())).await.unwrap();
}

async fn send_json(ws: &mut Socket, value: Value) {
	send_text(ws, &value.to_string()).await;
}

async fn next_text(ws: &mut Socket) -> String {
	tokio::time::timeout(REPLY_TIMEOUT, async {
		loop {
			match ws.next().await {
				Some(Ok(Message::Text(text))) => return text,
				Some(Ok(_)) => continue,
				other => panic!("socket ended: {other:?}"),
			}
		}
	})
	.await
	.expect("timed out waiting for a reply")
}

async fn next_json(ws: &mut Socket) -> Value {
	serde_json::from_str(&next_text(ws).await).unwrap()
}

async fn browsers(controller: &mut Socket) -> Vec<Value> {
	send_text(controller, "main:listBrowsers").await;
	let reply = next_json(controller).await;
	assert_eq!(reply["type"], "browsers");
	reply["data"]["browsers"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut stream = TcpStream::connect(&gateway.addr).await.unwrap();
	stream
		.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
		.await
		.unwrap();

	let mut response = String::new();
	stream.read_to_string(&mut response).await.unwrap();
	assert!(response.starts_with("HTTP/1.1 200"));
	assert!(response.ends_with("OK"));
}

#[tokio::test]
async fn raw_ping_gets_raw_pong() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut ws = gateway.connect().await;

	send_text(&mut ws, "ping").await;
	assert_eq!(next_text(&mut ws).await, "pong");
}

#[tokio::test]
async fn command_round_trip() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut agent = gateway.agent("abc").await;
	let mut controller = gateway.connect().await;

	send_text(&mut controller, "main:goto url=https://example.com browser=abc").await;
	let dispatched = next_json(&mut controller).await;
	assert_eq!(dispatched["type"], "dispatched");
	assert_eq!(dispatched["data"]["command"], "goto");
	let command_id = dispatched["data"]["targets"][0]["commandId"].clone();

	let command = next_json(&mut agent).await;
	assert_eq!(command["type"], "command");
	assert_eq!(command["data"]["commandId"], command_id);
	assert_eq!(command["data"]["params"]["url"], "https://example.com");
	assert!(command["data"]["sentAt"].is_u64());

	send_json(
		&mut agent,
		json!({"type": "command_result", "data": {"commandId": command_id, "accessCode": "abc", "success": true, "result": {"title": "Example Domain"}}}),
	)
	.await;

	let outcome = next_json(&mut controller).await;
	assert_eq!(outcome["type"], "command_outcome");
	assert_eq!(outcome["data"]["commandId"], command_id);
	assert_eq!(outcome["data"]["success"], true);
	assert_eq!(outcome["data"]["result"]["title"], "Example Domain");
	assert_eq!(outcome["data"]["timedOut"], false);
}

#[tokio::test]
async fn silent_agent_times_out_the_command() {
	let gateway = TestGateway::start(Duration::from_millis(200)).await;
	let mut agent = gateway.agent("abc").await;
	let mut controller = gateway.connect().await;

	send_text(&mut controller, "main:click selector=#never browser=abc").await;
	let dispatched = next_json(&mut controller).await;
	let command_id = dispatched["data"]["targets"][0]["commandId"].clone();
	assert_eq!(next_json(&mut agent).await["data"]["command"], "click");

	let outcome = next_json(&mut controller).await;
	assert_eq!(outcome["type"], "command_outcome");
	assert_eq!(outcome["data"]["commandId"], command_id);
	assert_eq!(outcome["data"]["timedOut"], true);
	assert_eq!(outcome["data"]["success"], false);
}

#[tokio::test]
async fn heartbeat_is_acknowledged() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut agent = gateway.agent("abc").await;

	send_json(&mut agent, json!({"type": "heartbeat", "data": {"accessCode": "abc", "timestamp": 42}})).await;
	let ack = next_json(&mut agent).await;
	assert_eq!(ack["type"], "heartbeat_ack");
	assert_eq!(ack["data"]["clientTimestamp"], 42);
}

#[tokio::test]
async fn bad_messages_do_not_close_the_connection() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut ws = gateway.connect().await;

	send_text(&mut ws, "{\"type\":\"bogus\",\"data\":{\"accessCode\":\"abc\"}}").await;
	let reply = next_json(&mut ws).await;
	assert_eq!(reply["type"], "error");
	assert_eq!(reply["data"]["accessCode"], "abc");
	assert_eq!(reply["data"]["kind"], "bogus");

	send_text(&mut ws, "main:goto url=x browser=nobody").await;
	let reply = next_json(&mut ws).await;
	assert_eq!(reply["type"], "error");
	assert_eq!(reply["data"]["accessCode"], "nobody");

	send_text(&mut ws, "ping").await;
	assert_eq!(next_text(&mut ws).await, "pong");
}

#[tokio::test]
async fn closing_agent_socket_removes_session() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut agent = gateway.agent("abc").await;
	let mut controller = gateway.connect().await;
	assert_eq!(browsers(&mut controller).await.len(), 1);

	agent.close(None).await.unwrap();

	let mut remaining = 1;
	for _ in 0..50 {
		remaining = browsers(&mut controller).await.len();
		if remaining == 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	assert_eq!(remaining, 0);

	let mut offline = false;
	for _ in 0..50 {
		if gateway.store.get("abc").is_some_and(|record| !record.online) {
			offline = true;
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	assert!(offline);
}

#[tokio::test]
async fn reconnected_agent_receives_later_commands() {
	let gateway = TestGateway::start(Duration::from_secs(30)).await;
	let mut first = gateway.agent("abc").await;
	let mut second = gateway.agent("abc").await;
	let mut controller = gateway.connect().await;

	first.close(None).await.unwrap();
	send_text(&mut controller, "main:reload browser=abc").await;
	assert_eq!(next_json(&mut controller).await["type"], "dispatched");
	assert_eq!(next_json(&mut second).await["data"]["command"], "reload");
	assert_eq!(browsers(&mut controller).await.len(), 1);
}
