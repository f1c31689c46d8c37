#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{Method, StatusCode, Uri, header},
        response::{IntoResponse, Response},
        routing::any,
    },
    chatrelay_channels::{self as channels, Client, Event, User},
    chatrelay_telegram::{TelegramAccountConfig, TelegramClient},
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

const CHAT_ID: i64 = -100;
const FILE_PATH: &str = "documents/file_1.txt";

#[derive(Debug, Clone)]
struct CapturedRequest {
    method: String,
    body: Value,
}

#[derive(Clone, Default)]
struct MockTelegramApi {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    updates: Arc<Mutex<Vec<Value>>>,
    conflict: Arc<AtomicBool>,
}

impl MockTelegramApi {
    fn push_update(&self, update: Value) {
        self.updates.lock().unwrap().push(update);
    }

    fn sent(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .map(|r| r.body.clone())
            .collect()
    }
}

fn ok(result: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result })))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn group_chat() -> Value {
    json!({ "id": CHAT_ID, "type": "group", "title": "Test Group" })
}

async fn telegram_api_handler(
    State(state): State<MockTelegramApi>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    if method == Method::GET {
        return match uri.path().strip_prefix("/file/bottest-token/") {
            Some(FILE_PATH) => ([(header::CONTENT_TYPE, "text/plain")], "hello").into_response(),
            _ => (StatusCode::NOT_FOUND, "no such file").into_response(),
        };
    }
    api_method(state, uri, body).await.into_response()
}

async fn api_method(state: MockTelegramApi, uri: Uri, body: Bytes) -> (StatusCode, Json<Value>) {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.requests.lock().unwrap().push(CapturedRequest {
        method: method.clone(),
        body: body.clone(),
    });

    match method.as_str() {
        "GetMe" => ok(json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Relay",
            "username": "relay_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        })),
        "GetChat" => {
            let mut chat = group_chat();
            chat["accent_color_id"] = json!(0);
            chat["max_reaction_count"] = json!(0);
            ok(chat)
        },
        "GetUpdates" => {
            if state.conflict.load(Ordering::SeqCst) {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "ok": false,
                        "error_code": 409,
                        "description": "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running"
                    })),
                );
            }
            let updates: Vec<Value> = std::mem::take(&mut *state.updates.lock().unwrap());
            if updates.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            ok(Value::Array(updates))
        },
        "GetFile" => {
            let file_id = body["file_id"].as_str().unwrap_or_default();
            if file_id != "doc-1" {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "ok": false,
                        "error_code": 400,
                        "description": "Bad Request: invalid file_id"
                    })),
                );
            }
            ok(json!({
                "file_id": file_id,
                "file_unique_id": "u-doc-1",
                "file_size": 5,
                "file_path": FILE_PATH
            }))
        },
        "GetUserProfilePhotos" => ok(json!({
            "total_count": 1,
            "photos": [[
                { "file_id": "small", "file_unique_id": "u-small", "width": 160, "height": 160, "file_size": 4000 },
                { "file_id": "big", "file_unique_id": "u-big", "width": 640, "height": 640, "file_size": 60000 }
            ]]
        })),
        "SendMessage" => ok(json!({
            "message_id": 77,
            "date": unix_now(),
            "chat": group_chat(),
            "from": { "id": 1, "is_bot": true, "first_name": "Relay" },
            "text": "ok"
        })),
        _ => ok(json!(true)),
    }
}

struct MockServer {
    api: MockTelegramApi,
    bot: teloxide::Bot,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl MockServer {
    async fn start() -> Self {
        let api = MockTelegramApi::default();
        let app = Router::new()
            .route("/{*path}", any(telegram_api_handler))
            .with_state(api.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        let bot = teloxide::Bot::new("test-token").set_api_url(api_url);
        Self {
            api,
            bot,
            shutdown,
            server,
        }
    }

    async fn connect(&self) -> TelegramClient {
        self.connect_with(TelegramAccountConfig {
            token: Secret::new("test-token".into()),
            chats: vec![CHAT_ID.to_string()],
            ..Default::default()
        })
        .await
    }

    async fn connect_with(&self, config: TelegramAccountConfig) -> TelegramClient {
        TelegramClient::with_bot("test-account", config, self.bot.clone())
            .await
            .expect("connect")
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.server.await.expect("server join");
    }
}

fn text_update(update_id: i64, message_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": message_id,
            "date": unix_now() + 5,
            "chat": group_chat(),
            "from": { "id": 7, "is_bot": false, "first_name": "Ann", "username": "ann" },
            "text": text
        }
    })
}

#[tokio::test]
async fn connect_clears_webhook() {
    let mock = MockServer::start().await;
    let client = mock.connect().await;

    assert_eq!(client.account_id(), "test-account");
    assert_eq!(client.configured_chats(), ["-100"]);
    assert_eq!(mock.api.sent("GetMe").len(), 1);
    assert_eq!(mock.api.sent("DeleteWebhook").len(), 1);

    client.close().await.expect("close");
    mock.stop().await;
}

#[tokio::test]
async fn joined_chat_receives_and_sends() {
    let mock = MockServer::start().await;
    let client = mock.connect().await;

    let chat = client.join("-100").await.expect("join");
    assert_eq!(chat.name(), "Test Group");
    assert_eq!(chat.service_name(), "Telegram");
    assert_eq!(mock.api.sent("GetChat").len(), 1);

    // Joining again reuses the route.
    let again = client.join(" -100 ").await.expect("join again");
    assert_eq!(again.name(), "Test Group");
    assert_eq!(mock.api.sent("GetChat").len(), 1);

    mock.api.push_update(text_update(10, 5, "hello"));
    let event = tokio::time::timeout(Duration::from_secs(5), chat.receive())
        .await
        .expect("event in time")
        .expect("receive")
        .expect("an event");
    let Event::Message(msg) = event else {
        panic!("expected a message, got {event:?}");
    };
    assert_eq!(msg.id.as_str(), "5");
    assert_eq!(msg.text, "hello");
    assert_eq!(msg.from.name(), "Ann");

    let ann = User {
        display_name: "Ann".into(),
        ..Default::default()
    };
    let sent = chat.send_as(&ann, "hi <3").await.expect("send");
    assert_eq!(sent.id.as_str(), "77");
    assert_eq!(sent.text, "hi <3");
    assert_eq!(sent.from.name(), "Ann");

    let bodies = mock.api.sent("SendMessage");
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["chat_id"], json!(CHAT_ID));
    assert_eq!(bodies[0]["text"], json!("<b>Ann:</b> hi &lt;3"));
    assert_eq!(bodies[0]["parse_mode"], json!("HTML"));

    client.close().await.expect("close");
    assert!(matches!(chat.receive().await, Ok(None)));
    mock.stop().await;
}

#[tokio::test]
async fn rejects_non_numeric_chat_ids() {
    let mock = MockServer::start().await;
    let client = mock.connect().await;

    let err = client.join("general").await.err().expect("invalid id");
    assert!(matches!(err, channels::Error::InvalidInput { .. }), "{err:?}");
    assert!(mock.api.sent("GetChat").is_empty());

    client.close().await.expect("close");
    mock.stop().await;
}

#[tokio::test]
async fn second_close_reports_closed() {
    let mock = MockServer::start().await;
    let client = mock.connect().await;

    client.close().await.expect("first close");
    let err = client.close().await.err().expect("second close");
    assert!(matches!(err, channels::Error::Closed), "{err:?}");
    mock.stop().await;
}

#[tokio::test]
async fn conflicting_poller_fails_joined_chats() {
    let mock = MockServer::start().await;
    let client = mock.connect().await;
    let chat = client.join("-100").await.expect("join");

    mock.api.conflict.store(true, Ordering::SeqCst);
    let received = tokio::time::timeout(Duration::from_secs(5), chat.receive())
        .await
        .expect("failure in time");
    assert!(
        matches!(received, Err(channels::Error::Unavailable { .. })),
        "{received:?}"
    );
    // The feed stays terminated.
    assert!(matches!(chat.receive().await, Ok(None)));

    assert!(client.close().await.is_err());
    mock.stop().await;
}

/// Serve `router` on a local port, returning its base URL.
async fn serve(router: Router) -> (String, oneshot::Sender<()>, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind media listener");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("serve media");
    });
    (format!("http://{addr}"), shutdown, server)
}

#[tokio::test]
async fn media_proxy_streams_files() {
    let mock = MockServer::start().await;
    let client = mock.connect().await;
    let (base, shutdown, server) = serve(client.media_proxy().router()).await;

    let response = reqwest::get(format!("{base}/doc-1")).await.expect("fetch file");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers().get(reqwest::header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    assert_eq!(response.text().await.unwrap(), "hello");

    // The file path is cached after the first lookup.
    let again = reqwest::get(format!("{base}/doc-1")).await.expect("fetch again");
    assert_eq!(again.text().await.unwrap(), "hello");
    assert_eq!(mock.api.sent("GetFile").len(), 1);

    let missing = reqwest::get(format!("{base}/nope")).await.expect("fetch missing");
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);
    let body = missing.text().await.unwrap();
    assert_eq!(body, "Telegram getFile failed");
    assert!(!body.contains("test-token"));

    let _ = shutdown.send(());
    server.await.expect("media server join");
    client.close().await.expect("close");
    mock.stop().await;
}

#[tokio::test]
async fn senders_get_profile_photo_links() {
    let mock = MockServer::start().await;
    let client = mock
        .connect_with(TelegramAccountConfig {
            token: Secret::new("test-token".into()),
            chats: vec![CHAT_ID.to_string()],
            media_base_url: Some("https://relay.example/telegram/test-account/media".into()),
            ..Default::default()
        })
        .await;
    let chat = client.join("-100").await.expect("join");

    // The lookup runs in the background, so early messages may lack a photo.
    let mut photo_url = None;
    for n in 0..50 {
        mock.api.push_update(text_update(100 + n, 200 + n, "hi"));
        let event = tokio::time::timeout(Duration::from_secs(5), chat.receive())
            .await
            .expect("event in time")
            .expect("receive")
            .expect("an event");
        let Event::Message(msg) = event else {
            panic!("expected a message, got {event:?}");
        };
        if msg.from.photo_url.is_some() {
            photo_url = msg.from.photo_url;
            break;
        }
    }
    assert_eq!(
        photo_url.as_deref(),
        Some("https://relay.example/telegram/test-account/media/big")
    );
    // Refreshed at most once per interval.
    assert_eq!(mock.api.sent("GetUserProfilePhotos").len(), 1);

    client.close().await.expect("close");
    mock.stop().await;
}
