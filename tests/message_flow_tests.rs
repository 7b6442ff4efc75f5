//! Integration tests for the HTTP request path: send, list, acknowledge,
//! delete, contacts, and the sidebar — all against a live server on an
//! ephemeral port.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use parley::chat::ChatService;
use parley::media::MediaClient;
use parley::presence::PresenceHub;
use parley::server::router::build_router;
use parley::server::state::{AppState, SharedState};
use parley::storage::Storage;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn start_server() -> (String, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    let hub = Arc::new(PresenceHub::new());
    let chat = ChatService::new(hub, MediaClient::new(None));
    let state: SharedState = Arc::new(Mutex::new(AppState { storage, chat }));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("127.0.0.1:{}", addr.port()), shutdown_tx)
}

/// Blocking ureq call with the auth header; returns the JSON body or the
/// HTTP status code of the error response.
fn request(
    method: &str,
    addr: &str,
    path: &str,
    user: Option<&str>,
    body: Option<serde_json::Value>,
) -> Result<serde_json::Value, u16> {
    let url = format!("http://{addr}{path}");
    let mut req = ureq::request(method, &url);
    if let Some(user) = user {
        req = req.set("X-User-Id", user);
    }
    let result = match body {
        Some(json) => req.send_json(json),
        None => req.call(),
    };
    match result {
        Ok(resp) => Ok(resp.into_json().expect("json body")),
        Err(ureq::Error::Status(code, _)) => Err(code),
        Err(e) => panic!("transport error: {e}"),
    }
}

async fn api(
    method: &'static str,
    addr: &str,
    path: &str,
    user: Option<&'static str>,
    body: Option<serde_json::Value>,
) -> Result<serde_json::Value, u16> {
    let addr = addr.to_string();
    let path = path.to_string();
    tokio::task::spawn_blocking(move || request(method, &addr, &path, user, body))
        .await
        .expect("request task")
}

async fn create_user(addr: &str, id: &str, name: &str) {
    let body = serde_json::json!({ "user_id": id, "display_name": name });
    api("POST", addr, "/api/users", None, Some(body))
        .await
        .expect("create user");
}

async fn send_text(addr: &str, from: &'static str, to: &str, text: &str) -> serde_json::Value {
    let path = format!("/api/messages/{to}");
    api(
        "POST",
        addr,
        &path,
        Some(from),
        Some(serde_json::json!({ "text": text })),
    )
    .await
    .expect("send message")
}

// ---------------------------------------------------------------------------
// Users and auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn user_creation_and_lookup() {
    let (addr, _shutdown) = start_server().await;

    create_user(&addr, "alice", "Alice").await;
    let profile = api("GET", &addr, "/api/users/alice", None, None)
        .await
        .unwrap();
    assert_eq!(profile["display_name"], "Alice");

    // Duplicate id conflicts
    let err = api(
        "POST",
        &addr,
        "/api/users",
        None,
        Some(serde_json::json!({ "user_id": "alice", "display_name": "Alice II" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, 409);

    assert_eq!(
        api("GET", &addr, "/api/users/nobody", None, None)
            .await
            .unwrap_err(),
        404
    );
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let (addr, _shutdown) = start_server().await;
    assert_eq!(
        api("GET", &addr, "/api/sidebar", None, None)
            .await
            .unwrap_err(),
        401
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let (addr, _shutdown) = start_server().await;
    let health = api("GET", &addr, "/api/health", None, None).await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["online_connections"], 0);
}

// ---------------------------------------------------------------------------
// Send and list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_validations() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;

    // Self-messaging
    let err = api(
        "POST",
        &addr,
        "/api/messages/alice",
        Some("alice"),
        Some(serde_json::json!({ "text": "hi me" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, 400);

    // Unknown receiver
    let err = api(
        "POST",
        &addr,
        "/api/messages/nobody",
        Some("alice"),
        Some(serde_json::json!({ "text": "hi" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, 404);

    // Empty content
    let err = api(
        "POST",
        &addr,
        "/api/messages/bob",
        Some("alice"),
        Some(serde_json::json!({ "text": "   " })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, 400);
}

#[tokio::test]
async fn send_then_list_round_trip() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;

    let sent = send_text(&addr, "alice", "bob", "hello bob").await;
    assert_eq!(sent["status"], "sent"); // bob is offline
    let message_id = sent["message_id"].as_str().unwrap().to_string();

    let listed = api("GET", &addr, "/api/messages/bob", Some("alice"), None)
        .await
        .unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["message_id"], message_id.as_str());
    // Fresh sends are never seen
    assert_ne!(listed[0]["status"], "seen");
}

#[tokio::test]
async fn reply_threading() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;
    create_user(&addr, "carol", "Carol").await;

    let first = send_text(&addr, "alice", "bob", "original").await;
    let first_id = first["message_id"].as_str().unwrap().to_string();
    let unrelated = send_text(&addr, "alice", "carol", "elsewhere").await;

    let reply = api(
        "POST",
        &addr,
        "/api/messages/alice",
        Some("bob"),
        Some(serde_json::json!({ "text": "replying", "reply_to": first_id })),
    )
    .await
    .unwrap();
    assert_eq!(reply["reply_to"]["message_id"], first_id.as_str());
    assert_eq!(reply["reply_to"]["text"], "original");

    // A reply must reference the same conversation
    let err = api(
        "POST",
        &addr,
        "/api/messages/alice",
        Some("bob"),
        Some(serde_json::json!({
            "text": "bad reply",
            "reply_to": unrelated["message_id"],
        })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, 400);
}

// ---------------------------------------------------------------------------
// Acknowledgments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mark_seen_guards_and_idempotence() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;

    let sent = send_text(&addr, "alice", "bob", "look").await;
    let message_id = sent["message_id"].as_str().unwrap().to_string();
    let seen_path = format!("/api/messages/{message_id}/seen");

    // Only the receiver may mark seen
    assert_eq!(
        api("PUT", &addr, &seen_path, Some("alice"), None)
            .await
            .unwrap_err(),
        403
    );
    assert_eq!(
        api("PUT", &addr, "/api/messages/missing/seen", Some("bob"), None)
            .await
            .unwrap_err(),
        404
    );

    let result = api("PUT", &addr, &seen_path, Some("bob"), None)
        .await
        .unwrap();
    assert_eq!(result["status"], "seen");

    // Second call: same result, no error
    let result = api("PUT", &addr, &seen_path, Some("bob"), None)
        .await
        .unwrap();
    assert_eq!(result["status"], "seen");

    // A late delivery ack never downgrades
    let delivered_path = format!("/api/messages/{message_id}/delivered");
    let result = api("PUT", &addr, &delivered_path, Some("bob"), None)
        .await
        .unwrap();
    assert_eq!(result["status"], "seen");
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_for_me_keeps_peer_view() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;

    let sent = send_text(&addr, "alice", "bob", "oops").await;
    let message_id = sent["message_id"].as_str().unwrap().to_string();

    let path = format!("/api/messages/{message_id}/for-me");
    api("DELETE", &addr, &path, Some("alice"), None)
        .await
        .unwrap();

    let mine = api("GET", &addr, "/api/messages/bob", Some("alice"), None)
        .await
        .unwrap();
    assert!(mine.as_array().unwrap().is_empty());

    // Bob's view is unredacted and intact
    let theirs = api("GET", &addr, "/api/messages/alice", Some("bob"), None)
        .await
        .unwrap();
    let theirs = theirs.as_array().unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0]["text"], "oops");
}

#[tokio::test]
async fn delete_for_everyone_redacts_for_both() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;

    let sent = send_text(&addr, "alice", "bob", "secret").await;
    let message_id = sent["message_id"].as_str().unwrap().to_string();
    let path = format!("/api/messages/{message_id}/for-everyone");

    // A non-sender is rejected and nothing changes
    assert_eq!(
        api("DELETE", &addr, &path, Some("bob"), None)
            .await
            .unwrap_err(),
        403
    );
    let theirs = api("GET", &addr, "/api/messages/alice", Some("bob"), None)
        .await
        .unwrap();
    assert_eq!(theirs.as_array().unwrap()[0]["text"], "secret");

    let redacted = api("DELETE", &addr, &path, Some("alice"), None)
        .await
        .unwrap();
    assert_eq!(redacted["text"], "deleted");
    assert_eq!(redacted["deleted_for_everyone"], true);

    // Both participants now list the redacted record
    for (me, peer) in [("alice", "bob"), ("bob", "alice")] {
        let listed = api("GET", &addr, &format!("/api/messages/{peer}"), Some(me), None)
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap()[0]["text"], "deleted");
    }
}

#[tokio::test]
async fn clear_conversation_is_one_sided() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "bob", "Bob").await;

    send_text(&addr, "alice", "bob", "one").await;
    send_text(&addr, "bob", "alice", "two").await;

    let result = api("DELETE", &addr, "/api/conversations/bob", Some("alice"), None)
        .await
        .unwrap();
    assert_eq!(result["hidden"], 2);

    let mine = api("GET", &addr, "/api/messages/bob", Some("alice"), None)
        .await
        .unwrap();
    assert!(mine.as_array().unwrap().is_empty());

    let theirs = api("GET", &addr, "/api/messages/alice", Some("bob"), None)
        .await
        .unwrap();
    assert_eq!(theirs.as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Contacts and sidebar
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contact_validations() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "carol", "Carol").await;

    // Self and unknown peers are rejected
    assert_eq!(
        api(
            "POST",
            &addr,
            "/api/contacts",
            Some("alice"),
            Some(serde_json::json!({ "peer_id": "alice" })),
        )
        .await
        .unwrap_err(),
        400
    );
    assert_eq!(
        api(
            "POST",
            &addr,
            "/api/contacts",
            Some("alice"),
            Some(serde_json::json!({ "peer_id": "nobody" })),
        )
        .await
        .unwrap_err(),
        404
    );

    api(
        "POST",
        &addr,
        "/api/contacts",
        Some("alice"),
        Some(serde_json::json!({ "peer_id": "carol", "display_name": "Caz" })),
    )
    .await
    .unwrap();

    // Duplicate add conflicts
    assert_eq!(
        api(
            "POST",
            &addr,
            "/api/contacts",
            Some("alice"),
            Some(serde_json::json!({ "peer_id": "carol" })),
        )
        .await
        .unwrap_err(),
        409
    );

    let contacts = api("GET", &addr, "/api/contacts", Some("alice"), None)
        .await
        .unwrap();
    let contacts = contacts.as_array().unwrap().clone();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0]["display_name"], "Caz");
    assert_eq!(contacts[0]["is_saved"], true);
}

#[tokio::test]
async fn sidebar_merges_contacts_and_recents() {
    let (addr, _shutdown) = start_server().await;
    create_user(&addr, "alice", "Alice").await;
    create_user(&addr, "carol", "Carol").await;
    create_user(&addr, "rita", "Rita").await;

    // Carol is a saved contact, Rita only a recent chat partner
    api(
        "POST",
        &addr,
        "/api/contacts",
        Some("alice"),
        Some(serde_json::json!({ "peer_id": "carol" })),
    )
    .await
    .unwrap();
    send_text(&addr, "alice", "rita", "hey rita").await;

    let sidebar = api("GET", &addr, "/api/sidebar", Some("alice"), None)
        .await
        .unwrap();
    let sidebar = sidebar.as_array().unwrap().clone();
    assert_eq!(sidebar.len(), 2);
    assert_eq!(sidebar[0]["peer_id"], "carol");
    assert_eq!(sidebar[0]["is_saved"], true);
    assert_eq!(sidebar[1]["peer_id"], "rita");
    assert_eq!(sidebar[1]["is_saved"], false);

    // Messaging also made alice a recent partner for rita
    let ritas = api("GET", &addr, "/api/sidebar", Some("rita"), None)
        .await
        .unwrap();
    assert_eq!(ritas.as_array().unwrap()[0]["peer_id"], "alice");

    // Saving rita merges her entry into a single saved one
    api(
        "POST",
        &addr,
        "/api/contacts",
        Some("alice"),
        Some(serde_json::json!({ "peer_id": "rita" })),
    )
    .await
    .unwrap();
    let sidebar = api("GET", &addr, "/api/sidebar", Some("alice"), None)
        .await
        .unwrap();
    let sidebar = sidebar.as_array().unwrap().clone();
    assert_eq!(sidebar.len(), 2);
    let rita = sidebar
        .iter()
        .find(|e| e["peer_id"] == "rita")
        .expect("rita entry");
    assert_eq!(rita["is_saved"], true);
}
