use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use url::Url;

use itsm::messaging::{
    FailurePolicy, MemoryBroker, MessageRelay, PublishOptions, QueueName, RelayOptions, Settlement,
};
use itsm::notifications::{NotificationWorker, SlackClient, SlackSettings};

type Captured = Arc<Mutex<Vec<Value>>>;

struct StubSlack {
    base: Url,
    captured: Captured,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl StubSlack {
    async fn start(status: StatusCode) -> Self {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/api/chat.postMessage",
                post(
                    move |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                        let channel = body["channel"].clone();
                        captured.lock().expect("capture lock").push(body);
                        (
                            status,
                            Json(json!({"ok": true, "channel": channel, "ts": "1700000000.000100"})),
                        )
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            base: Url::parse(&format!("http://{addr}/api/")).expect("stub url"),
            captured,
            shutdown,
            handle,
        }
    }

    fn requests(&self) -> Vec<Value> {
        self.captured.lock().expect("capture lock").clone()
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

fn slack_client(base: Url, token: Option<&str>) -> Arc<SlackClient> {
    let settings = SlackSettings {
        bot_token: token.map(str::to_string),
        default_channel: "#notifications".to_string(),
        api_base_url: base,
    };
    Arc::new(SlackClient::new(&settings).expect("slack client"))
}

fn relay_for(broker: &MemoryBroker) -> MessageRelay {
    MessageRelay::new(
        Arc::new(broker.clone()),
        RelayOptions {
            failure_policy: FailurePolicy::Drop,
            ..Default::default()
        },
    )
}

/// Runs the worker until `expected` deliveries have been settled.
async fn drain(relay: &MessageRelay, broker: &MemoryBroker, worker: &NotificationWorker, expected: usize) {
    let settled = async {
        while broker.settlements().len() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(
        Duration::from_secs(10),
        relay.consume_messages(QueueName::NotificationSend, worker, settled),
    )
    .await
    .expect("worker should settle in time")
    .expect("consume should succeed");
}

#[tokio::test]
async fn error_notification_reaches_slack_with_error_marker() {
    let slack = StubSlack::start(StatusCode::OK).await;
    let broker = MemoryBroker::new();
    let relay = relay_for(&broker);
    let worker = NotificationWorker::new(slack_client(slack.base.clone(), Some("xoxb-test")));

    relay
        .publish_message(
            QueueName::NotificationSend,
            json!({"userId": 5, "type": "error", "title": "X", "message": "Y"}),
            PublishOptions::default(),
        )
        .await
        .expect("publish");

    drain(&relay, &broker, &worker, 1).await;

    let requests = slack.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["channel"], "#notifications");
    let text = request["text"].as_str().expect("text");
    assert!(text.starts_with("❌ [ERROR] X\n\nY"), "unexpected text: {text}");
    assert!(text.contains("• source: notification-worker"));
    assert!(text.ends_with("_User: <@5>_"));

    assert!(matches!(broker.settlements()[0].1, Settlement::Acked));
    relay.close().await;
    slack.stop().await;
}

#[tokio::test]
async fn payload_channel_overrides_default() {
    let slack = StubSlack::start(StatusCode::OK).await;
    let broker = MemoryBroker::new();
    let relay = relay_for(&broker);
    let worker = NotificationWorker::new(slack_client(slack.base.clone(), Some("xoxb-test")));

    relay
        .publish_message(
            QueueName::NotificationSend,
            json!({"type": "success", "channel": "#ops"}),
            PublishOptions::default(),
        )
        .await
        .expect("publish");

    drain(&relay, &broker, &worker, 1).await;

    let requests = slack.requests();
    assert_eq!(requests[0]["channel"], "#ops");
    let text = requests[0]["text"].as_str().expect("text");
    assert!(text.starts_with("✅ [SUCCESS] System notification\n\nYou have a new notification"));
    slack.stop().await;
}

#[tokio::test]
async fn slack_outage_is_contained() {
    let slack = StubSlack::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let broker = MemoryBroker::new();
    let relay = relay_for(&broker);
    let worker = NotificationWorker::new(slack_client(slack.base.clone(), Some("xoxb-test")));

    relay
        .publish_message(
            QueueName::NotificationSend,
            json!({"type": "warning", "title": "Disk"}),
            PublishOptions::default(),
        )
        .await
        .expect("publish");

    drain(&relay, &broker, &worker, 1).await;

    assert_eq!(slack.requests().len(), 1);
    assert!(matches!(broker.settlements()[0].1, Settlement::Acked));
    slack.stop().await;
}

#[tokio::test]
async fn unconfigured_slack_skips_and_acks() {
    let broker = MemoryBroker::new();
    let relay = relay_for(&broker);
    let base = Url::parse("http://127.0.0.1:9/api/").expect("url");
    let worker = NotificationWorker::new(slack_client(base, None));

    relay
        .publish_message(
            QueueName::NotificationSend,
            json!({"type": "info"}),
            PublishOptions::default(),
        )
        .await
        .expect("publish");

    drain(&relay, &broker, &worker, 1).await;
    assert!(matches!(broker.settlements()[0].1, Settlement::Acked));
}

#[tokio::test]
async fn malformed_payload_is_dropped() {
    let broker = MemoryBroker::new();
    let relay = relay_for(&broker);
    relay.connect().await.expect("connect");
    let base = Url::parse("http://127.0.0.1:9/api/").expect("url");
    let worker = NotificationWorker::new(slack_client(base, Some("xoxb-test")));

    broker.inject("notification.send", "{\"userId\": {\"nested\": true}}");
    drain(&relay, &broker, &worker, 1).await;

    assert!(matches!(
        broker.settlements()[0].1,
        Settlement::Nacked { requeue: false }
    ));
    assert_eq!(broker.pending("notification.send"), 0);
}
