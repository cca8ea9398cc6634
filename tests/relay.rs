use axum::{Json, Router, routing::post};
use infernum_vqa::{
    Frame, InferenceClient,
    capture::{CaptureError, FrameSource},
    messages::{QueryPayload, QueryReply, RelayReply},
    relay::{self, RelayState},
};
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

struct SolidFrames;

impl FrameSource for SolidFrames {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let size = ImageSize {
            width: 64,
            height: 48,
        };
        Ok(Image::new(size, vec![90; 64 * 48 * 3], CpuAllocator).unwrap())
    }

    fn describe(&self) -> String {
        "solid test frames".to_string()
    }
}

struct BrokenCamera;

impl FrameSource for BrokenCamera {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        Err(CaptureError::Open("device 0 is busy".to_string()))
    }

    fn describe(&self) -> String {
        "broken camera".to_string()
    }
}

/// Stand-in inference service that echoes the prompt and records requests.
#[derive(Clone, Default)]
struct FakeInference {
    hits: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

async fn spawn_inference(fake: FakeInference) -> SocketAddr {
    let app = Router::new().route(
        "/foo",
        post(move |Json(payload): Json<QueryPayload>| {
            let fake = fake.clone();
            async move {
                fake.hits.fetch_add(1, Ordering::SeqCst);
                fake.prompts.lock().unwrap().push(payload.prompt.clone());
                assert!(!payload.image.is_empty());
                Json(QueryReply {
                    response: format!("you asked: {:?}", payload.prompt),
                })
            }
        }),
    );
    spawn(app).await
}

async fn spawn_relay(frames: Box<dyn FrameSource>, inference_url: &str) -> SocketAddr {
    let client = InferenceClient::new(inference_url, Duration::from_secs(5)).unwrap();
    spawn(relay::router(RelayState::new(frames, client, 5000))).await
}

async fn get_image(relay: SocketAddr, query: &str) -> (reqwest::StatusCode, RelayReply) {
    let response = reqwest::get(format!("http://{relay}/get_image{query}"))
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn relays_frame_and_answer() {
    let fake = FakeInference::default();
    let inference = spawn_inference(fake.clone()).await;
    let relay = spawn_relay(Box::new(SolidFrames), &format!("http://{inference}/foo")).await;

    let (status, reply) = get_image(relay, "?prompt=What%20is%20this%3F").await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(reply.response.as_deref(), Some("you asked: \"What is this?\""));
    assert!(reply.error.is_none());
    let jpeg = infernum_vqa::codec::decode_base64_image(&reply.image.unwrap()).unwrap();
    assert_eq!((jpeg.width(), jpeg.height()), (64, 48));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_prompt_is_the_empty_prompt() {
    let fake = FakeInference::default();
    let inference = spawn_inference(fake.clone()).await;
    let relay = spawn_relay(Box::new(SolidFrames), &format!("http://{inference}/foo")).await;

    let (absent_status, absent) = get_image(relay, "").await;
    let (empty_status, empty) = get_image(relay, "?prompt=").await;

    assert_eq!(absent_status, empty_status);
    assert_eq!(absent.response, empty.response);
    assert_eq!(*fake.prompts.lock().unwrap(), vec![String::new(), String::new()]);
}

#[tokio::test]
async fn capture_failure_is_service_unavailable() {
    let fake = FakeInference::default();
    let inference = spawn_inference(fake.clone()).await;
    let relay = spawn_relay(Box::new(BrokenCamera), &format!("http://{inference}/foo")).await;

    let (status, reply) = get_image(relay, "?prompt=hello").await;

    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert!(reply.image.is_none());
    assert!(reply.response.is_none());
    assert!(reply.error.unwrap().contains("device 0 is busy"));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_inference_is_bad_gateway() {
    // bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let relay = spawn_relay(Box::new(SolidFrames), &format!("http://{dead}/foo")).await;
    let (status, reply) = get_image(relay, "?prompt=hello").await;

    assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
    assert!(reply.image.is_some());
    assert!(reply.response.is_none());
    assert!(reply.error.is_some());
}

#[tokio::test]
async fn inference_error_status_is_bad_gateway() {
    let app = Router::new().route(
        "/foo",
        post(|| async {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "model inference failed" })),
            )
        }),
    );
    let inference = spawn(app).await;
    let relay = spawn_relay(Box::new(SolidFrames), &format!("http://{inference}/foo")).await;

    let (status, reply) = get_image(relay, "").await;

    assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
    let error = reply.error.unwrap();
    assert!(error.contains("500"));
    assert!(error.contains("model inference failed"));
}

#[tokio::test]
async fn root_serves_the_polling_page() {
    let relay = spawn_relay(Box::new(SolidFrames), "http://127.0.0.1:9/foo").await;

    let response = reqwest::get(format!("http://{relay}/")).await.unwrap();
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let page = response.text().await.unwrap();
    assert!(page.contains("/get_image"));
    assert!(page.contains("const POLL_INTERVAL_MS = 5000;"));
}
