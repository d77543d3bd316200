//! Uploads against a local fake media host.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use photo_upload::{
    HttpTransport, ImageSetManager, MediaHostConfig, PipelineConfig, PresetResolver,
    ProgressCallback, SourceFile, UploadError, UploadTransport,
};

#[derive(Clone, Default)]
struct HostState {
    presets_seen: Arc<Mutex<Vec<String>>>,
}

async fn upload(
    State(state): State<HostState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut preset = String::new();
    let mut file_name = String::new();
    let mut bytes = 0usize;

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("upload_preset") => preset = field.text().await.unwrap(),
            Some("file") => {
                file_name = field.file_name().unwrap_or_default().to_string();
                bytes = field.bytes().await.unwrap().len();
            }
            _ => {}
        }
    }
    state.presets_seen.lock().unwrap().push(preset.clone());

    let error = |status: StatusCode, message: &str| {
        (status, Json(json!({ "error": { "message": message } })))
    };
    match preset.as_str() {
        "missing" => return error(StatusCode::BAD_REQUEST, "Upload preset not found"),
        "busy" => return error(StatusCode::SERVICE_UNAVAILABLE, "Try again later"),
        _ => {}
    }
    if file_name.starts_with("corrupt") {
        return error(StatusCode::BAD_REQUEST, "Invalid image file");
    }

    (
        StatusCode::OK,
        Json(json!({
            "secure_url": format!("https://media.example/{}/{}", preset, file_name),
            "public_id": format!("{}/{}", preset, file_name),
            "width": 4,
            "height": 3,
            "bytes": bytes,
            "format": "png",
            "created_at": "2026-01-05T10:00:00Z"
        })),
    )
}

async fn start_host() -> (SocketAddr, HostState) {
    let state = HostState::default();
    let app = Router::new()
        .route("/image/upload", post(upload))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn transport(addr: SocketAddr) -> HttpTransport {
    HttpTransport::new(MediaHostConfig {
        upload_url: format!("http://{}/image/upload", addr),
        ..MediaHostConfig::default()
    })
    .unwrap()
}

fn png(name: &str) -> SourceFile {
    let img = image::RgbImage::from_pixel(4, 3, image::Rgb([200, 120, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    SourceFile::new(name, "image/png", buf.into_inner())
}

fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
    (callback, seen)
}

#[tokio::test]
async fn test_upload_returns_descriptor_and_reaches_full_progress() {
    let (addr, _) = start_host().await;
    let (callback, seen) = recording_progress();

    let descriptor = transport(addr)
        .upload(&png("porch.png"), "listing_photos", callback)
        .await
        .unwrap();

    assert_eq!(descriptor.remote_id, "listing_photos/porch.png");
    assert_eq!((descriptor.width, descriptor.height), (4, 3));
    assert_eq!(descriptor.format.as_deref(), Some("png"));
    assert!(descriptor.created_at.is_some());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_unknown_preset_falls_back_to_next() {
    let (addr, state) = start_host().await;
    let resolver = PresetResolver::new(
        Arc::new(transport(addr)),
        vec!["missing".into(), "ml_default".into()],
        Duration::from_secs(10),
    );

    let descriptor = resolver
        .upload_with_fallback(&png("yard.png"), Arc::new(|_| {}))
        .await
        .unwrap();

    assert_eq!(descriptor.remote_id, "ml_default/yard.png");
    assert_eq!(
        *state.presets_seen.lock().unwrap(),
        vec!["missing".to_string(), "ml_default".to_string()]
    );
}

#[tokio::test]
async fn test_rejected_file_is_payload_failure() {
    let (addr, _) = start_host().await;
    let err = transport(addr)
        .upload(&png("corrupt.png"), "listing_photos", Arc::new(|_| {}))
        .await
        .unwrap_err();
    assert_eq!(err, UploadError::Payload("Invalid image file".into()));
}

#[tokio::test]
async fn test_unavailable_host_is_transient() {
    let (addr, _) = start_host().await;
    let err = transport(addr)
        .upload(&png("porch.png"), "busy", Arc::new(|_| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::TransientNetwork(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport(addr)
        .upload(&png("porch.png"), "listing_photos", Arc::new(|_| {}))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::TransientNetwork(_)));
}

#[tokio::test]
async fn test_manager_uploads_batch_end_to_end() {
    let (addr, _) = start_host().await;
    let config = PipelineConfig {
        preset_candidates: vec!["missing".into(), "listing_photos".into()],
        ..PipelineConfig::listing_gallery()
    };
    let manager = ImageSetManager::new(config, Arc::new(transport(addr))).unwrap();

    let report = manager.register_files(vec![png("a.png"), png("b.png"), png("corrupt.png")]);
    assert_eq!(report.accepted.len(), 3);

    let summary = manager.settled().await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let finals = manager.final_descriptors();
    assert_eq!(finals.len(), 2);
    assert!(finals[0].is_cover);
    assert_eq!(finals[0].descriptor.remote_id, "listing_photos/a.png");
    assert_eq!(finals[1].position, 1);
}
