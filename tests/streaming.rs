//! Download framing: one body frame per stored chunk

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use tempfile::TempDir;
use tower::ServiceExt;

use chunkstream_server::db::{create_pool, SessionStore, SqliteSessionStore};
use chunkstream_server::upload::{ChunkAddress, ChunkStore, DeclaredFile, Session, SessionKey};
use chunkstream_server::{app, AppState, Config};

#[tokio::test]
async fn test_download_emits_one_frame_per_chunk() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("sessions.db").display());
    let pool = create_pool(&url, 1).await.unwrap();
    let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool));
    let chunks = ChunkStore::with_local_storage(dir.path().join("chunks"));

    let key = SessionKey::new("framedvideo.mp4");
    sessions
        .insert(&Session::new(
            key.clone(),
            DeclaredFile {
                name: "video.mp4".to_string(),
                size: 9,
                mime_type: "video/mp4".to_string(),
                total_chunk: 2,
            },
        ))
        .await
        .unwrap();
    for (index, data) in ["abc", "def", "ghi"].into_iter().enumerate() {
        chunks
            .write_chunk(&ChunkAddress::new(key.clone(), index as u32), Bytes::from(data))
            .await
            .unwrap();
    }

    let mut config = Config::default();
    config.download.pacing_ms = 1;
    let router = app(AppState::new(config, sessions, chunks));

    let response = router
        .oneshot(
            Request::get("/download/framedvideo.mp4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "video/mp4");

    let frames: Vec<Bytes> = response
        .into_body()
        .into_data_stream()
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    assert_eq!(
        frames,
        vec![Bytes::from("abc"), Bytes::from("def"), Bytes::from("ghi")]
    );
}
