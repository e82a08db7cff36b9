//! Results viewer tests through axum's tower service interface (no TCP).

use std::fs;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ccbench::web::{router, ViewerDirs};

fn fixture() -> (tempfile::TempDir, ViewerDirs) {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = ViewerDirs {
        charts: tmp.path().join("graficos"),
        tables: tmp.path().join("tabelas"),
    };
    fs::create_dir_all(dirs.charts.join("CPU_Usage")).unwrap();
    fs::write(dirs.charts.join("CPU_Usage/mean.png"), b"\x89PNG fake").unwrap();
    fs::create_dir_all(&dirs.tables).unwrap();
    fs::write(dirs.tables.join("CPU_Usage.png"), b"\x89PNG table").unwrap();
    (tmp, dirs)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn index_page_links_charts() {
    let (_tmp, dirs) = fixture();
    let resp = router(dirs).oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("<h2>CPU Usage</h2>"));
    assert!(html.contains(r#"src="/graficos/CPU_Usage/mean.png""#));
    assert!(html.contains(r#"src="/tabelas/CPU_Usage.png""#));
}

#[tokio::test]
async fn serves_chart_images() {
    let (_tmp, dirs) = fixture();
    let resp = router(dirs)
        .oneshot(get("/graficos/CPU_Usage/mean.png"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(body_bytes(resp).await, b"\x89PNG fake");
}

#[tokio::test]
async fn serves_table_images() {
    let (_tmp, dirs) = fixture();
    let resp = router(dirs)
        .oneshot(get("/tabelas/CPU_Usage.png"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"\x89PNG table");
}

#[tokio::test]
async fn unknown_image_is_404() {
    let (_tmp, dirs) = fixture();
    let resp = router(dirs)
        .oneshot(get("/graficos/RTT/mean.png"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
