//! Results viewer: an HTML index of the generated charts plus the image
//! files themselves. Unauthenticated, read-only.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const CHARTS_MOUNT: &str = "/graficos";
pub const TABLES_MOUNT: &str = "/tabelas";

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Congestion Control Benchmark Results</title>
<style>
    body { font-family: Arial, sans-serif; background-color: #f7f7f7; margin: 0; padding: 0; }
    h1 { text-align: center; color: #333; margin-top: 20px; }
    h2 { text-align: center; color: #555; margin-top: 20px; margin-bottom: 10px; }
    .graph-section { text-align: center; margin: 30px 0; }
    img { margin: 10px; border: 2px solid #ddd; border-radius: 8px; box-shadow: 0px 4px 6px rgba(0, 0, 0, 0.1); width: 80%; }
    .container { max-width: 1200px; margin: 0 auto; padding: 20px; }
    .empty { text-align: center; color: #888; }
</style>
</head>
<body>
<h1>Congestion Control Benchmark Results</h1>
<div class="container">
"#;

const PAGE_TAIL: &str = "</div>\n</body>\n</html>\n";

/// Directories the viewer serves from.
#[derive(Debug, Clone)]
pub struct ViewerDirs {
    pub charts: PathBuf,
    pub tables: PathBuf,
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Sorted names of sub-directories (or files) of `dir`; empty if `dir`
/// does not exist yet.
fn entries(dir: &Path, want_dirs: bool) -> io::Result<Vec<String>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    for entry in read {
        let entry = entry?;
        if entry.file_type()?.is_dir() != want_dirs {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Builds the index page from what is currently on disk.
pub fn render_index(dirs: &ViewerDirs) -> io::Result<String> {
    let mut html = String::from(PAGE_HEAD);
    let folders = entries(&dirs.charts, true)?;
    let tables = entries(&dirs.tables, false)?;

    if folders.is_empty() && tables.is_empty() {
        html.push_str("<p class='empty'>No charts generated yet.</p>\n");
    }

    for folder in &folders {
        let _ = write!(
            html,
            "<div class='graph-section'><h2>{}</h2>",
            escape(&folder.replace('_', " "))
        );
        for file in entries(&dirs.charts.join(folder), false)? {
            let _ = write!(
                html,
                r#"<img src="{CHARTS_MOUNT}/{}/{}">"#,
                escape(folder),
                escape(&file)
            );
        }
        html.push_str("</div>\n");
    }

    if !tables.is_empty() {
        html.push_str("<div class='graph-section'><h2>Tables</h2>");
        for file in &tables {
            let _ = write!(html, r#"<img src="{TABLES_MOUNT}/{}">"#, escape(file));
        }
        html.push_str("</div>\n");
    }

    html.push_str(PAGE_TAIL);
    Ok(html)
}

async fn index(
    State(dirs): State<Arc<ViewerDirs>>,
) -> Result<Html<String>, (StatusCode, String)> {
    render_index(&dirs)
        .map(Html)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub fn router(dirs: ViewerDirs) -> Router {
    Router::new()
        .route("/", get(index))
        .nest_service(CHARTS_MOUNT, ServeDir::new(&dirs.charts))
        .nest_service(TABLES_MOUNT, ServeDir::new(&dirs.tables))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(dirs))
}

pub async fn serve(addr: SocketAddr, dirs: ViewerDirs) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("results viewer on http://{addr}");
    axum::serve(listener, router(dirs)).await?;
    Ok(())
}

/// Serves the viewer from a background thread with its own runtime.
pub fn spawn(
    addr: SocketAddr,
    dirs: ViewerDirs,
) -> io::Result<thread::JoinHandle<anyhow::Result<()>>> {
    thread::Builder::new()
        .name("web-viewer".into())
        .spawn(move || -> anyhow::Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(addr, dirs))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs(root: &Path) -> ViewerDirs {
        ViewerDirs {
            charts: root.join("graficos"),
            tables: root.join("tabelas"),
        }
    }

    #[test]
    fn index_lists_every_folder_and_image() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = dirs(tmp.path());
        for folder in ["Throughput", "Packet_Loss"] {
            fs::create_dir_all(dirs.charts.join(folder)).unwrap();
            fs::write(dirs.charts.join(folder).join("mean.png"), b"png").unwrap();
            fs::write(dirs.charts.join(folder).join("confidence_interval.png"), b"png").unwrap();
        }
        fs::create_dir_all(&dirs.tables).unwrap();
        fs::write(dirs.tables.join("RTT.png"), b"png").unwrap();

        let html = render_index(&dirs).unwrap();
        assert!(html.contains("<h2>Packet Loss</h2>"));
        assert!(html.contains("<h2>Throughput</h2>"));
        assert!(html.contains(r#"<img src="/graficos/Throughput/mean.png">"#));
        assert!(html.contains(r#"<img src="/graficos/Packet_Loss/confidence_interval.png">"#));
        assert!(html.contains(r#"<img src="/tabelas/RTT.png">"#));
        // folders are listed alphabetically
        assert!(html.find("Packet Loss").unwrap() < html.find("<h2>Throughput").unwrap());
    }

    #[test]
    fn index_without_charts() {
        let tmp = tempfile::tempdir().unwrap();
        let html = render_index(&dirs(tmp.path())).unwrap();
        assert!(html.contains("No charts generated yet."));
        assert!(html.ends_with(PAGE_TAIL));
    }

    #[test]
    fn names_are_escaped() {
        assert_eq!(escape(r#"a<b>&"c""#), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
