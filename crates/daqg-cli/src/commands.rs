use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use daqg_api::AppState;
use daqg_engine::Orchestrator;
use daqg_mapping::{MappingCatalog, MappingEngine};
use uuid::Uuid;

use crate::cli::{ConnectorAction, DataQuery};
use crate::output;

// ── Run ───────────────────────────────────────────────────────────────────────

pub async fn run(
    config_dir: PathBuf,
    bind: String,
    port: u16,
    max_buffer: Option<usize>,
    retention_days: Option<u64>,
    token: Option<String>,
) -> Result<()> {
    let sources_path = config_dir.join("sources.yml");
    let storage_path = config_dir.join("storage.yml");
    let mapping_path = config_dir.join("mapping.yml");

    let token = resolve_or_generate_token(token)?;

    let sources = daqg_config::load_source_document(&sources_path)
        .with_context(|| format!("failed to load {}", sources_path.display()))?;
    let mut storage = daqg_config::load_storage_document(&storage_path)
        .with_context(|| format!("failed to load {}", storage_path.display()))?;

    if let Some(max_entries) = max_buffer {
        storage.buffer.max_entries = max_entries;
    }
    if let Some(days) = retention_days {
        storage.buffer.retention_days = days;
    }

    let catalog = MappingCatalog::load(&mapping_path)
        .with_context(|| format!("failed to load {}", mapping_path.display()))?;
    let mapping = Arc::new(MappingEngine::new(catalog));
    let buffer = daqg_engine::build_buffer(&storage.buffer).await;
    let orchestrator = Orchestrator::new(mapping, buffer.clone(), storage.sinks, storage.buffer.clone())
        .context("failed to build orchestrator")?;

    let source_count = sources.len();
    orchestrator.start_all(sources).await;

    let state = AppState {
        orchestrator,
        buffer,
        auth_token: Arc::new(token),
        sources_path: Arc::new(sources_path),
        storage_path: Arc::new(storage_path),
    };
    let app = daqg_api::build_app(state.clone());

    let addr = format!("{bind}:{port}");
    tracing::info!(addr = %addr, sources = source_count, "starting data-acquisition gateway");
    println!("daqg listening on http://{addr} ({source_count} source(s) configured)");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    state.orchestrator.stop_all().await;
    Ok(())
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(remote: Option<String>, token: Option<String>) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let body: serde_json::Value = authed_client(&token)?
        .get(format!("{}/status", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach gateway at {url}"))?
        .json()
        .await?;
    output::print_json(&body);
    Ok(())
}

// ── Sources ───────────────────────────────────────────────────────────────────

pub async fn sources(remote: Option<String>, token: Option<String>) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let body: serde_json::Value = authed_client(&token)?
        .get(format!("{}/sources", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach gateway at {url}"))?
        .json()
        .await?;
    print!("{}", output::render_sources_text(&body));
    Ok(())
}

pub async fn source(id: String, remote: Option<String>, token: Option<String>) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let body: serde_json::Value = authed_client(&token)?
        .get(format!("{}/sources/{}", url.trim_end_matches('/'), id))
        .send()
        .await
        .with_context(|| format!("failed to reach gateway at {url}"))?
        .json()
        .await?;
    output::print_json(&body);
    Ok(())
}

// ── Connector lifecycle ───────────────────────────────────────────────────────

pub async fn connector(
    id: String,
    action: ConnectorAction,
    remote: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let verb = match action {
        ConnectorAction::Start => "start",
        ConnectorAction::Stop => "stop",
        ConnectorAction::Restart => "restart",
    };
    let resp = authed_client(&token)?
        .post(format!(
            "{}/sources/{}/{}",
            url.trim_end_matches('/'),
            id,
            verb
        ))
        .send()
        .await
        .with_context(|| format!("failed to reach gateway at {url}"))?
        .error_for_status()
        .with_context(|| format!("{verb} failed for source '{id}'"))?;
    let body: serde_json::Value = resp.json().await?;
    output::print_json(&body);
    Ok(())
}

// ── Discovery / configure ─────────────────────────────────────────────────────

pub async fn discovery(id: String, remote: Option<String>, token: Option<String>) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let body: serde_json::Value = authed_client(&token)?
        .get(format!(
            "{}/sources/{}/discovery",
            url.trim_end_matches('/'),
            id
        ))
        .send()
        .await
        .with_context(|| format!("failed to reach gateway at {url}"))?
        .json()
        .await?;
    output::print_json(&body);
    Ok(())
}

pub async fn configure(id: String, remote: Option<String>, token: Option<String>) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let resp = authed_client(&token)?
        .post(format!(
            "{}/sources/{}/configure",
            url.trim_end_matches('/'),
            id
        ))
        .send()
        .await
        .with_context(|| format!("failed to reach gateway at {url}"))?
        .error_for_status()
        .with_context(|| format!("configure failed for source '{id}'"))?;
    let body: serde_json::Value = resp.json().await?;
    output::print_json(&body);
    Ok(())
}

// ── Data queries ──────────────────────────────────────────────────────────────

pub async fn data(query: DataQuery, remote: Option<String>, token: Option<String>) -> Result<()> {
    let url = server_url(remote);
    let token = resolve_token(token)?;
    let client = authed_client(&token)?;
    let base = url.trim_end_matches('/');

    match query {
        DataQuery::Latest { limit } => {
            let body: serde_json::Value = client
                .get(format!("{base}/data/latest?limit={limit}"))
                .send()
                .await
                .with_context(|| format!("failed to reach gateway at {url}"))?
                .json()
                .await?;
            output::print_json(&body);
        }
        DataQuery::Source { id, limit } => {
            let body: serde_json::Value = client
                .get(format!("{base}/sources/{id}/data?limit={limit}"))
                .send()
                .await
                .with_context(|| format!("failed to reach gateway at {url}"))?
                .json()
                .await?;
            output::print_json(&body);
        }
        DataQuery::Range { start, end } => {
            let body: serde_json::Value = client
                .get(format!("{base}/data/range?start={start}&end={end}"))
                .send()
                .await
                .with_context(|| format!("failed to reach gateway at {url}"))?
                .json()
                .await?;
            output::print_json(&body);
        }
        DataQuery::Search { query } => {
            let body: serde_json::Value = client
                .get(format!("{base}/data/search?q={query}"))
                .send()
                .await
                .with_context(|| format!("failed to reach gateway at {url}"))?
                .json()
                .await?;
            output::print_json(&body);
        }
        DataQuery::Export { format, limit } => {
            let resp = client
                .get(format!("{base}/data/export?format={format}&limit={limit}"))
                .send()
                .await
                .with_context(|| format!("failed to reach gateway at {url}"))?;
            let text = resp.text().await?;
            println!("{text}");
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn server_url(remote: Option<String>) -> String {
    remote.unwrap_or_else(|| "http://localhost:8080".into())
}

/// Resolve the bearer token for a client call: explicit `--token`/`DAQG_API_KEY`,
/// falling back to the token file written by a local `daqg run`.
fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .with_context(|| {
            format!(
                "no token provided and could not read token file at {}. \
                 Use --token, DAQG_API_KEY, or run `daqg run` first.",
                path.display()
            )
        })
}

/// Reuse the existing token file unless the caller supplied one explicitly.
fn resolve_or_generate_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    if let Ok(existing) = std::fs::read_to_string(&path).map(|s| s.trim().to_string()) {
        if !existing.is_empty() {
            println!("Reusing existing control-plane token from {}", path.display());
            return Ok(existing);
        }
    }
    let token = generate_token();
    write_token(&path, &token)?;
    println!("Generated control-plane token (written to {})", path.display());
    Ok(token)
}

fn generate_token() -> String {
    Uuid::new_v4().to_string().replace('-', "") + &Uuid::new_v4().to_string().replace('-', "")
}

fn write_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, token).with_context(|| format!("failed to write token to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".daqg").join("token")
}

fn authed_client(token: &str) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .context("token contains invalid header characters")?,
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .context("failed to build HTTP client")
}
