use serde_json::Value;

/// Pretty-print any JSON response body.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Render a `GET /sources` response as a one-line-per-source table.
pub fn render_sources_text(body: &Value) -> String {
    let sources = match body.get("sources").and_then(|v| v.as_array()) {
        Some(s) if !s.is_empty() => s,
        _ => return "No sources configured.\n".to_string(),
    };

    let mut out = String::new();
    for entry in sources {
        let id = entry.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        let status = entry
            .get("status")
            .and_then(|s| s.get("status"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let errors = entry
            .get("status")
            .and_then(|s| s.get("errors"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        out.push_str(&format!("{id:<24} {status:<12} errors={errors}\n"));
    }
    out
}
