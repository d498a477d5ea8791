//! Local file system

use super::execution_error;
use chrono::Utc;
use flowbridge_core::domain::adapter::FileAdapterConfig;
use flowbridge_core::{AdapterDescriptor, CoreError, CorrelationContext, Direction, Payload, PayloadKind};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use uuid::Uuid;

const PROTOCOL: &str = "FILE";

/// Write the payload to a new file and acknowledge with its path
pub async fn send(
    adapter: &AdapterDescriptor,
    config: &FileAdapterConfig,
    payload: &Payload,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let directory = config.directory()?;
    ctx.capture_payload(adapter, PayloadKind::Request, Direction::Outbound, payload);

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| execution_error(directory, PROTOCOL, e))?;
    let flow_id = ctx.flow_id().map(|id| id.0.as_str()).unwrap_or("unknown");
    let path = Path::new(directory).join(file_name(config.file_name_pattern(), flow_id));
    tokio::fs::write(&path, payload.as_bytes())
        .await
        .map_err(|e| execution_error(directory, PROTOCOL, e))?;
    info!(path = %path.display(), bytes = payload.len(), "Wrote file");

    let ack = Payload::text(json!({ "status": "success", "file": path.display().to_string() }).to_string());
    ctx.capture_payload(adapter, PayloadKind::Response, Direction::Inbound, &ack);
    Ok(ack)
}

/// Read the oldest file matching `filePattern`
pub async fn fetch(
    adapter: &AdapterDescriptor,
    config: &FileAdapterConfig,
    ctx: &CorrelationContext,
) -> Result<Payload, CoreError> {
    let directory = config.directory()?;
    let pattern = config.file_pattern();
    let path = oldest_match(directory, pattern)
        .await?
        .ok_or_else(|| CoreError::not_found("File", format!("{}/{}", directory, pattern)))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| execution_error(directory, PROTOCOL, e))?;
    let payload = Payload::from_bytes(bytes);
    ctx.capture_payload(adapter, PayloadKind::Request, Direction::Inbound, &payload);
    debug!(path = %path.display(), binary = payload.is_binary(), "Read file");

    if config.delete_after_read {
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| execution_error(directory, PROTOCOL, e))?;
    }
    Ok(payload)
}

/// Expand `{timestamp}` (epoch millis), `{uuid}` and `{flowId}`
pub fn file_name(pattern: &str, flow_id: &str) -> String {
    pattern
        .replace("{timestamp}", &Utc::now().timestamp_millis().to_string())
        .replace("{uuid}", &Uuid::new_v4().to_string())
        .replace("{flowId}", flow_id)
}

async fn oldest_match(directory: &str, pattern: &str) -> Result<Option<PathBuf>, CoreError> {
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| execution_error(directory, PROTOCOL, e))?;
    let pattern = name_pattern(pattern)?;

    let mut oldest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| execution_error(directory, PROTOCOL, e))?
    {
        let metadata = entry
            .metadata()
            .await
            .map_err(|e| execution_error(directory, PROTOCOL, e))?;
        if !metadata.is_file() || !pattern.matches(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();
        let older = match &oldest {
            None => true,
            Some((time, current)) => (modified, &path) < (*time, current),
        };
        if older {
            oldest = Some((modified, path));
        }
    }
    Ok(oldest.map(|(_, path)| path))
}

/// Compile `filePattern` (`*`, `?` and `[...]` wildcards)
pub fn name_pattern(pattern: &str) -> Result<glob::Pattern, CoreError> {
    glob::Pattern::new(pattern).map_err(|err| {
        CoreError::ConfigurationError(format!("Invalid file pattern '{}': {}", pattern, err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbridge_core::{AdapterMode, AdapterType};
    use serde_json::Value;
    use tempfile::tempdir;

    fn adapter(dir: &Path, extra: Value) -> (AdapterDescriptor, FileAdapterConfig) {
        let mut config = json!({ "directory": dir.join("out").display().to_string() });
        if let (Some(target), Some(more)) = (config.as_object_mut(), extra.as_object()) {
            target.extend(more.clone());
        }
        let adapter = AdapterDescriptor::new("f", "Drop", AdapterType::File, AdapterMode::Receiver).with_config(config);
        let typed = match adapter.typed_config().unwrap() {
            flowbridge_core::AdapterConfig::File(c) => c,
            other => panic!("unexpected config {:?}", other),
        };
        (adapter, typed)
    }

    fn matches_name(pattern: &str, name: &str) -> bool {
        name_pattern(pattern).unwrap().matches(name)
    }

    #[test]
    fn test_glob() {
        assert!(matches_name("*.csv", "orders.csv"));
        assert!(matches_name("order-??.xml", "order-01.xml"));
        assert!(!matches_name("*.csv", "orders.csv.bak"));
        assert!(matches_name("*", ""));
        assert!(matches!(name_pattern("a**b"), Err(CoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_many_wildcards_match_quickly() {
        let started = std::time::Instant::now();
        assert!(!matches_name("*a*a*a*a*a*a*a*a*a*b", &"a".repeat(40)));
        assert!(matches_name("*a*a*a*a*a*a*a*a*a*b", &format!("{}b", "a".repeat(40))));
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_file_name_placeholders() {
        let name = file_name("{flowId}-{timestamp}-{uuid}.xml", "f1");
        assert!(name.starts_with("f1-"));
        assert!(name.ends_with(".xml"));
        assert!(!name.contains('{'));
    }

    #[tokio::test]
    async fn test_send_writes_and_acknowledges() {
        let dir = tempdir().unwrap();
        let (adapter, config) = adapter(dir.path(), json!({ "fileNamePattern": "msg.txt" }));
        let ctx = CorrelationContext::new("TEST");

        let ack = send(&adapter, &config, &Payload::text("hello"), &ctx).await.unwrap();
        let ack: Value = serde_json::from_str(ack.as_text().unwrap()).unwrap();
        assert_eq!(ack["status"], "success");

        let written = dir.path().join("out").join("msg.txt");
        assert_eq!(ack["file"], written.display().to_string());
        assert_eq!(std::fs::read_to_string(written).unwrap(), "hello");
        assert_eq!(ctx.events().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_oldest_match_and_delete() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("a.csv"), "id\n1\n").unwrap();
        std::fs::write(out.join("skip.txt"), "x").unwrap();
        let (adapter, config) = adapter(dir.path(), json!({ "filePattern": "*.csv", "deleteAfterRead": true }));
        let ctx = CorrelationContext::new("TEST");

        let payload = fetch(&adapter, &config, &ctx).await.unwrap();
        assert_eq!(payload, Payload::text("id\n1\n"));
        assert!(!out.join("a.csv").exists());
        assert!(out.join("skip.txt").exists());

        assert!(matches!(fetch(&adapter, &config, &ctx).await, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_binary_file_is_reported_binary() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("blob.bin"), [0x50, 0x4b, 0x00, 0xff]).unwrap();
        let (adapter, config) = adapter(dir.path(), json!({}));

        let payload = fetch(&adapter, &config, &CorrelationContext::new("TEST")).await.unwrap();
        assert!(payload.is_binary());
    }
}
