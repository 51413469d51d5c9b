//! Interpretation of container-runtime probes for GPU support.

use serde_json::Value;

/// Whether `docker info --format '{{json .Runtimes}}'` output lists an NVIDIA runtime.
///
/// The output is a JSON object keyed by runtime name. Unparseable output is
/// scanned as plain text.
pub fn runtimes_include_nvidia(output: &str) -> bool {
    match serde_json::from_str::<Value>(output.trim()) {
        Ok(Value::Object(runtimes)) => runtimes
            .keys()
            .any(|name| name.to_ascii_lowercase().contains("nvidia")),
        Ok(_) | Err(_) => output.to_ascii_lowercase().contains("nvidia"),
    }
}
