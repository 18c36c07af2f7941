use std::io::Write;

/// Write a run report to stdout.
pub fn write_output(text: &str) -> Result<(), String> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .and_then(|_| handle.write_all(b"\n"))
        .map_err(|e| format!("Failed to write to stdout: {}", e))
}

/// Serialize a value to pretty JSON.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {}", e))
}

/// Print a summary as JSON or as the given human-readable line.
pub fn report<T: serde::Serialize>(value: &T, json: bool, line: &str) -> Result<(), String> {
    if json {
        write_output(&to_json(value)?)
    } else {
        write_output(line)
    }
}
