//! Renders a signed request as an equivalent `curl` command line.

/// Builds the command; `-k` is always present so the dump replays against
/// self-signed endpoints.
pub(crate) fn render(method: &str, url: &str, headers: &[(String, String)], body: &[u8]) -> String {
	let mut lines = vec!["curl -v -k".to_string(), format!("  -X {method}")];
	for (name, value) in headers {
		lines.push(format!("  -H \"{name}: {value}\""));
	}
	if !body.is_empty() {
		lines.push(format!("  -d '{}'", String::from_utf8_lossy(body).replace('\'', r"'\''")));
	}
	lines.push(format!("  {url}"));
	lines.join(" \\\n")
}
