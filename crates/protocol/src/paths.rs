//! Endpoint paths of the control-plane API.

use urlencoding::encode;

/// API prefix shared by every endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Namespace used for every pod operation.
pub const DEFAULT_NAMESPACE: &str = "default";

pub fn pod(pod: &str) -> String {
	format!("{API_PREFIX}/namespaces/{DEFAULT_NAMESPACE}/pods/{}", encode(pod))
}

pub fn exec_create(pod: &str, container: &str) -> String {
	format!(
		"{API_PREFIX}/namespaces/{DEFAULT_NAMESPACE}/pods/{}/exec?container={}",
		encode(pod),
		encode(container)
	)
}

/// Start endpoint; hijacked for attached sessions, plain for detached ones.
pub fn exec_start(id: &str) -> String {
	format!("{API_PREFIX}/exec/{}/start", encode(id))
}

pub fn exec_inspect(id: &str) -> String {
	format!("{API_PREFIX}/exec/{}/json", encode(id))
}

pub fn exec_resize(id: &str) -> String {
	format!("{API_PREFIX}/exec/{}/resize", encode(id))
}
