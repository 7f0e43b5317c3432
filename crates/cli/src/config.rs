//! Client configuration.
//!
//! Settings are layered: the YAML config file (kubeconfig-shaped, one
//! cluster and one user per context), then `PI_*` environment variables,
//! then the global command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use pi_runtime::{ConnectionConfig, Credentials};
use serde::Deserialize;

pub const DEFAULT_REGION: &str = "gcp-us-central1";
/// `*` is replaced by the region.
pub const DEFAULT_HOST: &str = "https://*.hyper.sh:443";

pub const CONFIG_ENV: &str = "PICONFIG";
pub const HOST_ENV: &str = "PI_HOST";
pub const REGION_ENV: &str = "PI_REGION";
pub const ACCESS_KEY_ENV: &str = "PI_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "PI_SECRET_KEY";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
	#[serde(default)]
	pub current_context: Option<String>,
	#[serde(default)]
	pub contexts: Vec<NamedContext>,
	#[serde(default)]
	pub clusters: Vec<NamedCluster>,
	#[serde(default)]
	pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedContext {
	pub name: String,
	#[serde(default)]
	pub context: ContextEntry,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct ContextEntry {
	#[serde(default)]
	pub cluster: Option<String>,
	#[serde(default)]
	pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedCluster {
	pub name: String,
	#[serde(default)]
	pub cluster: ClusterEntry,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
	#[serde(default)]
	pub server: Option<String>,
	#[serde(default)]
	pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedUser {
	pub name: String,
	#[serde(default)]
	pub user: UserEntry,
}

#[derive(Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
	#[serde(default)]
	pub region: Option<String>,
	#[serde(default)]
	pub access_key: Option<String>,
	#[serde(default)]
	pub secret_key: Option<String>,
}

impl std::fmt::Debug for UserEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UserEntry")
			.field("region", &self.region)
			.field("access_key", &self.access_key)
			.field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

impl ConfigFile {
	pub fn parse(text: &str) -> Result<Self> {
		if text.trim().is_empty() {
			return Ok(Self::default());
		}
		serde_yaml::from_str(text).context("invalid config file")
	}

	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
		Self::parse(&text).with_context(|| format!("failed to parse config {}", path.display()))
	}

	/// Cluster and user of context `name`, or of `current-context` when
	/// `name` is `None`. A named context that does not exist is an error.
	fn selected(&self, name: Option<&str>) -> Result<(Option<&ClusterEntry>, Option<&UserEntry>)> {
		let Some(name) = name.or(self.current_context.as_deref()) else {
			return Ok((None, None));
		};
		let context = self
			.contexts
			.iter()
			.find(|c| c.name == name)
			.ok_or_else(|| anyhow!("context '{name}' not found in config"))?;

		let cluster = context
			.context
			.cluster
			.as_deref()
			.and_then(|n| self.clusters.iter().find(|c| c.name == n))
			.map(|c| &c.cluster);
		let user = context
			.context
			.user
			.as_deref()
			.and_then(|n| self.users.iter().find(|u| u.name == n))
			.map(|u| &u.user);
		Ok((cluster, user))
	}
}

/// Values taken from global command-line flags.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
	pub host: Option<String>,
	pub region: Option<String>,
	pub context: Option<String>,
	pub insecure_skip_tls_verify: bool,
}

/// Fully resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
	pub host: String,
	pub region: String,
	pub credentials: Credentials,
	pub insecure_skip_tls_verify: bool,
}

impl Settings {
	/// Layers `file`, the variables visible through `lookup` and `overrides`.
	pub fn resolve(file: &ConfigFile, lookup: impl Fn(&str) -> Option<String>, overrides: &Overrides) -> Result<Self> {
		let env = |key: &str| lookup(key).filter(|v| !v.is_empty());
		let (cluster, user) = file.selected(overrides.context.as_deref())?;

		let host = overrides
			.host
			.clone()
			.or_else(|| env(HOST_ENV))
			.or_else(|| cluster.and_then(|c| c.server.clone()))
			.unwrap_or_else(|| DEFAULT_HOST.to_string());
		let region = overrides
			.region
			.clone()
			.or_else(|| env(REGION_ENV))
			.or_else(|| user.and_then(|u| u.region.clone()))
			.unwrap_or_else(|| DEFAULT_REGION.to_string());
		let access_key = env(ACCESS_KEY_ENV).or_else(|| user.and_then(|u| u.access_key.clone()));
		let secret_key = env(SECRET_KEY_ENV).or_else(|| user.and_then(|u| u.secret_key.clone()));

		let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
			bail!("missing credentials: set {ACCESS_KEY_ENV} and {SECRET_KEY_ENV} or add a user to the config file");
		};

		Ok(Self {
			host,
			region,
			credentials: Credentials { access_key, secret_key },
			insecure_skip_tls_verify: overrides.insecure_skip_tls_verify
				|| cluster.is_some_and(|c| c.insecure_skip_tls_verify),
		})
	}

	pub fn connection_config(&self) -> ConnectionConfig {
		ConnectionConfig::new(self.host.clone(), self.region.clone(), self.credentials.clone())
			.insecure_skip_tls_verify(self.insecure_skip_tls_verify)
	}
}

/// Config file to read and whether it must exist.
///
/// `--config` and `PICONFIG` name files that must exist; the default
/// `~/.pi/config` is optional.
pub fn config_path(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Option<(PathBuf, bool)> {
	if let Some(path) = explicit {
		return Some((path.to_path_buf(), true));
	}
	if let Some(path) = env(CONFIG_ENV).filter(|v| !v.is_empty()) {
		return Some((PathBuf::from(path), true));
	}
	dirs::home_dir().map(|home| (home.join(".pi").join("config"), false))
}

/// Resolves settings from the process environment.
pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
	let env = |key: &str| std::env::var(key).ok();
	let file = match config_path(explicit, env) {
		Some((path, true)) => ConfigFile::load(&path)?,
		Some((path, false)) if path.exists() => ConfigFile::load(&path)?,
		_ => ConfigFile::default(),
	};
	Settings::resolve(&file, env, overrides)
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::io::Write;

	use super::*;

	const SAMPLE: &str = r#"
current-context: prod
contexts:
  - name: prod
    context:
      cluster: main
      user: ops
  - name: lab
    context:
      cluster: local
      user: tester
clusters:
  - name: main
    cluster:
      server: tcp://*.hyper.sh:443
  - name: local
    cluster:
      server: http://127.0.0.1:6443
      insecure-skip-tls-verify: true
users:
  - name: ops
    user:
      region: eu-central-1
      access-key: AK-OPS
      secret-key: SK-OPS
  - name: tester
    user:
      access-key: AK-LAB
      secret-key: SK-LAB
"#;

	fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn current_context_supplies_everything() {
		let file = ConfigFile::parse(SAMPLE).unwrap();
		let settings = Settings::resolve(&file, env_of(&[]), &Overrides::default()).unwrap();
		assert_eq!(settings.host, "tcp://*.hyper.sh:443");
		assert_eq!(settings.region, "eu-central-1");
		assert_eq!(settings.credentials.access_key, "AK-OPS");
		assert_eq!(settings.credentials.secret_key, "SK-OPS");
		assert!(!settings.insecure_skip_tls_verify);
	}

	#[test]
	fn context_flag_selects_another_context() {
		let file = ConfigFile::parse(SAMPLE).unwrap();
		let overrides = Overrides {
			context: Some("lab".into()),
			..Overrides::default()
		};
		let settings = Settings::resolve(&file, env_of(&[]), &overrides).unwrap();
		assert_eq!(settings.host, "http://127.0.0.1:6443");
		assert_eq!(settings.region, DEFAULT_REGION);
		assert_eq!(settings.credentials.access_key, "AK-LAB");
		assert!(settings.insecure_skip_tls_verify);
	}

	#[test]
	fn environment_beats_file_and_flags_beat_environment() {
		let file = ConfigFile::parse(SAMPLE).unwrap();
		let env = env_of(&[
			(HOST_ENV, "https://env.example:443"),
			(REGION_ENV, "us-west-1"),
			(ACCESS_KEY_ENV, "AK-ENV"),
			(SECRET_KEY_ENV, ""),
		]);
		let overrides = Overrides {
			region: Some("ap-south-1".into()),
			..Overrides::default()
		};
		let settings = Settings::resolve(&file, env, &overrides).unwrap();
		assert_eq!(settings.host, "https://env.example:443");
		assert_eq!(settings.region, "ap-south-1");
		assert_eq!(settings.credentials.access_key, "AK-ENV");
		// empty variables count as unset
		assert_eq!(settings.credentials.secret_key, "SK-OPS");
	}

	#[test]
	fn defaults_apply_without_a_file() {
		let env = env_of(&[(ACCESS_KEY_ENV, "ak"), (SECRET_KEY_ENV, "sk")]);
		let settings = Settings::resolve(&ConfigFile::default(), env, &Overrides::default()).unwrap();
		assert_eq!(settings.host, DEFAULT_HOST);
		assert_eq!(settings.region, DEFAULT_REGION);
	}

	#[test]
	fn missing_credentials_are_rejected() {
		let err = Settings::resolve(&ConfigFile::default(), env_of(&[]), &Overrides::default()).unwrap_err();
		assert!(err.to_string().contains("missing credentials"));
	}

	#[test]
	fn unknown_context_is_rejected() {
		let file = ConfigFile::parse(SAMPLE).unwrap();
		let overrides = Overrides {
			context: Some("nope".into()),
			..Overrides::default()
		};
		let err = Settings::resolve(&file, env_of(&[]), &overrides).unwrap_err();
		assert!(err.to_string().contains("context 'nope'"));
	}

	#[test]
	fn load_reads_yaml_from_disk() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();
		let config = ConfigFile::load(file.path()).unwrap();
		assert_eq!(config.current_context.as_deref(), Some("prod"));
		assert_eq!(config.users.len(), 2);
	}

	#[test]
	fn load_reports_the_path_of_a_broken_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"contexts: [oops").unwrap();
		let err = ConfigFile::load(file.path()).unwrap_err();
		assert!(format!("{err:#}").contains(&file.path().display().to_string()));
	}

	#[test]
	fn explicit_and_env_paths_are_required() {
		let (path, required) = config_path(Some(Path::new("/etc/pi.yaml")), env_of(&[])).unwrap();
		assert_eq!(path, PathBuf::from("/etc/pi.yaml"));
		assert!(required);

		let (path, required) = config_path(None, env_of(&[(CONFIG_ENV, "/tmp/pi.yaml")])).unwrap();
		assert_eq!(path, PathBuf::from("/tmp/pi.yaml"));
		assert!(required);
	}

	#[test]
	fn user_entry_debug_hides_secret() {
		let file = ConfigFile::parse(SAMPLE).unwrap();
		let rendered = format!("{:?}", file.users[0].user);
		assert!(rendered.contains("AK-OPS"));
		assert!(!rendered.contains("SK-OPS"));
	}
}
