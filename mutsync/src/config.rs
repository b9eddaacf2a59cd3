use crate::action::SyncAction;
use crate::dispatcher::{Dispatcher, MutationOptions};
use crate::error::MutationError;
use crate::queue::FileStore;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: Option<String>,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
    pub offline_queue_enabled: bool,
    pub queue_path: Option<PathBuf>,
    pub display_duration_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            timeout_ms: 30_000,
            offline_queue_enabled: true,
            queue_path: None,
            display_duration_ms: 3_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let data = fs::read_to_string(&path).context("read config file")?;
            let cfg: Config = serde_yaml::from_str(&data).context("parse config yaml")?;
            Ok(cfg)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("create config dir")?;
        }
        let data = serde_yaml::to_string(&self).context("serialize config")?;
        let mut f = fs::File::create(&path).context("create config file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = f.metadata()?.permissions();
            perms.set_mode(0o600);
            f.set_permissions(perms)?;
        }
        f.write_all(data.as_bytes()).context("write config file")?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Ok(p) = std::env::var("MUTSYNC_CONFIG") {
            if !p.is_empty() {
                return Ok(PathBuf::from(p));
            }
        }
        let proj = ProjectDirs::from("", "", "mutsync").context("resolve config dir")?;
        Ok(proj.config_dir().join("config.yaml"))
    }

    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MUTSYNC_BASE_URL") {
            if !v.is_empty() {
                self.base_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MUTSYNC_QUEUE_PATH") {
            if !v.is_empty() {
                self.queue_path = Some(PathBuf::from(v));
            }
        }
    }

    pub fn apply_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(n) = cli.max_retries {
            self.max_retries = n;
        }
        if let Some(ms) = cli.timeout_ms {
            self.timeout_ms = ms;
        }
        if let Some(url) = cli.base_url.clone() {
            self.base_url = Some(url);
        }
        if let Some(p) = cli.queue_path.clone() {
            self.queue_path = Some(p);
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "base_url" => self.base_url = Some(value.to_string()),
            "max_retries" => self.max_retries = value.parse().context("max_retries must be an integer")?,
            "initial_delay_ms" => self.initial_delay_ms = value.parse().context("initial_delay_ms must be an integer")?,
            "max_delay_ms" => self.max_delay_ms = value.parse().context("max_delay_ms must be an integer")?,
            "timeout_ms" => self.timeout_ms = value.parse().context("timeout_ms must be an integer")?,
            "offline_queue_enabled" => {
                self.offline_queue_enabled = value.parse().context("offline_queue_enabled must be true or false")?
            }
            "queue_path" => self.queue_path = Some(PathBuf::from(value)),
            "display_duration_ms" => {
                self.display_duration_ms = value.parse().context("display_duration_ms must be an integer")?
            }
            _ => anyhow::bail!("unsupported key {key}"),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let v = match key {
            "base_url" => self.base_url.clone().unwrap_or_default(),
            "max_retries" => self.max_retries.to_string(),
            "initial_delay_ms" => self.initial_delay_ms.to_string(),
            "max_delay_ms" => self.max_delay_ms.to_string(),
            "timeout_ms" => self.timeout_ms.to_string(),
            "offline_queue_enabled" => self.offline_queue_enabled.to_string(),
            "queue_path" => self.queue_store_path().ok()?.display().to_string(),
            "display_duration_ms" => self.display_duration_ms.to_string(),
            _ => return None,
        };
        Some(v)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// How long a finished action shows its outcome before returning to idle.
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_duration_ms)
    }

    pub fn sync_action(&self, dispatcher: Arc<Dispatcher>) -> SyncAction {
        SyncAction::new(dispatcher, self.display_duration())
    }

    pub fn mutation_options(&self) -> MutationOptions {
        MutationOptions {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            timeout: self.timeout(),
            offline_queue_enabled: self.offline_queue_enabled,
            ..MutationOptions::default()
        }
    }

    pub fn queue_store_path(&self) -> Result<PathBuf> {
        match &self.queue_path {
            Some(p) => Ok(p.clone()),
            None => FileStore::default_path().context("resolve data dir for offline queue"),
        }
    }

    /// Absolute endpoints pass through; relative ones are joined onto `base_url`.
    pub fn resolve_endpoint(&self, endpoint: &str) -> Result<String, MutationError> {
        let invalid = |reason: String| MutationError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        if let Ok(url) = Url::parse(endpoint) {
            return Ok(url.to_string());
        }
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| invalid("relative endpoint without base_url".into()))?;
        let mut base = Url::parse(base).map_err(|e| invalid(format!("base_url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(endpoint.trim_start_matches('/'))
            .map(|u| u.to_string())
            .map_err(|e| invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = serde_yaml::from_str("base_url: http://api.local\nmax_retries: 5\n").unwrap();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.timeout_ms, 30_000);
        assert!(cfg.offline_queue_enabled);
    }

    #[test]
    fn relative_endpoints_join_base_url() {
        let cfg = Config { base_url: Some("https://api.example.com/v1".into()), ..Default::default() };
        assert_eq!(
            cfg.resolve_endpoint("/bookings/confirm").unwrap(),
            "https://api.example.com/v1/bookings/confirm"
        );
        assert_eq!(cfg.resolve_endpoint("http://other/x").unwrap(), "http://other/x");
    }

    #[test]
    fn relative_endpoint_needs_base_url() {
        let err = Config::default().resolve_endpoint("sms/send").unwrap_err();
        assert!(matches!(err, MutationError::InvalidEndpoint { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn display_duration_drives_the_action_reset() {
        use crate::state::MutationStatus;
        use crate::transport::{MutationRequest, Transport};

        struct Ok200;
        #[async_trait::async_trait]
        impl Transport for Ok200 {
            async fn post(&self, _: MutationRequest<'_>) -> Result<serde_json::Value, MutationError> {
                Ok(serde_json::Value::Null)
            }
        }

        let mut cfg = Config::default();
        cfg.set("display_duration_ms", "500").unwrap();
        assert_eq!(cfg.display_duration(), Duration::from_millis(500));

        let dispatcher = Arc::new(Dispatcher::builder("http://api.local/x", Arc::new(Ok200)).build());
        let action = cfg.sync_action(dispatcher);
        action.trigger(serde_json::json!({})).await;
        assert_eq!(action.status(), MutationStatus::Success);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(action.status(), MutationStatus::Success);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(action.status(), MutationStatus::Idle);
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut cfg = Config::default();
        cfg.set("max_retries", "7").unwrap();
        cfg.set("offline_queue_enabled", "false").unwrap();
        assert_eq!(cfg.get("max_retries").as_deref(), Some("7"));
        assert!(!cfg.mutation_options().offline_queue_enabled);
        assert!(cfg.set("max_retries", "many").is_err());
        assert!(cfg.set("token", "x").is_err());
        assert!(cfg.get("token").is_none());
    }
}
