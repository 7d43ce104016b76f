pub mod commands;
pub mod logging;

use anyhow::Result;
use camino::Utf8PathBuf;
use camsync_config::Settings;
use camsync_pipeline::{DeletePolicy, SyncOptions};
use std::time::Duration;

/// Values given on the command line; each one beats the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dest: Option<Utf8PathBuf>,
    pub camera_ip: Option<String>,
    pub bridge_port: Option<u16>,
    pub base_url: Option<String>,
    pub delete_after_download: bool,
    pub no_wifi: bool,
    pub list_timeout_secs: Option<u64>,
}

/// Everything one command needs, after merging settings and flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub dest_dir: Utf8PathBuf,
    pub bridge_addr: String,
    pub http_base_url: String,
    pub ssid_prefixes: Vec<String>,
    pub wifi: bool,
    pub options: SyncOptions,
}

impl RunConfig {
    pub fn resolve(settings: &Settings, overrides: &Overrides) -> Result<Self> {
        let dest_dir = match &overrides.dest {
            Some(d) => d.clone(),
            None => settings.destination_dir()?.to_path_buf(),
        };

        let mut camera = settings.camera.clone();
        if let Some(ip) = &overrides.camera_ip {
            camera.ip = ip.clone();
        }
        if let Some(port) = overrides.bridge_port {
            camera.bridge_port = port;
        }
        let http_base_url = overrides
            .base_url
            .clone()
            .unwrap_or_else(|| camera.http_base_url());

        let list_timeout = overrides
            .list_timeout_secs
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or_else(|| settings.sync.list_timeout());

        Ok(Self {
            dest_dir,
            bridge_addr: camera.bridge_addr(),
            http_base_url,
            ssid_prefixes: camera.ssid_prefixes,
            wifi: settings.wifi.enabled && !overrides.no_wifi,
            options: SyncOptions {
                list_timeout,
                delete_policy: DeletePolicy::from_setting(
                    settings.sync.delete_after_download || overrides.delete_after_download,
                ),
                ..SyncOptions::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_beat_the_settings_file() {
        let mut settings = Settings::default();
        settings.storage.destination_dir = Some("/media/from-file".into());
        settings.camera.ip = "10.0.0.9".into();

        let overrides = Overrides {
            dest: Some("/media/from-flag".into()),
            bridge_port: Some(7000),
            no_wifi: true,
            ..Default::default()
        };
        let cfg = RunConfig::resolve(&settings, &overrides).unwrap();

        assert_eq!(cfg.dest_dir.as_str(), "/media/from-flag");
        assert_eq!(cfg.bridge_addr, "10.0.0.9:7000");
        assert_eq!(cfg.http_base_url, "http://10.0.0.9");
        assert!(!cfg.wifi);
        assert_eq!(cfg.options.delete_policy, DeletePolicy::Never);
    }

    #[test]
    fn destination_is_required_somewhere() {
        let err = RunConfig::resolve(&Settings::default(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("destination"), "{err}");
    }

    #[test]
    fn delete_setting_maps_to_policy() {
        let mut settings = Settings::default();
        settings.storage.destination_dir = Some("/media/x".into());
        settings.sync.delete_after_download = true;
        let cfg = RunConfig::resolve(&settings, &Overrides::default()).unwrap();
        assert_eq!(cfg.options.delete_policy, DeletePolicy::AfterVerified);
        assert!(cfg.wifi);
    }
}
