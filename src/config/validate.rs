// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    PoolSettings, RawSettings, Settings, UploadSettings, VcsSettings, available_parallelism,
};
use crate::errors::{MuppetError, Result};

impl TryFrom<RawSettings> for Settings {
    type Error = crate::errors::MuppetError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        validate_raw_settings(&raw)?;

        let max_concurrency = match raw.pool.max_concurrency {
            Some(n) if n > 0 => n,
            _ => available_parallelism(),
        };

        Ok(Settings {
            pool: PoolSettings {
                max_concurrency,
                reconcile_interval: duration_field(
                    "pool.reconcile_interval",
                    &raw.pool.reconcile_interval,
                )?,
                mailbox_capacity: raw.pool.mailbox_capacity,
            },
            layout: raw.layout,
            vcs: VcsSettings {
                program: raw.vcs.program,
                metadata_dir: raw.vcs.metadata_dir,
                password: non_empty(raw.vcs.password),
                exit_timeout: duration_field("vcs.exit_timeout", &raw.vcs.exit_timeout)?,
            },
            upload: UploadSettings {
                address: raw.upload.address,
                user: raw.upload.user,
                password: non_empty(raw.upload.password),
                root: raw.upload.root.trim_end_matches('/').to_string(),
                max_retries: raw.upload.max_retries,
                retry_delay: duration_field("upload.retry_delay", &raw.upload.retry_delay)?,
            },
            store: raw.store,
        })
    }
}

fn validate_raw_settings(raw: &RawSettings) -> Result<()> {
    validate_pool(raw)?;
    validate_layout(raw)?;
    validate_upload(raw)?;
    Ok(())
}

fn validate_pool(raw: &RawSettings) -> Result<()> {
    if raw.pool.mailbox_capacity == 0 {
        return Err(MuppetError::ConfigError(
            "[pool].mailbox_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    let interval = duration_field("pool.reconcile_interval", &raw.pool.reconcile_interval)?;
    if interval.is_zero() {
        return Err(MuppetError::ConfigError(
            "[pool].reconcile_interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_layout(raw: &RawSettings) -> Result<()> {
    if raw.layout.build_script.trim().is_empty() {
        return Err(MuppetError::ConfigError(
            "[layout].build_script must not be empty".to_string(),
        ));
    }
    if raw.layout.artifact_suffix.trim().is_empty() {
        return Err(MuppetError::ConfigError(
            "[layout].artifact_suffix must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_upload(raw: &RawSettings) -> Result<()> {
    if !raw.upload.root.starts_with('/') {
        return Err(MuppetError::ConfigError(format!(
            "[upload].root must be an absolute path (got '{}')",
            raw.upload.root
        )));
    }
    Ok(())
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| MuppetError::ConfigError(format!("[{field}] {e}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Settings> {
        let raw: RawSettings = toml::from_str(toml_src)?;
        Settings::try_from(raw)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = parse("").unwrap();
        assert!(settings.pool.max_concurrency >= 1);
        assert_eq!(settings.pool.reconcile_interval, Duration::from_secs(30));
        assert_eq!(settings.layout.build_script, "./mkfw.sh");
        assert_eq!(
            settings.upload.destination_base(),
            "buildmanager@localhost:/volume1/version"
        );
    }

    #[test]
    fn explicit_values_are_kept() {
        let settings = parse(
            r#"
            [pool]
            max_concurrency = 3
            reconcile_interval = "5s"

            [upload]
            address = "nas"
            root = "/data/releases/"
            password = ""
            "#,
        )
        .unwrap();
        assert_eq!(settings.pool.max_concurrency, 3);
        assert_eq!(settings.pool.reconcile_interval, Duration::from_secs(5));
        assert_eq!(settings.upload.root, "/data/releases");
        assert_eq!(settings.upload.password, None);
    }

    #[test]
    fn zero_concurrency_means_cpu_count() {
        let settings = parse("[pool]\nmax_concurrency = 0\n").unwrap();
        assert_eq!(settings.pool.max_concurrency, available_parallelism());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse("[pool]\nmailbox_capacity = 0\n").is_err());
        assert!(parse("[pool]\nreconcile_interval = \"0s\"\n").is_err());
        assert!(parse("[vcs]\nexit_timeout = \"soon\"\n").is_err());
        assert!(parse("[upload]\nroot = \"relative/path\"\n").is_err());
        assert!(parse("[layout]\nbuild_script = \"\"\n").is_err());
    }
}
