// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;
pub const DEFAULT_EXIT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_MIN_ARTIFACT_SIZE: u64 = 1024 * 1024;

/// Settings file as read from TOML.
///
/// ```toml
/// [pool]
/// max_concurrency = 2
/// reconcile_interval = "30s"
///
/// [layout]
/// base_dir = "/srv/builds"
///
/// [upload]
/// address = "nas.local"
/// password = "secret"
/// ```
///
/// Every section is optional; missing values fall back to defaults.
/// Durations are strings (`"500ms"`, `"30s"`, `"2m"`) and are checked in
/// validation, see [`Settings`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    #[serde(default)]
    pub pool: RawPoolSection,

    #[serde(default)]
    pub layout: LayoutSettings,

    #[serde(default)]
    pub vcs: RawVcsSection,

    #[serde(default)]
    pub upload: RawUploadSection,

    #[serde(default)]
    pub store: StoreSettings,
}

/// `[pool]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPoolSection {
    /// Maximum simultaneously working tasks. `0` or absent means the number
    /// of available CPUs.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Fallback period of the reconciliation loop.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,

    /// Capacity of every actor mailbox and outbound queue.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_reconcile_interval() -> String {
    "30s".to_string()
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl Default for RawPoolSection {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            reconcile_interval: default_reconcile_interval(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// `[layout]` section: where sources live and what a build produces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LayoutSettings {
    /// Value of `${base}` in source path templates.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Artifact directory, relative to the local working path.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// Artifacts are files whose name contains this string.
    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,

    /// Artifacts smaller than this many bytes are rejected.
    #[serde(default = "default_min_artifact_size")]
    pub min_artifact_size: u64,

    /// Project build script, run as `<script> <profile>` and
    /// `<script> <profile> clean` inside the local working path.
    #[serde(default = "default_build_script")]
    pub build_script: String,
}

fn default_base_dir() -> String {
    "../..".to_string()
}

fn default_image_dir() -> String {
    "Project/images".to_string()
}

fn default_artifact_suffix() -> String {
    "tar.gz".to_string()
}

fn default_min_artifact_size() -> u64 {
    DEFAULT_MIN_ARTIFACT_SIZE
}

fn default_build_script() -> String {
    "./mkfw.sh".to_string()
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            image_dir: default_image_dir(),
            artifact_suffix: default_artifact_suffix(),
            min_artifact_size: default_min_artifact_size(),
            build_script: default_build_script(),
        }
    }
}

/// `[vcs]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVcsSection {
    #[serde(default = "default_vcs_program")]
    pub program: String,

    /// Directory whose presence marks an existing working copy.
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,

    /// Answered when the client prints an authentication prompt.
    #[serde(default)]
    pub password: Option<String>,

    /// Bound on exit-status checks after a command's output ends.
    #[serde(default = "default_exit_timeout")]
    pub exit_timeout: String,
}

fn default_vcs_program() -> String {
    "svn".to_string()
}

fn default_metadata_dir() -> String {
    ".svn".to_string()
}

fn default_exit_timeout() -> String {
    "3s".to_string()
}

impl Default for RawVcsSection {
    fn default() -> Self {
        Self {
            program: default_vcs_program(),
            metadata_dir: default_metadata_dir(),
            password: None,
            exit_timeout: default_exit_timeout(),
        }
    }
}

/// `[upload]` section: the release server artifacts are copied to.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUploadSection {
    #[serde(default = "default_upload_address")]
    pub address: String,

    #[serde(default = "default_upload_user")]
    pub user: String,

    /// When set, remote commands are wrapped with `sshpass -p`.
    #[serde(default)]
    pub password: Option<String>,

    /// Absolute release root on the server. Path segments below it are
    /// created on demand before a transfer.
    #[serde(default = "default_upload_root")]
    pub root: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
}

fn default_upload_address() -> String {
    "localhost".to_string()
}

fn default_upload_user() -> String {
    "buildmanager".to_string()
}

fn default_upload_root() -> String {
    "/volume1/version".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> String {
    "2s".to_string()
}

impl Default for RawUploadSection {
    fn default() -> Self {
        Self {
            address: default_upload_address(),
            user: default_upload_user(),
            password: None,
            root: default_upload_root(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreSettings {
    /// JSON file holding every known build config.
    #[serde(default = "default_build_list")]
    pub build_list: PathBuf,
}

fn default_build_list() -> PathBuf {
    PathBuf::from("build_list.json")
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            build_list: default_build_list(),
        }
    }
}

/// Validated settings used by the rest of the application.
///
/// Obtained from [`RawSettings`] via `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub pool: PoolSettings,
    pub layout: LayoutSettings,
    pub vcs: VcsSettings,
    pub upload: UploadSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Resolved concurrency cap, always >= 1.
    pub max_concurrency: usize,
    pub reconcile_interval: Duration,
    pub mailbox_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct VcsSettings {
    pub program: String,
    pub metadata_dir: String,
    pub password: Option<String>,
    pub exit_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub address: String,
    pub user: String,
    pub password: Option<String>,
    pub root: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl UploadSettings {
    /// `user@address:root`, the value of `${base}`/`${version}` in upload
    /// templates.
    pub fn destination_base(&self) -> String {
        format!("{}@{}:{}", self.user, self.address, self.root)
    }
}

/// Number of available processing units, minimum 1.
pub fn available_parallelism() -> usize {
    num_cpus::get().max(1)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pool: PoolSettings {
                max_concurrency: available_parallelism(),
                reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
                mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            },
            layout: LayoutSettings::default(),
            vcs: VcsSettings {
                program: default_vcs_program(),
                metadata_dir: default_metadata_dir(),
                password: None,
                exit_timeout: DEFAULT_EXIT_TIMEOUT,
            },
            upload: UploadSettings {
                address: default_upload_address(),
                user: default_upload_user(),
                password: None,
                root: default_upload_root(),
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            store: StoreSettings::default(),
        }
    }
}
