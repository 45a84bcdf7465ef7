use {
    crate::error::{ConfigSnafu, Result},
    snafu::prelude::*,
    std::{env, num::NonZeroUsize, path::PathBuf, time::Duration},
};

pub const DATADIR_VAR: &str = "CATALOG_DATADIR";
pub const LOCK_TIMEOUT_VAR: &str = "CATALOG_LOCK_TIMEOUT_MS";
pub const OPEN_FILES_VAR: &str = "CATALOG_OPEN_FILES";
pub const VERIFY_ON_OPEN_VAR: &str = "CATALOG_VERIFY_ON_OPEN";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Root under which every database gets its own directory.
    pub data_dir: PathBuf,
    /// Name of the per-database directory holding the catalog stores.
    pub system_dir: String,
    /// `None` waits for latches forever.
    pub lock_timeout: Option<Duration>,
    /// Capacity of the open file handle cache.
    pub open_files: NonZeroUsize,
    pub page_size: usize,
    pub verify_on_open: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("catalog_data"),
            system_dir: "system".to_string(),
            lock_timeout: Some(Duration::from_secs(10)),
            open_files: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
            page_size: storage::PAGE_SIZE,
            verify_on_open: false,
        }
    }
}

impl CatalogConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by the `CATALOG_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var(DATADIR_VAR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(ms) = env::var(LOCK_TIMEOUT_VAR) {
            let ms = parse::<u64>(LOCK_TIMEOUT_VAR, &ms)?;
            config.lock_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Ok(n) = env::var(OPEN_FILES_VAR) {
            let n = parse::<usize>(OPEN_FILES_VAR, &n)?;
            config.open_files = NonZeroUsize::new(n).context(ConfigSnafu {
                details: format!("{OPEN_FILES_VAR} must be positive"),
            })?;
        }
        if let Ok(flag) = env::var(VERIFY_ON_OPEN_VAR) {
            config.verify_on_open = parse::<bool>(VERIFY_ON_OPEN_VAR, &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.page_size == storage::PAGE_SIZE,
            ConfigSnafu {
                details: format!(
                    "page size {} does not match the storage page size {}",
                    self.page_size,
                    storage::PAGE_SIZE
                ),
            }
        );
        ensure!(
            !self.system_dir.is_empty(),
            ConfigSnafu {
                details: "system directory name is empty",
            }
        );
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim().parse().ok().context(ConfigSnafu {
        details: format!("cannot parse {var}={raw}"),
    })
}
