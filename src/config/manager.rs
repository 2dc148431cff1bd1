//! Configuration file wrangling
// (c) 2024 Ross Younger

use super::Configuration;

use anyhow::Context as _;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Metadata, Provider,
};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

// PATHS /////////////////////////////////////////////////////////////////////////////////////////////////////

const BASE_CONFIG_FILENAME: &str = "quicperf.toml";

/// Environment variables with this prefix override configuration files
pub const ENV_PREFIX: &str = "QUICPERF_";

fn user_config_path() -> Option<PathBuf> {
    // ~/.<filename> for now
    let mut d = dirs::home_dir()?;
    d.push(format!(".{BASE_CONFIG_FILENAME}"));
    Some(d)
}

fn system_config_path() -> PathBuf {
    let mut p: PathBuf = PathBuf::new();
    p.push("/etc");
    p.push(BASE_CONFIG_FILENAME);
    p
}

// SYSTEM DEFAULTS //////////////////////////////////////////////////////////////////////////////////////////////

/// A `[https://docs.rs/figment/latest/figment/trait.Provider.html](figment::Provider)` that holds
/// our set of fixed system default options
#[derive(Default)]
struct SystemDefault {}

impl SystemDefault {
    const META_NAME: &str = "default";
}

impl Provider for SystemDefault {
    fn metadata(&self) -> Metadata {
        figment::Metadata::named(Self::META_NAME)
    }

    fn data(
        &self,
    ) -> std::result::Result<
        figment::value::Map<figment::Profile, figment::value::Dict>,
        figment::Error,
    > {
        Serialized::defaults(Configuration::default()).data()
    }
}

// CONFIG MANAGER /////////////////////////////////////////////////////////////////////////////////////////////

/// Processes and merges all possible configuration sources.
///
/// In increasing order of priority:
/// 1. Hard-wired defaults
/// 1. The system configuration file (`/etc/quicperf.toml`)
/// 1. The user configuration file (`~/.quicperf.toml`)
/// 1. `QUICPERF_*` environment variables
/// 1. Anything merged afterwards (an explicit `--config` file, then the command line)
#[derive(Debug, Default)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

fn add_file(f: Figment, path: &Path, what: &str) -> Figment {
    if !path.exists() {
        trace!("{what} configuration file {path:?} not present");
        return f;
    }
    f.merge(Toml::file(path))
}

impl Manager {
    /// Initialises this structure, reading the configuration files and environment
    #[must_use]
    pub fn new() -> Self {
        let mut data = Figment::new().merge(SystemDefault::default());
        data = add_file(data, &system_config_path(), "system");
        if let Some(p) = user_config_path() {
            data = add_file(data, &p, "user");
        } else {
            warn!("could not determine home directory; skipping user configuration file");
        }
        // N.B. This may leave data in a fused-error state, if a data file isn't parseable.
        data = data.merge(Env::prefixed(ENV_PREFIX).only(Configuration::FIELDS));
        Self { data }
    }

    /// Returns the list of configuration files we read.
    ///
    /// This is a function of platform and the current user id.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        std::iter::once(Some(system_config_path()))
            .chain(std::iter::once(user_config_path()))
            .flatten()
            .map(|p| p.into_os_string().to_string_lossy().into())
            .collect()
    }

    /// Testing/internal constructor, does not read files or environment
    #[must_use]
    pub fn without_files() -> Self {
        let data = Figment::new().merge(SystemDefault::default());
        Self { data }
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    ///
    /// The command line arrives here as [`super::Overrides`].
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Merges in a data set from a TOML file, which must exist
    pub fn merge_toml_file<T>(&mut self, toml: T)
    where
        T: AsRef<Path>,
    {
        let path = toml.as_ref();
        let provider = Toml::file_exact(path);
        self.merge_provider(provider);
    }

    /// Extracts and validates the merged configuration
    pub fn get(&self) -> anyhow::Result<Configuration> {
        let config: Configuration = self
            .data
            .extract()
            .context("failed to process configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write as _;

    use crate::config::{Configuration, Manager, Overrides};
    use crate::transport::{CongestionControllerType, SlowStartType};

    fn make_test_tempfile(data: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        f.write_all(data.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults() {
        let mgr = Manager::without_files();
        let result = mgr.get().unwrap();
        let expected = Configuration::default();
        assert_eq!(expected, result);
    }

    #[test]
    fn config_merge() {
        // simulate a CLI
        let entered = Overrides {
            time: Some(3),
            ..Default::default()
        };
        let expected = Configuration {
            time: 3,
            ..Default::default()
        };

        let mut mgr = Manager::without_files();
        mgr.merge_provider(entered);
        let result = mgr.get().unwrap();
        assert_eq!(expected, result);
    }

    #[test]
    fn cli_beats_file() {
        let file = make_test_tempfile(
            r#"
            congestion = "CUBIC"
            slow_start = "search10"
            time = 30
        "#,
        );
        let cli = Overrides {
            time: Some(7),
            ..Default::default()
        };
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(file.path());
        mgr.merge_provider(cli);
        let result = mgr.get().unwrap();
        assert_eq!(result.congestion, CongestionControllerType::Cubic);
        assert_eq!(result.slow_start, SlowStartType::Search10);
        assert_eq!(result.time, 7);
    }

    #[test]
    fn unparseable_toml() {
        let file = make_test_tempfile(
            r"
            time = 1
            port 123 # this line is a syntax error
        ",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(file.path());
        assert!(mgr.get().is_err());
    }

    #[test]
    fn missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(dir.path().join("nonexistent.toml"));
        assert!(mgr.get().is_err());
    }

    #[test]
    fn type_error() {
        let file = make_test_tempfile("port = \"eighty\"\n");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(file.path());
        let _ = mgr.get().unwrap_err();
    }

    #[test]
    fn unknown_field() {
        let file = make_test_tempfile("colour = \"blue\"\n");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(file.path());
        let _ = mgr.get().unwrap_err();
    }

    #[test]
    fn validation_applies() {
        let file = make_test_tempfile("time = 0\n");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(file.path());
        let err = mgr.get().unwrap_err();
        assert!(err.to_string().contains("at least 1 second"));
    }

    #[test]
    fn config_file_list() {
        let files = Manager::config_files();
        assert!(files[0].ends_with("quicperf.toml"));
    }
}
