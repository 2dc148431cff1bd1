// quicperf top-level command-line arguments
// (c) 2024 Ross Younger

use std::num::NonZeroU32;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgGroup, Parser};

use crate::{
    client::Job,
    config::{Configuration, Manager, Overrides},
    harness::RunConfig,
    util::{AddressFamily, ByteCount},
};

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("QUICPERF_VERSION_STRING")),
    about,
    before_help = "e.g.   quicperf -s            (on the server)\n       quicperf -c my-server  (on the client)",
    infer_long_args(false)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
#[command(group(ArgGroup::new("mode").required(true).args(["client", "server", "config_files"])))]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CliArgs {
    // MODE SELECTION ======================================================================
    /// Runs as client, measuring the data sent by the server at `target`
    #[arg(short = 'c', long, value_name = "target", help_heading("Modes"))]
    pub client: Option<String>,

    /// Runs as server, sending data to every client that connects
    #[arg(short = 's', long, help_heading("Modes"))]
    pub server: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, help_heading("Configuration"))]
    pub config_files: bool,

    // RUN OPTIONS =========================================================================
    /// Stops after receiving this many bytes, instead of after a fixed time.
    ///
    /// May be given with a `k`, `M` or `G` suffix. 0 means no byte limit.
    #[arg(
        short = 'n',
        long,
        value_name = "bytes",
        conflicts_with("server"),
        help_heading("Run")
    )]
    pub bytes: Option<ByteCount>,

    /// Measures only the time to the first byte of data, then exits
    #[arg(
        short = 'e',
        long,
        conflicts_with_all(["bytes", "server"]),
        help_heading("Run")
    )]
    pub first_byte_only: bool,

    // CONNECTION ==========================================================================
    /// Forces IPv4 connection [default: autodetect]
    #[arg(short = '4', long, conflicts_with("server"), help_heading("Connection"))]
    pub ipv4: bool,
    /// Forces IPv6 connection [default: autodetect]
    #[arg(
        short = '6',
        long,
        conflicts_with_all(["ipv4", "server"]),
        help_heading("Connection")
    )]
    pub ipv6: bool,

    /// Writes TLS secrets to this file in NSS key log format, for packet capture analysis
    #[arg(short = 'l', long, value_name = "FILE", help_heading("TLS"))]
    pub keylog: Option<PathBuf>,

    // CONFIGURATION =======================================================================
    /// Reads additional configuration from this TOML file.
    ///
    /// Options on the command line take precedence.
    #[arg(long, value_name = "FILE", help_heading("Configuration"))]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    // OUTPUT & DEBUG ======================================================================
    /// Quiet mode; reports only errors
    #[arg(short, long, conflicts_with("debug"), help_heading("Output"))]
    pub quiet: bool,

    /// Outputs additional connection statistics
    #[arg(long, alias("statistics"), conflicts_with("quiet"), help_heading("Output"))]
    pub stats: bool,

    /// Enables detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=quicperf=trace` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, help_heading("Debug"))]
    pub debug: bool,

    /// Prints timing profile data after completion
    #[arg(long, help_heading("Debug"))]
    pub profile: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(long, value_name("FILE"), help_heading("Debug"))]
    pub log_file: Option<PathBuf>,
}

impl CliArgs {
    pub(crate) fn address_family(&self) -> AddressFamily {
        if self.ipv4 {
            AddressFamily::IPv4
        } else if self.ipv6 {
            AddressFamily::IPv6
        } else {
            AddressFamily::Any
        }
    }

    /// The tracing level implied by the mode and output options
    pub(crate) fn trace_level(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.quiet {
            "error"
        } else if self.server {
            "warn"
        } else {
            "info"
        }
    }

    /// Merges every configuration source, with our command line on top
    pub(crate) fn configuration(&self, mut manager: Manager) -> anyhow::Result<Configuration> {
        if let Some(path) = &self.config {
            manager.merge_toml_file(path);
        }
        manager.merge_provider(self.overrides.clone());
        manager.get()
    }

    /// Decides how the measurement ends
    pub(crate) fn run_config(&self, config: &Configuration) -> anyhow::Result<RunConfig> {
        if self.first_byte_only {
            return Ok(RunConfig::first_byte_only());
        }
        match self.bytes.map(ByteCount::get) {
            Some(max_bytes) if max_bytes > 0 => Ok(RunConfig::byte_limited(max_bytes)),
            _ => Ok(RunConfig::time_limited(
                NonZeroU32::new(config.time).context("run time must be at least 1 second")?,
            )),
        }
    }

    /// Assembles the client job
    pub(crate) fn job(&self, config: &Configuration) -> anyhow::Result<Job> {
        let host = self
            .client
            .clone()
            .context("a target is required in client mode")?;
        Ok(Job {
            host,
            family: self.address_family(),
            run: self.run_config(config)?,
            keylog: self.keylog.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use clap::{error::ErrorKind, Parser as _};

    use super::CliArgs;
    use crate::config::{Configuration, Manager};
    use crate::harness::{RunConfig, RunMode};
    use crate::transport::{CongestionControllerType, SlowStartType};
    use crate::util::AddressFamily;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("quicperf").chain(args.iter().copied()))
    }

    #[test]
    fn mode_is_required() {
        let e = parse(&[]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn modes_are_exclusive() {
        let e = parse(&["-c", "host", "-s"]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn client_defaults() {
        let args = parse(&["-c", "example.com"]).unwrap();
        let config = args.configuration(Manager::without_files()).unwrap();
        assert_eq!(config, Configuration::default());
        let job = args.job(&config).unwrap();
        assert_eq!(job.host, "example.com");
        assert_eq!(job.family, AddressFamily::Any);
        assert_eq!(job.run, RunConfig::default());
        assert_eq!(args.trace_level(), "info");
    }

    #[test]
    fn server_is_quieter() {
        let args = parse(&["-s"]).unwrap();
        assert_eq!(args.trace_level(), "warn");
        let args = parse(&["-s", "-d"]).unwrap();
        assert_eq!(args.trace_level(), "trace");
    }

    #[test]
    fn transport_options() {
        let args = parse(&[
            "-c", "h", "--cc", "cubic", "--ss", "search10interp", "--searchexit", "1", "--iw",
            "32", "--mw", "64", "-t", "3", "-p", "4433",
        ])
        .unwrap();
        let config = args.configuration(Manager::without_files()).unwrap();
        assert_eq!(config.congestion, CongestionControllerType::Cubic);
        assert_eq!(config.slow_start, SlowStartType::Search10Interp);
        assert!(config.search_exit);
        assert_eq!(config.initial_window, 32);
        assert_eq!(config.max_window, 64);
        assert_eq!(config.time, 3);
        assert_eq!(config.port, 4433);
    }

    #[test]
    fn bad_values_are_rejected() {
        let cases: [&[&str]; 5] = [
            &["-c", "h", "-t", "0"],
            &["-c", "h", "--cc", "bbr"],
            &["-c", "h", "--searchexit", "2"],
            &["-c", "h", "--iw", "0"],
            &["-c", "h", "-n", "5X"],
        ];
        for bad in cases {
            let _ = parse(bad).unwrap_err();
        }
    }

    #[test]
    fn byte_limit() {
        let args = parse(&["-c", "h", "-n", "5M"]).unwrap();
        let run = args.run_config(&Configuration::default()).unwrap();
        assert_eq!(
            run.mode,
            RunMode::ByteLimited {
                max_bytes: 5_000_000
            }
        );
        // zero means no limit
        let args = parse(&["-c", "h", "-n", "0", "-t", "4"]).unwrap();
        let config = args.configuration(Manager::without_files()).unwrap();
        let run = args.run_config(&config).unwrap();
        assert!(matches!(run.mode, RunMode::TimeLimited { runtime_seconds } if runtime_seconds.get() == 4));
    }

    #[test]
    fn first_byte_only() {
        let args = parse(&["-c", "h", "-e", "-6"]).unwrap();
        let job = args.job(&Configuration::default()).unwrap();
        assert_eq!(job.run, RunConfig::first_byte_only());
        assert_eq!(job.family, AddressFamily::IPv6);
        let _ = parse(&["-c", "h", "-e", "-n", "5"]).unwrap_err();
    }

    #[test]
    fn client_options_need_client() {
        let cases: [&[&str]; 4] = [
            &["-s", "-n", "5"],
            &["-s", "-4"],
            &["-s", "-6"],
            &["-s", "-e"],
        ];
        for bad in cases {
            let e = parse(bad).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::ArgumentConflict, "{bad:?}");
        }
        // the same options are fine for a client
        let _ = parse(&["-c", "h", "-n", "5", "-4"]).unwrap();
        let _ = parse(&["-c", "h", "-e", "-6"]).unwrap();
    }

    #[test]
    fn config_file_option() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.toml");
        std::fs::write(&path, "congestion = \"cubic\"\ntime = 20\n").unwrap();
        let args = parse(&["-c", "h", "--config", path.to_str().unwrap(), "-t", "2"]).unwrap();
        let config = args.configuration(Manager::without_files()).unwrap();
        assert_eq!(config.congestion, CongestionControllerType::Cubic);
        assert_eq!(config.time, 2);
    }

    #[test]
    fn cli_structure() {
        use clap::CommandFactory as _;
        CliArgs::command().debug_assert();
    }
}
