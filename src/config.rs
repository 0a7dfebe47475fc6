use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const DATA_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_file: Option<PathBuf>,
    pub http_bind_address: SocketAddr,
    pub graceful_shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            data_file: cli_data_file,
            http_bind: cli_http_bind,
            shutdown_timeout: cli_shutdown_timeout,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            data_file: file_data_file,
            http_bind: file_http_bind,
            shutdown_timeout: file_shutdown_timeout,
        } = file_config;

        // Relative data files in a config file resolve against that file.
        let file_data_file = file_data_file.map(|path| {
            match config.as_ref().and_then(|cfg| cfg.parent()) {
                Some(parent) if path.is_relative() => parent.join(path),
                _ => path,
            }
        });

        let data_file = cli_data_file.or(file_data_file);

        let http_bind_address = match cli_http_bind.or(file_http_bind) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_BIND
                .parse()
                .context("default bind address invalid")?,
        };

        let graceful_shutdown_timeout_secs = cli_shutdown_timeout
            .or(file_shutdown_timeout)
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        Ok(Self {
            data_file,
            http_bind_address,
            graceful_shutdown_timeout_secs,
        })
    }

    /// Fails fast on settings that would only break at request time.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = self.data_file.as_ref() {
            anyhow::ensure!(path.exists(), "data file {:?} does not exist", path);
            anyhow::ensure!(path.is_file(), "data file {:?} is not a file", path);
            let allowed = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .map(|ext| DATA_FILE_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false);
            anyhow::ensure!(
                allowed,
                "data file {:?} does not match allowed extensions {:?}",
                path,
                DATA_FILE_EXTENSIONS
            );
        }
        anyhow::ensure!(
            self.graceful_shutdown_timeout_secs > 0,
            "shutdown timeout must be at least one second"
        );
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            http_bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            graceful_shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "crm-reports", about = "Customer call report service", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "CRM_REPORTS_DATA_FILE",
        value_name = "FILE",
        help = "YAML or JSON snapshot of customers and calls"
    )]
    pub data_file: Option<PathBuf>,

    #[arg(
        long,
        env = "CRM_REPORTS_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "CRM_REPORTS_SHUTDOWN_TIMEOUT",
        value_name = "SECS",
        help = "Seconds to wait for in-flight reports on shutdown",
        value_parser = clap::value_parser!(u64)
    )]
    pub shutdown_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    data_file: Option<PathBuf>,
    http_bind: Option<SocketAddr>,
    shutdown_timeout: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_arguments() {
        let config = ServerConfig::from_args(CliArgs::default()).unwrap();
        assert_eq!(config.data_file, None);
        assert_eq!(config.http_bind_address.to_string(), DEFAULT_HTTP_BIND);
        assert_eq!(
            config.graceful_shutdown_timeout_secs,
            DEFAULT_SHUTDOWN_TIMEOUT_SECS
        );
        config.validate().unwrap();
    }

    #[test]
    fn cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("crm.yaml");
        let mut file = fs::File::create(&cfg_path).unwrap();
        writeln!(file, "data_file: records.yaml").unwrap();
        writeln!(file, "http_bind: 0.0.0.0:9000").unwrap();
        writeln!(file, "shutdown_timeout: 5").unwrap();

        let config = ServerConfig::from_args(CliArgs {
            config: Some(cfg_path),
            shutdown_timeout: Some(12),
            ..CliArgs::default()
        })
        .unwrap();

        assert_eq!(config.data_file, Some(dir.path().join("records.yaml")));
        assert_eq!(config.http_bind_address.port(), 9000);
        assert_eq!(config.graceful_shutdown_timeout_secs, 12);
    }

    #[test]
    fn validate_rejects_missing_data_file() {
        let config = ServerConfig {
            data_file: Some(PathBuf::from("/nonexistent/records.yaml")),
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn validate_rejects_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        let config = ServerConfig {
            data_file: Some(file.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("allowed extensions"));
    }

    #[test]
    fn unsupported_config_extension_is_an_error() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ServerConfig::from_args(CliArgs {
            config: Some(file.path().to_path_buf()),
            ..CliArgs::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }
}
