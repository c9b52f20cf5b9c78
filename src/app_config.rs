//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// TOML-backed file configuration for harvester defaults.
///
/// Every field is optional; CLI flags take precedence over config values,
/// which take precedence over built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Search endpoint URL.
    pub endpoint: Option<String>,
    /// Default output directory for records and checkpoints.
    pub output_dir: Option<PathBuf>,
    /// Default page size.
    pub page_size: Option<u64>,
    /// Default result window limit.
    pub max_window: Option<u64>,
    /// Default segmentation field.
    pub segment_field: Option<String>,
    /// Default segmentation alphabet.
    pub segment_alphabet: Option<String>,
    /// Default maximum segmentation depth.
    pub max_depth: Option<usize>,
    /// Default maximum attempts per request.
    pub max_retries: Option<u32>,
    /// Default base backoff delay in seconds.
    pub retry_base_secs: Option<u64>,
    /// Default politeness delay between pages in milliseconds.
    pub page_delay_ms: Option<u64>,
}

impl FileConfig {
    /// Validates config values against the same constraints as the CLI.
    pub fn validate(&self) -> Result<()> {
        if let Some(page_size) = self.page_size
            && !(1..=10_000).contains(&page_size)
        {
            bail!("Invalid config value for `page_size`: {page_size}. Expected range: 1..=10000");
        }
        if let Some(max_window) = self.max_window
            && max_window < 2
        {
            bail!("Invalid config value for `max_window`: {max_window}. Expected at least 2");
        }
        if let Some(max_depth) = self.max_depth
            && !(1..=8).contains(&max_depth)
        {
            bail!("Invalid config value for `max_depth`: {max_depth}. Expected range: 1..=8");
        }
        if let Some(max_retries) = self.max_retries
            && !(1..=10).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }
        if let Some(retry_base_secs) = self.retry_base_secs
            && retry_base_secs > 600
        {
            bail!(
                "Invalid config value for `retry_base_secs`: {retry_base_secs}. Expected range: 0..=600"
            );
        }
        if let Some(page_delay_ms) = self.page_delay_ms
            && page_delay_ms > 60_000
        {
            bail!(
                "Invalid config value for `page_delay_ms`: {page_delay_ms}. Expected range: 0..=60000"
            );
        }
        if let Some(alphabet) = &self.segment_alphabet
            && alphabet.is_empty()
        {
            bail!("Invalid config value for `segment_alphabet`: must not be empty");
        }
        Ok(())
    }
}

/// A config load result carrying provenance for logging.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The path that was considered.
    pub path: Option<PathBuf>,
    /// The parsed config, when the file existed.
    pub config: Option<FileConfig>,
    /// Whether a file was actually read.
    pub loaded_from_file: bool,
}

/// Resolves the default config path from XDG conventions.
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("harvester")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from an explicit path, or the default path if present.
pub fn load_config(explicit_path: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit_path {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    if !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "endpoint" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `endpoint` value on line {}", line_index + 1)
                })?;
                cfg.endpoint = Some(parsed);
            }
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `output_dir` value on line {}", line_index + 1)
                })?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "page_size" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `page_size` value on line {}", line_index + 1)
                })?;
                cfg.page_size = Some(parsed);
            }
            "max_window" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `max_window` value on line {}", line_index + 1)
                })?;
                cfg.max_window = Some(parsed);
            }
            "segment_field" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `segment_field` value on line {}", line_index + 1)
                })?;
                cfg.segment_field = Some(parsed);
            }
            "segment_alphabet" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `segment_alphabet` value on line {}", line_index + 1)
                })?;
                cfg.segment_alphabet = Some(parsed);
            }
            "max_depth" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `max_depth` value on line {}", line_index + 1)
                })?;
                cfg.max_depth = Some(usize::try_from(parsed).context("max_depth out of range")?);
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `max_retries` value on line {}", line_index + 1)
                })?;
                cfg.max_retries =
                    Some(u32::try_from(parsed).context("max_retries out of range for u32")?);
            }
            "retry_base_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `retry_base_secs` value on line {}", line_index + 1)
                })?;
                cfg.retry_base_secs = Some(parsed);
            }
            "page_delay_ms" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `page_delay_ms` value on line {}", line_index + 1)
                })?;
                cfg.page_delay_ms = Some(parsed);
            }
            other => {
                bail!("Unknown config key `{}` on line {}", other, line_index + 1);
            }
        }
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Strips a `#` comment unless it appears inside a quoted string.
fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

/// Parses a TOML-style string value: quotes required, no escapes supported.
fn parse_string_literal(value: &str) -> Result<String> {
    let inner = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .with_context(|| format!("expected a double-quoted string, got `{value}`"))?;
    if inner.contains('"') {
        bail!("nested quotes are not supported in `{value}`");
    }
    Ok(inner.to_string())
}

fn parse_integer_u64(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("expected a non-negative integer, got `{value}`"))
}
