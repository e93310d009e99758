use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub segmentation: Option<SegmentationConfig>,
    pub extraction: Option<ExtractionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Per-document entry pattern (two capture groups: ordinal, heading).
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub num_workers: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub requests_per_minute: Option<u32>,
    pub output_root: Option<String>,
}

/// Platform config directory path: `<config_dir>/tarajim/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tarajim").join("config.toml"))
}

/// Load config by cascading CWD `.tarajim.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".tarajim.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            api_key: overlay
                .api
                .as_ref()
                .and_then(|a| a.api_key.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.api_key.clone())),
            model: overlay
                .api
                .as_ref()
                .and_then(|a| a.model.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.model.clone())),
        }),
        segmentation: Some(SegmentationConfig {
            pattern: overlay
                .segmentation
                .as_ref()
                .and_then(|s| s.pattern.clone())
                .or_else(|| base.segmentation.as_ref().and_then(|s| s.pattern.clone())),
        }),
        extraction: Some(ExtractionConfig {
            num_workers: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.num_workers)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.num_workers)),
            request_timeout_secs: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.request_timeout_secs)
                .or_else(|| {
                    base.extraction
                        .as_ref()
                        .and_then(|e| e.request_timeout_secs)
                }),
            max_retries: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.max_retries)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.max_retries)),
            requests_per_minute: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.requests_per_minute)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.requests_per_minute)),
            output_root: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.output_root.clone())
                .or_else(|| base.extraction.as_ref().and_then(|e| e.output_root.clone())),
        }),
    }
}
