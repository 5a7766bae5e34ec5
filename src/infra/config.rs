use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::prompt::PromptType;
use crate::llm::Backend;

/// Packages excluded from traversal unless configured otherwise
pub const DEFAULT_BLACKLIST: &str = "android.*, androidx.*, com.google.*, java.*, javax.*, kotlin.*, \
dalvik.*, org.json.*, org.xml.*, org.w3c.*, org.apache.*, sun.*";

/// Default session token ceiling
pub const DEFAULT_MAX_TOKENS: usize = 8000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Context assembly settings
    pub analysis: AnalysisConfig,

    /// Transmission backend settings
    pub llm: LlmConfig,

    /// Roster source settings
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig
{
    /// Ceiling for optimized context and response budget
    pub max_tokens: usize,

    /// CSV allow patterns; empty allows everything not denied
    pub package_whitelist: String,

    /// CSV deny patterns
    pub package_blacklist: String,

    pub prompt_type: PromptType,
    pub custom_prompt: String,

    /// Whether `analyze` builds hierarchy contexts by default
    pub hierarchy_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig
{
    pub backend: Backend,
    pub api_key: String,

    /// `host:port[/path]` of a self-hosted Mistral server
    pub mistral_endpoint: String,
    pub mistral_ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig
{
    /// Ignore globs applied on top of .gitignore when scanning directories
    pub ignore_patterns: Vec<String>,
}

impl Default for AnalysisConfig
{
    fn default() -> Self
    {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            package_whitelist: String::new(),
            package_blacklist: DEFAULT_BLACKLIST.to_string(),
            prompt_type: PromptType::Security,
            custom_prompt: String::new(),
            hierarchy_enabled: false,
        }
    }
}

impl Default for LlmConfig
{
    fn default() -> Self
    {
        Self {
            backend: Backend::OpenAi,
            api_key: String::new(),
            mistral_endpoint: "localhost:8080".to_string(),
            mistral_ssl: false,
        }
    }
}

impl Default for SourceConfig
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: vec![
                "build/**".to_string(),
                "target/**".to_string(),
                ".git/**".to_string(),
            ],
        }
    }
}

/// Config files searched in the working directory, first match wins
const CONFIG_PATHS: [&str; 4] = ["classpack.toml", "classpack.yaml", "classpack.json", ".classpack.toml"];

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Load the first config file found in `dir`, layered under `CLASSPACK__*` env vars
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in &CONFIG_PATHS
    {
        let path = dir.join(name);
        if path.exists()
        {
            tracing::debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // CLASSPACK__LLM__API_KEY -> llm.api_key
    builder = builder.add_source(
        config::Environment::with_prefix("CLASSPACK")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("classpack.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        print!("{toml_string}");
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults_match_documented_values()
    {
        let cfg = Config::default();

        assert_eq!(cfg.analysis.max_tokens, 8000);
        assert!(
            cfg.analysis
                .package_whitelist
                .is_empty()
        );
        assert!(
            cfg.analysis
                .package_blacklist
                .starts_with("android.*, androidx.*")
        );
        assert_eq!(cfg.analysis.prompt_type, PromptType::Security);
        assert!(!cfg.analysis.hierarchy_enabled);
        assert_eq!(cfg.llm.mistral_endpoint, "localhost:8080");
    }

    #[test]
    fn test_default_toml_parses_back()
    {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();

        assert_eq!(back, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()>
    {
        let tmp = TempDir::new()?;
        std::fs::write(
            tmp.path()
                .join("classpack.toml"),
            "[analysis]\nmax_tokens = 1200\nprompt_type = \"malware\"\n\n[llm]\nbackend = \"mistral-self-hosted\"\n",
        )?;

        let cfg = load_config_from(tmp.path())?;

        assert_eq!(cfg.analysis.max_tokens, 1200);
        assert_eq!(cfg.analysis.prompt_type, PromptType::Malware);
        assert_eq!(cfg.llm.backend, Backend::MistralSelfHosted);
        assert_eq!(cfg.analysis.package_blacklist, DEFAULT_BLACKLIST);
        assert_eq!(cfg.source, SourceConfig::default());
        Ok(())
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let ctx = AppContext {
            quiet: true,
            no_color: true,
            dry_run: false,
        };
        let args = || InitArgs {
            path: tmp
                .path()
                .to_path_buf(),
            force: false,
        };

        init(args(), &ctx)?;
        assert!(
            tmp.path()
                .join("classpack.toml")
                .exists()
        );
        assert!(init(args(), &ctx).is_err());
        Ok(())
    }
}
