pub mod chat;
pub mod config;
pub mod history;
pub mod login;
pub mod render;
pub mod run;

use clap::{Parser, Subcommand, ValueEnum};

/// Pangea Chat: a guarded, audited LLM chat client.
#[derive(Debug, Parser)]
#[command(name = "pangea-chat", version, about)]
pub struct Cli {
    /// Log at debug level (or JSON when `observability.log_format = "json"`).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat (default when no subcommand is given).
    Chat,
    /// Send a single prompt through the pipeline and print the response.
    Run {
        /// The prompt to send.
        message: String,
        /// Output the outcome and the new transcript entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the transcript rebuilt from the audit log.
    History {
        /// Output the transcript as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
    /// Store a secret in the OS keychain.
    SetSecret {
        #[arg(value_enum)]
        target: SecretTarget,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretTarget {
    /// The user's bearer token.
    Token,
    /// The LLM provider API key (`[llm.auth]`).
    Llm,
    /// The client token authorizing token checks (`[authn.client_token]`).
    ClientToken,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `PC_CONFIG` (or `config.toml`
/// by default). A missing file means all defaults. Returns the parsed
/// [`Config`](pc_domain::config::Config) and the path that was used.
pub fn load_config() -> anyhow::Result<(pc_domain::config::Config, String)> {
    let config_path = std::env::var("PC_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<pc_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(pc_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chat.daily_max_messages, 20);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chat]\ndaily_max_messages = 5\n\n[authz]\nenabled = true").unwrap();
        let config = load_config_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.chat.daily_max_messages, 5);
        assert!(config.authz.enabled);
        assert_eq!(config.chat.prompt_max_chars, 2000);
    }

    #[test]
    fn broken_toml_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chat\n").unwrap();
        let path = file.path().to_str().unwrap().to_owned();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains(&path));
    }

    #[test]
    fn run_parses_json_flag() {
        let cli = Cli::parse_from(["pangea-chat", "run", "hello", "--json"]);
        match cli.command {
            Some(Command::Run { message, json }) => {
                assert_eq!(message, "hello");
                assert!(json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn set_secret_takes_kebab_target() {
        let cli = Cli::parse_from(["pangea-chat", "config", "set-secret", "client-token"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::SetSecret {
                target: SecretTarget::ClientToken
            }))
        ));
    }
}
