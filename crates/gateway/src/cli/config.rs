use anyhow::Context;

use pc_domain::config::{Config, ConfigSeverity};
use pc_providers::store_in_keychain;

use super::login::{KEYCHAIN_SERVICE, TOKEN_ACCOUNT};
use super::SecretTarget;

/// Parse and validate the config, printing any issues.
///
/// Returns `false` when errors are found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!(
        "\n{} error(s), {} warning(s) in {config_path}",
        error_count, warning_count,
    );

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}

/// Keychain `(service, account)` a secret target is stored under.
pub fn keychain_entry(config: &Config, target: SecretTarget) -> (String, String) {
    let (auth, default_account) = match target {
        SecretTarget::Token => return (KEYCHAIN_SERVICE.into(), TOKEN_ACCOUNT.into()),
        SecretTarget::Llm => (&config.llm.auth, "llm-api-key"),
        SecretTarget::ClientToken => (&config.authn.client_token, "client-token"),
    };
    (
        auth.service.clone().unwrap_or_else(|| KEYCHAIN_SERVICE.into()),
        auth.account.clone().unwrap_or_else(|| default_account.into()),
    )
}

/// Prompt for a secret (no echo) and store it in the OS keychain.
pub fn set_secret(config: &Config, target: SecretTarget) -> anyhow::Result<()> {
    let (service, account) = keychain_entry(config, target);
    let secret = rpassword::prompt_password_stderr(&format!("Secret for {account}: "))
        .context("reading secret")?;
    let secret = secret.trim();
    if secret.is_empty() {
        anyhow::bail!("empty secret, nothing stored");
    }

    store_in_keychain(&service, &account, secret)?;
    println!("Stored {account} in the OS keychain (service {service})");

    let section = match target {
        SecretTarget::Token => None,
        SecretTarget::Llm => Some(("[llm.auth]", &config.llm.auth)),
        SecretTarget::ClientToken => Some(("[authn.client_token]", &config.authn.client_token)),
    };
    if let Some((name, auth)) = section {
        if auth.service.is_none() || auth.account.is_none() {
            println!(
                "Add service = \"{service}\" and account = \"{account}\" under {name} to use it"
            );
        }
    }
    Ok(())
}
