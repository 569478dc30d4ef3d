//! Configuration loading from TOML files and environment overlays

#[cfg(test)]
mod config_loading_tests {
    use spl_send::config::{Config, ENV_SIGNER_APP_ID, ENV_TOKEN_MINT};
    use solana_sdk::pubkey::Pubkey;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mint = Pubkey::new_unique();
        let file = write_config(&format!(
            r#"
            [token]
            mint = "{mint}"
            symbol = "EURC"

            [broadcast]
            max_retries = 5
            "#
        ));

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.token.mint.as_deref(), Some(mint.to_string().as_str()));
        assert_eq!(config.token.symbol, "EURC");
        assert_eq!(config.token.decimals, 6);
        assert_eq!(config.broadcast.max_retries, 5);
        assert_eq!(config.broadcast.poll_interval_ms, 500);
        assert_eq!(config.funding_url, "https://faucet.circle.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[token]\nmint = \"not-a-mint\"\n");
        let mut config = Config::from_file(file.path()).unwrap();

        let mint = Pubkey::new_unique().to_string();
        let env: HashMap<&str, String> = [
            (ENV_TOKEN_MINT, mint.clone()),
            (ENV_SIGNER_APP_ID, "   ".to_string()),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides(|key| env.get(key).cloned());

        assert_eq!(config.token.mint.as_deref(), Some(mint.as_str()));
        // Blank values are ignored
        assert_eq!(config.signer.app_id, None);
        assert!(config.validate().is_ok());
        assert!(config.validate_client().is_err());
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let file = write_config(
            r#"
            [rpc]
            url = "ftp://ledger"

            [token]
            decimals = 12
            "#,
        );
        let config = Config::from_file(file.path()).unwrap();
        let problems = config.problems();
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("rpc.url")));
        assert!(problems.iter().any(|p| p.contains("token.mint")));
        assert!(problems.iter().any(|p| p.contains("token.decimals")));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = write_config("[token\nmint = ");
        assert!(Config::from_file(file.path()).is_err());
    }
}
