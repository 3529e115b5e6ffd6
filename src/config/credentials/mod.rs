use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `NANOBOT_*` env var that is set and non-empty will overwrite the
        /// corresponding config field, so secrets can be injected without
        /// touching the config file.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "feishu-app-id",            "NANOBOT_FEISHU_APP_ID"            => channels.feishu.app_id;
    "feishu-app-secret",        "NANOBOT_FEISHU_APP_SECRET"        => channels.feishu.app_secret;
    "groq-api-key",             "NANOBOT_GROQ_API_KEY"             => providers.groq.api_key;
    "image-parser-api-key",     "NANOBOT_IMAGE_PARSER_API_KEY"     => providers.image_parser.api_key;
}

/// Names of credential slots that currently hold a value, for `config check`.
pub fn configured_credentials(config: &Config) -> Vec<&'static str> {
    CREDENTIAL_ENV_VARS
        .iter()
        .filter(|(name, _)| get_credential_value(config, name).is_some_and(|v| !v.is_empty()))
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests;
