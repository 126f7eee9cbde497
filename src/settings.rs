use std::collections::HashMap;
use std::env;

#[derive(Clone, Debug)]
pub struct TemplateSettings {
    pub dir: String,
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub template: TemplateSettings,
    pub other: HashMap<String, String>, // Manteniamo eventuali future impostazioni
}

const KNOWN_VARS: [&str; 5] = [
    "TAZZINA_DEBUG",
    "TAZZINA_HOST",
    "TAZZINA_PORT",
    "TAZZINA_DATABASE_URL",
    "TAZZINA_TEMPLATE_DIR",
];

impl Settings {
    /// Builds settings from `TAZZINA_*` environment variables, falling back
    /// to defaults suited for local development. Unrecognized `TAZZINA_*`
    /// variables are kept verbatim in `other`.
    pub fn from_env() -> Self {
        let debug = env_flag("TAZZINA_DEBUG");
        let host = env::var("TAZZINA_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("TAZZINA_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8000);
        let database_url = env::var("TAZZINA_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:cafes.db?mode=rwc".to_string());
        let template_dir =
            env::var("TAZZINA_TEMPLATE_DIR").unwrap_or_else(|_| "templates".to_string());

        let other = env::vars()
            .filter(|(name, _)| name.starts_with("TAZZINA_") && !KNOWN_VARS.contains(&name.as_str()))
            .collect();

        Settings {
            debug,
            host,
            port,
            database_url,
            template: TemplateSettings {
                dir: template_dir,
                debug,
            },
            other,
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}
