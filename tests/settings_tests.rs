use std::env;
use tazzina::settings::Settings;

// Environment variables are process-global and the test harness is
// multi-threaded, so every scenario lives in this one sequential test.
#[test]
fn test_settings_from_env() {
    // Start from a clean slate.
    for (name, _) in env::vars() {
        if name.starts_with("TAZZINA_") {
            unsafe { env::remove_var(&name) };
        }
    }

    // Defaults suited for local development.
    let settings = Settings::from_env();
    assert!(!settings.debug);
    assert_eq!(settings.host, "127.0.0.1");
    assert_eq!(settings.port, 8000);
    assert_eq!(settings.database_url, "sqlite:cafes.db?mode=rwc");
    assert_eq!(settings.template.dir, "templates");
    assert!(!settings.template.debug);
    assert!(settings.other.is_empty());

    // Every known variable overrides its default; an unrecognized
    // TAZZINA_* variable is kept verbatim in `other`.
    unsafe {
        env::set_var("TAZZINA_DEBUG", "1");
        env::set_var("TAZZINA_HOST", "0.0.0.0");
        env::set_var("TAZZINA_PORT", "9005");
        env::set_var("TAZZINA_DATABASE_URL", "sqlite::memory:");
        env::set_var("TAZZINA_TEMPLATE_DIR", "demos/templates");
        env::set_var("TAZZINA_ROASTER", "La Marzocco");
    }
    let settings = Settings::from_env();
    assert!(settings.debug);
    assert!(settings.template.debug);
    assert_eq!(settings.host, "0.0.0.0");
    assert_eq!(settings.port, 9005);
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.template.dir, "demos/templates");
    assert_eq!(settings.other.len(), 1);
    assert_eq!(
        settings.other.get("TAZZINA_ROASTER").unwrap(),
        "La Marzocco"
    );

    // A port that does not parse falls back to the default.
    unsafe { env::set_var("TAZZINA_PORT", "ristretto") };
    assert_eq!(Settings::from_env().port, 8000);

    // Accepted flag spellings.
    unsafe { env::set_var("TAZZINA_DEBUG", "yes") };
    assert!(Settings::from_env().debug);
    unsafe { env::set_var("TAZZINA_DEBUG", "0") };
    assert!(!Settings::from_env().debug);

    for name in [
        "TAZZINA_DEBUG",
        "TAZZINA_HOST",
        "TAZZINA_PORT",
        "TAZZINA_DATABASE_URL",
        "TAZZINA_TEMPLATE_DIR",
        "TAZZINA_ROASTER",
    ] {
        unsafe { env::remove_var(name) };
    }
}
