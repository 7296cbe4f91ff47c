//! Layered configuration (spec.md §6): precedence is CLI flag > environment
//! > config file > built-in default. `Options::resolve` is a pure merge
//! function over four optional-field layers so the precedence rule is
//! exercised without touching the environment or the filesystem in tests.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub xsd: PathBuf,
    pub out: PathBuf,
    pub import_dir: PathBuf,
    pub connection: String,
    pub remote_source_dir: Option<PathBuf>,
    pub remote_poll_seconds: u64,
    pub remote_history_file: PathBuf,
    pub verbose_import: bool,
    pub audit: bool,
    pub debounce_ms: u64,
    pub ready_wait_ms: u64,
    pub no_idempotency: bool,
}

/// One layer of override: every field optional, `None` meaning "this layer
/// has no opinion". Used for the config-file and environment layers (the
/// CLI-flag layer is represented the same way via `clap`'s `Option<T>`
/// fields with no default).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionsLayer {
    pub xsd: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub import_dir: Option<PathBuf>,
    pub connection: Option<String>,
    pub remote_source_dir: Option<PathBuf>,
    pub remote_poll_seconds: Option<u64>,
    pub remote_history_file: Option<PathBuf>,
    pub verbose_import: Option<bool>,
    pub audit: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub ready_wait_ms: Option<u64>,
    pub no_idempotency: Option<bool>,
}

const DEFAULT_REMOTE_POLL_SECONDS: u64 = 30;
const DEFAULT_DEBOUNCE_MS: u64 = 200;
const DEFAULT_READY_WAIT_MS: u64 = 2000;

impl Options {
    /// Merge `flags > env > file > builtin defaults`, field by field. The
    /// `xsd` field has no built-in default: it is a configuration error
    /// (spec.md §7.1) if no layer supplies it, surfaced by the caller.
    pub fn resolve(flags: OptionsLayer, env: OptionsLayer, file: OptionsLayer, out_default: &str, import_dir_default: &str) -> Result<Options, String> {
        macro_rules! pick {
            ($field:ident) => {
                flags.$field.clone().or_else(|| env.$field.clone()).or_else(|| file.$field.clone())
            };
        }

        let xsd = pick!(xsd).ok_or_else(|| "missing required option: xsd".to_string())?;
        let out = pick!(out).unwrap_or_else(|| PathBuf::from(out_default));
        let import_dir = pick!(import_dir).unwrap_or_else(|| PathBuf::from(import_dir_default));
        let connection = pick!(connection).unwrap_or_default();
        let remote_source_dir = pick!(remote_source_dir);
        let remote_poll_seconds = pick!(remote_poll_seconds).unwrap_or(DEFAULT_REMOTE_POLL_SECONDS).max(30);
        let remote_history_file = pick!(remote_history_file).unwrap_or_else(|| out.join("remote_copied_files.txt"));
        let verbose_import = pick!(verbose_import).unwrap_or(false);
        let audit = pick!(audit).unwrap_or(false);
        let debounce_ms = pick!(debounce_ms).unwrap_or(DEFAULT_DEBOUNCE_MS);
        let ready_wait_ms = pick!(ready_wait_ms).unwrap_or(DEFAULT_READY_WAIT_MS);
        let no_idempotency = pick!(no_idempotency).unwrap_or(false);

        Ok(Options {
            xsd,
            out,
            import_dir,
            connection,
            remote_source_dir,
            remote_poll_seconds,
            remote_history_file,
            verbose_import,
            audit,
            debounce_ms,
            ready_wait_ms,
            no_idempotency,
        })
    }
}

/// Build the environment layer by reading the fallback variables named in
/// spec.md §6 ("Environment fallbacks mirror each flag").
pub fn env_layer() -> OptionsLayer {
    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
    fn var_path(name: &str) -> Option<PathBuf> {
        var(name).map(PathBuf::from)
    }
    fn var_bool(name: &str) -> Option<bool> {
        var(name).map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
    }
    fn var_u64(name: &str) -> Option<u64> {
        var(name).and_then(|v| v.parse().ok())
    }

    OptionsLayer {
        xsd: var_path("XSDREL_XSD"),
        out: var_path("XSDREL_OUT"),
        import_dir: var_path("XSDREL_IMPORT_DIR"),
        connection: var("XSDREL_CONNECTION"),
        remote_source_dir: var_path("XSDREL_REMOTE_SOURCE_DIR"),
        remote_poll_seconds: var_u64("XSDREL_REMOTE_POLL_SECONDS"),
        remote_history_file: var_path("XSDREL_REMOTE_HISTORY_FILE"),
        verbose_import: var_bool("XSDREL_VERBOSE_IMPORT"),
        audit: var_bool("XSDREL_AUDIT"),
        debounce_ms: var_u64("XSDREL_DEBOUNCE_MS"),
        ready_wait_ms: var_u64("XSDREL_READY_WAIT_MS"),
        no_idempotency: var_bool("XSDREL_NO_IDEMPOTENCY"),
    }
}

/// Load a config file layer from TOML at `path`. A missing file resolves
/// to an empty layer rather than an error — config files are optional.
pub fn file_layer(path: Option<&std::path::Path>) -> OptionsLayer {
    let Some(path) = path else { return OptionsLayer::default() };
    let Ok(text) = std::fs::read_to_string(path) else { return OptionsLayer::default() };
    toml::from_str(&text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_env_and_file() {
        let flags = OptionsLayer {
            remote_poll_seconds: Some(60),
            ..Default::default()
        };
        let env = OptionsLayer {
            remote_poll_seconds: Some(45),
            xsd: Some(PathBuf::from("env.xsd")),
            ..Default::default()
        };
        let file = OptionsLayer {
            remote_poll_seconds: Some(90),
            xsd: Some(PathBuf::from("file.xsd")),
            ..Default::default()
        };

        let resolved = Options::resolve(flags, env, file, "out", "in").unwrap();
        assert_eq!(resolved.remote_poll_seconds, 60);
        assert_eq!(resolved.xsd, PathBuf::from("env.xsd"));
    }

    #[test]
    fn missing_xsd_in_every_layer_is_an_error() {
        let result = Options::resolve(OptionsLayer::default(), OptionsLayer::default(), OptionsLayer::default(), "out", "in");
        assert!(result.is_err());
    }

    #[test]
    fn remote_poll_seconds_is_floored_at_30() {
        let flags = OptionsLayer {
            xsd: Some(PathBuf::from("a.xsd")),
            remote_poll_seconds: Some(5),
            ..Default::default()
        };
        let resolved = Options::resolve(flags, OptionsLayer::default(), OptionsLayer::default(), "out", "in").unwrap();
        assert_eq!(resolved.remote_poll_seconds, 30);
    }
}
