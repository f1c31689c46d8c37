//! Configuration validation.
//!
//! Checks a config file against the known schema, flags unknown or
//! misspelled fields, and reports settings that will not work at runtime.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::{
    env_subst::substitute_env,
    loader::{Format, find_config_file},
    schema::RelayConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "semantic", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.telegram.main.token"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Expected shape of the configuration tree.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys whose values share a shape.
    Map(Box<KnownKeys>),
    Leaf,
}

const TELEGRAM_ACCOUNT_KEYS: &[&str] = &["token", "chats", "media_base_url", "no_web_preview"];

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    let telegram_account = Struct(
        TELEGRAM_ACCOUNT_KEYS
            .iter()
            .map(|&key| (key, Leaf))
            .collect(),
    );

    Struct(HashMap::from([
        (
            "bridge",
            Struct(HashMap::from([
                ("name", Leaf),
                ("history", Leaf),
                ("greeting", Leaf),
            ])),
        ),
        (
            "channels",
            Struct(HashMap::from([("telegram", Map(Box::new(telegram_account)))])),
        ),
        ("http", Struct(HashMap::from([("listen", Leaf)]))),
        (
            "metrics",
            Struct(HashMap::from([("enabled", Leaf), ("listen", Leaf)])),
        ),
    ]))
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

/// Validate the config file at `path`, or the discovered one when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path.map(Path::to_path_buf).or_else(find_config_file) else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let diagnostics = match Format::from_path(&config_path) {
        Err(e) => vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
        Ok(format) => match std::fs::read_to_string(&config_path) {
            Ok(raw) => validate_str(&substitute_env(&raw), format).diagnostics,
            Err(e) => vec![Diagnostic::new(
                Severity::Error,
                "file-ref",
                "",
                format!("failed to read config file: {e}"),
            )],
        },
    };

    ValidationResult {
        diagnostics,
        config_path: Some(config_path),
    }
}

/// Validate a config document without touching the file system.
#[must_use]
pub fn validate_str(raw: &str, format: Format) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match format.parse_value(raw) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", e.to_string()));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<RelayConfig>(value) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let serde_json::Value::Object(table) = value else {
        return;
    };
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match schema {
        KnownKeys::Struct(fields) => {
            let known: Vec<&str> = fields.keys().copied().collect();
            for (key, child) in table {
                let path = join(key);
                match fields.get(key.as_str()) {
                    Some(child_schema) => {
                        check_unknown_fields(child, child_schema, &path, diagnostics);
                    },
                    None => {
                        let message = match suggest(key, &known, 3) {
                            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                            None => "unknown field".to_string(),
                        };
                        diagnostics.push(Diagnostic::new(
                            Severity::Error,
                            "unknown-field",
                            path,
                            message,
                        ));
                    },
                }
            }
        },
        KnownKeys::Map(value_schema) => {
            for (key, child) in table {
                check_unknown_fields(child, value_schema, &join(key), diagnostics);
            }
        },
        KnownKeys::Leaf => {},
    }
}

/// Checks on a config that deserialized cleanly.
fn check_semantics(config: &RelayConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.bridge.history == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "semantic",
            "bridge.history",
            "history of 0 is raised to 1; replies and edits will rarely correlate",
        ));
    }
    if config.bridge.name.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "semantic",
            "bridge.name",
            "bridge name must not be empty",
        ));
    }

    let mut chats = 0;
    for (account, value) in &config.channels.telegram {
        let path = format!("channels.telegram.{account}");
        let token = value.get("token").and_then(|t| t.as_str()).unwrap_or("");
        if token.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "semantic",
                format!("{path}.token"),
                "bot token is required",
            ));
        } else if token.starts_with("${") {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "semantic",
                format!("{path}.token"),
                format!("environment variable in {token} is not set"),
            ));
        }
        let joined = value
            .get("chats")
            .and_then(|c| c.as_array())
            .map_or(0, Vec::len);
        if joined == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "semantic",
                format!("{path}.chats"),
                "account joins no chats",
            ));
        }
        chats += joined;

        let media_base_url = value.get("media_base_url").and_then(|u| u.as_str());
        if media_base_url.is_some_and(|u| !u.is_empty()) && config.http.listen.is_none() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "semantic",
                format!("{path}.media_base_url"),
                "media links are only served when http.listen is set",
            ));
        }
    }
    if chats < 2 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "semantic",
            "channels",
            format!("{chats} chat(s) configured; relaying needs at least 2"),
        ));
    }

    check_listen("http.listen", config.http.listen.as_deref(), diagnostics);
    check_listen("metrics.listen", config.metrics.listen.as_deref(), diagnostics);
    if config.metrics.enabled && config.metrics.listen.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "semantic",
            "metrics",
            "metrics enabled without a listen address; nothing will be exported",
        ));
    }
}

fn check_listen(path: &str, listen: Option<&str>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(listen) = listen
        && listen.parse::<SocketAddr>().is_err()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "semantic",
            path,
            format!("\"{listen}\" is not a host:port socket address"),
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    const GOOD: &str = r#"
        [bridge]
        name = "hub"

        [channels.telegram.main]
        token = "123:abc"
        chats = ["-100", "-200"]
    "#;

    fn find<'a>(result: &'a ValidationResult, path: &str) -> Option<&'a Diagnostic> {
        result.diagnostics.iter().find(|d| d.path == path)
    }

    #[rstest]
    #[case("server", "sever", 1)]
    #[case("", "abc", 3)]
    #[case("abc", "", 3)]
    #[case("history", "history", 0)]
    #[case("chats", "chat", 1)]
    fn levenshtein_distances(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = validate_str(GOOD, Format::Toml);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error_stops_validation() {
        let result = validate_str("[bridge", Format::Toml);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
        assert!(result.has_errors());
    }

    #[test]
    fn unknown_fields_get_suggestions() {
        let raw = format!("{GOOD}\n[metrics]\nlisten = \"127.0.0.1:9000\"\nenabeld = true\n");
        let result = validate_str(&raw, Format::Toml);
        let diag = find(&result, "metrics.enabeld").unwrap();
        assert_eq!(diag.category, "unknown-field");
        assert!(diag.message.contains("did you mean \"enabled\""));
    }

    #[test]
    fn unknown_account_keys_are_flagged() {
        let raw = r#"{"channels": {"telegram": {"main": {"token": "t", "chats": ["1", "2"], "chat": "3"}}}}"#;
        let result = validate_str(raw, Format::Json);
        let diag = find(&result, "channels.telegram.main.chat").unwrap();
        assert!(diag.message.contains("\"chats\""));
    }

    #[test]
    fn type_errors_are_reported() {
        let result = validate_str("[bridge]\nhistory = \"lots\"\n", Format::Toml);
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn missing_token_and_chats() {
        let raw = "channels:\n  telegram:\n    main:\n      token: \"${CHATRELAY_TEST_UNSET_TOKEN}\"\n";
        let result = validate_str(&substitute_env(raw), Format::Yaml);
        assert_eq!(
            find(&result, "channels.telegram.main.token").unwrap().severity,
            Severity::Error
        );
        assert_eq!(
            find(&result, "channels.telegram.main.chats").unwrap().severity,
            Severity::Warning
        );
        assert!(find(&result, "channels").is_some());
    }

    #[test]
    fn bad_listen_address() {
        let raw = format!("{GOOD}\n[metrics]\nenabled = true\nlisten = \"localhost\"\n");
        let result = validate_str(&raw, Format::Toml);
        assert!(result.has_errors());
        assert!(find(&result, "metrics.listen").is_some());
    }

    #[test]
    fn media_links_need_the_http_server() {
        let raw = r#"
            [channels.telegram.main]
            token = "123:abc"
            chats = ["-100", "-200"]
            media_base_url = "https://relay.example/telegram/main/media"
        "#;
        let result = validate_str(raw, Format::Toml);
        let diag = find(&result, "channels.telegram.main.media_base_url").unwrap();
        assert_eq!(diag.severity, Severity::Warning);

        let served = format!("{raw}\n[http]\nlisten = \"0.0.0.0:8888\"\n");
        let result = validate_str(&served, Format::Toml);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn bad_http_listen_address() {
        let raw = format!("{GOOD}\n[http]\nlisten = \"relay:http\"\n");
        let result = validate_str(&raw, Format::Toml);
        assert_eq!(find(&result, "http.listen").unwrap().severity, Severity::Error);
    }

    #[test]
    fn validates_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatrelay.toml");
        std::fs::write(&path, GOOD).unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(result.count(Severity::Error), 0);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate(Some(&dir.path().join("missing.toml")));
        assert!(result.has_errors());
    }
}
