use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::client::ClientConfig;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";
pub(crate) const DEFAULT_CATALOG_URL: &str = "https://api.census.gov/data.json";

#[derive(Debug, Default, PartialEq, Eq)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| std::env::var("CENSUS_API_URL").ok());
    let mut key = key.or_else(|| std::env::var("CENSUS_API_KEY").ok());

    let rc_candidates = rc_candidates();
    let mut file_verify: Option<bool> = None;

    if url.is_none() || key.is_none() || verify.is_none() {
        for rc_path in &rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;

                if url.is_none() {
                    url = cfg.url;
                }
                if key.is_none() {
                    key = cfg.key;
                }
                file_verify = cfg.verify;
                break;
            }
        }
    }

    let key = match key {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => {
            if !rc_candidates.is_empty() {
                bail!(
                    "Missing configuration: key (set CENSUS_API_KEY or put `key:` in one of: {})",
                    rc_candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            bail!("Missing configuration: key (set CENSUS_API_KEY or create .censusapirc)");
        }
    };

    let verify = verify.or(file_verify).unwrap_or(true);

    Ok(ClientConfig {
        url: url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        catalog_url: DEFAULT_CATALOG_URL.to_string(),
        key,
        verify,
        progress: true,
    })
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // `key:` may sit alone on one line with the token on the next.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            // Continuation value line. URLs contain a colon, so only
            // `name:` prefixes end the continuation.
            if !starts_with_setting(line) {
                let v = strip_quotes(line);
                match pk {
                    "url" => cfg.url = Some(v.to_string()),
                    "key" => cfg.key = Some(v.to_string()),
                    _ => {}
                }
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            match k {
                "url" if v.is_empty() => pending_key = Some("url"),
                "key" if v.is_empty() => pending_key = Some("key"),
                "url" => cfg.url = Some(v.to_string()),
                "key" => cfg.key = Some(v.to_string()),
                "verify" => {
                    if !v.is_empty() {
                        cfg.verify = Some(v != "0" && !v.eq_ignore_ascii_case("false"));
                    }
                }
                _ => {}
            }
        }
    }

    cfg
}

fn starts_with_setting(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(k, _)| matches!(k.trim(), "url" | "key" | "verify"))
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) CENSUS_API_RC (explicit)
    // 2) ./.censusapirc
    // 3) ~/.censusapirc
    if let Ok(p) = std::env::var("CENSUS_API_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".censusapirc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".censusapirc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_inline_values() {
        let cfg = parse_rc(
            "# census settings\nurl: https://api.census.gov/data\nkey: 'abc123'\nverify: 0\n",
        );
        assert_eq!(
            cfg,
            RcConfig {
                url: Some("https://api.census.gov/data".to_string()),
                key: Some("abc123".to_string()),
                verify: Some(false),
            }
        );
    }

    #[test]
    fn test_parse_value_on_next_line() {
        let cfg = parse_rc("key:\n  \"tok-en\"\nurl:\nhttp://localhost:8080/data\n");
        assert_eq!(cfg.key.as_deref(), Some("tok-en"));
        assert_eq!(cfg.url.as_deref(), Some("http://localhost:8080/data"));
        assert_eq!(cfg.verify, None);
    }

    #[test]
    fn test_pending_key_dropped_by_next_setting() {
        let cfg = parse_rc("key:\nverify: 1\n");
        assert_eq!(cfg.key, None);
        assert_eq!(cfg.verify, Some(true));
    }

    #[test]
    fn test_read_rc_from_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(b"key: from-file\n")
            .expect("Failed to write to temp file");
        let cfg = read_rc(file.path()).unwrap();
        assert_eq!(cfg.key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_explicit_arguments_win() {
        let cfg = load_config(
            Some("http://mirror/data".into()),
            Some(" explicit ".into()),
            Some(false),
        )
        .unwrap();
        assert_eq!(cfg.url, "http://mirror/data");
        assert_eq!(cfg.key, "explicit");
        assert!(!cfg.verify);
        assert_eq!(cfg.catalog_url, DEFAULT_CATALOG_URL);
    }
}
