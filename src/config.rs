use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Default OAuth2 token host.
pub(crate) const DEFAULT_AUTH_URL: &str = "https://login.gardin.ag";
/// Default query API host.
pub(crate) const DEFAULT_API_URL: &str = "https://api.gardin.ag";

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the OAuth2 token host, typically `https://login.gardin.ag`.
    pub auth_url: String,
    /// Base URL of the query API, typically `https://api.gardin.ag`.
    pub api_url: String,
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

#[derive(Debug, Default)]
struct RcConfig {
    auth_url: Option<String>,
    api_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(
    auth_url: Option<String>,
    api_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<ClientConfig> {
    let mut auth_url = auth_url.or_else(|| std::env::var("GARDIN_AUTH_URL").ok());
    let mut api_url = api_url.or_else(|| std::env::var("GARDIN_API_URL").ok());
    let mut client_id = client_id.or_else(|| std::env::var("GARDIN_CLIENT_ID").ok());
    let mut client_secret = client_secret.or_else(|| std::env::var("GARDIN_CLIENT_SECRET").ok());

    let rc_candidates = rc_candidates();
    let mut file_verify: Option<bool> = None;

    if client_id.is_none() || client_secret.is_none() || auth_url.is_none() || api_url.is_none() {
        for rc_path in &rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;

                if auth_url.is_none() {
                    auth_url = cfg.auth_url;
                }
                if api_url.is_none() {
                    api_url = cfg.api_url;
                }
                if client_id.is_none() {
                    client_id = cfg.client_id;
                }
                if client_secret.is_none() {
                    client_secret = cfg.client_secret;
                }
                file_verify = cfg.verify;
                break;
            }
        }
    }

    let client_id = match client_id {
        Some(v) if !v.is_empty() => v,
        _ => bail!(
            "Missing configuration: client_id (set GARDIN_CLIENT_ID or put `client_id:` in one of: {})",
            describe_candidates(&rc_candidates)
        ),
    };

    let client_secret = match client_secret {
        Some(v) if !v.is_empty() => v,
        _ => bail!(
            "Missing configuration: client_secret (set GARDIN_CLIENT_SECRET or put `client_secret:` in one of: {})",
            describe_candidates(&rc_candidates)
        ),
    };

    Ok(ClientConfig {
        auth_url: auth_url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
        api_url: api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        client_id,
        client_secret,
        verify: file_verify.unwrap_or(true),
    })
}

fn describe_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return ".gardinrc".to_string();
    }
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    // Support formatting where the key is on one line and the value on the next.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key {
            // Continuation value line (no colon)
            if !line.contains(':') {
                let v = strip_quotes(line).to_string();
                assign(&mut cfg, pk, v);
                pending_key = None;
                continue;
            }
            pending_key = None;
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            match k {
                "auth_url" | "api_url" | "client_id" | "client_secret" => {
                    if !v.is_empty() {
                        assign(&mut cfg, k, v.to_string());
                    } else {
                        pending_key = Some(match k {
                            "auth_url" => "auth_url",
                            "api_url" => "api_url",
                            "client_id" => "client_id",
                            _ => "client_secret",
                        });
                    }
                }
                "verify" => {
                    if !v.is_empty() {
                        cfg.verify = Some(v != "0");
                    }
                }
                _ => {}
            }
        }
    }

    Ok(cfg)
}

fn assign(cfg: &mut RcConfig, key: &str, value: String) {
    match key {
        "auth_url" => cfg.auth_url = Some(value),
        "api_url" => cfg.api_url = Some(value),
        "client_id" => cfg.client_id = Some(value),
        "client_secret" => cfg.client_secret = Some(value),
        _ => {}
    }
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
    // Search order:
    // 1) GARDIN_RC (explicit)
    // 2) ./.gardinrc (current working directory)
    // 3) ~/.gardinrc
    if let Ok(p) = std::env::var("GARDIN_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".gardinrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".gardinrc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_rc(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn read_rc_parses_key_value_lines() {
        let f = write_rc(
            "# credentials\n\
             client_id: my-client\n\
             client_secret: \"s3cret\"\n\
             api_url: https://api.example.test\n\
             verify: 0\n",
        );
        let cfg = read_rc(f.path()).unwrap();
        assert_eq!(cfg.client_id.as_deref(), Some("my-client"));
        assert_eq!(cfg.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.api_url.as_deref(), Some("https://api.example.test"));
        assert_eq!(cfg.auth_url, None);
        assert_eq!(cfg.verify, Some(false));
    }

    #[test]
    fn read_rc_supports_continuation_values() {
        let f = write_rc("client_secret:\n  s3cret\nclient_id: my-client\n");
        let cfg = read_rc(f.path()).unwrap();
        assert_eq!(cfg.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.client_id.as_deref(), Some("my-client"));
    }

    #[test]
    fn read_rc_ignores_unknown_keys() {
        let f = write_rc("region: eu-west\nclient_id: my-client\n");
        let cfg = read_rc(f.path()).unwrap();
        assert_eq!(cfg.client_id.as_deref(), Some("my-client"));
    }
}
