//! Module source parsing utilities.
//!
//! This module classifies Terraform module `source` strings into
//! structured [`ModuleSource`] values and decides which of them can be
//! looked up on the local filesystem.
//!
//! # Supported Source Types
//!
//! - **Registry**: `namespace/name/provider` or `hostname/namespace/name/provider`
//! - **Git**: `git::https://...`, `git@github.com:...`, `github.com/owner/repo`
//! - **HTTP**: `https://...` (archive downloads)
//! - **Bucket**: `s3::https://...`, `s3://bucket/key`, `gcs::https://...`
//! - **Local**: `./path`, `../path`, `/abs/path` and any other scheme-less string

use crate::types::ModuleSource;
use regex::Regex;
use std::sync::LazyLock;

/// Default Terraform registry hostname.
const DEFAULT_REGISTRY: &str = "registry.terraform.io";

static REGISTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // namespace/name/provider or hostname/namespace/name/provider
    Regex::new(r"^(?:([a-zA-Z0-9.-]+\.[a-zA-Z]+)/)?([a-zA-Z0-9_-]+)/([a-zA-Z0-9_-]+)/([a-zA-Z0-9_-]+)$")
        .expect("Invalid regex")
});

static GIT_SSH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^git@([^:]+):(.+?)(?:\.git)?(?:\?ref=([^/]+))?(?://.*)?$").expect("Invalid regex")
});

static GITHUB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?github\.com/([^/]+)/([^/?]+?)(?:\.git)?(?:\?ref=([^/]+))?(?://.*)?$")
        .expect("Invalid regex")
});

/// Forced-getter prefixes understood by Terraform (`git::`, `s3::`, ...).
const GETTER_PREFIXES: &[&str] = &["git::", "hg::", "s3::", "gcs::", "http::", "https::"];

/// Classify a module source string.
///
/// # Examples
///
/// ```rust
/// use tfdiagram::parser::parse_module_source;
/// use tfdiagram::types::ModuleSource;
///
/// assert!(matches!(parse_module_source("hashicorp/consul/aws"), ModuleSource::Registry { .. }));
/// assert!(matches!(parse_module_source("git::https://example.com/m.git"), ModuleSource::Git { .. }));
/// assert!(matches!(parse_module_source("../modules/vpc"), ModuleSource::Local { .. }));
/// ```
#[must_use]
pub fn parse_module_source(source: &str) -> ModuleSource {
    let source = source.trim();

    if is_local_path(source) {
        return ModuleSource::Local {
            path: source.to_string(),
        };
    }

    if let Some(git_source) = try_parse_git_source(source) {
        return git_source;
    }

    if let Some(bucket_source) = try_parse_bucket_source(source) {
        return bucket_source;
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        return ModuleSource::Http {
            url: source.to_string(),
        };
    }

    if let Some(registry_source) = try_parse_registry_source(source) {
        return registry_source;
    }

    if has_url_scheme(source) {
        tracing::debug!(source = %source, "Unknown module source format");
        return ModuleSource::Unknown(source.to_string());
    }

    // Anything left without a scheme is looked up relative to the referencing file
    ModuleSource::Local {
        path: source.to_string(),
    }
}

/// Check whether a source string should be looked up on the local filesystem.
///
/// Relative and absolute paths qualify, as does any string that carries no
/// URL scheme. Strings with a scheme or a forced-getter prefix never do.
#[must_use]
pub fn is_local_looking(source: &str) -> bool {
    let source = source.trim();
    is_local_path(source) || (!has_url_scheme(source) && !source.starts_with("git@"))
}

/// Check if a path is a local file path.
fn is_local_path(source: &str) -> bool {
    source.starts_with("./")
        || source.starts_with("../")
        || source.starts_with('/')
        || source.starts_with('~')
        || source == "."
        || source == ".."
        || (source.len() >= 3
            && source.as_bytes()[1] == b':'
            && matches!(source.as_bytes()[2], b'\\' | b'/')) // Windows paths
}

/// Check whether the string carries a URL scheme or getter prefix.
fn has_url_scheme(source: &str) -> bool {
    if GETTER_PREFIXES.iter().any(|prefix| source.starts_with(prefix)) {
        return true;
    }
    url::Url::parse(source).is_ok()
}

/// Try to parse a Git source.
fn try_parse_git_source(source: &str) -> Option<ModuleSource> {
    // git::https://github.com/example/module.git?ref=v1.0.0//modules/vpc
    if let Some(rest) = source.strip_prefix("git::") {
        let (url, ref_) = match rest.split_once("?ref=") {
            Some((url, tail)) => {
                let ref_ = tail.split("//").next().unwrap_or(tail);
                (url, Some(ref_.to_string()))
            }
            None => (rest, None),
        };
        return Some(ModuleSource::Git {
            url: url.to_string(),
            ref_,
        });
    }

    if let Some(caps) = GIT_SSH_PATTERN.captures(source) {
        let host = caps.get(1)?.as_str();
        let path = caps.get(2)?.as_str();
        let ref_ = caps.get(3).map(|m| m.as_str().to_string());
        return Some(ModuleSource::Git {
            url: format!("ssh://git@{host}/{path}"),
            ref_,
        });
    }

    if let Some(caps) = GITHUB_PATTERN.captures(source) {
        let owner = caps.get(1)?.as_str();
        let repo = caps.get(2)?.as_str();
        let ref_ = caps.get(3).map(|m| m.as_str().to_string());
        return Some(ModuleSource::Git {
            url: format!("https://github.com/{owner}/{repo}.git"),
            ref_,
        });
    }

    None
}

/// Try to parse an S3 or GCS source.
fn try_parse_bucket_source(source: &str) -> Option<ModuleSource> {
    let scheme = if source.starts_with("s3::") || source.starts_with("s3://") {
        "s3"
    } else if source.starts_with("gcs::") || source.starts_with("gs://") {
        "gcs"
    } else {
        return None;
    };

    Some(ModuleSource::Bucket {
        scheme: scheme.to_string(),
        location: source.to_string(),
    })
}

/// Try to parse a Terraform Registry source.
fn try_parse_registry_source(source: &str) -> Option<ModuleSource> {
    let caps = REGISTRY_PATTERN.captures(source)?;
    let hostname = caps
        .get(1)
        .map_or_else(|| DEFAULT_REGISTRY.to_string(), |m| m.as_str().to_string());

    Some(ModuleSource::Registry {
        hostname,
        namespace: caps.get(2)?.as_str().to_string(),
        name: caps.get(3)?.as_str().to_string(),
        provider: caps.get(4)?.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_registry_source() {
        match parse_module_source("hashicorp/consul/aws") {
            ModuleSource::Registry {
                hostname,
                namespace,
                name,
                provider,
            } => {
                assert_eq!(hostname, "registry.terraform.io");
                assert_eq!(namespace, "hashicorp");
                assert_eq!(name, "consul");
                assert_eq!(provider, "aws");
            }
            other => panic!("Expected Registry source, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_registry_with_hostname() {
        match parse_module_source("app.terraform.io/my-org/vpc/aws") {
            ModuleSource::Registry {
                hostname, namespace, ..
            } => {
                assert_eq!(hostname, "app.terraform.io");
                assert_eq!(namespace, "my-org");
            }
            other => panic!("Expected Registry source, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_git_with_ref() {
        match parse_module_source("git::https://github.com/example/module.git?ref=v1.0.0") {
            ModuleSource::Git { url, ref_ } => {
                assert_eq!(url, "https://github.com/example/module.git");
                assert_eq!(ref_.as_deref(), Some("v1.0.0"));
            }
            other => panic!("Expected Git source, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_git_ssh_source() {
        match parse_module_source("git@github.com:example/module.git") {
            ModuleSource::Git { url, .. } => assert!(url.starts_with("ssh://git@github.com/")),
            other => panic!("Expected Git source, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bucket_sources() {
        assert!(matches!(
            parse_module_source("s3://my-bucket/modules/vpc.zip"),
            ModuleSource::Bucket { ref scheme, .. } if scheme == "s3"
        ));
        assert!(matches!(
            parse_module_source("gcs::https://www.googleapis.com/storage/v1/modules/vpc.zip"),
            ModuleSource::Bucket { ref scheme, .. } if scheme == "gcs"
        ));
    }

    #[test]
    fn test_scheme_less_name_is_local() {
        assert!(matches!(
            parse_module_source("network"),
            ModuleSource::Local { ref path } if path == "network"
        ));
    }

    #[test_case("./modules/vpc", true ; "dot relative")]
    #[test_case("../shared", true ; "parent relative")]
    #[test_case("/opt/modules/vpc", true ; "absolute")]
    #[test_case("network", true ; "plain name")]
    #[test_case("hashicorp/consul/aws", true ; "registry looking string")]
    #[test_case("git::https://example.com/m.git", false ; "forced git getter")]
    #[test_case("https://example.com/module.zip", false ; "http archive")]
    #[test_case("s3://bucket/key", false ; "s3 url")]
    #[test_case("git@github.com:org/repo.git", false ; "scp style git")]
    fn test_is_local_looking(source: &str, expected: bool) {
        assert_eq!(is_local_looking(source), expected);
    }
}
