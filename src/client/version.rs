//! Version gate
//!
//! Resolves the Kibana version once per client and exposes the predicates that
//! select version-dependent wire formats and endpoints. An unknown version
//! (managed deployments that do not report one) is treated as "latest".

use super::error::{KibanaError, Result};
use super::kibana::KibanaClient;
use regex::Regex;
use semver::Version;
use serde::Deserialize;

/// Version details reported by `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub build_snapshot: bool,
    #[serde(default)]
    pub build_flavor: String,
}

impl VersionInfo {
    /// Build version info from a version string such as `8.15.3` or `9.1.0-SNAPSHOT`.
    pub fn from_number(number: impl Into<String>) -> Self {
        let number = number.into();
        let build_snapshot = number.ends_with("-SNAPSHOT");
        Self {
            number,
            build_snapshot,
            build_flavor: String::new(),
        }
    }

    /// Parsed semantic version, `None` when the server reported none.
    pub fn semver(&self) -> Result<Option<Version>> {
        if self.number.is_empty() {
            return Ok(None);
        }
        Version::parse(&self.number).map(Some).map_err(|e| {
            KibanaError::Version(format!(
                "failed to parse Kibana version ({}): {}",
                self.number, e
            ))
        })
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    version: VersionInfo,
}

fn release_of(v: &Version) -> (u64, u64, u64) {
    (v.major, v.minor, v.patch)
}

/// Compares ignoring pre-release tags, so `8.11.0-SNAPSHOT` counts as `8.11.0`.
fn at_least(version: Option<&Version>, major: u64, minor: u64, patch: u64) -> bool {
    match version {
        Some(v) => release_of(v) >= (major, minor, patch),
        None => true,
    }
}

/// Simplified (map-keyed) package policies are accepted since 7.16.0.
pub fn supports_simplified_package_policy_api(version: Option<&Version>) -> bool {
    at_least(version, 7, 16, 0)
}

/// The saved objects export API replaces the dashboards export API since 8.11.0.
pub fn uses_saved_objects_export(version: Option<&Version>) -> bool {
    at_least(version, 8, 11, 0)
}

/// EPM package URLs are `name-version` before 8.0.0 and `name/version` after.
pub fn uses_legacy_epm_urls(version: Option<&Version>) -> bool {
    !at_least(version, 8, 0, 0)
}

/// Extracts the version from the `<kbn-injected-metadata data="...">` tag of the login page.
pub fn version_from_login_html(html: &str) -> Result<VersionInfo> {
    let re = Regex::new(r#"<kbn-injected-metadata\s+data="([^"]*)""#)
        .map_err(|e| KibanaError::Version(e.to_string()))?;
    let escaped = re
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            KibanaError::Version("kbn-injected-metadata tag not found in login page".to_string())
        })?;

    let metadata = html_unescape(escaped)?;

    #[derive(Deserialize)]
    struct InjectedMetadata {
        version: String,
    }
    let parsed: InjectedMetadata = serde_json::from_str(&metadata)
        .map_err(|e| KibanaError::decode("login page metadata", metadata.as_bytes(), e))?;

    Ok(VersionInfo::from_number(parsed.version))
}

/// Decodes numeric character references and the named entities an HTML
/// attribute escaper emits, in one pass. Unknown entities are kept verbatim.
fn html_unescape(s: &str) -> Result<String> {
    let re = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")
        .map_err(|e| KibanaError::Version(e.to_string()))?;
    let decoded = re.replace_all(s, |caps: &regex::Captures<'_>| {
        let entity = &caps[1];
        let decoded = match entity.strip_prefix('#') {
            Some(num) => {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                code.and_then(char::from_u32)
            }
            None => match entity {
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                _ => None,
            },
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    });
    Ok(decoded.into_owned())
}

impl KibanaClient {
    /// Version info, resolved on first use and cached for the life of the client.
    ///
    /// Concurrent first callers share a single probe.
    pub async fn version_info(&self) -> Result<&VersionInfo> {
        self.version_cell()
            .get_or_try_init(|| self.request_status())
            .await
    }

    /// Returns the raw version string and whether it is a snapshot build.
    pub async fn version(&self) -> Result<(String, bool)> {
        let info = self.version_info().await?;
        Ok((info.number.clone(), info.build_snapshot))
    }

    /// Parsed version, `None` for managed deployments reporting no version.
    pub async fn semver(&self) -> Result<Option<Version>> {
        self.version_info().await?.semver()
    }

    async fn request_status(&self) -> Result<VersionInfo> {
        let path = "/api/status";
        let body = self.get_ok("get Kibana status", path, &[]).await?;
        let status: StatusResponse = super::decode_json("get Kibana status", &body)?;
        // Validate now so a bad version string fails at resolution, not at first use.
        status.version.semver()?;
        log::debug!(
            "Kibana version {} (snapshot: {})",
            status.version.number,
            status.version.build_snapshot
        );
        Ok(status.version)
    }

    /// Reads the version from the login page, for deployments where the status API
    /// is not reachable with the configured credentials.
    pub async fn version_from_login_page(&self) -> Result<VersionInfo> {
        let body = self.get_ok("get Kibana login page", "/login", &[]).await?;
        version_from_login_html(&String::from_utf8_lossy(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_supports_simplified_package_policy_api() {
        let cases = [
            ("7.14.1", false),
            ("7.15.2", false),
            ("7.16.0", true),
            ("7.17.0", true),
            ("8.0.0", true),
            ("8.15.3", true),
        ];
        for (version, want) in cases {
            assert_eq!(
                supports_simplified_package_policy_api(Some(&v(version))),
                want,
                "version {}",
                version
            );
        }
    }

    #[test]
    fn test_unknown_version_assumes_latest() {
        assert!(supports_simplified_package_policy_api(None));
        assert!(uses_saved_objects_export(None));
        assert!(!uses_legacy_epm_urls(None));
    }

    #[test]
    fn test_snapshot_gates_like_release() {
        assert!(supports_simplified_package_policy_api(Some(&v("7.16.0-SNAPSHOT"))));
        assert!(uses_saved_objects_export(Some(&v("8.11.0-SNAPSHOT"))));
        assert!(!uses_saved_objects_export(Some(&v("8.10.4"))));
    }

    #[test]
    fn test_legacy_epm_urls() {
        assert!(uses_legacy_epm_urls(Some(&v("7.17.9"))));
        assert!(!uses_legacy_epm_urls(Some(&v("8.0.0"))));
    }

    #[test]
    fn test_version_info_semver() {
        let info = VersionInfo::from_number("8.15.3-SNAPSHOT");
        assert!(info.build_snapshot);
        assert_eq!(info.semver().unwrap().unwrap().minor, 15);

        assert!(VersionInfo::default().semver().unwrap().is_none());
        assert!(VersionInfo::from_number("not-a-version").semver().is_err());
    }

    #[test]
    fn test_version_from_login_html() {
        let html = r#"<html><head><kbn-injected-metadata data="{&quot;version&quot;:&quot;8.12.1&quot;,&quot;buildNumber&quot;:1}"></kbn-injected-metadata></head></html>"#;
        let info = version_from_login_html(html).unwrap();
        assert_eq!(info.number, "8.12.1");
        assert!(!info.build_snapshot);
    }

    #[test]
    fn test_html_unescape_numeric_references() {
        assert_eq!(html_unescape("a&#47;b&#x2F;c&#X2f;d").unwrap(), "a/b/c/d");
        assert_eq!(html_unescape("&#34;v&#39;&apos;").unwrap(), "\"v''");
        // Decoded once, so an escaped entity stays an entity.
        assert_eq!(html_unescape("&amp;lt;").unwrap(), "&lt;");
        let unknown = "&nbsp;&#xZZ;&#1114112;";
        assert_eq!(html_unescape(unknown).unwrap(), unknown);
    }

    #[test]
    fn test_version_from_login_html_with_numeric_references() {
        let html = r#"<kbn-injected-metadata data="{&#34;version&#34;:&#34;7.17.9&#34;,&#34;basePath&#34;:&#34;&#47;kbn&#34;}">"#;
        let info = version_from_login_html(html).unwrap();
        assert_eq!(info.number, "7.17.9");
    }

    #[test]
    fn test_version_from_login_html_missing_tag() {
        let err = version_from_login_html("<html></html>").unwrap_err();
        assert!(matches!(err, KibanaError::Version(_)));
    }
}
