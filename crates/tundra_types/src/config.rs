//! The main configuration model.

use serde::{Deserialize, Serialize};

use crate::evr::Evr;

/// Parse a config boolean: `1` or `true` (case-insensitive) are true,
/// everything else is false.
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// A `name=EVR` floor from `minversions.d/*.conf` or the `minversions`
/// config key. Solvables of `name` below `evr` are never considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPin {
    /// Package name the pin applies to.
    pub name: String,
    /// Minimum acceptable EVR.
    pub evr: Evr,
}

impl VersionPin {
    /// Parse a `name=EVR` line. Returns `None` for blank or comment lines.
    pub fn parse_line(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let Some((name, evr)) = line.split_once('=') else {
            return Some(Err(line.to_string()));
        };
        match Evr::parse(evr.trim()) {
            Ok(evr) => Some(Ok(VersionPin {
                name: name.trim().to_string(),
                evr,
            })),
            Err(_) => Some(Err(line.to_string())),
        }
    }
}

/// Parsed `[main]` section of the configuration file plus the drop-in
/// policy directories resolved relative to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Global default for repo-level `gpgcheck`.
    pub gpgcheck: bool,
    /// Number of concurrently installed versions of install-only packages.
    pub installonly_limit: u32,
    /// Erase no-longer-needed dependencies together with explicit removals.
    pub clean_requirements_on_remove: bool,
    /// Keep downloaded packages after a successful transaction.
    pub keepcache: bool,
    /// Directory holding `*.repo` files.
    pub repodir: String,
    /// Root of the metadata/package cache tree.
    pub cachedir: String,
    /// Directory holding persistent state, notably the history database.
    pub persistdir: String,
    /// Provides-names queried against the rpm database to determine
    /// `$releasever`, tried in order.
    pub distroverpkg: Vec<String>,
    /// Names and globs excluded from every resolve.
    pub excludepkgs: Vec<String>,
    /// Inline `name=EVR` minimum-version pins.
    pub minversions: Vec<VersionPin>,
    /// Cap for RLIMIT_NOFILE raised before the real transaction.
    pub openmax: u64,
    /// `check-update` exits 100 when updates exist, matching dnf.
    pub dnf_check_update_compat: bool,
    /// distro-sync reinstalls packages whose pristine copy changed.
    pub distrosync_reinstall_changed: bool,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Proxy user.
    pub proxy_username: Option<String>,
    /// Proxy password.
    pub proxy_password: Option<String>,
    /// Master switch for the plugin event bus.
    pub plugins: bool,
    /// Plugin search path.
    pub pluginpath: String,
    /// Plugin configuration directory.
    pub pluginconfpath: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpgcheck: false,
            installonly_limit: 1,
            clean_requirements_on_remove: false,
            keepcache: false,
            repodir: "/etc/yum.repos.d".to_string(),
            cachedir: "/var/cache/tdnf".to_string(),
            persistdir: "/var/lib/tdnf".to_string(),
            distroverpkg: vec![
                "system-release(releasever)".to_string(),
                "system-release".to_string(),
                "redhat-release".to_string(),
            ],
            excludepkgs: Vec::new(),
            minversions: Vec::new(),
            openmax: 1024,
            dnf_check_update_compat: false,
            distrosync_reinstall_changed: false,
            proxy: None,
            proxy_username: None,
            proxy_password: None,
            plugins: false,
            pluginpath: "/usr/lib/tdnf-plugins".to_string(),
            pluginconfpath: "/etc/tdnf/pluginconf.d".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case(" True ", true)]
    #[case("0", false)]
    #[case("false", false)]
    #[case("yes", false)]
    #[case("", false)]
    fn booleans(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(parse_bool(input), expected);
    }

    #[test]
    fn version_pin_lines() {
        assert!(VersionPin::parse_line("").is_none());
        assert!(VersionPin::parse_line("# comment").is_none());
        let pin = VersionPin::parse_line("openssl=1.1.1k-5.ph4")
            .unwrap()
            .unwrap();
        assert_eq!(pin.name, "openssl");
        assert_eq!(pin.evr, Evr::new(0, "1.1.1k", "5.ph4"));
        assert!(VersionPin::parse_line("garbage-line").unwrap().is_err());
    }
}
