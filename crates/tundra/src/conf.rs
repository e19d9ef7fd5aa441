//! Main configuration loading.

use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use tracing::{debug, warn};

use tundra_types::{parse_bool, Config, VersionPin};

use crate::error::{Error, Result};

/// Default location of the main configuration file.
pub const DEFAULT_CONF_FILE: &str = "/etc/tdnf/tdnf.conf";

const MAIN_SECTION: &str = "main";

/// The main configuration plus the drop-in policy lists resolved from the
/// directories next to it.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Parsed `[main]` section over defaults.
    pub config: Config,
    /// Names from `locks.d/*.conf`.
    pub locks: Vec<String>,
    /// Names from `protected.d/*.conf`.
    pub protected: Vec<String>,
}

/// Load the main config file. A missing file yields the defaults, like
/// the C implementation; an unreadable or unparsable one is an error.
pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    let mut config = Config::default();

    if path.exists() {
        let mut ini = Ini::new_cs();
        ini.load(path)
            .map_err(|_| Error::ConfFileLoad(path.display().to_string()))?;

        let get = |key: &str| ini.get(MAIN_SECTION, key);
        let get_bool =
            |key: &str, current: bool| get(key).map(|v| parse_bool(&v)).unwrap_or(current);

        config.gpgcheck = get_bool("gpgcheck", config.gpgcheck);
        config.clean_requirements_on_remove = get_bool(
            "clean_requirements_on_remove",
            config.clean_requirements_on_remove,
        );
        config.keepcache = get_bool("keepcache", config.keepcache);
        config.dnf_check_update_compat =
            get_bool("dnf_check_update_compat", config.dnf_check_update_compat);
        config.distrosync_reinstall_changed = get_bool(
            "distrosync_reinstall_changed",
            config.distrosync_reinstall_changed,
        );
        config.plugins = get_bool("plugins", config.plugins);

        if let Some(value) = get("installonly_limit") {
            match value.trim().parse::<u32>() {
                Ok(limit) if limit >= 2 => config.installonly_limit = limit,
                Ok(1) => config.installonly_limit = 1,
                _ => warn!("ignoring invalid installonly_limit {value:?}"),
            }
        }
        if let Some(value) = get("openmax") {
            match value.trim().parse::<u64>() {
                Ok(openmax) => config.openmax = openmax,
                Err(_) => warn!("ignoring invalid openmax {value:?}"),
            }
        }

        if let Some(value) = get("repodir") {
            config.repodir = value;
        }
        if let Some(value) = get("cachedir") {
            config.cachedir = value;
        }
        if let Some(value) = get("persistdir") {
            config.persistdir = value;
        }
        if let Some(value) = get("distroverpkg") {
            config.distroverpkg = split_list(&value);
        }
        if let Some(value) = get("excludepkgs") {
            config.excludepkgs = split_list(&value);
        }
        if let Some(value) = get("minversions") {
            for entry in split_list(&value) {
                match VersionPin::parse_line(&entry) {
                    Some(Ok(pin)) => config.minversions.push(pin),
                    Some(Err(bad)) => warn!("ignoring invalid minversions entry {bad:?}"),
                    None => {}
                }
            }
        }
        config.proxy = get("proxy");
        config.proxy_username = get("proxy_username");
        config.proxy_password = get("proxy_password");
        if let Some(value) = get("pluginpath") {
            config.pluginpath = value;
        }
        if let Some(value) = get("pluginconfpath") {
            config.pluginconfpath = value;
        }
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
    }

    let conf_dir = path.parent().unwrap_or(Path::new("/"));
    config
        .minversions
        .extend(load_minversion_dir(&conf_dir.join("minversions.d"))?);

    Ok(LoadedConfig {
        locks: load_name_list_dir(&conf_dir.join("locks.d"))?,
        protected: load_name_list_dir(&conf_dir.join("protected.d"))?,
        config,
    })
}

/// `minversions.d/*.conf`: one `name=EVR` per line.
fn load_minversion_dir(dir: &Path) -> Result<Vec<VersionPin>> {
    let mut pins = Vec::new();
    for path in conf_files(dir)? {
        let content = fs_err::read_to_string(&path)?;
        for line in content.lines() {
            match VersionPin::parse_line(line) {
                Some(Ok(pin)) => pins.push(pin),
                Some(Err(bad)) => {
                    warn!(file = %path.display(), "ignoring invalid minversions line {bad:?}")
                }
                None => {}
            }
        }
    }
    Ok(pins)
}

/// `locks.d`/`protected.d`: one package name per line.
fn load_name_list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for path in conf_files(dir)? {
        let content = fs_err::read_to_string(&path)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            names.push(line.to_string());
        }
    }
    names.sort_unstable();
    names.dedup();
    Ok(names)
}

fn conf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs_err::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("conf"))
        .collect();
    files.sort();
    Ok(files)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_conf(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("tdnf.conf");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("tdnf.conf")).unwrap();
        assert_eq!(loaded.config, Config::default());
        assert!(loaded.locks.is_empty());
    }

    #[test]
    fn parses_main_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_conf(
            dir.path(),
            "[main]\n\
             gpgcheck=1\n\
             keepcache=true\n\
             installonly_limit=3\n\
             repodir=/etc/custom.repos.d\n\
             cachedir=/tmp/cache\n\
             excludepkgs=kernel* glibc\n\
             distroverpkg=my-release\n\
             minversions=openssl=1.1.1-1\n",
        );
        let loaded = load_config(&path).unwrap();
        let config = loaded.config;
        assert!(config.gpgcheck);
        assert!(config.keepcache);
        assert_eq!(config.installonly_limit, 3);
        assert_eq!(config.repodir, "/etc/custom.repos.d");
        assert_eq!(config.cachedir, "/tmp/cache");
        assert_eq!(config.excludepkgs, vec!["kernel*", "glibc"]);
        assert_eq!(config.distroverpkg, vec!["my-release"]);
        assert_eq!(config.minversions.len(), 1);
        assert_eq!(config.minversions[0].name, "openssl");
    }

    #[test]
    fn drop_in_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_conf(dir.path(), "[main]\n");
        std::fs::create_dir(dir.path().join("locks.d")).unwrap();
        std::fs::write(dir.path().join("locks.d/kernel.conf"), "kernel\n# c\n").unwrap();
        std::fs::create_dir(dir.path().join("protected.d")).unwrap();
        std::fs::write(dir.path().join("protected.d/sys.conf"), "systemd\n").unwrap();
        std::fs::create_dir(dir.path().join("minversions.d")).unwrap();
        std::fs::write(
            dir.path().join("minversions.d/ssl.conf"),
            "openssl=3.0.0-1\n",
        )
        .unwrap();
        // non-.conf files are ignored
        std::fs::write(dir.path().join("locks.d/readme.txt"), "nope\n").unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.locks, vec!["kernel"]);
        assert_eq!(loaded.protected, vec!["systemd"]);
        assert_eq!(loaded.config.minversions.len(), 1);
        assert_eq!(loaded.config.minversions[0].name, "openssl");
    }

    #[test]
    fn boolean_rule() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_conf(dir.path(), "[main]\ngpgcheck=yes\nkeepcache=1\n");
        let loaded = load_config(&path).unwrap();
        // anything but 1/true is false
        assert!(!loaded.config.gpgcheck);
        assert!(loaded.config.keepcache);
    }
}
