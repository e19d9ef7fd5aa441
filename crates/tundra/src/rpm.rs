//! The seam to the rpm database and transaction engine.
//!
//! The engine never links librpm: everything goes through [`RpmBackend`].
//! The production implementation drives the system `rpm(8)` binary;
//! tests substitute an in-memory fake. The rpm *test* transaction remains
//! the authoritative dependency and file-conflict check before anything
//! touches the filesystem.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use tundra_digest::{compute_bytes_digest, Sha256};
use tundra_solve::InstalledRecord;
use tundra_types::{Evr, Nevra};

use crate::error::{Error, Result};

/// Which verification bits the transaction runs with. All bits set is the
/// default; `--nogpgcheck` clears both, `--skipsignature` clears
/// signatures only, `--skipdigest` clears digests only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyFlags {
    /// Skip header+payload digest verification.
    pub skip_digest: bool,
    /// Skip signature verification.
    pub skip_signature: bool,
}

impl VerifyFlags {
    /// Translate the user-facing switches.
    pub fn from_switches(nogpgcheck: bool, skipsignature: bool, skipdigest: bool) -> Self {
        Self {
            skip_digest: nogpgcheck || skipdigest,
            skip_signature: nogpgcheck || skipsignature,
        }
    }

    fn rpm_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.skip_digest {
            args.push("--nodigest");
        }
        if self.skip_signature {
            args.push("--nosignature");
        }
        args
    }
}

/// One rpm transaction, already ordered by the caller.
#[derive(Debug, Clone, Default)]
pub struct RpmTransaction {
    /// Package files to install or upgrade (`rpm -U` semantics).
    pub install_files: Vec<PathBuf>,
    /// Whether the transaction contains downgrades (`--oldpackage`).
    pub has_downgrades: bool,
    /// Whether the transaction contains reinstalls (`--replacepkgs`).
    pub has_reinstalls: bool,
    /// NEVRAs to erase.
    pub erase_nevras: Vec<Nevra>,
    /// Verification policy.
    pub verify: VerifyFlags,
}

impl RpmTransaction {
    /// Whether there is anything to do.
    pub fn is_empty(&self) -> bool {
        self.install_files.is_empty() && self.erase_nevras.is_empty()
    }
}

/// Access to the rpm database and transaction engine.
pub trait RpmBackend {
    /// Every installed package.
    fn list_installed(&self) -> Result<Vec<InstalledRecord>>;

    /// An opaque cookie that changes iff the installed set changes.
    fn db_cookie(&self) -> Result<String>;

    /// The version of the package providing `provide`, for
    /// `$releasever`.
    fn provider_version(&self, provide: &str) -> Result<Option<String>>;

    /// Import a GPG public key into the rpm keyring.
    fn import_key(&self, path: &Path) -> Result<()>;

    /// Run a transaction. With `test_only` nothing is mutated; ordering,
    /// dependency and file-conflict checks still run.
    fn run_transaction(&self, transaction: &RpmTransaction, test_only: bool) -> Result<()>;
}

/// The production backend: the system `rpm` binary, honoring an optional
/// install root.
#[derive(Debug, Clone, Default)]
pub struct SystemRpm {
    /// Alternative install root (`rpm --root`).
    pub install_root: Option<PathBuf>,
}

impl SystemRpm {
    /// Backend for the running system.
    pub fn new(install_root: Option<PathBuf>) -> Self {
        Self { install_root }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("rpm");
        if let Some(root) = &self.install_root {
            cmd.arg("--root").arg(root);
        }
        cmd
    }

    fn run(&self, cmd: &mut Command) -> Result<String> {
        debug!(?cmd, "running rpm");
        let output = cmd
            .output()
            .map_err(|e| Error::TransactionFailed(format!("failed to run rpm: {e}")))?;
        // Scriptlet and diagnostic output belongs on stderr; stdout stays
        // reserved for structured output.
        std::io::stderr().write_all(&output.stderr).ok();
        if !output.status.success() {
            return Err(Error::TransactionFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn query(&self, cmd: &mut Command) -> Result<Option<String>> {
        debug!(?cmd, "querying rpm");
        let output = cmd
            .output()
            .map_err(|e| Error::TransactionFailed(format!("failed to run rpm: {e}")))?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

const QUERY_FORMAT: &str = "%{NAME}\\t%{EPOCH}\\t%{VERSION}\\t%{RELEASE}\\t%{ARCH}\\t%{SIZE}\\t%{SUMMARY}\\n";

impl RpmBackend for SystemRpm {
    fn list_installed(&self) -> Result<Vec<InstalledRecord>> {
        let Some(out) = self.query(self.command().args(["-qa", "--qf", QUERY_FORMAT]))? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for line in out.lines() {
            match parse_installed_line(line) {
                Some(record) => records.push(record),
                None => warn!(line = %line, "unparsable rpm query line"),
            }
        }
        Ok(records)
    }

    fn db_cookie(&self) -> Result<String> {
        let mut nevras: Vec<String> = self
            .list_installed()?
            .iter()
            .map(|r| format!("{}-{}.{}", r.name, r.evr, r.arch))
            .collect();
        nevras.sort_unstable();
        let digest = compute_bytes_digest::<Sha256>(nevras.join("\n").as_bytes());
        Ok(format!("{digest:x}"))
    }

    fn provider_version(&self, provide: &str) -> Result<Option<String>> {
        let out = self.query(self.command().args([
            "-q",
            "--qf",
            "%{VERSION}\\n",
            "--whatprovides",
            provide,
        ]))?;
        Ok(out.and_then(|s| s.lines().next().map(str::to_string)))
    }

    fn import_key(&self, path: &Path) -> Result<()> {
        self.run(self.command().arg("--import").arg(path))?;
        Ok(())
    }

    fn run_transaction(&self, transaction: &RpmTransaction, test_only: bool) -> Result<()> {
        if !transaction.erase_nevras.is_empty() {
            let mut cmd = self.command();
            cmd.arg("-e");
            if test_only {
                cmd.arg("--test");
            }
            for nevra in &transaction.erase_nevras {
                cmd.arg(nevra.to_string());
            }
            self.run(&mut cmd)?;
        }
        if !transaction.install_files.is_empty() {
            let mut cmd = self.command();
            cmd.arg("-U").arg("-v");
            if test_only {
                cmd.arg("--test");
            }
            if transaction.has_downgrades {
                cmd.arg("--oldpackage");
            }
            if transaction.has_reinstalls {
                cmd.arg("--replacepkgs");
            }
            cmd.args(transaction.verify.rpm_args());
            for file in &transaction.install_files {
                cmd.arg(file);
            }
            self.run(&mut cmd)?;
        }
        Ok(())
    }
}

fn parse_installed_line(line: &str) -> Option<InstalledRecord> {
    let mut fields = line.split('\t');
    let name = fields.next()?;
    let epoch = fields.next()?;
    let version = fields.next()?;
    let release = fields.next()?;
    let arch = fields.next()?;
    let size = fields.next()?;
    let summary = fields.next().unwrap_or_default();
    let epoch = if epoch == "(none)" {
        0
    } else {
        epoch.parse().ok()?
    };
    Some(InstalledRecord {
        name: name.to_string(),
        evr: Evr {
            epoch,
            version: version.to_string(),
            release: release.to_string(),
        },
        arch: arch.to_string(),
        install_size: size.parse().unwrap_or(0),
        provides: Vec::new(),
        requires: Vec::new(),
        summary: summary.to_string(),
    })
}

/// Read the NEVRA of an rpm file on disk via the `rpm` crate.
pub fn nevra_of_rpm_file(path: &Path) -> Result<Nevra> {
    let package = ::rpm::Package::open(path)
        .map_err(|_| Error::RpmRead(path.display().to_string()))?;
    let metadata = &package.metadata;
    let name = metadata
        .get_name()
        .map_err(|_| Error::RpmRead(path.display().to_string()))?;
    let epoch = metadata.get_epoch().unwrap_or(0);
    let version = metadata
        .get_version()
        .map_err(|_| Error::RpmRead(path.display().to_string()))?;
    let release = metadata
        .get_release()
        .map_err(|_| Error::RpmRead(path.display().to_string()))?;
    let arch = metadata
        .get_arch()
        .map_err(|_| Error::RpmRead(path.display().to_string()))?;
    Ok(Nevra::new(
        name,
        Evr {
            epoch: epoch as u64,
            version: version.to_string(),
            release: release.to_string(),
        },
        arch,
    ))
}

/// Whether an rpm file is a source package.
pub fn is_source_rpm(path: &Path) -> Result<bool> {
    let package = ::rpm::Package::open(path)
        .map_err(|_| Error::RpmRead(path.display().to_string()))?;
    Ok(package.metadata.is_source_package())
}

#[cfg(test)]
pub(crate) mod mock {
    //! An in-memory rpm backend for tests.

    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use super::*;

    /// Test double tracking the installed set in memory.
    #[derive(Debug, Default)]
    pub struct FakeRpm {
        /// name -> record
        pub installed: RefCell<BTreeMap<String, InstalledRecord>>,
        /// Transactions the executor handed over, in order.
        pub transactions: RefCell<Vec<(RpmTransaction, bool)>>,
        /// Keys imported.
        pub imported_keys: RefCell<Vec<PathBuf>>,
        /// When set, the next run_transaction fails.
        pub fail_next: RefCell<Option<String>>,
    }

    impl FakeRpm {
        pub fn with_installed(records: Vec<InstalledRecord>) -> Self {
            let fake = Self::default();
            for record in records {
                fake.installed
                    .borrow_mut()
                    .insert(record.name.clone(), record);
            }
            fake
        }
    }

    impl RpmBackend for FakeRpm {
        fn list_installed(&self) -> Result<Vec<InstalledRecord>> {
            Ok(self.installed.borrow().values().cloned().collect())
        }

        fn db_cookie(&self) -> Result<String> {
            let nevras: Vec<String> = self
                .list_installed()?
                .iter()
                .map(|r| format!("{}-{}.{}", r.name, r.evr, r.arch))
                .collect();
            let digest = compute_bytes_digest::<Sha256>(nevras.join("\n").as_bytes());
            Ok(format!("{digest:x}"))
        }

        fn provider_version(&self, provide: &str) -> Result<Option<String>> {
            Ok(self
                .installed
                .borrow()
                .get(provide)
                .map(|r| r.evr.version.clone()))
        }

        fn import_key(&self, path: &Path) -> Result<()> {
            self.imported_keys.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn run_transaction(&self, transaction: &RpmTransaction, test_only: bool) -> Result<()> {
            if let Some(message) = self.fail_next.borrow_mut().take() {
                return Err(Error::TransactionFailed(message));
            }
            self.transactions
                .borrow_mut()
                .push((transaction.clone(), test_only));
            if !test_only {
                let mut installed = self.installed.borrow_mut();
                for nevra in &transaction.erase_nevras {
                    installed.remove(&nevra.name);
                }
                for file in &transaction.install_files {
                    // Tests encode the NEVRA in the file name.
                    if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                        if let Ok(nevra) = Nevra::parse(stem) {
                            installed.insert(
                                nevra.name.clone(),
                                InstalledRecord {
                                    name: nevra.name.clone(),
                                    evr: nevra.evr.clone(),
                                    arch: nevra.arch.clone(),
                                    install_size: 0,
                                    provides: Vec::new(),
                                    requires: Vec::new(),
                                    summary: String::new(),
                                },
                            );
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn verify_flags_translation() {
        let all = VerifyFlags::from_switches(true, false, false);
        assert!(all.skip_digest && all.skip_signature);
        let sig = VerifyFlags::from_switches(false, true, false);
        assert!(!sig.skip_digest && sig.skip_signature);
        let digest = VerifyFlags::from_switches(false, false, true);
        assert!(digest.skip_digest && !digest.skip_signature);
    }

    #[test]
    fn installed_line_parsing() {
        let record =
            parse_installed_line("bash\t(none)\t5.1.8\t1.ph4\tx86_64\t6204928\tThe bash shell")
                .unwrap();
        assert_eq!(record.name, "bash");
        assert_eq!(record.evr, Evr::new(0, "5.1.8", "1.ph4"));
        assert_eq!(record.install_size, 6204928);
        assert_eq!(record.summary, "The bash shell");

        let with_epoch =
            parse_installed_line("openjdk\t1\t11.0.2\t3\tnoarch\t100\tjdk").unwrap();
        assert_eq!(with_epoch.evr.epoch, 1);

        assert!(parse_installed_line("garbage").is_none());
    }
}
