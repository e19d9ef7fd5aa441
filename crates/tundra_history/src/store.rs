//! The SQLite-backed history store.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::diff::diff_sorted;
use crate::HistoryError;

/// Cmdline recorded for reconciliation deltas the engine synthesizes when
/// the rpm database changed behind its back.
pub const UNKNOWN_CMDLINE: &str = "(unknown)";

/// Transaction flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Absolute snapshot of the installed set.
    Base,
    /// Additions/removals relative to the previous state.
    Delta,
}

impl TransactionKind {
    fn from_i64(v: i64) -> Result<Self, HistoryError> {
        match v {
            0 => Ok(TransactionKind::Base),
            1 => Ok(TransactionKind::Delta),
            other => Err(HistoryError::Corrupt(format!(
                "unknown transaction type {other}"
            ))),
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            TransactionKind::Base => 0,
            TransactionKind::Delta => 1,
        }
    }
}

const ITEM_SET: i64 = 0;
const ITEM_ADD: i64 = 1;
const ITEM_REMOVE: i64 = 2;

/// One recorded transaction, with its item lists resolved to NEVRAs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTransaction {
    /// Transaction id; ids are assigned monotonically.
    pub id: i64,
    /// Baseline or delta.
    pub kind: TransactionKind,
    /// rpm database cookie at completion.
    pub cookie: String,
    /// Command line that caused the transaction.
    pub cmdline: String,
    /// Unix timestamp of completion.
    pub timestamp: i64,
    /// NEVRAs added (the full set for a baseline).
    pub added: Vec<String>,
    /// NEVRAs removed.
    pub removed: Vec<String>,
}

/// The package changes needed to move between two recorded states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// rpm ids present in the target state but not the source state.
    pub added: Vec<i64>,
    /// rpm ids present in the source state but not the target state.
    pub removed: Vec<i64>,
}

impl Delta {
    /// Whether the delta carries no changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// An open history database.
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (creating if necessary) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// An in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS rpms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nevra TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cookie TEXT NOT NULL,
                cmdline TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                type INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trans_items (
                trans_id INTEGER NOT NULL REFERENCES transactions(id),
                type INTEGER NOT NULL,
                rpm_id INTEGER NOT NULL REFERENCES rpms(id)
            );
            CREATE INDEX IF NOT EXISTS idx_trans_items_trans
                ON trans_items(trans_id);

            CREATE TABLE IF NOT EXISTS names (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS flag_set (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trans_id INTEGER NOT NULL,
                name_id INTEGER NOT NULL REFERENCES names(id),
                value INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flag_set_name
                ON flag_set(name_id, trans_id);
            ",
        )?;
        Ok(Self { conn })
    }

    /// Whether a baseline has been recorded yet.
    pub fn is_initialized(&self) -> Result<bool, HistoryError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Id of the most recent transaction.
    pub fn latest_id(&self) -> Result<i64, HistoryError> {
        self.conn
            .query_row("SELECT MAX(id) FROM transactions", [], |row| {
                row.get::<_, Option<i64>>(0)
            })?
            .ok_or(HistoryError::Empty)
    }

    /// Cookie recorded with the most recent transaction.
    pub fn latest_cookie(&self) -> Result<String, HistoryError> {
        self.conn
            .query_row(
                "SELECT cookie FROM transactions ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(HistoryError::Empty)
    }

    /// Record the baseline. Fails if the database already holds one.
    pub fn init_baseline(
        &mut self,
        installed: &[String],
        cookie: &str,
        cmdline: &str,
        timestamp: i64,
    ) -> Result<i64, HistoryError> {
        if self.is_initialized()? {
            return Err(HistoryError::Corrupt(
                "baseline already recorded".to_string(),
            ));
        }
        let tx = self.conn.transaction()?;
        let trans_id = insert_transaction(&tx, cookie, cmdline, timestamp, TransactionKind::Base)?;
        let ids = rpm_ids_for(&tx, installed)?;
        for id in ids {
            tx.execute(
                "INSERT INTO trans_items (trans_id, type, rpm_id) VALUES (?1, ?2, ?3)",
                params![trans_id, ITEM_SET, id],
            )?;
        }
        tx.commit()?;
        info!(trans_id, packages = installed.len(), "recorded history baseline");
        Ok(trans_id)
    }

    /// Record a delta transaction by diffing the given post-state against
    /// the replayed current state. Returns `None` when nothing changed.
    pub fn record_transaction(
        &mut self,
        installed_after: &[String],
        cookie: &str,
        cmdline: &str,
        timestamp: i64,
    ) -> Result<Option<i64>, HistoryError> {
        if !self.is_initialized()? {
            return Err(HistoryError::Empty);
        }
        let pre = self.state_at(self.latest_id()?)?;
        let tx = self.conn.transaction()?;
        let mut post = rpm_ids_for(&tx, installed_after)?;
        post.sort_unstable();
        let (removed, added) = diff_sorted(&pre, &post);
        if added.is_empty() && removed.is_empty() {
            // Still refresh the cookie bookkeeping via a no-op? No: an
            // unchanged set means an unchanged cookie by definition.
            return Ok(None);
        }
        let trans_id = insert_transaction(&tx, cookie, cmdline, timestamp, TransactionKind::Delta)?;
        for id in &added {
            tx.execute(
                "INSERT INTO trans_items (trans_id, type, rpm_id) VALUES (?1, ?2, ?3)",
                params![trans_id, ITEM_ADD, id],
            )?;
        }
        for id in &removed {
            tx.execute(
                "INSERT INTO trans_items (trans_id, type, rpm_id) VALUES (?1, ?2, ?3)",
                params![trans_id, ITEM_REMOVE, id],
            )?;
        }
        tx.commit()?;
        debug!(
            trans_id,
            added = added.len(),
            removed = removed.len(),
            "recorded history delta"
        );
        Ok(Some(trans_id))
    }

    /// Reconcile with the live rpm database: when `cookie` differs from
    /// the recorded one, insert a synthetic `(unknown)` delta capturing
    /// whatever changed outside the engine.
    pub fn sync(
        &mut self,
        installed_now: &[String],
        cookie: &str,
        timestamp: i64,
    ) -> Result<Option<i64>, HistoryError> {
        if self.latest_cookie()? == cookie {
            return Ok(None);
        }
        info!("rpm database changed outside the engine, reconciling history");
        let recorded = self.record_transaction(installed_now, cookie, UNKNOWN_CMDLINE, timestamp)?;
        if recorded.is_none() {
            // Same set, different cookie (e.g. a reinstall). Track the new
            // cookie with an empty delta so sync converges.
            let tx = self.conn.transaction()?;
            let id = insert_transaction(&tx, cookie, UNKNOWN_CMDLINE, timestamp, TransactionKind::Delta)?;
            tx.commit()?;
            return Ok(Some(id));
        }
        Ok(recorded)
    }

    /// The replayed set of rpm ids at transaction `trans_id`, ascending.
    pub fn state_at(&self, trans_id: i64) -> Result<Vec<i64>, HistoryError> {
        self.validate_id(trans_id)?;
        let base_id: i64 = self
            .conn
            .query_row(
                "SELECT id FROM transactions WHERE type = 0 AND id <= ?1 ORDER BY id DESC LIMIT 1",
                [trans_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                HistoryError::Corrupt(format!("no baseline at or before transaction {trans_id}"))
            })?;

        let mut state: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT rpm_id FROM trans_items WHERE trans_id = ?1 AND type = ?2 ORDER BY rpm_id",
            )?;
            let rows = stmt.query_map(params![base_id, ITEM_SET], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut stmt = self.conn.prepare(
            "SELECT t.id, i.type, i.rpm_id
             FROM transactions t JOIN trans_items i ON i.trans_id = t.id
             WHERE t.id > ?1 AND t.id <= ?2 AND t.type = 1
             ORDER BY t.id, i.type, i.rpm_id",
        )?;
        let rows = stmt.query_map(params![base_id, trans_id], |row| {
            Ok((row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        for row in rows {
            let (item_type, rpm_id) = row?;
            match item_type {
                ITEM_ADD => {
                    if let Err(pos) = state.binary_search(&rpm_id) {
                        state.insert(pos, rpm_id);
                    }
                }
                ITEM_REMOVE => {
                    if let Ok(pos) = state.binary_search(&rpm_id) {
                        state.remove(pos);
                    }
                }
                other => {
                    return Err(HistoryError::Corrupt(format!(
                        "delta transaction carries item type {other}"
                    )))
                }
            }
        }
        Ok(state)
    }

    /// The replayed current state.
    pub fn current_state(&self) -> Result<Vec<i64>, HistoryError> {
        self.state_at(self.latest_id()?)
    }

    /// Changes needed to move the current state to `state(trans_id)`.
    pub fn delta_to(&self, trans_id: i64) -> Result<Delta, HistoryError> {
        let target = self.state_at(trans_id)?;
        let current = self.current_state()?;
        let (added, removed) = diff_sorted(&target, &current);
        Ok(Delta { added, removed })
    }

    /// Changes needed to move `state(from)` to `state(to)`.
    pub fn delta_between(&self, from: i64, to: i64) -> Result<Delta, HistoryError> {
        let source = self.state_at(from)?;
        let target = self.state_at(to)?;
        let (added, removed) = diff_sorted(&target, &source);
        Ok(Delta { added, removed })
    }

    /// Resolve rpm ids back to NEVRA strings, preserving order.
    pub fn nevras_for(&self, ids: &[i64]) -> Result<Vec<String>, HistoryError> {
        let mut stmt = self.conn.prepare("SELECT nevra FROM rpms WHERE id = ?1")?;
        ids.iter()
            .map(|id| {
                stmt.query_row([id], |row| row.get(0))
                    .optional()?
                    .ok_or_else(|| HistoryError::Corrupt(format!("dangling rpm id {id}")))
            })
            .collect()
    }

    /// All recorded transactions, ascending, with resolved item lists.
    pub fn list(&self) -> Result<Vec<HistoryTransaction>, HistoryError> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT id FROM transactions ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        ids.into_iter().map(|id| self.transaction(id)).collect()
    }

    /// One transaction with resolved item lists.
    pub fn transaction(&self, trans_id: i64) -> Result<HistoryTransaction, HistoryError> {
        let (cookie, cmdline, timestamp, kind) = self
            .conn
            .query_row(
                "SELECT cookie, cmdline, timestamp, type FROM transactions WHERE id = ?1",
                [trans_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or(HistoryError::UnknownTransaction(trans_id))?;
        let kind = TransactionKind::from_i64(kind)?;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT i.type, r.nevra FROM trans_items i
             JOIN rpms r ON r.id = i.rpm_id
             WHERE i.trans_id = ?1 ORDER BY r.nevra",
        )?;
        let rows = stmt.query_map([trans_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (item_type, nevra) = row?;
            match item_type {
                ITEM_SET | ITEM_ADD => added.push(nevra),
                ITEM_REMOVE => removed.push(nevra),
                other => {
                    return Err(HistoryError::Corrupt(format!(
                        "transaction {trans_id} carries item type {other}"
                    )))
                }
            }
        }
        Ok(HistoryTransaction {
            id: trans_id,
            kind,
            cookie,
            cmdline,
            timestamp,
            added,
            removed,
        })
    }

    /// Record an auto-installed flag value against a transaction.
    pub fn set_flag(
        &mut self,
        trans_id: i64,
        name: &str,
        value: bool,
    ) -> Result<(), HistoryError> {
        let tx = self.conn.transaction()?;
        let name_id = name_id_for(&tx, name)?;
        tx.execute(
            "INSERT INTO flag_set (trans_id, name_id, value) VALUES (?1, ?2, ?3)",
            params![trans_id, name_id, value as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// The flag value for `name` as of transaction `trans_id`: the latest
    /// entry with `trans_id <= T`, defaulting to `false`.
    pub fn flag_at(&self, name: &str, trans_id: i64) -> Result<bool, HistoryError> {
        let value: Option<i64> = self
            .conn
            .query_row(
                "SELECT f.value FROM flag_set f JOIN names n ON n.id = f.name_id
                 WHERE n.name = ?1 AND f.trans_id <= ?2
                 ORDER BY f.id DESC LIMIT 1",
                params![name, trans_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0) != 0)
    }

    /// All flag values as of transaction `trans_id`.
    pub fn flags_at(&self, trans_id: i64) -> Result<BTreeMap<String, bool>, HistoryError> {
        let mut stmt = self.conn.prepare(
            "SELECT n.name, f.value FROM flag_set f
             JOIN names n ON n.id = f.name_id
             WHERE f.trans_id <= ?1 ORDER BY f.id",
        )?;
        let rows = stmt.query_map([trans_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0))
        })?;
        let mut flags = BTreeMap::new();
        for row in rows {
            let (name, value) = row?;
            // Later entries win; rows come back in insertion order.
            flags.insert(name, value);
        }
        Ok(flags)
    }

    /// Names currently flagged as auto-installed.
    pub fn auto_installed_names(&self) -> Result<Vec<String>, HistoryError> {
        let latest = self.latest_id()?;
        Ok(self
            .flags_at(latest)?
            .into_iter()
            .filter_map(|(name, auto)| auto.then_some(name))
            .collect())
    }

    /// Re-assert, against `record_at`, every flag whose value at
    /// `target_trans` differs from the current value. Used by rollback,
    /// undo and redo.
    pub fn restore_flags(
        &mut self,
        target_trans: i64,
        record_at: i64,
    ) -> Result<usize, HistoryError> {
        let latest = self.latest_id()?;
        let current = self.flags_at(latest)?;
        let target = self.flags_at(target_trans)?;

        let mut restored = 0;
        let mut names: Vec<&String> = current.keys().chain(target.keys()).collect();
        names.sort();
        names.dedup();
        for name in names {
            let now = current.get(name.as_str()).copied().unwrap_or(false);
            let then = target.get(name.as_str()).copied().unwrap_or(false);
            if now != then {
                self.set_flag(record_at, name, then)?;
                restored += 1;
            }
        }
        Ok(restored)
    }

    fn validate_id(&self, trans_id: i64) -> Result<(), HistoryError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM transactions WHERE id = ?1",
                [trans_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(HistoryError::UnknownTransaction(trans_id)),
        }
    }
}

fn insert_transaction(
    tx: &rusqlite::Transaction<'_>,
    cookie: &str,
    cmdline: &str,
    timestamp: i64,
    kind: TransactionKind,
) -> Result<i64, HistoryError> {
    tx.execute(
        "INSERT INTO transactions (cookie, cmdline, timestamp, type) VALUES (?1, ?2, ?3, ?4)",
        params![cookie, cmdline, timestamp, kind.as_i64()],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Intern NEVRAs into the append-only `rpms` dictionary and return their
/// ids, input order preserved.
fn rpm_ids_for(
    tx: &rusqlite::Transaction<'_>,
    nevras: &[String],
) -> Result<Vec<i64>, HistoryError> {
    let mut insert = tx.prepare("INSERT OR IGNORE INTO rpms (nevra) VALUES (?1)")?;
    let mut select = tx.prepare("SELECT id FROM rpms WHERE nevra = ?1")?;
    let mut ids = Vec::with_capacity(nevras.len());
    for nevra in nevras {
        insert.execute([nevra])?;
        ids.push(select.query_row([nevra], |row| row.get(0))?);
    }
    Ok(ids)
}

fn name_id_for(tx: &rusqlite::Transaction<'_>, name: &str) -> Result<i64, HistoryError> {
    tx.execute("INSERT OR IGNORE INTO names (name) VALUES (?1)", [name])?;
    Ok(tx.query_row("SELECT id FROM names WHERE name = ?1", [name], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn db_with_baseline() -> HistoryDb {
        let mut db = HistoryDb::open_in_memory().unwrap();
        db.init_baseline(
            &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
            "cookie-0",
            "(baseline)",
            1000,
        )
        .unwrap();
        db
    }

    #[test]
    fn baseline_then_delta_replay() {
        let mut db = db_with_baseline();
        // install foo
        let t2 = db
            .record_transaction(
                &strings(&[
                    "glibc-2.36-1.x86_64",
                    "bash-5.1-2.x86_64",
                    "foo-1.0-1.x86_64",
                ]),
                "cookie-1",
                "install foo",
                1010,
            )
            .unwrap()
            .unwrap();
        // remove foo again
        let t3 = db
            .record_transaction(
                &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
                "cookie-2",
                "remove foo",
                1020,
            )
            .unwrap()
            .unwrap();

        let s1 = db.state_at(1).unwrap();
        let s2 = db.state_at(t2).unwrap();
        let s3 = db.state_at(t3).unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s2.len(), 3);
        // install X; remove X returns to the pre-state at the id level
        assert_eq!(s1, s3);

        let trans = db.transaction(t2).unwrap();
        assert_eq!(trans.kind, TransactionKind::Delta);
        assert_eq!(trans.added, vec!["foo-1.0-1.x86_64".to_string()]);
        assert!(trans.removed.is_empty());
    }

    #[test]
    fn no_change_records_nothing() {
        let mut db = db_with_baseline();
        let result = db
            .record_transaction(
                &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
                "cookie-0",
                "upgrade",
                1010,
            )
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(db.latest_id().unwrap(), 1);
    }

    #[test]
    fn delta_reversal_property() {
        let mut db = db_with_baseline();
        db.record_transaction(
            &strings(&["glibc-2.36-1.x86_64", "foo-1.0-1.x86_64"]),
            "cookie-1",
            "swap",
            1010,
        )
        .unwrap();

        let forward = db.delta_between(1, 2).unwrap();
        let backward = db.delta_between(2, 1).unwrap();
        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
    }

    #[test]
    fn rollback_delta_and_idempotence() {
        let mut db = db_with_baseline();
        db.record_transaction(
            &strings(&[
                "glibc-2.36-1.x86_64",
                "bash-5.1-2.x86_64",
                "foo-1.0-1.x86_64",
            ]),
            "cookie-1",
            "install foo",
            1010,
        )
        .unwrap();

        let delta = db.delta_to(1).unwrap();
        assert!(delta.added.is_empty());
        assert_eq!(db.nevras_for(&delta.removed).unwrap(), vec![
            "foo-1.0-1.x86_64".to_string()
        ]);

        // Apply the rollback: state goes back to baseline content.
        db.record_transaction(
            &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
            "cookie-2",
            "rollback 1",
            1020,
        )
        .unwrap();
        // Rolling back again is a no-op.
        let again = db.delta_to(1).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn sync_inserts_unknown_delta() {
        let mut db = db_with_baseline();
        assert_eq!(db.sync(&strings(&[]), "cookie-0", 1010).unwrap(), None);

        let id = db
            .sync(
                &strings(&[
                    "glibc-2.36-1.x86_64",
                    "bash-5.1-2.x86_64",
                    "rogue-1-1.noarch",
                ]),
                "cookie-x",
                1020,
            )
            .unwrap()
            .unwrap();
        let trans = db.transaction(id).unwrap();
        assert_eq!(trans.cmdline, UNKNOWN_CMDLINE);
        assert_eq!(trans.added, vec!["rogue-1-1.noarch".to_string()]);
        assert_eq!(db.latest_cookie().unwrap(), "cookie-x");
    }

    #[test]
    fn sync_with_same_set_but_new_cookie_converges() {
        let mut db = db_with_baseline();
        let id = db
            .sync(
                &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
                "cookie-reinstall",
                1010,
            )
            .unwrap();
        assert!(id.is_some());
        assert_eq!(db.latest_cookie().unwrap(), "cookie-reinstall");
        assert_eq!(
            db.sync(
                &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
                "cookie-reinstall",
                1011,
            )
            .unwrap(),
            None
        );
    }

    #[test]
    fn flags_follow_transactions() {
        let mut db = db_with_baseline();
        let t2 = db
            .record_transaction(
                &strings(&[
                    "glibc-2.36-1.x86_64",
                    "bash-5.1-2.x86_64",
                    "foo-1.0-1.x86_64",
                    "bar-2.0-1.x86_64",
                ]),
                "cookie-1",
                "install foo",
                1010,
            )
            .unwrap()
            .unwrap();
        // foo was asked for, bar came along as a dependency
        db.set_flag(t2, "foo", false).unwrap();
        db.set_flag(t2, "bar", true).unwrap();

        assert!(!db.flag_at("foo", t2).unwrap());
        assert!(db.flag_at("bar", t2).unwrap());
        // Before the install nothing was flagged.
        assert!(!db.flag_at("bar", 1).unwrap());
        assert_eq!(db.auto_installed_names().unwrap(), vec!["bar".to_string()]);
    }

    #[test]
    fn restore_flags_to_earlier_state() {
        let mut db = db_with_baseline();
        let t2 = db
            .record_transaction(
                &strings(&[
                    "glibc-2.36-1.x86_64",
                    "bash-5.1-2.x86_64",
                    "bar-2.0-1.x86_64",
                ]),
                "cookie-1",
                "install bar",
                1010,
            )
            .unwrap()
            .unwrap();
        db.set_flag(t2, "bar", true).unwrap();

        let t3 = db
            .record_transaction(
                &strings(&["glibc-2.36-1.x86_64", "bash-5.1-2.x86_64"]),
                "cookie-2",
                "rollback 1",
                1020,
            )
            .unwrap()
            .unwrap();
        let restored = db.restore_flags(1, t3).unwrap();
        assert_eq!(restored, 1);
        assert!(!db.flag_at("bar", t3).unwrap());
    }

    #[test]
    fn unknown_transaction_id() {
        let db = db_with_baseline();
        assert_matches!(
            db.state_at(99),
            Err(HistoryError::UnknownTransaction(99))
        );
        assert_matches!(db.transaction(99), Err(HistoryError::UnknownTransaction(99)));
    }

    #[test]
    fn empty_database() {
        let db = HistoryDb::open_in_memory().unwrap();
        assert!(!db.is_initialized().unwrap());
        assert_matches!(db.latest_id(), Err(HistoryError::Empty));
        assert_matches!(db.latest_cookie(), Err(HistoryError::Empty));
    }

    #[test]
    fn baseline_twice_is_rejected() {
        let mut db = db_with_baseline();
        let err = db
            .init_baseline(&strings(&["x-1-1.noarch"]), "c", "init", 1)
            .unwrap_err();
        assert_matches!(err, HistoryError::Corrupt(_));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        {
            let mut db = HistoryDb::open(&path).unwrap();
            db.init_baseline(&strings(&["glibc-2.36-1.x86_64"]), "c0", "init", 1)
                .unwrap();
        }
        let db = HistoryDb::open(&path).unwrap();
        assert!(db.is_initialized().unwrap());
        assert_eq!(db.latest_cookie().unwrap(), "c0");
    }
}
