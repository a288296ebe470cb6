//! Persistence collaborator: load both tables at startup, save after each
//! completed registration.
//!
//! The contract is deliberately narrow: `load` must yield empty-but-valid
//! tables when no backing storage exists, and `save` writes a full snapshot.
//! The engine never persists mid-transaction.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};

use crate::store::{CodeStatus, Customer, CustomerStatus, ReferralCode};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Storage backend for the customer and referral tables.
pub trait Persistence: Send + Sync {
    fn load(&self) -> Result<(Vec<Customer>, Vec<ReferralCode>), StoreError>;
    fn save(&self, customers: &[Customer], codes: &[ReferralCode]) -> Result<(), StoreError>;
}

// =============================================================================
// SQLITE BACKEND
// =============================================================================

/// SQLite-backed persistence.
///
/// Snapshot semantics: `save` replaces both tables inside one transaction,
/// preserving insertion order via the rowid.
#[derive(Clone)]
pub struct SqlitePersistence {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePersistence {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             CREATE TABLE IF NOT EXISTS customers (\
               customer_id TEXT PRIMARY KEY,\
               name TEXT NOT NULL,\
               phone TEXT NOT NULL,\
               registration_date TEXT NOT NULL,\
               referrals_completed INTEGER NOT NULL,\
               discount_earned INTEGER NOT NULL,\
               referred_by TEXT NOT NULL,\
               status TEXT NOT NULL,\
               total_purchases INTEGER NOT NULL,\
               notes TEXT NOT NULL DEFAULT ''\
             );\
             CREATE TABLE IF NOT EXISTS referral_codes (\
               code TEXT PRIMARY KEY,\
               owner_customer_id TEXT NOT NULL,\
               owner_name TEXT NOT NULL,\
               owner_phone TEXT NOT NULL,\
               used_by_customer_id TEXT NOT NULL DEFAULT '',\
               used_by_name TEXT NOT NULL DEFAULT '',\
               used_by_phone TEXT NOT NULL DEFAULT '',\
               date_used TEXT NOT NULL DEFAULT '',\
               status TEXT NOT NULL,\
               notes TEXT NOT NULL DEFAULT ''\
             );",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("STEEPDESK_DB_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from("steepdesk.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError>,
    {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut guard)
    }
}

impl Persistence for SqlitePersistence {
    fn load(&self) -> Result<(Vec<Customer>, Vec<ReferralCode>), StoreError> {
        self.with_conn(|conn| {
            let mut customers = Vec::new();
            {
                let mut stmt = conn.prepare(
                    "SELECT customer_id, name, phone, registration_date, referrals_completed,\
                            discount_earned, referred_by, status, total_purchases, notes \
                     FROM customers ORDER BY rowid",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    customers.push(Customer {
                        customer_id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        registration_date: row.get(3)?,
                        referrals_completed: row.get::<_, i64>(4)?.max(0) as u32,
                        discount_earned: row.get::<_, i64>(5)? != 0,
                        referred_by: row.get(6)?,
                        status: CustomerStatus::from_str(&row.get::<_, String>(7)?),
                        total_purchases: row.get(8)?,
                        notes: row.get(9)?,
                    });
                }
            }

            let mut codes = Vec::new();
            {
                let mut stmt = conn.prepare(
                    "SELECT code, owner_customer_id, owner_name, owner_phone,\
                            used_by_customer_id, used_by_name, used_by_phone, date_used,\
                            status, notes \
                     FROM referral_codes ORDER BY rowid",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    codes.push(ReferralCode {
                        code: row.get(0)?,
                        owner_customer_id: row.get(1)?,
                        owner_name: row.get(2)?,
                        owner_phone: row.get(3)?,
                        used_by_customer_id: row.get(4)?,
                        used_by_name: row.get(5)?,
                        used_by_phone: row.get(6)?,
                        date_used: row.get(7)?,
                        status: CodeStatus::from_str(&row.get::<_, String>(8)?),
                        notes: row.get(9)?,
                    });
                }
            }

            Ok((customers, codes))
        })
    }

    fn save(&self, customers: &[Customer], codes: &[ReferralCode]) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM customers", [])?;
            tx.execute("DELETE FROM referral_codes", [])?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO customers (\
                        customer_id, name, phone, registration_date, referrals_completed,\
                        discount_earned, referred_by, status, total_purchases, notes\
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for c in customers {
                    stmt.execute(params![
                        c.customer_id,
                        c.name,
                        c.phone,
                        c.registration_date,
                        c.referrals_completed as i64,
                        if c.discount_earned { 1 } else { 0 },
                        c.referred_by,
                        c.status.as_str(),
                        c.total_purchases,
                        c.notes,
                    ])?;
                }
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO referral_codes (\
                        code, owner_customer_id, owner_name, owner_phone,\
                        used_by_customer_id, used_by_name, used_by_phone, date_used,\
                        status, notes\
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for r in codes {
                    stmt.execute(params![
                        r.code,
                        r.owner_customer_id,
                        r.owner_name,
                        r.owner_phone,
                        r.used_by_customer_id,
                        r.used_by_name,
                        r.used_by_phone,
                        r.date_used,
                        r.status.as_str(),
                        r.notes,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }
}

// =============================================================================
// MEMORY BACKEND
// =============================================================================

/// Keep-nothing backend for tests and ephemeral runs: loads empty tables,
/// accepts every save.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryPersistence;

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<(Vec<Customer>, Vec<ReferralCode>), StoreError> {
        Ok((Vec::new(), Vec::new()))
    }

    fn save(&self, _customers: &[Customer], _codes: &[ReferralCode]) -> Result<(), StoreError> {
        Ok(())
    }
}
