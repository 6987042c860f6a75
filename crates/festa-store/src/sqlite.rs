//! SQLite record store: birthdays, device tokens, per-owner settings.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use festa_core::error::{FestaError, Result};
use festa_core::traits::RecordStore;
use festa_core::types::{BirthdayRecord, DeviceRegistration};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Settings key for the per-owner notification master switch.
const NOTIFY_KEY: &str = "notifications_enabled";

const BIRTHDAY_COLS: &str = "id, owner, first_name, last_name, birth_date, phone, email, \
     notification_enabled, notification_times, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Raw birthday row before date/JSON hydration.
type BirthdayRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    String,
    String,
    String,
);

impl SqliteStore {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| FestaError::Store(format!("Open {}: {e}", path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS birthdays (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL DEFAULT '',
                birth_date TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                notification_enabled INTEGER NOT NULL DEFAULT 1,
                notification_times TEXT NOT NULL DEFAULT '[\"09:00\"]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_birthdays_owner ON birthdays(owner);

            CREATE TABLE IF NOT EXISTS device_tokens (
                owner TEXT NOT NULL,
                token TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (owner, token)
            );
            CREATE INDEX IF NOT EXISTS idx_device_tokens_token ON device_tokens(token);

            CREATE TABLE IF NOT EXISTS settings (
                owner TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (owner, key)
            );",
        )
        .map_err(|e| FestaError::Store(format!("Migrate: {e}")))?;

        tracing::info!("💾 Store ready: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total birthday records across all owners (startup banner).
    pub fn birthday_count(&self) -> usize {
        let Ok(conn) = self.conn.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM birthdays", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    fn hydrate(raw: BirthdayRow) -> Result<BirthdayRecord> {
        let (
            id,
            owner,
            first_name,
            last_name,
            birth_date,
            phone,
            email,
            enabled,
            times,
            created_at,
            updated_at,
        ) = raw;
        Ok(BirthdayRecord {
            id,
            owner,
            first_name,
            last_name,
            birth_date: NaiveDate::parse_from_str(&birth_date, "%Y-%m-%d")
                .map_err(|e| FestaError::Store(format!("Bad birth_date {birth_date:?}: {e}")))?,
            phone,
            email,
            notification_enabled: enabled != 0,
            notification_times: serde_json::from_str(&times)
                .map_err(|e| FestaError::Store(format!("Bad notification_times: {e}")))?,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FestaError::Store(format!("Bad timestamp {raw:?}: {e}")))
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BirthdayRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

#[async_trait]
impl RecordStore for SqliteStore {
    // ── Birthdays ──────────────────────────────

    async fn insert_birthday(&self, record: &BirthdayRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let times = serde_json::to_string(&record.notification_times)
            .map_err(|e| FestaError::Store(format!("Encode times: {e}")))?;
        conn.execute(
            "INSERT INTO birthdays (id, owner, first_name, last_name, birth_date, phone, email,
                notification_enabled, notification_times, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.owner,
                record.first_name,
                record.last_name,
                record.birth_date.to_string(),
                record.phone,
                record.email,
                record.notification_enabled as i64,
                times,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| FestaError::Store(format!("Insert birthday: {e}")))?;
        Ok(())
    }

    async fn update_birthday(&self, record: &BirthdayRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let times = serde_json::to_string(&record.notification_times)
            .map_err(|e| FestaError::Store(format!("Encode times: {e}")))?;
        let changed = conn
            .execute(
                "UPDATE birthdays SET first_name=?1, last_name=?2, birth_date=?3, phone=?4,
                    email=?5, notification_enabled=?6, notification_times=?7, updated_at=?8
                 WHERE id=?9 AND owner=?10",
                params![
                    record.first_name,
                    record.last_name,
                    record.birth_date.to_string(),
                    record.phone,
                    record.email,
                    record.notification_enabled as i64,
                    times,
                    record.updated_at.to_rfc3339(),
                    record.id,
                    record.owner,
                ],
            )
            .map_err(|e| FestaError::Store(format!("Update birthday: {e}")))?;
        if changed == 0 {
            return Err(FestaError::NotFound(format!("birthday {}", record.id)));
        }
        Ok(())
    }

    async fn delete_birthday(&self, owner: &str, id: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let changed = conn
            .execute(
                "DELETE FROM birthdays WHERE id=?1 AND owner=?2",
                params![id, owner],
            )
            .map_err(|e| FestaError::Store(format!("Delete birthday: {e}")))?;
        Ok(changed > 0)
    }

    async fn get_birthday(&self, owner: &str, id: &str) -> Result<Option<BirthdayRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let raw = match conn.query_row(
            &format!("SELECT {BIRTHDAY_COLS} FROM birthdays WHERE id=?1 AND owner=?2"),
            params![id, owner],
            read_row,
        ) {
            Ok(raw) => raw,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(FestaError::Store(format!("Get birthday: {e}"))),
        };
        Self::hydrate(raw).map(Some)
    }

    async fn list_birthdays(&self, owner: &str) -> Result<Vec<BirthdayRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        // Calendar order, not insertion order
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {BIRTHDAY_COLS} FROM birthdays WHERE owner=?1
                 ORDER BY strftime('%m-%d', birth_date), first_name"
            ))
            .map_err(|e| FestaError::Store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params![owner], read_row)
            .map_err(|e| FestaError::Store(format!("Query: {e}")))?;
        let mut records = Vec::new();
        for raw in rows.flatten() {
            records.push(Self::hydrate(raw)?);
        }
        Ok(records)
    }

    async fn enabled_birthdays(&self, owner: Option<&str>) -> Result<Vec<BirthdayRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let mut records = Vec::new();
        match owner {
            Some(owner) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {BIRTHDAY_COLS} FROM birthdays
                         WHERE notification_enabled=1 AND owner=?1"
                    ))
                    .map_err(|e| FestaError::Store(format!("Prepare: {e}")))?;
                let rows = stmt
                    .query_map(params![owner], read_row)
                    .map_err(|e| FestaError::Store(format!("Query: {e}")))?;
                for raw in rows.flatten() {
                    records.push(Self::hydrate(raw)?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {BIRTHDAY_COLS} FROM birthdays WHERE notification_enabled=1"
                    ))
                    .map_err(|e| FestaError::Store(format!("Prepare: {e}")))?;
                let rows = stmt
                    .query_map([], read_row)
                    .map_err(|e| FestaError::Store(format!("Query: {e}")))?;
                for raw in rows.flatten() {
                    records.push(Self::hydrate(raw)?);
                }
            }
        }
        Ok(records)
    }

    // ── Device registry ──────────────────────────────

    async fn register_device(&self, owner: &str, token: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        conn.execute(
            "INSERT INTO device_tokens (owner, token, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner, token) DO UPDATE SET updated_at=?3",
            params![owner, token, Utc::now().to_rfc3339()],
        )
        .map_err(|e| FestaError::Store(format!("Register device: {e}")))?;
        Ok(())
    }

    async fn unregister_token(&self, token: &str) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let removed = conn
            .execute("DELETE FROM device_tokens WHERE token=?1", params![token])
            .map_err(|e| FestaError::Store(format!("Unregister token: {e}")))?;
        Ok(removed)
    }

    async fn devices_for(&self, owner: &str) -> Result<Vec<DeviceRegistration>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let mut stmt = conn
            .prepare(
                "SELECT owner, token, updated_at FROM device_tokens
                 WHERE owner=?1 ORDER BY updated_at DESC",
            )
            .map_err(|e| FestaError::Store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params![owner], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| FestaError::Store(format!("Query: {e}")))?;
        let mut devices = Vec::new();
        for (owner, token, updated_at) in rows.flatten() {
            devices.push(DeviceRegistration {
                owner,
                token,
                updated_at: parse_ts(&updated_at)?,
            });
        }
        Ok(devices)
    }

    // ── Settings ──────────────────────────────

    async fn notifications_enabled(&self, owner: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        let value = match conn.query_row(
            "SELECT value FROM settings WHERE owner=?1 AND key=?2",
            params![owner, NOTIFY_KEY],
            |row| row.get::<_, String>(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(FestaError::Store(format!("Get setting: {e}"))),
        };
        // Absent ⇒ enabled: only an explicit "false" disables
        Ok(value.as_deref() != Some("false"))
    }

    async fn set_notifications_enabled(&self, owner: &str, enabled: bool) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FestaError::Store(format!("Lock: {e}")))?;
        conn.execute(
            "INSERT INTO settings (owner, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner, key) DO UPDATE SET value=?3, updated_at=?4",
            params![
                owner,
                NOTIFY_KEY,
                if enabled { "true" } else { "false" },
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| FestaError::Store(format!("Set setting: {e}")))?;
        Ok(())
    }
}
