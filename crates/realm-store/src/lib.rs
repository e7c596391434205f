//! SQLite persistence for realm state.
//!
//! Characters and rooms round-trip as typed rows; agent memory crosses the
//! boundary as an opaque JSON blob decoded through the queue snapshot
//! codec. A malformed blob degrades to an empty queue instead of failing
//! the load: corrupt agent memory dulls behavior, it does not crash the
//! process.

use std::fmt;
use std::path::Path;

use contracts::{AgentQueueSnapshot, CharacterRecord, EngineConfig, RoomRecord};
use realm_core::agent_queue::decode_snapshot;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug)]
pub struct SqliteWorldStore {
    conn: Connection,
}

impl SqliteWorldStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    // --- engine config ---

    pub fn save_config(&mut self, config: &EngineConfig) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO engine_config (id, schema_version, config_json)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                schema_version = excluded.schema_version,
                config_json = excluded.config_json",
            params![config.schema_version.as_str(), config_json],
        )?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<Option<EngineConfig>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT config_json FROM engine_config WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<EngineConfig>(&raw)?)),
            None => Ok(None),
        }
    }

    // --- rooms ---

    pub fn save_rooms(&mut self, rooms: &[RoomRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for room in rooms {
            let exits_json = serde_json::to_string(&room.exits)?;
            tx.execute(
                "INSERT INTO rooms (room_id, name, exits_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(room_id) DO UPDATE SET
                    name = excluded.name,
                    exits_json = excluded.exits_json",
                params![room.room_id.as_str(), room.name.as_str(), exits_json],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT room_id, name, exits_json FROM rooms ORDER BY room_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut rooms = Vec::new();
        for row in rows {
            let (room_id, name, exits_json) = row?;
            rooms.push(RoomRecord {
                room_id,
                name,
                exits: serde_json::from_str(&exits_json)?,
            });
        }
        Ok(rooms)
    }

    // --- characters ---

    pub fn save_character(&mut self, record: &CharacterRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO characters (
                character_id, name, room_id, hp, max_hp, power, defense,
                alive, is_agent, is_admin
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(character_id) DO UPDATE SET
                name = excluded.name,
                room_id = excluded.room_id,
                hp = excluded.hp,
                max_hp = excluded.max_hp,
                power = excluded.power,
                defense = excluded.defense,
                alive = excluded.alive,
                is_agent = excluded.is_agent,
                is_admin = excluded.is_admin",
            params![
                record.character_id.as_str(),
                record.name.as_str(),
                record.room_id.as_str(),
                record.hp,
                record.max_hp,
                record.power,
                record.defense,
                record.alive as i64,
                record.is_agent as i64,
                record.is_admin as i64,
            ],
        )?;
        Ok(())
    }

    pub fn load_character(
        &self,
        character_id: &str,
    ) -> Result<Option<CharacterRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT character_id, name, room_id, hp, max_hp, power, defense,
                        alive, is_agent, is_admin
                 FROM characters WHERE character_id = ?1",
                params![character_id],
                row_to_character,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn load_characters(&self) -> Result<Vec<CharacterRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT character_id, name, room_id, hp, max_hp, power, defense,
                    alive, is_agent, is_admin
             FROM characters ORDER BY character_id ASC",
        )?;
        let rows = stmt.query_map([], row_to_character)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn delete_character(&mut self, character_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM characters WHERE character_id = ?1",
            params![character_id],
        )?;
        Ok(())
    }

    // --- agent memory blobs ---

    pub fn save_agent_queue(
        &mut self,
        agent_id: &str,
        snapshot: &AgentQueueSnapshot,
    ) -> Result<(), StoreError> {
        let queue_json = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO agent_memory (agent_id, queue_json)
             VALUES (?1, ?2)
             ON CONFLICT(agent_id) DO UPDATE SET
                queue_json = excluded.queue_json",
            params![agent_id, queue_json],
        )?;
        Ok(())
    }

    /// Load an agent's queue snapshot. Unparseable or schema-invalid blobs
    /// come back as an empty snapshot; individual malformed lines inside an
    /// otherwise valid blob are filtered out.
    pub fn load_agent_queue(&self, agent_id: &str) -> Result<AgentQueueSnapshot, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT queue_json FROM agent_memory WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = payload else {
            return Ok(AgentQueueSnapshot::default());
        };
        let blob = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => value,
            Err(_) => return Ok(AgentQueueSnapshot::default()),
        };
        Ok(decode_snapshot(&blob))
    }

    // --- setup ---

    fn configure(&mut self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS engine_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                schema_version TEXT NOT NULL,
                config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rooms (
                room_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                exits_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS characters (
                character_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                room_id TEXT NOT NULL,
                hp INTEGER NOT NULL,
                max_hp INTEGER NOT NULL,
                power INTEGER NOT NULL,
                defense INTEGER NOT NULL,
                alive INTEGER NOT NULL,
                is_agent INTEGER NOT NULL,
                is_admin INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agent_memory (
                agent_id TEXT PRIMARY KEY,
                queue_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_characters_room ON characters(room_id);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name)
             VALUES(1, 'initial_v1')",
            [],
        )?;
        Ok(())
    }
}

fn row_to_character(row: &rusqlite::Row<'_>) -> rusqlite::Result<CharacterRecord> {
    Ok(CharacterRecord {
        character_id: row.get(0)?,
        name: row.get(1)?,
        room_id: row.get(2)?,
        hp: row.get(3)?,
        max_hp: row.get(4)?,
        power: row.get(5)?,
        defense: row.get(6)?,
        alive: row.get::<_, i64>(7)? != 0,
        is_agent: row.get::<_, i64>(8)? != 0,
        is_admin: row.get::<_, i64>(9)? != 0,
    })
}
