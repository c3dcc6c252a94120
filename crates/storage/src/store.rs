use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension};

use tallyvault_core::election::{ElectionDefinition, ElectionRecord};
use tallyvault_core::ids::*;

use crate::error::StorageError;

/// Convert Vec<u8> to a fixed-size array with proper error handling.
pub(crate) fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub(crate) fn read_uuid(v: Vec<u8>, label: &str) -> Result<uuid::Uuid, StorageError> {
    Ok(uuid::Uuid::from_bytes(to_array::<16>(v, label)?))
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The sole durable, mutable shared resource of the system. Every component
/// reads and writes through it; multi-step mutations run inside a single
/// rusqlite transaction so a mid-sequence failure leaves the store untouched.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn require_live_election(
        conn: &Connection,
        election_id: ElectionId,
    ) -> Result<(), StorageError> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM elections WHERE election_id = ?1 AND deleted_at IS NULL",
                rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(format!("election {election_id}"))),
        }
    }

    pub fn add_election(
        &mut self,
        definition: &ElectionDefinition,
    ) -> Result<ElectionId, StorageError> {
        let election_id = ElectionId::new();
        let blob = definition.to_msgpack()?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO elections (election_id, definition, is_official_results, created_at) VALUES (?1, ?2, 0, ?3)",
            rusqlite::params![
                election_id.as_uuid().as_bytes().as_slice(),
                blob,
                now_millis(),
            ],
        )?;

        for ballot_style in &definition.ballot_styles {
            tx.execute(
                "INSERT INTO ballot_styles (election_id, ballot_style_id, party_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    ballot_style.id.as_str(),
                    ballot_style.party_id.as_ref().map(|p| p.as_str()),
                ],
            )?;
            for precinct_id in &ballot_style.precinct_ids {
                tx.execute(
                    "INSERT INTO ballot_style_precincts (election_id, ballot_style_id, precinct_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![
                        election_id.as_uuid().as_bytes().as_slice(),
                        ballot_style.id.as_str(),
                        precinct_id.as_str(),
                    ],
                )?;
            }
        }

        tx.commit()?;
        log::info!("added election {election_id} ({})", definition.title);
        Ok(election_id)
    }

    pub fn get_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Option<ElectionRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT definition, is_official_results, created_at FROM elections
                 WHERE election_id = ?1 AND deleted_at IS NULL",
                rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((blob, is_official_results, created_at)) => Ok(Some(ElectionRecord {
                id: election_id,
                definition: ElectionDefinition::from_msgpack(&blob)?,
                is_official_results,
                created_at,
            })),
            None => Ok(None),
        }
    }

    /// Live (non-tombstoned) elections, oldest first.
    pub fn list_elections(&self) -> Result<Vec<ElectionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT election_id, definition, is_official_results, created_at FROM elections
             WHERE deleted_at IS NULL ORDER BY created_at, election_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut elections = Vec::new();
        for row in rows {
            let (id_bytes, blob, is_official_results, created_at) = row?;
            elections.push(ElectionRecord {
                id: ElectionId::from_uuid(read_uuid(id_bytes, "election_id")?),
                definition: ElectionDefinition::from_msgpack(&blob)?,
                is_official_results,
                created_at,
            });
        }
        Ok(elections)
    }

    /// Tombstone an election. The row is kept for audit; the current-election
    /// pointer is cleared if it pointed here.
    pub fn delete_election(&mut self, election_id: ElectionId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE elections SET deleted_at = ?1 WHERE election_id = ?2 AND deleted_at IS NULL",
            rusqlite::params![now_millis(), election_id.as_uuid().as_bytes().as_slice()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("election {election_id}")));
        }
        tx.execute(
            "UPDATE settings SET current_election_id = NULL WHERE current_election_id = ?1",
            rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
        )?;
        tx.commit()?;
        log::info!("deleted election {election_id}");
        Ok(())
    }

    pub fn set_current_election(
        &mut self,
        election_id: Option<ElectionId>,
    ) -> Result<(), StorageError> {
        if let Some(id) = election_id {
            Self::require_live_election(&self.conn, id)?;
        }
        self.conn.execute(
            "UPDATE settings SET current_election_id = ?1 WHERE id = 1",
            rusqlite::params![election_id.map(|id| id.as_uuid().as_bytes().to_vec())],
        )?;
        Ok(())
    }

    pub fn get_current_election(&self) -> Result<Option<ElectionId>, StorageError> {
        let bytes: Option<Vec<u8>> = self.conn.query_row(
            "SELECT current_election_id FROM settings WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        match bytes {
            Some(bytes) => Ok(Some(ElectionId::from_uuid(read_uuid(
                bytes,
                "current_election_id",
            )?))),
            None => Ok(None),
        }
    }

    pub fn set_official_results(
        &mut self,
        election_id: ElectionId,
        is_official: bool,
    ) -> Result<(), StorageError> {
        let updated = self.conn.execute(
            "UPDATE elections SET is_official_results = ?1 WHERE election_id = ?2 AND deleted_at IS NULL",
            rusqlite::params![is_official, election_id.as_uuid().as_bytes().as_slice()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("election {election_id}")));
        }
        Ok(())
    }

    pub(crate) fn election_is_official(
        conn: &Connection,
        election_id: ElectionId,
    ) -> Result<bool, StorageError> {
        let is_official: Option<bool> = conn
            .query_row(
                "SELECT is_official_results FROM elections WHERE election_id = ?1 AND deleted_at IS NULL",
                rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        is_official.ok_or_else(|| StorageError::NotFound(format!("election {election_id}")))
    }

    pub(crate) fn election_definition(
        conn: &Connection,
        election_id: ElectionId,
    ) -> Result<ElectionDefinition, StorageError> {
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT definition FROM elections WHERE election_id = ?1 AND deleted_at IS NULL",
                rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(blob) => Ok(ElectionDefinition::from_msgpack(&blob)?),
            None => Err(StorageError::NotFound(format!("election {election_id}"))),
        }
    }
}
