use rusqlite::{Connection, OptionalExtension};

use tallyvault_core::adjudication::{
    WriteInAdjudication, WriteInCandidateRecord, WriteInQueueMetadata, WriteInRecord,
};
use tallyvault_core::cvr::BallotSide;
use tallyvault_core::ids::*;

use crate::error::StorageError;
use crate::store::{Store, now_millis, read_uuid};

fn decode_adjudication(
    official_candidate_id: Option<String>,
    write_in_candidate_id: Option<Vec<u8>>,
    is_invalid: bool,
) -> Result<WriteInAdjudication, StorageError> {
    match (official_candidate_id, write_in_candidate_id, is_invalid) {
        (None, None, false) => Ok(WriteInAdjudication::Pending),
        (None, None, true) => Ok(WriteInAdjudication::Invalid),
        (Some(id), None, false) => Ok(WriteInAdjudication::OfficialCandidate(CandidateId::from(
            id,
        ))),
        (None, Some(bytes), false) => Ok(WriteInAdjudication::WriteInCandidate(
            WriteInCandidateId::from_uuid(read_uuid(bytes, "write_in_candidate_id")?),
        )),
        // The CHECK constraint makes multiple set outcomes unrepresentable.
        _ => Err(StorageError::ConstraintViolation(
            "write-in row has multiple adjudication outcomes".to_string(),
        )),
    }
}

impl Store {
    /// Write-ins for an election (optionally one contest), in ingestion
    /// order. This is the adjudication queue.
    pub fn list_write_ins(
        &self,
        election_id: ElectionId,
        contest_id: Option<&ContestId>,
    ) -> Result<Vec<WriteInRecord>, StorageError> {
        let mut sql = String::from(
            "SELECT write_in_id, cvr_id, contest_id, option_id, side,
                    official_candidate_id, write_in_candidate_id, is_invalid, adjudicated_at
             FROM write_ins WHERE election_id = ?1",
        );
        let mut params: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Blob(
            election_id.as_uuid().as_bytes().to_vec(),
        )];
        if let Some(contest_id) = contest_id {
            sql.push_str(" AND contest_id = ?2");
            params.push(rusqlite::types::Value::Text(
                contest_id.as_str().to_string(),
            ));
        }
        sql.push_str(" ORDER BY rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<Vec<u8>>>(6)?,
                row.get::<_, bool>(7)?,
                row.get::<_, Option<i64>>(8)?,
            ))
        })?;

        let mut write_ins = Vec::new();
        for row in rows {
            let (
                write_in_id_bytes,
                cvr_id_bytes,
                contest_id,
                option_id,
                side,
                official_candidate_id,
                write_in_candidate_id,
                is_invalid,
                adjudicated_at,
            ) = row?;
            write_ins.push(WriteInRecord {
                id: WriteInId::from_uuid(read_uuid(write_in_id_bytes, "write_in_id")?),
                cvr_id: CvrId::from_uuid(read_uuid(cvr_id_bytes, "cvr_id")?),
                contest_id: ContestId::from(contest_id),
                option_id: OptionId::from(option_id),
                side: side.map(|s| BallotSide::from_str(&s)).transpose()?,
                adjudication: decode_adjudication(
                    official_candidate_id,
                    write_in_candidate_id,
                    is_invalid,
                )?,
                adjudicated_at,
            });
        }
        Ok(write_ins)
    }

    /// Earliest pending write-in for a contest, supporting the "review next"
    /// workflow. Pending means no adjudication outcome is set.
    pub fn first_pending_write_in(
        &self,
        election_id: ElectionId,
        contest_id: &ContestId,
    ) -> Result<Option<WriteInId>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT write_in_id FROM write_ins
                 WHERE election_id = ?1 AND contest_id = ?2
                   AND official_candidate_id IS NULL
                   AND write_in_candidate_id IS NULL
                   AND is_invalid = 0
                 ORDER BY rowid LIMIT 1",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    contest_id.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        match bytes {
            Some(bytes) => Ok(Some(WriteInId::from_uuid(read_uuid(
                bytes,
                "write_in_id",
            )?))),
            None => Ok(None),
        }
    }

    /// `(total, pending)` counts per contest that has any write-ins.
    pub fn write_in_queue_metadata(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<WriteInQueueMetadata>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT contest_id,
                    COUNT(*),
                    SUM(official_candidate_id IS NULL
                        AND write_in_candidate_id IS NULL
                        AND is_invalid = 0)
             FROM write_ins WHERE election_id = ?1
             GROUP BY contest_id ORDER BY contest_id",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
            |row| {
                Ok(WriteInQueueMetadata {
                    contest_id: ContestId::from(row.get::<_, String>(0)?),
                    total: row.get(1)?,
                    pending: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Create an ad hoc candidate for adjudication. Names are unique per
    /// contest; an existing name returns the existing record.
    pub fn add_write_in_candidate(
        &mut self,
        election_id: ElectionId,
        contest_id: &ContestId,
        name: &str,
    ) -> Result<WriteInCandidateRecord, StorageError> {
        let existing: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT write_in_candidate_id FROM write_in_candidates
                 WHERE election_id = ?1 AND contest_id = ?2 AND name = ?3",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    contest_id.as_str(),
                    name,
                ],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(bytes) = existing {
            return Ok(WriteInCandidateRecord {
                id: WriteInCandidateId::from_uuid(read_uuid(bytes, "write_in_candidate_id")?),
                contest_id: contest_id.clone(),
                name: name.to_string(),
            });
        }

        let id = WriteInCandidateId::new();
        self.conn.execute(
            "INSERT INTO write_in_candidates (write_in_candidate_id, election_id, contest_id, name)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                id.as_uuid().as_bytes().as_slice(),
                election_id.as_uuid().as_bytes().as_slice(),
                contest_id.as_str(),
                name,
            ],
        )?;
        Ok(WriteInCandidateRecord {
            id,
            contest_id: contest_id.clone(),
            name: name.to_string(),
        })
    }

    pub fn list_write_in_candidates(
        &self,
        election_id: ElectionId,
        contest_id: Option<&ContestId>,
    ) -> Result<Vec<WriteInCandidateRecord>, StorageError> {
        let mut sql = String::from(
            "SELECT write_in_candidate_id, contest_id, name FROM write_in_candidates
             WHERE election_id = ?1",
        );
        let mut params: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Blob(
            election_id.as_uuid().as_bytes().to_vec(),
        )];
        if let Some(contest_id) = contest_id {
            sql.push_str(" AND contest_id = ?2");
            params.push(rusqlite::types::Value::Text(
                contest_id.as_str().to_string(),
            ));
        }
        sql.push_str(" ORDER BY contest_id, name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (id_bytes, contest_id, name) = row?;
            candidates.push(WriteInCandidateRecord {
                id: WriteInCandidateId::from_uuid(read_uuid(id_bytes, "write_in_candidate_id")?),
                contest_id: ContestId::from(contest_id),
                name,
            });
        }
        Ok(candidates)
    }

    /// Record an adjudication decision. Sets exactly the columns the decision
    /// implies, clears the others, and stamps the decision time. Moving a
    /// write-in off a write-in candidate deletes that candidate in the same
    /// transaction when its last reference is gone.
    pub fn adjudicate_write_in(
        &mut self,
        write_in_id: WriteInId,
        decision: &WriteInAdjudication,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;

        let current = tx
            .query_row(
                "SELECT election_id, write_in_candidate_id FROM write_ins WHERE write_in_id = ?1",
                rusqlite::params![write_in_id.as_uuid().as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                    ))
                },
            )
            .optional()?;
        let Some((election_id_bytes, previous_candidate_bytes)) = current else {
            return Err(StorageError::NotFound(format!("write-in {write_in_id}")));
        };
        let election_id = ElectionId::from_uuid(read_uuid(election_id_bytes, "election_id")?);
        let previous_candidate = previous_candidate_bytes
            .map(|bytes| read_uuid(bytes, "write_in_candidate_id").map(WriteInCandidateId::from_uuid))
            .transpose()?;

        let (official_candidate_id, write_in_candidate_id, is_invalid, adjudicated_at) =
            match decision {
                WriteInAdjudication::Pending => (None, None, false, None),
                WriteInAdjudication::Invalid => (None, None, true, Some(now_millis())),
                WriteInAdjudication::OfficialCandidate(candidate_id) => {
                    (Some(candidate_id.clone()), None, false, Some(now_millis()))
                }
                WriteInAdjudication::WriteInCandidate(candidate_id) => {
                    let exists: Option<i64> = tx
                        .query_row(
                            "SELECT 1 FROM write_in_candidates
                             WHERE write_in_candidate_id = ?1 AND election_id = ?2",
                            rusqlite::params![
                                candidate_id.as_uuid().as_bytes().as_slice(),
                                election_id.as_uuid().as_bytes().as_slice(),
                            ],
                            |row| row.get(0),
                        )
                        .optional()?;
                    if exists.is_none() {
                        return Err(StorageError::NotFound(format!(
                            "write-in candidate {candidate_id}"
                        )));
                    }
                    (None, Some(*candidate_id), false, Some(now_millis()))
                }
            };

        tx.execute(
            "UPDATE write_ins SET
                 official_candidate_id = ?1,
                 write_in_candidate_id = ?2,
                 is_invalid = ?3,
                 adjudicated_at = ?4
             WHERE write_in_id = ?5",
            rusqlite::params![
                official_candidate_id.as_ref().map(|id| id.as_str()),
                write_in_candidate_id.map(|id| id.as_uuid().as_bytes().to_vec()),
                is_invalid,
                adjudicated_at,
                write_in_id.as_uuid().as_bytes().as_slice(),
            ],
        )?;

        if let Some(previous) = previous_candidate {
            if write_in_candidate_id != Some(previous) {
                delete_write_in_candidate_if_orphaned(&tx, previous)?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// Delete one write-in candidate if nothing references it anymore. Runs
/// inside the mutation's transaction so cleanup is immediate and
/// deterministic, never deferred to a sweep.
pub(crate) fn delete_write_in_candidate_if_orphaned(
    conn: &Connection,
    candidate_id: WriteInCandidateId,
) -> Result<(), StorageError> {
    let deleted = conn.execute(
        "DELETE FROM write_in_candidates
         WHERE write_in_candidate_id = ?1
           AND NOT EXISTS (SELECT 1 FROM write_ins w
                           WHERE w.write_in_candidate_id = write_in_candidates.write_in_candidate_id)
           AND NOT EXISTS (SELECT 1 FROM manual_results_write_in_candidates m
                           WHERE m.write_in_candidate_id = write_in_candidates.write_in_candidate_id)",
        rusqlite::params![candidate_id.as_uuid().as_bytes().as_slice()],
    )?;
    if deleted > 0 {
        log::info!("deleted orphaned write-in candidate {candidate_id}");
    }
    Ok(())
}

/// Election-wide variant used by bulk deletes.
pub(crate) fn delete_orphaned_write_in_candidates(
    conn: &Connection,
    election_id: ElectionId,
) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM write_in_candidates
         WHERE election_id = ?1
           AND NOT EXISTS (SELECT 1 FROM write_ins w
                           WHERE w.write_in_candidate_id = write_in_candidates.write_in_candidate_id)
           AND NOT EXISTS (SELECT 1 FROM manual_results_write_in_candidates m
                           WHERE m.write_in_candidate_id = write_in_candidates.write_in_candidate_id)",
        rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
    )?;
    Ok(())
}
