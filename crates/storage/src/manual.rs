use std::collections::BTreeSet;

use rusqlite::OptionalExtension;

use tallyvault_core::cvr::VotingMethod;
use tallyvault_core::ids::*;
use tallyvault_core::results::ManualResults;

use crate::error::StorageError;
use crate::store::{Store, read_uuid};
use crate::write_ins::delete_write_in_candidate_if_orphaned;

/// The key under which a manual tally is stored: at most one record exists
/// per triple per election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualResultsKey {
    pub precinct_id: PrecinctId,
    pub ballot_style_id: BallotStyleId,
    pub voting_method: VotingMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualResultsRecord {
    pub id: ManualResultsId,
    pub key: ManualResultsKey,
    pub results: ManualResults,
}

impl Store {
    /// Upsert the manual tally for a `(precinct, ballot style, voting
    /// method)` triple. Replaces ballot count and contest results atomically,
    /// rewrites the write-in-candidate reference links, and deletes any
    /// candidate whose last reference this replacement removed.
    pub fn set_manual_results(
        &mut self,
        election_id: ElectionId,
        key: &ManualResultsKey,
        results: &ManualResults,
    ) -> Result<ManualResultsId, StorageError> {
        Store::require_live_election(&self.conn, election_id)?;
        let blob = results.to_msgpack()?;
        let new_refs = results.referenced_write_in_candidates();
        let tx = self.conn.transaction()?;

        // Every referenced candidate must already exist; manual entry uses
        // the same candidate records adjudication does.
        for candidate_id in &new_refs {
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
        }

        let existing: Option<Vec<u8>> = tx
            .query_row(
                "SELECT manual_results_id FROM manual_results
                 WHERE election_id = ?1 AND precinct_id = ?2
                   AND ballot_style_id = ?3 AND voting_method = ?4",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    key.precinct_id.as_str(),
                    key.ballot_style_id.as_str(),
                    key.voting_method.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        let (id, previous_refs) = match existing {
            Some(bytes) => {
                let id = ManualResultsId::from_uuid(read_uuid(bytes, "manual_results_id")?);
                let previous_refs = referenced_candidates(&tx, id)?;
                tx.execute(
                    "UPDATE manual_results SET ballot_count = ?1, contest_results = ?2
                     WHERE manual_results_id = ?3",
                    rusqlite::params![
                        results.ballot_count,
                        blob,
                        id.as_uuid().as_bytes().as_slice(),
                    ],
                )?;
                tx.execute(
                    "DELETE FROM manual_results_write_in_candidates WHERE manual_results_id = ?1",
                    rusqlite::params![id.as_uuid().as_bytes().as_slice()],
                )?;
                (id, previous_refs)
            }
            None => {
                let id = ManualResultsId::new();
                tx.execute(
                    "INSERT INTO manual_results
                         (manual_results_id, election_id, precinct_id, ballot_style_id,
                          voting_method, ballot_count, contest_results)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id.as_uuid().as_bytes().as_slice(),
                        election_id.as_uuid().as_bytes().as_slice(),
                        key.precinct_id.as_str(),
                        key.ballot_style_id.as_str(),
                        key.voting_method.as_str(),
                        results.ballot_count,
                        blob,
                    ],
                )?;
                (id, BTreeSet::new())
            }
        };

        for candidate_id in &new_refs {
            tx.execute(
                "INSERT INTO manual_results_write_in_candidates
                     (manual_results_id, write_in_candidate_id)
                 VALUES (?1, ?2)",
                rusqlite::params![
                    id.as_uuid().as_bytes().as_slice(),
                    candidate_id.as_uuid().as_bytes().as_slice(),
                ],
            )?;
        }
        for dropped in previous_refs.difference(&new_refs) {
            delete_write_in_candidate_if_orphaned(&tx, *dropped)?;
        }

        tx.commit()?;
        Ok(id)
    }

    pub fn get_manual_results(
        &self,
        election_id: ElectionId,
        key: &ManualResultsKey,
    ) -> Result<Option<ManualResultsRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT manual_results_id, ballot_count, contest_results FROM manual_results
                 WHERE election_id = ?1 AND precinct_id = ?2
                   AND ballot_style_id = ?3 AND voting_method = ?4",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    key.precinct_id.as_str(),
                    key.ballot_style_id.as_str(),
                    key.voting_method.as_str(),
                ],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id_bytes, _ballot_count, blob)) => Ok(Some(ManualResultsRecord {
                id: ManualResultsId::from_uuid(read_uuid(id_bytes, "manual_results_id")?),
                key: key.clone(),
                results: ManualResults::from_msgpack(&blob)?,
            })),
            None => Ok(None),
        }
    }

    /// All manual tallies for an election, in report order.
    pub fn list_manual_results(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<ManualResultsRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT manual_results_id, precinct_id, ballot_style_id, voting_method, contest_results
             FROM manual_results WHERE election_id = ?1
             ORDER BY precinct_id, ballot_style_id, voting_method",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
            |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (id_bytes, precinct_id, ballot_style_id, voting_method, blob) = row?;
            records.push(ManualResultsRecord {
                id: ManualResultsId::from_uuid(read_uuid(id_bytes, "manual_results_id")?),
                key: ManualResultsKey {
                    precinct_id: PrecinctId::from(precinct_id),
                    ballot_style_id: BallotStyleId::from(ballot_style_id),
                    voting_method: VotingMethod::from_str(&voting_method)?,
                },
                results: ManualResults::from_msgpack(&blob)?,
            });
        }
        Ok(records)
    }

    pub fn delete_manual_results(
        &mut self,
        election_id: ElectionId,
        key: &ManualResultsKey,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;

        let existing: Option<Vec<u8>> = tx
            .query_row(
                "SELECT manual_results_id FROM manual_results
                 WHERE election_id = ?1 AND precinct_id = ?2
                   AND ballot_style_id = ?3 AND voting_method = ?4",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    key.precinct_id.as_str(),
                    key.ballot_style_id.as_str(),
                    key.voting_method.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id_bytes) = existing else {
            return Err(StorageError::NotFound(format!(
                "manual results for precinct {} / style {} / {}",
                key.precinct_id,
                key.ballot_style_id,
                key.voting_method.as_str(),
            )));
        };
        let id = ManualResultsId::from_uuid(read_uuid(id_bytes, "manual_results_id")?);

        let refs = referenced_candidates(&tx, id)?;
        tx.execute(
            "DELETE FROM manual_results_write_in_candidates WHERE manual_results_id = ?1",
            rusqlite::params![id.as_uuid().as_bytes().as_slice()],
        )?;
        tx.execute(
            "DELETE FROM manual_results WHERE manual_results_id = ?1",
            rusqlite::params![id.as_uuid().as_bytes().as_slice()],
        )?;
        for candidate_id in refs {
            delete_write_in_candidate_if_orphaned(&tx, candidate_id)?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn referenced_candidates(
    conn: &rusqlite::Connection,
    manual_results_id: ManualResultsId,
) -> Result<BTreeSet<WriteInCandidateId>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT write_in_candidate_id FROM manual_results_write_in_candidates
         WHERE manual_results_id = ?1",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![manual_results_id.as_uuid().as_bytes().as_slice()],
        |row| row.get::<_, Vec<u8>>(0),
    )?;

    let mut refs = BTreeSet::new();
    for row in rows {
        refs.insert(WriteInCandidateId::from_uuid(read_uuid(
            row?,
            "write_in_candidate_id",
        )?));
    }
    Ok(refs)
}
