use std::collections::VecDeque;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use tallyvault_core::cvr::{
    CvrInsert, CvrTuple, VotingMethod, is_write_in_option, votes_are_blank, votes_from_msgpack,
    votes_to_msgpack,
};
use tallyvault_core::filter::CvrFilter;
use tallyvault_core::ids::*;

use crate::error::StorageError;
use crate::filter_sql::{CVR_JOINS, cvr_filter_clause};
use crate::store::{Store, now_millis, read_uuid};

/// Content hash identifying an imported CVR file, lowercase hex.
pub fn sha256_hex(contents: &[u8]) -> String {
    let digest = Sha256::digest(contents);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvrFileInsert {
    pub filename: String,
    pub sha256: String,
    pub exported_at: i64,
    pub is_test_mode: bool,
    pub precinct_ids: Vec<PrecinctId>,
    pub scanner_ids: Vec<ScannerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvrFileRecord {
    pub id: CvrFileId,
    pub filename: String,
    pub sha256: String,
    pub exported_at: i64,
    pub is_test_mode: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvrFileOutcome {
    pub id: CvrFileId,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvrIngestOutcome {
    pub cvr_id: CvrId,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerBatchRecord {
    pub batch_id: BatchId,
    pub scanner_id: ScannerId,
    pub label: Option<String>,
}

impl Store {
    /// Register an imported CVR file. Import is idempotent by content hash:
    /// the same file contents for the same election return the existing
    /// record with `is_new = false`.
    pub fn add_cvr_file(
        &mut self,
        election_id: ElectionId,
        file: &CvrFileInsert,
    ) -> Result<CvrFileOutcome, StorageError> {
        if Store::election_is_official(&self.conn, election_id)? {
            return Err(StorageError::ConstraintViolation(format!(
                "election {election_id} results are official; CVR ingestion is closed"
            )));
        }

        let existing: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT cvr_file_id FROM cvr_files WHERE election_id = ?1 AND sha256 = ?2",
                rusqlite::params![election_id.as_uuid().as_bytes().as_slice(), file.sha256],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(bytes) = existing {
            let id = CvrFileId::from_uuid(read_uuid(bytes, "cvr_file_id")?);
            log::info!("cvr file {} already imported as {id}", file.sha256);
            return Ok(CvrFileOutcome { id, is_new: false });
        }

        let id = CvrFileId::new();
        let precinct_ids: Vec<&str> = file.precinct_ids.iter().map(|p| p.as_str()).collect();
        let scanner_ids: Vec<&str> = file.scanner_ids.iter().map(|s| s.as_str()).collect();
        self.conn.execute(
            "INSERT INTO cvr_files
                 (cvr_file_id, election_id, filename, sha256, exported_at, is_test_mode,
                  precinct_ids, scanner_ids, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id.as_uuid().as_bytes().as_slice(),
                election_id.as_uuid().as_bytes().as_slice(),
                file.filename,
                file.sha256,
                file.exported_at,
                file.is_test_mode,
                rmp_serde::to_vec(&precinct_ids)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                rmp_serde::to_vec(&scanner_ids)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                now_millis(),
            ],
        )?;
        log::info!("imported cvr file {} as {id}", file.filename);
        Ok(CvrFileOutcome { id, is_new: true })
    }

    pub fn list_cvr_files(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<CvrFileRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT cvr_file_id, filename, sha256, exported_at, is_test_mode, created_at
             FROM cvr_files WHERE election_id = ?1 ORDER BY created_at, cvr_file_id",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
            |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )?;

        let mut files = Vec::new();
        for row in rows {
            let (id_bytes, filename, sha256, exported_at, is_test_mode, created_at) = row?;
            files.push(CvrFileRecord {
                id: CvrFileId::from_uuid(read_uuid(id_bytes, "cvr_file_id")?),
                filename,
                sha256,
                exported_at,
                is_test_mode,
                created_at,
            });
        }
        Ok(files)
    }

    /// Ingest one CVR from a file. A previously unseen `(election, ballot
    /// id)` inserts the record, its file link, its batch, and its pending
    /// write-ins atomically. A duplicate identity with byte-identical payload
    /// only links the file; a duplicate identity with any differing field is
    /// a hard conflict and leaves the store untouched.
    pub fn add_cvr(
        &mut self,
        election_id: ElectionId,
        cvr_file_id: CvrFileId,
        cvr: &CvrInsert,
    ) -> Result<CvrIngestOutcome, StorageError> {
        if Store::election_is_official(&self.conn, election_id)? {
            return Err(StorageError::ConstraintViolation(format!(
                "election {election_id} results are official; CVR ingestion is closed"
            )));
        }

        let votes_blob = votes_to_msgpack(&cvr.votes)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO scanner_batches (election_id, batch_id, scanner_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (election_id, batch_id) DO NOTHING",
            rusqlite::params![
                election_id.as_uuid().as_bytes().as_slice(),
                cvr.batch_id.as_str(),
                cvr.scanner_id.as_str(),
            ],
        )?;

        let existing = tx
            .query_row(
                "SELECT cvr_id, ballot_style_id, precinct_id, voting_method, batch_id,
                        sheet_number, votes
                 FROM cvrs WHERE election_id = ?1 AND ballot_id = ?2",
                rusqlite::params![
                    election_id.as_uuid().as_bytes().as_slice(),
                    cvr.ballot_id.as_str(),
                ],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<u32>>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                    ))
                },
            )
            .optional()?;

        if let Some((
            cvr_id_bytes,
            ballot_style_id,
            precinct_id,
            voting_method,
            batch_id,
            sheet_number,
            stored_votes,
        )) = existing
        {
            let identical = ballot_style_id == cvr.ballot_style_id.as_str()
                && precinct_id == cvr.precinct_id.as_str()
                && voting_method == cvr.voting_method.as_str()
                && batch_id == cvr.batch_id.as_str()
                && sheet_number == cvr.sheet_number
                && stored_votes == votes_blob;
            if !identical {
                log::warn!("conflicting re-ingest of ballot {}", cvr.ballot_id);
                return Err(StorageError::BallotIdConflict {
                    ballot_id: cvr.ballot_id.as_str().to_string(),
                });
            }

            let cvr_id = CvrId::from_uuid(read_uuid(cvr_id_bytes, "cvr_id")?);
            link_cvr_to_file(&tx, cvr_file_id, cvr_id)?;
            tx.commit()?;
            return Ok(CvrIngestOutcome {
                cvr_id,
                is_new: false,
            });
        }

        let cvr_id = CvrId::new();
        tx.execute(
            "INSERT INTO cvrs
                 (cvr_id, election_id, ballot_id, ballot_style_id, precinct_id, voting_method,
                  batch_id, sheet_number, votes, is_blank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                cvr_id.as_uuid().as_bytes().as_slice(),
                election_id.as_uuid().as_bytes().as_slice(),
                cvr.ballot_id.as_str(),
                cvr.ballot_style_id.as_str(),
                cvr.precinct_id.as_str(),
                cvr.voting_method.as_str(),
                cvr.batch_id.as_str(),
                cvr.sheet_number,
                votes_blob,
                votes_are_blank(&cvr.votes),
            ],
        )?;
        link_cvr_to_file(&tx, cvr_file_id, cvr_id)?;

        // Unresolved write-in marks enter the adjudication queue in ingestion
        // order, exactly once per CVR. A mark inside an overvoted contest is
        // never counted, so it is not queued for review either.
        let needs_definition = cvr
            .votes
            .iter()
            .any(|(_, options)| options.len() > 1 && options.iter().any(is_write_in_option));
        let definition = if needs_definition {
            Some(Store::election_definition(&tx, election_id)?)
        } else {
            None
        };
        for (contest_id, options) in &cvr.votes {
            if let Some(definition) = &definition {
                let allowed = definition
                    .contest(contest_id)
                    .map_or(1, |contest| contest.votes_allowed());
                if options.len() as u32 > allowed {
                    continue;
                }
            }
            for option in options {
                if !is_write_in_option(option) {
                    continue;
                }
                tx.execute(
                    "INSERT INTO write_ins
                         (write_in_id, election_id, cvr_id, contest_id, option_id, side)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        WriteInId::new().as_uuid().as_bytes().as_slice(),
                        election_id.as_uuid().as_bytes().as_slice(),
                        cvr_id.as_uuid().as_bytes().as_slice(),
                        contest_id.as_str(),
                        option.as_str(),
                        cvr.side.map(|s| s.as_str()),
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(CvrIngestOutcome {
            cvr_id,
            is_new: true,
        })
    }

    pub fn list_scanner_batches(
        &self,
        election_id: ElectionId,
    ) -> Result<Vec<ScannerBatchRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT batch_id, scanner_id, label FROM scanner_batches
             WHERE election_id = ?1 ORDER BY scanner_id, batch_id",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![election_id.as_uuid().as_bytes().as_slice()],
            |row| {
                Ok(ScannerBatchRecord {
                    batch_id: BatchId::from(row.get::<_, String>(0)?),
                    scanner_id: ScannerId::from(row.get::<_, String>(1)?),
                    label: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Remove every CVR file for an election, plus everything that becomes
    /// unreferenced as a result: CVRs with no remaining file link, their
    /// write-ins, write-in candidates with no remaining reference, and
    /// batches with no remaining CVRs. One transaction; all or nothing.
    pub fn delete_all_cvr_files(&mut self, election_id: ElectionId) -> Result<(), StorageError> {
        let election = election_id.as_uuid().as_bytes().as_slice();
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM cvr_file_entries WHERE cvr_file_id IN
                 (SELECT cvr_file_id FROM cvr_files WHERE election_id = ?1)",
            rusqlite::params![election],
        )?;
        let files = tx.execute(
            "DELETE FROM cvr_files WHERE election_id = ?1",
            rusqlite::params![election],
        )?;
        tx.execute(
            "DELETE FROM write_ins WHERE election_id = ?1 AND NOT EXISTS
                 (SELECT 1 FROM cvr_file_entries e WHERE e.cvr_id = write_ins.cvr_id)",
            rusqlite::params![election],
        )?;
        let cvrs = tx.execute(
            "DELETE FROM cvrs WHERE election_id = ?1 AND NOT EXISTS
                 (SELECT 1 FROM cvr_file_entries e WHERE e.cvr_id = cvrs.cvr_id)",
            rusqlite::params![election],
        )?;
        crate::write_ins::delete_orphaned_write_in_candidates(&tx, election_id)?;
        tx.execute(
            "DELETE FROM scanner_batches WHERE election_id = ?1 AND NOT EXISTS
                 (SELECT 1 FROM cvrs c WHERE c.election_id = scanner_batches.election_id
                    AND c.batch_id = scanner_batches.batch_id)",
            rusqlite::params![election],
        )?;

        tx.commit()?;
        log::info!("deleted {files} cvr files and {cvrs} cvrs for election {election_id}");
        Ok(())
    }

    /// Lazy, finite, single-pass stream of CVR tuples matching the filter.
    /// Rows are fetched in bounded batches keyed on rowid, so the full result
    /// set is never materialized; callers fold incrementally and consume the
    /// stream exactly once.
    pub fn stream_cvrs(&self, election_id: ElectionId, filter: &CvrFilter) -> CvrStream<'_> {
        let clause = cvr_filter_clause(filter);
        let sql = format!(
            "SELECT c.rowid, c.cvr_id, c.ballot_id, c.ballot_style_id, bs.party_id,
                    c.precinct_id, c.voting_method, c.batch_id, sb.scanner_id,
                    c.sheet_number, c.votes, c.is_blank
             FROM cvrs c{CVR_JOINS}
             WHERE c.election_id = ?1 AND c.rowid > ?2{}
             ORDER BY c.rowid
             LIMIT {CVR_STREAM_BATCH}",
            clause.sql
        );
        CvrStream {
            conn: &self.conn,
            sql,
            election_id,
            filter_params: clause.params,
            last_rowid: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

fn link_cvr_to_file(
    tx: &rusqlite::Transaction,
    cvr_file_id: CvrFileId,
    cvr_id: CvrId,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT OR IGNORE INTO cvr_file_entries (cvr_file_id, cvr_id) VALUES (?1, ?2)",
        rusqlite::params![
            cvr_file_id.as_uuid().as_bytes().as_slice(),
            cvr_id.as_uuid().as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

const CVR_STREAM_BATCH: usize = 512;

pub struct CvrStream<'conn> {
    conn: &'conn Connection,
    sql: String,
    election_id: ElectionId,
    filter_params: Vec<Value>,
    last_rowid: i64,
    buffer: VecDeque<CvrTuple>,
    done: bool,
}

impl CvrStream<'_> {
    fn fetch_batch(&mut self) -> Result<(), StorageError> {
        let mut params = Vec::with_capacity(self.filter_params.len() + 2);
        params.push(Value::Blob(
            self.election_id.as_uuid().as_bytes().to_vec(),
        ));
        params.push(Value::Integer(self.last_rowid));
        params.extend(self.filter_params.iter().cloned());

        let mut stmt = self.conn.prepare(&self.sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Option<u32>>(9)?,
                row.get::<_, Vec<u8>>(10)?,
                row.get::<_, bool>(11)?,
            ))
        })?;

        let mut fetched = 0usize;
        for row in rows {
            let (
                rowid,
                cvr_id_bytes,
                ballot_id,
                ballot_style_id,
                party_id,
                precinct_id,
                voting_method,
                batch_id,
                scanner_id,
                sheet_number,
                votes_blob,
                is_blank,
            ) = row?;
            self.last_rowid = rowid;
            fetched += 1;
            self.buffer.push_back(CvrTuple {
                cvr_id: CvrId::from_uuid(read_uuid(cvr_id_bytes, "cvr_id")?),
                ballot_id: BallotId::from(ballot_id),
                ballot_style_id: BallotStyleId::from(ballot_style_id),
                party_id: party_id.map(PartyId::from),
                precinct_id: PrecinctId::from(precinct_id),
                voting_method: VotingMethod::from_str(&voting_method)?,
                batch_id: BatchId::from(batch_id),
                scanner_id: ScannerId::from(scanner_id),
                sheet_number,
                votes: votes_from_msgpack(&votes_blob)?,
                is_blank,
            });
        }
        if fetched < CVR_STREAM_BATCH {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for CvrStream<'_> {
    type Item = Result<CvrTuple, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch_batch() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
