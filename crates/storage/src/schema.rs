use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

-- Singleton row holding process-wide mutable pointers.
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    current_election_id BLOB CHECK (current_election_id IS NULL OR length(current_election_id) = 16)
);
INSERT OR IGNORE INTO settings (id, current_election_id) VALUES (1, NULL);

-- Elections are tombstoned on unconfigure, never physically removed.
CREATE TABLE IF NOT EXISTS elections (
    election_id BLOB PRIMARY KEY CHECK (length(election_id) = 16),
    definition BLOB NOT NULL,
    is_official_results INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    deleted_at INTEGER
);

-- Ballot styles normalized out of the definition blob for grouping joins.
CREATE TABLE IF NOT EXISTS ballot_styles (
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    ballot_style_id TEXT NOT NULL,
    party_id TEXT,
    PRIMARY KEY (election_id, ballot_style_id)
);

CREATE TABLE IF NOT EXISTS ballot_style_precincts (
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    ballot_style_id TEXT NOT NULL,
    precinct_id TEXT NOT NULL,
    PRIMARY KEY (election_id, ballot_style_id, precinct_id)
);

CREATE TABLE IF NOT EXISTS scanner_batches (
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    batch_id TEXT NOT NULL,
    scanner_id TEXT NOT NULL,
    label TEXT,
    PRIMARY KEY (election_id, batch_id)
);

CREATE TABLE IF NOT EXISTS cvr_files (
    cvr_file_id BLOB PRIMARY KEY CHECK (length(cvr_file_id) = 16),
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    filename TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    exported_at INTEGER NOT NULL,
    is_test_mode INTEGER NOT NULL,
    precinct_ids BLOB NOT NULL,
    scanner_ids BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (election_id, sha256)
);

CREATE TABLE IF NOT EXISTS cvrs (
    rowid INTEGER PRIMARY KEY,
    cvr_id BLOB NOT NULL UNIQUE CHECK (length(cvr_id) = 16),
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    ballot_id TEXT NOT NULL,
    ballot_style_id TEXT NOT NULL,
    precinct_id TEXT NOT NULL,
    voting_method TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    sheet_number INTEGER CHECK (sheet_number IS NULL OR sheet_number >= 1),
    votes BLOB NOT NULL,
    is_blank INTEGER NOT NULL,
    UNIQUE (election_id, ballot_id)
);
CREATE INDEX IF NOT EXISTS idx_cvrs_election ON cvrs (election_id, rowid);

CREATE TABLE IF NOT EXISTS cvr_file_entries (
    cvr_file_id BLOB NOT NULL CHECK (length(cvr_file_id) = 16),
    cvr_id BLOB NOT NULL CHECK (length(cvr_id) = 16),
    PRIMARY KEY (cvr_file_id, cvr_id)
);
CREATE INDEX IF NOT EXISTS idx_cvr_file_entries_cvr ON cvr_file_entries (cvr_id);

-- At most one of the three outcome columns may be set; all NULL/0 is pending.
CREATE TABLE IF NOT EXISTS write_ins (
    rowid INTEGER PRIMARY KEY,
    write_in_id BLOB NOT NULL UNIQUE CHECK (length(write_in_id) = 16),
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    cvr_id BLOB NOT NULL CHECK (length(cvr_id) = 16),
    contest_id TEXT NOT NULL,
    option_id TEXT NOT NULL,
    side TEXT CHECK (side IS NULL OR side IN ('front', 'back')),
    official_candidate_id TEXT,
    write_in_candidate_id BLOB CHECK (write_in_candidate_id IS NULL OR length(write_in_candidate_id) = 16),
    is_invalid INTEGER NOT NULL DEFAULT 0,
    adjudicated_at INTEGER,
    UNIQUE (cvr_id, contest_id, option_id),
    CHECK (
        (official_candidate_id IS NOT NULL) + (write_in_candidate_id IS NOT NULL) + is_invalid <= 1
    )
);
CREATE INDEX IF NOT EXISTS idx_write_ins_election_contest ON write_ins (election_id, contest_id, rowid);
CREATE INDEX IF NOT EXISTS idx_write_ins_candidate ON write_ins (write_in_candidate_id);

CREATE TABLE IF NOT EXISTS write_in_candidates (
    write_in_candidate_id BLOB PRIMARY KEY CHECK (length(write_in_candidate_id) = 16),
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    contest_id TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (election_id, contest_id, name)
);

CREATE TABLE IF NOT EXISTS manual_results (
    manual_results_id BLOB PRIMARY KEY CHECK (length(manual_results_id) = 16),
    election_id BLOB NOT NULL CHECK (length(election_id) = 16),
    precinct_id TEXT NOT NULL,
    ballot_style_id TEXT NOT NULL,
    voting_method TEXT NOT NULL,
    ballot_count INTEGER NOT NULL,
    contest_results BLOB NOT NULL,
    UNIQUE (election_id, precinct_id, ballot_style_id, voting_method)
);

CREATE TABLE IF NOT EXISTS manual_results_write_in_candidates (
    manual_results_id BLOB NOT NULL CHECK (length(manual_results_id) = 16),
    write_in_candidate_id BLOB NOT NULL CHECK (length(write_in_candidate_id) = 16),
    PRIMARY KEY (manual_results_id, write_in_candidate_id)
);
CREATE INDEX IF NOT EXISTS idx_manual_write_in_refs_candidate
    ON manual_results_write_in_candidates (write_in_candidate_id);
";
