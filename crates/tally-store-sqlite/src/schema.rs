//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS surveys (
    survey_id      TEXT PRIMARY KEY,
    title          TEXT NOT NULL,
    description    TEXT,
    is_anonymous   INTEGER NOT NULL DEFAULT 0,
    is_published   INTEGER NOT NULL DEFAULT 0,
    is_completed   INTEGER NOT NULL DEFAULT 0,
    created_by     TEXT NOT NULL,
    questions_json TEXT NOT NULL,   -- canonical {\"sections\": [...]}
    created_at     TEXT NOT NULL    -- fixed-width RFC 3339 UTC
);

CREATE TABLE IF NOT EXISTS responses (
    response_id  TEXT PRIMARY KEY,
    survey_id    TEXT NOT NULL REFERENCES surveys(survey_id) ON DELETE CASCADE,
    user_id      TEXT,              -- NULL for anonymous surveys
    answers_json TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT
);

-- One response per identified respondent and survey.
CREATE UNIQUE INDEX IF NOT EXISTS responses_respondent_uq
    ON responses(survey_id, user_id) WHERE user_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS responses_survey_created_idx
    ON responses(survey_id, created_at);
CREATE INDEX IF NOT EXISTS surveys_created_idx ON surveys(created_at);

PRAGMA user_version = 1;
";
