//! [`SqliteStore`]: the SQLite implementation of [`SurveyStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  range::DateRange,
  response::{Answers, NewResponse, Response},
  store::{Order, ResponseQuery, SubmitOutcome, SurveyStore},
  survey::{NewSurvey, Survey, SurveyPatch},
};

use crate::{
  Result,
  encode::{
    RESPONSE_COLUMNS, RawResponse, RawSurvey, SURVEY_COLUMNS, encode_answers,
    encode_dt, encode_questions, encode_uuid, now,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally survey store backed by a single SQLite file.
///
/// Cloning shares the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, as used by the tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Write every mutable column of `survey` back to its row.
  async fn write_survey(&self, survey: &Survey) -> Result<()> {
    let id_str         = encode_uuid(survey.id);
    let title          = survey.title.clone();
    let description    = survey.description.clone();
    let is_anonymous   = survey.is_anonymous;
    let is_published   = survey.is_published;
    let is_completed   = survey.is_completed;
    let questions_json = encode_questions(&survey.questions)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE surveys
              SET title = ?2, description = ?3, is_anonymous = ?4,
                  is_published = ?5, is_completed = ?6, questions_json = ?7
            WHERE survey_id = ?1",
          rusqlite::params![
            id_str,
            title,
            description,
            is_anonymous,
            is_published,
            is_completed,
            questions_json,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_response(&self, id: Uuid) -> Result<Option<Response>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawResponse> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RESPONSE_COLUMNS} FROM responses WHERE response_id = ?1"),
              rusqlite::params![id_str],
              RawResponse::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawResponse::into_response).transpose()
  }

  /// Overwrite a response's `created_at`; lets tests place rows in time.
  #[cfg(test)]
  pub(crate) async fn set_response_created_at(
    &self,
    id: Uuid,
    at: chrono::DateTime<chrono::Utc>,
  ) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE responses SET created_at = ?2 WHERE response_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Encoded `(start, end)` bounds; `NULL` disables the corresponding filter.
fn encode_range(range: DateRange) -> (Option<String>, Option<String>) {
  (range.start.map(encode_dt), range.end.map(encode_dt))
}

const RANGE_FILTER: &str = "survey_id = ?1
   AND (?2 IS NULL OR created_at >= ?2)
   AND (?3 IS NULL OR created_at <= ?3)";

// ─── SurveyStore impl ────────────────────────────────────────────────────────

impl SurveyStore for SqliteStore {
  type Error = crate::Error;

  // ── Surveys ───────────────────────────────────────────────────────────────

  async fn create_survey(&self, input: NewSurvey) -> Result<Survey> {
    let survey = Survey {
      id:           Uuid::new_v4(),
      title:        input.title,
      description:  input.description,
      is_anonymous: input.is_anonymous,
      is_published: false,
      is_completed: false,
      created_by:   input.created_by,
      questions:    input.questions,
      created_at:   now(),
    };

    let id_str         = encode_uuid(survey.id);
    let title          = survey.title.clone();
    let description    = survey.description.clone();
    let is_anonymous   = survey.is_anonymous;
    let created_by     = survey.created_by.clone();
    let questions_json = encode_questions(&survey.questions)?;
    let at_str         = encode_dt(survey.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO surveys (
             survey_id, title, description, is_anonymous,
             created_by, questions_json, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            title,
            description,
            is_anonymous,
            created_by,
            questions_json,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(survey)
  }

  async fn get_survey(&self, id: Uuid) -> Result<Option<Survey>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSurvey> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SURVEY_COLUMNS} FROM surveys WHERE survey_id = ?1"),
              rusqlite::params![id_str],
              RawSurvey::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSurvey::into_survey).transpose()
  }

  async fn list_surveys(&self, published_only: bool) -> Result<Vec<Survey>> {
    let raws: Vec<RawSurvey> = self
      .conn
      .call(move |conn| {
        let filter = if published_only { "WHERE is_published = 1" } else { "" };
        let mut stmt = conn.prepare(&format!(
          "SELECT {SURVEY_COLUMNS} FROM surveys {filter} ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map([], RawSurvey::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSurvey::into_survey).collect()
  }

  async fn update_survey(&self, id: Uuid, patch: SurveyPatch) -> Result<Option<Survey>> {
    let Some(mut survey) = self.get_survey(id).await? else {
      return Ok(None);
    };
    survey.apply(patch);
    self.write_survey(&survey).await?;
    Ok(Some(survey))
  }

  async fn delete_survey(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM responses WHERE survey_id = ?1",
          rusqlite::params![id_str],
        )?;
        let n = tx.execute(
          "DELETE FROM surveys WHERE survey_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.commit()?;
        Ok(n > 0)
      })
      .await?;

    Ok(deleted)
  }

  // ── Responses ─────────────────────────────────────────────────────────────

  async fn submit_response(&self, input: NewResponse) -> Result<SubmitOutcome> {
    let response = Response {
      id:         Uuid::new_v4(),
      survey_id:  input.survey_id,
      user_id:    input.user_id,
      data:       input.data,
      created_at: now(),
      updated_at: None,
    };

    let id_str        = encode_uuid(response.id);
    let survey_id_str = encode_uuid(response.survey_id);
    let user_id       = response.user_id.clone();
    let answers_json  = encode_answers(&response.data)?;
    let at_str        = encode_dt(response.created_at);

    // The partial unique index on (survey_id, user_id) is the arbiter; no
    // pre-check, so concurrent submissions cannot both succeed.
    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO responses (response_id, survey_id, user_id, answers_json, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, survey_id_str, user_id, answers_json, at_str],
        );
        match result {
          Ok(_) => Ok(true),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
          {
            Ok(false)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(if inserted {
      SubmitOutcome::Created(response)
    } else {
      SubmitOutcome::AlreadySubmitted
    })
  }

  async fn find_respondent_response(
    &self,
    survey_id: Uuid,
    user_id: &str,
  ) -> Result<Option<Response>> {
    let survey_id_str = encode_uuid(survey_id);
    let user_id       = user_id.to_owned();

    let raw: Option<RawResponse> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RESPONSE_COLUMNS} FROM responses
                  WHERE survey_id = ?1 AND user_id = ?2"
              ),
              rusqlite::params![survey_id_str, user_id],
              RawResponse::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawResponse::into_response).transpose()
  }

  async fn update_response_answers(
    &self,
    response_id: Uuid,
    data: Answers,
  ) -> Result<Option<Response>> {
    let id_str       = encode_uuid(response_id);
    let answers_json = encode_answers(&data)?;
    let at_str       = encode_dt(now());

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE responses SET answers_json = ?2, updated_at = ?3 WHERE response_id = ?1",
          rusqlite::params![id_str, answers_json, at_str],
        )?;
        Ok(n > 0)
      })
      .await?;

    if !changed {
      return Ok(None);
    }
    self.get_response(response_id).await
  }

  async fn find_responses(
    &self,
    survey_id: Uuid,
    query: ResponseQuery,
  ) -> Result<Vec<Response>> {
    let survey_id_str = encode_uuid(survey_id);
    let (start, end)  = encode_range(query.range);
    let direction     = match query.order {
      Order::Oldest => "ASC",
      Order::Newest => "DESC",
    };

    let raws: Vec<RawResponse> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RESPONSE_COLUMNS} FROM responses
            WHERE {RANGE_FILTER}
            ORDER BY created_at {direction}, response_id {direction}"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![survey_id_str, start, end],
            RawResponse::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawResponse::into_response).collect()
  }

  async fn count_responses(&self, survey_id: Uuid, range: DateRange) -> Result<u64> {
    let survey_id_str = encode_uuid(survey_id);
    let (start, end)  = encode_range(range);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("SELECT COUNT(*) FROM responses WHERE {RANGE_FILTER}"),
          rusqlite::params![survey_id_str, start, end],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }
}
