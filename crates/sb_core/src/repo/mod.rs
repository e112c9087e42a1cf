use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::domain::{Question, QuestionKind, FALSE_LABEL, TRUE_LABEL};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: i64,
    pub doc_id: String,
    pub doc_path: String,
    pub created_at: String,
}

/// One retrieved chunk cited by an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub chunk_id: u32,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QaLog {
    pub id: i64,
    pub session_id: i64,
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub question: Question,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuizStats {
    pub total: i64,
    pub correct: i64,
    /// Percentage of correct attempts, 0.0 when nothing was attempted.
    pub accuracy: f64,
}

fn query_err(message: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::new("DB_QUERY_FAILED", message).with_details(e.to_string())
}

fn insert_err(message: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::new("DB_INSERT_FAILED", message).with_details(e.to_string())
}

fn tx_err(message: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::new("DB_TX_FAILED", message).with_details(e.to_string())
}

pub fn create_session(
    conn: &Connection,
    doc_id: &str,
    doc_path: &str,
    created_at: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO sessions(doc_id, doc_path, created_at) VALUES (?1, ?2, ?3)",
        params![doc_id, doc_path, created_at],
    )
    .map_err(insert_err("Failed to create session"))?;
    Ok(conn.last_insert_rowid())
}

pub fn get_session(conn: &Connection, id: i64) -> Result<SessionRecord, AppError> {
    conn.query_row(
        "SELECT id, doc_id, doc_path, created_at FROM sessions WHERE id = ?1",
        [id],
        |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                doc_id: row.get(1)?,
                doc_path: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(query_err("Failed to query session"))?
    .ok_or_else(|| {
        AppError::new("DB_NOT_FOUND", "Session not found").with_details(format!("session_id={id}"))
    })
}

pub fn log_qa(
    conn: &Connection,
    session_id: i64,
    question: &str,
    answer: &str,
    sources: &[SourceRef],
    created_at: &str,
) -> Result<i64, AppError> {
    let sources_json = serde_json::to_string(sources).map_err(|e| {
        AppError::new("DB_SERIALIZE_FAILED", "Failed to serialize answer sources")
            .with_details(e.to_string())
    })?;
    conn.execute(
        r#"
      INSERT INTO qa_logs(session_id, question, answer, sources_json, created_at)
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
        params![session_id, question, answer, sources_json, created_at],
    )
    .map_err(insert_err("Failed to log Q&A"))?;
    Ok(conn.last_insert_rowid())
}

pub fn list_qa_logs(conn: &Connection, session_id: i64) -> Result<Vec<QaLog>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, session_id, question, answer, sources_json, created_at
      FROM qa_logs
      WHERE session_id = ?1
      ORDER BY id ASC
      "#,
        )
        .map_err(query_err("Failed to prepare Q&A log query"))?;

    let rows = stmt
        .query_map([session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(query_err("Failed to query Q&A logs"))?;

    let mut out = Vec::new();
    for r in rows {
        let (id, session_id, question, answer, sources_json, created_at) =
            r.map_err(query_err("Failed to decode Q&A log row"))?;
        let sources = match sources_json {
            Some(s) => serde_json::from_str(&s).map_err(|e| {
                AppError::new("DB_DECODE_FAILED", "Stored answer sources are not valid JSON")
                    .with_details(format!("qa_log_id={id}; err={e}"))
            })?,
            None => Vec::new(),
        };
        out.push(QaLog {
            id,
            session_id,
            question,
            answer,
            sources,
            created_at,
        });
    }
    Ok(out)
}

pub fn create_quiz(
    conn: &Connection,
    session_id: i64,
    meta: &serde_json::Value,
    created_at: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO quizzes(session_id, meta_json, created_at) VALUES (?1, ?2, ?3)",
        params![session_id, meta.to_string(), created_at],
    )
    .map_err(insert_err("Failed to create quiz"))?;
    Ok(conn.last_insert_rowid())
}

pub fn add_question(conn: &Connection, quiz_id: i64, question: &Question) -> Result<i64, AppError> {
    let options_json = match question {
        Question::MultipleChoice { options, .. } => {
            Some(serde_json::to_string(options).map_err(|e| {
                AppError::new("DB_SERIALIZE_FAILED", "Failed to serialize question options")
                    .with_details(e.to_string())
            })?)
        }
        Question::TrueFalse { .. } => None,
    };
    conn.execute(
        r#"
      INSERT INTO questions(quiz_id, qtype, prompt, options_json, answer, chunk_ref)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6)
      "#,
        params![
            quiz_id,
            question.kind().as_str(),
            question.prompt(),
            options_json,
            question.answer_text(),
            question.chunk_ref().to_string(),
        ],
    )
    .map_err(insert_err("Failed to add question"))?;
    Ok(conn.last_insert_rowid())
}

/// Insert every question or none of them.
pub fn add_questions(
    conn: &mut Connection,
    quiz_id: i64,
    questions: &[Question],
) -> Result<Vec<i64>, AppError> {
    let tx = conn
        .transaction()
        .map_err(tx_err("Failed to start question transaction"))?;
    let mut ids = Vec::with_capacity(questions.len());
    for q in questions {
        ids.push(add_question(&tx, quiz_id, q)?);
    }
    tx.commit()
        .map_err(tx_err("Failed to commit question transaction"))?;
    Ok(ids)
}

/// Create a quiz row and all of its questions in one transaction.
///
/// On any failure neither the quiz nor a partial question set is stored.
pub fn create_quiz_with_questions(
    conn: &mut Connection,
    session_id: i64,
    meta: &serde_json::Value,
    questions: &[Question],
    created_at: &str,
) -> Result<i64, AppError> {
    let tx = conn
        .transaction()
        .map_err(tx_err("Failed to start quiz transaction"))?;
    let quiz_id = create_quiz(&tx, session_id, meta, created_at)?;
    for q in questions {
        add_question(&tx, quiz_id, q)?;
    }
    tx.commit()
        .map_err(tx_err("Failed to commit quiz transaction"))?;
    Ok(quiz_id)
}

fn decode_question(
    id: i64,
    qtype: &str,
    prompt: String,
    options_json: Option<String>,
    answer: String,
    chunk_ref: Option<String>,
) -> Result<Question, AppError> {
    let decode_err = |msg: &str| {
        AppError::new("DB_DECODE_FAILED", msg.to_string())
            .with_details(format!("question_id={id}"))
    };

    let chunk_ref = chunk_ref
        .as_deref()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| decode_err("Stored question has no usable chunk reference"))?;

    match QuestionKind::parse(qtype) {
        Some(QuestionKind::MultipleChoice) => {
            let options: Vec<String> = options_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|_| decode_err("Stored question options are not valid JSON"))?
                .unwrap_or_default();
            Ok(Question::MultipleChoice {
                prompt,
                options,
                answer,
                chunk_ref,
            })
        }
        Some(QuestionKind::TrueFalse) => {
            let answer = if answer.eq_ignore_ascii_case(TRUE_LABEL) {
                true
            } else if answer.eq_ignore_ascii_case(FALSE_LABEL) {
                false
            } else {
                return Err(decode_err(
                    "Stored true/false answer is neither True nor False",
                ));
            };
            Ok(Question::TrueFalse {
                prompt,
                answer,
                chunk_ref,
            })
        }
        None => Err(decode_err("Unknown stored question type")),
    }
}

fn query_questions(
    conn: &Connection,
    sql: &str,
    quiz_id: i64,
) -> Result<Vec<StoredQuestion>, AppError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(query_err("Failed to prepare questions query"))?;

    let rows = stmt
        .query_map([quiz_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .map_err(query_err("Failed to query questions"))?;

    let mut out = Vec::new();
    for r in rows {
        let (id, qtype, prompt, options_json, answer, chunk_ref) =
            r.map_err(query_err("Failed to decode question row"))?;
        let question = decode_question(id, &qtype, prompt, options_json, answer, chunk_ref)?;
        out.push(StoredQuestion {
            id,
            quiz_id,
            question,
        });
    }
    Ok(out)
}

/// Questions of a quiz in insertion order.
pub fn get_quiz_questions(
    conn: &Connection,
    quiz_id: i64,
) -> Result<Vec<StoredQuestion>, AppError> {
    query_questions(
        conn,
        r#"
      SELECT id, qtype, prompt, options_json, answer, chunk_ref
      FROM questions
      WHERE quiz_id = ?1
      ORDER BY id ASC
      "#,
        quiz_id,
    )
}

/// Questions whose most recent attempt was graded wrong.
pub fn wrongly_answered_questions(
    conn: &Connection,
    quiz_id: i64,
) -> Result<Vec<StoredQuestion>, AppError> {
    query_questions(
        conn,
        r#"
      SELECT q.id, q.qtype, q.prompt, q.options_json, q.answer, q.chunk_ref
      FROM questions q
      JOIN attempts a ON a.id = (SELECT MAX(id) FROM attempts WHERE question_id = q.id)
      WHERE q.quiz_id = ?1 AND a.correct = 0
      ORDER BY q.id ASC
      "#,
        quiz_id,
    )
}

pub fn record_attempt(
    conn: &Connection,
    quiz_id: i64,
    question_id: i64,
    user_answer: &str,
    correct: bool,
    created_at: &str,
) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO attempts(quiz_id, question_id, user_answer, correct, created_at)
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
        params![quiz_id, question_id, user_answer, correct, created_at],
    )
    .map_err(insert_err("Failed to record attempt"))?;
    Ok(conn.last_insert_rowid())
}

/// Totals over every recorded attempt of the quiz.
pub fn quiz_stats(conn: &Connection, quiz_id: i64) -> Result<QuizStats, AppError> {
    let (total, correct): (i64, Option<i64>) = conn
        .query_row(
            "SELECT COUNT(*), SUM(correct) FROM attempts WHERE quiz_id = ?1",
            [quiz_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(query_err("Failed to compute quiz stats"))?;
    let correct = correct.unwrap_or(0);
    let accuracy = if total > 0 {
        correct as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Ok(QuizStats {
        total,
        correct,
        accuracy,
    })
}

pub fn latest_quiz_for_session(
    conn: &Connection,
    session_id: i64,
) -> Result<Option<i64>, AppError> {
    conn.query_row(
        "SELECT id FROM quizzes WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
        [session_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(query_err("Failed to query latest quiz"))
}

/// Session that owns a quiz, for checking a quiz id against the active session.
pub fn quiz_session_id(conn: &Connection, quiz_id: i64) -> Result<i64, AppError> {
    conn.query_row(
        "SELECT session_id FROM quizzes WHERE id = ?1",
        [quiz_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(query_err("Failed to query quiz"))?
    .ok_or_else(|| {
        AppError::new("DB_NOT_FOUND", "Quiz not found").with_details(format!("quiz_id={quiz_id}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use pretty_assertions::assert_eq;

    const TS: &str = "2026-01-01T00:00:00Z";

    fn conn() -> Connection {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    fn mcq() -> Question {
        Question::MultipleChoice {
            prompt: "The ____ is the powerhouse of the cell.".to_string(),
            options: vec!["nucleus".to_string(), "mitochondria".to_string()],
            answer: "mitochondria".to_string(),
            chunk_ref: 3,
        }
    }

    fn tf() -> Question {
        Question::TrueFalse {
            prompt: "Water is not wet.".to_string(),
            answer: false,
            chunk_ref: 0,
        }
    }

    #[test]
    fn questions_round_trip_through_store() {
        let mut conn = conn();
        let sid = create_session(&conn, "abc", "notes.txt", TS).expect("session");
        let qid = create_quiz(&conn, sid, &serde_json::json!({"num_mcq": 1}), TS).expect("quiz");
        let ids = add_questions(&mut conn, qid, &[mcq(), tf()]).expect("add");
        assert_eq!(ids.len(), 2);

        let stored = get_quiz_questions(&conn, qid).expect("load");
        assert_eq!(
            stored.iter().map(|s| s.question.clone()).collect::<Vec<_>>(),
            vec![mcq(), tf()]
        );
        assert_eq!(stored[0].id, ids[0]);
    }

    #[test]
    fn quiz_and_questions_are_created_together() {
        let mut conn = conn();
        let sid = create_session(&conn, "abc", "notes.txt", TS).unwrap();
        let meta = serde_json::json!({});
        let qid = create_quiz_with_questions(&mut conn, sid, &meta, &[mcq(), tf()], TS)
            .expect("create");
        assert_eq!(get_quiz_questions(&conn, qid).unwrap().len(), 2);
        assert_eq!(latest_quiz_for_session(&conn, sid).unwrap(), Some(qid));
    }

    #[test]
    fn failed_question_insert_leaves_no_quiz_row() {
        let mut conn = conn();
        let sid = create_session(&conn, "abc", "notes.txt", TS).unwrap();
        conn.execute_batch(
            r#"
      CREATE TRIGGER reject_tf BEFORE INSERT ON questions
      WHEN NEW.qtype = 'tf'
      BEGIN SELECT RAISE(ABORT, 'rejected'); END;
      "#,
        )
        .unwrap();

        let meta = serde_json::json!({});
        let err = create_quiz_with_questions(&mut conn, sid, &meta, &[mcq(), tf()], TS)
            .unwrap_err();
        assert_eq!(err.code, "DB_INSERT_FAILED");
        assert_eq!(count(&conn, "quizzes"), 0);
        assert_eq!(count(&conn, "questions"), 0);
        assert_eq!(latest_quiz_for_session(&conn, sid).unwrap(), None);
    }

    #[test]
    fn stats_accumulate_attempts() {
        let conn = conn();
        let sid = create_session(&conn, "abc", "notes.txt", TS).unwrap();
        let qid = create_quiz(&conn, sid, &serde_json::json!({}), TS).unwrap();
        assert_eq!(
            quiz_stats(&conn, qid).unwrap(),
            QuizStats {
                total: 0,
                correct: 0,
                accuracy: 0.0
            }
        );

        let q1 = add_question(&conn, qid, &mcq()).unwrap();
        record_attempt(&conn, qid, q1, "mitochondria", true, TS).unwrap();
        record_attempt(&conn, qid, q1, "nucleus", false, TS).unwrap();
        let stats = quiz_stats(&conn, qid).unwrap();
        assert_eq!((stats.total, stats.correct), (2, 1));
        assert!((stats.accuracy - 50.0).abs() < 1e-9);

        // the later attempt decides
        let wrong = wrongly_answered_questions(&conn, qid).unwrap();
        assert_eq!(wrong.iter().map(|q| q.id).collect::<Vec<_>>(), vec![q1]);
        record_attempt(&conn, qid, q1, "mitochondria", true, TS).unwrap();
        assert!(wrongly_answered_questions(&conn, qid).unwrap().is_empty());
    }

    #[test]
    fn qa_logs_keep_sources() {
        let conn = conn();
        let sid = create_session(&conn, "abc", "notes.txt", TS).unwrap();
        let sources = vec![SourceRef {
            chunk_id: 2,
            score: 0.5,
        }];
        log_qa(&conn, sid, "why?", "because", &sources, TS).unwrap();
        let logs = list_qa_logs(&conn, sid).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].sources, sources);
    }

    #[test]
    fn latest_quiz_and_missing_rows() {
        let conn = conn();
        let sid = create_session(&conn, "abc", "notes.txt", TS).unwrap();
        assert_eq!(latest_quiz_for_session(&conn, sid).unwrap(), None);
        create_quiz(&conn, sid, &serde_json::json!({}), TS).unwrap();
        let second = create_quiz(&conn, sid, &serde_json::json!({}), TS).unwrap();
        assert_eq!(latest_quiz_for_session(&conn, sid).unwrap(), Some(second));
        assert_eq!(quiz_session_id(&conn, second).unwrap(), sid);

        assert_eq!(get_session(&conn, 999).unwrap_err().code, "DB_NOT_FOUND");
        assert_eq!(quiz_session_id(&conn, 999).unwrap_err().code, "DB_NOT_FOUND");
    }

    #[test]
    fn failed_batch_inserts_nothing() {
        let mut conn = conn();
        // quiz 42 does not exist; foreign keys reject the first insert
        let err = add_questions(&mut conn, 42, &[mcq(), mcq()]).unwrap_err();
        assert_eq!(err.code, "DB_INSERT_FAILED");
        assert_eq!(count(&conn, "questions"), 0);
    }
}
