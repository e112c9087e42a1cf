//! One learner's session over one ingested document.
//!
//! The session is an explicit value threaded through every call; nothing is kept
//! in globals. The store records sessions, Q&A, quizzes and attempts, and the
//! loaded index supplies chunk text for answers, quizzes and explanations.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use rand::Rng;
use rusqlite::Connection;
use sb_core::domain::QuizRequest;
use sb_core::error::AppError;
use sb_core::quiz::{explain_for_wrong, generate_mcq, generate_quiz};
use sb_core::repo::{self, QuizStats, SourceRef, StoredQuestion};
use serde::Serialize;

use crate::answer::{answer_question, Answer, Answerer};
use crate::index::{SearchHit, VectorIndex};
use crate::ingest::{index_path_for, IngestResult};
use crate::retrieve::query_index;

pub const RETEST_MAX_QUESTIONS: usize = 5;

#[derive(Debug, Clone)]
pub struct StudySession {
    pub session_id: i64,
    pub document_id: String,
    pub doc_path: String,
    pub index: VectorIndex,
    pub active_quiz_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: Answer,
    pub hits: Vec<SearchHit>,
    pub qa_log_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedQuiz {
    pub quiz_id: i64,
    pub questions: Vec<StoredQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradedQuestion {
    pub question_id: i64,
    pub user_answer: String,
    pub correct: bool,
    pub correct_answer: String,
    /// Present for wrong answers only.
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub quiz_id: i64,
    pub stats: QuizStats,
    pub results: Vec<GradedQuestion>,
}

impl Submission {
    pub fn wrong_question_ids(&self) -> Vec<i64> {
        self.results
            .iter()
            .filter(|r| !r.correct)
            .map(|r| r.question_id)
            .collect()
    }
}

fn tx_err(message: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::new("DB_TX_FAILED", message).with_details(e.to_string())
}

impl StudySession {
    /// Record a new session for a freshly ingested (or reused) document.
    pub fn start(
        conn: &Connection,
        ingest: IngestResult,
        doc_path: &str,
        created_at: &str,
    ) -> Result<Self, AppError> {
        let session_id = repo::create_session(conn, &ingest.document_id, doc_path, created_at)?;
        tracing::info!(session_id, document_id = %ingest.document_id, "started study session");
        Ok(Self {
            session_id,
            document_id: ingest.document_id,
            doc_path: doc_path.to_string(),
            index: ingest.index,
            active_quiz_id: None,
        })
    }

    /// Reopen a stored session and load its document index from `store_dir`.
    pub fn resume(conn: &Connection, session_id: i64, store_dir: &Path) -> Result<Self, AppError> {
        let record = repo::get_session(conn, session_id)?;
        let mut index = VectorIndex::open(index_path_for(store_dir, &record.doc_id));
        if !index.load()? {
            return Err(AppError::new(
                "AI_INDEX_NOT_FOUND",
                "No index found for this session's document; ingest it again",
            )
            .with_details(format!(
                "session_id={session_id}; document_id={}; path={}",
                record.doc_id,
                index.index_path().display()
            )));
        }
        let active_quiz_id = repo::latest_quiz_for_session(conn, session_id)?;
        Ok(Self {
            session_id,
            document_id: record.doc_id,
            doc_path: record.doc_path,
            index,
            active_quiz_id,
        })
    }

    pub fn chunk_texts(&self) -> Vec<String> {
        self.index.metadata().iter().map(|m| m.text.clone()).collect()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ask(
        &self,
        conn: &Connection,
        embedder: &dyn crate::embeddings::Embedder,
        embed_model: &str,
        answerer: Option<Answerer<'_>>,
        question: &str,
        top_k: usize,
        created_at: &str,
    ) -> Result<AskOutcome, AppError> {
        let hits = query_index(&self.index, embedder, embed_model, question, top_k)?;
        let answer = answer_question(&hits, question.trim(), answerer);
        let sources: Vec<SourceRef> = hits
            .iter()
            .map(|h| SourceRef {
                chunk_id: h.meta.chunk_position,
                score: h.score,
            })
            .collect();
        let qa_log_id = repo::log_qa(
            conn,
            self.session_id,
            question.trim(),
            &answer.text,
            &sources,
            created_at,
        )?;
        Ok(AskOutcome {
            answer,
            hits,
            qa_log_id,
        })
    }

    fn ensure_owned(&self, conn: &Connection, quiz_id: i64) -> Result<(), AppError> {
        let owner = repo::quiz_session_id(conn, quiz_id)?;
        if owner != self.session_id {
            return Err(AppError::new(
                "SESSION_QUIZ_MISMATCH",
                "Quiz belongs to a different session",
            )
            .with_details(format!(
                "quiz_id={quiz_id}; quiz_session={owner}; session={}",
                self.session_id
            )));
        }
        Ok(())
    }

    fn persist_quiz(
        &mut self,
        conn: &mut Connection,
        meta: serde_json::Value,
        questions: &[sb_core::domain::Question],
        created_at: &str,
    ) -> Result<CreatedQuiz, AppError> {
        let quiz_id =
            repo::create_quiz_with_questions(conn, self.session_id, &meta, questions, created_at)?;
        let questions = repo::get_quiz_questions(conn, quiz_id)?;
        self.active_quiz_id = Some(quiz_id);
        tracing::info!(
            session_id = self.session_id,
            quiz_id,
            questions = questions.len(),
            "created quiz"
        );
        Ok(CreatedQuiz { quiz_id, questions })
    }

    /// Generate a quiz over every indexed chunk and make it the active quiz.
    pub fn create_quiz<R: Rng + ?Sized>(
        &mut self,
        conn: &mut Connection,
        request: QuizRequest,
        rng: &mut R,
        created_at: &str,
    ) -> Result<CreatedQuiz, AppError> {
        let quiz = generate_quiz(&self.chunk_texts(), request, rng);
        let meta = serde_json::json!({ "num_mcq": request.num_mcq, "num_tf": request.num_tf });
        self.persist_quiz(conn, meta, &quiz.questions, created_at)
    }

    /// Grade every stored question of `quiz_id`; a missing answer counts as wrong.
    pub fn submit(
        &self,
        conn: &mut Connection,
        quiz_id: i64,
        answers: &HashMap<i64, String>,
        created_at: &str,
    ) -> Result<Submission, AppError> {
        self.ensure_owned(conn, quiz_id)?;
        let questions = repo::get_quiz_questions(conn, quiz_id)?;

        let tx = conn
            .transaction()
            .map_err(tx_err("Failed to start attempt transaction"))?;
        let mut results = Vec::with_capacity(questions.len());
        for sq in &questions {
            let user_answer = answers.get(&sq.id).map(|a| a.trim().to_string()).unwrap_or_default();
            let correct = sq.question.is_correct(&user_answer);
            repo::record_attempt(&tx, quiz_id, sq.id, &user_answer, correct, created_at)?;

            let explanation = (!correct).then(|| {
                let chunk = self.index.chunk_text(sq.question.chunk_ref()).unwrap_or("");
                explain_for_wrong(chunk, &sq.question)
            });
            results.push(GradedQuestion {
                question_id: sq.id,
                user_answer,
                correct,
                correct_answer: sq.question.answer_text(),
                explanation,
            });
        }
        tx.commit()
            .map_err(tx_err("Failed to commit attempt transaction"))?;

        let stats = repo::quiz_stats(conn, quiz_id)?;
        tracing::info!(
            quiz_id,
            total = stats.total,
            correct = stats.correct,
            "graded quiz submission"
        );
        Ok(Submission {
            quiz_id,
            stats,
            results,
        })
    }

    /// A short multiple-choice quiz over the chunks behind `wrong`.
    ///
    /// Each weak chunk is used once. Returns `None` when there is nothing to
    /// retest or no question could be generated.
    pub fn create_retest<R: Rng + ?Sized>(
        &mut self,
        conn: &mut Connection,
        wrong: &[StoredQuestion],
        rng: &mut R,
        created_at: &str,
    ) -> Result<Option<CreatedQuiz>, AppError> {
        let mut seen = BTreeSet::new();
        let mut positions: Vec<u32> = Vec::new();
        let mut texts: Vec<&str> = Vec::new();
        for sq in wrong {
            let pos = sq.question.chunk_ref();
            if !seen.insert(pos) {
                continue;
            }
            if let Some(text) = self.index.chunk_text(pos) {
                positions.push(pos);
                texts.push(text);
            }
        }
        if texts.is_empty() {
            tracing::info!(session_id = self.session_id, "no weak chunks to retest");
            return Ok(None);
        }

        let n = RETEST_MAX_QUESTIONS.min(texts.len());
        let questions: Vec<_> = generate_mcq(&texts, n, rng)
            .into_iter()
            .map(|q| {
                let original = positions[q.chunk_ref() as usize];
                q.with_chunk_ref(original)
            })
            .collect();
        if questions.is_empty() {
            return Ok(None);
        }

        let meta = serde_json::json!({ "retest": "weak_areas" });
        self.persist_quiz(conn, meta, &questions, created_at).map(Some)
    }
}
