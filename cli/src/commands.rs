use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use sb_ai::answer::Answerer;
use sb_ai::embeddings::OllamaEmbedder;
use sb_ai::ingest::{ingest, IngestOptions, IngestSummary};
use sb_ai::llm::OllamaLlm;
use sb_ai::ollama::OllamaClient;
use sb_ai::retrieve::snippet;
use sb_ai::session::{CreatedQuiz, StudySession};
use sb_core::domain::QuizRequest;
use sb_core::error::AppError;
use sb_core::repo;
use sb_core::workspace::open_or_create_workspace_connection;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::StudyConfig;

const SNIPPET_CHARS: usize = 300;

fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| {
            AppError::new("TIME_FORMAT_FAILED", "Failed to format time").with_details(e.to_string())
        })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

struct Services {
    client: OllamaClient,
    conn: Connection,
}

impl Services {
    fn open(cfg: &StudyConfig) -> Result<Self> {
        let client = OllamaClient::new(&cfg.ollama_base_url)?;
        let conn = open_or_create_workspace_connection(&cfg.db_path())?;
        Ok(Self { client, conn })
    }

    fn embedder(&self) -> OllamaEmbedder {
        OllamaEmbedder::new(self.client.clone())
    }
}

#[derive(Serialize)]
struct IngestOutput {
    session_id: i64,
    #[serde(flatten)]
    ingest: IngestSummary,
}

pub fn ingest_file(cfg: &StudyConfig, file: &Path) -> Result<()> {
    let svc = Services::open(cfg)?;
    let options = IngestOptions {
        store_dir: cfg.store_dir().to_path_buf(),
        model: cfg.embed_model.clone(),
        window: cfg.chunk_window,
        overlap: cfg.chunk_overlap,
    };
    let result = ingest(file, &svc.embedder(), &options)?;
    let summary = result.summary();
    let doc_path = file.display().to_string();
    let session = StudySession::start(&svc.conn, result, &doc_path, &now_rfc3339_utc()?)?;
    print_json(&IngestOutput {
        session_id: session.session_id,
        ingest: summary,
    })
}

#[derive(Serialize)]
struct SourceView {
    chunk_id: u32,
    score: f32,
    snippet: String,
}

#[derive(Serialize)]
struct AskOutput {
    answer: String,
    kind: sb_ai::answer::AnswerKind,
    sources: Vec<SourceView>,
}

pub fn ask(cfg: &StudyConfig, session_id: i64, question: &str, top_k: Option<usize>) -> Result<()> {
    let svc = Services::open(cfg)?;
    let session = StudySession::resume(&svc.conn, session_id, cfg.store_dir())?;
    let llm = OllamaLlm::new(svc.client.clone());
    let answerer = cfg.llm_model.as_deref().map(|model| Answerer { llm: &llm, model });

    let out = session.ask(
        &svc.conn,
        &svc.embedder(),
        &cfg.embed_model,
        answerer,
        question,
        top_k.unwrap_or(cfg.top_k),
        &now_rfc3339_utc()?,
    )?;
    print_json(&AskOutput {
        answer: out.answer.text,
        kind: out.answer.kind,
        sources: out
            .hits
            .iter()
            .map(|h| SourceView {
                chunk_id: h.meta.chunk_position,
                score: h.score,
                snippet: snippet(&h.meta.text, SNIPPET_CHARS),
            })
            .collect(),
    })
}

/// A quiz as shown to the learner: no answers.
#[derive(Serialize)]
struct QuestionView {
    id: i64,
    qtype: &'static str,
    prompt: String,
    options: Vec<String>,
}

#[derive(Serialize)]
struct QuizView {
    quiz_id: i64,
    questions: Vec<QuestionView>,
}

impl From<&CreatedQuiz> for QuizView {
    fn from(q: &CreatedQuiz) -> Self {
        Self {
            quiz_id: q.quiz_id,
            questions: q
                .questions
                .iter()
                .map(|sq| QuestionView {
                    id: sq.id,
                    qtype: sq.question.kind().as_str(),
                    prompt: sq.question.prompt().to_string(),
                    options: sq.question.options(),
                })
                .collect(),
        }
    }
}

pub fn quiz(
    cfg: &StudyConfig,
    session_id: i64,
    num_mcq: Option<usize>,
    num_tf: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let mut svc = Services::open(cfg)?;
    let mut session = StudySession::resume(&svc.conn, session_id, cfg.store_dir())?;
    let request = QuizRequest {
        num_mcq: num_mcq.unwrap_or(cfg.num_mcq),
        num_tf: num_tf.unwrap_or(cfg.num_tf),
    };
    let now = now_rfc3339_utc()?;
    let created = session.create_quiz(&mut svc.conn, request, &mut rng_for(seed), &now)?;
    print_json(&QuizView::from(&created))
}

/// Answers file: a JSON object mapping question id to the chosen answer.
fn read_answers(path: &Path) -> Result<HashMap<i64, String>> {
    let bytes =
        fs::read(path).with_context(|| format!("reading answers from {}", path.display()))?;
    let raw: HashMap<String, String> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing answers in {}", path.display()))?;
    let mut out = HashMap::with_capacity(raw.len());
    for (k, v) in raw {
        let id: i64 = k
            .trim()
            .parse()
            .with_context(|| format!("question id `{k}` is not a number"))?;
        out.insert(id, v);
    }
    Ok(out)
}

pub fn submit(cfg: &StudyConfig, session_id: i64, quiz_id: i64, answers_file: &Path) -> Result<()> {
    let answers = read_answers(answers_file)?;
    let mut svc = Services::open(cfg)?;
    let session = StudySession::resume(&svc.conn, session_id, cfg.store_dir())?;
    let submission = session.submit(&mut svc.conn, quiz_id, &answers, &now_rfc3339_utc()?)?;
    print_json(&submission)
}

#[derive(Serialize)]
struct RetestOutput {
    retest: Option<QuizView>,
}

pub fn retest(cfg: &StudyConfig, session_id: i64, quiz_id: i64, seed: Option<u64>) -> Result<()> {
    let mut svc = Services::open(cfg)?;
    let mut session = StudySession::resume(&svc.conn, session_id, cfg.store_dir())?;
    if repo::quiz_session_id(&svc.conn, quiz_id)? != session_id {
        bail!("quiz {quiz_id} does not belong to session {session_id}");
    }
    let wrong = repo::wrongly_answered_questions(&svc.conn, quiz_id)?;
    let now = now_rfc3339_utc()?;
    let created = session.create_retest(&mut svc.conn, &wrong, &mut rng_for(seed), &now)?;
    if created.is_none() {
        tracing::info!(quiz_id, "no weak areas detected; generate a new quiz instead");
    }
    print_json(&RetestOutput {
        retest: created.as_ref().map(QuizView::from),
    })
}

pub fn stats(cfg: &StudyConfig, quiz_id: i64) -> Result<()> {
    let svc = Services::open(cfg)?;
    repo::quiz_session_id(&svc.conn, quiz_id)?;
    print_json(&repo::quiz_stats(&svc.conn, quiz_id)?)
}
