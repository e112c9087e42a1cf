use std::time::Duration;

use sb_core::error::AppError;

const LOCAL_PREFIX: &str = "http://127.0.0.1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

fn remote_not_allowed(base_url: &str) -> AppError {
    AppError::new(
        "AI_REMOTE_NOT_ALLOWED",
        "Ollama base URL must be localhost (127.0.0.1)",
    )
    .with_details(format!("base_url={base_url}"))
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`,
    /// optionally with an explicit port and no path.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let rest = base_url
            .strip_prefix(LOCAL_PREFIX)
            .ok_or_else(|| remote_not_allowed(&base_url))?;
        if !rest.is_empty() {
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| remote_not_allowed(&base_url))?;
            let valid = !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
                && matches!(port.parse::<u32>(), Ok(1..=65535));
            if !valid {
                return Err(remote_not_allowed(&base_url));
            }
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body to `path` and decode a JSON reply; failures carry `code`.
    pub(crate) fn post_json<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        timeout: Duration,
        code: &str,
    ) -> Result<Resp, AppError>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_value(body).map_err(|e| {
            AppError::new(code, "Failed to encode Ollama request").with_details(e.to_string())
        })?;

        match ureq::post(&url).timeout(timeout).send_json(body) {
            Ok(r) if r.status() == 200 => r.into_json().map_err(|e| {
                AppError::new(code, "Failed to decode Ollama response")
                    .with_details(format!("url={url}; err={e}"))
            }),
            Ok(r) => Err(AppError::new(code, "Ollama request failed")
                .with_details(format!("url={url}; status={}", r.status()))),
            Err(e) => Err(AppError::new(code, "Failed to call Ollama endpoint")
                .with_details(format!("url={url}; err={e}"))
                .with_retryable(true)),
        }
    }
}
