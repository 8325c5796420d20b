use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Boundary to the external generation service: one prompt in, raw response
/// text out. An empty string is a legal return and is treated as a failed
/// attempt by the retry policy, not as an error here.
pub trait Generator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: String,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

/// Blocking chat-completions client. Constructed once per command and passed
/// by reference into the pipeline; no module-level client state.
pub struct HttpGenerator {
    config: GeneratorConfig,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build http client")?;

        Ok(Self { config, client })
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_output_tokens,
            stream: false,
        };

        let mut retries = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .json(&request)
                .send()
                .context("generation request failed")?;

            let status = response.status();
            let body = response
                .text()
                .context("failed to read generation response body")?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&body)
                    .with_context(|| format!("unexpected generation response: {}", head(&body)))?;
                return Ok(parsed
                    .choices
                    .first()
                    .map(|choice| choice.message.content.clone())
                    .unwrap_or_default());
            }

            if status.as_u16() == 429 && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(retries - 1);
                warn!(
                    retries,
                    backoff_ms, "generation service rate limited, backing off"
                );
                std::thread::sleep(Duration::from_millis(backoff_ms));
                continue;
            }

            bail!("generation service returned {}: {}", status, head(&body));
        }
    }
}

fn head(text: &str) -> &str {
    crate::util::truncate_chars(text, 200)
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use anyhow::{Result, bail};

    use super::Generator;

    /// Canned-response generator for pipeline tests. Responses are served in
    /// order; `Err` entries simulate transport failures.
    pub struct MockGenerator {
        responses: RefCell<VecDeque<Result<String>>>,
        pub prompts: RefCell<Vec<String>>,
    }

    impl MockGenerator {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: RefCell::new(responses.into_iter().collect()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.prompts.borrow().len()
        }
    }

    impl Generator for MockGenerator {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            match self.responses.borrow_mut().pop_front() {
                Some(response) => response,
                None => bail!("mock generator exhausted"),
            }
        }
    }
}
