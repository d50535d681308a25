//! OpenAI chat-completions client used to write ticker commentary

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{checked, Insight, NewsFeed, PriceSeries};
use crate::error::UpstreamError;
use crate::source::InsightGenerator;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const MODEL: &str = "gpt-4o-mini";

const MAX_TOKENS: u32 = 210;

const TEMPERATURE: f32 = 0.7;

/// Headlines included in the prompt
const PROMPT_HEADLINES: usize = 5;

const SYSTEM_PROMPT: &str = "You are a financial analyst assistant. Provide concise, \
insightful analysis based on the provided stock data and news. \
Focus on key trends, notable news impact, and relevant factors to watch. \
Keep response under 100 words. Do not provide financial advice.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Client for OpenAI chat completions
///
/// Keeps per-process counters of calls and tokens so usage shows up in logs.
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    url: String,
    session_calls: AtomicU64,
    session_tokens: AtomicU64,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            url: OPENAI_CHAT_URL.to_string(),
            session_calls: AtomicU64::new(0),
            session_tokens: AtomicU64::new(0),
        })
    }

    /// Points the client at a different completions endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Calls and tokens used so far by this client
    pub fn session_usage(&self) -> (u64, u64) {
        (
            self.session_calls.load(Ordering::Relaxed),
            self.session_tokens.load(Ordering::Relaxed),
        )
    }

    /// Generates commentary for `ticker` from its price series and news
    pub async fn generate_insight(
        &self,
        ticker: &str,
        price: &PriceSeries,
        news: &NewsFeed,
    ) -> Result<Insight, UpstreamError> {
        let prompt = build_prompt(ticker, price, news);
        let request = ChatRequest {
            model: MODEL,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let text = checked(response).await?.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;

        let usage = parsed.usage.unwrap_or_default();
        let calls = self.session_calls.fetch_add(1, Ordering::Relaxed) + 1;
        let tokens = self
            .session_tokens
            .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed)
            + u64::from(usage.total_tokens);
        info!(
            ticker,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            session_calls = calls,
            session_tokens = tokens,
            "openai insight generated"
        );

        to_insight(ticker, parsed.choices, usage)
    }
}

#[async_trait]
impl InsightGenerator for OpenAiClient {
    async fn generate(
        &self,
        ticker: &str,
        price: &PriceSeries,
        news: &NewsFeed,
    ) -> Result<Insight, UpstreamError> {
        self.generate_insight(ticker, price, news).await
    }
}

fn to_insight(ticker: &str, choices: Vec<Choice>, usage: Usage) -> Result<Insight, UpstreamError> {
    let content = choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| UpstreamError::Unclassified(format!("{ticker}: empty completion")))?;

    Ok(Insight {
        ticker: ticker.to_string(),
        insight: content,
        tokens_used: usage.total_tokens,
    })
}

/// Builds the user prompt from the latest price move and top headlines
pub fn build_prompt(ticker: &str, price: &PriceSeries, news: &NewsFeed) -> String {
    let price_summary = match (price.current_price, price.change_pct()) {
        (Some(current), Some(change)) => {
            format!("Current price: ${current:.2} ({change:+.2}% from previous close)")
        }
        _ => "Price data unavailable".to_string(),
    };

    let news_summary = if news.articles.is_empty() {
        "No recent news available".to_string()
    } else {
        news.articles
            .iter()
            .take(PROMPT_HEADLINES)
            .map(|a| {
                format!(
                    "- {} ({})",
                    a.title,
                    a.source_title.as_deref().unwrap_or("Unknown")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Analyze {ticker} based on the following:\n\n\
         PRICE DATA:\n{price_summary}\n\n\
         RECENT NEWS:\n{news_summary}\n\n\
         Provide a brief analysis covering:\n\
         1. Current momentum and price action\n\
         2. Key news impact\n\
         3. Factors to watch\n"
    )
}
