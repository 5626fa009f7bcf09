use anyhow::Result;

use crate::catalog::{Ticker, Year};

/// Number of characters of the source text shown alongside an answer.
const EXCERPT_CHARS: usize = 500;

/// The passage an answer was derived from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Citation {
    pub(crate) node_id: String,
    pub(crate) text: String,
    pub(crate) score: f32,
}

impl Citation {
    /// Returns at most the first 500 characters of the source text.
    pub(crate) fn excerpt(&self) -> &str {
        match self.text.char_indices().nth(EXCERPT_CHARS) {
            Some((end, _)) => &self.text[..end],
            None => &self.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Answer {
    pub(crate) response_text: String,
    pub(crate) citation: Option<Citation>,
}

/// Answers a question about one company's financial statement for one year.
pub(crate) trait AnswerProvider: Send + Sync {
    fn respond(&self, query: &str, ticker: Ticker, year: Year) -> Result<Answer>;
}

/// Stand-in for a retrieval-and-generation pipeline. Echoes its inputs.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StubProvider;

impl AnswerProvider for StubProvider {
    fn respond(&self, query: &str, ticker: Ticker, year: Year) -> Result<Answer> {
        Ok(Answer {
            response_text: format!("Answering query for {query}, year - {year}, ticker - {ticker}"),
            citation: None,
        })
    }
}
