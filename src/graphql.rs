use std::sync::Arc;

use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Result, SimpleObject,
};

use crate::{
    catalog::{years, TICKERS},
    form::{self, FormInput, Outcome},
    rag::{AnswerProvider, Citation},
    render::ERROR_BANNER,
};

pub(crate) type Schema = async_graphql::Schema<Query, EmptyMutation, EmptySubscription>;

#[derive(SimpleObject)]
pub(crate) struct AnswerResponse {
    pub(crate) query: String,
    pub(crate) ticker: String,
    pub(crate) year: i32,
    pub(crate) response: String,
    pub(crate) citation: Option<Source>,
    pub(crate) timestamp: String,
}

#[derive(SimpleObject)]
pub(crate) struct Source {
    pub(crate) node_id: String,
    /// The first 500 characters of the source passage.
    pub(crate) excerpt: String,
    pub(crate) score: f32,
}

impl From<&Citation> for Source {
    fn from(citation: &Citation) -> Self {
        Self {
            node_id: citation.node_id.clone(),
            excerpt: citation.excerpt().to_string(),
            score: citation.score,
        }
    }
}

#[derive(Default)]
pub(crate) struct Query;

#[Object]
impl Query {
    async fn tickers(&self) -> Vec<String> {
        TICKERS.iter().map(|t| t.symbol().to_string()).collect()
    }

    async fn years(&self) -> Vec<i32> {
        years().map(|y| i32::from(y.get())).collect()
    }

    async fn answer(
        &self,
        ctx: &Context<'_>,
        ticker: String,
        year: i32,
        query: String,
    ) -> Result<AnswerResponse> {
        let provider = ctx.data::<Arc<dyn AnswerProvider>>()?.clone();
        let input = FormInput {
            ticker,
            year: year.to_string(),
            query,
        };
        match form::dispatch(provider, input.clone()).await {
            Outcome::Answered(answer) => Ok(AnswerResponse {
                query: input.query,
                ticker: input.ticker,
                year,
                response: answer.response_text,
                citation: answer.citation.as_ref().map(Source::from),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
            Outcome::Invalid(missing) => Err(async_graphql::Error::new(missing.to_string())),
            Outcome::Failed(diagnostic) => Err(async_graphql::Error::new(ERROR_BANNER)
                .extend_with(|_, e| e.set("details", diagnostic.message.clone()))),
            Outcome::Idle => Err(async_graphql::Error::new(ERROR_BANNER)),
        }
    }
}

pub(crate) fn schema(provider: Arc<dyn AnswerProvider>) -> Schema {
    Schema::build(Query, EmptyMutation, EmptySubscription)
        .data(provider)
        .finish()
}

#[cfg(test)]
struct TestSchema {
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    fn new(provider: Arc<dyn AnswerProvider>) -> Self {
        Self {
            schema: schema(provider),
        }
    }

    async fn execute(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request).await
    }
}
