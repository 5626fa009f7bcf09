mod catalog;
mod form;
mod graphql;
mod rag;
mod render;
mod settings;
mod web;

use std::{process::exit, sync::Arc};

use clap::Parser;
use rag::{AnswerProvider, StubProvider};
use settings::{Args, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let settings = match Settings::new(args.config.as_deref()) {
        Ok(ret) => ret,
        Err(error) => {
            eprintln!("Problem while loading settings. {error}");
            exit(1);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let provider: Arc<dyn AnswerProvider> = Arc::new(StubProvider);
    let schema = graphql::schema(provider.clone());
    web::serve(provider, schema, settings.web.address).await;
}
