use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use async_graphql::http::GraphiQLSource;
use async_graphql_warp::GraphQLResponse;
use tracing::{debug, info, warn};
use warp::{Filter, Rejection, Reply};

use crate::{
    form::{self, Diagnostic, FormInput, Outcome},
    graphql::Schema,
    rag::AnswerProvider,
    render::{render_page, Page},
};

const MAX_FORM_BYTES: u64 = 16 * 1024;

pub(crate) async fn serve(provider: Arc<dyn AnswerProvider>, schema: Schema, addr: SocketAddr) {
    info!("Listening on http://{addr}");
    warp::serve(routes(provider, schema)).run(addr).await;
}

pub(crate) fn routes(
    provider: Arc<dyn AnswerProvider>,
    schema: Schema,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(render_page(&Page::default())));

    // A body that cannot be read still gets the error page instead of a bare
    // rejection.
    let form_body = warp::body::content_length_limit(MAX_FORM_BYTES)
        .and(warp::body::form::<FormInput>())
        .map(|input: FormInput| Ok::<_, Diagnostic>(input))
        .or_else(|rejection: Rejection| async move {
            Ok::<_, Rejection>((Err(rejected_form(&rejection)),))
        });

    let submit = warp::path::end()
        .and(warp::post())
        .and(form_body)
        .and(warp::any().map(move || provider.clone()))
        .and_then(
            |body: Result<FormInput, Diagnostic>, provider: Arc<dyn AnswerProvider>| async move {
                let page = match body {
                    Ok(input) => {
                        let outcome = form::dispatch(provider, input.clone()).await;
                        Page { input, outcome }
                    }
                    Err(diagnostic) => Page {
                        input: FormInput::default(),
                        outcome: Outcome::Failed(diagnostic),
                    },
                };
                debug!(phase = ?page.outcome.phase(), "Rendering submission");
                Ok::<_, Rejection>(warp::reply::html(render_page(&page)))
            },
        );

    let graphiql = warp::path!("graphql").and(warp::get()).map(|| {
        warp::reply::html(GraphiQLSource::build().endpoint("/graphql").finish())
    });

    let graphql = warp::path!("graphql")
        .and(warp::post())
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |(schema, request): (Schema, async_graphql::Request)| async move {
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        );

    index
        .or(submit)
        .or(graphiql)
        .or(graphql)
        .with(warp::trace::request())
}

fn rejected_form(rejection: &Rejection) -> Diagnostic {
    let message = if let Some(e) = rejection.find::<warp::reject::PayloadTooLarge>() {
        e.to_string()
    } else if let Some(e) = rejection.find::<warp::body::BodyDeserializeError>() {
        e.to_string()
    } else if let Some(e) = rejection.find::<warp::reject::LengthRequired>() {
        e.to_string()
    } else {
        "The form submission could not be read".to_string()
    };
    warn!("Rejected form body. {message}");
    Diagnostic {
        message,
        trace: format!("{rejection:?}"),
    }
}
