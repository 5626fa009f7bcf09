use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Once},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span};

use crate::{
    catalog::{Ticker, Year},
    rag::{Answer, AnswerProvider},
};

thread_local! {
    // Trace of the most recent panic on this thread, filled in by the hook.
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Raw values posted by the form. An empty string means the field was left
/// unselected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct FormInput {
    pub(crate) ticker: String,
    pub(crate) year: String,
    pub(crate) query: String,
}

/// A validated request, ready for the answer provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueryRequest {
    pub(crate) query: String,
    pub(crate) ticker: Ticker,
    pub(crate) year: Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum MissingInput {
    #[error("Please select a company ticker.")]
    Ticker,
    #[error("Please select a year.")]
    Year,
    #[error("Please enter a query.")]
    Query,
}

/// Details of a failure caught while answering a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Diagnostic {
    pub(crate) message: String,
    pub(crate) trace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Loading,
    Displaying,
}

/// What a single submission produced. A fresh value is built for every
/// submission, so nothing from a previous answer can leak into the next page.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Outcome {
    #[default]
    Idle,
    Invalid(MissingInput),
    Answered(Answer),
    Failed(Diagnostic),
}

impl Outcome {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            Outcome::Idle => Phase::Idle,
            Outcome::Invalid(_) | Outcome::Answered(_) | Outcome::Failed(_) => Phase::Displaying,
        }
    }
}

/// Checks ticker, year and query in that order and stops at the first one
/// missing. A value outside the catalog counts as missing.
pub(crate) fn validate(
    ticker: &str,
    year: &str,
    query: &str,
) -> Result<QueryRequest, MissingInput> {
    let ticker: Ticker = ticker.parse().map_err(|_| MissingInput::Ticker)?;
    let year: Year = year.parse().map_err(|_| MissingInput::Year)?;
    if query.is_empty() {
        return Err(MissingInput::Query);
    }
    Ok(QueryRequest {
        query: query.to_string(),
        ticker,
        year,
    })
}

/// Handles one press of the submit button.
///
/// Never panics and never returns an error: provider failures, including
/// panics, come back as [`Outcome::Failed`].
pub(crate) fn submit(provider: &dyn AnswerProvider, input: &FormInput) -> Outcome {
    let request = match validate(&input.ticker, &input.year, &input.query) {
        Ok(request) => request,
        Err(missing) => {
            debug!("Rejected submission: {missing}");
            return Outcome::Invalid(missing);
        }
    };

    info!(
        ticker = %request.ticker,
        year = %request.year,
        "Answering financial statement query"
    );
    install_panic_hook();
    PANIC_TRACE.with(|slot| slot.borrow_mut().take());
    let span = info_span!("analyzing", phase = ?Phase::Loading);
    let result = span.in_scope(|| {
        panic::catch_unwind(AssertUnwindSafe(|| {
            provider.respond(&request.query, request.ticker, request.year)
        }))
    });

    match result {
        Ok(Ok(answer)) => Outcome::Answered(answer),
        Ok(Err(e)) => {
            error!("Problem while answering query. {e:#}");
            Outcome::Failed(Diagnostic {
                message: e.to_string(),
                trace: error_trace(&e),
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Answer provider panicked. {message}");
            let trace = PANIC_TRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| format!("panicked: {message}"));
            Outcome::Failed(Diagnostic { message, trace })
        }
    }
}

/// Runs [`submit`] on the blocking thread pool so a slow provider does not
/// stall the async runtime.
pub(crate) async fn dispatch(provider: Arc<dyn AnswerProvider>, input: FormInput) -> Outcome {
    match tokio::task::spawn_blocking(move || submit(provider.as_ref(), &input)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Problem while waiting for the answer. {e}");
            Outcome::Failed(Diagnostic {
                message: e.to_string(),
                trace: format!("{e:?}"),
            })
        }
    }
}

/// Error chain plus a stack backtrace. When the error carries no backtrace of
/// its own, the one at the point it surfaced is used.
fn error_trace(e: &anyhow::Error) -> String {
    if e.backtrace().status() == BacktraceStatus::Captured {
        format!("{e:?}")
    } else {
        format!("{e:?}\n\nStack backtrace:\n{}", Backtrace::force_capture())
    }
}

/// Records the location and backtrace of every panic for this thread, then
/// defers to the previously installed hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map_or_else(|| "unknown location".to_string(), ToString::to_string);
            let trace = format!(
                "{}\n\npanicked at {location}\n\nStack backtrace:\n{}",
                panic_message(info.payload()),
                Backtrace::force_capture()
            );
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{anyhow, Context, Result};

    use super::*;
    use crate::{
        catalog::{years, TICKERS},
        rag::StubProvider,
    };

    #[derive(Default)]
    pub(crate) struct CountingProvider {
        pub(crate) calls: AtomicUsize,
    }

    impl AnswerProvider for CountingProvider {
        fn respond(&self, query: &str, ticker: Ticker, year: Year) -> Result<Answer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StubProvider.respond(query, ticker, year)
        }
    }

    pub(crate) struct FailingProvider;

    impl AnswerProvider for FailingProvider {
        fn respond(&self, _query: &str, _ticker: Ticker, _year: Year) -> Result<Answer> {
            Err(anyhow!("index <unavailable>")).context("vector store lookup failed")
        }
    }

    pub(crate) struct PanickingProvider;

    impl AnswerProvider for PanickingProvider {
        fn respond(&self, _query: &str, _ticker: Ticker, _year: Year) -> Result<Answer> {
            panic!("embedding model not loaded");
        }
    }

    fn input(ticker: &str, year: &str, query: &str) -> FormInput {
        FormInput {
            ticker: ticker.to_string(),
            year: year.to_string(),
            query: query.to_string(),
        }
    }

    #[test]
    fn validation_order() {
        assert_eq!(validate("", "", ""), Err(MissingInput::Ticker));
        assert_eq!(validate("", "2015", "q"), Err(MissingInput::Ticker));
        assert_eq!(validate("PGR", "", ""), Err(MissingInput::Year));
        assert_eq!(validate("PGR", "2015", ""), Err(MissingInput::Query));
        let request = validate("PGR", "2015", "q").unwrap();
        assert_eq!(request.ticker, Ticker::Pgr);
        assert_eq!(request.year.get(), 2015);
        assert_eq!(request.query, "q");
    }

    #[test]
    fn values_outside_catalog_count_as_missing() {
        assert_eq!(validate("AAPL", "2015", "q"), Err(MissingInput::Ticker));
        assert_eq!(validate("PGR", "2021", "q"), Err(MissingInput::Year));
    }

    #[test]
    fn missing_ticker_skips_provider() {
        let provider = CountingProvider::default();
        for (year, query) in [("", ""), ("2011", ""), ("2011", "revenue")] {
            let outcome = submit(&provider, &input("", year, query));
            assert_eq!(outcome, Outcome::Invalid(MissingInput::Ticker));
        }
        assert_eq!(
            MissingInput::Ticker.to_string(),
            "Please select a company ticker."
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_query_skips_provider() {
        let provider = CountingProvider::default();
        let outcome = submit(&provider, &input("WYNN", "2019", ""));
        assert_eq!(outcome, Outcome::Invalid(MissingInput::Query));
        assert_eq!(MissingInput::Query.to_string(), "Please enter a query.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_catalog_pair_is_answered() {
        let provider = CountingProvider::default();
        for ticker in TICKERS {
            for year in years() {
                let outcome = submit(
                    &provider,
                    &input(ticker.symbol(), &year.to_string(), "total debt"),
                );
                let Outcome::Answered(answer) = outcome else {
                    panic!("expected an answer for {ticker} {year}");
                };
                assert!(answer.response_text.contains("total debt"));
                assert!(answer.response_text.contains(ticker.symbol()));
                assert!(answer.response_text.contains(&year.to_string()));
            }
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn identical_submissions_give_identical_answers() {
        let form = input("TXT", "2014", "cash flow");
        assert_eq!(submit(&StubProvider, &form), submit(&StubProvider, &form));
    }

    #[test]
    fn provider_error_is_caught() {
        let outcome = submit(&FailingProvider, &input("PCG", "2018", "liabilities"));
        let Outcome::Failed(diagnostic) = outcome else {
            panic!("expected a failure");
        };
        assert_eq!(diagnostic.message, "vector store lookup failed");
        assert!(diagnostic.trace.contains("index <unavailable>"));
        assert!(diagnostic.trace.contains("Stack backtrace:"));
        assert_eq!(Outcome::Failed(diagnostic).phase(), Phase::Displaying);
    }

    #[test]
    fn provider_panic_is_caught() {
        let outcome = submit(&PanickingProvider, &input("PCG", "2018", "liabilities"));
        let Outcome::Failed(diagnostic) = outcome else {
            panic!("expected a failure");
        };
        assert_eq!(diagnostic.message, "embedding model not loaded");
        assert!(diagnostic.trace.contains("panicked at src/form.rs:"));
        assert!(diagnostic.trace.contains("Stack backtrace:"));
    }

    #[test]
    fn panic_trace_is_not_reused() {
        install_panic_hook();
        let _ = panic::catch_unwind(|| {
            panic!("stale panic");
        });
        let outcome = submit(&PanickingProvider, &input("PCG", "2018", "liabilities"));
        let Outcome::Failed(diagnostic) = outcome else {
            panic!("expected a failure");
        };
        assert!(diagnostic.trace.starts_with("embedding model not loaded"));
        assert!(!diagnostic.trace.contains("stale panic"));
    }

    #[tokio::test]
    async fn dispatch_runs_provider_off_runtime() {
        let outcome = dispatch(Arc::new(StubProvider), input("FRT", "2010", "leases")).await;
        assert_eq!(
            outcome,
            Outcome::Answered(Answer {
                response_text: "Answering query for leases, year - 2010, ticker - FRT".to_string(),
                citation: None,
            })
        );

        let outcome = dispatch(Arc::new(PanickingProvider), input("FRT", "2010", "leases")).await;
        assert!(matches!(outcome, Outcome::Failed(_)));
    }

    #[test]
    fn phases() {
        assert_eq!(Outcome::default().phase(), Phase::Idle);
        assert_eq!(
            Outcome::Invalid(MissingInput::Year).phase(),
            Phase::Displaying
        );
    }
}
