use std::fmt::Write;

use crate::{
    catalog::{years, TICKERS},
    form::{Diagnostic, FormInput, Outcome},
    rag::Answer,
};

pub(crate) const TITLE: &str = "Financial Statement Query Assistant";
pub(crate) const SUCCESS_BANNER: &str = "Insights Retrieved Successfully!";
pub(crate) const ERROR_BANNER: &str = "An unexpected error occurred.";
pub(crate) const FOLLOW_UP_NOTICE: &str = "Our team has been notified. Please try again later.";

const STYLE: &str = "body{font-family:sans-serif;margin:2rem auto;max-width:60rem}\
.columns{display:flex;gap:1rem}.columns label{flex:1}\
select,input[type=text],textarea{width:100%;box-sizing:border-box}\
.error{background:#fde8e8;padding:.75rem}.success{background:#e6f4ea;padding:.75rem}\
.info{background:#e8f0fe;padding:.75rem}#busy{display:none}";

/// Everything one render pass needs: what the user entered and what the
/// submission produced.
#[derive(Debug, Default)]
pub(crate) struct Page {
    pub(crate) input: FormInput,
    pub(crate) outcome: Outcome,
}

pub(crate) fn render_page(page: &Page) -> String {
    let mut html = String::new();
    // Writing into a `String` cannot fail.
    let _ = write_page(&mut html, page);
    html
}

fn write_page(html: &mut String, page: &Page) -> std::fmt::Result {
    write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>📊 {TITLE}</title>\
         <style>{STYLE}</style></head><body>"
    )?;
    write!(
        html,
        "<h1>{TITLE}</h1><p>Ask questions about a company's financial statements. \
         Select a company ticker, year, and enter your query to get insights.</p>"
    )?;
    write_form(html, &page.input)?;
    write_outcome(html, &page.outcome)?;
    write!(
        html,
        "<hr><h3>How to Use</h3><ol><li>Select a company ticker</li><li>Choose a year</li>\
         <li>Enter your query about the financial statement</li>\
         <li>Click \"Get Insights\"</li></ol>\
         <p><em>Insights are generated using advanced AI-powered retrieval and generation \
         techniques.</em></p></body></html>"
    )
}

fn write_form(html: &mut String, input: &FormInput) -> std::fmt::Result {
    write!(
        html,
        "<form method=\"post\" action=\"/\" \
         onsubmit=\"document.getElementById('busy').style.display='block'\">\
         <div class=\"columns\"><label>Select Company Ticker<select name=\"ticker\">"
    )?;
    write_option(html, "", &input.ticker)?;
    for ticker in TICKERS {
        write_option(html, ticker.symbol(), &input.ticker)?;
    }
    write!(html, "</select></label><label>Select Year<select name=\"year\">")?;
    write_option(html, "", &input.year)?;
    for year in years() {
        write_option(html, &year.to_string(), &input.year)?;
    }
    write!(
        html,
        "</select></label></div>\
         <label>Enter your query about the financial statement:\
         <input type=\"text\" name=\"query\" value=\"{}\"></label>\
         <button type=\"submit\">Get Insights</button>\
         <p id=\"busy\">Analyzing financial statement...</p></form>",
        escape(&input.query)
    )
}

fn write_option(html: &mut String, value: &str, selected: &str) -> std::fmt::Result {
    let attr = if value == selected { " selected" } else { "" };
    let value = escape(value);
    write!(html, "<option value=\"{value}\"{attr}>{value}</option>")
}

fn write_outcome(html: &mut String, outcome: &Outcome) -> std::fmt::Result {
    match outcome {
        Outcome::Idle => Ok(()),
        Outcome::Invalid(missing) => {
            write!(html, "<div class=\"error\">{}</div>", escape(&missing.to_string()))
        }
        Outcome::Answered(answer) => write_answer(html, answer),
        Outcome::Failed(diagnostic) => write_failure(html, diagnostic),
    }
}

fn write_answer(html: &mut String, answer: &Answer) -> std::fmt::Result {
    write!(
        html,
        "<div class=\"success\">{SUCCESS_BANNER}</div><h3>Response</h3><p>{}</p>",
        escape(&answer.response_text)
    )?;
    if let Some(citation) = &answer.citation {
        write!(
            html,
            "<details><summary>Source Document Details</summary>\
             <h4>Most Relevant Source</h4><p><strong>Node ID:</strong> {}</p>\
             <label>Source Text (First 500 characters)\
             <textarea readonly rows=\"10\">{}</textarea></label>\
             <p><strong>Relevance Score:</strong> {}</p></details>",
            escape(&citation.node_id),
            escape(citation.excerpt()),
            citation.score
        )?;
    }
    Ok(())
}

fn write_failure(html: &mut String, diagnostic: &Diagnostic) -> std::fmt::Result {
    write!(
        html,
        "<div class=\"error\">{ERROR_BANNER}</div>\
         <details><summary>Error Details</summary><p>Error Message: {}</p>\
         <pre><code>{}</code></pre></details><div class=\"info\">{FOLLOW_UP_NOTICE}</div>",
        escape(&diagnostic.message),
        escape(&diagnostic.trace)
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
