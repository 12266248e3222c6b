//! Details collapsing and example rendering for documentation prose.
//!
//! Hyperschema descriptions mix markdown with HTML `<details>` blocks and
//! inline `::example[id]` tokens. Two rendering modes keep LLM context
//! small by default while allowing targeted drill-down:
//!
//! - *Summary mode* (empty filter): every `<details>` keeps only its
//!   summary, every example token becomes a collapsed placeholder, and any
//!   unreferenced examples of the link are appended as placeholders.
//! - *Filter mode* (non-empty filter): only the blocks and examples whose
//!   summary/title appears verbatim in the filter are returned, fully
//!   rendered and opened; everything else is elided.

use crate::hyperschema::DocExample;
use regex::Regex;
use std::sync::LazyLock;

static DETAILS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<details>\s*<summary>(?P<summary>.*?)</summary>(?P<body>.*?)</details>")
        .expect("valid details regex")
});

static EXAMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::example\[(?P<id>[^\]]+)\]").expect("valid example token regex")
});

/// Renders a description in summary or filter mode.
///
/// `examples` are the link's documented examples; `expand_details` is the
/// list of summary/title strings to expand (empty selects summary mode).
#[must_use]
pub fn render_description(
    description: &str,
    examples: &[DocExample],
    expand_details: &[String],
) -> String {
    if expand_details.is_empty() {
        render_summary(description, examples)
    } else {
        render_filtered(description, examples, expand_details)
    }
}

fn render_summary(description: &str, examples: &[DocExample]) -> String {
    let collapsed = DETAILS_RE.replace_all(description, |caps: &regex::Captures<'_>| {
        format!("<details><summary>{}</summary></details>", caps["summary"].trim())
    });

    let mut referenced = Vec::new();
    let with_examples = EXAMPLE_RE.replace_all(&collapsed, |caps: &regex::Captures<'_>| {
        let id = &caps["id"];
        referenced.push(id.to_string());
        examples.iter().find(|e| e.id == id).map_or_else(
            || format!("<details><summary>Example: {id}</summary></details>"),
            |example| format!("<details><summary>{}</summary></details>", example_summary(example)),
        )
    });

    let mut output = with_examples.into_owned();
    for example in examples {
        if !referenced.contains(&example.id) {
            output.push_str(&format!(
                "\n\n<details><summary>{}</summary></details>",
                example_summary(example)
            ));
        }
    }
    output
}

fn render_filtered(
    description: &str,
    examples: &[DocExample],
    expand_details: &[String],
) -> String {
    let mut sections = Vec::new();

    for caps in DETAILS_RE.captures_iter(description) {
        let summary = caps["summary"].trim();
        if expand_details.iter().any(|wanted| wanted == summary) {
            sections.push(format!(
                "<details open>\n<summary>{summary}</summary>\n\n{}\n</details>",
                caps["body"].trim()
            ));
        }
    }

    for example in examples {
        let summary = example_summary(example);
        let title_matches = example
            .title
            .as_deref()
            .is_some_and(|t| expand_details.iter().any(|wanted| wanted == t));
        if title_matches || expand_details.iter().any(|wanted| *wanted == summary) {
            sections.push(render_example(example));
        }
    }

    sections.join("\n\n")
}

fn example_summary(example: &DocExample) -> String {
    example
        .title
        .clone()
        .unwrap_or_else(|| format!("Example: {}", example.id))
}

/// Renders one example fully: description plus request/response fences.
#[must_use]
pub fn render_example(example: &DocExample) -> String {
    let mut out = format!(
        "<details open>\n<summary>{}</summary>\n",
        example_summary(example)
    );
    if let Some(description) = example.description.as_deref() {
        if !description.is_empty() {
            out.push_str(&format!("\n{description}\n"));
        }
    }
    if let Some(code) = example.request.as_ref().and_then(|r| r.code.as_deref()) {
        out.push_str(&format!("\n```js\n{code}\n```\n"));
    }
    if let Some(code) = example.response.as_ref().and_then(|r| r.code.as_deref()) {
        out.push_str(&format!("\n```json\n{code}\n```\n"));
    }
    out.push_str("</details>");
    out
}
