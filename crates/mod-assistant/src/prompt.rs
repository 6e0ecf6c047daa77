use inbox_domain::{DocumentMetadata, EmailDocument, RetrievedDocument};

pub const BODY_CHAR_LIMIT: usize = 8000;
pub const CONTEXT_CHAR_LIMIT: usize = 12_000;

/// Text stored and embedded for an email: a short header block, then the body.
pub fn document_text(doc: &EmailDocument) -> String {
    let body = doc
        .body_text
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .or_else(|| {
            doc.body_html
                .as_deref()
                .map(strip_html)
                .filter(|b| !b.is_empty())
        })
        .or_else(|| doc.snippet.clone())
        .unwrap_or_default();

    let mut lines = vec![
        format!("Subject: {}", doc.subject),
        format!("From: {}", doc.sender),
    ];
    if !doc.recipients.is_empty() {
        lines.push(format!("To: {}", doc.recipients.join(", ")));
    }
    if let Some(ts) = doc.timestamp {
        lines.push(format!("Date: {}", ts.to_rfc3339()));
    }
    lines.push(String::new());
    lines.push(truncate_chars(&body, BODY_CHAR_LIMIT));
    lines.join("\n")
}

pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Numbered, attributed documents; stops before the block would exceed `max_chars`.
pub fn answer_context(docs: &[RetrievedDocument], max_chars: usize) -> String {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        let part = format!(
            "Email {} from {} (Subject: {}):\n{}\n---",
            i + 1,
            display_or_unknown(&doc.metadata.sender),
            display_or_unknown(&doc.metadata.subject),
            doc.content
        );
        let sep = if out.is_empty() { 0 } else { 1 };
        let used = out.chars().count();
        if used + sep + part.chars().count() > max_chars {
            if out.is_empty() {
                out = truncate_chars(&part, max_chars);
            }
            break;
        }
        if sep == 1 {
            out.push('\n');
        }
        out.push_str(&part);
    }
    out
}

pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an intelligent email assistant. Use the following retrieved emails to answer the user's question accurately.\n\
         If the answer is not in the emails, say \"I don't have enough information in your emails to answer that.\"\n\
         \n\
         Retrieved Emails:\n\
         {context}\n\
         \n\
         User Question: {question}\n\
         \n\
         Answer:"
    )
}

pub fn highlights_context(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|doc| highlight_line(&doc.metadata))
        .collect::<Vec<_>>()
        .join("\n")
}

fn highlight_line(meta: &DocumentMetadata) -> String {
    let date = meta
        .timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "- From: {}, Subject: {}, Date: {date}",
        display_or_unknown(&meta.sender),
        display_or_unknown(&meta.subject)
    )
}

pub fn highlights_prompt(context: &str) -> String {
    format!(
        "Analyze the following list of emails and identify the top 3-5 most important ones that require attention.\n\
         Summarize why each is important.\n\
         \n\
         Emails:\n\
         {context}\n\
         \n\
         Important Emails Summary:"
    )
}

fn display_or_unknown(s: &str) -> &str {
    if s.trim().is_empty() {
        "unknown"
    } else {
        s
    }
}
