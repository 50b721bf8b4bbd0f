// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTML pages served by the tracking redirect.

use plaudit_storage::ClickContext;

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
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

/// Where a click is sent: business review link, then the record's review
/// URL, then the business website, then `fallback`. Blank candidates are skipped.
pub fn resolve_target<'a>(context: &'a ClickContext, fallback: &'a str) -> &'a str {
    [
        context.business_review_link.as_deref(),
        context.record_review_url.as_deref(),
        context.business_website.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|candidate| !candidate.is_empty())
    .unwrap_or(fallback)
}

fn layout(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <meta name=\"robots\" content=\"noindex\">\n{head_extra}<title>{title}</title>\n\
         <style>body{{font-family:system-ui,sans-serif;max-width:32rem;margin:4rem auto;\
         padding:0 1rem;color:#222;text-align:center}}a{{color:#0b6bcb}}</style>\n\
         </head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

/// The transitional page: meta refresh plus a manual link to `target`.
pub fn redirect_page(context: &ClickContext, target: &str) -> String {
    let target = escape_html(target);
    let business = escape_html(&context.business_name);
    let greeting = match context
        .customer_first_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        Some(name) => format!("Thanks, {}!", escape_html(name)),
        None => "Thanks!".to_string(),
    };
    layout(
        &format!("Review {}", context.business_name),
        &format!("<meta http-equiv=\"refresh\" content=\"0; url={target}\">\n"),
        &format!(
            "<h1>{greeting}</h1>\n<p>Taking you to leave a review for {business}.</p>\n\
             <p><a href=\"{target}\" rel=\"noopener\">Continue to {business}</a></p>"
        ),
    )
}

pub fn not_found_page() -> String {
    layout(
        "Link not found",
        "",
        "<h1>Link not found</h1>\n<p>This link is not valid. Please check the message you received.</p>",
    )
}

pub fn inactive_page() -> String {
    layout(
        "Link no longer active",
        "",
        "<h1>This link is no longer active</h1>\n<p>The request behind this link has been withdrawn.</p>",
    )
}

pub fn error_page() -> String {
    layout(
        "Something went wrong",
        "",
        "<h1>Sorry, something went wrong</h1>\n<p>Please try the link again in a few minutes.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaudit_core::DispatchStatus;

    fn context() -> ClickContext {
        ClickContext {
            dispatch_id: "d1".into(),
            status: DispatchStatus::Clicked,
            business_name: "Corner Bakery".into(),
            customer_first_name: Some("Ada".into()),
            business_review_link: None,
            record_review_url: None,
            business_website: None,
        }
    }

    #[test]
    fn escapes_markup_and_quotes() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn target_priority_prefers_business_review_link() {
        let mut ctx = context();
        ctx.business_review_link = Some("https://review.example".into());
        ctx.record_review_url = Some("https://record.example".into());
        ctx.business_website = Some("https://site.example".into());
        assert_eq!(resolve_target(&ctx, "https://fallback.example"), "https://review.example");

        ctx.business_review_link = Some("   ".into());
        assert_eq!(resolve_target(&ctx, "https://fallback.example"), "https://record.example");

        ctx.record_review_url = None;
        assert_eq!(resolve_target(&ctx, "https://fallback.example"), "https://site.example");

        ctx.business_website = Some(String::new());
        assert_eq!(resolve_target(&ctx, "https://fallback.example"), "https://fallback.example");
    }

    #[test]
    fn redirect_page_is_personalized_and_escaped() {
        let mut ctx = context();
        ctx.business_name = "Bob's <Diner>".into();
        let page = redirect_page(&ctx, "https://x.example/?a=1&b=2");
        assert!(page.contains("Thanks, Ada!"));
        assert!(page.contains("Bob&#39;s &lt;Diner&gt;"));
        assert!(page.contains("content=\"0; url=https://x.example/?a=1&amp;b=2\""));
        assert!(page.contains("href=\"https://x.example/?a=1&amp;b=2\""));
        assert!(!page.contains("<Diner>"));
    }

    #[test]
    fn missing_first_name_falls_back_to_plain_greeting() {
        let mut ctx = context();
        ctx.customer_first_name = Some(" ".into());
        assert!(redirect_page(&ctx, "https://x.example").contains("<h1>Thanks!</h1>"));
    }
}
