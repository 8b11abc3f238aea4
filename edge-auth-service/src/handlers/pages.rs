//! Fallback page renderer standing in for the rendering layer behind the
//! guard and the edge cache.

use axum::{
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};

use crate::middleware::CurrentSession;

pub async fn render_page(uri: Uri, current: Option<CurrentSession>) -> Response {
    let path = uri.path();
    let title = escape_html(path);
    let greeting = match &current {
        Some(current) => format!(
            "<p>Signed in as <code>{}</code></p>",
            escape_html(&current.session.user_id)
        ),
        None => "<p>Not signed in</p>".to_string(),
    };

    let body = format!(
        "<!doctype html>\n<html><head><title>{title}</title></head>\
         <body><h1>{title}</h1>{greeting}</body></html>\n"
    );
    (StatusCode::OK, Html(body)).into_response()
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
