use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::index::Index;
use crate::{Message, MessageSender, format_time, html};

/// Pulls the value of one query string parameter, form-decoded.
fn query_param(query_string: &str, name: &str) -> Option<String> {
    query_string.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != name {
            return None;
        }

        let value = value.replace('+', " ");
        match urlencoding::decode(&value) {
            Ok(decoded) => Some(decoded.into_owned()),
            Err(_) => Some(value),
        }
    })
}

fn html_response(body: String, status_code: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body).with_status_code(StatusCode(status_code));
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        response = response.with_header(header);
    }
    response
}

/// Serves the query form on `GET /`. A request without a query renders the
/// landing page, one with `?q=` runs the query and renders the results. The
/// index is opened once and never mutated, so requests are handled one after
/// the other straight off the accept loop.
pub fn run_server(index_dir: &Path, port: u16, sender: MessageSender) -> anyhow::Result<()> {
    let index = Index::open(index_dir, None, false, sender.clone()).context("open index")?;

    let addr = format!("0.0.0.0:{port}");
    let server = Server::http(&addr)
        .map_err(|err| anyhow::anyhow!("failed to bind server to {addr}: {err}"))?;
    println!("Server listening on http://localhost:{port}");

    for request in server.incoming_requests() {
        let _ = sender.lock().unwrap().send(Message::Info(format!(
            "{} {}",
            request.method(),
            request.url()
        )));

        if request.method() != &Method::Get {
            let response = html_response(html::NOT_FOUND_PAGE.to_string(), 405);
            let _ = request.respond(response);
            continue;
        }

        let url = request.url().to_string();
        let (path, query_string) = url.split_once('?').unwrap_or((url.as_str(), ""));

        if path != "/" {
            let _ = request.respond(html_response(html::NOT_FOUND_PAGE.to_string(), 404));
            continue;
        }

        let query = query_param(query_string, "q")
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let response = match query {
            None => html_response(html::HOME_PAGE.to_string(), 200),
            Some(query) => {
                let start = Instant::now();
                match index.find(&query) {
                    Ok(websites) => {
                        let duration = format_time(start.elapsed().as_nanos());
                        html_response(html::results_page(&query, &websites, &duration), 200)
                    }
                    Err(err) => {
                        let _ = sender
                            .lock()
                            .unwrap()
                            .send(Message::Error(format!("query {query:?} failed: {err:#}")));
                        html_response("Search failed".to_string(), 500)
                    }
                }
            }
        };
        let _ = request.respond(response);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() {
        assert_eq!(query_param("q=hello", "q"), Some("hello".to_string()));
        assert_eq!(
            query_param("lang=en&q=hello+world", "q"),
            Some("hello world".to_string())
        );
        assert_eq!(
            query_param("q=50%25%20off", "q"),
            Some("50% off".to_string())
        );
        assert_eq!(query_param("other=1", "q"), None);
        assert_eq!(query_param("", "q"), None);
    }
}
