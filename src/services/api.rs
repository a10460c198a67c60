use crate::errors::ApiError;
use crate::model::{
    Audience, FormDefinition, LinkRequest, ShareLink, Submission, SubmissionPayload,
};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

/// Boundary to the forms backend. Implementations must be shareable across worker threads.
pub trait FormApi: Send + Sync {
    fn fetch_layout(&self, form_id: &str, audience: Audience) -> Result<FormDefinition, ApiError>;

    fn create_layout(&self, form_id: &str, def: &FormDefinition)
        -> Result<FormDefinition, ApiError>;

    fn update_layout(&self, form_id: &str, def: &FormDefinition)
        -> Result<FormDefinition, ApiError>;

    fn list_responses(&self, form_id: &str) -> Result<Vec<Submission>, ApiError>;

    fn submit(
        &self,
        form_id: &str,
        audience: Audience,
        payload: &SubmissionPayload,
    ) -> Result<Submission, ApiError>;

    fn generate_link(&self, form_id: &str, req: &LinkRequest) -> Result<ShareLink, ApiError>;
}

#[derive(Clone, Copy, Debug)]
enum Verb {
    Get,
    Post,
    Patch,
}

impl Verb {
    fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
        }
    }
}

pub struct HttpFormApi {
    base: Url,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpFormApi {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("parsing api url {base_url}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("api url cannot be used as a base: {base_url}"));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("formdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building http client")?;
        Ok(Self {
            base,
            token: token.map(String::from),
            client,
        })
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn send<T: DeserializeOwned>(
        &self,
        verb: Verb,
        segments: &[&str],
        body: Option<JsonValue>,
        authed: bool,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        let url_s = url.to_string();
        let mut req = match verb {
            Verb::Get => self.client.get(url),
            Verb::Post => self.client.post(url),
            Verb::Patch => self.client.patch(url),
        };
        if authed {
            if let Some(tok) = &self.token {
                req = req.bearer_auth(tok);
            }
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        tracing::debug!(method = verb.as_str(), url = %url_s, "api request");
        let resp = req.send().map_err(|source| ApiError::Transport {
            url: url_s.clone(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().map_err(|source| ApiError::Transport {
            url: url_s.clone(),
            source,
        })?;
        if !status.is_success() {
            tracing::warn!(method = verb.as_str(), url = %url_s, status = status.as_u16(), "api error");
            // Every route is `<collection>/<form id>/...`
            let form_id = segments.get(1).copied();
            return Err(status_error(verb, url_s, form_id, status.as_u16(), &text));
        }
        decode_body(&url_s, &text)
    }

    fn encode<B: serde::Serialize>(url: &str, body: &B) -> Result<JsonValue, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: format!("encoding request body: {e}"),
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

fn status_error(verb: Verb, url: String, form_id: Option<&str>, status: u16, body: &str) -> ApiError {
    if status == reqwest::StatusCode::NOT_FOUND.as_u16() {
        return ApiError::NotFound(form_id.map(String::from).unwrap_or(url));
    }
    ApiError::Status {
        method: verb.as_str(),
        url,
        status,
        body: truncate(body, 200),
    }
}

/// Accept bare payloads as well as `{"data": ...}` envelopes.
pub(crate) fn unwrap_envelope(v: JsonValue) -> JsonValue {
    match v {
        JsonValue::Object(mut map)
            if map.contains_key("data")
                && !map.contains_key("id")
                && !map.contains_key("submittedAt") =>
        {
            map.remove("data").unwrap_or(JsonValue::Null)
        }
        other => other,
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(url: &str, text: &str) -> Result<T, ApiError> {
    let v: JsonValue = serde_json::from_str(text).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_value(unwrap_envelope(v)).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

impl FormApi for HttpFormApi {
    fn fetch_layout(&self, form_id: &str, audience: Audience) -> Result<FormDefinition, ApiError> {
        match audience {
            Audience::Member => self.send(Verb::Get, &["forms", form_id, "layout"], None, true),
            Audience::Guest => self.send(Verb::Get, &["form-guard", form_id], None, false),
        }
    }

    fn create_layout(
        &self,
        form_id: &str,
        def: &FormDefinition,
    ) -> Result<FormDefinition, ApiError> {
        let body = Self::encode(form_id, def)?;
        self.send(Verb::Post, &["forms", form_id, "layout"], Some(body), true)
    }

    fn update_layout(
        &self,
        form_id: &str,
        def: &FormDefinition,
    ) -> Result<FormDefinition, ApiError> {
        let body = Self::encode(form_id, def)?;
        self.send(Verb::Patch, &["forms", form_id, "layout"], Some(body), true)
    }

    fn list_responses(&self, form_id: &str) -> Result<Vec<Submission>, ApiError> {
        self.send(Verb::Get, &["forms", form_id, "responses"], None, true)
    }

    fn submit(
        &self,
        form_id: &str,
        audience: Audience,
        payload: &SubmissionPayload,
    ) -> Result<Submission, ApiError> {
        let body = Self::encode(form_id, payload)?;
        match audience {
            Audience::Member => {
                self.send(Verb::Post, &["forms", form_id, "responses"], Some(body), true)
            }
            Audience::Guest => self.send(Verb::Post, &["form-guard", form_id], Some(body), false),
        }
    }

    fn generate_link(&self, form_id: &str, req: &LinkRequest) -> Result<ShareLink, ApiError> {
        let body = Self::encode(form_id, req)?;
        self.send(
            Verb::Post,
            &["forms", form_id, "generate-link"],
            Some(body),
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api(base: &str) -> HttpFormApi {
        HttpFormApi::new(base, Some("tok"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoints_join_and_escape_segments() {
        let a = api("https://tracker.example.com/api/");
        assert_eq!(
            a.endpoint(&["forms", "42", "layout"]).as_str(),
            "https://tracker.example.com/api/forms/42/layout"
        );
        let b = api("https://tracker.example.com/api");
        assert_eq!(
            b.endpoint(&["form-guard", "a b/c"]).as_str(),
            "https://tracker.example.com/api/form-guard/a%20b%2Fc"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(HttpFormApi::new("mailto:x@y.z", None, Duration::from_secs(1)).is_err());
        assert!(HttpFormApi::new("not a url", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn envelope_is_unwrapped_but_submissions_are_not() {
        let env = json!({"data": [{"id": "r1", "submittedAt": "2024-01-01T00:00:00Z", "data": {"f1": "x"}}]});
        let subs: Vec<Submission> = decode_body("u", &env.to_string()).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].data.len(), 1);

        let bare = json!({"id": "r2", "submittedAt": "2024-01-01T00:00:00Z", "data": {"f1": "y"}});
        let sub: Submission = decode_body("u", &bare.to_string()).unwrap();
        assert_eq!(sub.id, "r2");

        let layout = json!({"data": {"title": "T", "sections": []}, "success": true});
        let def: FormDefinition = decode_body("u", &layout.to_string()).unwrap();
        assert_eq!(def.title, "T");
    }

    #[test]
    fn not_found_names_the_form_and_other_statuses_keep_details() {
        let err = status_error(Verb::Get, "http://h/forms/f1/layout".into(), Some("f1"), 404, "");
        assert!(matches!(err, ApiError::NotFound(ref id) if id == "f1"));
        let err = status_error(Verb::Post, "http://h/x".into(), None, 404, "");
        assert!(matches!(err, ApiError::NotFound(ref id) if id == "http://h/x"));
        let err = status_error(Verb::Patch, "http://h/forms/f1/layout".into(), Some("f1"), 410, "gone");
        assert!(err.is_terminal());
        assert!(matches!(err, ApiError::Status { method: "PATCH", status: 410, .. }));
    }

    #[test]
    fn missing_layout_over_http_is_not_found() {
        use std::io::{Read, Write};
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 1024];
            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }
            conn.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
            )
            .unwrap();
            String::from_utf8_lossy(&req).into_owned()
        });

        let err = api(&format!("http://{addr}/api"))
            .fetch_layout("feedback", Audience::Member)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref id) if id == "feedback"));
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /api/forms/feedback/layout"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok"));
    }

    #[test]
    fn decode_errors_carry_url() {
        let err = decode_body::<FormDefinition>("http://h/forms/1/layout", "{").unwrap_err();
        assert!(matches!(err, ApiError::Decode { ref url, .. } if url == "http://h/forms/1/layout"));
    }
}
