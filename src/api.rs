//! Blocking client for the remote file API
//!
//! API calls send `Content-Type: application/json`; upload bodies go out as
//! `application/pdf`. The session token travels as the `token` cookie and only
//! to URLs on the API's own origin. Non-2xx responses become
//! [`ApiError::Http`] carrying the response body, or `Request failed:
//! <status>` when the body is empty. JSON is decoded only when the response
//! says it is JSON.

use std::path::{Path, PathBuf};

use log::{debug, info};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::settings;

const JSON_MIME: &str = "application/json";
const PDF_MIME: &str = "application/pdf";
const SESSION_COOKIE: &str = "token";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {detail}")]
    Decode { url: String, detail: String },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stored file as listed by `GET /files`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

impl FileItem {
    #[must_use]
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
}

/// Signed-in account as returned by `GET /me`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: String,
    pub plan: String,
    pub created_at: String,
}

/// Metadata record created by `POST /files` ahead of the byte upload
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadSlot {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    #[serde(default)]
    pub storage_key: Option<String>,
}

impl UploadSlot {
    /// Path the bytes are PUT to. The advertised `uploadUrl` goes through the
    /// web proxy, so the storage key is preferred when the API returns one.
    #[must_use]
    pub fn put_path(&self) -> String {
        match &self.storage_key {
            Some(key) => format!("/upload/{key}"),
            None => self.upload_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct NewFile<'a> {
    name: &'a str,
    size: u64,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    origin: Option<Url>,
    session_token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session_token: Option<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let http = Client::builder()
            .user_agent(concat!("pdfpane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ApiError::Transport {
                url: base_url.clone(),
                source,
            })?;

        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            origin: Url::parse(&base_url).ok(),
            base_url,
            session_token,
            http,
        })
    }

    /// Client configured from the loaded settings and environment
    pub fn from_settings() -> Result<Self, ApiError> {
        Self::new(settings::get_api_url(), settings::get_session_token())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Whether `url` shares scheme, host and port with the API base.
    /// Unparseable URLs never match.
    #[must_use]
    pub fn is_same_origin(&self, url: &str) -> bool {
        let (Some(origin), Ok(url)) = (&self.origin, Url::parse(url)) else {
            return false;
        };
        origin.scheme() == url.scheme()
            && origin.host_str() == url.host_str()
            && origin.port_or_known_default() == url.port_or_known_default()
    }

    /// GET an API path, decoding JSON if the response carries any
    pub fn request<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        let url = self.url(path);
        let response = self.send(self.http.get(&url), &url)?;
        decode_json(response, url)
    }

    pub fn health(&self) -> Result<Health, ApiError> {
        self.request_json("/health")
    }

    pub fn list_files(&self) -> Result<Vec<FileItem>, ApiError> {
        self.request_json("/files")
    }

    pub fn file(&self, id: &str) -> Result<FileItem, ApiError> {
        self.request_json(&format!("/files/{id}"))
    }

    pub fn me(&self) -> Result<User, ApiError> {
        self.request_json("/me")
    }

    /// Sign in and return the session token the API set as its cookie
    pub fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let url = self.url("/auth/login");
        let body = encode_json(&url, &Credentials { email, password })?;
        let response = self.send(self.http.post(&url).body(body), &url)?;

        let token = session_cookie(&response).ok_or_else(|| ApiError::Decode {
            url: url.clone(),
            detail: format!("no `{SESSION_COOKIE}` cookie in the login response"),
        })?;
        info!("Signed in as {email}");
        Ok(token)
    }

    /// Ask the API to drop the session. The local token is the caller's to clear.
    pub fn logout(&self) -> Result<(), ApiError> {
        let url = self.url("/auth/logout");
        self.send(self.http.post(&url), &url)?;
        Ok(())
    }

    /// Register a local PDF with `POST /files`, then PUT its bytes
    pub fn upload(&self, path: &Path) -> Result<UploadSlot, ApiError> {
        let bytes = std::fs::read(path).map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let url = self.url("/files");
        let body = encode_json(
            &url,
            &NewFile {
                name: &name,
                size: bytes.len() as u64,
            },
        )?;
        let response = self.send(self.http.post(&url).body(body), &url)?;
        let slot: UploadSlot = decode_json(response, url.clone())?.ok_or_else(|| ApiError::Decode {
            url,
            detail: "expected a JSON body".to_string(),
        })?;

        let put_url = self.url(&slot.put_path());
        debug!("Uploading {} bytes of {name} to {put_url}", bytes.len());
        let request = self
            .http
            .put(&put_url)
            .header(CONTENT_TYPE, PDF_MIME)
            .body(bytes);
        self.send_raw(request, &put_url)?;

        info!("Uploaded {name} as {}", slot.file_id);
        Ok(slot)
    }

    /// Raw bytes behind an absolute URL, such as a file's content endpoint
    pub fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.send(self.http.get(url), url)?;
        let bytes = response.bytes().map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    fn request_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(path)?.ok_or_else(|| ApiError::Decode {
            url: self.url(path),
            detail: "expected a JSON body".to_string(),
        })
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, ApiError> {
        self.send_raw(request.header(CONTENT_TYPE, JSON_MIME), url)
    }

    fn send_raw(&self, mut request: RequestBuilder, url: &str) -> Result<Response, ApiError> {
        match &self.session_token {
            Some(token) if self.is_same_origin(url) => {
                request = request.header(COOKIE, format!("{SESSION_COOKIE}={token}"));
            }
            Some(_) => debug!("Not sending the session cookie to foreign origin {url}"),
            None => {}
        }

        debug!("Sending request to {url}");
        let response = request.send().map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        Err(http_error(status.as_u16(), &body))
    }
}

fn decode_json<T: DeserializeOwned>(response: Response, url: String) -> Result<Option<T>, ApiError> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if !is_json(content_type.as_deref()) {
        return Ok(None);
    }

    let body = response.bytes().map_err(|source| ApiError::Transport {
        url: url.clone(),
        source,
    })?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| ApiError::Decode {
            url,
            detail: e.to_string(),
        })
}

fn encode_json<T: Serialize>(url: &str, value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        detail: e.to_string(),
    })
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(cookie_value)
}

/// Value of the session cookie in one `Set-Cookie` header, if it sets it
fn cookie_value(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name.trim() == SESSION_COOKIE && !value.is_empty()).then(|| value.trim().to_string())
}

fn http_error(status: u16, body: &str) -> ApiError {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("Request failed: {status}")
    } else {
        body.to_string()
    };
    ApiError::Http { status, message }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains(JSON_MIME))
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    struct Reply {
        status: &'static str,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static [u8],
    }

    impl Reply {
        fn new(status: &'static str, body: &'static [u8]) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body,
            }
        }

        fn json(status: &'static str, body: &'static str) -> Self {
            Self::new(status, body.as_bytes()).header("Content-Type", "application/json")
        }

        fn header(mut self, name: &'static str, value: &'static str) -> Self {
            self.headers.push((name, value));
            self
        }
    }

    /// Answers one connection per reply, in order, and returns the raw requests
    fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for reply in replies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(&stream);

                let mut request = String::new();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                    request.push_str(&line);
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                }
                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).unwrap();
                request.push_str(&String::from_utf8_lossy(&body));
                requests.push(request);

                let mut head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str("\r\n");

                let mut stream = &stream;
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(reply.body).unwrap();
                stream.flush().unwrap();
            }
            requests
        });

        (base, handle)
    }

    fn sends_session_cookie(request: &str, token: &str) -> bool {
        request
            .to_ascii_lowercase()
            .contains(&format!("cookie: token={}", token.to_ascii_lowercase()))
    }

    #[test]
    fn joins_paths_onto_base() {
        assert_eq!(join_url("http://api:8080", "/files"), "http://api:8080/files");
        assert_eq!(join_url("http://api:8080/", "files/1"), "http://api:8080/files/1");
        assert_eq!(
            join_url("http://api:8080", "https://cdn.example.com/a.pdf"),
            "https://cdn.example.com/a.pdf"
        );
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/files/7"), "http://localhost:8080/files/7");
    }

    #[test]
    fn http_errors_prefer_body_text() {
        let err = http_error(401, "  unauthorized\n");
        assert!(matches!(err, ApiError::Http { status: 401, .. }));
        assert_eq!(err.to_string(), "unauthorized");

        assert_eq!(http_error(502, "").to_string(), "Request failed: 502");
    }

    #[test]
    fn json_detection_is_lenient() {
        assert!(is_json(Some("application/json")));
        assert!(is_json(Some("Application/JSON; charset=utf-8")));
        assert!(!is_json(Some("application/pdf")));
        assert!(!is_json(None));
    }

    #[test]
    fn file_items_decode_with_optional_fields() {
        let json = r#"[
            {"id": "a1", "name": "report.pdf", "size": 2097152, "created_at": "2024-01-02T03:04:05Z"},
            {"id": "b2", "name": "scan.pdf", "size": 10, "created_at": "2024-01-03T00:00:00Z",
             "storage_key": "u1/scan.pdf"}
        ]"#;
        let files: Vec<FileItem> = serde_json::from_str(json).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].content_url, None);
        assert!((files[0].size_mb() - 2.0).abs() < f64::EPSILON);
        assert_eq!(files[1].storage_key.as_deref(), Some("u1/scan.pdf"));
    }

    #[test]
    fn same_origin_compares_scheme_host_and_port() {
        let client = ApiClient::new("http://api.local:8080/", None).unwrap();
        assert!(client.is_same_origin("http://api.local:8080/files/1/content"));
        assert!(!client.is_same_origin("https://api.local:8080/files"));
        assert!(!client.is_same_origin("http://api.local:9090/files"));
        assert!(!client.is_same_origin("http://cdn.example.com/a.pdf"));
        assert!(!client.is_same_origin("not a url"));

        let default_port = ApiClient::new("https://api.local", None).unwrap();
        assert!(default_port.is_same_origin("https://api.local:443/me"));
    }

    #[test]
    fn session_cookie_reaches_the_api_host() {
        let (base, server) = serve(vec![Reply::json("200 OK", "[]")]);
        let client = ApiClient::new(base, Some("SECRET".to_string())).unwrap();

        let files = client.list_files().unwrap();

        assert!(files.is_empty());
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /files "));
        assert!(sends_session_cookie(&requests[0], "SECRET"));
    }

    #[test]
    fn session_cookie_is_withheld_from_foreign_hosts() {
        let (base, server) = serve(vec![
            Reply::new("200 OK", b"%PDF-1.7").header("Content-Type", "application/pdf"),
        ]);
        let client = ApiClient::new("http://api.example.invalid", Some("SECRET".to_string())).unwrap();

        let bytes = client.download(&format!("{base}/elsewhere/report.pdf")).unwrap();

        assert_eq!(bytes, b"%PDF-1.7");
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /elsewhere/report.pdf "));
        assert!(!requests[0].contains("SECRET"));
    }

    #[test]
    fn non_json_responses_decode_to_nothing() {
        let (base, server) = serve(vec![
            Reply::new("200 OK", b"ok").header("Content-Type", "text/plain"),
            Reply::new("200 OK", b"ok").header("Content-Type", "text/plain"),
        ]);
        let client = ApiClient::new(base, None).unwrap();

        let health: Option<Health> = client.request("/health").unwrap();
        assert_eq!(health, None);

        let err = client.health().unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
        server.join().unwrap();
    }

    #[test]
    fn failed_responses_surface_as_http_errors() {
        let (base, server) = serve(vec![
            Reply::new("401 Unauthorized", b"unauthorized\n"),
            Reply::new("502 Bad Gateway", b""),
        ]);
        let client = ApiClient::new(base, None).unwrap();

        let err = client.list_files().unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 401, .. }));
        assert_eq!(err.to_string(), "unauthorized");

        let err = client.file("abc").unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 502, .. }));
        assert_eq!(err.to_string(), "Request failed: 502");
        server.join().unwrap();
    }

    #[test]
    fn cookie_values_are_read_from_set_cookie_headers() {
        assert_eq!(
            cookie_value("token=abc.def; Path=/; Max-Age=86400; HttpOnly").as_deref(),
            Some("abc.def")
        );
        assert_eq!(cookie_value("token=; Path=/; Max-Age=0"), None);
        assert_eq!(cookie_value("theme=dark"), None);
    }

    #[test]
    fn login_returns_the_session_cookie() {
        let (base, server) = serve(vec![
            Reply::json("200 OK", r#"{"message":"logged in"}"#)
                .header("Set-Cookie", "token=jwt-123; Path=/; Max-Age=86400; HttpOnly"),
        ]);
        let client = ApiClient::new(base, None).unwrap();

        let token = client.login("ada@example.com", "hunter2").unwrap();

        assert_eq!(token, "jwt-123");
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /auth/login "));
        assert!(requests[0].contains(r#""email":"ada@example.com""#));
        assert!(requests[0].contains(r#""password":"hunter2""#));
    }

    #[test]
    fn login_without_a_cookie_is_an_error() {
        let (base, server) = serve(vec![Reply::json("200 OK", r#"{"message":"logged in"}"#)]);
        let client = ApiClient::new(base, None).unwrap();

        let err = client.login("ada@example.com", "hunter2").unwrap_err();

        assert!(matches!(err, ApiError::Decode { .. }));
        server.join().unwrap();
    }

    #[test]
    fn me_decodes_the_account() {
        let (base, server) = serve(vec![Reply::json(
            "200 OK",
            r#"{"id":"u1","email":"ada@example.com","role":"user","plan":"free","created_at":"2024-01-02T03:04:05Z"}"#,
        )]);
        let client = ApiClient::new(base, Some("SECRET".to_string())).unwrap();

        let user = client.me().unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.plan, "free");
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /me "));
        assert!(sends_session_cookie(&requests[0], "SECRET"));
    }

    #[test]
    fn upload_registers_then_puts_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let (base, server) = serve(vec![
            Reply::json(
                "201 Created",
                r#"{"fileId":"f1","uploadUrl":"/api/upload/f1.pdf","storage_key":"f1.pdf"}"#,
            ),
            Reply::new("200 OK", b""),
        ]);
        let client = ApiClient::new(base, Some("SECRET".to_string())).unwrap();

        let slot = client.upload(&path).unwrap();

        assert_eq!(slot.file_id, "f1");
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /files "));
        assert!(requests[0].contains(r#""name":"report.pdf""#));
        assert!(requests[0].contains(r#""size":8"#));
        assert!(requests[1].starts_with("PUT /upload/f1.pdf "));
        assert!(requests[1].ends_with("%PDF-1.4"));
    }

    #[test]
    fn upload_of_a_missing_file_fails_before_any_request() {
        let client = ApiClient::new("http://api.example.invalid", None).unwrap();
        let err = client.upload(Path::new("/no/such/file.pdf")).unwrap_err();
        assert!(matches!(err, ApiError::Io { .. }));
    }
}
