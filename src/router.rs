//! Café directory router module
//!
//! This module provides the routing and HTTP infrastructure for the site:
//!
//! - Path and parameter-based routing of HTTP endpoints, per method
//! - Global and route-specific middleware (pre and post)
//! - A plain HTTP/1.1 server over TcpListener with manual request parsing,
//!   including urlencoded form bodies
//! - Graceful shutdown on Ctrl-C or SIGTERM
//!
//! Every response is sent with `Connection: close`; the server is built for
//! a browser clicking through pages, not for high-volume API traffic.

use crate::cafes::CafeStore;
use crate::settings::Settings;
use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone)]
pub struct AppState {
    pub store: CafeStore,
    pub settings: Settings,
}

/// The request methods this server understands. Anything else on the wire
/// is refused with 405 before routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            "PATCH" => Ok(Method::Patch),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the outcome of an HTTP handler.
/// Supports HTML, JSON, and custom status/headers.
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Construct a new HTTP 200 response with HTML/text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status_code: 200,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Construct a 303 "see other" redirect: where a browser goes after a
    /// form submission.
    pub fn redirect(location: &str) -> Self {
        Response {
            status_code: 303,
            body: String::new(),
            headers: [("Location".to_string(), location.to_string())]
                .iter()
                .cloned()
                .collect(),
        }
    }

    /// Construct a new HTTP 400 response with text body.
    pub fn bad_request(body: impl Into<String>) -> Self {
        Response {
            status_code: 400,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Response {
            status_code: 404,
            body: "404 Not Found".to_string(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 405 "method not allowed" response.
    pub fn method_not_allowed() -> Self {
        Response {
            status_code: 405,
            body: "405 Method Not Allowed".to_string(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 500 response with text body.
    pub fn server_error(body: impl Into<String>) -> Self {
        Response {
            status_code: 500,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP JSON response.
    /// Accepts any serde-serializable payload, status, and custom headers.
    pub fn json<T: Serialize>(
        data: T,
        status_code: u16,
        mut headers: HashMap<String, String>,
    ) -> Self {
        match serde_json::to_string(&data) {
            Ok(body) => {
                headers.insert(
                    "Content-Type".to_string(),
                    "application/json; charset=utf-8".to_string(),
                );
                Response {
                    status_code,
                    body,
                    headers,
                }
            }
            Err(_) => {
                headers.insert(
                    "Content-Type".to_string(),
                    "application/json; charset=utf-8".to_string(),
                );
                Response {
                    status_code: 500,
                    body: "{\"error\": \"Serialization failed\"}".to_string(),
                    headers,
                }
            }
        }
    }

    /// Serializes status line, headers and body as HTTP/1.1 wire text.
    pub fn to_http(&self) -> String {
        let mut header_lines = String::new();
        for (key, value) in &self.headers {
            header_lines.push_str(&format!("{}: {}\r\n", key, value));
        }
        format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            self.status_code,
            status_text(self.status_code),
            self.body.len(),
            header_lines,
            self.body
        )
    }
}

/// Holds one parsed HTTP request and its routing state.
/// Middleware and handlers can modify/read this context. `params` holds
/// `:name` path captures; `form` the decoded urlencoded body of a POST.
#[derive(Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub form: HashMap<String, String>,
    pub start_time: Option<Instant>,
}

/// Type alias for async handler functions for HTTP routes.
/// Accepts the parsed request and the shared state, returns a Response.
pub type Handler = Arc<
    dyn Fn(Request, AppState) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync,
>;

/// Type alias for synchronous, pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut Request) -> Option<Response> + Send + Sync>;

/// Type alias for post-processing middleware executed after the handler.
/// Post-middleware can inspect/modify the response before it is sent.
pub type PostMiddleware = Arc<dyn Fn(&Request, Response) -> Response + Send + Sync>;

/// Represents a registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The main application router.
/// Manages all HTTP routes and global middleware.
#[derive(Clone)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

// Request head and body limits. Form submissions are small; anything
// beyond this is not a browser filling out our form.
const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router {
            routes: Vec::new(),
            middlewares: Vec::new(),
            post_middlewares: Vec::new(),
            app_state: None,
        }
    }

    /// Register an HTTP route with method, path pattern, handler, and any
    /// route-specific middleware.
    pub fn add_route(
        &mut self,
        method: Method,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method,
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    /// Routes one request through global middleware, the matching handler,
    /// and the post-middleware chain. A path that only matches under a
    /// different method is refused with 405 rather than 404.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let Some(state) = self.app_state.clone() else {
            error!("App state not set in Router");
            return Response::server_error("server is not configured");
        };

        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(&mut req) {
                return response;
            }
        }

        let mut matched = false;
        let mut allowed_elsewhere = false;
        let mut response = Response::not_found();

        for route in &self.routes {
            if let Some(params) = match_path(&route.path_pattern, &req.path) {
                if route.method != req.method {
                    allowed_elsewhere = true;
                    continue;
                }
                req.params = params;

                let mut short_circuit = None;
                for middleware in &route.middlewares {
                    if let Some(response) = (middleware)(&mut req) {
                        short_circuit = Some(response);
                        break;
                    }
                }
                if let Some(response) = short_circuit {
                    return response;
                }

                matched = true;
                response = (route.handler)(req.clone(), state.clone()).await;
                break;
            }
        }
        if !matched && allowed_elsewhere {
            response = Response::method_not_allowed();
        }

        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(&req, response);
        }
        response
    }

    /// Binds the address from `settings` and serves until shutdown.
    ///
    /// This is the typical entry point for production use.
    pub async fn run(
        &mut self,
        settings: Settings,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = format!("{}:{}", settings.host, settings.port);
        self.run_http(&addr).await
    }

    /// Start the HTTP server. Uses a classic TcpListener and manual HTTP
    /// parsing, one connection per task, until Ctrl-C or SIGTERM arrives.
    pub async fn run_http(
        &mut self,
        addr: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.app_state.is_none() {
            return Err("App state not set in Router".into());
        }
        let listener = TcpListener::bind(addr).await?;
        println!("HTTP Server running on http://{}", addr);

        let router = Arc::new(self.clone());
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown signal received, closing listener");
                    break;
                }
                accepted = listener.accept() => {
                    let (socket, _) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let router = Arc::clone(&router);
                    tokio::spawn(async move {
                        router.handle_connection(socket).await;
                    });
                }
            }
        }
        Ok(())
    }

    async fn handle_connection(&self, mut socket: TcpStream) {
        let parsed = match read_request(&mut socket).await {
            Ok(Some(parsed)) => parsed,
            // Peer closed before sending a complete request.
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read request: {}", e);
                return;
            }
        };

        let response = match parsed {
            Ok(request) => {
                debug!("Incoming request: {} {}", request.method, request.path);
                self.dispatch(request).await
            }
            Err(early) => early,
        };
        send_response(socket, response).await;
    }
}

/// Reads and parses one HTTP/1.1 request.
///
/// `Ok(None)` means the peer went away before a complete request arrived.
/// `Ok(Some(Err(response)))` is a request refused before routing: an unknown
/// method, or an oversized head or body.
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<Result<Request, Response>>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    // Read until the blank line that ends the header section.
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(Some(Err(Response::bad_request("request head too large"))));
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method_token = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");

    let method = match method_token.parse::<Method>() {
        Ok(method) => method,
        Err(()) => return Ok(Some(Err(Response::method_not_allowed()))),
    };

    let mut content_length = 0usize;
    let mut content_type = String::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = value.trim().to_ascii_lowercase();
            }
        }
    }
    if content_length > MAX_BODY_BYTES {
        return Ok(Some(Err(Response::bad_request("request body too large"))));
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    // Only the path takes part in routing; a query string is ignored.
    let path = target.split('?').next().unwrap_or("/").to_string();

    let form = if method == Method::Post
        && (content_type.is_empty()
            || content_type.starts_with("application/x-www-form-urlencoded"))
    {
        parse_form(&String::from_utf8_lossy(&body))
    } else {
        HashMap::new()
    };

    Ok(Some(Ok(Request {
        method,
        path,
        params: HashMap::new(),
        form,
        start_time: Some(Instant::now()),
    })))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Decodes an `application/x-www-form-urlencoded` body into a field map.
/// A later duplicate of a field overwrites the earlier one.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields.insert(decode_component(name), decode_component(value));
    }
    fields
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Resolves when the process is told to stop: Ctrl-C everywhere, SIGTERM
/// on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Serializes and sends an HTTP Response over a raw TCP socket connection.
async fn send_response(mut socket: TcpStream, response: Response) {
    if let Err(e) = socket.write_all(response.to_http().as_bytes()).await {
        error!("Failed to send response: {}", e);
        return;
    }
    let _ = socket.shutdown().await;
}

/// Maps status codes to HTTP status text for responses.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        303 => "See Other",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                $crate::router::Method::$method,
                $path,
                std::sync::Arc::new(move |req, state| Box::pin($handler(req, state))),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/delete/:cafe_id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}
