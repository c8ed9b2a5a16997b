use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use http::Method;
use tracing::{debug, warn};

use super::app::App;
use super::{Request, Response};

/// Blocking HTTP listener backed by `tiny_http`.
///
/// Each worker thread pulls connections from the shared listener and runs
/// [`App::handle`] to completion, so requests are handled in parallel without
/// coordination.
pub struct HttpServer {
    app: Arc<App>,
    workers: usize,
}

/// Handle to a running HTTP server
///
/// Provides methods for waiting until the server is ready, stopping it gracefully,
/// or joining the worker threads.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<tiny_http::Server>,
    stopping: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// Polls the server address by attempting TCP connections until successful.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` error if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting requests and wait for the workers to finish.
    pub fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        for _ in &self.threads {
            self.server.unblock();
        }
        for t in self.threads {
            if t.join().is_err() {
                warn!("Server worker panicked during shutdown");
            }
        }
    }

    /// Block until every worker exits.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread panicked.
    pub fn join(self) -> thread::Result<()> {
        for t in self.threads {
            t.join()?;
        }
        Ok(())
    }
}

impl HttpServer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app, workers: 1 }
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Start the HTTP server on the given address
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the port cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let server = Arc::new(tiny_http::Server::http(addr).map_err(io::Error::other)?);
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        let stopping = Arc::new(AtomicBool::new(false));

        let mut threads = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let server = Arc::clone(&server);
            let app = Arc::clone(&self.app);
            let stopping = Arc::clone(&stopping);
            let t = thread::Builder::new()
                .name(format!("nfweb-worker-{id}"))
                .spawn(move || worker_loop(&server, &app, &stopping))?;
            threads.push(t);
        }
        Ok(ServerHandle {
            addr,
            server,
            stopping,
            threads,
        })
    }
}

fn worker_loop(server: &tiny_http::Server, app: &App, stopping: &AtomicBool) {
    while !stopping.load(Ordering::SeqCst) {
        let mut incoming = match server.recv() {
            Ok(rq) => rq,
            Err(e) => {
                if !stopping.load(Ordering::SeqCst) {
                    warn!(error = %e, "Failed to receive request");
                }
                continue;
            }
        };
        let response = match read_request(&mut incoming) {
            Ok(request) => app.handle(request),
            Err(e) => {
                debug!(error = %e, "Malformed request");
                let mut res = Response::text(400, "400 bad request");
                res.finish();
                res
            }
        };
        if let Err(e) = incoming.respond(to_tiny(response)) {
            debug!(error = %e, "Failed to write response");
        }
    }
}

fn read_request(incoming: &mut tiny_http::Request) -> io::Result<Request> {
    let method = Method::from_bytes(incoming.method().to_string().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut request = Request::new(method, incoming.url());
    for h in incoming.headers() {
        request.append_header(&h.field.to_string(), &h.value.to_string());
    }
    request.remote_addr = incoming.remote_addr().copied();
    incoming.as_reader().read_to_end(&mut request.body)?;
    Ok(request)
}

fn to_tiny(response: Response) -> tiny_http::Response<io::Cursor<Vec<u8>>> {
    let mut out = tiny_http::Response::from_data(response.body)
        .with_status_code(tiny_http::StatusCode(response.status));
    for (name, value) in &response.headers {
        match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(h) => out.add_header(h),
            Err(()) => debug!(header = %name, "Dropping invalid response header"),
        }
    }
    out
}
