use {
    crate::logger::micro::*,
    std::{
        io, mem,
        net::{self, IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
        sync::{Arc, atomic::{AtomicBool, Ordering}},
        thread,
        time::Duration,
    },
    socket2::{Domain, Protocol, SockRef, Socket, Type},
    super::{
        config::ServerConfig,
        error::{DispatchError, ServerError},
        http::{self, Authenticator, HandlerEntry, Muxer, Request, Response},
        line::{Executor, ThreadPerRequest},
    },
};

const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const ACCEPT_RETRY_MIN: Duration = Duration::from_millis(10);
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// Embeddable HTTP server for tests.
///
/// Handlers are registered while the server is unstarted; `start*` binds a
/// listener, installs one route per registration and serves each
/// connection on the configured executor. `stop`, `close` or dropping the
/// server closes the listener.
///
/// ```no_run
/// use embedhttp::Server;
///
/// # fn main() -> Result<(), embedhttp::ServerError> {
/// let mut server = Server::new();
/// server
///     .add_handler("/get", |_, res| {
///         res.set_body("Hello, World!").add_header("content-type", "text/plain");
///     })?
///     .start()?;
/// println!("listening on {}", server.port()?);
/// server.stop();
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    handlers: Vec<HandlerEntry>,
    executor: Option<Arc<dyn Executor>>,
    state: State,
}

enum State {
    Unstarted,
    Running(Running),
    Stopped(SocketAddr),
}

struct Running {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    listener: net::TcpListener,
    acceptor: Option<thread::JoinHandle<()>>,
}

impl Default for Server {
    fn default() -> Self {
        Self::with_config(ServerConfig::default())
    }
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Server {
            config,
            handlers: vec![],
            executor: None,
            state: State::Unstarted,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registers `handler` for every request whose path starts with `path`.
    pub fn add_handler<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.add_handlers(vec![HandlerEntry::new(path, handler)])
    }

    /// Like [`add_handler`](Self::add_handler), gated by `authenticator`.
    pub fn add_handler_with_authenticator<F>(
        &mut self,
        path: &str,
        handler: F,
        authenticator: impl Authenticator + 'static,
    ) -> Result<&mut Self, ServerError>
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.add_handlers(vec![HandlerEntry::new(path, handler).with_authenticator(authenticator)])
    }

    /// Appends `entries` after the existing registrations, in order. Either
    /// every entry is accepted or none is.
    pub fn add_handlers(&mut self, entries: impl IntoIterator<Item = HandlerEntry>) -> Result<&mut Self, ServerError> {
        self.ensure_registration_open()?;
        let entries: Vec<HandlerEntry> = entries.into_iter().collect();
        if let Some(bad) = entries.iter().find(|e| !e.path().starts_with('/')) {
            return Err(ServerError::InvalidPath(bad.path().to_string()));
        }
        self.handlers.extend(entries);
        Ok(self)
    }

    /// Replaces the default thread-per-connection executor.
    pub fn set_executor(&mut self, executor: impl Executor + 'static) -> Result<&mut Self, ServerError> {
        self.ensure_registration_open()?;
        self.executor = Some(Arc::new(executor));
        Ok(self)
    }

    pub fn handlers(&self) -> &[HandlerEntry] {
        &self.handlers
    }

    /// Starts on a free port of the loopback interface.
    pub fn start(&mut self) -> Result<&mut Self, ServerError> {
        self.start_on_port(0)
    }

    /// Starts on `port` of the loopback interface; 0 picks a free port.
    pub fn start_on_port(&mut self, port: u16) -> Result<&mut Self, ServerError> {
        self.start_on_address(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    /// Starts on an arbitrary address. On error the server stays unstarted.
    pub fn start_on_address(&mut self, addr: SocketAddr) -> Result<&mut Self, ServerError> {
        self.ensure_unstarted()?;
        let muxer = Arc::new(Muxer::new(&self.handlers)?);

        let listener = bind_listener(addr, self.config.backlog)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let acceptor_listener = listener.try_clone()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let executor: Arc<dyn Executor> = match &self.executor {
            Some(executor) => executor.clone(),
            None => Arc::new(ThreadPerRequest),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let acceptor = {
            let stop = stop.clone();
            let config = Arc::new(self.config.clone());
            thread::Builder::new()
                .name(format!("embedhttp-acceptor-{}", local.port()))
                .spawn(move || accept_loop(acceptor_listener, stop, muxer, executor, config))
                .map_err(ServerError::Spawn)?
        };

        info!("server started @ {} with {} route(s)", local, self.handlers.len());
        self.state = State::Running(Running {
            addr: local,
            stop,
            listener,
            acceptor: Some(acceptor),
        });
        Ok(self)
    }

    /// Stops accepting immediately and closes the listening socket. In-flight
    /// exchanges are not waited for. A no-op unless running.
    pub fn stop(&mut self) {
        let running = match mem::replace(&mut self.state, State::Unstarted) {
            State::Running(running) => running,
            other => {
                self.state = other;
                return;
            }
        };
        let addr = running.addr;
        running.shutdown();
        self.state = State::Stopped(addr);
        info!("server stopped @ {}", addr);
    }

    /// Same as [`stop`](Self::stop).
    pub fn close(&mut self) {
        self.stop()
    }

    pub fn is_running(&self) -> bool {
        match self.state {
            State::Running(_) => true,
            _ => false,
        }
    }

    /// Address the listener is (or was last) bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        match &self.state {
            State::Running(running) => Ok(running.addr),
            State::Stopped(addr) => Ok(*addr),
            State::Unstarted => Err(ServerError::NotStarted),
        }
    }

    pub fn port(&self) -> Result<u16, ServerError> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn bind_host(&self) -> Result<String, ServerError> {
        self.local_addr().map(|addr| addr.ip().to_string())
    }

    /// `http://` URL of `path` on this server.
    pub fn url(&self, path: &str) -> Result<String, ServerError> {
        self.local_addr().map(|addr| format!("http://{}{}", addr, path))
    }

    fn ensure_registration_open(&self) -> Result<(), ServerError> {
        match self.state {
            State::Unstarted => Ok(()),
            _ => Err(ServerError::RegistrationClosed),
        }
    }

    fn ensure_unstarted(&self) -> Result<(), ServerError> {
        match self.state {
            State::Unstarted => Ok(()),
            State::Running(_) => Err(ServerError::AlreadyStarted),
            State::Stopped(_) => Err(ServerError::AlreadyStopped),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Running {
    fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // wakes a blocked accept on Linux; elsewhere the connection below does
        if let Err(e) = SockRef::from(&self.listener).shutdown(net::Shutdown::Both) {
            trace!("listener shutdown: {}", e);
        }
        let woke = net::TcpStream::connect_timeout(&wake_addr(self.addr), WAKE_CONNECT_TIMEOUT).is_ok();
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("acceptor thread of {} panicked", self.addr);
            }
        }
        trace!("acceptor of {} joined (woken by connect: {})", self.addr, woke);
    }
}

fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port()),
        _ => addr,
    }
}

fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    // lets a test rebind a port it just released; never shares a live listener
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

fn accept_loop(
    listener: net::TcpListener,
    stop: Arc<AtomicBool>,
    muxer: Arc<Muxer>,
    executor: Arc<dyn Executor>,
    config: Arc<ServerConfig>,
) {
    debug!("acceptor listening on {:?}", listener.local_addr());
    let mut retry_delay: Option<Duration> = None;
    for incoming in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let stream = match incoming {
            Ok(stream) => {
                retry_delay = None;
                stream
            }
            Err(e) => {
                // e.g. EMFILE keeps failing until a connection closes
                let delay = next_accept_delay(retry_delay);
                warn!("failed to accept connection: {}, retrying in {:?}", e, delay);
                retry_delay = Some(delay);
                thread::sleep(delay);
                continue;
            }
        };
        let peer = stream.peer_addr().ok();
        trace!("incoming connection from {:?}", peer);

        let muxer = muxer.clone();
        let config = config.clone();
        let job = Box::new(move || {
            if let Err(e) = http::dispatch::serve(&muxer, stream, &config) {
                report(peer, e);
            }
        });
        if let Err(e) = executor.execute(job) {
            warn!("connection from {:?} rejected: {}", peer, e);
        }
    }
    debug!("acceptor exiting");
}

/// Doubles the previous delay between failed accepts, within
/// `ACCEPT_RETRY_MIN..=ACCEPT_RETRY_MAX`.
fn next_accept_delay(previous: Option<Duration>) -> Duration {
    match previous {
        None => ACCEPT_RETRY_MIN,
        Some(d) => (d * 2).min(ACCEPT_RETRY_MAX),
    }
}

fn report(peer: Option<SocketAddr>, e: DispatchError) {
    match e {
        DispatchError::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
            debug!("{:?} closed the connection: {}", peer, e)
        }
        DispatchError::HandlerPanicked { .. } | DispatchError::InvalidResponseHeader { .. } => {
            error!("exchange with {:?} failed: {}", peer, e)
        }
        _ => warn!("exchange with {:?} failed: {}", peer, e),
    }
}
