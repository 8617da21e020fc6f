/// Implementation of the PostgreSQL server (database) protocol.
/// Here we are pretending to be a Postgres client.
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;

use crate::auth::{ScramClient, ScramSha256};
use crate::config::PgProperties;
use crate::constants::*;
use crate::errors::Error;
use crate::messages::*;
use pin_project_lite::pin_project;

pin_project! {
    #[project = SteamInnerProj]
    #[derive(Debug)]
    pub enum StreamInner {
        TCPPlain {
            #[pin]
            stream: TcpStream,
        },
        UnixSocket {
            #[pin]
            stream: UnixStream,
        },
    }
}

impl AsyncWrite for StreamInner {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        let this = self.project();
        match this {
            SteamInnerProj::TCPPlain { stream } => stream.poll_write(cx, buf),
            SteamInnerProj::UnixSocket { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        let this = self.project();
        match this {
            SteamInnerProj::TCPPlain { stream } => stream.poll_flush(cx),
            SteamInnerProj::UnixSocket { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        let this = self.project();
        match this {
            SteamInnerProj::TCPPlain { stream } => stream.poll_shutdown(cx),
            SteamInnerProj::UnixSocket { stream } => stream.poll_shutdown(cx),
        }
    }
}

impl AsyncRead for StreamInner {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.project();
        match this {
            SteamInnerProj::TCPPlain { stream } => stream.poll_read(cx, buf),
            SteamInnerProj::UnixSocket { stream } => stream.poll_read(cx, buf),
        }
    }
}

/// Opens the transport a `Server` runs its handshake over.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(
        &self,
        props: &PgProperties,
    ) -> impl Future<Output = Result<Self::Stream, Error>> + Send;
}

/// TCP, or a Unix socket when the host is a directory (starts with '/').
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = StreamInner;

    async fn connect(&self, props: &PgProperties) -> Result<StreamInner, Error> {
        if props.host.starts_with('/') {
            create_unix_stream_inner(props).await
        } else {
            create_tcp_stream_inner(props).await
        }
    }
}

/// Parameters the server reported with ParameterStatus during startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerParameters {
    parameters: HashMap<String, String>,
}

impl ServerParameters {
    pub fn new() -> Self {
        ServerParameters {
            parameters: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn set_param(&mut self, key: String, value: String) {
        self.parameters.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(|value| value.as_str())
    }

    pub fn as_hashmap(&self) -> &HashMap<String, String> {
        &self.parameters
    }
}

/// An authenticated physical connection.
#[derive(Debug)]
pub struct Server<S> {
    /// user@host:port/database
    address: String,

    /// Server connection.
    stream: BufStream<S>,

    /// Server information the server sent us over on startup.
    server_parameters: ServerParameters,

    /// Backend id and secret key used for query cancellation.
    process_id: i32,
    secret_key: i32,

    transaction_status: TransactionStatus,

    /// Is the server broken? We'll remove it from the pool if so.
    bad: bool,

    /// Terminate has been sent.
    closed: bool,

    /// Server connected at.
    connected_at: chrono::NaiveDateTime,
}

impl<S> std::fmt::Display for Server<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}, pid: {}]", self.address, self.process_id)
    }
}

impl<S> Server<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Open a connection through `connector` and authenticate with the configured
    /// credentials. Bounded by the connect timeout when one is configured.
    pub async fn connect<C>(connector: &C, props: &PgProperties) -> Result<Server<S>, Error>
    where
        C: Connector<Stream = S>,
    {
        let attempt = async {
            let stream = connector.connect(props).await?;
            let mut scram = ScramSha256::new(&props.username, props.password.expose());
            Server::startup(stream, props, &mut scram).await
        };

        match props.connect_timeout() {
            Some(duration) => match timeout(duration, attempt).await {
                Ok(result) => result,
                Err(_) => {
                    error!(
                        "Timed out after {}ms while connecting to {}",
                        duration.as_millis(),
                        props
                    );
                    Err(Error::ConnectTimeout)
                }
            },
            None => attempt.await,
        }
    }

    /// Send the StartupMessage over `stream`, authenticate, and return the server
    /// once it reports ReadyForQuery.
    pub async fn startup<A>(stream: S, props: &PgProperties, scram: &mut A) -> Result<Server<S>, Error>
    where
        A: ScramClient + ?Sized,
    {
        let mut stream = BufStream::new(stream);
        let username = props.username.as_str();

        // StartupMessage
        startup(
            &mut stream,
            &StartupParameters {
                user: username,
                database: props.database(),
                application_name: &props.application_name,
            },
        )
        .await?;

        let mut process_id: i32 = 0;
        let mut secret_key: i32 = 0;
        let mut server_parameters = ServerParameters::new();

        loop {
            let (code, payload) = read_message(&mut stream).await?;

            match BackendMessage::decode(code, payload)? {
                BackendMessage::Authentication(auth) => match auth {
                    Authentication::Ok => debug!("Authenticated to {}", props),

                    Authentication::CleartextPassword => {
                        check_password_configured(props, "clear password")?;
                        password_message(&mut stream, props.password.expose().as_bytes()).await?;
                    }

                    Authentication::Md5Password { salt } => {
                        check_password_configured(props, "md5")?;
                        md5_password(&mut stream, username, props.password.expose(), &salt)
                            .await?;
                    }

                    /* SASL begin */
                    Authentication::Sasl { mechanisms } => {
                        if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
                            error!(
                                "Unsupported SASL mechanisms offered by {}: {:?}",
                                props, mechanisms
                            );
                            return Err(Error::AuthError(format!(
                                "server offered no supported SASL mechanism: {}",
                                mechanisms.join(", ")
                            )));
                        }
                        let client_first = scram.client_first_message()?;
                        sasl_initial_response(&mut stream, SCRAM_SHA_256, &client_first).await?;
                    }

                    Authentication::SaslContinue(data) => {
                        scram.server_first_message(sasl_str(&data)?)?;
                        let client_final = scram.client_final_message()?;
                        sasl_response(&mut stream, &client_final).await?;
                    }

                    Authentication::SaslFinal(data) => {
                        scram.server_final_message(sasl_str(&data)?)?;
                    }
                    /* SASL end */
                    Authentication::Unsupported(auth_code) => {
                        error!(
                            "Unsupported authentication requested by {}: {}",
                            props, auth_code
                        );
                        return Err(Error::UnsupportedAuthentication(auth_code));
                    }
                },

                // Save the parameter so callers can inspect what the server reported:
                // server_version, TimeZone, integer_datetimes and so on.
                BackendMessage::ParameterStatus { name, value } => {
                    server_parameters.set_param(name, value);
                }

                // The frontend must save these values if it wishes to be able to issue CancelRequest messages later.
                BackendMessage::BackendKeyData {
                    process_id: pid,
                    secret_key: key,
                } => {
                    process_id = pid;
                    secret_key = key;
                }

                BackendMessage::NoticeResponse(notice) => {
                    warn!(
                        "Server startup notice (severity: {} code: {} message: {})",
                        notice.severity, notice.code, notice.message
                    );
                }

                BackendMessage::ErrorResponse(err) => {
                    error!(
                        "Server {} rejected startup (severity: {} code: {} message: {})",
                        props, err.severity, err.code, err.message
                    );
                    return Err(Error::ServerError(err));
                }

                BackendMessage::ReadyForQuery(transaction_status) => {
                    let server = Server {
                        address: props.to_string(),
                        stream,
                        server_parameters,
                        process_id,
                        secret_key,
                        transaction_status,
                        bad: false,
                        closed: false,
                        connected_at: chrono::offset::Utc::now().naive_utc(),
                    };
                    info!("Server connection {} established", server);

                    return Ok(server);
                }

                // We have an unexpected message from the server during this exchange.
                // Means we implemented the protocol wrong or we're not talking to a Postgres server.
                BackendMessage::Unsupported(code) => {
                    error!(
                        "An unprocessed message code from server backend while startup: {}",
                        code as char
                    );
                    return Err(Error::UnsupportedMessageType(code));
                }
            }
        }
    }

    /// Send Terminate and mark the connection closed. A closed connection is
    /// never reused.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match terminate(&mut self.stream).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!("Dirty server {} shutdown: {}", self, err);
                self.bad = true;
                Err(err)
            }
        }
    }
}

impl<S> Server<S> {
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    pub fn server_parameters(&self) -> &ServerParameters {
        &self.server_parameters
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn connected_at(&self) -> chrono::NaiveDateTime {
        self.connected_at
    }

    /// Server is unusable and must not go back to the pool.
    pub fn mark_bad(&mut self, reason: &str) {
        error!("Server {} marked bad, reason: {}", self, reason);
        self.bad = true;
    }

    pub fn is_bad(&self) -> bool {
        self.bad
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Can this connection go back into the pool.
    pub fn is_reusable(&self) -> bool {
        !self.bad && !self.closed
    }
}

impl<S> Drop for Server<S> {
    fn drop(&mut self) {
        let now = chrono::offset::Utc::now().naive_utc();
        let duration = now - self.connected_at;

        let message = if self.bad {
            "Server connection terminated"
        } else {
            "Server connection closed"
        };

        info!(
            "{} {}, session duration: {}",
            message,
            self,
            crate::format_duration(&duration)
        );
    }
}

fn check_password_configured(props: &PgProperties, method: &str) -> Result<(), Error> {
    if props.password.is_empty() {
        error!(
            "Authentication for server {} with {} auth is not configured",
            props, method
        );
        return Err(Error::AuthError(format!(
            "server wants {method} authentication, but no password is configured"
        )));
    }
    Ok(())
}

fn sasl_str(data: &[u8]) -> Result<&str, Error> {
    match std::str::from_utf8(data) {
        Ok(message) => Ok(message),
        Err(err) => Err(Error::ScramServerError(format!(
            "SASL message is not valid UTF-8: {err}"
        ))),
    }
}

async fn create_unix_stream_inner(props: &PgProperties) -> Result<StreamInner, Error> {
    let path = format!("{}/.s.PGSQL.{}", props.host, props.port);
    let stream = match UnixStream::connect(&path).await {
        Ok(s) => s,
        Err(err) => {
            error!("Could not connect to server {}: {}", path, err);
            return Err(Error::SocketError(format!(
                "Could not connect to server: {}",
                err
            )));
        }
    };

    configure_unix_socket(&stream, props);

    Ok(StreamInner::UnixSocket { stream })
}

async fn create_tcp_stream_inner(props: &PgProperties) -> Result<StreamInner, Error> {
    let stream = match TcpStream::connect(&format!("{}:{}", props.host, props.port)).await {
        Ok(stream) => stream,
        Err(err) => {
            error!(
                "Could not connect to server {}:{}: {}",
                props.host, props.port, err
            );
            return Err(Error::SocketError(format!(
                "Could not connect to server: {}",
                err
            )));
        }
    };

    // TCP timeouts.
    configure_tcp_socket(&stream, props);

    Ok(StreamInner::TCPPlain { stream })
}
