use deadpool::managed::{PoolError, TimeoutType};
use deadpool::{managed, Runtime};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::time::timeout;

use crate::config::PgProperties;
use crate::errors::Error;
use crate::server::{Connector, Server, TcpConnector};

/// Lifecycle of a `PgClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Built, `init_pool` has not run. Connections are created on demand.
    New,
    Ready,
    /// Terminal. Every acquire fails with `Error::PoolClosed`.
    Closed,
}

impl Display for PoolState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match *self {
            PoolState::New => "new",
            PoolState::Ready => "ready",
            PoolState::Closed => "closed",
        };
        write!(f, "{}", str)
    }
}

/// Connection counts at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle, checked out, and being created.
    pub live: usize,
    pub idle: usize,
    pub max_size: usize,
}

/// Creates and recycles server connections for the pool.
pub struct ServerPool<C: Connector> {
    props: Arc<PgProperties>,

    connector: C,

    /// Lock to limit of server connections creating concurrently.
    open_new_server: Arc<tokio::sync::Mutex<u64>>,
}

impl<C: Connector> ServerPool<C> {
    pub fn new(props: Arc<PgProperties>, connector: C) -> ServerPool<C> {
        ServerPool {
            props,
            connector,
            open_new_server: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }
}

impl<C: Connector> managed::Manager for ServerPool<C> {
    type Type = Server<C::Stream>;
    type Error = Error;

    /// Attempts to create a new connection.
    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let mut guard = self.open_new_server.lock().await;
        *guard += 1;
        info!(
            "Creating a new server connection to {}[#{}]",
            self.props, guard
        );

        // Connect to the PostgreSQL server.
        match Server::connect(&self.connector, &self.props).await {
            Ok(conn) => {
                drop(guard);
                Ok(conn)
            }
            Err(err) => {
                drop(guard);
                error!(
                    "Could not create a server connection to {}: {}",
                    self.props, err
                );
                Err(err)
            }
        }
    }

    // Only the flags set on this side are checked. A connection the server
    // dropped while idle gets no health check and is handed out as is.
    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> managed::RecycleResult<Error> {
        if conn.is_bad() {
            return Err(managed::RecycleError::Message("Bad connection".into()));
        }
        if conn.is_closed() {
            return Err(managed::RecycleError::Message("Closed connection".into()));
        }
        Ok(())
    }
}

/// A connection checked out of the pool. Dropping it returns the connection.
pub struct PooledConnection<C: Connector = TcpConnector> {
    inner: managed::Object<ServerPool<C>>,
}

impl<C: Connector> PooledConnection<C> {
    /// Detach the connection from the pool and terminate it.
    pub async fn close(self) -> Result<(), Error> {
        let mut server = managed::Object::take(self.inner);
        server.close().await
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = Server<C::Stream>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A bounded pool of authenticated connections to one PostgreSQL server.
pub struct PgClient<C: Connector = TcpConnector> {
    pool: managed::Pool<ServerPool<C>>,
    props: Arc<PgProperties>,
    state: Arc<Mutex<PoolState>>,

    /// Held for the whole of `init_pool`.
    init_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<C: Connector> Clone for PgClient<C> {
    fn clone(&self) -> Self {
        PgClient {
            pool: self.pool.clone(),
            props: self.props.clone(),
            state: self.state.clone(),
            init_lock: self.init_lock.clone(),
        }
    }
}

impl PgClient<TcpConnector> {
    /// A client connecting over TCP, or a Unix socket when the host is a path.
    pub fn from_properties(props: PgProperties) -> Result<PgClient<TcpConnector>, Error> {
        PgClient::new(props, TcpConnector)
    }
}

impl<C: Connector> PgClient<C> {
    /// Validate `props` and build the pool. No connection is opened yet.
    pub fn new(props: PgProperties, connector: C) -> Result<PgClient<C>, Error> {
        props.validate()?;
        let props = Arc::new(props);

        let manager = ServerPool::new(props.clone(), connector);
        let pool = match managed::Pool::builder(manager)
            .max_size(props.max_pool_size)
            .wait_timeout(Some(props.acquire_timeout()))
            .create_timeout(Some(props.acquire_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                error!("error build pool: {:?}", err);
                return Err(Error::BadConfig(format!("error build pool: {:?}", err)));
            }
        };

        Ok(PgClient {
            pool,
            props,
            state: Arc::new(Mutex::new(PoolState::New)),
            init_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn properties(&self) -> &PgProperties {
        &self.props
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            live: status.size,
            idle: status.available as usize,
            max_size: status.max_size,
        }
    }

    /// Bring the pool up to `min_pool_size` live connections, opening the
    /// missing ones one after another. Connections already live (created by an
    /// earlier `acquire`) count toward the minimum.
    ///
    /// A failed handshake terminates the connections leased here and closes the
    /// pool. Running out of slots while every connection is checked out
    /// elsewhere leaves the pool as it was.
    pub async fn init_pool(&self) -> Result<(), Error> {
        let _init = self.init_lock.lock().await;
        if self.state() == PoolState::Closed {
            return Err(Error::PoolClosed);
        }

        // Holding every lease makes the next get create a connection once the
        // idle ones are used up.
        let mut leased = Vec::with_capacity(self.props.min_pool_size);
        while self.pool.status().size < self.props.min_pool_size {
            match self.pool.get().await {
                Ok(conn) => leased.push(conn),
                Err(PoolError::Timeout(TimeoutType::Wait)) => {
                    drop(leased);
                    warn!(
                        "Could not initialize pool for {}: no free slot within {}ms",
                        self.props, self.props.timeout
                    );
                    return Err(Error::InitializationError(Box::new(Error::PoolExhausted)));
                }
                Err(err) => {
                    let cause = map_pool_error(err);
                    error!(
                        "Could not initialize pool for {} after {} connections: {}",
                        self.props,
                        leased.len(),
                        cause
                    );

                    *self.state.lock() = PoolState::Closed;
                    for conn in leased {
                        let mut server = managed::Object::take(conn);
                        if let Err(err) = server.close().await {
                            warn!("Could not terminate {}: {}", server, err);
                        }
                    }
                    self.pool.close();

                    return Err(Error::InitializationError(Box::new(cause)));
                }
            }
        }

        // Return them all to the idle queue.
        drop(leased);
        {
            let mut state = self.state.lock();
            if *state == PoolState::New {
                *state = PoolState::Ready;
            }
        }
        info!(
            "Pool for {} is ready with {} connections",
            self.props,
            self.pool.status().size
        );
        Ok(())
    }

    /// Check out a connection: an idle one if there is any, a new one while under
    /// `max_pool_size`, otherwise wait for a release. The whole acquisition,
    /// handshake included, is bounded by the acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, Error> {
        if self.state() == PoolState::Closed {
            return Err(Error::PoolClosed);
        }

        let err = match timeout(self.props.acquire_timeout(), self.pool.get()).await {
            Ok(Ok(inner)) => return Ok(PooledConnection { inner }),
            Ok(Err(PoolError::Timeout(_))) | Err(_) => Error::PoolExhausted,
            Ok(Err(err)) => map_pool_error(err),
        };
        if err == Error::PoolExhausted {
            warn!(
                "No connection to {} within {}ms",
                self.props, self.props.timeout
            );
        }
        Err(err)
    }

    /// Give a connection back. Closed or bad connections are dropped from the
    /// pool instead of going back to the idle queue. No health check is run on
    /// the ones that go back.
    pub fn release(&self, conn: PooledConnection<C>) {
        if conn.is_reusable() {
            drop(conn);
            return;
        }
        let server = managed::Object::take(conn.inner);
        debug!("Discarding server connection {} on release", server);
    }

    /// Run `body` with a connection that goes back to the pool however `body` ends.
    pub async fn with_connection<F, Fut, T>(&self, body: F) -> Result<T, Error>
    where
        F: FnOnce(PooledConnection<C>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let conn = self.acquire().await?;
        body(conn).await
    }

    /// Query execution is not implemented: a connection is checked out and
    /// returned, then `Error::Unsupported` is reported.
    pub async fn query(&self, sql: &str) -> Result<(), Error> {
        let conn = self.acquire().await?;
        self.release(conn);
        Err(Error::Unsupported(format!("query execution: {sql}")))
    }

    /// Terminate idle connections and reject every later acquire. Safe to call
    /// more than once.
    ///
    /// Connections checked out at this point are not terminated here. When they
    /// come back the closed pool drops them without sending Terminate; use
    /// `PooledConnection::close` to end them cleanly.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == PoolState::Closed {
                return;
            }
            *state = PoolState::Closed;
        }

        let idle = self.pool.retain(|_, _| false);
        for mut server in idle.removed {
            if let Err(err) = server.close().await {
                warn!("Could not terminate {}: {}", server, err);
            }
        }
        self.pool.close();
        info!("Pool for {} is closed", self.props);
    }
}

fn map_pool_error(err: PoolError<Error>) -> Error {
    match err {
        PoolError::Timeout(TimeoutType::Wait) => Error::PoolExhausted,
        PoolError::Timeout(TimeoutType::Create) => Error::ConnectTimeout,
        PoolError::Timeout(TimeoutType::Recycle) => Error::PoolExhausted,
        PoolError::Backend(err) => err,
        PoolError::Closed => Error::PoolClosed,
        other => Error::BadConfig(format!("Connection pool error: {:?}", other)),
    }
}
