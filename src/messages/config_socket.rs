// Standard library imports
use std::time::Duration;

// External crate imports
use log::error;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpStream, UnixStream};

// Internal crate imports
use crate::config::PgProperties;

/// Configure Unix socket parameters.
pub fn configure_unix_socket(stream: &UnixStream, props: &PgProperties) {
    let sock_ref = SockRef::from(stream);

    match sock_ref.set_linger(Some(Duration::from_secs(props.tcp_so_linger))) {
        Ok(_) => {}
        Err(err) => error!("Could not configure unix_so_linger for socket: {err}"),
    }
}

/// Configure TCP socket parameters.
pub fn configure_tcp_socket(stream: &TcpStream, props: &PgProperties) {
    let sock_ref = SockRef::from(stream);

    match sock_ref.set_linger(Some(Duration::from_secs(props.tcp_so_linger))) {
        Ok(_) => {}
        Err(err) => error!("Could not configure tcp_so_linger for socket: {err}"),
    }

    match sock_ref.set_nodelay(props.tcp_no_delay) {
        Ok(_) => {}
        Err(err) => error!("Could not configure no delay for socket: {err}"),
    }

    match sock_ref.set_keepalive(true) {
        Ok(_) => {
            match sock_ref.set_tcp_keepalive(
                &TcpKeepalive::new()
                    .with_interval(Duration::from_secs(props.tcp_keepalives_interval))
                    .with_retries(props.tcp_keepalives_count)
                    .with_time(Duration::from_secs(props.tcp_keepalives_idle)),
            ) {
                Ok(_) => (),
                Err(err) => error!("Could not configure tcp_keepalive for socket: {err}"),
            }
        }
        Err(err) => error!("Could not configure socket: {err}"),
    }
}
