//! Listening socket and connection acceptor.
//!
//! Readiness-based: the listener is non-blocking and registered with a mio
//! `Poll`. `accept` tries the listener first and only waits on the poll (for
//! at most the idle interval) when nothing is pending, so queued clients are
//! picked up one at a time without being missed between cycles.

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

const LISTENER_TOKEN: Token = Token(0);

/// Polls a listening socket for one client at a time.
pub struct Acceptor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    idle: Duration,
}

impl Acceptor {
    /// Bind `addr` and register it for readiness.
    pub fn bind(addr: SocketAddr, backlog: i32, idle: Duration) -> io::Result<Self> {
        let listener = TcpListener::from_std(create_listener(addr, backlog)?);
        let poll = Poll::new()?;

        let mut acceptor = Self {
            poll,
            events: Events::with_capacity(8),
            listener,
            idle,
        };
        acceptor.poll.registry().register(
            &mut acceptor.listener,
            LISTENER_TOKEN,
            Interest::READABLE,
        )?;

        Ok(acceptor)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept a pending client, or wait up to the idle interval and return
    /// `None` if there is none.
    pub fn accept(&mut self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        match self.listener.accept() {
            Ok(pair) => Ok(Some(pair)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                match self.poll.poll(&mut self.events, Some(self.idle)) {
                    Ok(()) => Ok(None),
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Create a non-blocking TCP listener with address reuse.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
