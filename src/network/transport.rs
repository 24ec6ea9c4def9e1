use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Byte stream a peer speaks the protocol over
///
/// Concurrent reads and writes from different threads are only as safe as
/// the implementation makes them. `TcpStream` handles can be cloned and used
/// independently, which is what `ShutdownHandle` relies on.
pub trait Transport: Read + Write + Send + Sized {
    /// Open a connection to `address` (`host:port`) within `timeout`
    ///
    /// A zero `timeout` leaves the attempt to the OS connect timeout.
    fn dial(address: &str, timeout: Duration) -> io::Result<Self>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close both directions; blocked reads and writes on any handle fail
    fn shutdown(&self) -> io::Result<()>;

    /// Second handle to the same underlying connection
    fn try_clone(&self) -> io::Result<Self>;
}

impl Transport for TcpStream {
    fn dial(address: &str, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for socket_addr in address.to_socket_addrs()? {
            let attempt = if timeout.is_zero() {
                TcpStream::connect(socket_addr)
            } else {
                TcpStream::connect_timeout(&socket_addr, timeout)
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{address} did not resolve to any address"),
            )
        }))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // Already torn down by the remote
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }
}

/// Reader that holds a whole sequence of reads to one deadline
///
/// The socket timeout only bounds a single `read`, so before every read I
/// re-arm it with whatever time is left. Once the deadline has passed, reads
/// fail with `TimedOut` without touching the socket.
pub struct DeadlineReader<'a, T: Transport> {
    inner: &'a mut T,
    deadline: Instant,
}

impl<'a, T: Transport> DeadlineReader<'a, T> {
    pub fn new(inner: &'a mut T, deadline: Instant) -> Self {
        DeadlineReader { inner, deadline }
    }
}

impl<T: Transport> Read for DeadlineReader<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        self.inner.set_read_timeout(Some(remaining))?;
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_dial_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = <TcpStream as Transport>::dial(&addr.to_string(), Duration::from_secs(2))
            .unwrap();
        assert_eq!(Transport::peer_addr(&stream).unwrap(), addr);
    }

    #[test]
    fn test_dial_with_zero_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = <TcpStream as Transport>::dial(&addr.to_string(), Duration::ZERO).unwrap();
        assert_eq!(Transport::peer_addr(&stream).unwrap(), addr);
    }

    #[test]
    fn test_deadline_reader_bounds_all_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut stream =
            <TcpStream as Transport>::dial(&addr.to_string(), Duration::from_secs(2)).unwrap();
        let (mut remote, _) = listener.accept().unwrap();

        // One byte arrives in time, the rest never does
        remote.write_all(&[7]).unwrap();
        let started = Instant::now();
        let mut reader = DeadlineReader::new(&mut stream, started + Duration::from_millis(300));
        let mut buf = [0u8; 4];
        let err = reader.read_exact(&mut buf).unwrap_err();

        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_expired_deadline_fails_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut stream =
            <TcpStream as Transport>::dial(&addr.to_string(), Duration::from_secs(2)).unwrap();

        let mut reader = DeadlineReader::new(&mut stream, Instant::now());
        let err = reader.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_dial_unresolvable_address() {
        let result = <TcpStream as Transport>::dial("not-an-address", Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_twice_is_fine() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = <TcpStream as Transport>::dial(&addr.to_string(), Duration::from_secs(2))
            .unwrap();

        Transport::shutdown(&stream).unwrap();
        Transport::shutdown(&stream).unwrap();
    }
}
