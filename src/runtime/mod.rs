//! Single-client serving loop.
//!
//! One connection is handled at a time, start to finish: accept, serve the
//! upload, close. Clients that connect meanwhile wait in the listen backlog.
//!
//! Building blocks:
//! - `Acceptor`: non-blocking listener polled through mio
//! - `Clock`: millisecond time source for every deadline
//! - `io`: deadline-bounded line, exact and write helpers over a `ClientStream`
//! - `ChunkBuffers`: the only per-request allocation

mod acceptor;
pub mod buffer;
pub mod clock;
pub mod io;

pub use acceptor::Acceptor;

use crate::config::Config;
use crate::display::Display;
use crate::protocols::upload::{serve_client, Outcome, UploadSettings};
use clock::{Clock, MonotonicClock};
use tracing::{debug, error, info};

/// Accept at most one client and serve it to completion.
///
/// Returns `Ok(None)` when nobody connected within the idle interval.
pub fn serve_next<C, D>(
    acceptor: &mut Acceptor,
    clock: &C,
    display: &mut D,
    settings: &UploadSettings,
) -> std::io::Result<Option<Outcome>>
where
    C: Clock + ?Sized,
    D: Display,
{
    let (mut stream, peer) = match acceptor.accept()? {
        Some(pair) => pair,
        None => return Ok(None),
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
    }
    info!(%peer, "Client connected");

    let outcome = serve_client(&mut stream, clock, display, settings);
    debug!(%peer, ?outcome, "Client done");

    // Dropping the stream closes the connection.
    drop(stream);
    Ok(Some(outcome))
}

/// Bind the configured address and serve clients until the process exits.
pub fn run<D: Display>(config: &Config, display: &mut D) -> std::io::Result<()> {
    let mut acceptor = Acceptor::bind(config.listen, config.backlog, config.accept_idle)?;
    info!(addr = %acceptor.local_addr()?, "Listening");

    let clock = MonotonicClock::new();
    let settings = config.upload_settings();

    loop {
        if let Err(e) = serve_next(&mut acceptor, &clock, display, &settings) {
            error!(error = %e, "Accept failed");
            clock.pause(config.accept_idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Framebuffer;
    use crate::testing::{expected_pixels, pattern_payload};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    /// Serve `clients` connections on a background thread, then hand back the
    /// framebuffer and outcomes.
    fn spawn_server(
        clients: usize,
    ) -> (
        std::net::SocketAddr,
        std::thread::JoinHandle<(Framebuffer, Vec<Outcome>)>,
    ) {
        let mut acceptor = Acceptor::bind(
            "127.0.0.1:0".parse().unwrap(),
            4,
            Duration::from_millis(10),
        )
        .unwrap();
        let addr = acceptor.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let clock = MonotonicClock::new();
            let settings = UploadSettings::default();
            let mut display = Framebuffer::new(240, 135);
            let mut outcomes = Vec::new();

            let mut idle_polls = 0;
            while outcomes.len() < clients && idle_polls < 1000 {
                match serve_next(&mut acceptor, &clock, &mut display, &settings).unwrap() {
                    Some(outcome) => outcomes.push(outcome),
                    None => idle_polls += 1,
                }
            }
            (display, outcomes)
        });

        (addr, handle)
    }

    async fn exchange(addr: std::net::SocketAddr, request: &[u8]) -> String {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(request).await.unwrap();

        let mut response = Vec::new();
        timeout(Duration::from_secs(5), client.read_to_end(&mut response))
            .await
            .expect("response timed out")
            .unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upload_end_to_end() {
        let (addr, server) = spawn_server(3);
        let payload = pattern_payload(64_800);

        let mut request = b"POST /update-image HTTP/1.1\r\n\
                            Host: panel.local\r\n\
                            Content-Type: application/octet-stream\r\n\
                            Content-Length: 64800\r\n\r\n"
            .to_vec();
        request.extend_from_slice(&payload);
        let response = exchange(addr, &request).await;
        assert_eq!(
            response,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK"
        );

        let response = exchange(addr, b"GET /update-image HTTP/1.1\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", response);
        assert!(response.ends_with("Not found"));

        let response = exchange(
            addr,
            b"POST /update-image HTTP/1.1\r\nContent-Length: 10\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", response);
        assert!(response.ends_with("Expected 64800 bytes, got 10"));

        let (display, outcomes) = server.join().unwrap();
        assert!(matches!(
            outcomes[0],
            Outcome::Updated {
                chunks: 35,
                bytes: 64_800,
                ..
            }
        ));
        assert_eq!(outcomes[1], Outcome::NotFound);
        assert_eq!(
            outcomes[2],
            Outcome::LengthMismatch {
                expected: 64_800,
                got: 10
            }
        );
        // The rejected requests leave the frame from the first upload intact.
        assert_eq!(display.pixels(), &expected_pixels(&payload)[..]);
    }
}
