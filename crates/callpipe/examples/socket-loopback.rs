//! Two call channels talking over a Unix socket pair.
//!
//! Each side wraps its socket in a `StreamEndpoint` (reads happen on a
//! background thread and are marshaled back over a channel), binds it to a
//! delegate pipe and drives it from this thread.
//!
//! Run with:
//!   cargo run --example socket-loopback

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use callpipe::frame::Call;
    use callpipe::pipe::{CallChannel, DelegatePipe};
    use callpipe::transport::{EndpointPoll, StreamEndpoint, Transport};

    let (left, right) = UnixStream::pair()?;
    let client_transport = Transport::new(StreamEndpoint::unix(left)?);
    let server_transport = Transport::new(StreamEndpoint::unix(right)?);

    let client = CallChannel::new(DelegatePipe::bind(client_transport.clone())?);
    let server = CallChannel::new(DelegatePipe::bind(server_transport.clone())?);

    // Print every raw chunk the server sees.
    server.pipe().node().attach_listener(|chunk| {
        eprintln!("server received {} bytes", chunk.len());
    });

    for i in 0..3i64 {
        client.send_call(&Call::new("ping").arg(i))?;
    }

    let mut pongs = 0;
    while pongs < 3 {
        if let EndpointPoll::Eof = server_transport.poll(Some(Duration::from_millis(200)))? {
            break;
        }
        let mut replies = Vec::new();
        server.drain(|call| {
            eprintln!("server got {}({:?})", call.name(), call.args());
            replies.push(Call::with_args("pong", call.args().to_vec()));
        })?;
        for reply in &replies {
            server.send_call(reply)?;
        }

        if let EndpointPoll::Eof = client_transport.poll(Some(Duration::from_millis(200)))? {
            break;
        }
        client.drain(|call| {
            eprintln!("client got {}({:?})", call.name(), call.args());
            pongs += 1;
        })?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("socket-loopback needs Unix domain sockets");
}
