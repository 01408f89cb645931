//! Serves `/metrics` as plain text over a bare `tokio` accept loop:
//! no web framework, since the only thing ever requested here is the
//! Prometheus text exposition format on a single path.

use std::net::IpAddr;

use prometheus::TextEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub async fn serve(address: IpAddr, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind((address, port)).await?;
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::debug!(?error, "metrics accept error");
                continue;
            }
        };
        tokio::spawn(async move {
            if let Err(error) = handle_connection(&mut stream).await {
                tracing::debug!(?peer, ?error, "metrics connection error");
            }
        });
    }
}

async fn handle_connection(stream: &mut tokio::net::TcpStream) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let body = TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;
    stream.shutdown().await
}
