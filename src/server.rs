use crate::library::BridgeLibrary;
use crate::protocol::handle_line;
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Longest request line accepted, newline included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serves one loaded library to any number of TCP clients.
pub struct Server {
    listener: TcpListener,
    library: Arc<BridgeLibrary>,
}

impl Server {
    pub async fn bind(addr: &str, library: BridgeLibrary) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        Ok(Self {
            listener,
            library: Arc::new(library),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Accepts connections until the task is dropped. Each connection gets its own task.
    pub async fn run(self) -> Result<()> {
        info!("DLL server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {}", peer);
                    let library = Arc::clone(&self.library);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, library).await {
                            warn!("connection {} closed with error: {:#}", peer, e);
                        }
                        trace!("connection {} done", peer);
                    });
                }
                Err(e) => {
                    // Usually fd exhaustion, which does not clear up immediately.
                    error!("Connection failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Like [`Server::run`], but returns once `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            res = self.run() => res,
            _ = shutdown => {
                info!("shutting down");
                Ok(())
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Text(String),
    TooLong,
    Eof,
}

/// Reads one request line of at most [`MAX_LINE_LEN`] bytes. Invalid UTF-8 is
/// replaced rather than rejected; the rest of an overlong line is discarded.
async fn read_request<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if n < MAX_LINE_LEN || buf.last() == Some(&b'\n') {
        return Ok(Line::Text(String::from_utf8_lossy(buf).into_owned()));
    }

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            break;
        }
        let len = available.len();
        reader.consume(len);
    }
    Ok(Line::TooLong)
}

async fn handle_client(stream: TcpStream, library: Arc<BridgeLibrary>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let reply = match read_request(&mut reader, &mut buf).await? {
            Line::Eof => break,
            Line::TooLong => {
                warn!("discarded request over {} bytes", MAX_LINE_LEN);
                Some(format!("ERR Line exceeds {} bytes\n", MAX_LINE_LEN))
            }
            Line::Text(line) => {
                trace!("request: {}", line.trim_end());

                // Foreign code may block, so keep it off the async workers.
                let library = Arc::clone(&library);
                tokio::task::spawn_blocking(move || handle_line(&library, &line)).await?
            }
        };

        if let Some(reply) = reply {
            writer.write_all(reply.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    Ok(())
}
