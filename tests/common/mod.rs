#![allow(dead_code)]

use dllbridge::{BridgeLibrary, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Serves `library` on an ephemeral port from a background task.
pub async fn start_server(library: BridgeLibrary) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0", library).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// Sends each request on one connection and collects one reply line per request.
pub async fn roundtrip(addr: SocketAddr, requests: &[&[u8]]) -> Vec<String> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let mut replies = Vec::new();
    for request in requests {
        writer.write_all(request).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        replies.push(lines.next_line().await.unwrap().unwrap());
    }
    replies
}

/// Builds the `testlib` cdylib once per test binary and returns its path.
///
/// It gets its own target directory so the nested cargo does not wait on the
/// lock held by the cargo running these tests.
pub fn fixture_library() -> &'static PathBuf {
    static FIXTURE: OnceLock<PathBuf> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let target_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("fixture");
        let status = Command::new(env!("CARGO"))
            .args(["build", "--quiet", "-p", "testlib", "--manifest-path"])
            .arg(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"))
            .arg("--target-dir")
            .arg(&target_dir)
            .status()
            .expect("failed to run cargo");
        assert!(status.success(), "building testlib failed");

        let name = format!(
            "{}testlib{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_SUFFIX
        );
        let path = target_dir.join("debug").join(name);
        assert!(path.exists(), "missing {}", path.display());
        path
    })
}
