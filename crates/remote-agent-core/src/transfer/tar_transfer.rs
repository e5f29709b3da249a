//! Tar Transfer (C7): streams an Upload archive onto disk, or a Download
//! archive onto the wire, over an already-accepted transfer connection.
//!
//! New: the `tar` crate is synchronous, so both directions hand the raw
//! socket to `spawn_blocking`, matching how the worker crate offloads
//! blocking filesystem work onto its own blocking pool rather than
//! fighting the executor.

use crate::error::{AgentError, Result};
use crate::transfer::size_probe::ResolvedEntry;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tokio::net::TcpStream;

fn tar_err(err: io::Error) -> AgentError {
    AgentError::TransferProtocol(err.to_string())
}

/// Receives a tar stream from `stream` and unpacks it under `dest_dir`,
/// returning the total bytes written. After the last archive entry, any
/// residual bytes (tar's trailing zero-padding blocks) are drained
/// without closing the socket, then a `"<bytes>\r\n"` trailer is written
/// back — closing early would RST the connection before the peer reads
/// the trailer.
pub async fn upload(stream: TcpStream, dest_dir: std::path::PathBuf, overwrite: bool) -> Result<u64> {
    let std_stream = stream.into_std().map_err(tar_err)?;
    std_stream.set_nonblocking(false).map_err(tar_err)?;
    tokio::task::spawn_blocking(move || upload_blocking(std_stream, &dest_dir, overwrite))
        .await
        .map_err(|e| AgentError::TransferProtocol(e.to_string()))?
}

fn upload_blocking(stream: std::net::TcpStream, dest_dir: &Path, overwrite: bool) -> Result<u64> {
    fs::create_dir_all(dest_dir).map_err(tar_err)?;

    let mut total: u64 = 0;
    {
        let mut archive = tar::Archive::new(&stream);
        for entry in archive.entries().map_err(tar_err)? {
            let mut entry = entry.map_err(tar_err)?;
            let rel_path = entry.path().map_err(tar_err)?.into_owned();
            let dest_path = dest_dir.join(&rel_path);

            if entry.header().entry_type().is_dir() {
                fs::create_dir_all(&dest_path).map_err(tar_err)?;
                continue;
            }

            if !overwrite && dest_path.exists() {
                return Err(AgentError::TransferProtocol(format!(
                    "destination {} already exists",
                    dest_path.display()
                )));
            }
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(tar_err)?;
            }

            let size = entry.header().size().map_err(tar_err)?;
            entry.unpack(&dest_path).map_err(tar_err)?;
            total += size;
        }
    }

    drain_residual(&stream)?;
    let trailer = format!("{total}\r\n");
    (&stream).write_all(trailer.as_bytes()).map_err(tar_err)?;
    Ok(total)
}

fn drain_residual(stream: &std::net::TcpStream) -> Result<()> {
    let mut reader = stream;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(_) => continue,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(tar_err(e)),
        }
    }
}

/// Streams `entries` onto `stream` as a tar archive, returning the total
/// bytes of file content written (directory entries carry no content).
pub async fn download(stream: TcpStream, entries: Vec<ResolvedEntry>) -> Result<u64> {
    let std_stream = stream.into_std().map_err(tar_err)?;
    std_stream.set_nonblocking(false).map_err(tar_err)?;
    tokio::task::spawn_blocking(move || download_blocking(std_stream, entries))
        .await
        .map_err(|e| AgentError::TransferProtocol(e.to_string()))?
}

fn download_blocking(stream: std::net::TcpStream, entries: Vec<ResolvedEntry>) -> Result<u64> {
    let mut builder = tar::Builder::new(&stream);
    let mut total = 0u64;
    for entry in entries {
        if entry.is_dir {
            builder
                .append_dir(&entry.archive_name, &entry.disk_path)
                .map_err(tar_err)?;
        } else {
            let mut file = fs::File::open(&entry.disk_path).map_err(tar_err)?;
            builder
                .append_file(&entry.archive_name, &mut file)
                .map_err(tar_err)?;
            total += entry.size;
        }
    }
    builder.finish().map_err(tar_err)?;
    Ok(total)
}
