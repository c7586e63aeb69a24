//! JSON-lines framing for the launcher control socket
//!
//! Every request and response is a single JSON value followed by `\n`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io::{Error, ErrorKind};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub const MAX_FRAME_BYTES: usize = 256 * 1024;

fn invalid_data(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
    Error::new(ErrorKind::InvalidData, e)
}

/// Read one frame, refusing lines longer than `max_bytes`.
///
/// Returns `Ok(None)` on a clean EOF.
pub async fn read_frame_with_limit<R, T>(reader: &mut R, max_bytes: usize) -> std::io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
        return Ok(None);
    }
    if line.len() > max_bytes {
        return Err(invalid_data(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            line.len(),
            max_bytes
        )));
    }

    serde_json::from_slice::<T>(&line).map(Some).map_err(invalid_data)
}

pub async fn read_frame<R, T>(reader: &mut R) -> std::io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    read_frame_with_limit(reader, MAX_FRAME_BYTES).await
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value).map_err(invalid_data)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Answer requests on one connection until the peer hangs up.
///
/// Undecodable frames are answered with `on_invalid(err)` and the connection
/// stays open.
pub async fn serve<Req, Resp, F, Fut, Invalid>(
    stream: UnixStream,
    handler: F,
    on_invalid: Invalid,
) -> std::io::Result<()>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Resp>,
    Invalid: Fn(Error) -> Resp,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let response = match read_frame::<_, Req>(&mut reader).await {
            Ok(Some(request)) => handler(request).await,
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::InvalidData => on_invalid(e),
            Err(e) => return Err(e),
        };
        write_frame(&mut writer, &response).await?;
    }
}

/// Connect to `path`, send one request and wait for its response.
pub async fn request<Req, Resp>(path: impl AsRef<Path>, request: &Req) -> std::io::Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let stream = UnixStream::connect(path.as_ref()).await?;
    let (reader, mut writer) = stream.into_split();
    write_frame(&mut writer, request).await?;

    let mut reader = BufReader::new(reader);
    read_frame(&mut reader).await?.ok_or_else(|| {
        Error::new(
            ErrorKind::UnexpectedEof,
            "control socket closed before responding",
        )
    })
}
