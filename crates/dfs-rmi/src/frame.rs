//! Length-prefixed bincode framing.
//!
//! Wire format: `u32 length prefix (big-endian) + bincode(value)`.
//! A connection carries one request frame and one response frame.

use dfs_proto::constants::MAX_FRAME_SIZE;
use dfs_proto::RmiError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Serialize `value` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), RmiError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(value)?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(RmiError::Protocol(format!(
            "frame of {} bytes exceeds the {} byte limit",
            data.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer
        .write_u32(data.len() as u32)
        .await
        .map_err(|e| RmiError::Network(e.to_string()))?;
    writer
        .write_all(&data)
        .await
        .map_err(|e| RmiError::Network(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| RmiError::Network(e.to_string()))
}

/// Read one frame and deserialize it.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, RmiError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            RmiError::Network("connection closed before a frame arrived".into())
        }
        _ => RmiError::Network(e.to_string()),
    })? as usize;

    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(RmiError::Protocol(format!("invalid frame length {len}")));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| RmiError::Network(e.to_string()))?;

    Ok(bincode::deserialize(&buf)?)
}
