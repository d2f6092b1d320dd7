//! Streaming gzip decompression over chunk streams

use crate::storage::ChunkStream;
use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use futures::{stream, StreamExt};
use std::io::{self, Write};

struct Gunzip {
    input: ChunkStream,
    decoder: Option<MultiGzDecoder<Vec<u8>>>,
}

async fn next_chunk(mut state: Gunzip) -> io::Result<Option<(Bytes, Gunzip)>> {
    loop {
        let Some(decoder) = state.decoder.as_mut() else {
            return Ok(None);
        };

        match state.input.next().await {
            Some(chunk) => {
                decoder.write_all(&chunk?)?;
                let out = std::mem::take(decoder.get_mut());
                if !out.is_empty() {
                    return Ok(Some((Bytes::from(out), state)));
                }
            },
            None => {
                let out = match state.decoder.take() {
                    Some(decoder) => decoder.finish()?,
                    None => Vec::new(),
                };
                if out.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((Bytes::from(out), state)));
            },
        }
    }
}

/// Decompress a gzip (possibly multi-member) chunk stream as it is read.
pub fn gunzip(input: ChunkStream) -> ChunkStream {
    let state = Gunzip {
        input,
        decoder: Some(MultiGzDecoder::new(Vec::new())),
    };
    stream::try_unfold(state, next_chunk).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use futures::TryStreamExt;

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn chunked(data: Vec<u8>, size: usize) -> ChunkStream {
        let chunks: Vec<io::Result<Bytes>> = data.chunks(size).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        stream::iter(chunks).boxed()
    }

    async fn collect(stream: ChunkStream) -> io::Result<Vec<u8>> {
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        Ok(chunks.concat())
    }

    #[tokio::test]
    async fn test_gunzip_small_chunks() {
        let plain: Vec<u8> = (0..50_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let out = collect(gunzip(chunked(gz(&plain), 7))).await.unwrap();
        assert_eq!(out, plain);
    }

    #[tokio::test]
    async fn test_gunzip_multi_member() {
        let mut data = gz(b"first,");
        data.extend(gz(b"second"));
        let out = collect(gunzip(chunked(data, 1024))).await.unwrap();
        assert_eq!(out, b"first,second");
    }

    #[tokio::test]
    async fn test_gunzip_rejects_plain_text() {
        let result = collect(gunzip(chunked(b"this is not gzip data at all".to_vec(), 8))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_gunzip_propagates_source_errors() {
        let input = stream::iter(vec![Ok(Bytes::from(gz(b"abc"))), Err(io::Error::other("reset"))]).boxed();
        assert!(collect(gunzip(input)).await.is_err());
    }
}
