//! Multipart-compatible content checksums
//!
//! The remote store reports a multipart object's checksum as the MD5 of the
//! concatenated per-part digests, suffixed with the part count. Computing
//! the same value locally lets a dedup check compare the two strings
//! byte-for-byte. The chunk size passed here must equal the part size used
//! by the storage client, or the two formats will never match even for
//! identical content.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUF_BYTES: usize = 64 * 1024;

/// Compute the checksum of a file at the given chunk granularity.
///
/// Files no larger than one chunk get a plain hex MD5. Larger files get
/// the multipart form `hex(md5(d1 || d2 || ...)) + "-" + chunk_count`,
/// where `dN` is the raw MD5 digest of the Nth chunk.
///
/// The file is streamed; only `READ_BUF_BYTES` are resident at a time.
pub fn compute(path: impl AsRef<Path>, chunk_size: u64) -> Result<String> {
    if chunk_size == 0 {
        return Err(PipelineError::config("chunk size must be positive"));
    }

    let path = path.as_ref();
    let size = std::fs::metadata(path)?.len();
    let mut file = File::open(path)?;

    if size <= chunk_size {
        let mut context = md5::Context::new();
        let mut buffer = [0u8; READ_BUF_BYTES];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
        }
        return Ok(format!("{:x}", context.compute()));
    }

    let (digests, chunk_count) = chunk_digests(&mut file, chunk_size)?;
    Ok(format!("{:x}-{}", md5::compute(&digests), chunk_count))
}

/// Raw per-chunk MD5 digests, concatenated, plus the chunk count.
fn chunk_digests(file: &mut File, chunk_size: u64) -> Result<(Vec<u8>, u64)> {
    let mut digests = Vec::new();
    let mut chunk_count = 0u64;
    let mut buffer = vec![0u8; READ_BUF_BYTES];

    loop {
        let mut context = md5::Context::new();
        let mut remaining = chunk_size;
        let mut chunk_bytes = 0u64;

        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            let bytes_read = file.read(&mut buffer[..want])?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
            chunk_bytes += bytes_read as u64;
            remaining -= bytes_read as u64;
        }

        if chunk_bytes == 0 {
            break;
        }
        digests.extend_from_slice(&*context.compute());
        chunk_count += 1;
    }

    Ok((digests, chunk_count))
}
