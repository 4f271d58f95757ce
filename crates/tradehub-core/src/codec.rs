//! Chunk codec
//!
//! Splits a base64 payload into fixed-size text chunks and joins them back.
//! Base64 is pure ASCII, but splitting is done on `char` boundaries anyway so
//! the codec never panics on arbitrary input.

use crate::error::{AppError, AppResult};

/// Split `payload` into consecutive chunks of at most `chunk_size` characters.
///
/// Only the last chunk may be shorter. An empty payload yields zero chunks.
pub fn encode_chunks(payload: &str, chunk_size: usize) -> AppResult<Vec<String>> {
    if chunk_size == 0 {
        return Err(AppError::InvalidInput(
            "chunk size must be greater than 0".to_string(),
        ));
    }

    if payload.is_ascii() {
        return Ok(payload
            .as_bytes()
            .chunks(chunk_size)
            // ASCII slices are always valid UTF-8
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect());
    }

    let mut chunks = Vec::with_capacity(expected_chunk_count(payload.chars().count(), chunk_size));
    let mut current = String::new();
    let mut count = 0;
    for ch in payload.chars() {
        current.push(ch);
        count += 1;
        if count == chunk_size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Concatenate chunks in order. Exact left inverse of [`encode_chunks`].
pub fn decode_chunks<S: AsRef<str>>(chunks: &[S]) -> String {
    let total: usize = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = String::with_capacity(total);
    for chunk in chunks {
        out.push_str(chunk.as_ref());
    }
    out
}

/// `ceil(payload_len / chunk_size)`; zero for an empty payload or a zero chunk size.
pub fn expected_chunk_count(payload_len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    payload_len.div_ceil(chunk_size)
}

/// Chunk count estimated from the raw file size, before base64 encoding.
pub fn estimate_chunk_count(file_size_bytes: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    let base64_len = (file_size_bytes * 4).div_ceil(3);
    base64_len.div_ceil(chunk_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_fixed_size_chunks() {
        let payload = "A".repeat(12_001);
        let chunks = encode_chunks(&payload, 4000).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![4000, 4000, 4000, 1]);
        assert_eq!(decode_chunks(&chunks), payload);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let payload = "QUJD".repeat(2000);
        let chunks = encode_chunks(&payload, 4000).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 4000));
    }

    #[test]
    fn empty_payload_yields_no_chunks() {
        let chunks = encode_chunks("", 4000).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(decode_chunks(&chunks), "");
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(matches!(
            encode_chunks("abc", 0),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn chunk_count_matches_formula_for_many_sizes() {
        let payload: String = (0..997).map(|i| (b'A' + (i % 26) as u8) as char).collect();
        for size in [1, 2, 3, 7, 64, 996, 997, 998, 5000] {
            let chunks = encode_chunks(&payload, size).unwrap();
            assert_eq!(chunks.len(), expected_chunk_count(payload.len(), size));
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            assert_eq!(decode_chunks(&chunks), payload);
        }
    }

    #[test]
    fn splits_non_ascii_on_char_boundaries() {
        let payload = "ééééé";
        let chunks = encode_chunks(payload, 2).unwrap();
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert_eq!(decode_chunks(&chunks), payload);
    }

    #[test]
    fn estimates_from_raw_size() {
        // 3000 raw bytes -> 4000 base64 chars -> 1 chunk
        assert_eq!(estimate_chunk_count(3000, 4000), 1);
        assert_eq!(estimate_chunk_count(3001, 4000), 2);
        assert_eq!(estimate_chunk_count(0, 4000), 0);
    }
}
