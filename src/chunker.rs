/// Default chunk size, comfortably under the 2048-byte datagram ceiling once JSON framing
/// and checksum overhead are accounted for.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Splits `data` into an ordered sequence of chunks no larger than `chunk_size`. A thin,
/// allocation-light analogue of `original_source/ftp/client.py`'s chunking collaborator,
/// rebuilt as a free function rather than a stateful class.
pub fn chunk(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return Vec::new();
    }
    data.chunks(chunk_size.max(1)).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_even_chunks() {
        let data = vec![0u8; 10];
        let chunks = chunk(&data, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 4);
        assert_eq!(chunks[2].len(), 2);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk(&[], 4).is_empty());
    }

    #[test]
    fn preserves_bytes_across_the_full_reconstruction() {
        let data: Vec<u8> = (0u8..=255).collect();
        let chunks = chunk(&data, 17);
        let rebuilt: Vec<u8> = chunks.into_iter().flatten().collect();
        assert_eq!(rebuilt, data);
    }
}
