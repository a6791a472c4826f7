const PARALLEL_CHUNK_ALIGNMENT_ROWS: usize = 4;

/// Number of workers a conversion may fan out to from the current rayon
/// context. Inside an encode task this is the encode pool's width.
#[inline]
pub(crate) fn conversion_workers(max_workers: usize) -> usize {
    rayon::current_num_threads().min(max_workers.max(1))
}

#[inline(always)]
pub(crate) fn should_parallelize(
    pixel_count: usize,
    min_pixels: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
) -> bool {
    let workers = conversion_workers(max_workers);
    if workers <= 1 {
        return false;
    }
    let min_chunk_total = min_chunk_pixels.saturating_mul(workers);
    pixel_count >= min_pixels.max(min_chunk_total)
}

/// Rows per parallel chunk, or `None` when splitting would leave fewer than
/// two chunks of at least `min_chunk_pixels`.
#[inline]
pub(crate) fn parallel_chunk_rows(
    width: usize,
    height: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    let workers = conversion_workers(max_workers);
    let mut chunk_rows = height / workers;
    if chunk_rows.saturating_mul(width) < min_chunk_pixels {
        return None;
    }

    if chunk_rows > PARALLEL_CHUNK_ALIGNMENT_ROWS {
        chunk_rows -= chunk_rows % PARALLEL_CHUNK_ALIGNMENT_ROWS;
    }
    if chunk_rows == 0 || height.div_ceil(chunk_rows) < 2 {
        return None;
    }

    Some(chunk_rows)
}
