//! Pure calculation functions for rendition geometry.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions of the compressed rendition.
///
/// Scales down so the height fits `max_height`, preserving aspect ratio.
/// Sources already within the limit are returned unchanged (never upscaled).
///
/// ```
/// # use media_migrate::imaging::calculate_compressed_dimensions;
/// assert_eq!(calculate_compressed_dimensions((3000, 2000), 1000), (1500, 1000));
/// assert_eq!(calculate_compressed_dimensions((640, 480), 1000), (640, 480));
/// ```
pub fn calculate_compressed_dimensions(source: (u32, u32), max_height: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_h <= max_height {
        return source;
    }
    let w = (src_w as f64 * max_height as f64 / src_h as f64).round() as u32;
    (w.max(1), max_height)
}

/// Dimensions of the luminance image used to score avatar crop windows.
///
/// The short side is scaled to `target`, unless that would push the long
/// side past `max_lines`; then the long side is capped at `max_lines` and
/// the short side follows. Neither side collapses below one pixel.
///
/// ```
/// # use media_migrate::imaging::calculate_score_dimensions;
/// assert_eq!(calculate_score_dimensions((800, 400), 200, 2048), (400, 200));
/// assert_eq!(calculate_score_dimensions((20_000, 10), 200, 2048), (2048, 1));
/// ```
pub fn calculate_score_dimensions(source: (u32, u32), target: u32, max_lines: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let short = src_w.min(src_h) as f64;
    let long = src_w.max(src_h) as f64;
    let scale = (target as f64 / short).min(max_lines as f64 / long);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_lines);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_lines);
    (w, h)
}

/// Map a window offset chosen on the scoring image back to the source.
///
/// `score_range` and `source_range` are how far the window can slide on
/// each image. With no room to slide on the scoring image the source window
/// is centered.
pub fn map_window_offset(offset: usize, score_range: u32, source_range: u32) -> u32 {
    if score_range == 0 {
        return source_range / 2;
    }
    let mapped = (offset as f64 * source_range as f64 / score_range as f64).round() as u32;
    mapped.min(source_range)
}

/// Dimensions that fit inside a `bound`×`bound` box, preserving aspect ratio.
///
/// The longer edge becomes exactly `bound`; small sources are scaled up.
/// Neither side collapses below one pixel.
pub fn calculate_fit_within(source: (u32, u32), bound: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let scale = (bound as f64 / src_w as f64).min(bound as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, bound);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, bound);
    (w, h)
}

/// Shannon entropy (bits) of a luminance histogram.
pub fn shannon_entropy(histogram: &[u32; 256]) -> f64 {
    let total: u64 = histogram.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

const ENTROPY_EPSILON: f64 = 1e-9;

/// Pick the crop offset whose window carries the most luminance entropy.
///
/// `lines` holds one histogram per row (or column) along the axis that
/// overflows the crop; `window` is the crop length on that axis. Windows
/// slide one line at a time. Equal-entropy windows resolve toward the center,
/// so a flat image crops like a center crop.
pub fn entropy_window_offset(lines: &[[u32; 256]], window: usize) -> usize {
    if window == 0 || lines.len() <= window {
        return 0;
    }

    let mut hist = [0u32; 256];
    for line in &lines[..window] {
        add_histogram(&mut hist, line);
    }

    let center = (lines.len() - window) / 2;
    let mut best_offset: usize = 0;
    let mut best_entropy = shannon_entropy(&hist);

    for offset in 1..=lines.len() - window {
        subtract_histogram(&mut hist, &lines[offset - 1]);
        add_histogram(&mut hist, &lines[offset + window - 1]);

        let entropy = shannon_entropy(&hist);
        let better = entropy > best_entropy + ENTROPY_EPSILON;
        let tie_closer = (entropy - best_entropy).abs() <= ENTROPY_EPSILON
            && offset.abs_diff(center) < best_offset.abs_diff(center);
        if better || tie_closer {
            best_offset = offset;
            best_entropy = entropy;
        }
    }

    best_offset
}

fn add_histogram(into: &mut [u32; 256], line: &[u32; 256]) {
    for (acc, &c) in into.iter_mut().zip(line.iter()) {
        *acc += c;
    }
}

fn subtract_histogram(from: &mut [u32; 256], line: &[u32; 256]) {
    for (acc, &c) in from.iter_mut().zip(line.iter()) {
        *acc -= c;
    }
}
