//! Synthetic pixel generators.
//!
//! Every generator produces chunky 8-bit samples in row-major order with a
//! pattern that makes the source position of a pixel recoverable from its
//! value, so reads can be checked without reference images.

/// Three-band pattern: `[x % 256, y % 256, (x / 256 + y / 256 * 16) % 256]`.
///
/// # Example
///
/// ```
/// use test_utils::position_rgb;
///
/// let pixels = position_rgb(300, 2);
/// assert_eq!(&pixels[0..3], &[0, 0, 0]);
/// let last = (300 + 299) * 3;
/// assert_eq!(&pixels[last..last + 3], &[43, 1, 1]);
/// ```
pub fn position_rgb(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            data.push((x % 256) as u8);
            data.push((y % 256) as u8);
            data.push(((x / 256 + (y / 256) * 16) % 256) as u8);
        }
    }
    data
}

/// Every pixel set to the same samples.
pub fn solid(width: usize, height: usize, samples: &[u8]) -> Vec<u8> {
    samples.repeat(width * height)
}

/// Single-band horizontal ramp `x % 256`.
pub fn gray_ramp(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for _ in 0..height {
        data.extend((0..width).map(|x| (x % 256) as u8));
    }
    data
}

/// Three-band image whose left half is black and right half is `color`.
pub fn half_black(width: usize, height: usize, color: [u8; 3]) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 3);
    for _ in 0..height {
        for x in 0..width {
            if x < width / 2 {
                data.extend_from_slice(&[0, 0, 0]);
            } else {
                data.extend_from_slice(&color);
            }
        }
    }
    data
}

/// Append an alpha sample to each pixel of `data`.
pub fn with_alpha(data: &[u8], bands: usize, alpha: impl Fn(usize) -> u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / bands * (bands + 1));
    for (i, pixel) in data.chunks_exact(bands).enumerate() {
        out.extend_from_slice(pixel);
        out.push(alpha(i));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_rgb_encodes_coordinates() {
        let pixels = position_rgb(600, 300);
        let at = |x: usize, y: usize| &pixels[(y * 600 + x) * 3..(y * 600 + x) * 3 + 3];
        assert_eq!(at(10, 20), &[10, 20, 0]);
        assert_eq!(at(517, 260), &[5, 4, 18]);
    }

    #[test]
    fn test_solid_and_alpha() {
        let pixels = solid(2, 2, &[1, 2, 3]);
        assert_eq!(pixels.len(), 12);
        let rgba = with_alpha(&pixels, 3, |i| i as u8);
        assert_eq!(&rgba[12..16], &[1, 2, 3, 3]);
    }

    #[test]
    fn test_half_black() {
        let pixels = half_black(4, 1, [9, 9, 9]);
        assert_eq!(pixels, vec![0, 0, 0, 0, 0, 0, 9, 9, 9, 9, 9, 9]);
    }
}
