/// Maps a multi-dimensional bin coordinate to a flat (row-major) index.
///
/// Returns `None` if the coordinate lies outside of `shape`.
pub fn flat_bin_index(shape: &[usize], coord: &[usize]) -> Option<usize> {
    if shape.len() != coord.len() {
        return None;
    }
    let mut out = 0;
    for (&n, &i) in shape.iter().zip(coord.iter()) {
        if i >= n {
            return None;
        }
        out = out * n + i;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_index() {
        assert_eq!(flat_bin_index(&[2, 3, 4], &[0, 0, 0]), Some(0));
        assert_eq!(flat_bin_index(&[2, 3, 4], &[1, 2, 3]), Some(23));
        assert_eq!(flat_bin_index(&[2, 3, 4], &[0, 1, 0]), Some(4));
        assert_eq!(flat_bin_index(&[2, 3, 4], &[0, 3, 0]), None);
        assert_eq!(flat_bin_index(&[2, 3], &[0, 1, 0]), None);
    }
}
