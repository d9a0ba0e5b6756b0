pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Trailing moving average: each output is the mean of up to `window`
/// values ending at the same position.
pub fn trailing_mean(data: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);

    (0..data.len())
        .map(|i| {
            let from = (i + 1).saturating_sub(window);
            mean(&data[from..=i]).unwrap_or(0.0)
        })
        .collect()
}

/// Characters per minute expressed as words per minute (1 word = 5 chars)
pub fn chars_to_wpm(chars: f64, secs: f64) -> f64 {
    if secs > 0.0 {
        (chars / 5.0) / (secs / 60.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 20., 30., 15., 22.]), Some(19.4));
        assert_eq!(mean(&[15., 7., 55., 12., 4.]), Some(18.6));
    }

    #[test]
    fn test_mean_single_value() {
        assert_eq!(mean(&[42.0]), Some(42.0));
    }

    #[test]
    fn test_mean_empty_slice() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_trailing_mean_short_series() {
        assert_eq!(trailing_mean(&[2.0, 4.0, 6.0], 10), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_trailing_mean_window_slides() {
        assert_eq!(
            trailing_mean(&[1.0, 3.0, 5.0, 7.0], 2),
            vec![1.0, 2.0, 4.0, 6.0]
        );
    }

    #[test]
    fn test_trailing_mean_empty() {
        assert!(trailing_mean(&[], 10).is_empty());
    }

    #[test]
    fn test_chars_to_wpm() {
        assert_eq!(chars_to_wpm(5.0, 60.0), 1.0);
        assert!((chars_to_wpm(3.0, 0.3) - 120.0).abs() < 1e-9);
        assert_eq!(chars_to_wpm(10.0, 0.0), 0.0);
    }
}
