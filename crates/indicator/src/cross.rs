/// # Summary
/// 交叉方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    // 上穿
    Up,
    // 下穿
    Down,
}

/// # Summary
/// 检测 `index` 处两条序列的交叉。
///
/// # Logic
/// 1. `index < 1` 或越界时无交叉。
/// 2. 任一操作数在 `index` 或 `index - 1` 处为 `None` 时无交叉。
/// 3. 严格符号翻转：`a[i-1] < b[i-1] && a[i] > b[i]` 为上穿，反之为下穿。
pub fn detect_crossover(a: &[Option<f64>], b: &[Option<f64>], index: usize) -> Option<Cross> {
    if index < 1 || index >= a.len() || index >= b.len() {
        return None;
    }

    let (prev_a, prev_b) = (a[index - 1]?, b[index - 1]?);
    let (cur_a, cur_b) = (a[index]?, b[index]?);

    if prev_a < prev_b && cur_a > cur_b {
        Some(Cross::Up)
    } else if prev_a > prev_b && cur_a < cur_b {
        Some(Cross::Down)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_cross_up_and_down() {
        let b = some(&[2.0, 2.0, 2.0]);
        assert_eq!(detect_crossover(&some(&[1.0, 1.0, 3.0]), &b, 2), Some(Cross::Up));
        assert_eq!(detect_crossover(&some(&[3.0, 3.0, 1.0]), &b, 2), Some(Cross::Down));
    }

    #[test]
    fn test_no_cross_for_monotone_series() {
        let a = some(&[1.0, 2.0, 3.0, 4.0]);
        let b = some(&[5.0, 6.0, 7.0, 8.0]);
        for i in 0..4 {
            assert_eq!(detect_crossover(&a, &b, i), None);
        }
    }

    #[test]
    fn test_none_never_crosses() {
        let a = vec![None, Some(1.0), Some(3.0)];
        let b = some(&[2.0, 2.0, 2.0]);
        assert_eq!(detect_crossover(&a, &b, 1), None);
        assert_eq!(detect_crossover(&a, &b, 2), Some(Cross::Up));
        assert_eq!(detect_crossover(&a, &b, 5), None);
    }

    #[test]
    fn test_touch_is_not_a_cross() {
        let a = some(&[2.0, 3.0]);
        let b = some(&[2.0, 2.0]);
        assert_eq!(detect_crossover(&a, &b, 1), None);
    }
}
