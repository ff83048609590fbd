//! 范围切分：把文件尺寸按并行度折算成范围大小。

/// 每个拷贝任务的缓冲区尺寸（8 MiB）。
pub const BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// 单个范围的下限（32 MiB）；小于它的并行切分得不偿失。
pub const MINIMUM_RANGE_SIZE: i64 = 32 * 1024 * 1024;

/// 以默认缓冲与下限计算范围大小。
///
/// 结果满足 `r * threads ≥ size`、`r % BUFFER_SIZE == 0` 且
/// `r ≥ MINIMUM_RANGE_SIZE`。
pub fn calculate_range_size(size: i64, threads: usize) -> i64 {
    range_size_with(size, threads, BUFFER_SIZE as i64, MINIMUM_RANGE_SIZE)
}

/// 参数化的范围计算；`minimum` 应是 `buffer` 的整数倍。
pub(crate) fn range_size_with(size: i64, threads: usize, buffer: i64, minimum: i64) -> i64 {
    let threads = threads.max(1) as i64;
    let mut range = div_ceil_i64(size, threads);
    range = div_ceil_i64(range, buffer) * buffer;
    if range < minimum {
        range = minimum;
    }
    while range * threads < size {
        range += buffer;
    }
    range
}

/// `i64::div_ceil` 在当前工具链上仍不稳定，在此手写等价实现。
fn div_ceil_i64(lhs: i64, rhs: i64) -> i64 {
    let d = lhs / rhs;
    let r = lhs % rhs;
    if (r > 0 && rhs > 0) || (r < 0 && rhs < 0) {
        d + 1
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scenario_values() {
        // 300 字节、缓冲 100、下限 200、双线程：两个 200 字节的范围。
        assert_eq!(range_size_with(300, 2, 100, 200), 200);
        assert_eq!(range_size_with(0, 4, 100, 200), 200);
        assert_eq!(
            calculate_range_size(1, 1),
            MINIMUM_RANGE_SIZE,
            "小文件应被钳到范围下限"
        );
    }

    proptest! {
        #[test]
        fn invariants_hold(
            size in 0_i64..1_000_000_000,
            threads in 1_usize..64,
            buffer_units in 1_i64..64,
            minimum_units in 1_i64..16,
        ) {
            let buffer = buffer_units * 512;
            let minimum = minimum_units * buffer;
            let range = range_size_with(size, threads, buffer, minimum);
            prop_assert!(range * threads as i64 >= size, "范围乘线程数必须覆盖全文件");
            prop_assert_eq!(range % buffer, 0, "范围必须是缓冲区的整数倍");
            prop_assert!(range >= minimum, "范围不得低于下限");
        }
    }
}
