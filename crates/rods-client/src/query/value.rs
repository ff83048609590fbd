//! 行值扫描：目录字符串值到 Rust 类型的显式转换能力集。
//!
//! 能力集固定为整数、无符号整数、浮点、布尔、字符串与时间戳；时间戳
//! 为 unix 秒，`"0"` 或负数解析为零时间。

use rods_core::error::RodsError;
use rods_core::types::parse_catalog_time;
use std::time::SystemTime;

/// 可作为 Scan 目标的值类型。
pub trait ScanValue: Sized {
    /// 由目录字符串值解析。
    fn scan(value: &str) -> Result<Self, RodsError>;
}

fn parse_error(value: &str, target: &'static str) -> RodsError {
    RodsError::Parse {
        value: value.to_string(),
        target,
    }
}

macro_rules! impl_scan_parse {
    ($($ty:ty),+) => {
        $(impl ScanValue for $ty {
            fn scan(value: &str) -> Result<Self, RodsError> {
                value
                    .trim()
                    .parse::<$ty>()
                    .map_err(|_| parse_error(value, stringify!($ty)))
            }
        })+
    };
}

impl_scan_parse!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl ScanValue for String {
    fn scan(value: &str) -> Result<Self, RodsError> {
        Ok(value.to_string())
    }
}

impl ScanValue for bool {
    fn scan(value: &str) -> Result<Self, RodsError> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return Ok(true);
        }
        if trimmed.eq_ignore_ascii_case("false") || trimmed.is_empty() {
            return Ok(false);
        }
        trimmed
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| parse_error(value, "bool"))
    }
}

impl ScanValue for SystemTime {
    fn scan(value: &str) -> Result<Self, RodsError> {
        Ok(parse_catalog_time(value))
    }
}

/// 多列 Scan 目标：元组中的每个 `&mut T` 按列位绑定一个值。
pub trait ScanTargets {
    /// 以列位取值闭包填充全部目标。
    fn scan_with(
        self,
        fetch: &mut dyn FnMut(usize) -> Result<String, RodsError>,
    ) -> Result<(), RodsError>;
}

macro_rules! impl_scan_targets {
    ($(($($name:ident : $index:tt),+))+) => {
        $(impl<$($name: ScanValue),+> ScanTargets for ($(&mut $name,)+) {
            fn scan_with(
                self,
                fetch: &mut dyn FnMut(usize) -> Result<String, RodsError>,
            ) -> Result<(), RodsError> {
                $(*self.$index = $name::scan(&fetch($index)?)?;)+
                Ok(())
            }
        })+
    };
}

impl_scan_targets! {
    (A0: 0)
    (A0: 0, A1: 1)
    (A0: 0, A1: 1, A2: 2)
    (A0: 0, A1: 1, A2: 2, A3: 3)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7, A8: 8)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7, A8: 8, A9: 9)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7, A8: 8, A9: 9, A10: 10)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7, A8: 8, A9: 9, A10: 10, A11: 11)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn value_round_trip_per_capability() {
        assert_eq!(i64::scan("42").expect("整数应可解析"), 42);
        assert_eq!(u32::scan(" 7 ").expect("应容忍空白"), 7);
        assert_eq!(f64::scan("2.5").expect("浮点应可解析"), 2.5);
        assert!(bool::scan("1").expect("布尔应可解析"));
        assert!(!bool::scan("").expect("空串按 false 处理"));
        assert_eq!(String::scan("abc").expect("字符串恒可解析"), "abc");
        assert_eq!(
            SystemTime::scan("100").expect("时间戳应可解析"),
            UNIX_EPOCH + Duration::from_secs(100)
        );
        assert_eq!(SystemTime::scan("-1").expect("负数映射零时间"), UNIX_EPOCH);
        assert!(matches!(
            i32::scan("abc"),
            Err(RodsError::Parse { target: "i32", .. })
        ));
    }

    #[test]
    fn tuple_targets_bind_by_position() {
        let values = ["10".to_string(), "name".to_string(), "1".to_string()];
        let (mut id, mut name, mut flag) = (0_i64, String::new(), false);
        (&mut id, &mut name, &mut flag)
            .scan_with(&mut |index| Ok(values[index].clone()))
            .expect("按列位扫描应成功");
        assert_eq!((id, name.as_str(), flag), (10, "name", true));
    }
}
