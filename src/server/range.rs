/// Range 请求头的解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// 没有 Range 头，整文件响应
    Full,
    /// 合法的单段范围，闭区间 [start, end]
    Bounded { start: u64, end: u64 },
    /// 语法损坏或越界，应答 416
    Unsatisfiable,
}

/// 解析 `bytes=<start>-<end>` 形式的 Range 头（end 可省略表示到文件尾）
///
/// 语法损坏、start > end、或任一端落在 [0, length) 之外都判定为
/// 不可满足，由上层统一回 416 + `Content-Range: bytes */<length>`。
pub fn parse_range(header: Option<&str>, length: u64) -> RangeSpec {
    let Some(header) = header else {
        return RangeSpec::Full;
    };

    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeSpec::Unsatisfiable;
    };
    // 只支持单段范围
    if spec.contains(',') {
        return RangeSpec::Unsatisfiable;
    }

    let Some((start_raw, end_raw)) = spec.split_once('-') else {
        return RangeSpec::Unsatisfiable;
    };

    let Ok(start) = start_raw.trim().parse::<u64>() else {
        return RangeSpec::Unsatisfiable;
    };

    let end = if end_raw.trim().is_empty() {
        // 开区间到文件尾
        length.checked_sub(1)
    } else {
        end_raw.trim().parse::<u64>().ok()
    };
    let Some(end) = end else {
        return RangeSpec::Unsatisfiable;
    };

    if start > end || end >= length {
        return RangeSpec::Unsatisfiable;
    }
    RangeSpec::Bounded { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header_means_full() {
        assert_eq!(parse_range(None, 1024), RangeSpec::Full);
    }

    #[test]
    fn test_valid_bounded_range() {
        assert_eq!(
            parse_range(Some("bytes=0-1023"), 1_073_741_824),
            RangeSpec::Bounded { start: 0, end: 1023 }
        );
        assert_eq!(
            parse_range(Some("bytes=512-1023"), 1024),
            RangeSpec::Bounded { start: 512, end: 1023 }
        );
    }

    #[test]
    fn test_open_end_goes_to_eof() {
        assert_eq!(
            parse_range(Some("bytes=100-"), 1024),
            RangeSpec::Bounded { start: 100, end: 1023 }
        );
    }

    #[test]
    fn test_inverted_range_unsatisfiable() {
        // start > end
        assert_eq!(parse_range(Some("bytes=10-5"), 1024), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn test_out_of_bounds_unsatisfiable() {
        // end >= length
        assert_eq!(parse_range(Some("bytes=0-1024"), 1024), RangeSpec::Unsatisfiable);
        // start >= length
        assert_eq!(parse_range(Some("bytes=2048-"), 1024), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn test_malformed_unsatisfiable() {
        assert_eq!(parse_range(Some("octets=0-1"), 1024), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=abc-1"), 1024), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-500"), 1024), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-1,5-9"), 1024), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes="), 1024), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn test_empty_file_any_range_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=0-0"), 0), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-"), 0), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn test_content_length_matches_window() {
        // 206 的 Content-Length 必须等于 end-start+1
        if let RangeSpec::Bounded { start, end } = parse_range(Some("bytes=0-1023"), 1 << 30) {
            assert_eq!(end - start + 1, 1024);
        } else {
            panic!("应解析为有界范围");
        }
    }
}
