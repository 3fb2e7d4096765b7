//! パース関連のユーティリティ関数

use anyhow::Result;

/// 16進数のアドレス文字列をu64にパース
///
/// `0x` プレフィックスは省略できます。
///
/// # Examples
/// ```
/// use dbgkit_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 0x1234);
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    u64::from_str_radix(digits, 16)
        .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", s, e))
}

/// プロセスID文字列をパース
pub fn parse_pid(s: &str) -> Result<i32> {
    let s = s.trim();
    match s.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        Ok(_) => Err(anyhow::anyhow!("Invalid process id '{}': must be positive", s)),
        Err(e) => Err(anyhow::anyhow!("Invalid process id '{}': {}", s, e)),
    }
}
