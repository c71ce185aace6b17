/// Shorten an account identifier for log output: `0x1234…cdef`.
///
/// Identifiers of 12 characters or fewer are returned unchanged.
pub fn format_account_id(account: &str) -> String {
    let chars: Vec<char> = account.chars().collect();
    if chars.len() <= 12 {
        return account.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Log-friendly rendering of an optional account.
pub fn format_optional_account(account: Option<&str>) -> String {
    account.map_or_else(|| "none".to_string(), format_account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_account_id() {
        assert_eq!(
            format_account_id("0x0123456789abcdef0123456789abcdef"),
            "0x0123…cdef"
        );
        assert_eq!(format_account_id("0xshort"), "0xshort");
        assert_eq!(format_optional_account(None), "none");
    }
}
