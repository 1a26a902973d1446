pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Accepts decimal seeds and `0x`-prefixed hexadecimal ones.
pub fn parse_seed(raw: &str) -> Result<u64, String> {
    let token = raw.trim().replace('_', "");
    let parsed = if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        token.parse::<u64>()
    };
    parsed.map_err(|err| format!("invalid seed `{raw}`: {err}"))
}
