//! Hex payload and number parsing for command-line arguments

use anyhow::{Result, anyhow, bail};

/// Parse a hex string such as `"2a49444e3f0a"`, `"2A 49 44"` or `"0x2a,0x49"`
pub fn parse_bytes(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|part| {
            part.strip_prefix("0x")
                .or_else(|| part.strip_prefix("0X"))
                .unwrap_or(part)
        })
        .collect();

    if digits.len() % 2 != 0 {
        bail!("Hex payload '{}' has an odd number of digits", input);
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = digits
                .get(i..i + 2)
                .ok_or_else(|| anyhow!("Invalid hex payload '{}'", input))?;
            u8::from_str_radix(pair, 16)
                .map_err(|_| anyhow!("Invalid hex byte '{}' in '{}'", pair, input))
        })
        .collect()
}

/// Lowercase hex with a space between bytes
pub fn format_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a number given in decimal or `0x` hexadecimal
pub fn parse_number<T: TryFrom<u64>>(input: &str) -> Result<T, String> {
    let value = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse(),
    }
    .map_err(|e| format!("'{}' is not a number: {}", input, e))?;

    T::try_from(value).map_err(|_| format!("'{}' is out of range", input))
}

pub fn parse_u8(input: &str) -> Result<u8, String> {
    parse_number(input)
}

pub fn parse_u16(input: &str) -> Result<u16, String> {
    parse_number(input)
}
