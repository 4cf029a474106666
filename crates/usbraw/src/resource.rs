//! VISA resource names for raw USB devices
//!
//! Grammar: `USB[board]::vendor::product::serial[::interface]::RAW`, where
//! vendor, product and interface are decimal or `0x`-prefixed hexadecimal.

use crate::discovery::DeviceFilter;
use crate::error::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName {
    pub board: u16,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: String,
    pub interface: Option<u8>,
}

impl ResourceName {
    pub fn new(vendor_id: u16, product_id: u16, serial_number: impl Into<String>) -> Self {
        Self {
            board: 0,
            vendor_id,
            product_id,
            serial_number: serial_number.into(),
            interface: None,
        }
    }

    /// Discovery criteria selecting this resource
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter::new()
            .vendor_id(self.vendor_id)
            .product_id(self.product_id)
            .serial_number(self.serial_number.clone())
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "USB{}::0x{:04X}::0x{:04X}::{}",
            self.board, self.vendor_id, self.product_id, self.serial_number
        )?;
        if let Some(interface) = self.interface {
            write!(f, "::{}", interface)?;
        }
        write!(f, "::RAW")
    }
}

impl FromStr for ResourceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidResource(format!("{}: {}", s, reason));

        let parts: Vec<&str> = s.trim().split("::").collect();
        if !(5..=6).contains(&parts.len()) {
            return Err(invalid("expected 5 or 6 '::'-separated fields"));
        }

        let prefix = parts[0];
        if !prefix.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("USB")) {
            return Err(invalid("must start with USB"));
        }
        let board = match &prefix[3..] {
            "" => 0,
            digits if is_digits(digits, 10) => digits.parse().map_err(|_| invalid("bad board number"))?,
            _ => return Err(invalid("bad board number")),
        };

        if !parts[parts.len() - 1].eq_ignore_ascii_case("RAW") {
            return Err(invalid("must end with ::RAW"));
        }

        let vendor_id = parse_number(parts[1]).ok_or_else(|| invalid("bad vendor ID"))?;
        let product_id = parse_number(parts[2]).ok_or_else(|| invalid("bad product ID"))?;

        let serial_number = parts[3].to_string();
        if serial_number.is_empty() {
            return Err(invalid("empty serial number"));
        }

        let interface = match parts.len() {
            6 => Some(parse_number(parts[4]).ok_or_else(|| invalid("bad interface number"))?),
            _ => None,
        };

        Ok(Self {
            board,
            vendor_id,
            product_id,
            serial_number,
            interface,
        })
    }
}

/// Decimal or `0x`-prefixed hexadecimal, digits only (no sign)
fn parse_number<T: TryFrom<u32>>(s: &str) -> Option<T> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    if !is_digits(digits, radix) {
        return None;
    }

    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(|n| T::try_from(n).ok())
}

fn is_digits(s: &str, radix: u32) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_digit(radix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let name = ResourceName::new(0x1AB1, 0x04CE, "DS1ZA000000001");
        assert_eq!(name.to_string(), "USB0::0x1AB1::0x04CE::DS1ZA000000001::RAW");
    }

    #[test]
    fn test_display_with_interface() {
        let mut name = ResourceName::new(0x0957, 0x1755, "MY123");
        name.board = 1;
        name.interface = Some(2);
        assert_eq!(name.to_string(), "USB1::0x0957::0x1755::MY123::2::RAW");
    }

    #[test]
    fn test_parse_decimal_ids() {
        let name: ResourceName = "usb::4660::22136::SN::raw".parse().unwrap();
        assert_eq!(name.board, 0);
        assert_eq!(name.vendor_id, 0x1234);
        assert_eq!(name.product_id, 0x5678);
    }

    #[test]
    fn test_parse_rejects_other_classes() {
        assert!("USB0::0x1234::0x5678::SN::INSTR".parse::<ResourceName>().is_err());
        assert!("TCPIP0::0x1234::0x5678::SN::RAW".parse::<ResourceName>().is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!("USB0::0x12345::0x5678::SN::RAW".parse::<ResourceName>().is_err());
        assert!("USB0::0x1234::0x5678::SN::0x100::RAW".parse::<ResourceName>().is_err());
    }

    #[test]
    fn test_filter() {
        let filter = ResourceName::new(0x1234, 0x5678, "SN").filter();
        assert!(filter.matches(0x1234, 0x5678, Some("SN")));
        assert!(!filter.matches(0x1234, 0x5678, Some("OTHER")));
    }

    #[test]
    fn test_parse_rejects_signs() {
        for text in [
            "USB+0::0x1234::0x5678::SN::RAW",
            "USB0::+4660::0x5678::SN::RAW",
            "USB0::0x+1234::0x5678::SN::RAW",
            "USB0::0x1234::-1::SN::RAW",
            "USB0::0x1234::0x5678::SN::+1::RAW",
        ] {
            assert!(text.parse::<ResourceName>().is_err(), "{} should be rejected", text);
        }
    }

    #[test]
    fn test_parse_rejects_empty_numbers() {
        assert!("USB0::0x::0x5678::SN::RAW".parse::<ResourceName>().is_err());
        assert!("USB0::::0x5678::SN::RAW".parse::<ResourceName>().is_err());
    }

    #[test]
    fn test_parsed_name_displays_canonically() {
        let name: ResourceName = "usb7::4660::0x5678::SN::3::raw".parse().unwrap();
        let reparsed: ResourceName = name.to_string().parse().unwrap();
        assert_eq!(name.to_string(), "USB7::0x1234::0x5678::SN::3::RAW");
        assert_eq!(reparsed, name);
    }
}
