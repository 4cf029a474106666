//! Discovery and resource name tests
//!
//! Covers device filters, VISA resource names and the serialised form of
//! `RawDeviceInfo`. Enumeration against real hardware is `#[ignore]`d.
//!
//! Run with: `cargo test -p usbraw --test discovery_tests`

use usbraw::discovery::{RAW_INTERFACE_CLASS, RAW_INTERFACE_SUBCLASS, is_raw_interface};
use usbraw::test_utils::create_mock_device_info;
use usbraw::{DeviceFilter, RawDeviceInfo, ResourceName};

mod filters {
    use super::*;

    #[test]
    fn test_vendor_only_filter() {
        let filter = DeviceFilter::new().vendor_id(0x0957);
        assert!(filter.matches(0x0957, 0x1755, None));
        assert!(filter.matches(0x0957, 0x0001, Some("X")));
        assert!(!filter.matches(0x1AB1, 0x1755, None));
    }

    #[test]
    fn test_full_filter() {
        let filter = DeviceFilter::new()
            .vendor_id(0x1234)
            .product_id(0x5678)
            .serial_number("ABC123");
        assert!(filter.matches(0x1234, 0x5678, Some("ABC123")));
        assert!(!filter.matches(0x1234, 0x5678, Some("abc123")));
        assert!(!filter.matches(0x1234, 0x5679, Some("ABC123")));
    }

    #[test]
    fn test_pattern_round_trip() {
        for pattern in ["0x1234:0x5678", "0x04f9:*", "*:0x0001", "*:*"] {
            let filter: DeviceFilter = pattern.parse().unwrap();
            assert_eq!(filter.to_string(), pattern);
        }
    }

    #[test]
    fn test_pattern_accepts_uppercase_prefix_and_spaces() {
        let filter: DeviceFilter = " 0X1AB1 : 04ce ".parse().unwrap();
        assert_eq!(filter.vendor_id, Some(0x1AB1));
        assert_eq!(filter.product_id, Some(0x04CE));
    }

    #[test]
    fn test_raw_interface_codes() {
        assert_eq!(RAW_INTERFACE_CLASS, 0xFF);
        assert_eq!(RAW_INTERFACE_SUBCLASS, 0x00);
        assert!(is_raw_interface(RAW_INTERFACE_CLASS, RAW_INTERFACE_SUBCLASS));
    }
}

mod resources {
    use super::*;

    #[test]
    fn test_round_trip() {
        let names = [
            "USB0::0x1AB1::0x04CE::DS1ZA164457681::RAW",
            "USB3::0x0957::0x1755::MY54321::1::RAW",
        ];
        for text in names {
            let name: ResourceName = text.parse().unwrap();
            assert_eq!(name.to_string(), text);
        }
    }

    #[test]
    fn test_parse_fields() {
        let name: ResourceName = "USB2::0x0699::0x0368::C012345::0x01::RAW".parse().unwrap();
        assert_eq!(name.board, 2);
        assert_eq!(name.vendor_id, 0x0699);
        assert_eq!(name.product_id, 0x0368);
        assert_eq!(name.serial_number, "C012345");
        assert_eq!(name.interface, Some(1));
    }

    #[test]
    fn test_parse_invalid() {
        let invalid = [
            "",
            "USB0::0x1234::0x5678::RAW",
            "USB0::0x1234::0x5678::::RAW",
            "USBx::0x1234::0x5678::SN::RAW",
            "USB0::0xZZZZ::0x5678::SN::RAW",
            "USB0::0x1234::0x5678::SN::1::2::RAW",
        ];
        for text in invalid {
            assert!(
                text.parse::<ResourceName>().is_err(),
                "{:?} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_device_info_resource_name() {
        let info = create_mock_device_info(0x1AB1, 0x04CE, Some("DS1Z"));
        let name = info.resource_name(0).unwrap();
        assert_eq!(name.to_string(), "USB0::0x1AB1::0x04CE::DS1Z::RAW");
        assert_eq!(name.filter().serial_number.as_deref(), Some("DS1Z"));
    }

    #[test]
    fn test_device_info_without_serial_has_no_resource_name() {
        let info = create_mock_device_info(0x1AB1, 0x04CE, None);
        assert!(info.resource_name(0).is_none());
    }
}

mod device_info {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let info = create_mock_device_info(0x1234, 0x5678, Some("SN1"));
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"vendor_id\":4660"));

        let back: RawDeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}

mod hardware {
    use super::*;
    use rusb::Context;

    #[test]
    #[ignore = "requires libusb access to the host's USB devices"]
    fn test_list_raw_devices_on_host() {
        let context = Context::new().unwrap();
        let devices = usbraw::list_raw_devices(&context, &DeviceFilter::new()).unwrap();
        for device in devices {
            assert!(device.vendor_id != 0 || device.product_id != 0);
        }
    }
}
