//! Utility functions for the sep CLI

use anyhow::{bail, Result};
use scaled_ep_common::frame::InnerProto;
use std::net::Ipv4Addr;

/// Parse an inner protocol name or number
pub fn parse_inner_proto(value: &str) -> Result<InnerProto> {
    let proto = match value.to_ascii_lowercase().as_str() {
        "udp" => InnerProto::Udp,
        "tcp" => InnerProto::Tcp,
        "icmp" => InnerProto::Icmp,
        other => match other.parse::<u8>() {
            Ok(17) => InnerProto::Udp,
            Ok(6) => InnerProto::Tcp,
            Ok(1) => InnerProto::Icmp,
            Ok(number) => InnerProto::Raw(number),
            Err(_) => bail!("Unknown protocol '{}'", value),
        },
    };
    Ok(proto)
}

/// Format a MAC address as colon-separated hex
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn format_backends<I: IntoIterator<Item = Ipv4Addr>>(backends: I) -> String {
    let list: Vec<String> = backends.into_iter().map(|ip| ip.to_string()).collect();
    if list.is_empty() {
        "(no backends)".to_string()
    } else {
        list.join(", ")
    }
}

/// Print a section header in the CLI output
pub fn print_header(title: &str) {
    let separator = "=".repeat(title.len());
    println!("\n{}", title);
    println!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inner_proto() {
        assert_eq!(parse_inner_proto("udp").unwrap(), InnerProto::Udp);
        assert_eq!(parse_inner_proto("TCP").unwrap(), InnerProto::Tcp);
        assert_eq!(parse_inner_proto("1").unwrap(), InnerProto::Icmp);
        assert_eq!(parse_inner_proto("47").unwrap(), InnerProto::Raw(47));
        assert!(parse_inner_proto("sctp-ish").is_err());
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac(&[0x02, 0, 0, 0, 0xab, 0x63]),
            "02:00:00:00:ab:63"
        );
    }

    #[test]
    fn test_format_backends() {
        assert_eq!(format_backends(Vec::new()), "(no backends)");
        assert_eq!(
            format_backends(vec![Ipv4Addr::new(10, 1, 0, 1), Ipv4Addr::new(10, 1, 0, 2)]),
            "10.1.0.1, 10.1.0.2"
        );
    }
}
