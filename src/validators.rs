//! Input validation and sanitization
//!
//! Centralized validation for user inputs arriving via the CLI, keeping
//! rule labels safe for rendering and log files.

/// Sanitizes a label for safe use in chain comments and log lines.
///
/// Removes control characters, quotes, and shell metacharacters.
/// Limits length to 64 bytes (ASCII characters only).
///
/// Uses `is_ascii_alphanumeric()` to prevent Unicode-based bypasses
/// and keep labels within system limits.
///
/// # Examples
///
/// ```
/// use cordon::validators::sanitize_label;
///
/// let safe = sanitize_label("Normal Label");
/// assert_eq!(safe, "Normal Label");
///
/// let unsafe_label = "Test\nNewline\"Quote";
/// let safe = sanitize_label(unsafe_label);
/// assert!(!safe.contains('\n'));
/// assert!(!safe.contains('"'));
/// ```
pub fn sanitize_label(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | ':' | '/')
        })
        .take(64)
        .collect()
}

/// Validates and sanitizes a rule label.
///
/// # Errors
///
/// Returns `Err` if:
/// - Label exceeds 64 characters
/// - Label becomes empty after sanitization (all invalid chars)
pub fn validate_label(input: &str) -> Result<String, String> {
    if input.len() > 64 {
        return Err("Label too long (max 64 characters)".to_string());
    }

    let sanitized = sanitize_label(input);

    if sanitized.is_empty() && !input.is_empty() {
        return Err("Label contains only invalid characters".to_string());
    }

    Ok(sanitized)
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Checks if a port is well-known and returns an informational message.
///
/// This is informational only and does not block saving.
pub fn check_well_known_port(port: u16) -> Option<String> {
    if port <= 1024 {
        let name = match port {
            22 => "SSH",
            80 => "HTTP",
            443 => "HTTPS",
            53 => "DNS",
            25 => "SMTP",
            21 => "FTP",
            _ => return Some(format!("Privileged port {} (requires admin)", port)),
        };
        Some(format!("Port {}: {}", port, name))
    } else {
        None
    }
}

/// Checks if an IP is in a reserved range and returns an informational note.
///
/// This is informational only and does not block saving.
/// Helps users understand if they're targeting private/special ranges.
pub fn check_reserved_ip(ip: ipnetwork::IpNetwork) -> Option<String> {
    use std::net::IpAddr;

    match ip.ip() {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();

            // RFC 1918 private ranges
            if octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
            {
                return Some("Private IP range (RFC 1918) - usually safe for LAN".to_string());
            }

            // Loopback
            if octets[0] == 127 {
                return Some("Loopback range (127.x)".to_string());
            }

            // Link-local
            if octets[0] == 169 && octets[1] == 254 {
                return Some("Link-local range (169.254.x.x) - APIPA addresses".to_string());
            }

            None
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() {
                return Some("IPv6 loopback (::1)".to_string());
            }

            if ipv6.segments()[0] & 0xffc0 == 0xfe80 {
                return Some("IPv6 link-local (fe80::/10) - local network only".to_string());
            }

            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label_normal() {
        assert_eq!(sanitize_label("Normal Label"), "Normal Label");
        assert_eq!(sanitize_label("block tcp/8089"), "block tcp/8089");
        assert_eq!(sanitize_label("Rule_123"), "Rule_123");
    }

    #[test]
    fn test_sanitize_label_removes_control_chars() {
        assert_eq!(sanitize_label("Test\nNewline"), "TestNewline");
        assert_eq!(sanitize_label("Test\rCarriage"), "TestCarriage");
        assert_eq!(sanitize_label("Test\0Null"), "TestNull");
        assert_eq!(sanitize_label("Test\tTab"), "TestTab");
    }

    #[test]
    fn test_sanitize_label_removes_quotes_and_metacharacters() {
        assert_eq!(sanitize_label("Test\"Quote"), "TestQuote");
        assert_eq!(sanitize_label("Test'Single"), "TestSingle");
        assert_eq!(sanitize_label("Test$Dollar"), "TestDollar");
        assert_eq!(sanitize_label("Test`Backtick"), "TestBacktick");
        assert_eq!(sanitize_label("Test|Pipe"), "TestPipe");
        assert_eq!(sanitize_label("Test;Semicolon"), "TestSemicolon");
    }

    #[test]
    fn test_sanitize_label_length_limit() {
        let long_label = "a".repeat(100);
        let sanitized = sanitize_label(&long_label);
        assert_eq!(sanitized.len(), 64);
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label(&"a".repeat(65)).is_err());
        assert!(validate_label("!!!").is_err());
        assert_eq!(validate_label("block api").unwrap(), "block api");
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(0).is_err());
        assert_eq!(validate_port(1).unwrap(), 1);
        assert_eq!(validate_port(8089).unwrap(), 8089);
        assert_eq!(validate_port(65535).unwrap(), 65535);
    }

    #[test]
    fn test_validate_port_range() {
        assert_eq!(validate_port_range(80, 80).unwrap(), (80, 80));
        assert_eq!(validate_port_range(8000, 9000).unwrap(), (8000, 9000));
        assert!(validate_port_range(0, 100).is_err());
        assert!(validate_port_range(100, 50).is_err());
    }

    #[test]
    fn test_check_well_known_port() {
        assert!(check_well_known_port(22).unwrap().contains("SSH"));
        assert!(check_well_known_port(443).unwrap().contains("HTTPS"));
        assert!(check_well_known_port(999).unwrap().contains("Privileged"));
        assert!(check_well_known_port(8089).is_none());
    }

    #[test]
    fn test_check_reserved_ip() {
        let private: ipnetwork::IpNetwork = "192.168.1.0/24".parse().unwrap();
        assert!(check_reserved_ip(private).unwrap().contains("RFC 1918"));

        let loopback: ipnetwork::IpNetwork = "127.0.0.1/8".parse().unwrap();
        assert!(check_reserved_ip(loopback).unwrap().contains("Loopback"));

        let link_local: ipnetwork::IpNetwork = "fe80::1/64".parse().unwrap();
        assert!(check_reserved_ip(link_local).unwrap().contains("link-local"));

        let public: ipnetwork::IpNetwork = "8.8.8.8/32".parse().unwrap();
        assert!(check_reserved_ip(public).is_none());
    }
}
