//! Parsing `usbipd list` output.
//!
//! The listing is free text meant for humans, so parsing is best-effort:
//! rows are only read inside the `Connected:` section and anything that
//! doesn't look like a device row is skipped.
//!
//! ```text
//! Connected:
//! BUSID  VID:PID    DEVICE                         STATE
//! 2-2    046D:c534  USB Input Device                Shared
//!
//! Persisted:
//! GUID                                  DEVICE
//! ```

use std::sync::OnceLock;

use regex::Regex;
use tracing::{trace, warn};
use usbshare_core::{Device, ATTACHED_CLIENT_SENTINEL};

const CONNECTED_MARKER: &str = "connected:";
const HEADER_MARKER: &str = "busid";

/// busid, 4-hex:4-hex, greedy name, then a state after two or more spaces.
const ROW_PATTERN: &str =
    r"^\s*(?P<busid>\S+)\s+(?P<vidpid>[0-9A-Fa-f]{4}:[0-9A-Fa-f]{4})\s+(?P<name>.+?)\s{2,}(?P<state>.+)$";

static ROW_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn row_regex() -> Option<&'static Regex> {
    ROW_REGEX
        .get_or_init(|| match Regex::new(ROW_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, "Device row pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Parses the tool's device listing into devices, in encounter order.
///
/// Duplicate bus ids are kept. Input without a `Connected:` header
/// yields no devices.
pub fn parse_device_list(output: &str) -> Vec<Device> {
    let Some(re) = row_regex() else {
        return Vec::new();
    };

    let mut devices = Vec::new();
    let mut in_connected = false;

    for line in output.lines() {
        let trimmed = line.trim();

        if starts_with_ignore_case(trimmed, CONNECTED_MARKER) {
            in_connected = true;
            continue;
        }

        if !in_connected || trimmed.is_empty() || starts_with_ignore_case(trimmed, HEADER_MARKER)
        {
            continue;
        }

        let Some(caps) = re.captures(line) else {
            trace!(line, "Skipping non-device line");
            continue;
        };

        let (Some(busid), Some(vidpid), Some(name), Some(state)) = (
            caps.name("busid"),
            caps.name("vidpid"),
            caps.name("name"),
            caps.name("state"),
        ) else {
            continue;
        };

        let status = state.as_str().trim().to_string();
        let attached_client = contains_ignore_case(&status, "attached")
            .then(|| ATTACHED_CLIENT_SENTINEL.to_string());

        devices.push(Device {
            device_id: busid.as_str().to_string(),
            friendly_name: name.as_str().trim().to_string(),
            vendor_product_id: vidpid.as_str().to_ascii_uppercase(),
            serial: None,
            status,
            attached_client,
        });
    }

    devices
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Connected:
BUSID  VID:PID    DEVICE                         STATE
2-2    046D:c534  USB Input Device                Shared
4-4    04B4:00F1  Cypress USB                      Attached
";

    #[test]
    fn test_row_pattern_compiles() {
        assert!(row_regex().is_some());
    }

    #[test]
    fn test_parses_connected_rows() {
        let devices = parse_device_list(SAMPLE);

        assert_eq!(devices.len(), 2);

        let first = &devices[0];
        assert_eq!(first.device_id, "2-2");
        assert_eq!(first.vendor_product_id, "046D:C534");
        assert_eq!(first.friendly_name, "USB Input Device");
        assert_eq!(first.status, "Shared");
        assert!(first.attached_client.is_none());

        let second = &devices[1];
        assert_eq!(second.device_id, "4-4");
        assert_eq!(
            second.attached_client.as_deref(),
            Some(ATTACHED_CLIENT_SENTINEL)
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_device_list("").is_empty());
    }

    #[test]
    fn test_no_connected_header() {
        let text = "BUSID  VID:PID    DEVICE              STATE\n\
                    2-2    046D:C534  USB Input Device    Shared\n";
        assert!(parse_device_list(text).is_empty());
    }

    #[test]
    fn test_persisted_section_is_not_parsed() {
        let text = format!(
            "{SAMPLE}\nPersisted:\nGUID                                  DEVICE\n\
             0f3d4a1c-2b7e-4d55-9c1a-3e2f1b0a9d88  USB Mass Storage Device\n"
        );
        assert_eq!(parse_device_list(&text).len(), 2);
    }

    #[test]
    fn test_header_and_markers_are_case_insensitive() {
        let text = "  CONNECTED:  \n\
                    busid  vid:pid    device              state\n\
                    1-3    1a2b:3c4d  Keyboard            Not shared\n";
        let devices = parse_device_list(text);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor_product_id, "1A2B:3C4D");
        assert_eq!(devices[0].status, "Not shared");
    }

    #[test]
    fn test_attached_state_any_case() {
        let text = "Connected:\n\
                    1-1    1234:ABCD  Webcam              Attached - 172.20.1.5\n\
                    1-2    1234:ABCE  Mic                 ATTACHED\n\
                    1-3    1234:ABCF  Dongle              Shared (forced)\n";
        let devices = parse_device_list(text);

        assert_eq!(devices.len(), 3);
        assert!(devices[0].is_attached());
        assert!(devices[1].is_attached());
        assert!(!devices[2].is_attached());
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let text = "Connected:\n\
                    \n\
                    usbipd: warning: banner text\n\
                    2-2    046D:C534  USB Input Device    Shared\n\
                    garbage\n";
        let devices = parse_device_list(text);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "2-2");
    }

    #[test]
    fn test_duplicate_bus_ids_are_kept_in_order() {
        let text = "Connected:\n\
                    2-2    046D:C534  First               Shared\n\
                    2-2    046D:C535  Second              Not shared\n";
        let devices = parse_device_list(text);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].friendly_name, "First");
        assert_eq!(devices[1].friendly_name, "Second");
    }

    #[test]
    fn test_windows_line_endings() {
        let text = "Connected:\r\n2-2    046D:C534  USB Input Device    Shared\r\n";
        let devices = parse_device_list(text);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].status, "Shared");
    }
}
