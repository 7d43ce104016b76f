use std::time::Duration;

use tracing::{debug, info};

use super::{run_tool, NetworkAssociator, NetworkId, WifiError};
use camsync_config::{WIFI_CONFIRM_POLLS, WIFI_CONFIRM_POLLS_MACOS};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const AIRPORT: &str =
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";

fn poll_until(
    polls: u32,
    mut check: impl FnMut() -> Result<bool, WifiError>,
) -> Result<bool, WifiError> {
    for _ in 0..polls {
        std::thread::sleep(POLL_INTERVAL);
        if check()? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn dedup_in_order(ssids: impl IntoIterator<Item = String>) -> Vec<NetworkId> {
    let mut out: Vec<NetworkId> = Vec::new();
    for ssid in ssids {
        let ssid = ssid.trim().to_string();
        if ssid.is_empty() || out.iter().any(|n| n.0 == ssid) {
            continue;
        }
        out.push(NetworkId(ssid));
    }
    out
}

// --- Linux: NetworkManager ---

#[derive(Debug, Default)]
pub struct NmcliAssociator;

impl NmcliAssociator {
    pub fn new() -> Self {
        Self
    }

    fn active_ssid(&self) -> Result<Option<String>, WifiError> {
        let out = run_tool("nmcli", &["-t", "-f", "ACTIVE,SSID", "dev", "wifi"])?;
        Ok(parse_nmcli_active(&out))
    }
}

/// `nmcli -t` escapes `:` inside values as `\:`.
fn nmcli_unescape(field: &str) -> String {
    field.replace("\\:", ":").replace("\\\\", "\\")
}

pub(crate) fn parse_nmcli_ssids(out: &str) -> Vec<NetworkId> {
    dedup_in_order(out.lines().map(nmcli_unescape))
}

pub(crate) fn parse_nmcli_active(out: &str) -> Option<String> {
    out.lines()
        .find_map(|l| l.strip_prefix("yes:"))
        .map(nmcli_unescape)
        .filter(|s| !s.is_empty())
}

pub(crate) fn parse_nmcli_wifi_device(out: &str) -> Option<String> {
    // DEVICE:TYPE:STATE
    out.lines().find_map(|l| {
        let mut parts = l.split(':');
        let device = parts.next()?;
        let kind = parts.next()?;
        let state = parts.next()?;
        (kind == "wifi" && state == "connected").then(|| device.to_string())
    })
}

impl NetworkAssociator for NmcliAssociator {
    fn scan(&self) -> Result<Vec<NetworkId>, WifiError> {
        info!("scanning for Wi-Fi networks with nmcli");
        let out = run_tool(
            "nmcli",
            &["-t", "-f", "SSID", "dev", "wifi", "list", "--rescan", "yes"],
        )?;
        Ok(parse_nmcli_ssids(&out))
    }

    fn connect(&self, network: &NetworkId) -> Result<bool, WifiError> {
        info!(ssid = %network, "connecting with nmcli");
        run_tool("nmcli", &["dev", "wifi", "connect", network.ssid()])?;
        poll_until(WIFI_CONFIRM_POLLS, || {
            Ok(self.active_ssid()?.as_deref() == Some(network.ssid()))
        })
    }

    fn disconnect(&self) -> Result<(), WifiError> {
        let out = run_tool("nmcli", &["-t", "-f", "DEVICE,TYPE,STATE", "device"])?;
        let Some(device) = parse_nmcli_wifi_device(&out) else {
            debug!("no connected Wi-Fi device to disconnect");
            return Ok(());
        };
        run_tool("nmcli", &["device", "disconnect", &device])?;
        info!(%device, "Wi-Fi disconnected");
        Ok(())
    }
}

// --- Windows: netsh wlan ---

#[derive(Debug, Default)]
pub struct NetshAssociator;

impl NetshAssociator {
    pub fn new() -> Self {
        Self
    }

    fn current_ssid(&self) -> Result<Option<String>, WifiError> {
        let out = run_tool("netsh", &["wlan", "show", "interfaces"])?;
        Ok(parse_netsh_current(&out))
    }
}

/// Profile for an open (no passphrase) camera hotspot.
pub(crate) fn open_network_profile(ssid: &str) -> String {
    let escaped = ssid
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    format!(
        r#"<?xml version="1.0"?>
<WLANProfile xmlns="http://www.microsoft.com/networking/WLAN/profile/v1">
  <name>{escaped}</name>
  <SSIDConfig><SSID><name>{escaped}</name></SSID></SSIDConfig>
  <connectionType>ESS</connectionType>
  <connectionMode>manual</connectionMode>
  <MSM><security><authEncryption>
    <authentication>open</authentication>
    <encryption>none</encryption>
    <useOneX>false</useOneX>
  </authEncryption></security></MSM>
</WLANProfile>
"#
    )
}

pub(crate) fn parse_netsh_networks(out: &str) -> Vec<NetworkId> {
    dedup_in_order(out.lines().filter_map(|l| {
        let l = l.trim();
        if !l.starts_with("SSID") {
            return None;
        }
        l.split_once(':').map(|(_, v)| v.to_string())
    }))
}

pub(crate) fn parse_netsh_current(out: &str) -> Option<String> {
    out.lines().find_map(|l| {
        let (key, value) = l.trim().split_once(':')?;
        (key.trim() == "SSID")
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

impl NetworkAssociator for NetshAssociator {
    fn scan(&self) -> Result<Vec<NetworkId>, WifiError> {
        info!("scanning for Wi-Fi networks with netsh");
        let out = run_tool("netsh", &["wlan", "show", "networks"])?;
        Ok(parse_netsh_networks(&out))
    }

    fn connect(&self, network: &NetworkId) -> Result<bool, WifiError> {
        let profile_path = std::env::temp_dir().join("camsync-wlan-profile.xml");
        std::fs::write(&profile_path, open_network_profile(network.ssid()))?;
        let filename = format!("filename={}", profile_path.display());
        let added = run_tool("netsh", &["wlan", "add", "profile", &filename]);
        let _ = std::fs::remove_file(&profile_path);
        added?;

        info!(ssid = %network, "connecting with netsh");
        let name = format!("name={}", network.ssid());
        let ssid = format!("ssid={}", network.ssid());
        run_tool("netsh", &["wlan", "connect", &name, &ssid])?;
        poll_until(WIFI_CONFIRM_POLLS, || {
            Ok(self.current_ssid()?.as_deref() == Some(network.ssid()))
        })
    }

    fn disconnect(&self) -> Result<(), WifiError> {
        run_tool("netsh", &["wlan", "disconnect"])?;
        info!("Wi-Fi disconnected");
        Ok(())
    }
}

// --- macOS: airport + networksetup ---

#[derive(Debug, Default)]
pub struct AirportAssociator;

impl AirportAssociator {
    pub fn new() -> Self {
        Self
    }

    fn wifi_device(&self) -> Result<String, WifiError> {
        let out = run_tool("networksetup", &["-listallhardwareports"])?;
        parse_hardware_ports(&out).ok_or(WifiError::NoInterface)
    }

    fn current_ssid(&self) -> Result<Option<String>, WifiError> {
        let out = run_tool(AIRPORT, &["-I"])?;
        Ok(parse_airport_current(&out))
    }
}

/// `airport -s` columns are space aligned and SSIDs may contain single spaces,
/// so the SSID is everything up to the first double space.
pub(crate) fn parse_airport_scan(out: &str) -> Vec<NetworkId> {
    dedup_in_order(out.lines().skip(1).filter_map(|l| {
        let l = l.trim_start();
        let ssid = l.split("  ").next()?;
        Some(ssid.to_string())
    }))
}

pub(crate) fn parse_airport_current(out: &str) -> Option<String> {
    out.lines().find_map(|l| {
        l.trim()
            .strip_prefix("SSID: ")
            .map(|s| s.trim().to_string())
    })
}

pub(crate) fn parse_hardware_ports(out: &str) -> Option<String> {
    out.split("\n\n").find_map(|block| {
        if !block.contains("Wi-Fi") {
            return None;
        }
        block.lines().find_map(|l| {
            l.strip_prefix("Device:")
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
        })
    })
}

impl NetworkAssociator for AirportAssociator {
    fn scan(&self) -> Result<Vec<NetworkId>, WifiError> {
        info!("scanning for Wi-Fi networks with airport");
        let out = run_tool(AIRPORT, &["-s"])?;
        Ok(parse_airport_scan(&out))
    }

    fn connect(&self, network: &NetworkId) -> Result<bool, WifiError> {
        let device = self.wifi_device()?;
        info!(ssid = %network, %device, "connecting with networksetup");
        run_tool(
            "networksetup",
            &["-setairportnetwork", &device, network.ssid()],
        )?;
        poll_until(WIFI_CONFIRM_POLLS_MACOS, || {
            Ok(self.current_ssid()?.as_deref() == Some(network.ssid()))
        })
    }

    /// Dissociates from the current network; radio power is left alone.
    fn disconnect(&self) -> Result<(), WifiError> {
        run_tool(AIRPORT, &["-z"])?;
        info!("Wi-Fi disassociated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssids(v: &[NetworkId]) -> Vec<&str> {
        v.iter().map(NetworkId::ssid).collect()
    }

    #[test]
    fn nmcli_list_dedups_and_unescapes() {
        let out = "Insta360 X3\\:AB\n\nHomeNet\nHomeNet\n";
        assert_eq!(
            ssids(&parse_nmcli_ssids(out)),
            vec!["Insta360 X3:AB", "HomeNet"]
        );
    }

    #[test]
    fn nmcli_active_and_device() {
        assert_eq!(
            parse_nmcli_active("no:HomeNet\nyes:X4 1A2B.OSC\n").as_deref(),
            Some("X4 1A2B.OSC")
        );
        assert_eq!(parse_nmcli_active("no:HomeNet\n"), None);
        assert_eq!(
            parse_nmcli_wifi_device("lo:loopback:unmanaged\nwlp2s0:wifi:connected\n").as_deref(),
            Some("wlp2s0")
        );
    }

    #[test]
    fn netsh_networks_and_current() {
        let networks = "\nInterface name : Wi-Fi\nThere are 2 networks currently visible.\n\nSSID 1 : Insta360 X3\n    Network type            : Infrastructure\nSSID 2 : HomeNet\n";
        assert_eq!(
            ssids(&parse_netsh_networks(networks)),
            vec!["Insta360 X3", "HomeNet"]
        );

        let iface = "    Name                   : Wi-Fi\n    SSID                   : Insta360 X3\n    BSSID                  : aa:bb:cc:dd:ee:ff\n";
        assert_eq!(parse_netsh_current(iface).as_deref(), Some("Insta360 X3"));
    }

    #[test]
    fn open_profile_escapes_ssid() {
        let xml = open_network_profile("Cam <1> & \"2\"");
        assert!(xml.contains("<name>Cam &lt;1&gt; &amp; &quot;2&quot;</name>"));
        assert!(xml.contains("<authentication>open</authentication>"));
    }

    #[test]
    fn airport_scan_keeps_single_spaces_in_ssid() {
        let out = "                            SSID BSSID             RSSI CHANNEL HT CC SECURITY\n              Insta360 X3_001  aa:bb:cc:dd:ee:ff -80  6       Y  -- NONE\n                     HomeNet  11:22:33:44:55:66 -50  11      Y  -- WPA2(PSK/AES/AES)\n";
        assert_eq!(
            ssids(&parse_airport_scan(out)),
            vec!["Insta360 X3_001", "HomeNet"]
        );
    }

    #[test]
    fn airport_current_and_hardware_ports() {
        let info = "     agrCtlRSSI: -55\n         BSSID: aa:bb\n          SSID: Insta360 X3_001\n";
        assert_eq!(
            parse_airport_current(info).as_deref(),
            Some("Insta360 X3_001")
        );

        let ports = "Hardware Port: Ethernet\nDevice: en0\nEthernet Address: x\n\nHardware Port: Wi-Fi\nDevice: en1\nEthernet Address: y\n";
        assert_eq!(parse_hardware_ports(ports).as_deref(), Some("en1"));
    }
}
