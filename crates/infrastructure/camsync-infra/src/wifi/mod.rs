//! Joining the camera's access point.
//!
//! Each host OS gets its own [`NetworkAssociator`]; [`platform_associator`]
//! picks one at startup so callers never branch on the platform.

use std::fmt;
use std::process::Command;

use thiserror::Error;
use tracing::{info, warn};

pub mod platform;

pub use platform::{AirportAssociator, NetshAssociator, NmcliAssociator};

#[derive(Debug, Error)]
pub enum WifiError {
    #[error("`{program}` not found; is it installed and on PATH?")]
    CommandMissing { program: String },
    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("no wireless interface found")]
    NoInterface,
    #[error("Wi-Fi control is not supported on this platform")]
    Unsupported,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn ssid(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(s: &str) -> Self {
        NetworkId(s.to_string())
    }
}

pub trait NetworkAssociator: Send + Sync {
    fn scan(&self) -> Result<Vec<NetworkId>, WifiError>;

    /// `Ok(false)` when the join was issued but never confirmed.
    fn connect(&self, network: &NetworkId) -> Result<bool, WifiError>;

    fn disconnect(&self) -> Result<(), WifiError>;
}

/// The associator for the OS this binary was built for.
pub fn platform_associator() -> Result<Box<dyn NetworkAssociator>, WifiError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(NmcliAssociator::new()))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(NetshAssociator::new()))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(AirportAssociator::new()))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        Err(WifiError::Unsupported)
    }
}

/// First scanned network whose SSID starts with any of `prefixes`.
pub fn matching_network<'a>(
    networks: &'a [NetworkId],
    prefixes: &[String],
) -> Option<&'a NetworkId> {
    networks.iter().find(|n| {
        prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| n.ssid().starts_with(p.as_str()))
    })
}

/// Scan, pick the first camera network, and join it.
///
/// Returns the joined network, or `None` when nothing matched or the join
/// could not be confirmed.
pub fn find_and_connect(
    associator: &dyn NetworkAssociator,
    prefixes: &[String],
) -> Result<Option<NetworkId>, WifiError> {
    let networks = associator.scan()?;
    let Some(target) = matching_network(&networks, prefixes).cloned() else {
        warn!(?prefixes, scanned = networks.len(), "no camera Wi-Fi network found");
        return Ok(None);
    };

    info!(ssid = %target, "found camera network");
    if associator.connect(&target)? {
        info!(ssid = %target, "joined camera network");
        Ok(Some(target))
    } else {
        warn!(ssid = %target, "could not confirm association");
        Ok(None)
    }
}

/// Runs a helper program and returns its stdout.
pub(crate) fn run_tool(program: &str, args: &[&str]) -> Result<String, WifiError> {
    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WifiError::CommandMissing {
                program: program.to_string(),
            }
        } else {
            WifiError::Io(e)
        }
    })?;

    if !output.status.success() {
        return Err(WifiError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeAssociator {
        networks: Vec<NetworkId>,
        accept: bool,
        joined: Mutex<Vec<NetworkId>>,
    }

    impl NetworkAssociator for FakeAssociator {
        fn scan(&self) -> Result<Vec<NetworkId>, WifiError> {
            Ok(self.networks.clone())
        }

        fn connect(&self, network: &NetworkId) -> Result<bool, WifiError> {
            self.joined.lock().unwrap().push(network.clone());
            Ok(self.accept)
        }

        fn disconnect(&self) -> Result<(), WifiError> {
            Ok(())
        }
    }

    fn prefixes(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_prefix_match_in_scan_order_wins() {
        let nets: Vec<NetworkId> = ["HomeNet", "X4 1A2B.OSC", "Insta360 ONE"]
            .into_iter()
            .map(NetworkId::from)
            .collect();
        let found = matching_network(&nets, &prefixes(&["Insta360", "X4"]));
        assert_eq!(found.map(NetworkId::ssid), Some("X4 1A2B.OSC"));
    }

    #[test]
    fn empty_prefix_matches_nothing() {
        let nets = vec![NetworkId::from("HomeNet")];
        assert!(matching_network(&nets, &prefixes(&[""])).is_none());
    }

    #[test]
    fn find_and_connect_joins_the_match() {
        let fake = FakeAssociator {
            networks: vec!["Cafe".into(), "Insta360 X3".into()],
            accept: true,
            joined: Mutex::new(Vec::new()),
        };
        let joined = find_and_connect(&fake, &prefixes(&["Insta360"])).unwrap();
        assert_eq!(joined, Some(NetworkId::from("Insta360 X3")));
        assert_eq!(fake.joined.lock().unwrap().len(), 1);
    }

    #[test]
    fn unconfirmed_join_is_none() {
        let fake = FakeAssociator {
            networks: vec!["Insta360 X3".into()],
            accept: false,
            joined: Mutex::new(Vec::new()),
        };
        assert_eq!(find_and_connect(&fake, &prefixes(&["Insta360"])).unwrap(), None);
    }

    #[test]
    fn no_match_never_connects() {
        let fake = FakeAssociator {
            networks: vec!["Cafe".into()],
            accept: true,
            joined: Mutex::new(Vec::new()),
        };
        assert_eq!(find_and_connect(&fake, &prefixes(&["Insta360"])).unwrap(), None);
        assert!(fake.joined.lock().unwrap().is_empty());
    }
}
