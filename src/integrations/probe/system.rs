//! Operating system probe
//!
//! Linux only for now:
//! - lock state comes from logind (`loginctl show-session <id> -p LockedHint --value`)
//! - meeting state is inferred from running processes (`/proc/<pid>/comm`)
//!
//! Other platforms report an error for both queries.

use super::StatusProbe;
use anyhow::Result;
use async_trait::async_trait;

/// Probe backed by the host operating system
#[derive(Debug, Clone)]
pub struct SystemProbe {
    session_id: Option<String>,
    meeting_processes: Vec<String>,
}

impl SystemProbe {
    pub fn new(session_id: Option<String>, meeting_processes: Vec<String>) -> Self {
        let meeting_processes = meeting_processes
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            session_id,
            meeting_processes,
        }
    }

    /// Session to query (respects $XDG_SESSION_ID when not configured)
    fn session_id(&self) -> Option<String> {
        self.session_id
            .clone()
            .or_else(|| std::env::var("XDG_SESSION_ID").ok())
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl StatusProbe for SystemProbe {
    async fn is_locked(&self) -> Result<bool> {
        use anyhow::Context;

        let session = self
            .session_id()
            .context("No login session id (set probe.session_id or $XDG_SESSION_ID)")?;

        let output = tokio::process::Command::new("loginctl")
            .args(["show-session", &session, "-p", "LockedHint", "--value"])
            .output()
            .await
            .context("Failed to run loginctl")?;

        if !output.status.success() {
            anyhow::bail!(
                "loginctl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_locked_hint(&String::from_utf8_lossy(&output.stdout))
    }

    async fn is_in_meeting(&self) -> Result<bool> {
        let names = self.meeting_processes.clone();
        tokio::task::spawn_blocking(move || scan_processes(&names)).await?
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl StatusProbe for SystemProbe {
    async fn is_locked(&self) -> Result<bool> {
        anyhow::bail!("Screen lock probe is not supported on this platform")
    }

    async fn is_in_meeting(&self) -> Result<bool> {
        anyhow::bail!("Meeting probe is not supported on this platform")
    }
}

/// Interpret logind's `LockedHint` value
pub fn parse_locked_hint(output: &str) -> Result<bool> {
    // Accept both `--value` output and the `LockedHint=yes` form
    let value = output.trim();
    let value = value.strip_prefix("LockedHint=").unwrap_or(value);

    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => anyhow::bail!("Unexpected LockedHint value: {other:?}"),
    }
}

/// Whether a process name matches one of the meeting applications
pub fn is_meeting_process(comm: &str, names: &[String]) -> bool {
    let comm = comm.trim().to_lowercase();
    !comm.is_empty() && names.iter().any(|name| comm.starts_with(name.as_str()))
}

#[cfg(target_os = "linux")]
fn scan_processes(names: &[String]) -> Result<bool> {
    use anyhow::Context;

    if names.is_empty() {
        return Ok(false);
    }

    let entries = std::fs::read_dir("/proc").context("Failed to read /proc")?;

    for entry in entries.flatten() {
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }

        // Processes may exit between listing and reading
        let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };

        if is_meeting_process(&comm, names) {
            tracing::debug!("Meeting process detected: {}", comm.trim());
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_locked_hint_values() {
        assert!(parse_locked_hint("yes\n").unwrap());
        assert!(!parse_locked_hint("no").unwrap());
        assert!(parse_locked_hint("LockedHint=yes").unwrap());
    }

    #[test]
    fn test_parse_locked_hint_garbage() {
        assert!(parse_locked_hint("").is_err());
        assert!(parse_locked_hint("maybe").is_err());
    }

    #[test]
    fn test_meeting_process_match_is_case_insensitive() {
        let list = names(&["zoom", "teams"]);
        assert!(is_meeting_process("ZoomWebviewHost\n", &list));
        assert!(is_meeting_process("teams-for-linux", &list));
        assert!(!is_meeting_process("firefox", &list));
        assert!(!is_meeting_process("", &list));
    }

    #[test]
    fn test_meeting_process_match_is_anchored_at_start() {
        let list = names(&["zoom", "teams"]);
        assert!(!is_meeting_process("kzoomd", &list));
        assert!(!is_meeting_process("msteamsupd", &list));
        assert!(is_meeting_process("zoom", &list));
    }

    #[test]
    fn test_new_normalizes_names() {
        let probe = SystemProbe::new(None, names(&[" Zoom ", ""]));
        assert_eq!(probe.meeting_processes, vec!["zoom"]);
    }

    #[test]
    fn test_configured_session_wins() {
        let probe = SystemProbe::new(Some("c7".to_string()), vec![]);
        assert_eq!(probe.session_id(), Some("c7".to_string()));
    }
}
