//! Process liveness checks.

use async_trait::async_trait;

/// Answers whether a PID still refers to a live process.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn is_alive(&self, pid: u32) -> bool;
}

/// [`ProcessProbe`] backed by the operating system.
///
/// On Unix this sends signal 0, which checks existence without touching the
/// process. `EPERM` still means the process exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

#[async_trait]
impl ProcessProbe for SystemProbe {
    async fn is_alive(&self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            let Ok(raw) = i32::try_from(pid) else {
                return false;
            };
            match kill(Pid::from_raw(raw), None) {
                Ok(()) | Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }

        #[cfg(not(unix))]
        {
            let filter = format!("PID eq {pid}");
            match tokio::process::Command::new("tasklist")
                .args(["/FI", &filter, "/NH"])
                .output()
                .await
            {
                Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
                Err(e) => {
                    tracing::warn!(pid, error = %e, "Liveness check failed, assuming alive");
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_process_is_alive() {
        let probe = SystemProbe;
        assert!(probe.is_alive(std::process::id()).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let probe = SystemProbe;
        assert!(!probe.is_alive(pid).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_out_of_range_pid_is_dead() {
        let probe = SystemProbe;
        assert!(!probe.is_alive(u32::MAX).await);
    }
}
