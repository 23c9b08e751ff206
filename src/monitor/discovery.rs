//! Player process discovery.

use std::path::Path;

use crate::config::ClientConfig;
use crate::shell::{RunOptions, Shell, ShellError};

/// Parse `pgrep` output into PIDs, skipping anything that is not a number.
#[must_use]
pub fn parse_pids(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Whether a `ps -o command=` line belongs to the player executable.
#[must_use]
pub fn is_player_command(command_line: &str, player_process: &str) -> bool {
    let command_line = command_line.trim();
    if command_line.len() < 2 {
        return false;
    }
    Path::new(command_line)
        .file_name()
        .is_some_and(|name| name == player_process)
}

/// Find the PID of the running player process.
///
/// Candidates come from `pgrep -f`; each one's command line is resolved with
/// `ps`. When several match, the last one listed wins.
///
/// # Errors
///
/// Returns an error if `pgrep` or `ps` cannot be run.
pub async fn find_player_pid(
    shell: &dyn Shell,
    client: &ClientConfig,
) -> Result<Option<u32>, ShellError> {
    let listing = shell
        .run(
            "pgrep",
            &["-f", &client.process_pattern],
            RunOptions::default().skip_stderr(),
        )
        .await?;

    let mut found = None;
    for pid in parse_pids(&listing.stdout) {
        let pid_arg = pid.to_string();
        let info = shell
            .run(
                "ps",
                &["-p", &pid_arg, "-o", "command="],
                RunOptions::default().skip_stderr(),
            )
            .await?;
        if is_player_command(&info.stdout, &client.player_process) {
            tracing::debug!(pid, "Player process candidate");
            found = Some(pid);
        }
    }

    Ok(found)
}
