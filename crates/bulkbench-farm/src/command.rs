use tokio::process::Command;

/// Run a command to completion and return its stdout.
///
/// A non-zero exit status is an error carrying the command's stderr.
pub(crate) async fn run(cmd: &mut Command, what: &str) -> anyhow::Result<String> {
    tracing::debug!("running {what}: {cmd:?}");
    let output = cmd
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("cannot run {what}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{what} exited with {}: {}", output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
