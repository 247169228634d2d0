//! Child-process execution with cooperative cancellation
//!
//! Every external call in this crate is a blocking child process; these
//! helpers run one to completion while honoring the invocation's
//! cancellation token. A cancelled call returns a cancellation-kind error
//! and the child is killed on drop rather than left running.

use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Run a command to completion, aborting early when `cancel` fires.
pub async fn output(mut cmd: Command, cancel: &CancellationToken, what: &str) -> Result<Output> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = cmd.spawn()?;

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::cancelled(what)),
        result = child.wait_with_output() => Ok(result?),
    }
}

/// Same as [`output`], feeding `stdin` to the child before waiting.
pub async fn output_with_stdin(
    mut cmd: Command,
    stdin: &[u8],
    cancel: &CancellationToken,
    what: &str,
) -> Result<Output> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd.spawn()?;

    if let Some(mut pipe) = child.stdin.take() {
        pipe.write_all(stdin).await?;
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::cancelled(what)),
        result = child.wait_with_output() => Ok(result?),
    }
}
