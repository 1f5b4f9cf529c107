//! # OS termination signals.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Elsewhere:** Ctrl-C.

/// Completes with the signal's name once the process is asked to terminate.
///
/// Errors if the signal handlers cannot be installed.
#[cfg(unix)]
pub(crate) async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Completes with the signal's name once the process is asked to terminate.
///
/// Errors if the signal handler cannot be installed.
#[cfg(not(unix))]
pub(crate) async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl_c")
}
