//! accelcheck
//!
//! Boots the capability probe the way a host application would at startup:
//! consult the crash sentinel, resolve the backend preference, then probe.

use accel_probe::window::{with_probe_window, WindowConfig};
use accel_probe::{
    platform_preference, BackendSelection, Capabilities, CapabilityProbe, CrashGuard, Directive,
    ForceDisable, ResolvedBackend, WgpuContextFactory,
};
use accel_store::{FileMarker, ProbeSettings};
use anyhow::{Context, Result};
use clap::Parser;
use std::fmt::Display;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "accelcheck",
    version,
    about = "Check whether GPU rendering is safe on this machine"
)]
struct Cli {
    /// Settings file (JSON). Defaults are used when it does not exist.
    #[arg(long, env = "ACCELCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Refuse acceleration for this run without probing.
    #[arg(long)]
    force_disable: bool,

    /// Store a backend for the next run: auto, gl, d3d9, d3d11, d3d11on12.
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend)]
    set_backend: Option<BackendSelection>,

    /// Probe against a hidden native window instead of an off-screen target.
    #[arg(long)]
    window: bool,

    /// Print the effective settings and exit.
    #[arg(long)]
    dump_config: bool,
}

fn parse_backend(name: &str) -> Result<BackendSelection, String> {
    BackendSelection::from_name(name).ok_or_else(|| format!("unknown backend '{name}'"))
}

/// Outcome of a probe run inside the hidden window. A host that cannot give
/// us a window is an environment without acceleration, not an error.
fn window_outcome<E: Display>(result: Result<bool, E>, caps: Capabilities) -> Capabilities {
    match result {
        Ok(true) => caps,
        Ok(false) => {
            tracing::warn!("OpenGL: Could not create a probe window.");
            Capabilities::default()
        }
        Err(err) => {
            tracing::warn!("OpenGL: No windowing system available: {err}");
            Capabilities::default()
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => ProbeSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => ProbeSettings::default(),
    };

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    tracing::info!("accelcheck v{}", env!("CARGO_PKG_VERSION"));

    let directive = Directive::new(settings.backend_directive.clone());
    let preference = platform_preference(
        FileMarker::new(&settings.backend_path),
        directive.clone(),
        ResolvedBackend::new(),
    );

    if let Some(backend) = cli.set_backend {
        preference.change(backend);
        tracing::info!("Backend {backend:?} stored; it applies from the next start");
        return Ok(());
    }

    // Must happen before any context exists.
    let backend = preference.configure();
    tracing::info!("Backend: {backend:?}");

    let force_disable = ForceDisable::new();
    force_disable.set(cli.force_disable);

    let mut probe = CapabilityProbe::new(
        WgpuContextFactory::new(&directive),
        CrashGuard::new(FileMarker::new(&settings.crash_check_path)),
        force_disable.clone(),
    );

    if probe.previous_run_crashed() {
        tracing::warn!("OpenGL: last probe crashed the process, disabling acceleration");
        force_disable.set(true);
        // Clear the sentinel so the next run gets to try again.
        probe.guard().end();
    }

    let caps = if cli.window {
        let mut caps = Capabilities::default();
        let result = with_probe_window(WindowConfig::default(), |window| {
            caps = probe.check_capabilities(Some(&window));
        });
        window_outcome(result, caps)
    } else {
        probe.check_capabilities(None)
    };

    tracing::info!(
        supported = caps.supported,
        transparency = caps.transparency,
        "Capability probe finished"
    );
    println!(
        "supported={} transparency={}",
        caps.supported, caps.transparency
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: Capabilities = Capabilities {
        supported: true,
        transparency: true,
    };

    #[test]
    fn missing_window_system_reports_unsupported() {
        assert_eq!(
            window_outcome(Err("no display server"), FULL),
            Capabilities::default()
        );
    }

    #[test]
    fn window_that_never_opened_reports_unsupported() {
        assert_eq!(window_outcome::<&str>(Ok(false), FULL), Capabilities::default());
    }

    #[test]
    fn probed_window_keeps_its_result() {
        assert_eq!(window_outcome::<&str>(Ok(true), FULL), FULL);
    }
}
