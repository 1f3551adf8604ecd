//! Cross-"process" behaviour of the probe: each process is modelled as a
//! fresh set of components pointed at the same on-disk files.

use accel_probe::shader::ShaderProgram;
use accel_probe::{
    AnglePreference, BackendPreference, BackendSelection, Capabilities, CapabilityProbe,
    ContextFactory, CrashGuard, Directive, DriverInfo, Feature, ForceDisable, NegotiatedFormat,
    ProbeContext, ProbeError, Profile, Renderable, ResolvedBackend, SurfaceRequest,
};
use accel_store::{FileMarker, ProbeSettings};

struct HealthyContext {
    alpha_bits: u8,
}

impl ProbeContext for HealthyContext {
    fn has_feature(&self, _feature: Feature) -> bool {
        true
    }

    fn link_program(&self, _program: &ShaderProgram) -> Result<(), ProbeError> {
        Ok(())
    }

    fn format(&self) -> NegotiatedFormat {
        NegotiatedFormat {
            profile: Profile::Core,
            renderable: Renderable::Desktop,
            alpha_bits: self.alpha_bits,
            major: 4,
            minor: 1,
        }
    }

    fn driver_info(&self) -> DriverInfo {
        DriverInfo::default()
    }
}

/// Machine with full feature support. Records the backend it was asked to
/// create the context with.
struct HealthyMachine {
    alpha_bits: u8,
    resolved: ResolvedBackend,
    seen_backend: Option<BackendSelection>,
}

impl ContextFactory for HealthyMachine {
    type Target = ();
    type Context = HealthyContext;

    fn check_target(&self, _target: &()) -> Result<(), &'static str> {
        Ok(())
    }

    fn create_context(
        &mut self,
        _target: Option<&()>,
        request: SurfaceRequest,
    ) -> Result<HealthyContext, ProbeError> {
        assert_eq!(request.alpha_bits, 8, "probe always asks for an alpha channel");
        self.seen_backend = Some(self.resolved.get());
        Ok(HealthyContext {
            alpha_bits: self.alpha_bits,
        })
    }
}

fn probe(
    settings: &ProbeSettings,
    alpha_bits: u8,
    resolved: ResolvedBackend,
) -> CapabilityProbe<HealthyMachine, FileMarker> {
    let factory = HealthyMachine {
        alpha_bits,
        resolved,
        seen_backend: None,
    };
    CapabilityProbe::new(
        factory,
        CrashGuard::new(FileMarker::new(&settings.crash_check_path)),
        ForceDisable::new(),
    )
}

fn sentinel_exists(settings: &ProbeSettings) -> bool {
    settings.crash_check_path.exists()
}

#[test]
fn fresh_install_full_probe() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ProbeSettings::in_dir(dir.path());

    let mut probe = probe(&settings, 8, ResolvedBackend::new());
    assert!(!probe.previous_run_crashed());

    let caps = probe.check_capabilities(None);
    assert_eq!(
        caps,
        Capabilities {
            supported: true,
            transparency: true
        }
    );
    assert!(!sentinel_exists(&settings));
}

#[test]
fn opaque_surface_is_supported_without_transparency() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ProbeSettings::in_dir(dir.path());

    let caps = probe(&settings, 0, ResolvedBackend::new()).check_capabilities(None);
    assert_eq!(
        caps,
        Capabilities {
            supported: true,
            transparency: false
        }
    );
}

#[test]
fn crash_is_reported_once_then_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ProbeSettings::in_dir(dir.path());

    // First process dies inside context creation: the bracket opens and
    // nothing ever closes it.
    CrashGuard::new(FileMarker::new(&settings.crash_check_path)).begin();
    assert!(sentinel_exists(&settings));

    // Second process notices, then probes normally.
    let mut second = probe(&settings, 8, ResolvedBackend::new());
    assert!(second.previous_run_crashed());
    assert!(second.check_capabilities(None).supported);

    // Third process starts clean.
    let third = probe(&settings, 8, ResolvedBackend::new());
    assert!(!third.previous_run_crashed());
}

#[test]
fn force_disabled_probe_leaves_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ProbeSettings::in_dir(dir.path());

    let force = ForceDisable::new();
    force.set(true);
    let factory = HealthyMachine {
        alpha_bits: 8,
        resolved: ResolvedBackend::new(),
        seen_backend: None,
    };
    let mut probe = CapabilityProbe::new(
        factory,
        CrashGuard::new(FileMarker::new(&settings.crash_check_path)),
        force,
    );

    assert_eq!(probe.check_capabilities(None), Capabilities::default());
    assert!(probe.factory().seen_backend.is_none());
    assert!(!dir.path().join("gl_check").exists());
}

#[test]
fn backend_choice_survives_restart_and_reaches_context_creation() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ProbeSettings::in_dir(dir.path());
    let directive = Directive::new("ACCEL_TEST_RESTART_DIRECTIVE");

    // Run 1: the user picks D3D11.
    {
        let pref = AnglePreference::new(
            FileMarker::new(&settings.backend_path),
            directive.clone(),
            ResolvedBackend::new(),
        );
        pref.configure();
        pref.change(BackendSelection::D3D11);
        assert_eq!(pref.current(), BackendSelection::Auto);
    }

    // Run 2: resolved before the probe creates anything.
    let resolved = ResolvedBackend::new();
    let pref = AnglePreference::new(
        FileMarker::new(&settings.backend_path),
        directive.clone(),
        resolved.clone(),
    );
    assert_eq!(pref.configure(), BackendSelection::D3D11);
    assert_eq!(directive.value().as_deref(), Some("d3d11"));

    let mut probe = probe(&settings, 8, resolved);
    assert!(probe.check_capabilities(None).supported);
    assert_eq!(probe.factory().seen_backend, Some(BackendSelection::D3D11));

    // Back to automatic.
    pref.change(BackendSelection::Auto);
    assert!(!settings.backend_path.exists());
    assert_eq!(pref.configure(), BackendSelection::Auto);
    assert_eq!(directive.value(), None);
}
