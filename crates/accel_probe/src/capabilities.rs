//! Capability records and format classification

/// Result of one capability probe.
///
/// The default value (`supported: false`) is the safe answer for every
/// failure path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub supported: bool,
    /// Only meaningful when `supported` is true.
    pub transparency: bool,
}

/// Minimum alpha depth for a surface to count as transparent.
pub const TRANSPARENCY_ALPHA_BITS: u8 = 8;

/// Features every accelerated context must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Textures whose sides are not powers of two.
    NpotTextures,
    /// Off-screen render targets.
    Framebuffers,
    /// Programmable vertex and fragment stages.
    Shaders,
}

impl Feature {
    pub const REQUIRED: [Feature; 3] = [
        Feature::NpotTextures,
        Feature::Framebuffers,
        Feature::Shaders,
    ];

    pub fn describe(self) -> &'static str {
        match self {
            Feature::NpotTextures => "NPOT textures",
            Feature::Framebuffers => "Framebuffers",
            Feature::Shaders => "Shaders",
        }
    }
}

/// Rendering profile reported by the created context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    NoProfile,
    Core,
    Compatibility,
}

/// API family of the created context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Renderable {
    Desktop,
    /// Mobile/embedded variant (GLES, ANGLE).
    Embedded,
}

/// What the driver actually handed back, as opposed to what was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub profile: Profile,
    pub renderable: Renderable,
    pub alpha_bits: u8,
    pub major: u32,
    pub minor: u32,
}

impl NegotiatedFormat {
    /// Name of an acceptable profile, or `None` when the combination points
    /// at a software or stub driver.
    pub fn profile_name(&self) -> Option<&'static str> {
        match (self.profile, self.renderable) {
            (Profile::NoProfile, Renderable::Embedded) => Some("OpenGLES"),
            (Profile::NoProfile, Renderable::Desktop) => None,
            (Profile::Core, _) => Some("Core"),
            (Profile::Compatibility, _) => Some("Compatibility"),
        }
    }

    pub fn has_transparency(&self) -> bool {
        self.alpha_bits >= TRANSPARENCY_ALPHA_BITS
    }

    pub fn version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}
