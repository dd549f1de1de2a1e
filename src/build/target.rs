//! Build target definitions.
//!
//! A target names where the compiled project runs: the embedded Krom
//! runtime, the browser, or one of the native platforms.

use crate::config::PlayRuntime;

/// Runtime family of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    /// Embedded standalone runtime (Krom)
    Embedded,
    /// Browser runtime (html5)
    Browser,
    /// Native platform build, never cached
    Native,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeKind::Embedded => write!(f, "embedded"),
            RuntimeKind::Browser => write!(f, "browser"),
            RuntimeKind::Native => write!(f, "native"),
        }
    }
}

/// A build target identified by name (e.g. "krom", "html5", "krom-linux").
///
/// Two descriptors are the same target when their names are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetDescriptor {
    name: String,
}

impl TargetDescriptor {
    /// Create a target from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The embedded runtime target used by play.
    pub fn krom() -> Self {
        Self::new("krom")
    }

    /// The browser target.
    pub fn html5() -> Self {
        Self::new("html5")
    }

    /// The host's native target.
    pub fn native() -> Self {
        Self::new("native")
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime family of this target.
    pub fn kind(&self) -> RuntimeKind {
        if self.name.starts_with("krom") {
            RuntimeKind::Embedded
        } else if self.name == "html5" {
            RuntimeKind::Browser
        } else {
            RuntimeKind::Native
        }
    }

    /// Whether this target is a mobile platform.
    pub fn is_mobile(&self) -> bool {
        self.name.contains("android") || self.name.contains("ios")
    }

    /// Positional target argument understood by khamake.
    ///
    /// Returns an empty string when khamake should pick its default target.
    pub fn kha_target(&self) -> &str {
        match self.name.as_str() {
            "macos-hl" => "osx-hl",
            "custom" | "native" => "",
            name if name.starts_with("krom") => "krom",
            name => name,
        }
    }
}

impl std::fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Pick the play target.
///
/// Viewport play or a Krom preference runs embedded; a native preference
/// builds natively; anything else runs in the browser.
pub fn runtime_to_target(in_viewport: bool, runtime: PlayRuntime) -> TargetDescriptor {
    if in_viewport || runtime == PlayRuntime::Krom {
        TargetDescriptor::krom()
    } else if runtime == PlayRuntime::Native {
        TargetDescriptor::native()
    } else {
        TargetDescriptor::html5()
    }
}
