//! Domain types shared across the engine layers

pub mod pattern;
pub mod reflection;
pub mod safety;
pub mod snapshot;
pub mod tension;
pub mod violation;

pub use pattern::{Pattern, PatternStrength, PatternType};
pub use reflection::{InvocationMode, Modality, Reflection};
pub use safety::{SafetyCategory, SafetyLevel, SafetySignal};
pub use snapshot::{IdentitySnapshot, SemanticContext};
pub use tension::{Tension, TensionType};
pub use violation::{AxiomId, Violation, ViolationSeverity};
