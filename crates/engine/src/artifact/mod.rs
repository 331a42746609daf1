//! Artifact generation: overlays rendered in the rule set's native form.
//!
//! Rendering is a pure function of the overlay, the source's match condition
//! and the capability tag, so re-rendering unchanged state yields identical
//! bytes. Writing compares against what is on disk and leaves identical
//! files alone.

mod render;
mod writer;


pub use self::render::{render_command_artifact, render_list_artifact, ArtifactContext, PROVENANCE_MARKER};
pub use self::writer::{ArtifactWriter, WriteOutcome};
