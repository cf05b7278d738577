//! Adelphon Core - Knowledge Propagation Protocol for a Partially-Observable Hunt
//!
//! Runners roam a grid looking for a hidden treasure while animals roam and
//! kill. Stationary relayers pool what runners see and send each runner a
//! target. Everything here is Sans-IO: engines consume decoded frames and
//! return what to send.
//!
//! 1. **Wire Codec**: size-bounded pipe-delimited messages (`codec`)
//! 2. **Knowledge Store**: merge rules for terrain, animals, treasure (`knowledge`)
//! 3. **Frontier Target Selector**: expanding Chebyshev rings (`frontier`)
//! 4. **Navigator**: backward Dijkstra, one step at a time (`navigator`)
//! 5. **Synchronization Coordinator**: the two-phase tick barrier (`coordinator`)
//! 6. **Relayer Mesh**: who dials whom, held frames (`mesh`)

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod frontier;
pub mod grid;
pub mod knowledge;
pub mod mesh;
pub mod navigator;
pub mod oracle;

// Re-export key types for convenience
pub use codec::{CodecError, Frame, Report, SenderKind, Signal, Summary, TerrainObservation};
pub use config::{ConfigError, GameConfig};
pub use coordinator::{Action, Coordinator, CoordinatorError, Outcome, Phase};
pub use frontier::{FrontierError, TargetBook};
pub use grid::{Bounds, Location, Terrain};
pub use knowledge::{ConflictHook, KnowledgeStore, LogConflicts};
pub use mesh::{Mesh, MeshError};
pub use navigator::{NavError, Navigator};
pub use oracle::{GameState, LocalView, WorldOracle};
