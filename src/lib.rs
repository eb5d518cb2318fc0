pub mod allocator;
pub mod colors;
pub mod command;
pub mod config;
pub mod constants;
pub mod drag;
pub mod drivers;
pub mod error;
pub mod event_loop;
pub mod geometry;
pub mod host;
pub mod instance;
pub mod lifecycle;
pub mod pointer;
pub mod presenter;
pub mod registry;
pub mod store;
pub mod surface;
pub mod tracing_sub;
pub mod ui;
pub mod ui_queue;

pub use command::{Command, CommandOutcome};
pub use config::ManagerConfig;
pub use error::{OverlayError, StoreError, SurfaceError};
pub use geometry::{Bounds, Extent, Geometry, Point};
pub use host::OverlayHost;
pub use instance::{InstanceId, InstanceState, Mode, Rgb, SettingValue};
pub use lifecycle::{ForegroundPresence, LifecycleCoordinator, LifecyclePhase, PresenceFlag};
pub use pointer::PointerEvent;
