//! Event pub/sub for decisions and coordination sessions
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Engine /     │────▶│  Event Bus   │────▶│  Subscribers │
//! │ Sessions     │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Session tasks publish every status change, so a subscriber can follow a
//! session from `active` to its terminal state without polling.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::CoordinationEvent;
