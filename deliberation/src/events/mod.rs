//! Meeting events and their delivery.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ orchestrator │────▶│ MeetingNotifier│────▶│  Event Bus   │────▶│  Subscribers │
//! │ / delivery   │     │  (NotifySink)  │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └────────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! One bus serves every meeting in the process; events carry their meeting
//! id and subscribers filter on it.

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusExt, EventFilter, FilteredReceiver, MeetingNotifier, NotifySink,
    SharedEventBus, SharedNotifySink,
};
pub use types::{CycleOutcome, InterruptReason, MeetingEvent};
