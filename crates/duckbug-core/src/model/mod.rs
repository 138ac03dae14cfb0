//! Domain types shared by the store, ingestion and aggregation modules.

pub mod event;
pub mod group;
pub mod kind;
pub mod level;
pub mod status;

pub use event::{
    ErrorDetails, ErrorEventInput, Event, EventBody, LogEventInput, NewEvent, RequestMeta,
};
pub use group::{Group, GroupOrigin};
pub use kind::EventKind;
pub use level::LogLevel;
pub use status::GroupStatus;
