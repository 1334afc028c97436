//! Command/response engine shared by all instrument drivers.
//!
//! - [`command`]: the [`SpectroCommand`] request/response unit
//! - [`framing`]: reading reply frames off the link
//! - [`fifo`]: bounded job queue
//! - [`serial`]: port abstraction and opening
//! - [`recovery`]: retry policy
//! - [`event`]: session events
//! - [`session`]: the [`Spectrophotometer`] session tying it together

pub mod command;
pub mod event;
pub mod fifo;
pub mod framing;
pub mod recovery;
pub mod serial;
pub mod session;

pub use command::{BoxedCommand, CommandId, InstrumentInfo, Reply, SpectroCommand};
pub use event::{EventBus, SpectroEvent};
pub use fifo::Fifo;
pub use framing::Framing;
pub use recovery::RetryPolicy;
pub use serial::{DynSerial, SerialPortIO, SerialSettings};
pub use session::{SessionOptions, Spectrophotometer};
