//! Effect interfaces consumed by the engine.
//!
//! Everything the engine needs from the outside world is expressed as a
//! trait here and injected at construction time. Production handlers live
//! with the host application; deterministic mocks live in `quill-testkit`.

pub mod ids;
pub mod notify;
pub mod page_source;
pub mod time;
pub mod transport;

pub use ids::{IdGenerator, UuidGenerator};
pub use notify::{Notification, Notifier, ToastLevel, TracingNotifier};
pub use page_source::{FetchedPage, PageSource};
pub use time::{Clock, SystemClock};
pub use transport::{ByteStream, MessageTransport, SubmitPayload, SubmitResponse};
