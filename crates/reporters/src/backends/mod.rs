mod console;
mod events;
mod exposition;
mod graphite;

pub use console::ConsoleBackend;
pub use events::EventsBackend;
pub use exposition::{ExpositionBackend, render_exposition};
pub use graphite::{DEFAULT_GRAPHITE_PORT, DEFAULT_WRITE_TIMEOUT, GraphiteBackend};
