pub mod broadcast;
pub mod pg_notify;
#[cfg(test)]
mod recording;

pub use broadcast::BroadcastLinkEventBus;
pub use pg_notify::PgLinkEventBus;
#[cfg(test)]
pub use recording::RecordingLinkEventBus;
