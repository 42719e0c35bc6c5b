pub mod embeds;
pub mod notifier;

pub use notifier::ChannelNotifier;
