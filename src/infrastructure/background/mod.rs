pub mod wake_channel;

pub use wake_channel::ChannelWake;
