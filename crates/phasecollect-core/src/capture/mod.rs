//! Turning raw device buffers into channel-aligned data
//!
//! - [`demux`]: split two dual-channel device buffers into a four-channel [`demux::ChannelSet`]
//! - [`csv`]: append captures to, and read them back from, the CSV interchange format

pub mod csv;
pub mod demux;
