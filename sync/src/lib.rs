pub mod errors;
pub mod ibd;
pub mod peer;

pub use errors::{SyncError, SyncResult};
pub use ibd::{IbdFlow, IbdState};
pub use peer::{spawn_syncer_service, ChannelPeer, SyncerPeer};
