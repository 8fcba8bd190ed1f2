use std::time::Duration;

/// EtherType identifying this application on the wire. Frames carrying any
/// other value are not ours and are dropped without logging.
pub const ETHER_TYPE: u16 = 0x9528;

/// Maximum number of reliable packets in flight at once. The volume of
/// packets is low enough that this is never a bottleneck.
pub const WINDOW_SIZE: usize = 4;

/// Slack added on top of the measured round trip for processing time.
pub const GRACE_PERIOD: Duration = Duration::from_millis(50);

/// Consecutive loss events tolerated before a connection is declared dead.
pub const MAX_LOSSES: u32 = 5;

/// Period of the tick worker that drives connection maintenance (~20 Hz).
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Receive buffer size; every application message fits in a single frame.
pub const MAX_FRAME_SIZE: usize = 2048;
