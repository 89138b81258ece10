pub mod fleet;
pub mod location;
pub mod proxy;
pub mod retry;

pub use fleet::{
    current_reward_period, fan_out, recent_reward_periods, reward_period_for, DeviceLocation,
    FleetOverview, FleetRow, FleetService, RewardHistory, WeeklyReward,
};
pub use location::LocationService;
pub use proxy::UpstreamProxy;
pub use retry::RetryConfig;
