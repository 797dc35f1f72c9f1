pub mod settings;

pub use settings::{
    BalancerSettings, ClusterSettings, LoggingSettings, Settings, StatusApiSettings,
};
