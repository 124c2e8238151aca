pub mod configuration;
pub mod env;
pub mod error;
pub mod signal;

pub use configuration::{
    dump_configurations, load_configurations, parse_configurations, to_yaml_string,
    Configuration, ConfigurationSet, Group, ParamValue, Settings,
};
pub use error::*;
pub use signal::{Signal, SubscriptionId};
