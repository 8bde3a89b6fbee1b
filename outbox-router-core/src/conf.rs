/*
    Copyright 2025 MydriaTech AB

    Licensed under the Apache License 2.0 with Free world makers exception
    1.0.0 (the "License"); you may not use this file except in compliance with
    the License. You should have obtained a copy of the License with the source
    or binary distribution in file named

        LICENSE-Apache-2.0-with-FWM-Exception-1.0.0

    Unless required by applicable law or agreed to in writing, software
    distributed under the License is distributed on an "AS IS" BASIS,
    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
    See the License for the specific language governing permissions and
    limitations under the License.
*/

//! Parsing of the router's per-instance configuration knobs.

use config::Config;
use config::ConfigBuilder;
use config::Environment;
use config::File;
use config::builder::DefaultState;
use serde::Deserialize;
use serde::Serialize;

/// Package name reported by Cargo at build time.
const CARGO_PKG_NAME: &str = env!("CARGO_PKG_NAME");

/**
Router configuration root.

The application name defaults to the Rust package name, but can be
overridden with the environment variable `APP_NAME`.

Configuration is loaded from

1. the file `{application name}.json` in the current working directory.
2. environment variable overrides in the form
   `{APPLICATION_NAME}_ROUTER_CONFIGKEYWITHOUTSPACES`.
*/
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// How long a scheduled entry is considered claimed before recovery may
    /// re-emit it.
    claim_duration_secs: u64,
    /// Default per-handler retry delay applied when no explicit
    /// `delay_on_exc` is given to `subscribe`.
    default_delay_on_exc_secs: u64,
    /// Bound of the in-memory channel from scheduler to broker adapter.
    payload_channel_capacity: usize,
    /// Bound of the in-memory confirmation channel from broker adapter back
    /// to scheduler.
    confirmation_channel_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new(CARGO_PKG_NAME)
    }
}

impl RouterConfig {
    fn read_app_name_lowercase(cargo_pkg_name: &str) -> String {
        std::env::var("APP_NAME")
            .map_err(|e| {
                log::debug!(
                    "Environment variable APP_NAME: {e:?} -> Default app name '{cargo_pkg_name}' will be used."
                );
            })
            .ok()
            .map(|value| value.to_lowercase())
            .unwrap_or(cargo_pkg_name.to_owned())
    }

    fn set_defaults(config_builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        config_builder
            .set_default("router.claim_duration_secs", 300)
            .unwrap()
            .set_default("router.default_delay_on_exc_secs", 1)
            .unwrap()
            .set_default("router.payload_channel_capacity", 256)
            .unwrap()
            .set_default("router.confirmation_channel_capacity", 256)
            .unwrap()
    }

    /// Load configuration from defaults, an optional configuration file and
    /// environment variable overrides.
    ///
    /// Use `env!("CARGO_PKG_NAME")` as `cargo_pkg_name`.
    pub fn new(cargo_pkg_name: &str) -> Self {
        let app_name = Self::read_app_name_lowercase(cargo_pkg_name);
        let config_filename = app_name.clone() + ".json";
        let config_env_prefix = app_name.to_uppercase();
        let config_builder = Self::set_defaults(Config::builder());
        let conf_file = std::env::current_dir().unwrap().join(&config_filename);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Will load '{}' router configuration if present.",
                conf_file.display()
            );
        }
        let config = config_builder
            .add_source(File::with_name(conf_file.as_os_str().to_str().unwrap()).required(false))
            .add_source(
                Environment::with_prefix(&config_env_prefix)
                    .separator("_")
                    .list_separator(","),
            )
            .build()
            .unwrap();
        let router_config: RouterConfig = config
            .get("router")
            .unwrap_or_else(|_| Self::defaults_only());
        log::info!("Running with router configuration: {router_config:?}");
        router_config
    }

    fn defaults_only() -> Self {
        let config = Self::set_defaults(Config::builder()).build().unwrap();
        config.get("router").unwrap()
    }

    /// How long a scheduled entry is considered claimed before recovery may
    /// re-emit it.
    pub fn claim_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.claim_duration_secs)
    }

    /// Default per-handler retry delay.
    pub fn default_delay_on_exc(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_delay_on_exc_secs)
    }

    /// Bound of the scheduler → broker payload channel.
    pub fn payload_channel_capacity(&self) -> usize {
        self.payload_channel_capacity
    }

    /// Bound of the broker → scheduler confirmation channel.
    pub fn confirmation_channel_capacity(&self) -> usize {
        self.confirmation_channel_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let conf = RouterConfig::defaults_only();
        assert!(conf.claim_duration_secs > 0);
        assert!(conf.default_delay_on_exc_secs > 0);
        assert!(conf.payload_channel_capacity > 0);
        assert!(conf.confirmation_channel_capacity > 0);
    }
}
